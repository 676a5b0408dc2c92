//! TLS — rustls `ServerConfig` building for the public-facing listener.
//! Server-only (no client certificate verification): the delegator
//! terminates TLS for browsers and IPFS HTTP clients, not peer agents.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use anyhow::{Context, Result};
use rustls::pki_types::CertificateDer;
use rustls::ServerConfig;

use crate::config::TlsConfig;

pub fn build_rustls_config(tls: &TlsConfig) -> Result<Arc<ServerConfig>> {
    let cert_path = tls.cert.as_deref().context("tls.cert not set")?;
    let key_path = tls.key.as_deref().context("tls.key not set")?;

    let cert_file = File::open(cert_path).with_context(|| format!("opening {cert_path}"))?;
    let certs: Vec<CertificateDer> = rustls_pemfile::certs(&mut BufReader::new(cert_file))
        .collect::<Result<Vec<_>, _>>()
        .context("parsing TLS certificate chain")?;

    let key_file = File::open(key_path).with_context(|| format!("opening {key_path}"))?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(key_file))
        .context("parsing TLS private key")?
        .context("no private key found in key file")?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("building rustls server config")?;

    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(Arc::new(config))
}
