//! Swarm key generation and the per-node startup script + data directory
//! layout written under `<dataDir>/<networkId>/`.

use std::path::{Path, PathBuf};

use rand::RngCore;

use super::error::ContainerError;

const SWARM_KEY_HEADER: &str = "/key/swarm/psk/1.0.0/\n/base16/\n";

/// Generates a fresh 32-byte swarm key, hex-encoded and prefixed with the
/// literal libp2p private-network header.
pub fn generate_swarm_key() -> Vec<u8> {
    let mut raw = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut raw);
    let mut out = Vec::with_capacity(SWARM_KEY_HEADER.len() + raw.len() * 2);
    out.extend_from_slice(SWARM_KEY_HEADER.as_bytes());
    out.extend_from_slice(hex::encode(raw).as_bytes());
    out
}

/// The data directory for one network, under the configured root.
pub fn data_dir(root: &str, network_id: &str) -> PathBuf {
    Path::new(root).join("data").join("ipfs").join(network_id)
}

/// The path `ipfs init`/daemon expects its private-network key at.
pub fn swarm_key_path(dir: &Path) -> PathBuf {
    dir.join("swarm.key")
}

/// The path to the generated startup script invoked as the container
/// command.
pub fn startup_script_path(dir: &Path) -> PathBuf {
    dir.join("start.sh")
}

/// Builds the startup script body: initializes the repo if needed, sets
/// the storage-max quota from `disk_gb`, then execs the daemon.
pub fn render_startup_script(disk_gb: f64) -> String {
    let storage_max_gb = disk_gb.max(0.0).round() as u64;
    format!(
        "#!/bin/sh\nset -e\nif [ ! -f /data/ipfs/config ]; then\n  ipfs init\nfi\nipfs config Datastore.StorageMax {storage_max_gb}GB\nexec ipfs daemon --migrate=true --enable-pubsub-experiment\n"
    )
}

/// Creates the data directory (if absent) and writes the swarm key and
/// startup script into it with the configured permission mode.
pub async fn write_node_files(
    root: &str,
    network_id: &str,
    swarm_key: &[u8],
    disk_gb: f64,
    perm_mode: u32,
) -> Result<PathBuf, ContainerError> {
    let dir = data_dir(root, network_id);
    tokio::fs::create_dir_all(&dir).await?;
    set_mode(&dir, perm_mode).await?;

    let key_path = swarm_key_path(&dir);
    if !swarm_key.is_empty() || !tokio::fs::try_exists(&key_path).await.unwrap_or(false) {
        tokio::fs::write(&key_path, swarm_key).await?;
        set_mode(&key_path, perm_mode).await?;
    }

    let script_path = startup_script_path(&dir);
    tokio::fs::write(&script_path, render_startup_script(disk_gb)).await?;
    set_mode(&script_path, 0o755).await?;

    Ok(dir)
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> Result<(), ContainerError> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> Result<(), ContainerError> {
    Ok(())
}

/// Parses an octal permission-mode string like `"0700"` into a `u32`.
pub fn parse_perm_mode(s: &str) -> u32 {
    u32::from_str_radix(s.trim_start_matches("0o").trim_start_matches('0'), 8).unwrap_or(0o700)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swarm_key_has_expected_header_and_length() {
        let key = generate_swarm_key();
        let key = String::from_utf8(key).unwrap();
        assert!(key.starts_with(SWARM_KEY_HEADER));
        assert_eq!(key.len(), SWARM_KEY_HEADER.len() + 64);
    }

    #[test]
    fn parses_octal_perm_mode() {
        assert_eq!(parse_perm_mode("0700"), 0o700);
        assert_eq!(parse_perm_mode("0755"), 0o755);
    }

    #[test]
    fn startup_script_embeds_rounded_storage_quota() {
        let script = render_startup_script(2.4);
        assert!(script.contains("2GB"));
        assert!(script.contains("exec ipfs daemon"));
    }

    #[tokio::test]
    async fn writes_key_and_script_into_data_dir() {
        let tmp = std::env::temp_dir().join(format!("nexus-test-{}", std::process::id()));
        let root = tmp.to_str().unwrap().to_string();
        let dir = write_node_files(&root, "alpha", b"fake-key", 1.0, 0o700).await.expect("writes");
        assert!(dir.join("swarm.key").exists());
        assert!(dir.join("start.sh").exists());
        tokio::fs::remove_dir_all(&tmp).await.ok();
    }
}
