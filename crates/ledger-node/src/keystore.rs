//! On-disk key material and bootstrap artifacts (§6 "On-disk layout"):
//! `keys/<principal>.priv` (0600), `genesis.rec`, and `peers.list`.
//!
//! `KeyPair` already derives `Serialize`/`Deserialize` (it zeroizes its
//! secret on drop regardless of how many copies of the struct briefly
//! exist while JSON-encoding it), so a key file is just that struct as
//! JSON with restrictive permissions.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use ledger_core::record::Record;
use ledger_core::types::PrincipalId;
use ledger_crypto::KeyPair;

fn keys_dir(dir: &Path) -> PathBuf {
    dir.join("keys")
}

fn key_path(dir: &Path, name: &str) -> PathBuf {
    keys_dir(dir).join(format!("{name}.priv"))
}

/// Write `keypair` to `<dir>/keys/<name>.priv`, creating the `keys/`
/// directory if needed and restricting the file to owner read/write.
pub fn save_keypair(dir: &Path, name: &str, keypair: &KeyPair) -> anyhow::Result<()> {
    let keys = keys_dir(dir);
    fs::create_dir_all(&keys)?;
    let path = key_path(dir, name);
    let bytes = serde_json::to_vec_pretty(keypair)?;
    fs::write(&path, bytes)?;
    set_owner_only(&path)?;
    Ok(())
}

pub fn load_keypair(dir: &Path, name: &str) -> anyhow::Result<KeyPair> {
    let path = key_path(dir, name);
    let bytes = fs::read(&path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Load every `keys/*.priv` file, keyed by the principal id the file stem
/// names. Files that fail to parse are skipped with a warning rather than
/// aborting startup — an operator may keep scratch files in `keys/`.
pub fn load_all_principal_keys(dir: &Path) -> anyhow::Result<HashMap<PrincipalId, KeyPair>> {
    let mut out = HashMap::new();
    let keys = keys_dir(dir);
    if !keys.is_dir() {
        return Ok(out);
    }
    for entry in fs::read_dir(&keys)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("priv") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match fs::read(&path).and_then(|b| {
            serde_json::from_slice::<KeyPair>(&b).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        }) {
            Ok(kp) => {
                out.insert(PrincipalId(stem.to_string()), kp);
            }
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "skipping unreadable key file");
            }
        }
    }
    Ok(out)
}

#[cfg(unix)]
fn set_owner_only(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o600);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn set_owner_only(_path: &Path) -> anyhow::Result<()> {
    Ok(())
}

/// `genesis.rec` holds the genesis record's canonical encoded bytes
/// directly — the same bytes that live at frame 0 of `ledger.log` once the
/// node has been `init`ed, so operators can diff the two.
pub fn save_genesis_record(path: &Path, record: &Record) -> anyhow::Result<()> {
    fs::write(path, record.encode())?;
    Ok(())
}

pub fn load_genesis_record(path: &Path) -> anyhow::Result<Record> {
    let bytes = fs::read(path)?;
    Ok(Record::decode(&bytes)?)
}

/// `peers.list`: one bootstrap multiaddr per line, `#`-prefixed lines and
/// blank lines ignored.
pub fn load_peers_list(path: &Path) -> anyhow::Result<Vec<String>> {
    let text = fs::read_to_string(path)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect())
}
