use anyhow::{anyhow, Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "solmap";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pat: Option<String>,
}

/// Saved personal access token, `config.json` under the user config dir
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn default_location() -> Result<Self> {
        let base = dirs::config_dir().ok_or_else(|| anyhow!("No config directory on this platform"))?;
        Ok(Self::at(base.join(APP_DIR).join(CONFIG_FILE)))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing or unreadable file means no saved token
    pub fn load(&self) -> Option<String> {
        let raw = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<StoredConfig>(&raw) {
            Ok(config) => config.pat.filter(|pat| !pat.trim().is_empty()),
            Err(err) => {
                log::warn!("Ignoring malformed {}: {err}", self.path.display());
                None
            }
        }
    }

    pub fn save(&self, pat: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let body = serde_json::to_string(&StoredConfig {
            pat: Some(pat.to_string()),
        })?;
        write_private(&self.path, body.as_bytes())
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        log::info!("Saved token {} to {}", mask_pat(pat), self.path.display());
        Ok(())
    }
}

/// Owner-only from creation; a file left by an older run is narrowed first
#[cfg(unix)]
fn write_private(path: &Path, body: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    if path.exists() {
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(body)?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_private(path: &Path, body: &[u8]) -> std::io::Result<()> {
    fs::write(path, body)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    /// `--token` or `VEOCI_TOKEN`
    Argument,
    Saved,
}

/// Explicit token first, then the saved one
pub fn resolve_token(
    explicit: Option<&str>,
    store: &CredentialStore,
) -> Result<(String, TokenSource)> {
    if let Some(token) = explicit.map(str::trim).filter(|t| !t.is_empty()) {
        return Ok((token.to_string(), TokenSource::Argument));
    }
    store
        .load()
        .map(|pat| (pat, TokenSource::Saved))
        .ok_or_else(|| {
            anyhow!(
                "No API token: pass --token, set VEOCI_TOKEN, or save one with --save-token"
            )
        })
}

/// All but the last four characters hidden
pub fn mask_pat(pat: &str) -> String {
    let chars: Vec<char> = pat.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{visible}", "*".repeat(chars.len() - 4))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn masks_all_but_last_four() {
        assert_eq!(mask_pat("abc"), "****");
        assert_eq!(mask_pat("abcd"), "****");
        assert_eq!(mask_pat("pat_12345678"), "********5678");
    }

    #[test]
    fn saved_token_round_trips() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::at(dir.path().join("nested").join("config.json"));
        assert_eq!(store.load(), None);

        store.save("pat_secret").unwrap();
        assert_eq!(store.load().as_deref(), Some("pat_secret"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(store.path()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[cfg(unix)]
    #[test]
    fn overwriting_a_readable_file_narrows_it() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"pat":"old"}"#).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        let store = CredentialStore::at(path.clone());
        store.save("new_token").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(store.load().as_deref(), Some("new_token"));
    }

    #[test]
    fn explicit_token_wins_over_saved() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::at(dir.path().join("config.json"));
        store.save("saved").unwrap();

        let (token, source) = resolve_token(Some(" given "), &store).unwrap();
        assert_eq!((token.as_str(), source), ("given", TokenSource::Argument));

        let (token, source) = resolve_token(Some("  "), &store).unwrap();
        assert_eq!((token.as_str(), source), ("saved", TokenSource::Saved));
    }

    #[test]
    fn missing_token_is_an_error() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::at(dir.path().join("config.json"));
        assert!(resolve_token(None, &store).is_err());
    }

    #[test]
    fn malformed_config_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "not json").unwrap();
        assert_eq!(CredentialStore::at(path).load(), None);
    }
}
