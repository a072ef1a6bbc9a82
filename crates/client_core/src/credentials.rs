use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to access credential file '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("credential file '{path}' is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("credential store lock poisoned")]
    Poisoned,
}

/// Source of the bearer tokens attached to API calls. Tokens are looked up
/// on every request, so a sign-in or sign-out takes effect immediately.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Credentials, CredentialError>;
    fn save(&self, credentials: &Credentials) -> Result<(), CredentialError>;
    fn clear(&self) -> Result<(), CredentialError>;

    fn access_token(&self) -> Result<Option<String>, CredentialError> {
        Ok(non_blank(self.load()?.access))
    }

    fn refresh_token(&self) -> Result<Option<String>, CredentialError> {
        Ok(non_blank(self.load()?.refresh))
    }
}

fn non_blank(token: Option<String>) -> Option<String> {
    token.filter(|token| !token.trim().is_empty())
}

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<Credentials>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_access_token(token: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(Credentials {
                access: Some(token.into()),
                refresh: None,
            }),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Credentials, CredentialError> {
        let guard = self.inner.lock().map_err(|_| CredentialError::Poisoned)?;
        Ok(guard.clone())
    }

    fn save(&self, credentials: &Credentials) -> Result<(), CredentialError> {
        let mut guard = self.inner.lock().map_err(|_| CredentialError::Poisoned)?;
        *guard = credentials.clone();
        Ok(())
    }

    fn clear(&self) -> Result<(), CredentialError> {
        self.save(&Credentials::default())
    }
}

/// JSON file holding the `access` and `refresh` tokens between runs. On unix
/// the file is kept readable by its owner only.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> CredentialError {
        CredentialError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn write_private(&self, contents: &[u8]) -> Result<(), CredentialError> {
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path).map_err(|err| self.io_error(err))?;

        // `mode` only applies to newly created files.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))
                .map_err(|err| self.io_error(err))?;
        }
        file.write_all(contents).map_err(|err| self.io_error(err))
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Credentials, CredentialError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Credentials::default());
            }
            Err(err) => return Err(self.io_error(err)),
        };
        if raw.trim().is_empty() {
            return Ok(Credentials::default());
        }
        serde_json::from_str(&raw).map_err(|source| CredentialError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, credentials: &Credentials) -> Result<(), CredentialError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| self.io_error(err))?;
        }
        let raw = serde_json::to_string_pretty(credentials).map_err(|source| {
            CredentialError::Corrupt {
                path: self.path.clone(),
                source,
            }
        })?;
        self.write_private(raw.as_bytes())?;
        debug!(path = %self.path.display(), "stored credentials");
        Ok(())
    }

    fn clear(&self) -> Result<(), CredentialError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(self.io_error(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        env,
        time::{SystemTime, UNIX_EPOCH},
    };

    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        env::temp_dir()
            .join(format!("orientation_credentials_{name}_{suffix}"))
            .join("credentials.json")
    }

    #[test]
    fn memory_store_round_trips_and_clears() {
        let store = MemoryCredentialStore::new();
        assert_eq!(store.access_token().expect("load"), None);

        store
            .save(&Credentials {
                access: Some("a1".into()),
                refresh: Some("r1".into()),
            })
            .expect("save");
        assert_eq!(store.access_token().expect("load").as_deref(), Some("a1"));
        assert_eq!(store.refresh_token().expect("load").as_deref(), Some("r1"));

        store.clear().expect("clear");
        assert_eq!(store.load().expect("load"), Credentials::default());
    }

    #[test]
    fn blank_tokens_count_as_missing() {
        let store = MemoryCredentialStore::with_access_token("   ");
        assert_eq!(store.access_token().expect("load"), None);
    }

    #[test]
    fn file_store_missing_file_is_empty() {
        let store = FileCredentialStore::new(temp_path("missing"));
        assert_eq!(store.load().expect("load"), Credentials::default());
        store.clear().expect("clearing a missing file is fine");
    }

    #[test]
    fn file_store_persists_between_instances() {
        let path = temp_path("persist");
        FileCredentialStore::new(&path)
            .save(&Credentials {
                access: Some("token".into()),
                refresh: None,
            })
            .expect("save");

        let reopened = FileCredentialStore::new(&path);
        assert_eq!(
            reopened.access_token().expect("load").as_deref(),
            Some("token")
        );

        reopened.clear().expect("clear");
        assert!(!path.exists());
        fs::remove_dir_all(path.parent().expect("parent")).expect("cleanup");
    }

    #[cfg(unix)]
    #[test]
    fn file_store_is_private_to_its_owner() {
        use std::os::unix::fs::PermissionsExt;

        let path = temp_path("private");
        let store = FileCredentialStore::new(&path);
        store
            .save(&Credentials {
                access: Some("a".into()),
                refresh: Some("r".into()),
            })
            .expect("save");

        let mode = fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o077, 0, "credential file mode {mode:o}");
        fs::remove_dir_all(path.parent().expect("parent")).expect("cleanup");
    }

    #[cfg(unix)]
    #[test]
    fn file_store_tightens_existing_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let path = temp_path("tighten");
        fs::create_dir_all(path.parent().expect("parent")).expect("dir");
        fs::write(&path, "{}").expect("write");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).expect("chmod");

        FileCredentialStore::new(&path)
            .save(&Credentials {
                access: Some("a".into()),
                refresh: None,
            })
            .expect("save");

        let mode = fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        fs::remove_dir_all(path.parent().expect("parent")).expect("cleanup");
    }

    #[test]
    fn file_store_reports_corrupt_contents() {
        let path = temp_path("corrupt");
        fs::create_dir_all(path.parent().expect("parent")).expect("dir");
        fs::write(&path, "not json").expect("write");

        let err = FileCredentialStore::new(&path).load().expect_err("corrupt");
        assert!(matches!(err, CredentialError::Corrupt { .. }));
        fs::remove_dir_all(path.parent().expect("parent")).expect("cleanup");
    }
}
