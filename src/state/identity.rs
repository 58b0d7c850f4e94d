//! Persistence of the participant's self-asserted identity across restarts.

use std::{
    env, fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Mutex,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default location of the identity file.
const DEFAULT_IDENTITY_PATH: &str = "data/identity.json";
/// Environment variable that overrides [`DEFAULT_IDENTITY_PATH`].
const IDENTITY_PATH_ENV: &str = "COACHING_MATRIX_IDENTITY_PATH";

/// Cached identity of the local participant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalIdentity {
    /// Chosen display name, if any.
    #[serde(default)]
    pub participant_name: Option<String>,
    /// Last known submission flag; only a hint until the first fetch.
    #[serde(default)]
    pub has_submitted: bool,
}

/// Errors raised while persisting the identity.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The identity file or its directory could not be written.
    #[error("failed to write identity file `{path}`")]
    Write {
        /// File being written.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The identity could not be serialised.
    #[error("failed to encode identity")]
    Encode(#[from] serde_json::Error),
}

/// Durable storage for [`LocalIdentity`].
pub trait IdentityStore: Send + Sync {
    /// Read the cached identity; a missing or unreadable cache yields the empty identity.
    fn load(&self) -> LocalIdentity;
    /// Replace the cached identity.
    fn save(&self, identity: &LocalIdentity) -> Result<(), IdentityError>;
}

/// JSON file backed identity store.
#[derive(Debug, Clone)]
pub struct FileIdentityStore {
    path: PathBuf,
}

impl FileIdentityStore {
    /// Store backed by the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store located at `COACHING_MATRIX_IDENTITY_PATH`, or the default path.
    pub fn from_env() -> Self {
        let path = env::var_os(IDENTITY_PATH_ENV)
            .map(PathBuf::from)
            .filter(|path| !path.as_os_str().is_empty())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_IDENTITY_PATH));
        Self::new(path)
    }

    /// Location of the identity file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IdentityStore for FileIdentityStore {
    fn load(&self) -> LocalIdentity {
        let path = &self.path;
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<LocalIdentity>(&contents) {
                Ok(identity) => {
                    info!(
                        path = %path.display(),
                        has_name = identity.participant_name.is_some(),
                        "restored participant identity"
                    );
                    identity
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse identity file; starting anonymous"
                    );
                    LocalIdentity::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no identity file; starting anonymous");
                LocalIdentity::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read identity file; starting anonymous"
                );
                LocalIdentity::default()
            }
        }
    }

    fn save(&self, identity: &LocalIdentity) -> Result<(), IdentityError> {
        let encoded = serde_json::to_vec_pretty(identity)?;
        let write_err = |source| IdentityError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(&self.path, encoded).map_err(write_err)
    }
}

/// In-process identity store, mostly for tests.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    identity: Mutex<LocalIdentity>,
}

impl MemoryIdentityStore {
    /// Store seeded with `identity`.
    pub fn new(identity: LocalIdentity) -> Self {
        Self {
            identity: Mutex::new(identity),
        }
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn load(&self) -> LocalIdentity {
        self.identity
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    fn save(&self, identity: &LocalIdentity) -> Result<(), IdentityError> {
        if let Ok(mut guard) = self.identity.lock() {
            *guard = identity.clone();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(tag: &str) -> PathBuf {
        env::temp_dir()
            .join(format!("coaching-matrix-{tag}-{}", uuid::Uuid::new_v4()))
            .join("identity.json")
    }

    #[test]
    fn missing_file_yields_anonymous_identity() {
        let store = FileIdentityStore::new(temp_path("missing"));
        assert_eq!(store.load(), LocalIdentity::default());
    }

    #[test]
    fn saved_identity_is_restored() {
        let store = FileIdentityStore::new(temp_path("roundtrip"));
        let identity = LocalIdentity {
            participant_name: Some("Ana".into()),
            has_submitted: true,
        };

        store.save(&identity).expect("save identity");

        assert_eq!(store.load(), identity);
        let _ = fs::remove_dir_all(store.path().parent().expect("parent dir"));
    }

    #[test]
    fn corrupt_file_yields_anonymous_identity() {
        let path = temp_path("corrupt");
        fs::create_dir_all(path.parent().expect("parent dir")).expect("create dir");
        fs::write(&path, b"{not json").expect("write file");

        let store = FileIdentityStore::new(&path);

        assert_eq!(store.load(), LocalIdentity::default());
        let _ = fs::remove_dir_all(path.parent().expect("parent dir"));
    }
}
