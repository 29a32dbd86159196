use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::encryption::{self, MasterKey, Sealed};
use super::{SecretKey, SecretStore};
use crate::error::ConnectError;

const SECRET_FILE_VERSION: u32 = 1;
const SECRET_FILE_NAME: &str = "secrets.json";
const MASTER_KEY_FILE_NAME: &str = "master.key";

/// Configuration for file-backed secret storage.
#[derive(Debug, Clone)]
pub struct SecretStoreConfig {
    pub base_dir: PathBuf,
    /// Explicit master key; when `None` a key file in `base_dir` is used.
    pub master_key: Option<MasterKey>,
}

impl SecretStoreConfig {
    pub fn new(base_dir: PathBuf) -> Self {
        Self {
            base_dir,
            master_key: None,
        }
    }

    pub fn with_master_key(mut self, key: MasterKey) -> Self {
        self.master_key = Some(key);
        self
    }
}

/// Secret store that keeps every value AES-256-GCM sealed in one JSON file.
///
/// # Example
/// ```no_run
/// use openo_connect::store::{FileSecretStore, SecretKey, SecretStore, SecretStoreConfig};
///
/// let store = FileSecretStore::open(SecretStoreConfig::new("/tmp/openo".into()))?;
/// store.save(SecretKey::Username, "oscardoc")?;
/// # Ok::<(), openo_connect::error::ConnectError>(())
/// ```
#[derive(Debug)]
pub struct FileSecretStore {
    path: PathBuf,
    key: MasterKey,
    lock: Mutex<()>,
}

impl FileSecretStore {
    pub fn open(config: SecretStoreConfig) -> Result<Self, ConnectError> {
        let key = match config.master_key {
            Some(key) => key,
            None => MasterKey::load_or_create(&config.base_dir.join(MASTER_KEY_FILE_NAME))?,
        };
        Ok(Self {
            path: config.base_dir.join(SECRET_FILE_NAME),
            key,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(&self) -> Result<SecretFile, ConnectError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(SecretFile::empty())
            }
            Err(err) => return Err(err.into()),
        };
        let file: SecretFile = serde_json::from_str(&raw)
            .map_err(|e| ConnectError::Storage(format!("corrupt secret file: {e}")))?;
        if file.version != SECRET_FILE_VERSION {
            return Err(ConnectError::Storage(format!(
                "unsupported secret file version {} at {}",
                file.version,
                self.path.display()
            )));
        }
        Ok(file)
    }

    fn write_file(&self, mut file: SecretFile) -> Result<(), ConnectError> {
        file.saved_at = Utc::now();
        let serialized = serde_json::to_vec_pretty(&file)
            .map_err(|e| ConnectError::Storage(e.to_string()))?;
        atomic_write(&self.path, &serialized)
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, ()>, ConnectError> {
        self.lock
            .lock()
            .map_err(|_| ConnectError::Storage("secret store lock poisoned".into()))
    }
}

impl SecretStore for FileSecretStore {
    fn load(&self, key: SecretKey) -> Result<Option<String>, ConnectError> {
        let _guard = self.guard()?;
        let file = self.read_file()?;
        file.entries
            .get(key.as_ref())
            .map(|sealed| encryption::open(sealed, &self.key))
            .transpose()
    }

    fn save(&self, key: SecretKey, value: &str) -> Result<(), ConnectError> {
        let _guard = self.guard()?;
        let mut file = self.read_file()?;
        file.entries
            .insert(key.to_string(), encryption::seal(value, &self.key)?);
        self.write_file(file)
    }

    fn clear(&self, key: SecretKey) -> Result<(), ConnectError> {
        let _guard = self.guard()?;
        let mut file = self.read_file()?;
        if file.entries.remove(key.as_ref()).is_none() {
            return Ok(());
        }
        self.write_file(file)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct SecretFile {
    version: u32,
    entries: BTreeMap<String, Sealed>,
    saved_at: DateTime<Utc>,
}

impl SecretFile {
    fn empty() -> Self {
        Self {
            version: SECRET_FILE_VERSION,
            entries: BTreeMap::new(),
            saved_at: Utc::now(),
        }
    }
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<(), ConnectError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file_name = path.file_name().ok_or_else(|| {
        ConnectError::Configuration(format!("secret path {} has no file name", path.display()))
    })?;

    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let temp_name = format!(
        ".{}.tmp-{}-{nonce}",
        file_name.to_string_lossy(),
        std::process::id()
    );
    let temp_path = path.with_file_name(temp_name);

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let write_result = (|| -> std::io::Result<()> {
        let mut temp_file = options.open(&temp_path)?;
        temp_file.write_all(data)?;
        temp_file.sync_all()?;
        Ok(())
    })();

    if let Err(err) = write_result {
        let _ = fs::remove_file(&temp_path);
        return Err(err.into());
    }

    if let Err(err) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(err.into());
    }

    #[cfg(unix)]
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;

    Ok(())
}
