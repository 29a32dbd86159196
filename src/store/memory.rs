use std::collections::HashMap;
use std::sync::Mutex;

use super::{SecretKey, SecretStore};
use crate::error::ConnectError;

/// Process-local secret store. Nothing is written to disk.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    values: Mutex<HashMap<SecretKey, String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<SecretKey, String>>, ConnectError> {
        self.values
            .lock()
            .map_err(|_| ConnectError::Storage("memory store lock poisoned".into()))
    }
}

impl SecretStore for MemorySecretStore {
    fn load(&self, key: SecretKey) -> Result<Option<String>, ConnectError> {
        Ok(self.values()?.get(&key).cloned())
    }

    fn save(&self, key: SecretKey, value: &str) -> Result<(), ConnectError> {
        self.values()?.insert(key, value.to_string());
        Ok(())
    }

    fn clear(&self, key: SecretKey) -> Result<(), ConnectError> {
        self.values()?.remove(&key);
        Ok(())
    }
}
