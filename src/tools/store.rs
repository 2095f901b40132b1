//! Flat JSON file persistence shared by the widget tools

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use crate::Result;

/// A JSON document on disk, read and rewritten whole
///
/// A missing or corrupt file reads as the default value. A corrupt file is
/// moved aside to `<name>.corrupt` before the first rewrite. Updates are
/// serialized through an in-process lock so concurrent tool calls cannot
/// lose each other's writes.
#[derive(Debug)]
pub struct JsonFile {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFile {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current contents
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read
    pub async fn read<T: DeserializeOwned + Default>(&self) -> Result<T> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.0)
    }

    /// Read, modify and write back the contents atomically with respect to
    /// other callers of this store
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or written
    pub async fn update<T, R>(&self, f: impl FnOnce(&mut T) -> (R, bool)) -> Result<R>
    where
        T: DeserializeOwned + Serialize + Default,
    {
        let _guard = self.lock.lock().await;
        let (mut value, corrupt): (T, bool) = self.load().await?;
        let (out, changed) = f(&mut value);
        if changed {
            if corrupt {
                let aside = self.corrupt_path();
                tokio::fs::rename(&self.path, &aside).await?;
                tracing::warn!(path = %aside.display(), "corrupt store kept aside");
            }
            self.save(&value).await?;
        }
        Ok(out)
    }

    /// Current value, and whether the file on disk was unreadable
    async fn load<T: DeserializeOwned + Default>(&self) -> Result<(T, bool)> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((T::default(), false)),
            Err(e) => return Err(e.into()),
        };

        Ok(match serde_json::from_slice(&raw) {
            Ok(value) => (value, false),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "corrupt store, starting empty");
                (T::default(), true)
            }
        })
    }

    fn corrupt_path(&self) -> PathBuf {
        let mut path = self.path.clone().into_os_string();
        path.push(".corrupt");
        PathBuf::from(path)
    }

    async fn save<T: Serialize>(&self, value: &T) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}
