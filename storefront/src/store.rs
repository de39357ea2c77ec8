use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

/// Keys shared by every storage backend.
pub mod keys {
    pub const USER: &str = "user";
    pub const TOKEN: &str = "token";
    pub const CART: &str = "cart";
    pub const SHIPPING_ADDRESS: &str = "shippingAddress";
    pub const PAYMENT_METHOD: &str = "paymentMethod";
    pub const CHECKOUT_STEP: &str = "checkoutStep";

    /// Older checkout mirror of the cart, folded into [`CART`] on load.
    pub const LEGACY_CART_ITEMS: &str = "cartItems";
}

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("io error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed value for key '{key}': {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("malformed store file {path:?}: {source}")]
    MalformedFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    /// Unreadable data, as opposed to an unreachable store.
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            StorageError::Malformed { .. } | StorageError::MalformedFile { .. }
        )
    }
}

/// Reads that may hit corrupt data fall back to `fallback`, so a damaged
/// store degrades to an empty one until the next write replaces it.
pub fn or_empty_if_corrupt<T>(
    result: Result<T, StorageError>,
    fallback: T,
) -> Result<T, StorageError> {
    match result {
        Err(error) if error.is_corrupt() => {
            warn!(?error, "Stored data is unreadable, treating it as empty");
            Ok(fallback)
        }
        other => other,
    }
}

/// Durable string key-value storage surviving restarts.
///
/// Multi-key writes are applied as one unit so the session pair
/// (`user`, `token`) is never observed half written.
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StorageError>;

    fn remove_many(&self, keys: &[&str]) -> Result<(), StorageError>;

    fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.set_many(&[(key, value)])
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.remove_many(&[key])
    }
}

pub trait StorageExt {
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError>;

    fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError>;
}

impl<S: Storage + ?Sized> StorageExt for S {
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.get(key)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| StorageError::Malformed {
                    key: key.to_owned(),
                    source,
                }),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value).map_err(|source| StorageError::Malformed {
            key: key.to_owned(),
            source,
        })?;
        self.set(key, raw)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set_many(&self, values: &[(&str, String)]) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        for (key, value) in values {
            entries.insert((*key).to_owned(), value.clone());
        }
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }
}

/// Single JSON document on disk holding every key.
///
/// Every read goes back to the file, so writes from another process sharing
/// the same path are visible (and may be overwritten: last writer wins).
/// Writes go to a sibling temp file that is renamed over the original.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStorage {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StorageError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        debug!(path = ?path, "Opened file storage");
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StorageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => {
                return Err(StorageError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw).map_err(|source| StorageError::MalformedFile {
            path: self.path.clone(),
            source,
        })
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let raw = serde_json::to_string_pretty(entries).map_err(|source| {
            StorageError::MalformedFile {
                path: self.path.clone(),
                source,
            }
        })?;
        // Unique per writer so concurrent processes never share a temp file
        let tmp = self
            .path
            .with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        fs::write(&tmp, raw).map_err(|source| StorageError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| {
            let _ = fs::remove_file(&tmp);
            StorageError::Io {
                path: self.path.clone(),
                source,
            }
        })
    }

    fn update(
        &self,
        apply: impl FnOnce(&mut BTreeMap<String, String>),
    ) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = match self.read_all() {
            Ok(entries) => entries,
            Err(error @ StorageError::MalformedFile { .. }) => {
                warn!(?error, "Store file is corrupt, starting from an empty store");
                BTreeMap::new()
            }
            Err(error) => return Err(error),
        };
        apply(&mut entries);
        self.write_all(&entries)
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.read_all()?.remove(key))
    }

    fn set_many(&self, values: &[(&str, String)]) -> Result<(), StorageError> {
        self.update(|entries| {
            for (key, value) in values {
                entries.insert((*key).to_owned(), value.clone());
            }
        })
    }

    fn remove_many(&self, keys: &[&str]) -> Result<(), StorageError> {
        self.update(|entries| {
            for key in keys {
                entries.remove(*key);
            }
        })
    }
}
