//! Type keys and the `Savable` contract.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};

use crate::error::{Result, SaveDataError};

/// Data types that can be cached and persisted by [`DataManager`](crate::DataManager).
///
/// `KEY` names the type on disk: the record is stored as `<KEY>.<ext>` under
/// the storage root. It must stay stable across releases, otherwise existing
/// saves are no longer found and the record silently starts from `Default`.
///
/// ```ignore
/// #[derive(Default, Serialize, Deserialize)]
/// struct GoodsSaveData {
///     gold: u32,
/// }
///
/// impl Savable for GoodsSaveData {
///     const KEY: &'static str = "GoodsSaveData";
/// }
/// ```
pub trait Savable: Serialize + DeserializeOwned + Default + Send + Sync + 'static {
    const KEY: &'static str;

    /// Validated key for this type.
    fn type_key() -> Result<TypeKey> {
        TypeKey::new(Self::KEY)
    }
}

/// Stable identifier naming a record type. Cheap to clone.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeKey(Arc<str>);

impl TypeKey {
    /// Validate and wrap a key.
    ///
    /// Keys double as file stems, so only ASCII alphanumerics, `_`, `-` and
    /// `.` are accepted, and the key may not start with `.`.
    pub fn new(name: impl AsRef<str>) -> Result<Self> {
        let name = name.as_ref();
        let invalid = |reason| SaveDataError::InvalidKey {
            key: name.to_string(),
            reason,
        };

        if name.is_empty() {
            return Err(invalid("key is empty"));
        }
        if name.starts_with('.') {
            return Err(invalid("key may not start with '.'"));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        {
            return Err(invalid("key may only contain ASCII alphanumerics, '_', '-' and '.'"));
        }

        Ok(Self(Arc::from(name)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name for this key with the given extension (without the dot).
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}.{}", self.0, extension)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.0)
    }
}

impl AsRef<str> for TypeKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for TypeKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_keys() {
        for name in ["Goods", "player_profile", "settings-v2", "a.b"] {
            let key = TypeKey::new(name).unwrap();
            assert_eq!(key.as_str(), name);
        }
    }

    #[test]
    fn test_rejects_unsafe_keys() {
        for name in ["", ".hidden", "../escape", "a/b", "with space", "ümlaut"] {
            assert!(
                matches!(TypeKey::new(name), Err(SaveDataError::InvalidKey { .. })),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_file_name() {
        let key = TypeKey::new("Goods").unwrap();
        assert_eq!(key.file_name("json"), "Goods.json");
    }
}
