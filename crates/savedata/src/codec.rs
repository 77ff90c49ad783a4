//! Pluggable record codecs.
//!
//! A codec turns a record into the bytes a storage backend persists, and back.
//! Decode failures are reported as [`CodecError::Decode`] so the manager can
//! tell corrupted data apart from I/O failures and fall back to a default
//! record.

use serde::{Serialize, de::DeserializeOwned};

use crate::error::CodecError;

/// Converts records to and from persisted bytes.
pub trait Codec: Send + Sync + 'static {
    /// File extension used for records written with this codec (no dot).
    fn extension(&self) -> &'static str;

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError>;

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

/// JSON codec. Pretty-printed by default so save files stay inspectable.
#[derive(Debug, Clone, Copy)]
pub struct JsonCodec {
    pretty: bool,
}

impl JsonCodec {
    pub const fn pretty() -> Self {
        Self { pretty: true }
    }

    pub const fn compact() -> Self {
        Self { pretty: false }
    }
}

impl Default for JsonCodec {
    fn default() -> Self {
        Self::pretty()
    }
}

impl Codec for JsonCodec {
    fn extension(&self) -> &'static str {
        "json"
    }

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        let result = if self.pretty {
            serde_json::to_vec_pretty(value)
        } else {
            serde_json::to_vec(value)
        };
        result.map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

/// RON codec, for records that are edited by hand.
#[derive(Debug, Clone, Copy, Default)]
pub struct RonCodec;

impl Codec for RonCodec {
    fn extension(&self) -> &'static str {
        "ron"
    }

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        ron::ser::to_string_pretty(value, ron::ser::PrettyConfig::default())
            .map(String::into_bytes)
            .map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        ron::de::from_bytes(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

/// Compact binary codec.
///
/// Not self-describing: adding or reordering fields makes older saves fail to
/// decode, which the manager treats like a missing file.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    fn extension(&self) -> &'static str {
        "bin"
    }

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(value).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
