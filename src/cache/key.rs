//! Cache Key Module
//!
//! Byte-string keys, the text encoding applied to text keys, and the
//! reversible file-name encoding.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use encoding_rs::Encoding;

use crate::error::{CacheError, Result};

// == Key ==
/// A cache key: an arbitrary byte sequence.
///
/// `From<&str>` encodes text as UTF-8; byte keys are used as-is. Containers
/// configured with another [`KeyEncoding`] turn text into keys with
/// [`Mapping::text_key`](super::Mapping::text_key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(Vec<u8>);

impl Key {
    /// Creates a key from raw bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Returns the key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the key, returning its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Returns the key as text if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    // == File Name Encoding ==
    /// Lowercase hex of the key bytes, safe to use as a file name.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Reverses [`Key::to_hex`].
    pub fn from_hex(name: &str) -> Result<Self> {
        hex::decode(name)
            .map(Self)
            .map_err(|e| CacheError::Config(format!("invalid encoded key '{}': {}", name, e)))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(text) => write!(f, "'{}'", text),
            None => write!(f, "0x{}", self.to_hex()),
        }
    }
}

impl From<&str> for Key {
    fn from(key: &str) -> Self {
        Self(key.as_bytes().to_vec())
    }
}

impl From<String> for Key {
    fn from(key: String) -> Self {
        Self(key.into_bytes())
    }
}

impl From<&String> for Key {
    fn from(key: &String) -> Self {
        Self::from(key.as_str())
    }
}

impl From<&[u8]> for Key {
    fn from(key: &[u8]) -> Self {
        Self(key.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for Key {
    fn from(key: &[u8; N]) -> Self {
        Self(key.to_vec())
    }
}

impl From<Vec<u8>> for Key {
    fn from(key: Vec<u8>) -> Self {
        Self(key)
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

// == Key Encoding ==
/// The text encoding that turns text keys into key bytes and back.
///
/// Only encodings that can encode text are accepted; UTF-16 and the
/// replacement encoding are decode-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEncoding(&'static Encoding);

impl KeyEncoding {
    /// Looks up an encoding by its WHATWG label (`utf-8`, `latin1`,
    /// `shift_jis`, ...).
    pub fn for_label(label: &str) -> Result<Self> {
        let encoding = Encoding::for_label(label.trim().as_bytes())
            .ok_or_else(|| CacheError::Config(format!("unknown key encoding '{}'", label)))?;
        if encoding.output_encoding() != encoding {
            return Err(CacheError::Config(format!(
                "key encoding '{}' cannot encode text",
                encoding.name()
            )));
        }
        Ok(Self(encoding))
    }

    pub fn utf8() -> Self {
        Self(encoding_rs::UTF_8)
    }

    pub fn name(&self) -> &'static str {
        self.0.name()
    }

    /// Encodes a text key. Fails with `Config` when the text has characters
    /// the encoding cannot represent.
    pub fn encode(&self, text: &str) -> Result<Key> {
        let (bytes, _, had_errors) = self.0.encode(text);
        if had_errors {
            return Err(CacheError::Config(format!(
                "key '{}' cannot be encoded as {}",
                text,
                self.name()
            )));
        }
        Ok(Key(bytes.into_owned()))
    }

    /// Decodes key bytes back to text.
    pub fn decode(&self, key: &Key) -> Result<String> {
        self.0
            .decode_without_bom_handling_and_without_replacement(key.as_bytes())
            .map(Cow::into_owned)
            .ok_or_else(|| {
                CacheError::Deserialization(format!("key {} is not valid {}", key, self.name()))
            })
    }
}

impl Default for KeyEncoding {
    fn default() -> Self {
        Self::utf8()
    }
}

impl FromStr for KeyEncoding {
    type Err = CacheError;

    fn from_str(label: &str) -> Result<Self> {
        Self::for_label(label)
    }
}

impl fmt::Display for KeyEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
