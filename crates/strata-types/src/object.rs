use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Content address of a stored object.
///
/// An `ObjectId` is a 32-byte BLAKE3 digest of an object's canonical bytes,
/// usually computed through a domain-separated [`ContentHasher`]. Two equal
/// values always share one address, so ids double as equality witnesses for
/// contents, nodes and commits.
///
/// [`ContentHasher`]: crate::ContentHasher
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId([u8; 32]);

impl ObjectId {
    /// Digest raw bytes without domain separation.
    pub fn digest(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Wrap a pre-computed hash.
    pub const fn from_hash(hash: [u8; 32]) -> Self {
        Self(hash)
    }

    /// The raw 32-byte hash.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 8 hex characters, for logs and debug output.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse a full 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| TypeError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.short_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; 32]> for ObjectId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(ObjectId::digest(b"hello"), ObjectId::digest(b"hello"));
        assert_ne!(ObjectId::digest(b"hello"), ObjectId::digest(b"world"));
    }

    #[test]
    fn short_hex_is_prefix_of_display() {
        let id = ObjectId::digest(b"prefix");
        assert_eq!(id.short_hex().len(), 8);
        assert!(id.to_string().starts_with(&id.short_hex()));
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        let err = ObjectId::from_hex("abcd").unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidLength {
                expected: 32,
                actual: 2
            }
        );
    }

    #[test]
    fn from_hex_rejects_garbage() {
        assert!(matches!(
            "zz".parse::<ObjectId>(),
            Err(TypeError::InvalidHex(_))
        ));
    }

    #[test]
    fn ordering_follows_bytes() {
        assert!(ObjectId::from_hash([0; 32]) < ObjectId::from_hash([1; 32]));
    }

    proptest! {
        #[test]
        fn hex_parse_inverts_display(bytes in proptest::array::uniform32(any::<u8>())) {
            let id = ObjectId::from_hash(bytes);
            prop_assert_eq!(id.to_string().parse::<ObjectId>().unwrap(), id);
        }
    }
}
