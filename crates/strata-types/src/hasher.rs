use crate::object::ObjectId;

/// Domain-separated BLAKE3 content hasher.
///
/// Each object kind hashes under its own domain tag, so a contents blob and
/// a node with identical bytes never share an address.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for leaf contents.
    pub const CONTENTS: Self = Self {
        domain: "strata-contents-v1",
    };
    /// Hasher for tree nodes.
    pub const NODE: Self = Self {
        domain: "strata-node-v1",
    };
    /// Hasher for commits.
    pub const COMMIT: Self = Self {
        domain: "strata-commit-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes under this hasher's domain.
    pub fn hash(&self, data: &[u8]) -> ObjectId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        ObjectId::from_hash(*hasher.finalize().as_bytes())
    }

    /// Returns `true` if `data` hashes to `expected` under this domain.
    pub fn verify(&self, data: &[u8], expected: &ObjectId) -> bool {
        self.hash(data) == *expected
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}
