//! Cache key derivation.
//!
//! A key is derived from the literal SQL text; with digesting enabled it is
//! the lowercase hex SHA-256 of the text, which normalizes key size for
//! arbitrarily long statements. Bind values are NOT part of the key by
//! default: two calls with the same SQL template but different binds collide.
//! Callers can opt in to folding binds into the key via
//! [`CacheKey::with_binds`].

use std::fmt;

use sha2::{Digest, Sha256};

use crate::connector::Bind;

/// Deterministic identifier for a submitted query, used to index both cached
/// results and in-flight executions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key from SQL text alone (the default policy).
    pub fn new(sql_text: &str, digest: bool) -> Self {
        Self::with_binds(sql_text, None, digest)
    }

    /// Key from SQL text plus a canonical serialization of the binds.
    pub fn with_binds(sql_text: &str, binds: Option<&[Bind]>, digest: bool) -> Self {
        if digest {
            let mut hasher = Sha256::new();
            hasher.update(sql_text.as_bytes());
            if let Some(binds) = binds {
                for bind in binds {
                    hasher.update([0u8]);
                    hasher.update(bind.canonical().as_bytes());
                }
            }
            Self(format!("{:x}", hasher.finalize()))
        } else {
            match binds {
                None => Self(sql_text.to_string()),
                Some(binds) => {
                    let mut key = sql_text.to_string();
                    for bind in binds {
                        key.push('\u{1f}');
                        key.push_str(&bind.canonical());
                    }
                    Self(key)
                }
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Backend storage key: prefixed and URL-encoded so raw SQL text cannot
    /// conflict with the key namespace separator.
    pub fn storage_key(&self, prefix: &str) -> String {
        format!("{}q:{}", prefix, urlencoding::encode(&self.0))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
