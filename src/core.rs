use std::sync::Arc;

use camino::Utf8PathBuf;

use crate::filter::FilterRegistry;
use crate::listing::{FileLister, GlobLister};

/// Configuration mapping attached to every task, string keys to JSON values.
///
/// Entries keyed by a filter alias hold the configuration handed to that
/// filter when a stage applies it.
pub type Args = serde_json::Map<String, serde_json::Value>;

/// A 32-byte BLAKE3 hash used to fingerprint document contents.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Hash32([u8; 32]);

impl<T> From<T> for Hash32
where
    T: Into<[u8; 32]>,
{
    fn from(value: T) -> Self {
        Hash32(value.into())
    }
}

impl Hash32 {
    pub(crate) fn hash(buffer: impl AsRef<[u8]>) -> Self {
        blake3::Hasher::new()
            .update(buffer.as_ref())
            .finalize()
            .into()
    }

    pub fn to_hex(self) -> String {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        let mut acc = String::with_capacity(64);

        for byte in self.0 {
            acc.push(HEX[(byte >> 4) as usize] as char);
            acc.push(HEX[(byte & 0xF) as usize] as char);
        }

        acc
    }
}

impl std::fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash32({})", self.to_hex())
    }
}

/// Build settings shared by every task in a run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory against which document names are read and file patterns
    /// are listed.
    pub base_dir: Utf8PathBuf,
    /// Where key-value outputs get saved, if anywhere.
    pub artifacts: Option<Utf8PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_dir: Utf8PathBuf::from("."),
            artifacts: None,
        }
    }
}

/// Everything a task can reach besides the task graph itself.
///
/// The registry is built once before the run and never changes afterwards,
/// the file lister is only consulted by pattern documents.
#[derive(Clone)]
pub struct Environment {
    pub registry: Arc<FilterRegistry>,
    pub lister: Arc<dyn FileLister>,
    pub config: Config,
}

impl Environment {
    pub fn new(registry: Arc<FilterRegistry>, config: Config) -> Self {
        Self {
            registry,
            lister: Arc::new(GlobLister::new(config.base_dir.clone())),
            config,
        }
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_hex() {
        let hash = Hash32::hash("these are the contents");
        let hex = hash.to_hex();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, Hash32::hash("these are the contents"));
        assert_ne!(hash, Hash32::hash("other contents"));
    }
}
