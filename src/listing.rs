//! Listing files matching a pattern, used by pattern documents to discover
//! what documents to create.
use camino::{Utf8Path, Utf8PathBuf};
use glob::{MatchOptions, Pattern, glob_with};

use crate::error::Result;

const OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

/// Source of file names for pattern documents.
pub trait FileLister: Send + Sync {
    /// Names matching `pattern`, relative to wherever the lister is rooted,
    /// in a stable order.
    fn list_matching(&self, pattern: &str) -> Result<Vec<Utf8PathBuf>>;
}

/// Lists files on disk below a base directory.
#[derive(Debug, Clone)]
pub struct GlobLister {
    base: Utf8PathBuf,
}

impl GlobLister {
    pub fn new(base: impl Into<Utf8PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Utf8Path {
        &self.base
    }
}

impl FileLister for GlobLister {
    fn list_matching(&self, pattern: &str) -> Result<Vec<Utf8PathBuf>> {
        let full = self.base.join(pattern);
        let mut paths = Vec::new();

        for path in glob_with(full.as_str(), OPTIONS)? {
            let path = Utf8PathBuf::try_from(path?)?;
            if path.is_dir() {
                continue;
            }

            let relative = path
                .strip_prefix(&self.base)
                .map(Utf8Path::to_path_buf)
                .unwrap_or(path);
            paths.push(relative);
        }

        tracing::debug!(pattern = %full, found = paths.len(), "listed files");
        Ok(paths)
    }
}

/// Lists from a fixed set of names, useful when documents don't live on
/// disk.
#[derive(Debug, Clone, Default)]
pub struct StaticLister {
    paths: Vec<Utf8PathBuf>,
}

impl StaticLister {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }
}

impl FileLister for StaticLister {
    fn list_matching(&self, pattern: &str) -> Result<Vec<Utf8PathBuf>> {
        let pattern = Pattern::new(pattern)?;

        Ok(self
            .paths
            .iter()
            .filter(|path| pattern.matches_with(path.as_str(), OPTIONS))
            .cloned()
            .collect())
    }
}
