//! Filters and the registry they are looked up in.
//!
//! A filter transforms the output of one stage into the output of the next.
//! Filters are registered under one or more short aliases, which is how the
//! document key grammar refers to them: `notes.md|markdown|toc` applies the
//! filter aliased `markdown` and then the one aliased `toc`.
mod builtin;

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::Args;
use crate::data::{Content, Data};
use crate::error::{Error, Result};

pub use builtin::{Identity, KeyValueLines, OutputAbc, ProcessText};

/// Matches any extension when used in [`Filter::input_extensions`] or, in
/// [`Filter::output_extensions`], keeps the input extension.
pub const WILDCARD: &str = ".*";

fn is_wildcard(ext: &str) -> bool {
    ext == WILDCARD || ext == "*"
}

/// A transformation applied at one stage of a document pipeline.
pub trait Filter: Send + Sync {
    /// Aliases this filter is registered under. Must not be empty.
    fn aliases(&self) -> &[&'static str];

    /// Extensions this filter can consume, e.g. `.txt`.
    fn input_extensions(&self) -> &[&'static str] {
        &[WILDCARD]
    }

    /// Extensions this filter can produce, in order of preference.
    fn output_extensions(&self) -> &[&'static str] {
        &[WILDCARD]
    }

    /// Transforms the input. `config` is the filter-specific configuration
    /// taken from the document's arguments.
    fn process(&self, input: &Data, config: &Args) -> anyhow::Result<Content>;

    /// Whether data with extension `ext` is accepted as input.
    fn accepts(&self, ext: &str) -> bool {
        self.input_extensions()
            .iter()
            .any(|candidate| is_wildcard(candidate) || *candidate == ext)
    }

    /// Concrete extensions this filter can produce from input with extension
    /// `input_ext`, in order of preference. Wildcards become `input_ext`.
    fn output_candidates(&self, input_ext: &str) -> Vec<String> {
        self.output_extensions()
            .iter()
            .map(|ext| {
                if is_wildcard(ext) {
                    input_ext.to_string()
                } else {
                    ext.to_string()
                }
            })
            .collect()
    }

    /// Picks the extension of this filter's output given the extension of
    /// its input and, if known, the filter that will consume the output.
    fn output_extension(&self, input_ext: &str, next: Option<&dyn Filter>) -> String {
        let candidates = self.output_candidates(input_ext);

        next.and_then(|next| candidates.iter().find(|ext| next.accepts(ext)))
            .or_else(|| candidates.first())
            .cloned()
            .unwrap_or_else(|| input_ext.to_string())
    }
}

/// Immutable lookup from alias to filter, built once before anything runs.
#[derive(Default)]
pub struct FilterRegistry {
    filters: Vec<Arc<dyn Filter>>,
    aliases: HashMap<&'static str, usize>,
}

impl FilterRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Registry holding every filter shipped with the crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::default();

        for filter in builtin::all() {
            let index = registry.filters.len();
            for &alias in filter.aliases() {
                registry.aliases.insert(alias, index);
            }
            registry.filters.push(filter);
        }

        registry
    }

    /// Finds the filter registered under `alias`, falling back to its
    /// lower-cased form.
    pub fn get(&self, alias: &str) -> Result<Arc<dyn Filter>> {
        if alias.is_empty() {
            return Err(Error::BlankAlias);
        }

        self.aliases
            .get(alias)
            .or_else(|| self.aliases.get(alias.to_lowercase().as_str()))
            .map(|&index| self.filters[index].clone())
            .ok_or_else(|| {
                let mut known: Vec<_> = self.aliases.keys().copied().collect();
                known.sort_unstable();
                Error::feedback(format!(
                    "No filter found for alias '{alias}'. Available filters: {}",
                    known.join(", ")
                ))
            })
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.get(alias).is_ok()
    }

    /// All registered aliases, sorted.
    pub fn aliases(&self) -> Vec<&'static str> {
        let mut aliases: Vec<_> = self.aliases.keys().copied().collect();
        aliases.sort_unstable();
        aliases
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl std::fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterRegistry")
            .field("aliases", &self.aliases())
            .finish()
    }
}

/// Collects filters for a [`FilterRegistry`].
#[derive(Default)]
pub struct RegistryBuilder {
    filters: Vec<Arc<dyn Filter>>,
}

impl RegistryBuilder {
    pub fn register(mut self, filter: impl Filter + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Adds every filter shipped with the crate.
    pub fn builtins(mut self) -> Self {
        self.filters.extend(builtin::all());
        self
    }

    /// Freezes the registry. Fails if a filter has no alias or if two
    /// filters claim the same one.
    pub fn build(self) -> Result<FilterRegistry> {
        let mut aliases = HashMap::new();

        for (index, filter) in self.filters.iter().enumerate() {
            if filter.aliases().is_empty() {
                return Err(Error::feedback(format!(
                    "Filter #{index} was registered without any alias"
                )));
            }

            for &alias in filter.aliases() {
                if alias.is_empty() {
                    return Err(Error::BlankAlias);
                }
                if aliases.insert(alias, index).is_some() {
                    return Err(Error::feedback(format!(
                        "Filter alias '{alias}' is registered more than once"
                    )));
                }
            }
        }

        tracing::debug!(filters = self.filters.len(), "filter registry built");

        Ok(FilterRegistry {
            filters: self.filters,
            aliases,
        })
    }
}
