//! The links of a document pipeline.
//!
//! The first link of every document is an [`InitialStage`] holding its raw
//! input. Each following link is a [`FilterStage`] which applies one filter
//! to the output of the link before it.
use std::fs;
use std::sync::Arc;

use camino::Utf8Path;
use serde_json::Value;

use crate::core::Args;
use crate::data::{Content, Data};
use crate::engine::{Hooks, Kind, TaskContext, TaskId};
use crate::error::{Error, Result};
use crate::filter::Filter;

/// Where the raw input of a document comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    /// Read from the file named by the document, below the configured base
    /// directory.
    File,
    /// Supplied text.
    Text(String),
    /// Supplied named sections.
    Sections(Vec<(String, String)>),
}

/// Extension of `name` including the leading dot, or empty.
pub(crate) fn extension(name: &str) -> String {
    Utf8Path::new(name)
        .extension()
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default()
}

/// Stage 0 of a document, producing its unfiltered input.
#[derive(Debug)]
pub struct InitialStage {
    name: String,
    source: Source,
}

impl InitialStage {
    pub(crate) fn new(name: impl Into<String>, source: Source) -> Self {
        Self {
            name: name.into(),
            source,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &Source {
        &self.source
    }
}

impl Hooks for InitialStage {
    fn run(&self, cx: &mut TaskContext<'_>) -> Result<()> {
        let content = match &self.source {
            Source::File => {
                let path = cx.config().base_dir.join(&self.name);
                let text = fs::read_to_string(&path).map_err(|e| Error::Read(path, e))?;
                Content::Text(text)
            }
            Source::Text(text) => Content::Text(text.clone()),
            Source::Sections(sections) => Content::Sections(sections.clone()),
        };

        cx.set_output(Data::new(&*self.name, extension(&self.name), content));
        Ok(())
    }
}

/// Stage `i >= 1` of a document, applying one filter to the output of the
/// stage before it.
#[derive(Debug, Clone)]
pub struct FilterStage {
    prior: TaskId,
    filter_alias: String,
    next_filter_alias: Option<String>,
}

impl FilterStage {
    pub(crate) fn new(
        prior: TaskId,
        filter_alias: impl Into<String>,
        next_filter_alias: Option<String>,
    ) -> Self {
        Self {
            prior,
            filter_alias: filter_alias.into(),
            next_filter_alias,
        }
    }

    /// The stage whose output this one consumes.
    pub fn prior(&self) -> TaskId {
        self.prior
    }

    /// Alias of the filter this stage applies.
    pub fn filter_alias(&self) -> &str {
        &self.filter_alias
    }

    /// Alias of the filter the following stage applies, if any.
    pub fn next_filter_alias(&self) -> Option<&str> {
        self.next_filter_alias.as_deref()
    }

    /// Copy of this stage followed by the filter aliased `alias`.
    pub(crate) fn with_next(&self, alias: impl Into<String>) -> Self {
        Self {
            next_filter_alias: Some(alias.into()),
            ..self.clone()
        }
    }

    /// Makes sure `filter` can consume `input`.
    ///
    /// A prior stage shared with other documents may have picked an
    /// extension for a different successor, or before this one was linked.
    /// Its filter's other output extensions are tried before giving up.
    fn accept_input(
        &self,
        cx: &TaskContext<'_>,
        filter: &dyn Filter,
        input: Arc<Data>,
    ) -> Result<Arc<Data>> {
        if filter.accepts(input.ext()) {
            return Ok(input);
        }

        if let Kind::Filter(prior) = cx.node(self.prior).kind() {
            let producer = cx.registry().get(prior.filter_alias())?;
            let source_ext = cx
                .output_of(prior.prior())
                .map(|data| data.ext().to_string())
                .unwrap_or_default();

            let ext = producer
                .output_candidates(&source_ext)
                .into_iter()
                .find(|ext| filter.accepts(ext));

            if let Some(ext) = ext {
                tracing::debug!(stage = %cx.key(), from = %input.ext(), to = %ext, "relabeled input");
                return Ok(Arc::new(Data::new(input.key(), ext, input.content().clone())));
            }
        }

        Err(Error::feedback(format!(
            "Filter '{}' in '{}' can't process '{}' files, it accepts {}",
            self.filter_alias,
            cx.key(),
            input.ext(),
            filter.input_extensions().join(", ")
        )))
    }

    /// The filter configuration found under this stage's alias.
    fn filter_config(&self, args: &Args) -> Result<Args> {
        match args.get(&self.filter_alias) {
            None | Some(Value::Null) => Ok(Args::new()),
            Some(Value::Object(config)) => Ok(config.clone()),
            Some(other) => Err(Error::feedback(format!(
                "Configuration for filter '{}' has to be a mapping, got {other}",
                self.filter_alias
            ))),
        }
    }
}

impl Hooks for FilterStage {
    fn run(&self, cx: &mut TaskContext<'_>) -> Result<()> {
        let key = cx.key().to_string();
        let alias = self.filter_alias.as_str();
        let filter = cx.registry().get(alias)?;

        let input = cx.output_of(self.prior).ok_or_else(|| {
            Error::MissingOutput(key.clone(), cx.node(self.prior).key().to_string())
        })?;

        let input = self.accept_input(cx, filter.as_ref(), input)?;

        let config = self.filter_config(cx.args())?;
        let content = filter
            .process(&input, &config)
            .map_err(|e| Error::from_filter(alias, &key, e))?;

        let next = match self.next_filter_alias() {
            Some(next) => Some(cx.registry().get(next)?),
            None => None,
        };
        let ext = filter.output_extension(input.ext(), next.as_deref());

        let data = Data::new(key, ext, content);

        if let (Some(kv), Some(dir)) = (data.key_value(), &cx.config().artifacts) {
            let path = kv.save(dir, &data.hash().to_hex())?;
            tracing::debug!(stage = %data.key(), path = %path, "saved key-value output");
        }

        cx.set_output(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension() {
        assert_eq!(extension("abc.txt"), ".txt");
        assert_eq!(extension("dir/notes.tar.gz"), ".gz");
        assert_eq!(extension("Makefile"), "");
    }

    #[test]
    fn test_filter_config() {
        let stage = FilterStage::new(
            TaskId(petgraph::graph::NodeIndex::new(0)),
            "processtext",
            None,
        );

        let mut args = Args::new();
        assert!(stage.filter_config(&args).unwrap().is_empty());

        args.insert("processtext".into(), serde_json::json!({ "prefix": "> " }));
        assert_eq!(stage.filter_config(&args).unwrap()["prefix"], "> ");

        args.insert("processtext".into(), serde_json::json!("oops"));
        assert!(stage.filter_config(&args).unwrap_err().is_user_feedback());
    }
}
