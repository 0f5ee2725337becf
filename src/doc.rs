//! Documents and the key grammar describing them.
//!
//! A document key names an input and the filters to apply to it, separated
//! by pipes: `<name>(|<alias>)*`. The document is built as a chain of stage
//! tasks, one per link, and its output is the output of the last one.
//!
//! Every stage is keyed by the document key up to and including that stage,
//! so `abc.txt|dexy|processtext` is made of the stages `abc.txt`,
//! `abc.txt|dexy` and `abc.txt|dexy|processtext`. Documents which start with
//! the same filters share those stages and they only run once.
use std::sync::Arc;

use crate::core::Args;
use crate::engine::{Hooks, Kind, Node, TaskContext, TaskGraph, TaskId};
use crate::error::{Error, Result};
use crate::stage::{FilterStage, InitialStage, Source};

/// A document key split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocKey {
    pub name: String,
    pub filters: Vec<String>,
}

impl DocKey {
    pub fn parse(key: &str) -> Result<Self> {
        let mut parts = key.split('|');
        let name = parts.next().unwrap_or_default();

        if name.is_empty() {
            return Err(Error::feedback(format!(
                "Document key '{key}' has no name before the first '|'"
            )));
        }

        let filters: Vec<String> = parts.map(str::to_string).collect();

        if filters.iter().any(String::is_empty) {
            return Err(Error::feedback(format!(
                "Document key '{key}' contains an empty filter alias, check for a trailing or doubled '|'"
            )));
        }

        Ok(Self {
            name: name.to_string(),
            filters,
        })
    }

    /// Key of the stage after applying the first `n` filters.
    pub fn stage_key(&self, n: usize) -> String {
        let mut key = self.name.clone();
        for alias in &self.filters[..n] {
            key.push('|');
            key.push_str(alias);
        }
        key
    }
}

/// A document, the parent of its stage chain.
#[derive(Debug)]
pub struct Doc {
    name: String,
    filters: Vec<String>,
    last_stage: TaskId,
}

impl Doc {
    /// Name of the input, the part of the key before the first pipe.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Filter aliases in the order they are applied.
    pub fn filters(&self) -> &[String] {
        &self.filters
    }

    /// The stage whose output is this document's output.
    pub fn last_stage(&self) -> TaskId {
        self.last_stage
    }
}

impl Hooks for Doc {
    fn run(&self, cx: &mut TaskContext<'_>) -> Result<()> {
        let output = cx.output_of(self.last_stage).ok_or_else(|| {
            Error::MissingOutput(
                cx.key().to_string(),
                cx.node(self.last_stage).key().to_string(),
            )
        })?;

        cx.set_output(output);
        Ok(())
    }
}

impl TaskGraph {
    /// Starts defining a document with the given key.
    pub fn doc(&mut self, key: impl Into<String>) -> DocDef<'_> {
        DocDef {
            graph: self,
            key: key.into(),
            args: Args::new(),
            source: Source::File,
            deps: Vec::new(),
        }
    }
}

/// Builder for a [`Doc`] and its stages.
///
/// Without [`contents`](DocDef::contents) or [`sections`](DocDef::sections)
/// the document is read from the file it names.
pub struct DocDef<'a> {
    graph: &'a mut TaskGraph,
    key: String,
    args: Args,
    source: Source,
    deps: Vec<TaskId>,
}

impl<'a> DocDef<'a> {
    pub fn contents(mut self, text: impl Into<String>) -> Self {
        self.source = Source::Text(text.into());
        self
    }

    pub fn sections<I, K, V>(mut self, sections: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.source = Source::Sections(
            sections
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    pub fn source(mut self, source: Source) -> Self {
        self.source = source;
        self
    }

    /// Adds a task which has to complete before the first stage runs.
    pub fn depends_on(mut self, dep: TaskId) -> Self {
        self.deps.push(dep);
        self
    }

    pub fn arg(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    pub fn args(mut self, args: Args) -> Self {
        self.args.extend(args);
        self
    }

    /// Parses the key, inserts the stage chain and the document itself.
    pub fn finish(self) -> Result<TaskId> {
        let DocDef {
            graph,
            key,
            args,
            source,
            deps,
        } = self;

        let parsed = DocKey::parse(&key)?;

        let initial = InitialStage::new(&parsed.name, source);
        let initial = Node::new(&parsed.name, args.clone(), Kind::Initial(Arc::new(initial)));

        // Shared stages are only linked once nothing in the chain conflicts.
        for (i, next) in parsed.filters.iter().enumerate().skip(1) {
            if let Some(id) = graph.find("FilterStage", &parsed.stage_key(i)) {
                graph[id].check_next_filter(next)?;
            }
        }

        let mut prior = graph.insert(initial);
        let mut chain = vec![prior];

        for (i, alias) in parsed.filters.iter().enumerate() {
            let next = parsed.filters.get(i + 1).cloned();
            let stage = FilterStage::new(prior, alias, next.clone());
            let node = Node::new(
                parsed.stage_key(i + 1),
                args.clone(),
                Kind::Filter(Arc::new(stage)),
            );

            prior = graph.insert(node);
            if let Some(next) = next {
                graph.node_mut(prior).link_next_filter(&next)?;
            }
            chain.push(prior);
        }

        let doc = Doc {
            name: parsed.name,
            filters: parsed.filters,
            last_stage: prior,
        };

        let children = deps.into_iter().chain(chain).collect();
        let node = Node::new(key, args, Kind::Doc(Arc::new(doc))).with_children(children);

        Ok(graph.insert(node))
    }
}
