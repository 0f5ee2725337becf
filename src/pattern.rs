//! Documents created from a file pattern.
//!
//! A pattern document has a key like `*.txt|dexy`. It has no children of its
//! own until it runs: its `pre` hook lists the files matching the pattern and
//! appends one [`Doc`](crate::Doc) per match, each with the same filters and
//! arguments, which the walk then visits in listing order.
use std::sync::Arc;

use crate::core::Args;
use crate::doc::DocKey;
use crate::engine::{Hooks, Kind, Node, TaskContext, TaskGraph, TaskId};
use crate::error::Result;

#[derive(Debug)]
pub struct PatternDoc {
    file_pattern: String,
    filter_aliases: Vec<String>,
}

impl PatternDoc {
    pub fn file_pattern(&self) -> &str {
        &self.file_pattern
    }

    pub fn filter_aliases(&self) -> &[String] {
        &self.filter_aliases
    }

    /// Key of the document created for a matched file.
    fn doc_key(&self, name: &str) -> String {
        let mut key = name.to_string();
        for alias in &self.filter_aliases {
            key.push('|');
            key.push_str(alias);
        }
        key
    }
}

impl Hooks for PatternDoc {
    fn pre(&self, cx: &mut TaskContext<'_>) -> Result<()> {
        let matches = cx.lister().list_matching(&self.file_pattern)?;
        let args = cx.args().clone();

        tracing::debug!(
            pattern = %self.file_pattern,
            found = matches.len(),
            "expanding pattern document"
        );

        for name in matches {
            let doc = cx
                .graph_mut()
                .doc(self.doc_key(name.as_str()))
                .args(args.clone())
                .finish()?;
            cx.push_child(doc);
        }

        Ok(())
    }
}

impl TaskGraph {
    /// Starts defining a pattern document with the given key.
    pub fn pattern(&mut self, key: impl Into<String>) -> PatternDef<'_> {
        PatternDef {
            graph: self,
            key: key.into(),
            args: Args::new(),
        }
    }
}

/// Builder for a [`PatternDoc`].
pub struct PatternDef<'a> {
    graph: &'a mut TaskGraph,
    key: String,
    args: Args,
}

impl<'a> PatternDef<'a> {
    pub fn arg(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    pub fn args(mut self, args: Args) -> Self {
        self.args.extend(args);
        self
    }

    pub fn finish(self) -> Result<TaskId> {
        let parsed = DocKey::parse(&self.key)?;
        let pattern = PatternDoc {
            file_pattern: parsed.name,
            filter_aliases: parsed.filters,
        };

        let node = Node::new(self.key, self.args, Kind::Pattern(Arc::new(pattern)));
        Ok(self.graph.insert(node))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::Runner;
    use crate::filter::FilterRegistry;
    use crate::listing::StaticLister;

    fn runner(files: &[&str]) -> Runner {
        Runner::new(Arc::new(FilterRegistry::with_builtins()))
            .with_lister(StaticLister::new(files.iter().copied()))
    }

    fn child_keys(runner: &Runner, id: TaskId) -> Vec<String> {
        runner
            .node(id)
            .children()
            .iter()
            .map(|&child| runner.node(child).key().to_string())
            .collect()
    }

    #[test]
    fn test_parse() {
        let mut runner = runner(&[]);
        let id = runner.pattern("*.txt|dexy|processtext").finish().unwrap();

        let pattern = runner.node(id).as_pattern().unwrap();
        assert_eq!(pattern.file_pattern(), "*.txt");
        assert_eq!(pattern.filter_aliases(), ["dexy", "processtext"]);
        assert!(runner.node(id).children().is_empty());
    }

    #[test]
    fn test_blank_alias() {
        let mut runner = runner(&[]);
        let err = runner.pattern("*.txt|").finish().unwrap_err();
        assert!(err.is_user_feedback());
    }

    #[test]
    fn test_no_matches() {
        let mut runner = runner(&["a.md"]);
        let id = runner.pattern("*.txt|dexy").finish().unwrap();

        runner.add_root(id);
        runner.run().unwrap();

        assert!(runner.node(id).is_complete());
        assert!(runner.node(id).children().is_empty());
    }

    #[test]
    fn test_no_filters() {
        let mut runner = runner(&["a.txt", "b.txt"]);
        let id = runner.pattern("*.txt").finish().unwrap();

        let mut walk = runner.walk(id);
        // Entering runs `pre`, which is all that's needed to fan out.
        let step = runner.next_step(&mut walk).unwrap().unwrap();
        runner.invoke_step(step).unwrap();

        assert_eq!(child_keys(&runner, id), ["a.txt", "b.txt"]);
    }

    #[test]
    fn test_many_filters() {
        let mut runner = runner(&["b.txt", "a.txt", "c.md"]);
        let id = runner.pattern("*.txt|dexy|outputabc").finish().unwrap();
        let mut walk = runner.walk(id);
        let step = runner.next_step(&mut walk).unwrap().unwrap();
        runner.invoke_step(step).unwrap();

        assert_eq!(
            child_keys(&runner, id),
            ["b.txt|dexy|outputabc", "a.txt|dexy|outputabc"]
        );

        for &child in runner.node(id).children() {
            let doc = runner.node(child).as_doc().unwrap();
            assert_eq!(doc.filters(), ["dexy", "outputabc"]);
        }
    }

    #[test]
    fn test_args_inherited() {
        let mut runner = runner(&["a.txt"]);
        let id = runner
            .pattern("*.txt|processtext")
            .arg("processtext", json!({ "prefix": "> " }))
            .finish()
            .unwrap();
        let mut walk = runner.walk(id);
        let step = runner.next_step(&mut walk).unwrap().unwrap();
        runner.invoke_step(step).unwrap();

        let child = runner.node(id).children()[0];
        assert_eq!(runner.node(child).args()["processtext"]["prefix"], "> ");

        let stage = runner.node(child).children()[1];
        assert_eq!(runner.node(stage).args()["processtext"]["prefix"], "> ");
    }

    #[test]
    fn test_run_reads_matches() {
        let config = crate::Config {
            base_dir: "src".into(),
            artifacts: None,
        };
        let mut runner = Runner::with_config(Arc::new(FilterRegistry::with_builtins()), config);
        let id = runner.pattern("l*.rs|dexy").finish().unwrap();

        runner.add_root(id);
        runner.run().unwrap();

        let keys = child_keys(&runner, id);
        assert!(keys.contains(&"lib.rs|dexy".to_string()));
        assert!(keys.contains(&"listing.rs|dexy".to_string()));

        for &child in runner.node(id).children() {
            assert!(runner.node(child).is_complete());
            assert!(runner.output(child).is_some());
        }
    }
}
