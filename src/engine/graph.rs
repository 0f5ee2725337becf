use std::collections::HashMap;
use std::ops::Index;
use std::sync::Arc;

use petgraph::Graph;

use crate::core::Args;
use crate::engine::{Hooks, Kind, Node, Noop, TaskId};

/// Arena owning every task of a run.
///
/// Tasks are interned by their variant and key: inserting a task whose
/// identity is already present returns the existing task instead. This is
/// what makes two documents sharing a leading run of filters share the very
/// same stage tasks.
///
/// Parent-child links are mirrored as graph edges, which is what the
/// [`Display`](std::fmt::Display) implementation renders.
#[derive(Debug, Default)]
pub struct TaskGraph {
    graph: Graph<Node, ()>,
    index: HashMap<String, TaskId>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `node` unless a task with the same identity exists, in which
    /// case that task is returned and `node` is dropped.
    pub(crate) fn insert(&mut self, node: Node) -> TaskId {
        let ident = node.ident();

        if let Some(&id) = self.index.get(&ident) {
            if self.graph[id.0].differs_from(&node) {
                tracing::warn!(
                    task = %ident,
                    "task redefined with different arguments or inputs, keeping the first definition"
                );
            } else {
                tracing::debug!(task = %ident, "reusing existing task");
            }
            return id;
        }

        let children = node.children.clone();
        let id = TaskId(self.graph.add_node(node));

        for child in children {
            self.graph.add_edge(id.0, child.0, ());
        }

        self.index.insert(ident, id);
        id
    }

    pub(crate) fn node_mut(&mut self, id: TaskId) -> &mut Node {
        &mut self.graph[id.0]
    }

    pub fn get(&self, id: TaskId) -> Option<&Node> {
        self.graph.node_weight(id.0)
    }

    /// Looks a task up by its variant tag and key.
    pub fn find(&self, tag: &str, key: &str) -> Option<TaskId> {
        self.index.get(&format!("{tag}:{key}")).copied()
    }

    pub fn push_child(&mut self, parent: TaskId, child: TaskId) {
        self.graph[parent.0].children.push(child);
        self.graph.add_edge(parent.0, child.0, ());
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.graph.node_indices().map(TaskId)
    }

    /// Starts defining a plain task.
    pub fn task(&mut self, key: impl Into<String>) -> TaskDef<'_> {
        TaskDef {
            graph: self,
            key: key.into(),
            args: Args::new(),
            children: Vec::new(),
            hooks: None,
        }
    }
}

impl Index<TaskId> for TaskGraph {
    type Output = Node;

    fn index(&self, id: TaskId) -> &Self::Output {
        &self.graph[id.0]
    }
}

impl std::fmt::Display for TaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "graph LR")?;

        for index in self.graph.node_indices() {
            let node = &self.graph[index];
            let name = node.ident().replace('"', "\\\"");
            writeln!(f, "    {:?}[\"{}\"]", index.index(), name)?;
        }

        for edge in self.graph.edge_indices() {
            if let Some((source, target)) = self.graph.edge_endpoints(edge) {
                writeln!(f, "    {:?} --> {:?}", source.index(), target.index())?;
            }
        }

        Ok(())
    }
}

/// Builder for a plain task with custom hooks.
pub struct TaskDef<'a> {
    graph: &'a mut TaskGraph,
    key: String,
    args: Args,
    children: Vec<TaskId>,
    hooks: Option<Arc<dyn Hooks>>,
}

impl<'a> TaskDef<'a> {
    pub fn hooks(mut self, hooks: impl Hooks + 'static) -> Self {
        self.hooks = Some(Arc::new(hooks));
        self
    }

    pub fn child(mut self, child: TaskId) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = TaskId>) -> Self {
        self.children.extend(children);
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

    pub fn finish(self) -> TaskId {
        let hooks = self.hooks.unwrap_or_else(|| Arc::new(Noop));
        let node = Node::new(self.key, self.args, Kind::Task(hooks)).with_children(self.children);
        self.graph.insert(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kwargs() {
        let mut graph = TaskGraph::new();
        let id = graph.task("key").arg("foo", "bar").arg("abc", "def").finish();

        let node = &graph[id];
        assert_eq!(node.args()["foo"], "bar");
        assert_eq!(node.args()["abc"], "def");
    }

    #[test]
    fn test_same_identity_is_interned() {
        let mut graph = TaskGraph::new();
        let a = graph.task("key").finish();
        let b = graph.task("key").finish();
        let c = graph.task("other").finish();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.find("Task", "key"), Some(a));
        assert_eq!(graph.find("Doc", "key"), None);
    }

    #[test]
    fn test_redefinition_keeps_first() {
        let mut graph = TaskGraph::new();
        let dep = graph.task("dep").finish();
        let a = graph.task("key").arg("prefix", "A").finish();
        let b = graph.task("key").arg("prefix", "B").child(dep).finish();

        assert_eq!(a, b);
        assert_eq!(graph[a].args()["prefix"], "A");
        assert!(graph[a].children().is_empty());
    }

    #[test]
    fn test_children_keep_order() {
        let mut graph = TaskGraph::new();
        let a = graph.task("a").finish();
        let b = graph.task("b").finish();
        let parent = graph.task("parent").child(b).child(a).finish();
        let c = graph.task("c").finish();
        graph.push_child(parent, c);

        assert_eq!(graph[parent].children(), &[b, a, c]);
    }

    #[test]
    fn test_display_mermaid() {
        let mut graph = TaskGraph::new();
        let child = graph.task("child").finish();
        graph.task("parent").child(child).finish();

        let text = graph.to_string();
        assert!(text.starts_with("graph LR"));
        assert!(text.contains("0[\"Task:child\"]"));
        assert!(text.contains("1 --> 0"));
    }
}
