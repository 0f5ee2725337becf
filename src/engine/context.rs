use std::sync::Arc;

use crate::core::{Args, Config, Environment};
use crate::data::Data;
use crate::engine::{Node, TaskDef, TaskGraph, TaskId};
use crate::filter::FilterRegistry;
use crate::listing::FileLister;

/// The context passed to every hook.
///
/// It gives a hook access to its own task, to the rest of the graph (so new
/// tasks can be created and attached as children) and to the environment
/// shared by the whole run.
pub struct TaskContext<'a> {
    id: TaskId,
    graph: &'a mut TaskGraph,
    env: &'a Environment,
}

impl<'a> TaskContext<'a> {
    pub(crate) fn new(id: TaskId, graph: &'a mut TaskGraph, env: &'a Environment) -> Self {
        Self { id, graph, env }
    }

    /// Identifier of the task whose hook is running.
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn key(&self) -> &str {
        self.graph[self.id].key()
    }

    pub fn args(&self) -> &Args {
        self.graph[self.id].args()
    }

    pub fn children(&self) -> &[TaskId] {
        self.graph[self.id].children()
    }

    pub fn node(&self, id: TaskId) -> &Node {
        &self.graph[id]
    }

    /// Output of another task, shared rather than copied.
    pub fn output_of(&self, id: TaskId) -> Option<Arc<Data>> {
        self.graph[id].output.clone()
    }

    pub fn set_output(&mut self, data: impl Into<Arc<Data>>) {
        self.graph.node_mut(self.id).output = Some(data.into());
    }

    /// Appends a child to the running task. Children appended during `pre`
    /// are walked before `run`.
    pub fn push_child(&mut self, child: TaskId) {
        self.graph.push_child(self.id, child);
    }

    /// Starts defining a new plain task in the graph.
    pub fn task(&mut self, key: impl Into<String>) -> TaskDef<'_> {
        self.graph.task(key)
    }

    pub fn graph(&self) -> &TaskGraph {
        &*self.graph
    }

    pub fn graph_mut(&mut self) -> &mut TaskGraph {
        &mut *self.graph
    }

    pub fn registry(&self) -> &FilterRegistry {
        &self.env.registry
    }

    pub fn lister(&self) -> &dyn FileLister {
        self.env.lister.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.env.config
    }
}
