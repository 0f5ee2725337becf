use std::collections::HashSet;

use crate::engine::{State, TaskGraph, TaskId};
use crate::error::{Error, Result};

/// A single invocable unit produced by a [`Walk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Register the task, move it to `Running` and run its `pre` hook.
    Enter(TaskId),
    /// Run the `run` and `post` hooks and move the task to `Complete`.
    Exit(TaskId),
}

impl Step {
    pub fn id(&self) -> TaskId {
        match self {
            Step::Enter(id) | Step::Exit(id) => *id,
        }
    }
}

struct Frame {
    id: TaskId,
    next: usize,
}

/// Lazy, pre-order depth-first walk over a task and its descendants.
///
/// The walk never looks further ahead than the step it returns, so a step
/// has to be invoked before the next one is requested. This is what allows
/// a task to add children in its `pre` hook and have them visited right
/// after.
///
/// Each entered task is kept on a stack until its exit step is produced.
/// Reaching a task which is still on the stack means the graph has a cycle.
pub struct Walk {
    root: Option<TaskId>,
    stack: Vec<Frame>,
    on_stack: HashSet<TaskId>,
}

impl Walk {
    pub fn new(root: TaskId) -> Self {
        Self {
            root: Some(root),
            stack: Vec::new(),
            on_stack: HashSet::new(),
        }
    }

    fn enter(&mut self, id: TaskId) -> Step {
        self.stack.push(Frame { id, next: 0 });
        self.on_stack.insert(id);
        Step::Enter(id)
    }

    /// Produces the next step, or `None` once the root has been exited.
    ///
    /// Children already complete are not entered, they get recorded in the
    /// parent's `completed_children` instead.
    pub fn next_step(&mut self, graph: &mut TaskGraph) -> Result<Option<Step>> {
        if let Some(root) = self.root.take() {
            let node = &graph[root];
            return match node.state()? {
                State::Unstarted => Ok(Some(self.enter(root))),
                State::Complete => {
                    tracing::debug!(task = %node.ident(), "already complete");
                    Ok(None)
                }
                State::Running => Err(Error::CircularDependency(node.key().to_string())),
            };
        }

        loop {
            let Some(frame) = self.stack.last_mut() else {
                return Ok(None);
            };

            let parent = frame.id;
            let Some(&child) = graph[parent].children().get(frame.next) else {
                self.stack.pop();
                self.on_stack.remove(&parent);
                return Ok(Some(Step::Exit(parent)));
            };

            frame.next += 1;

            let node = &graph[child];
            if self.on_stack.contains(&child) {
                return Err(Error::CircularDependency(node.key().to_string()));
            }

            match node.state()? {
                State::Unstarted => return Ok(Some(self.enter(child))),
                State::Complete => {
                    let ident = node.ident();
                    tracing::debug!(task = %ident, parent = %graph[parent].key(), "skipping completed dependency");
                    graph
                        .node_mut(parent)
                        .completed_children
                        .insert(ident, child);
                }
                // Left running by another walk which has not finished it.
                State::Running => {
                    return Err(Error::CircularDependency(node.key().to_string()));
                }
            }
        }
    }
}
