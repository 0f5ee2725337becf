//! The generic task engine.
//!
//! A [`Node`] is a unit of work with ordered children and a three-state
//! lifecycle. Nodes live in a [`TaskGraph`] arena and refer to each other by
//! [`TaskId`], which lets the same node appear as a child of many parents.
//! The graph is therefore not a tree, and is only required to be acyclic at
//! the moment it is walked.
//!
//! ## Lifecycle
//!
//! Every node goes through `Unstarted -> Running -> Complete`, never
//! backwards and never skipping a state. Walking a node enters it (running
//! its `pre` hook), walks each child which isn't complete yet, then exits it
//! (running `run` and `post`). Children found already complete are recorded
//! in the parent's `completed_children` instead of being run again.
mod context;
mod graph;
mod runner;
mod walk;

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;

use petgraph::graph::NodeIndex;

use crate::core::Args;
use crate::data::Data;
use crate::doc::Doc;
use crate::error::{Error, Result};
use crate::pattern::PatternDoc;
use crate::stage::{FilterStage, InitialStage};

pub use crate::engine::context::TaskContext;
pub use crate::engine::graph::{TaskDef, TaskGraph};
pub use crate::engine::runner::{Diagnostics, Runner, TaskExecution};
pub use crate::engine::walk::{Step, Walk};

/// Lightweight, copyable reference to a node in a [`TaskGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) NodeIndex);

impl TaskId {
    pub fn index(&self) -> usize {
        self.0.index()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
    Unstarted = 0,
    Running = 1,
    Complete = 2,
}

impl State {
    /// The only state this one may transition into.
    pub fn successor(self) -> Option<State> {
        match self {
            State::Unstarted => Some(State::Running),
            State::Running => Some(State::Complete),
            State::Complete => None,
        }
    }

    fn from_raw(raw: u8) -> Option<State> {
        match raw {
            0 => Some(State::Unstarted),
            1 => Some(State::Running),
            2 => Some(State::Complete),
            _ => None,
        }
    }
}

impl Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            State::Unstarted => write!(f, "unstarted"),
            State::Running => write!(f, "running"),
            State::Complete => write!(f, "complete"),
        }
    }
}

/// Extension points of a task. Each hook defaults to doing nothing.
///
/// `pre` runs before any child is visited, so it is the place to append
/// children discovered at run time. `run` and `post` run after every child
/// has completed.
pub trait Hooks: Send + Sync {
    fn pre(&self, _cx: &mut TaskContext<'_>) -> Result<()> {
        Ok(())
    }

    fn run(&self, _cx: &mut TaskContext<'_>) -> Result<()> {
        Ok(())
    }

    fn post(&self, _cx: &mut TaskContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// Hooks of a plain task.
pub(crate) struct Noop;

impl Hooks for Noop {}

/// The variant of a node, deciding which hooks run for it.
#[derive(Clone)]
pub enum Kind {
    Task(Arc<dyn Hooks>),
    Initial(Arc<InitialStage>),
    Filter(Arc<FilterStage>),
    Doc(Arc<Doc>),
    Pattern(Arc<PatternDoc>),
}

impl Kind {
    pub fn tag(&self) -> &'static str {
        match self {
            Kind::Task(_) => "Task",
            Kind::Initial(_) => "InitialStage",
            Kind::Filter(_) => "FilterStage",
            Kind::Doc(_) => "Doc",
            Kind::Pattern(_) => "PatternDoc",
        }
    }

    pub(crate) fn pre(&self, cx: &mut TaskContext<'_>) -> Result<()> {
        match self {
            Kind::Task(hooks) => hooks.pre(cx),
            Kind::Initial(stage) => stage.pre(cx),
            Kind::Filter(stage) => stage.pre(cx),
            Kind::Doc(doc) => doc.pre(cx),
            Kind::Pattern(doc) => doc.pre(cx),
        }
    }

    pub(crate) fn run(&self, cx: &mut TaskContext<'_>) -> Result<()> {
        match self {
            Kind::Task(hooks) => hooks.run(cx),
            Kind::Initial(stage) => stage.run(cx),
            Kind::Filter(stage) => stage.run(cx),
            Kind::Doc(doc) => doc.run(cx),
            Kind::Pattern(doc) => doc.run(cx),
        }
    }

    pub(crate) fn post(&self, cx: &mut TaskContext<'_>) -> Result<()> {
        match self {
            Kind::Task(hooks) => hooks.post(cx),
            Kind::Initial(stage) => stage.post(cx),
            Kind::Filter(stage) => stage.post(cx),
            Kind::Doc(doc) => doc.post(cx),
            Kind::Pattern(doc) => doc.post(cx),
        }
    }
}

impl std::fmt::Debug for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Kind::{}", self.tag())
    }
}

/// A single task in the graph.
#[derive(Debug)]
pub struct Node {
    key: String,
    args: Args,
    children: Vec<TaskId>,
    /// Raw encoding of [`State`], decoded on every read.
    state: u8,
    completed_children: HashMap<String, TaskId>,
    output: Option<Arc<Data>>,
    kind: Kind,
}

impl Node {
    pub(crate) fn new(key: impl Into<String>, args: Args, kind: Kind) -> Self {
        Self {
            key: key.into(),
            args,
            children: Vec::new(),
            state: State::Unstarted as u8,
            completed_children: HashMap::new(),
            output: None,
            kind,
        }
    }

    pub(crate) fn with_children(mut self, children: Vec<TaskId>) -> Self {
        self.children = children;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn args(&self) -> &Args {
        &self.args
    }

    pub fn children(&self) -> &[TaskId] {
        &self.children
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    /// Stable identity of this task, `<variant>:<key>`.
    pub fn ident(&self) -> String {
        format!("{}:{}", self.kind.tag(), self.key)
    }

    pub fn state(&self) -> Result<State> {
        State::from_raw(self.state).ok_or_else(|| Error::UnexpectedState {
            key: self.key.clone(),
            raw: self.state,
        })
    }

    pub fn is_complete(&self) -> bool {
        self.state == State::Complete as u8
    }

    /// Moves the task into `target`, which has to be the immediate
    /// successor of the current state.
    pub fn transition(&mut self, target: State) -> Result<()> {
        let current = self.state()?;

        if current.successor() != Some(target) {
            return Err(Error::InvalidStateTransition {
                key: self.key.clone(),
                from: current,
                to: target,
            });
        }

        self.state = target as u8;
        Ok(())
    }

    /// Children which were already complete when this task reached them
    /// during its own run, keyed by their identity.
    pub fn completed_children(&self) -> &HashMap<String, TaskId> {
        &self.completed_children
    }

    pub fn output(&self) -> Option<&Data> {
        self.output.as_deref()
    }

    /// The preceding stage, for filter stages.
    pub fn prior(&self) -> Option<TaskId> {
        match &self.kind {
            Kind::Filter(stage) => Some(stage.prior()),
            _ => None,
        }
    }

    /// Alias of the filter applied by the stage following this one.
    pub fn next_filter_alias(&self) -> Option<&str> {
        match &self.kind {
            Kind::Filter(stage) => stage.next_filter_alias(),
            _ => None,
        }
    }

    /// Links a filter stage to the filter applied after it by a newly built
    /// document. A stage can only ever be followed by one filter.
    pub(crate) fn link_next_filter(&mut self, alias: &str) -> Result<()> {
        self.check_next_filter(alias)?;

        let Kind::Filter(stage) = &self.kind else {
            return Ok(());
        };

        if stage.next_filter_alias().is_none() {
            tracing::debug!(stage = %self.key, next = alias, "linked next filter");
            self.kind = Kind::Filter(Arc::new(stage.with_next(alias)));
        }

        Ok(())
    }

    /// Fails if this stage is already followed by a filter other than `alias`.
    pub(crate) fn check_next_filter(&self, alias: &str) -> Result<()> {
        match self.next_filter_alias() {
            Some(current) if current != alias => Err(Error::feedback(format!(
                "Stage '{}' is followed by '{current}' in one document and by '{alias}' in another",
                self.key
            ))),
            _ => Ok(()),
        }
    }

    /// Whether `other`, sharing this node's identity, was defined with
    /// different arguments, children or input.
    pub(crate) fn differs_from(&self, other: &Node) -> bool {
        let source_differs = match (&self.kind, &other.kind) {
            (Kind::Initial(a), Kind::Initial(b)) => a.source() != b.source(),
            _ => false,
        };

        source_differs || self.args != other.args || self.children != other.children
    }

    pub fn as_doc(&self) -> Option<&Doc> {
        match &self.kind {
            Kind::Doc(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn as_pattern(&self) -> Option<&PatternDoc> {
        match &self.kind {
            Kind::Pattern(doc) => Some(doc),
            _ => None,
        }
    }
}
