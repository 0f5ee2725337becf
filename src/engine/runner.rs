mod diagnostics;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::Level;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::core::{Config, Environment};
use crate::data::Data;
use crate::doc::DocDef;
use crate::engine::{Node, State, Step, TaskContext, TaskDef, TaskGraph, TaskId, Walk};
use crate::error::Result;
use crate::filter::FilterRegistry;
use crate::listing::FileLister;
use crate::pattern::PatternDef;

pub use diagnostics::Diagnostics;

#[derive(Debug, Clone)]
pub struct TaskExecution {
    pub start: Instant,
    pub duration: Duration,
}

/// Runs batches of root tasks against one shared task graph.
///
/// Roots run strictly in order, each one fully depth-first before the next
/// begins. Because every task lives in the same graph, a later root reaching
/// a task completed by an earlier one skips it, so each task runs at most
/// once per runner.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use kasane::{FilterRegistry, Runner};
///
/// let registry = Arc::new(FilterRegistry::with_builtins());
/// let mut runner = Runner::new(registry);
///
/// let doc = runner.doc("hello.txt|processtext").contents("hello").finish()?;
/// runner.add_root(doc);
/// runner.run()?;
///
/// println!("{}", runner.output(doc).unwrap().text());
/// # Ok::<(), kasane::Error>(())
/// ```
pub struct Runner {
    graph: TaskGraph,
    env: Environment,
    roots: Vec<TaskId>,
    registered: Vec<TaskId>,
    registered_set: HashSet<TaskId>,
    started: HashMap<TaskId, Instant>,
    diagnostics: Diagnostics,
}

impl Runner {
    pub fn new(registry: Arc<FilterRegistry>) -> Self {
        Self::with_environment(Environment::new(registry, Config::default()))
    }

    pub fn with_config(registry: Arc<FilterRegistry>, config: Config) -> Self {
        Self::with_environment(Environment::new(registry, config))
    }

    pub fn with_environment(env: Environment) -> Self {
        Self {
            graph: TaskGraph::new(),
            env,
            roots: Vec::new(),
            registered: Vec::new(),
            registered_set: HashSet::new(),
            started: HashMap::new(),
            diagnostics: Diagnostics::default(),
        }
    }

    /// Replaces the collaborator used to list files for pattern documents.
    pub fn with_lister(mut self, lister: impl FileLister + 'static) -> Self {
        self.env.lister = Arc::new(lister);
        self
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut TaskGraph {
        &mut self.graph
    }

    pub fn node(&self, id: TaskId) -> &Node {
        &self.graph[id]
    }

    pub fn output(&self, id: TaskId) -> Option<&Data> {
        self.graph[id].output()
    }

    /// Starts defining a plain task.
    pub fn task(&mut self, key: impl Into<String>) -> TaskDef<'_> {
        self.graph.task(key)
    }

    /// Starts defining a document, see [`DocDef`].
    pub fn doc(&mut self, key: impl Into<String>) -> DocDef<'_> {
        self.graph.doc(key)
    }

    /// Starts defining a pattern document, see [`PatternDef`].
    pub fn pattern(&mut self, key: impl Into<String>) -> PatternDef<'_> {
        self.graph.pattern(key)
    }

    pub fn add_child(&mut self, parent: TaskId, child: TaskId) {
        self.graph.push_child(parent, child);
    }

    pub fn add_root(&mut self, id: TaskId) {
        self.roots.push(id);
    }

    pub fn roots(&self) -> &[TaskId] {
        &self.roots
    }

    /// Every task invoked so far, in the order they were entered.
    pub fn registered(&self) -> &[TaskId] {
        &self.registered
    }

    pub fn is_registered(&self, id: TaskId) -> bool {
        self.registered_set.contains(&id)
    }

    /// A lazy walk over `id` and its descendants. Steps have to be handed
    /// back to [`Runner::invoke_step`] one at a time.
    pub fn walk(&self, id: TaskId) -> Walk {
        Walk::new(id)
    }

    pub fn next_step(&mut self, walk: &mut Walk) -> Result<Option<Step>> {
        walk.next_step(&mut self.graph)
    }

    /// Performs one step of the task protocol.
    pub fn invoke_step(&mut self, step: Step) -> Result<()> {
        let id = step.id();
        let kind = self.graph[id].kind().clone();
        let span = tracing::span!(Level::DEBUG, "task", key = %self.graph[id].key());
        let _enter = span.enter();

        match step {
            Step::Enter(_) => {
                if self.registered_set.insert(id) {
                    self.registered.push(id);
                }

                let node = self.graph.node_mut(id);
                node.transition(State::Running)?;
                node.completed_children.clear();
                self.started.insert(id, Instant::now());

                tracing::trace!("pre");
                kind.pre(&mut TaskContext::new(id, &mut self.graph, &self.env))
            }
            Step::Exit(_) => {
                let mut cx = TaskContext::new(id, &mut self.graph, &self.env);
                tracing::trace!("run");
                kind.run(&mut cx)?;
                tracing::trace!("post");
                kind.post(&mut cx)?;

                self.graph.node_mut(id).transition(State::Complete)?;

                if let Some(start) = self.started.remove(&id) {
                    self.diagnostics.execution_times.insert(
                        id,
                        TaskExecution {
                            start,
                            duration: start.elapsed(),
                        },
                    );
                }

                Ok(())
            }
        }
    }

    /// Invokes `id` and everything beneath it which isn't complete yet.
    pub fn invoke(&mut self, id: TaskId) -> Result<()> {
        let mut walk = Walk::new(id);

        while let Some(step) = walk.next_step(&mut self.graph)? {
            self.invoke_step(step)?;
        }

        Ok(())
    }

    /// Runs every root added with [`Runner::add_root`], in order.
    pub fn run(&mut self) -> Result<Diagnostics> {
        let roots = self.roots.clone();
        self.run_tasks(&roots)
    }

    /// Runs the given tasks in order, stopping at the first failure.
    pub fn run_tasks(&mut self, ids: &[TaskId]) -> Result<Diagnostics> {
        let s = Instant::now();

        let root_span = tracing::span!(Level::INFO, "running_tasks");
        root_span.pb_set_length(ids.len() as u64);
        root_span.pb_set_style(&crate::utils::get_style_run());
        root_span.pb_set_message("Running tasks...");
        let _enter = root_span.enter();

        for &id in ids {
            if let Err(err) = self.invoke(id) {
                self.started.clear();
                self.diagnostics = Diagnostics::default();
                tracing::error!(task = %self.graph[id].key(), "{err}");
                return Err(err);
            }
            root_span.pb_inc(1);
        }

        tracing::info!("Finished {} tasks {}", ids.len(), crate::utils::as_overhead(s));
        Ok(std::mem::take(&mut self.diagnostics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fixtures::Recorder;
    use crate::engine::Hooks;
    use crate::error::Error;

    fn runner() -> Runner {
        Runner::new(Arc::new(FilterRegistry::with_builtins()))
    }

    #[test]
    fn test_run_demo_single() {
        let mut runner = runner();
        let log = Recorder::default();
        let demo = runner.task("demo").hooks(log.clone()).finish();

        runner.add_root(demo);
        runner.run().unwrap();

        assert_eq!(log.joined(), "pre 'demo' run 'demo' post 'demo'");
        assert!(runner.node(demo).is_complete());
    }

    #[test]
    fn test_run_demo_parent_child() {
        let mut runner = runner();
        let log = Recorder::default();
        let child = runner.task("child").hooks(log.clone()).finish();
        let parent = runner.task("parent").hooks(log.clone()).child(child).finish();

        runner.add_root(parent);
        runner.run().unwrap();

        assert_eq!(
            log.joined(),
            "pre 'parent' pre 'child' run 'child' post 'child' run 'parent' post 'parent'"
        );
    }

    #[test]
    fn test_dependencies_only_run_once() {
        let mut runner = runner();
        let log = Recorder::default();
        let t1 = runner.task("1").hooks(log.clone()).finish();
        let t2 = runner.task("2").hooks(log.clone()).child(t1).finish();
        let t3 = runner.task("3").hooks(log.clone()).child(t1).finish();

        for id in [t1, t2, t3] {
            runner.add_root(id);
        }
        runner.run().unwrap();

        assert_eq!(
            log.joined(),
            "pre '1' run '1' post '1' pre '2' run '2' post '2' pre '3' run '3' post '3'"
        );
        assert!(runner.node(t1).completed_children().is_empty());
        assert_eq!(runner.node(t2).completed_children().get("Task:1"), Some(&t1));
        assert_eq!(runner.node(t3).completed_children().get("Task:1"), Some(&t1));
    }

    #[test]
    fn test_shared_dependency_across_parents() {
        let mut runner = runner();
        let log = Recorder::default();
        let c = runner.task("c").hooks(log.clone()).finish();
        let a = runner.task("a").child(c).finish();
        let b = runner.task("b").child(c).finish();

        runner.add_root(a);
        runner.add_root(b);
        runner.run().unwrap();

        assert_eq!(log.joined(), "pre 'c' run 'c' post 'c'");
        assert!(runner.node(a).completed_children().is_empty());
        assert_eq!(runner.node(b).completed_children().len(), 1);
        assert_eq!(runner.node(b).completed_children().get("Task:c"), Some(&c));
    }

    #[test]
    fn test_completed_children() {
        let mut runner = runner();
        let log = Recorder::default();
        let grandchild = runner.task("grandchild").hooks(log.clone()).finish();
        let child = runner.task("child").hooks(log.clone()).child(grandchild).finish();
        let parent = runner.task("parent").hooks(log.clone()).child(child).finish();

        runner.add_root(parent);
        runner.run().unwrap();

        assert_eq!(
            log.joined(),
            "pre 'parent' pre 'child' pre 'grandchild' run 'grandchild' post 'grandchild' run 'child' post 'child' run 'parent' post 'parent'"
        );

        // Everything ran fresh, nothing was found already complete.
        for id in [parent, child, grandchild] {
            assert!(runner.node(id).completed_children().is_empty());
        }
    }

    struct AddNewSubtask {
        log: Recorder,
    }

    impl Hooks for AddNewSubtask {
        fn pre(&self, cx: &mut TaskContext<'_>) -> Result<()> {
            let child = cx.task("new").hooks(self.log.clone()).finish();
            cx.push_child(child);
            Ok(())
        }
    }

    #[test]
    fn test_add_new_subtask() {
        let mut runner = runner();
        let log = Recorder::default();
        let parent = runner
            .task("parent")
            .hooks(AddNewSubtask { log: log.clone() })
            .finish();

        runner.add_root(parent);
        runner.run().unwrap();

        assert_eq!(log.joined(), "pre 'new' run 'new' post 'new'");
        assert_eq!(runner.node(parent).children().len(), 1);
        assert!(runner.node(runner.node(parent).children()[0]).is_complete());
    }

    #[test]
    fn test_circular() {
        let mut runner = runner();
        let d1 = runner.task("1").finish();
        let d2 = runner.task("2").finish();
        runner.add_child(d1, d2);
        runner.add_child(d2, d1);

        let err = runner.invoke(d1).unwrap_err();
        assert!(matches!(err, Error::CircularDependency(key) if key == "1"));
    }

    #[test]
    fn test_circular_4_docs() {
        let mut runner = runner();
        let ids: Vec<_> = (1..=4).map(|i| runner.task(i.to_string()).finish()).collect();
        for pair in ids.windows(2) {
            runner.add_child(pair[0], pair[1]);
        }
        runner.add_child(ids[3], ids[0]);

        runner.add_root(ids[0]);
        assert!(matches!(runner.run(), Err(Error::CircularDependency(_))));
    }

    #[test]
    fn test_invalid_state() {
        let mut runner = runner();
        let task = runner.task("key").finish();
        runner.graph_mut().node_mut(task).state = 5;

        assert!(matches!(
            runner.invoke(task),
            Err(Error::UnexpectedState { raw: 5, .. })
        ));
    }

    struct Failing;

    impl Hooks for Failing {
        fn run(&self, _: &mut TaskContext<'_>) -> Result<()> {
            Err(Error::feedback("nope"))
        }
    }

    #[test]
    fn test_failure_halts_run() {
        let mut runner = runner();
        let log = Recorder::default();
        let bad = runner.task("bad").hooks(Failing).finish();
        let good = runner.task("good").hooks(log.clone()).finish();

        runner.add_root(bad);
        runner.add_root(good);

        let err = runner.run().unwrap_err();
        assert!(err.is_user_feedback());
        assert!(log.entries().is_empty());
        assert!(!runner.is_registered(good));
        assert!(runner.started.is_empty());
    }

    #[test]
    fn test_failure_leaves_no_timers() {
        let mut runner = runner();
        let bad = runner.task("bad").hooks(Failing).finish();
        let parent = runner.task("parent").child(bad).finish();

        assert!(runner.run_tasks(&[parent]).is_err());
        assert!(runner.started.is_empty());

        // Nothing from the failed batch leaks into the next one.
        let ok = runner.task("ok").finish();
        let diagnostics = runner.run_tasks(&[ok]).unwrap();
        assert_eq!(diagnostics.execution_times.len(), 1);
    }

    #[test]
    fn test_registered() {
        let mut runner = runner();
        let child = runner.task("child").finish();
        let parent = runner.task("parent").child(child).finish();
        let unrelated = runner.task("unrelated").finish();

        runner.invoke(parent).unwrap();

        assert_eq!(runner.registered(), &[parent, child]);
        assert!(runner.is_registered(child));
        assert!(!runner.is_registered(unrelated));
    }

    #[test]
    fn test_manual_walk() {
        let mut runner = runner();
        let mut seen = Vec::new();
        let child = runner.task("child").finish();
        let parent = runner.task("parent").child(child).finish();

        let mut walk = runner.walk(parent);
        while let Some(step) = runner.next_step(&mut walk).unwrap() {
            seen.push(step);
            runner.invoke_step(step).unwrap();
        }

        assert_eq!(
            seen,
            vec![
                Step::Enter(parent),
                Step::Enter(child),
                Step::Exit(child),
                Step::Exit(parent)
            ]
        );
    }

    #[test]
    fn test_diagnostics_times() {
        let mut runner = runner();
        let child = runner.task("child").finish();
        let parent = runner.task("parent").child(child).finish();

        runner.add_root(parent);
        let diagnostics = runner.run().unwrap();

        assert_eq!(diagnostics.execution_times.len(), 2);
        assert!(diagnostics.execution_times.contains_key(&child));

        // Second run has nothing left to do.
        let diagnostics = runner.run().unwrap();
        assert!(diagnostics.execution_times.is_empty());
    }
}
