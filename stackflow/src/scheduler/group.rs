//! Dependency task group.
//!
//! Runs one [`Task`] per graph node. A node starts only after all of its
//! predecessors (under the traversal direction) completed successfully;
//! independent branches run concurrently inside a single coordinating loop.
//! The group is poll driven: [`TaskGroupRun::step`] advances it for at most
//! a caller supplied interval, so the caller can check its own deadline
//! between steps.

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{Task, TaskStep};
use crate::cancellation::CancellationToken;
use crate::core::Action;
use crate::errors::GraphCycleError;
use crate::failure::{FailureCollector, FailureRecord};
use crate::graph::{Dependencies, Direction};

/// Builds the task for a graph node when the node becomes runnable.
pub type TaskFactory = Box<dyn FnMut(&str) -> Box<dyn Task> + Send>;

/// Invoked once for every task that fails.
pub type ErrorHandler = Box<dyn Fn(&FailureRecord) + Send + Sync>;

type StepFuture = BoxFuture<'static, (Box<dyn Task>, TaskStep)>;

/// How a group run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupOutcome {
    /// Every task completed.
    Complete,
    /// At least one task failed.
    Failed,
    /// The run was cancelled before it finished.
    Cancelled(String),
}

/// Final report of a group run.
#[derive(Debug, Clone)]
pub struct GroupReport {
    /// How the run ended.
    pub outcome: GroupOutcome,
    /// Nodes whose task completed, in completion order.
    pub completed: Vec<String>,
    /// Failed, blocked and cancelled nodes.
    pub failures: FailureCollector,
    /// Nodes that never started because the run was cancelled.
    pub not_started: Vec<String>,
}

impl GroupReport {
    /// Returns true if every task completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome == GroupOutcome::Complete
    }
}

/// Result of a single scheduler step.
#[derive(Debug, Clone)]
pub enum GroupPoll {
    /// Tasks are still running.
    Pending,
    /// The run is over.
    Finished(GroupReport),
}

/// A graph plus a task factory, ready to be started.
pub struct DependencyTaskGroup {
    name: String,
    graph: Dependencies,
    direction: Direction,
    action: Action,
    factory: TaskFactory,
    on_error: Option<ErrorHandler>,
    max_concurrency: Option<usize>,
}

impl DependencyTaskGroup {
    /// Creates a group over `graph`, walked in `direction`, whose tasks
    /// perform `action`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        graph: Dependencies,
        direction: Direction,
        action: Action,
        factory: TaskFactory,
    ) -> Self {
        Self {
            name: name.into(),
            graph,
            direction,
            action,
            factory,
            on_error: None,
            max_concurrency: None,
        }
    }

    /// Sets a callback invoked for every task failure.
    #[must_use]
    pub fn with_error_handler(mut self, handler: ErrorHandler) -> Self {
        self.on_error = Some(handler);
        self
    }

    /// Bounds the number of tasks running at once.
    #[must_use]
    pub fn with_max_concurrency(mut self, limit: Option<usize>) -> Self {
        self.max_concurrency = limit.map(|n| n.max(1));
        self
    }

    /// Validates the graph and returns a run that has not started any task yet.
    pub fn start(self) -> Result<TaskGroupRun, GraphCycleError> {
        let order = self.graph.order(self.direction)?;
        let positions: BTreeMap<String, usize> = order
            .iter()
            .enumerate()
            .map(|(position, node)| (node.clone(), position))
            .collect();

        let mut waiting = BTreeMap::new();
        let mut ready = BTreeSet::new();
        for node in &order {
            let count = self.graph.predecessors(node, self.direction).len();
            if count == 0 {
                ready.insert((positions[node], node.clone()));
            } else {
                waiting.insert(node.clone(), count);
            }
        }

        debug!(group = %self.name, tasks = order.len(), "Task group started");

        Ok(TaskGroupRun {
            name: self.name,
            graph: self.graph,
            direction: self.direction,
            action: self.action,
            factory: self.factory,
            on_error: self.on_error,
            max_concurrency: self.max_concurrency,
            token: Arc::new(CancellationToken::new()),
            positions,
            waiting,
            ready,
            running: BTreeSet::new(),
            in_flight: FuturesUnordered::new(),
            completed: Vec::new(),
            failures: FailureCollector::new(),
            started_at: Instant::now(),
            report: None,
        })
    }

    /// Runs the group to completion with no deadline.
    pub async fn run(self, poll_interval: Duration) -> Result<GroupReport, GraphCycleError> {
        let mut run = self.start()?;
        loop {
            if let GroupPoll::Finished(report) = run.step(poll_interval).await {
                return Ok(report);
            }
        }
    }
}

impl std::fmt::Debug for DependencyTaskGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyTaskGroup")
            .field("name", &self.name)
            .field("nodes", &self.graph.len())
            .field("direction", &self.direction)
            .field("action", &self.action)
            .field("max_concurrency", &self.max_concurrency)
            .finish()
    }
}

/// A started group run.
pub struct TaskGroupRun {
    name: String,
    graph: Dependencies,
    direction: Direction,
    action: Action,
    factory: TaskFactory,
    on_error: Option<ErrorHandler>,
    max_concurrency: Option<usize>,
    token: Arc<CancellationToken>,
    positions: BTreeMap<String, usize>,
    /// Not yet runnable nodes and their count of unfinished predecessors.
    waiting: BTreeMap<String, usize>,
    /// Runnable nodes keyed by traversal position.
    ready: BTreeSet<(usize, String)>,
    running: BTreeSet<String>,
    in_flight: FuturesUnordered<StepFuture>,
    completed: Vec<String>,
    failures: FailureCollector,
    started_at: Instant,
    report: Option<GroupReport>,
}

impl TaskGroupRun {
    /// The token shared with every task of this run.
    #[must_use]
    pub fn token(&self) -> Arc<CancellationToken> {
        Arc::clone(&self.token)
    }

    /// Number of tasks currently running.
    #[must_use]
    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    /// Returns true once the run produced its report.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.report.is_some()
    }

    /// Advances the run, waiting at most `max_wait` for a task to reach its
    /// next suspension point.
    pub async fn step(&mut self, max_wait: Duration) -> GroupPoll {
        if let Some(report) = &self.report {
            return GroupPoll::Finished(report.clone());
        }

        if self.token.is_cancelled() {
            let reason = self.token.reason().unwrap_or_default();
            self.drain(max_wait).await;
            return GroupPoll::Finished(self.finish(Some(reason)));
        }

        self.launch_ready();
        if self.in_flight.is_empty() {
            return GroupPoll::Finished(self.finish(None));
        }

        match tokio::time::timeout(max_wait, self.in_flight.next()).await {
            Ok(Some((task, step))) => {
                self.handle(task, step);
                self.launch_ready();
                if self.in_flight.is_empty() {
                    GroupPoll::Finished(self.finish(None))
                } else {
                    GroupPoll::Pending
                }
            }
            Ok(None) => GroupPoll::Finished(self.finish(None)),
            Err(_) => GroupPoll::Pending,
        }
    }

    /// Cancels the run: nothing new starts, running tasks are asked to unwind
    /// and get up to `grace` to do so before they are abandoned.
    pub async fn cancel(&mut self, reason: impl Into<String>, grace: Duration) -> GroupReport {
        if let Some(report) = &self.report {
            return report.clone();
        }

        self.token.cancel(reason);
        let reason = self.token.reason().unwrap_or_default();
        info!(group = %self.name, %reason, running = self.running.len(), "Cancelling task group");

        self.drain(grace).await;
        self.finish(Some(reason))
    }

    fn has_capacity(&self) -> bool {
        self.max_concurrency
            .map_or(true, |limit| self.running.len() < limit)
    }

    fn launch_ready(&mut self) {
        while self.has_capacity() && !self.token.is_cancelled() {
            let Some((_, node)) = self.ready.pop_first() else {
                break;
            };
            debug!(group = %self.name, task = %node, "Starting task");
            let task = (self.factory)(&node);
            self.running.insert(node);
            let fut = self.resume(task);
            self.in_flight.push(fut);
        }
    }

    fn resume(&self, mut task: Box<dyn Task>) -> StepFuture {
        let token = Arc::clone(&self.token);
        Box::pin(async move {
            let step = task.resume(&token).await;
            (task, step)
        })
    }

    fn position(&self, node: &str) -> usize {
        self.positions.get(node).copied().unwrap_or(usize::MAX)
    }

    fn handle(&mut self, task: Box<dyn Task>, step: TaskStep) {
        let node = task.name().to_string();

        match step {
            TaskStep::Running if !self.token.is_cancelled() => {
                let fut = self.resume(task);
                self.in_flight.push(fut);
            }
            TaskStep::Running | TaskStep::Cancelled => {
                self.running.remove(&node);
                let reason = self.token.reason().unwrap_or_else(|| "cancelled".to_string());
                debug!(group = %self.name, task = %node, "Task cancelled");
                let record = FailureRecord::cancelled(&node, task.action(), reason)
                    .at_position(self.position(&node));
                self.failures.record(record);
            }
            TaskStep::Complete => {
                self.running.remove(&node);
                debug!(group = %self.name, task = %node, "Task complete");
                self.release_successors(&node);
                self.completed.push(node);
            }
            TaskStep::Failed(error) => {
                self.running.remove(&node);
                warn!(group = %self.name, task = %node, %error, "Task failed");
                let record = FailureRecord::resource(&node, task.action(), error.to_string())
                    .at_position(self.position(&node));
                if let Some(on_error) = &self.on_error {
                    on_error(&record);
                }
                self.failures.record(record);
                self.block_dependents(&node);
            }
        }
    }

    fn release_successors(&mut self, node: &str) {
        let successors: Vec<String> = self
            .graph
            .successors(node, self.direction)
            .into_iter()
            .map(ToString::to_string)
            .collect();

        for next in successors {
            let runnable = match self.waiting.get_mut(&next) {
                Some(count) => {
                    *count = count.saturating_sub(1);
                    *count == 0
                }
                None => false,
            };
            if runnable {
                self.waiting.remove(&next);
                let position = self.position(&next);
                self.ready.insert((position, next));
            }
        }
    }

    /// Marks every transitive dependent of a failed node as blocked.
    fn block_dependents(&mut self, failed: &str) {
        let mut queue: VecDeque<String> = self
            .graph
            .successors(failed, self.direction)
            .into_iter()
            .map(ToString::to_string)
            .collect();

        while let Some(node) = queue.pop_front() {
            if self.waiting.remove(&node).is_none() {
                continue;
            }
            debug!(group = %self.name, task = %node, blocked_by = %failed, "Task will not start");
            let record = FailureRecord::blocked(&node, self.action, failed)
                .at_position(self.position(&node));
            self.failures.record(record);
            queue.extend(
                self.graph
                    .successors(&node, self.direction)
                    .into_iter()
                    .map(ToString::to_string),
            );
        }
    }

    /// Collects results of running tasks until they all unwind or `grace` elapses.
    async fn drain(&mut self, grace: Duration) {
        let deadline = tokio::time::Instant::now() + grace;
        loop {
            match tokio::time::timeout_at(deadline, self.in_flight.next()).await {
                Ok(Some((task, step))) => self.handle(task, step),
                Ok(None) => break,
                Err(_) => {
                    let reason = self.token.reason().unwrap_or_default();
                    for node in std::mem::take(&mut self.running) {
                        warn!(
                            group = %self.name,
                            task = %node,
                            "Abandoning task that did not unwind"
                        );
                        let record = FailureRecord::cancelled(&node, self.action, reason.clone())
                            .at_position(self.position(&node));
                        self.failures.record(record);
                    }
                    self.in_flight = FuturesUnordered::new();
                    break;
                }
            }
        }
    }

    fn finish(&mut self, cancelled: Option<String>) -> GroupReport {
        let mut not_started: Vec<(usize, String)> =
            std::mem::take(&mut self.ready).into_iter().collect();
        not_started.extend(
            std::mem::take(&mut self.waiting)
                .into_keys()
                .map(|node| (self.position(&node), node)),
        );
        not_started.sort();

        let outcome = match cancelled {
            Some(reason) => GroupOutcome::Cancelled(reason),
            None if self.failures.has_failures() => GroupOutcome::Failed,
            None => GroupOutcome::Complete,
        };

        let report = GroupReport {
            outcome,
            completed: self.completed.clone(),
            failures: self.failures.clone(),
            not_started: not_started.into_iter().map(|(_, node)| node).collect(),
        };

        info!(
            group = %self.name,
            outcome = ?report.outcome,
            completed = report.completed.len(),
            failed = report.failures.len(),
            elapsed = ?self.started_at.elapsed(),
            "Task group finished"
        );

        self.report = Some(report.clone());
        report
    }
}

impl std::fmt::Debug for TaskGroupRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGroupRun")
            .field("name", &self.name)
            .field("running", &self.running)
            .field("waiting", &self.waiting.len())
            .field("ready", &self.ready.len())
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::HandlerError;
    use crate::failure::FailureOrigin;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const POLL: Duration = Duration::from_millis(5);

    #[derive(Debug)]
    struct TestTask {
        name: String,
        steps: usize,
        fail: bool,
        started: bool,
        log: Arc<Mutex<Vec<String>>>,
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Task for TestTask {
        fn name(&self) -> &str {
            &self.name
        }

        fn action(&self) -> Action {
            Action::Create
        }

        async fn resume(&mut self, token: &CancellationToken) -> TaskStep {
            if !self.started {
                self.started = true;
                self.log.lock().push(format!("start:{}", self.name));
                let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
            }

            tokio::select! {
                () = token.cancelled() => {
                    self.active.fetch_sub(1, Ordering::SeqCst);
                    return TaskStep::Cancelled;
                }
                () = tokio::time::sleep(Duration::from_millis(1)) => {}
            }

            if self.steps > 0 {
                self.steps -= 1;
                return TaskStep::Running;
            }

            self.active.fetch_sub(1, Ordering::SeqCst);
            self.log.lock().push(format!("end:{}", self.name));
            if self.fail {
                TaskStep::Failed(HandlerError::exception(format!("{} broke", self.name)))
            } else {
                TaskStep::Complete
            }
        }
    }

    #[derive(Default)]
    struct Harness {
        log: Arc<Mutex<Vec<String>>>,
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl Harness {
        /// Specs are `(name, extra steps, fails)`; unlisted nodes finish in one step.
        fn factory(&self, specs: &[(&str, usize, bool)]) -> TaskFactory {
            let specs: HashMap<String, (usize, bool)> = specs
                .iter()
                .map(|(name, steps, fail)| ((*name).to_string(), (*steps, *fail)))
                .collect();
            let log = self.log.clone();
            let active = self.active.clone();
            let peak = self.peak.clone();

            Box::new(move |name: &str| {
                let (steps, fail) = specs.get(name).copied().unwrap_or((0, false));
                Box::new(TestTask {
                    name: name.to_string(),
                    steps,
                    fail,
                    started: false,
                    log: log.clone(),
                    active: active.clone(),
                    peak: peak.clone(),
                }) as Box<dyn Task>
            })
        }

        fn index(&self, entry: &str) -> usize {
            self.log
                .lock()
                .iter()
                .position(|e| e == entry)
                .unwrap_or_else(|| panic!("{entry} not logged"))
        }

        fn logged(&self, entry: &str) -> bool {
            self.log.lock().iter().any(|e| e == entry)
        }
    }

    fn diamond() -> Dependencies {
        let mut graph = Dependencies::new();
        graph.add_edge("top", "left");
        graph.add_edge("top", "right");
        graph.add_edge("left", "base");
        graph.add_edge("right", "base");
        graph
    }

    fn group(
        graph: Dependencies,
        direction: Direction,
        factory: TaskFactory,
    ) -> DependencyTaskGroup {
        DependencyTaskGroup::new("test", graph, direction, Action::Create, factory)
    }

    #[tokio::test]
    async fn test_forward_order_respected() {
        let harness = Harness::default();
        let report = group(diamond(), Direction::Forward, harness.factory(&[]))
            .run(POLL)
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.completed.len(), 4);
        assert!(harness.index("end:base") < harness.index("start:left"));
        assert!(harness.index("end:base") < harness.index("start:right"));
        assert!(harness.index("end:left") < harness.index("start:top"));
        assert!(harness.index("end:right") < harness.index("start:top"));
    }

    #[tokio::test]
    async fn test_reverse_order_respected() {
        let harness = Harness::default();
        let report = group(diamond(), Direction::Reverse, harness.factory(&[]))
            .run(POLL)
            .await
            .unwrap();

        assert!(report.is_success());
        assert!(harness.index("end:top") < harness.index("start:left"));
        assert!(harness.index("end:left") < harness.index("start:base"));
        assert!(harness.index("end:right") < harness.index("start:base"));
    }

    #[tokio::test]
    async fn test_independent_siblings_overlap() {
        let harness = Harness::default();
        let report = group(
            diamond(),
            Direction::Forward,
            harness.factory(&[("left", 3, false), ("right", 3, false)]),
        )
        .run(POLL)
        .await
        .unwrap();

        assert!(report.is_success());
        assert!(harness.index("start:right") < harness.index("end:left"));
        assert!(harness.index("start:left") < harness.index("end:right"));
        assert_eq!(harness.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_max_concurrency_bounds_running_tasks() {
        let harness = Harness::default();
        let report = group(
            diamond(),
            Direction::Forward,
            harness.factory(&[("left", 2, false), ("right", 2, false)]),
        )
        .with_max_concurrency(Some(1))
        .run(POLL)
        .await
        .unwrap();

        assert!(report.is_success());
        assert_eq!(harness.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_blocks_dependents_but_not_siblings() {
        let harness = Harness::default();
        let report = group(
            diamond(),
            Direction::Forward,
            harness.factory(&[("left", 0, true), ("right", 4, false)]),
        )
        .run(POLL)
        .await
        .unwrap();

        assert_eq!(report.outcome, GroupOutcome::Failed);
        // the slow sibling still finished
        assert!(report.completed.contains(&"right".to_string()));
        assert!(!harness.logged("start:top"));

        let top = report
            .failures
            .failures()
            .iter()
            .find(|f| f.subject == "top")
            .unwrap();
        assert_eq!(top.origin, FailureOrigin::Blocked { by: "left".to_string() });
        assert_eq!(
            report.failures.status_reason().unwrap(),
            "Resource CREATE failed: Exception: left broke"
        );
    }

    #[tokio::test]
    async fn test_error_handler_called_per_failure() {
        let harness = Harness::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let mut graph = Dependencies::new();
        graph.add_node("a");
        graph.add_node("b");
        graph.add_node("c");

        let factory = harness.factory(&[("a", 0, true), ("b", 1, true)]);
        let report = group(graph, Direction::Forward, factory)
            .with_error_handler(Box::new(move |record| sink.lock().push(record.subject.clone())))
            .run(POLL)
            .await
            .unwrap();

        assert_eq!(report.outcome, GroupOutcome::Failed);
        let mut seen = seen.lock().clone();
        seen.sort();
        assert_eq!(seen, vec!["a", "b"]);
        assert_eq!(report.completed, vec!["c"]);
    }

    #[tokio::test]
    async fn test_representative_failure_is_deterministic() {
        for _ in 0..5 {
            let harness = Harness::default();
            let mut graph = Dependencies::new();
            graph.add_node("a");
            graph.add_node("b");

            let factory = harness.factory(&[("a", 2, true), ("b", 0, true)]);
            let report = group(graph, Direction::Forward, factory)
                .run(POLL)
                .await
                .unwrap();

            assert_eq!(
                report.failures.status_reason().unwrap(),
                "Resource CREATE failed: Exception: a broke"
            );
        }
    }

    #[tokio::test]
    async fn test_cancel_stops_running_and_pending_tasks() {
        let harness = Harness::default();
        let mut run = group(
            diamond(),
            Direction::Forward,
            harness.factory(&[("base", usize::MAX, false)]),
        )
        .start()
        .unwrap();

        assert!(matches!(run.step(POLL).await, GroupPoll::Pending));
        assert!(matches!(run.step(POLL).await, GroupPoll::Pending));
        assert_eq!(run.running_count(), 1);

        let report = run.cancel("Delete timed out", Duration::from_millis(200)).await;

        assert_eq!(report.outcome, GroupOutcome::Cancelled("Delete timed out".to_string()));
        assert_eq!(report.not_started, vec!["left", "right", "top"]);
        assert!(report.failures.has_failed("base"));
        assert!(!harness.logged("end:base"));
        assert!(run.is_finished());
        assert!(matches!(run.step(POLL).await, GroupPoll::Finished(_)));
    }

    #[tokio::test]
    async fn test_external_token_cancel_finishes_run() {
        let harness = Harness::default();
        let mut graph = Dependencies::new();
        graph.add_node("stuck");
        let factory = harness.factory(&[("stuck", usize::MAX, false)]);
        let mut run = group(graph, Direction::Forward, factory)
            .start()
            .unwrap();

        assert!(matches!(run.step(POLL).await, GroupPoll::Pending));
        run.token().cancel("stopped");

        match run.step(POLL).await {
            GroupPoll::Finished(report) => {
                assert_eq!(report.outcome, GroupOutcome::Cancelled("stopped".to_string()));
            }
            GroupPoll::Pending => panic!("run should have finished"),
        }
    }

    #[tokio::test]
    async fn test_empty_graph_finishes_on_first_step() {
        let harness = Harness::default();
        let mut run = group(Dependencies::new(), Direction::Reverse, harness.factory(&[]))
            .start()
            .unwrap();

        match run.step(POLL).await {
            GroupPoll::Finished(report) => assert!(report.is_success()),
            GroupPoll::Pending => panic!("empty run should finish immediately"),
        }
    }

    #[test]
    fn test_cycle_rejected_at_start() {
        let harness = Harness::default();
        let mut graph = Dependencies::new();
        graph.add_edge("a", "b");
        graph.add_edge("b", "a");

        let err = group(graph, Direction::Forward, harness.factory(&[]))
            .start()
            .unwrap_err();
        assert_eq!(err.cycle_path, vec!["a", "b", "a"]);
    }
}
