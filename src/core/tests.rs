use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use crate::{
    Event, EventKind, Group, LifecycleError, Outcome, Service, ServiceContext, ServiceHandle,
    State, Subscribe, TaskError, DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT,
};

#[derive(Clone, Default)]
struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    fn pos(&self, entry: &str) -> usize {
        self.entries()
            .iter()
            .position(|e| e == entry)
            .unwrap_or_else(|| panic!("`{entry}` not recorded in {:?}", self.entries()))
    }

    fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| *e == entry).count()
    }
}

#[derive(Default)]
struct Probe {
    name: &'static str,
    journal: Journal,
    deps: Vec<Group>,
    start_delay: Duration,
    stop_delay: Duration,
    fail_start: bool,
    fail_stop: bool,
    crash_after: Option<Duration>,
    idle_task: bool,
    timeout: Option<Duration>,
}

impl Probe {
    fn new(name: &'static str, journal: &Journal) -> Self {
        Self {
            name,
            journal: journal.clone(),
            ..Default::default()
        }
    }

    fn deps(mut self, deps: Vec<Group>) -> Self {
        self.deps = deps;
        self
    }

    fn handle(self) -> ServiceHandle {
        ServiceHandle::new(self)
    }
}

#[async_trait]
impl Service for Probe {
    fn name(&self) -> &str {
        self.name
    }

    fn dependencies(&self) -> Vec<Group> {
        self.deps.clone()
    }

    fn graceful_shutdown_timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT)
    }

    async fn start(&self, ctx: &ServiceContext) -> anyhow::Result<()> {
        self.journal.push(format!("{}.start", self.name));
        if !self.start_delay.is_zero() {
            sleep(self.start_delay).await;
        }
        if self.fail_start {
            anyhow::bail!("{} refused to start", self.name);
        }
        if let Some(after) = self.crash_after {
            ctx.add_task("crash", move |_| async move {
                sleep(after).await;
                Err(TaskError::fail("boom"))
            })?;
        }
        if self.idle_task {
            let journal = self.journal.clone();
            let name = self.name;
            ctx.add_task("idle", move |token| async move {
                token.cancelled().await;
                journal.push(format!("{name}.task.cancelled"));
                Ok(())
            })?;
        }
        self.journal.push(format!("{}.started", self.name));
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.journal.push(format!("{}.stop", self.name));
        if !self.stop_delay.is_zero() {
            sleep(self.stop_delay).await;
        }
        if self.fail_stop {
            anyhow::bail!("{} refused to stop", self.name);
        }
        self.journal.push(format!("{}.stopped", self.name));
        Ok(())
    }
}

#[derive(Clone, Default)]
struct Collector(Arc<Mutex<Vec<Event>>>);

impl Collector {
    fn kinds(&self) -> Vec<EventKind> {
        self.0.lock().unwrap().iter().map(|e| e.kind).collect()
    }
}

#[async_trait]
impl Subscribe for Collector {
    async fn on_event(&self, event: &Event) {
        self.0.lock().unwrap().push(event.clone());
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}

fn service_of(err: &LifecycleError) -> Option<&str> {
    match err.primary() {
        LifecycleError::StartFailed { service, .. }
        | LifecycleError::StopFailed { service, .. }
        | LifecycleError::ScopeFailed { service, .. }
        | LifecycleError::Crashed { service, .. }
        | LifecycleError::Cancelled { service } => Some(&**service),
        _ => None,
    }
}

#[tokio::test(start_paused = true)]
async fn test_dependency_starts_first_and_stops_last() {
    let journal = Journal::default();
    let b = Probe::new("b", &journal).handle();
    let a = Probe::new("a", &journal).deps(vec![b.clone().into()]).handle();

    a.start().await.unwrap();
    assert!(a.running() && b.running());
    a.stop().await.unwrap();

    assert_eq!(
        journal.entries(),
        [
            "b.start", "b.started", "a.start", "a.started", "a.stop", "a.stopped", "b.stop",
            "b.stopped"
        ]
    );
    assert_eq!(a.state(), State::Stopped);
    assert_eq!(b.state(), State::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_group_is_a_barrier() {
    let journal = Journal::default();
    let slow = |name| Probe {
        start_delay: Duration::from_millis(10),
        stop_delay: Duration::from_millis(10),
        ..Probe::new(name, &journal)
    };
    let b = slow("b").handle();
    let c = slow("c").handle();
    let d = Probe::new("d", &journal).handle();
    let a = Probe::new("a", &journal)
        .deps(vec![vec![b.clone(), c.clone()].into(), d.clone().into()])
        .handle();

    a.start().await.unwrap();

    // b and c overlap; d waits for both.
    assert!(journal.pos("b.start") < journal.pos("c.started"));
    assert!(journal.pos("c.start") < journal.pos("b.started"));
    assert!(journal.pos("b.started") < journal.pos("d.start"));
    assert!(journal.pos("c.started") < journal.pos("d.start"));
    assert!(journal.pos("d.started") < journal.pos("a.start"));

    a.stop().await.unwrap();

    assert!(journal.pos("a.stopped") < journal.pos("d.stop"));
    assert!(journal.pos("d.stopped") < journal.pos("b.stop"));
    assert!(journal.pos("d.stopped") < journal.pos("c.stop"));
    assert!(journal.pos("b.stop") < journal.pos("c.stopped"));
    assert!(journal.pos("c.stop") < journal.pos("b.stopped"));
}

#[tokio::test(start_paused = true)]
async fn test_failed_dependency_aborts_run() {
    let journal = Journal::default();
    let b = Probe {
        fail_start: true,
        ..Probe::new("b", &journal)
    }
    .handle();
    let a = Probe::new("a", &journal).deps(vec![b.clone().into()]).handle();

    let err = a.run().await.unwrap_err();
    assert_eq!(err.as_label(), "start_failed");
    assert_eq!(service_of(&err), Some("b"));
    assert_eq!(journal.entries(), ["b.start"]);
    assert_eq!(a.state(), State::Stopped);
    assert_eq!(b.state(), State::Stopped);

    let waited = a.wait().await.unwrap_err();
    assert_eq!(service_of(&waited), Some("b"));
}

#[tokio::test(start_paused = true)]
async fn test_later_group_failure_rolls_back_earlier_groups() {
    let journal = Journal::default();
    let b = Probe::new("b", &journal).handle();
    let c = Probe {
        fail_start: true,
        ..Probe::new("c", &journal)
    }
    .handle();
    let d = Probe::new("d", &journal).handle();
    let a = Probe::new("a", &journal)
        .deps(vec![b.clone().into(), c.clone().into(), d.clone().into()])
        .handle();

    let err = a.start().await.unwrap_err();
    assert_eq!(service_of(&err), Some("c"));
    assert_eq!(
        journal.entries(),
        ["b.start", "b.started", "c.start", "b.stop", "b.stopped"]
    );
    assert_eq!(b.state(), State::Stopped);
    assert_eq!(d.state(), State::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_parallel_failure_rolls_back_siblings() {
    let journal = Journal::default();
    let b = Probe::new("b", &journal).handle();
    let c = Probe {
        fail_start: true,
        start_delay: Duration::from_millis(5),
        ..Probe::new("c", &journal)
    }
    .handle();
    let a = Probe::new("a", &journal)
        .deps(vec![vec![b.clone(), c.clone()].into()])
        .handle();

    let err = a.start().await.unwrap_err();
    assert_eq!(service_of(&err), Some("c"));
    assert!(journal.pos("b.started") < journal.pos("b.stop"));
    assert_eq!(journal.count("a.start"), 0);
    assert!(!b.running());
    assert_eq!(c.state(), State::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_task_crash_stops_the_stack() {
    let journal = Journal::default();
    let b = Probe::new("b", &journal).handle();
    let a = Probe {
        crash_after: Some(Duration::from_millis(10)),
        ..Probe::new("a", &journal)
    }
    .deps(vec![b.clone().into()])
    .handle();

    let err = tokio::time::timeout(Duration::from_secs(1), a.run())
        .await
        .expect("crash must end the run")
        .unwrap_err();

    match err.primary() {
        LifecycleError::Crashed { service, task, .. } => {
            assert_eq!(&**service, "a");
            assert_eq!(&**task, "crash");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(a.state(), State::Crashed);
    assert_eq!(b.state(), State::Stopped);
    assert!(journal.pos("a.stopped") < journal.pos("b.stop"));
    assert!(a.termination().is_some_and(|o| o.is_failure()));
}

#[tokio::test(start_paused = true)]
async fn test_task_crash_in_dependency_reaches_root() {
    let journal = Journal::default();
    let b = Probe {
        crash_after: Some(Duration::from_millis(10)),
        ..Probe::new("b", &journal)
    }
    .handle();
    let a = Probe::new("a", &journal).deps(vec![b.clone().into()]).handle();

    let err = a.run().await.unwrap_err();
    assert_eq!(service_of(&err), Some("b"));
    assert_eq!(b.state(), State::Crashed);
    assert_eq!(a.state(), State::Stopped);

    let waited = b.wait().await.unwrap_err();
    assert_eq!(waited.as_label(), "crashed");
}

#[tokio::test(start_paused = true)]
async fn test_stop_timeout_is_reported_not_raised() {
    let journal = Journal::default();
    let events = Collector::default();
    let a = ServiceHandle::builder(Probe {
        timeout: Some(Duration::from_secs(1)),
        stop_delay: Duration::from_secs(5),
        ..Probe::new("a", &journal)
    })
    .with_subscriber(events.clone())
    .build();

    a.start().await.unwrap();
    let report = a.stop().await.unwrap();

    assert!(report.timed_out());
    assert_eq!(report.timed_out_services(), ["a"]);
    assert_eq!(report.budget, Duration::from_secs(1));
    assert!(report.elapsed < Duration::from_secs(5));
    assert_eq!(a.state(), State::Stopped);
    assert_eq!(journal.count("a.stopped"), 0);
    assert_eq!(a.shutdown_report(), Some(report));

    sleep(Duration::from_millis(10)).await;
    assert_eq!(events.kinds().last(), Some(&EventKind::GraceExceeded));
}

#[tokio::test(start_paused = true)]
async fn test_root_deadline_skips_remaining_bodies() {
    let journal = Journal::default();
    let b = Probe::new("b", &journal).handle();
    let a = Probe {
        timeout: Some(Duration::from_secs(1)),
        stop_delay: Duration::from_secs(5),
        ..Probe::new("a", &journal)
    }
    .deps(vec![b.clone().into()])
    .handle();

    a.start().await.unwrap();
    let report = a.stop().await.unwrap();

    assert_eq!(report.timed_out_services(), ["a", "b"]);
    assert_eq!(journal.count("b.stop"), 0);
    assert_eq!(b.state(), State::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_stop_errors_are_collected() {
    let journal = Journal::default();
    let b = Probe {
        fail_stop: true,
        ..Probe::new("b", &journal)
    }
    .handle();
    let a = Probe {
        fail_stop: true,
        ..Probe::new("a", &journal)
    }
    .deps(vec![b.clone().into()])
    .handle();

    a.start().await.unwrap();
    let err = a.stop().await.unwrap_err();

    assert_eq!(service_of(&err), Some("a"));
    assert_eq!(err.suppressed().len(), 1);
    assert_eq!(service_of(&err.suppressed()[0]), Some("b"));
    assert_eq!(a.state(), State::Stopped);
    assert_eq!(b.state(), State::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_second_stop_is_rejected() {
    let journal = Journal::default();
    let a = Probe::new("a", &journal).handle();

    a.start().await.unwrap();
    a.stop().await.unwrap();
    assert!(matches!(
        a.stop().await,
        Err(LifecycleError::NotRunning {
            state: State::Stopped,
            ..
        })
    ));
    assert_eq!(journal.count("a.stop"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_lifecycle_guards() {
    let journal = Journal::default();
    let a = Probe::new("a", &journal).handle();

    assert!(matches!(a.wait().await, Err(LifecycleError::NotRunning { .. })));
    assert!(matches!(a.stop().await, Err(LifecycleError::NotRunning { .. })));
    assert!(matches!(
        a.add_task("early", |_| async { Ok(()) }),
        Err(LifecycleError::NotRunning {
            state: State::Idle,
            ..
        })
    ));

    a.start().await.unwrap();
    assert!(matches!(
        a.start().await,
        Err(LifecycleError::AlreadyStarted {
            state: State::Running,
            ..
        })
    ));

    a.stop().await.unwrap();
    assert!(matches!(
        a.add_task("late", |_| async { Ok(()) }),
        Err(LifecycleError::NotRunning {
            state: State::Stopped,
            ..
        })
    ));
    assert!(matches!(
        a.start().await,
        Err(LifecycleError::AlreadyStarted { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_tasks_are_cancelled_before_stop_body() {
    let journal = Journal::default();
    let a = Probe {
        idle_task: true,
        ..Probe::new("a", &journal)
    }
    .handle();

    a.start().await.unwrap();
    assert_eq!(a.live_tasks(), 1);
    a.stop().await.unwrap();

    assert!(journal.pos("a.task.cancelled") < journal.pos("a.stop"));
    assert_eq!(a.live_tasks(), 0);
    assert_eq!(a.state(), State::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_finished_task_leaves_service_running() {
    let journal = Journal::default();
    let a = Probe::new("a", &journal).handle();
    a.start().await.unwrap();

    let task = a.add_task("once", |_| async { Ok(()) }).unwrap();
    assert_eq!(task.name(), "once");
    sleep(Duration::from_millis(1)).await;

    assert!(task.is_finished());
    assert_eq!(a.live_tasks(), 0);
    assert!(a.running());
    a.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_task_error_during_shutdown_is_suppressed() {
    let journal = Journal::default();
    let a = Probe::new("a", &journal).handle();
    a.start().await.unwrap();

    a.add_task("noisy", |token| async move {
        token.cancelled().await;
        Err(TaskError::fail("failed while cancelling"))
    })
    .unwrap();

    a.stop().await.unwrap();
    assert_eq!(a.state(), State::Stopped);
    assert!(matches!(a.termination(), Some(Outcome::Stopped)));
}

#[tokio::test(start_paused = true)]
async fn test_task_panic_is_a_crash() {
    let journal = Journal::default();
    let a = Probe::new("a", &journal).handle();
    a.start().await.unwrap();

    a.add_task("panicky", |_| async { panic!("kaboom") }).unwrap();

    let err = a.wait().await.unwrap_err();
    assert!(matches!(
        err.primary(),
        LifecycleError::Crashed {
            error: TaskError::Panicked { .. },
            ..
        }
    ));
    a.stop().await.unwrap();
    assert_eq!(a.state(), State::Crashed);
}

#[tokio::test(start_paused = true)]
async fn test_request_stop_ends_run_cleanly() {
    let journal = Journal::default();
    let a = Probe::new("a", &journal).handle();

    let run = tokio::spawn({
        let a = a.clone();
        async move { a.run().await }
    });
    sleep(Duration::from_millis(10)).await;
    assert!(a.running());

    assert!(a.request_stop());
    assert!(!a.request_stop());
    run.await.unwrap().unwrap();
    assert_eq!(a.state(), State::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_run_stops_the_tree() {
    let journal = Journal::default();
    let b = Probe::new("b", &journal).handle();
    let a = Probe::new("a", &journal).deps(vec![b.clone().into()]).handle();

    let res = tokio::time::timeout(Duration::from_millis(10), a.run()).await;
    assert!(res.is_err());

    sleep(Duration::from_millis(10)).await;
    assert_eq!(a.state(), State::Stopped);
    assert_eq!(b.state(), State::Stopped);
    assert_eq!(journal.count("b.stopped"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_run_during_start_rolls_back() {
    let journal = Journal::default();
    let b = Probe {
        idle_task: true,
        ..Probe::new("b", &journal)
    }
    .handle();
    let a = Probe {
        start_delay: Duration::from_secs(3600),
        ..Probe::new("a", &journal)
    }
    .deps(vec![b.clone().into()])
    .handle();

    let res = tokio::time::timeout(Duration::from_millis(10), a.run()).await;
    assert!(res.is_err());

    sleep(Duration::from_secs(60)).await;
    assert_eq!(a.state(), State::Stopped);
    assert_eq!(b.state(), State::Stopped);
    assert_eq!(journal.count("a.started"), 0);
    assert_eq!(journal.count("b.task.cancelled"), 1);
    assert_eq!(journal.count("b.stopped"), 1);
    assert_eq!(b.live_tasks(), 0);
    assert!(matches!(a.termination(), Some(Outcome::Stopped)));

    let stopped = tokio::time::timeout(Duration::from_secs(1), a.stop())
        .await
        .expect("stop after a cancelled start returns");
    assert!(matches!(stopped, Err(LifecycleError::NotRunning { .. })));
}

/// Spawns a task that fails while the start body is still running.
struct CrashesWhileStarting {
    dep: ServiceHandle,
}

#[async_trait]
impl Service for CrashesWhileStarting {
    fn name(&self) -> &str {
        "early"
    }

    fn dependencies(&self) -> Vec<Group> {
        vec![self.dep.clone().into()]
    }

    async fn start(&self, ctx: &ServiceContext) -> anyhow::Result<()> {
        ctx.add_task("y", |_| async { Err(TaskError::fail("Y")) })?;
        sleep(Duration::from_millis(5)).await;
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_task_crash_during_start_is_the_run_error() {
    let journal = Journal::default();
    let b = Probe::new("b", &journal).handle();
    let a = ServiceHandle::new(CrashesWhileStarting { dep: b.clone() });

    let err = a.run().await.unwrap_err();
    match err.primary() {
        LifecycleError::Crashed { service, task, .. } => {
            assert_eq!(&**service, "early");
            assert_eq!(&**task, "y");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(a.state(), State::Crashed);
    assert_eq!(b.state(), State::Stopped);
    assert_eq!(journal.count("b.stopped"), 1);

    let waited = a.wait().await.unwrap_err();
    assert_eq!(waited.as_label(), "crashed");
}

struct PanicsOnStart {
    dep: ServiceHandle,
    explode: bool,
}

#[async_trait]
impl Service for PanicsOnStart {
    fn name(&self) -> &str {
        "panicky"
    }

    fn dependencies(&self) -> Vec<Group> {
        vec![self.dep.clone().into()]
    }

    async fn start(&self, _ctx: &ServiceContext) -> anyhow::Result<()> {
        if self.explode {
            panic!("config missing");
        }
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_panicking_start_rolls_back() {
    let journal = Journal::default();
    let b = Probe::new("b", &journal).handle();
    let a = ServiceHandle::new(PanicsOnStart {
        dep: b.clone(),
        explode: true,
    });

    let err = a.start().await.unwrap_err();
    assert_eq!(err.as_label(), "start_failed");
    assert_eq!(service_of(&err), Some("panicky"));
    assert!(err.to_string().contains("config missing"));
    assert_eq!(a.state(), State::Stopped);
    assert_eq!(b.state(), State::Stopped);
    assert!(matches!(a.stop().await, Err(LifecycleError::NotRunning { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_start_in_flight() {
    let journal = Journal::default();
    let b = Probe::new("b", &journal).handle();
    let a = Probe {
        start_delay: Duration::from_secs(3600),
        ..Probe::new("a", &journal)
    }
    .deps(vec![b.clone().into()])
    .handle();

    let starting = tokio::spawn({
        let a = a.clone();
        async move { a.start().await }
    });
    sleep(Duration::from_millis(10)).await;
    assert_eq!(a.state(), State::Starting);

    a.stop().await.unwrap();
    let err = starting.await.unwrap().unwrap_err();
    assert!(matches!(err.primary(), LifecycleError::Cancelled { service } if &**service == "a"));
    assert_eq!(a.state(), State::Stopped);
    assert_eq!(b.state(), State::Stopped);
    assert_eq!(journal.count("a.started"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_diamond_dependency_starts_once() {
    let journal = Journal::default();
    let db = Probe::new("db", &journal).handle();
    let left = Probe::new("left", &journal).deps(vec![db.clone().into()]).handle();
    let right = Probe::new("right", &journal).deps(vec![db.clone().into()]).handle();
    let root = Probe::new("root", &journal)
        .deps(vec![vec![left.clone(), right.clone()].into()])
        .handle();

    root.start().await.unwrap();
    assert_eq!(journal.count("db.start"), 1);
    assert_eq!(db.node().dependents(), 2);

    root.stop().await.unwrap();
    assert_eq!(journal.count("db.stop"), 1);
    assert!(journal.pos("left.stopped") < journal.pos("db.stop"));
    assert!(journal.pos("right.stopped") < journal.pos("db.stop"));
    assert_eq!(db.state(), State::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_member_is_shared() {
    let journal = Journal::default();
    let b = Probe::new("b", &journal).handle();
    let a = Probe::new("a", &journal)
        .deps(vec![vec![b.clone(), b.clone()].into()])
        .handle();

    a.start().await.unwrap();
    assert_eq!(journal.count("b.start"), 1);
    a.stop().await.unwrap();
    assert_eq!(journal.count("b.stop"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shared_dependency_outlives_first_root() {
    let journal = Journal::default();
    let c = Probe {
        start_delay: Duration::from_millis(10),
        ..Probe::new("c", &journal)
    }
    .handle();
    let a = Probe::new("a", &journal).deps(vec![c.clone().into()]).handle();
    let b = Probe::new("b", &journal).deps(vec![c.clone().into()]).handle();

    let (ra, rb) = tokio::join!(a.start(), b.start());
    ra.unwrap();
    rb.unwrap();
    assert_eq!(journal.count("c.start"), 1);

    a.stop().await.unwrap();
    assert!(c.running());
    assert_eq!(journal.count("c.stop"), 0);

    b.stop().await.unwrap();
    assert_eq!(c.state(), State::Stopped);
    assert_eq!(journal.count("c.stop"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_scope_returns_body_value() {
    let journal = Journal::default();
    let b = Probe::new("b", &journal).handle();
    let a = Probe::new("a", &journal).deps(vec![b.clone().into()]).handle();

    let value = a
        .scope(|h| async move {
            assert!(h.running());
            Ok(42)
        })
        .await
        .unwrap();

    assert_eq!(value, 42);
    assert_eq!(a.state(), State::Stopped);
    assert_eq!(b.state(), State::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_scope_error_becomes_stop_cause() {
    let journal = Journal::default();
    let b = Probe::new("b", &journal).handle();
    let a = Probe::new("a", &journal).deps(vec![b.clone().into()]).handle();

    let err = a
        .scope(|_| async { Err::<(), _>(anyhow::anyhow!("body failed")) })
        .await
        .unwrap_err();

    assert_eq!(err.as_label(), "scope_failed");
    assert_eq!(err.cause().map(|c| c.to_string()), Some("body failed".into()));
    assert_eq!(a.state(), State::Crashed);
    assert_eq!(b.state(), State::Stopped);
    assert!(a.termination().is_some_and(|o| o.is_failure()));
}

#[tokio::test(start_paused = true)]
async fn test_crash_aborts_scope_body() {
    let journal = Journal::default();
    let a = Probe {
        crash_after: Some(Duration::from_millis(10)),
        ..Probe::new("a", &journal)
    }
    .handle();

    let err = a
        .scope(|_| async {
            sleep(Duration::from_secs(3600)).await;
            Ok(())
        })
        .await
        .unwrap_err();

    assert_eq!(err.as_label(), "crashed");
    assert_eq!(a.state(), State::Crashed);
}

#[tokio::test(start_paused = true)]
async fn test_subscribers_see_lifecycle_events() {
    let journal = Journal::default();
    let events = Collector::default();
    let a = ServiceHandle::builder(Probe::new("a", &journal))
        .with_subscriber(events.clone())
        .build();

    a.start().await.unwrap();
    a.stop().await.unwrap();
    sleep(Duration::from_millis(10)).await;

    assert_eq!(
        events.kinds(),
        [
            EventKind::ServiceStarting,
            EventKind::ServiceStarted,
            EventKind::StopRequested,
            EventKind::ServiceStopping,
            EventKind::ServiceStopped,
            EventKind::AllStoppedWithin,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_state_watch_follows_transitions() {
    let journal = Journal::default();
    let a = Probe {
        start_delay: Duration::from_millis(10),
        stop_delay: Duration::from_millis(10),
        ..Probe::new("a", &journal)
    }
    .handle();
    let mut watch = a.subscribe_state();
    assert_eq!(watch.current(), State::Idle);

    let starting = tokio::spawn({
        let a = a.clone();
        async move { a.start().await }
    });
    assert_eq!(watch.wait_for(|s| s == State::Running).await, State::Running);
    starting.await.unwrap().unwrap();

    let stopping = tokio::spawn({
        let a = a.clone();
        async move { a.stop().await }
    });
    assert_eq!(watch.changed().await, Some(State::Stopping));
    assert_eq!(watch.changed().await, Some(State::Stopped));
    stopping.await.unwrap().unwrap();
}
