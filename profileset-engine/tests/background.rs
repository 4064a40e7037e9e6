use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use profileset_engine::{
    Completion, MetricKind, Orchestrator, PlayerReport, ProfilesetDefinition, ProfilesetError,
    SampleData, SimConfig, SimOutcome, SimulationError, Simulator,
};

fn outcome(config: &SimConfig) -> SimOutcome {
    let dps: f64 = config.get_parsed("base_dps").ok().flatten().unwrap_or(1.0);
    let player = PlayerReport::new("player")
        .with_samples(MetricKind::Dps, SampleData::from_samples(vec![dps; 4]));
    SimOutcome::new(4, vec![player])
}

fn batch(count: usize) -> Orchestrator {
    let definitions: Vec<ProfilesetDefinition> = (0..count)
        .map(|i| ProfilesetDefinition::new(format!("v{i}"), [format!("base_dps={i}")]))
        .collect();
    let mut orchestrator =
        Orchestrator::new(SimConfig::parse(["iterations=4"]).unwrap()).unwrap();
    orchestrator.parse(&definitions).unwrap();
    orchestrator.initialize().unwrap();
    orchestrator
}

/// Engine that parks on one named variant until the test releases it.
struct GatedEngine {
    gate: String,
    reached: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
    calls: AtomicUsize,
}

impl GatedEngine {
    fn new(gate: &str) -> (Arc<Self>, Receiver<()>, Sender<()>) {
        let (reached_tx, reached_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let engine = Arc::new(Self {
            gate: gate.to_string(),
            reached: Mutex::new(reached_tx),
            release: Mutex::new(release_rx),
            calls: AtomicUsize::new(0),
        });
        (engine, reached_rx, release_tx)
    }
}

impl Simulator for GatedEngine {
    fn simulate(&self, config: &SimConfig) -> Result<SimOutcome, SimulationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let index = config.get("base_dps").unwrap_or_default();
        if format!("v{index}") == self.gate {
            self.reached
                .lock()
                .map_err(|_| SimulationError::new("gate poisoned"))?
                .send(())
                .map_err(|_| SimulationError::new("test gone"))?;
            self.release
                .lock()
                .map_err(|_| SimulationError::new("gate poisoned"))?
                .recv()
                .map_err(|_| SimulationError::new("test gone"))?;
        }
        Ok(outcome(config))
    }
}

#[test]
fn background_run_reports_progress_and_finishes() {
    let mut orchestrator = batch(3);
    let (engine, reached, release) = GatedEngine::new("v1");
    orchestrator.iterate_background(engine.clone()).unwrap();

    reached.recv().unwrap();
    assert!(orchestrator.is_running());
    assert_eq!(orchestrator.current_profileset_name().as_deref(), Some("v1"));
    assert_eq!(orchestrator.progress().claimed, 2);
    assert!(matches!(
        orchestrator.variants(),
        Err(ProfilesetError::InvalidState { .. })
    ));
    assert!(orchestrator.variant("v0").is_none());
    assert!(!orchestrator.wait_until_done(Some(Duration::from_millis(5))));

    release.send(()).unwrap();
    while !orchestrator.wait_until_done(Some(Duration::from_millis(10))) {}
    assert!(orchestrator.is_done());
    assert_eq!(orchestrator.wait().unwrap(), Completion::Finished);
    assert_eq!(engine.calls.load(Ordering::SeqCst), 3);

    let variants = orchestrator.variants().unwrap();
    assert_eq!(variants.len(), 3);
    assert!(variants.iter().all(|v| v.has_result(MetricKind::Dps)));
    assert_eq!(orchestrator.report().unwrap().results[0].name, "v2");
}

#[test]
fn cancel_during_background_run_lets_claimed_variant_finish() {
    let mut orchestrator = batch(6);
    let (engine, reached, release) = GatedEngine::new("v2");
    orchestrator.iterate_background(engine.clone()).unwrap();

    reached.recv().unwrap();
    let claimed_at_cancel = orchestrator.progress().claimed;
    orchestrator.cancel();
    release.send(()).unwrap();

    assert_eq!(orchestrator.wait().unwrap(), Completion::Cancelled);
    assert!(orchestrator.is_done());
    let progress = orchestrator.progress();
    assert_eq!(claimed_at_cancel, 3);
    assert_eq!(progress.claimed, claimed_at_cancel);
    assert_eq!(progress.completed, claimed_at_cancel);
    assert_eq!(engine.calls.load(Ordering::SeqCst), 3);

    let finished = orchestrator
        .variants()
        .unwrap()
        .iter()
        .filter(|v| v.has_result(MetricKind::Dps))
        .count();
    assert_eq!(finished, 3);
}

#[test]
fn second_run_is_rejected_while_worker_active() {
    let mut orchestrator = batch(2);
    let (engine, reached, release) = GatedEngine::new("v0");
    orchestrator.iterate_background(engine.clone()).unwrap();
    reached.recv().unwrap();

    assert!(matches!(
        orchestrator.iterate(engine.as_ref()),
        Err(ProfilesetError::InvalidState { .. })
    ));
    assert!(matches!(
        orchestrator.iterate_background(engine.clone()),
        Err(ProfilesetError::InvalidState { .. })
    ));
    release.send(()).unwrap();
    assert_eq!(orchestrator.wait().unwrap(), Completion::Finished);
}

#[test]
fn worker_errors_surface_on_wait() {
    let mut orchestrator = batch(3);
    let engine = |config: &SimConfig| -> Result<SimOutcome, SimulationError> {
        if config.get("base_dps") == Some("1") {
            Err(SimulationError::new("segfault"))
        } else {
            Ok(outcome(config))
        }
    };
    orchestrator.iterate_background(Arc::new(engine)).unwrap();
    let err = orchestrator.wait().unwrap_err();
    assert!(matches!(err, ProfilesetError::Simulation { ref profileset, .. } if profileset == "v1"));
    assert!(orchestrator.is_done());
    assert_eq!(orchestrator.variants().unwrap().len(), 3);
    assert_eq!(orchestrator.completion(), Some(Completion::Failed));
    let report = orchestrator.report().unwrap();
    assert!(report.failed);
    assert!(!report.cancelled);
}

#[test]
fn worker_panic_is_reported() {
    let mut orchestrator = batch(1);
    let engine = |_: &SimConfig| -> Result<SimOutcome, SimulationError> {
        panic!("engine bug");
    };
    orchestrator.iterate_background(Arc::new(engine)).unwrap();
    assert!(matches!(
        orchestrator.wait(),
        Err(ProfilesetError::WorkerPanicked)
    ));
    assert_eq!(orchestrator.wait().unwrap(), Completion::Failed);
}

#[test]
fn dropping_mid_run_cancels_and_joins() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let engine = move |config: &SimConfig| -> Result<SimOutcome, SimulationError> {
        counter.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(5));
        Ok(outcome(config))
    };
    let mut orchestrator = batch(40);
    orchestrator.iterate_background(Arc::new(engine)).unwrap();
    drop(orchestrator);

    let after_drop = calls.load(Ordering::SeqCst);
    assert!(after_drop < 40);
    thread::sleep(Duration::from_millis(20));
    assert_eq!(calls.load(Ordering::SeqCst), after_drop);
}
