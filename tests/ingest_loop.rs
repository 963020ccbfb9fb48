use coheron::{
    Backoff, CasOutcome, CheckpointError, CheckpointStore, ConsistencyEngine, FatalIngestError,
    FeatureState, Ingestor, JsonLineLogger, ManualClock, MemoryCheckpointStore, MemoryOnlineStore,
    OnlineStore, PipelineTelemetry, Settings, SnapshotOfflineStore, StoreError, StreamRecord,
    StreamSource, StreamSourceError, TransactionEvent,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

const T0: u64 = 1_623_067_200_000;

/// Source replaying a scripted sequence of fetch results, then idling.
struct ScriptedSource {
    script: VecDeque<Result<Vec<StreamRecord>, StreamSourceError>>,
}

impl ScriptedSource {
    fn new(script: Vec<Result<Vec<StreamRecord>, StreamSourceError>>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }
}

impl StreamSource for ScriptedSource {
    fn fetch(&mut self) -> Result<Vec<StreamRecord>, StreamSourceError> {
        self.script.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}

fn payload(event_id: &str, entity_id: &str, timestamp_ms: u64, amount: f64) -> Vec<u8> {
    serde_json::to_vec(&TransactionEvent::new(event_id, entity_id, timestamp_ms, amount)).unwrap()
}

fn quiet_settings() -> Settings {
    Settings {
        backoff_initial_ms: 0,
        fetch_max_attempts: 3,
        ..Settings::default()
    }
}

fn engine_with(online: Arc<dyn OnlineStore>, settings: &Settings) -> Arc<ConsistencyEngine> {
    Arc::new(ConsistencyEngine::new(
        online,
        Arc::new(SnapshotOfflineStore::new()),
        Arc::new(ManualClock::new(T0)),
        settings,
        Arc::new(PipelineTelemetry::new()),
    ))
}

fn ingestor(
    source: ScriptedSource,
    engine: Arc<ConsistencyEngine>,
    checkpoints: Arc<dyn CheckpointStore>,
    settings: &Settings,
) -> Ingestor<ScriptedSource> {
    Ingestor::new(
        "p0",
        source,
        engine,
        checkpoints,
        Arc::new(ManualClock::new(T0)),
        settings,
        JsonLineLogger::default(),
    )
    .unwrap()
}

fn logged_lines(ingestor: &Ingestor<ScriptedSource>) -> Vec<String> {
    ingestor
        .logger()
        .segments()
        .flat_map(|segment| segment.lines().iter().cloned())
        .collect()
}

#[test]
fn valid_records_apply_and_advance_the_checkpoint() {
    let settings = quiet_settings();
    let online = Arc::new(MemoryOnlineStore::new());
    let engine = engine_with(online.clone(), &settings);
    let checkpoints = Arc::new(MemoryCheckpointStore::new());
    let source = ScriptedSource::new(vec![Ok(vec![
        StreamRecord::new(0, payload("e1", "acct-1", T0, 100.0)),
        StreamRecord::new(1, payload("e2", "acct-1", T0 + 1_000, 50.0)),
    ])]);
    let mut ingestor = ingestor(source, engine, checkpoints.clone(), &settings);

    let stop = AtomicBool::new(false);
    let report = ingestor.run_once(&stop).unwrap();
    assert_eq!(report.fetched, 2);
    assert_eq!(report.applied, 2);
    assert_eq!(report.last_committed_offset, Some(1));
    assert_eq!(checkpoints.load("p0").unwrap(), Some(1));
    assert_eq!(online.get("acct-1").unwrap().unwrap().version, 2);
}

#[test]
fn invalid_and_duplicate_records_skip_but_still_commit() {
    let settings = quiet_settings();
    let engine = engine_with(Arc::new(MemoryOnlineStore::new()), &settings);
    let checkpoints = Arc::new(MemoryCheckpointStore::new());
    let e1 = payload("e1", "acct-1", T0, 100.0);
    let source = ScriptedSource::new(vec![Ok(vec![
        StreamRecord::new(10, b"{not json".to_vec()),
        StreamRecord::new(11, e1.clone()),
        StreamRecord::new(12, e1),
    ])]);
    let mut ingestor = ingestor(source, engine.clone(), checkpoints.clone(), &settings);

    let stop = AtomicBool::new(false);
    let report = ingestor.run_once(&stop).unwrap();
    assert_eq!(report.skipped_invalid, 1);
    assert_eq!(report.applied, 1);
    assert_eq!(report.skipped_duplicate, 1);
    // Skips commit their offsets too, so poison records are never refetched.
    assert_eq!(checkpoints.load("p0").unwrap(), Some(12));

    let lines = logged_lines(&ingestor);
    assert!(lines.iter().any(|line| line.contains("validation_skip")));
    assert!(lines.iter().any(|line| line.contains("duplicate_skip")));

    let snapshot = engine.telemetry().snapshot(T0);
    assert_eq!(snapshot.value("coheron_validation_failures_total"), Some(1));
    assert_eq!(snapshot.value("coheron_dedup_skipped_total"), Some(1));
}

/// Store whose writes always conflict, driving the engine to exhaustion.
struct AlwaysConflict;

impl OnlineStore for AlwaysConflict {
    fn get(&self, _entity_id: &str) -> Result<Option<FeatureState>, StoreError> {
        Ok(None)
    }

    fn compare_and_swap(
        &self,
        _entity_id: &str,
        _expected_version: Option<u64>,
        _new_state: FeatureState,
    ) -> Result<CasOutcome, StoreError> {
        Ok(CasOutcome::Conflict {
            actual_version: Some(7),
        })
    }
}

#[test]
fn engine_failure_halts_without_advancing_the_checkpoint() {
    let settings = quiet_settings();
    let engine = engine_with(Arc::new(AlwaysConflict), &settings);
    let checkpoints = Arc::new(MemoryCheckpointStore::new());
    let source = ScriptedSource::new(vec![Ok(vec![StreamRecord::new(
        5,
        payload("e1", "acct-1", T0, 100.0),
    )])]);
    let mut ingestor = ingestor(source, engine, checkpoints.clone(), &settings);

    let stop = AtomicBool::new(false);
    match ingestor.run_once(&stop) {
        Err(FatalIngestError::Engine { partition_id, .. }) => assert_eq!(partition_id, "p0"),
        other => panic!("expected an engine halt, got {other:?}"),
    }
    // The failed record's offset must be redelivered after restart.
    assert_eq!(checkpoints.load("p0").unwrap(), None);
    assert_eq!(ingestor.last_committed_offset(), None);

    let lines = logged_lines(&ingestor);
    assert!(lines.iter().any(|line| line.contains("conflict_exhausted")));
    assert!(lines.iter().any(|line| line.contains("ingest_halt")));
}

#[test]
fn transient_fetch_failures_retry_then_exhaust() {
    let settings = quiet_settings();
    let engine = engine_with(Arc::new(MemoryOnlineStore::new()), &settings);
    let checkpoints = Arc::new(MemoryCheckpointStore::new());
    let source = ScriptedSource::new(vec![
        Err(StreamSourceError::new("broker down")),
        Err(StreamSourceError::new("broker down")),
        Err(StreamSourceError::new("broker down")),
    ]);
    let mut ingestor = ingestor(source, engine, checkpoints, &settings);

    let stop = AtomicBool::new(false);
    match ingestor.run_once(&stop) {
        Err(FatalIngestError::SourceExhausted {
            partition_id,
            attempts,
            detail,
        }) => {
            assert_eq!(partition_id, "p0");
            assert_eq!(attempts, 3);
            assert_eq!(detail, "broker down");
        }
        other => panic!("expected source exhaustion, got {other:?}"),
    }
    let lines = logged_lines(&ingestor);
    assert_eq!(
        lines.iter().filter(|line| line.contains("fetch_retry")).count(),
        2
    );
}

#[test]
fn fetch_recovers_when_a_retry_succeeds() {
    let settings = quiet_settings();
    let engine = engine_with(Arc::new(MemoryOnlineStore::new()), &settings);
    let checkpoints = Arc::new(MemoryCheckpointStore::new());
    let source = ScriptedSource::new(vec![
        Err(StreamSourceError::new("timeout")),
        Ok(vec![StreamRecord::new(0, payload("e1", "acct-1", T0, 25.0))]),
    ]);
    let mut ingestor = ingestor(source, engine, checkpoints.clone(), &settings);

    let stop = AtomicBool::new(false);
    let report = ingestor.run_once(&stop).unwrap();
    assert_eq!(report.applied, 1);
    assert_eq!(checkpoints.load("p0").unwrap(), Some(0));
}

#[test]
fn raised_stop_flag_skips_records_within_the_batch() {
    let settings = quiet_settings();
    let engine = engine_with(Arc::new(MemoryOnlineStore::new()), &settings);
    let checkpoints = Arc::new(MemoryCheckpointStore::new());
    let source = ScriptedSource::new(vec![Ok(vec![
        StreamRecord::new(0, payload("e1", "acct-1", T0, 100.0)),
        StreamRecord::new(1, payload("e2", "acct-1", T0 + 1_000, 50.0)),
    ])]);
    let mut ingestor = ingestor(source, engine, checkpoints.clone(), &settings);

    let stop = AtomicBool::new(true);
    let report = ingestor.run_once(&stop).unwrap();
    assert_eq!(report.fetched, 2);
    assert_eq!(report.applied, 0);
    assert_eq!(checkpoints.load("p0").unwrap(), None);
}

#[test]
fn redelivered_offset_is_skipped_without_halting() {
    let settings = quiet_settings();
    let online = Arc::new(MemoryOnlineStore::new());
    let engine = engine_with(online.clone(), &settings);
    let checkpoints = Arc::new(MemoryCheckpointStore::new());
    let e1 = payload("e1", "acct-1", T0, 100.0);
    // The transport redelivers the same record, offset included.
    let source = ScriptedSource::new(vec![
        Ok(vec![StreamRecord::new(0, e1.clone())]),
        Ok(vec![StreamRecord::new(0, e1)]),
    ]);
    let mut ingestor = ingestor(source, engine.clone(), checkpoints.clone(), &settings);

    let stop = AtomicBool::new(false);
    let first = ingestor.run_once(&stop).unwrap();
    assert_eq!(first.applied, 1);
    assert_eq!(checkpoints.load("p0").unwrap(), Some(0));

    let second = ingestor.run_once(&stop).unwrap();
    assert_eq!(second.skipped_duplicate, 1);
    assert_eq!(second.applied, 0);
    assert_eq!(second.last_committed_offset, Some(0));
    assert_eq!(online.get("acct-1").unwrap().unwrap().version, 1);
    // Only the original delivery produced a durable commit.
    assert_eq!(
        engine
            .telemetry()
            .snapshot(T0)
            .value("coheron_checkpoints_committed_total"),
        Some(1)
    );
}

/// Store whose reads fail a fixed number of times before recovering.
struct FlakyOnlineStore {
    inner: MemoryOnlineStore,
    failures_left: AtomicU32,
}

impl OnlineStore for FlakyOnlineStore {
    fn get(&self, entity_id: &str) -> Result<Option<FeatureState>, StoreError> {
        if self.failures_left.load(Ordering::SeqCst) > 0 {
            self.failures_left.fetch_sub(1, Ordering::SeqCst);
            return Err(StoreError::unavailable("connection reset"));
        }
        self.inner.get(entity_id)
    }

    fn compare_and_swap(
        &self,
        entity_id: &str,
        expected_version: Option<u64>,
        new_state: FeatureState,
    ) -> Result<CasOutcome, StoreError> {
        self.inner.compare_and_swap(entity_id, expected_version, new_state)
    }
}

#[test]
fn redelivery_after_a_transient_outage_still_applies_the_event() {
    let settings = quiet_settings();
    // Enough failures to exhaust the engine's immediate read retries once.
    let online = Arc::new(FlakyOnlineStore {
        inner: MemoryOnlineStore::new(),
        failures_left: AtomicU32::new(3),
    });
    let engine = engine_with(online.clone(), &settings);
    let checkpoints = Arc::new(MemoryCheckpointStore::new());
    let e1 = payload("e1", "acct-1", T0, 100.0);
    let source = ScriptedSource::new(vec![
        Ok(vec![StreamRecord::new(0, e1.clone())]),
        Ok(vec![StreamRecord::new(0, e1)]),
    ]);
    let mut ingestor = ingestor(source, engine, checkpoints.clone(), &settings);

    let stop = AtomicBool::new(false);
    // The outage halts the loop with nothing written and nothing committed.
    assert!(matches!(
        ingestor.run_once(&stop),
        Err(FatalIngestError::Engine { .. })
    ));
    assert_eq!(checkpoints.load("p0").unwrap(), None);

    // The redelivered record must not read as a duplicate of the failed
    // attempt: the retry applies it and only then commits.
    let report = ingestor.run_once(&stop).unwrap();
    assert_eq!(report.skipped_duplicate, 0);
    assert_eq!(report.applied, 1);
    assert_eq!(checkpoints.load("p0").unwrap(), Some(0));
    assert_eq!(online.get("acct-1").unwrap().unwrap().version, 1);
}

#[test]
fn ingestor_resumes_from_the_stored_checkpoint() {
    let settings = quiet_settings();
    let engine = engine_with(Arc::new(MemoryOnlineStore::new()), &settings);
    let checkpoints = Arc::new(MemoryCheckpointStore::new());
    checkpoints.commit("p0", 41).unwrap();
    let mut ingestor = ingestor(ScriptedSource::new(vec![]), engine, checkpoints, &settings);
    assert_eq!(ingestor.last_committed_offset(), Some(41));

    let stop = AtomicBool::new(true);
    let report = ingestor.run(&stop).unwrap();
    assert_eq!(report.last_committed_offset, Some(41));
    let lines = logged_lines(&ingestor);
    assert!(lines.iter().any(|line| line.contains("stop_requested")));
}

#[test]
fn checkpoint_offsets_never_regress() {
    let store = MemoryCheckpointStore::new();
    store.commit("p3", 10).unwrap();
    store.commit("p3", 11).unwrap();
    match store.commit("p3", 9) {
        Err(CheckpointError::Regressed {
            committed,
            attempted,
            ..
        }) => {
            assert_eq!(committed, 11);
            assert_eq!(attempted, 9);
        }
        other => panic!("expected a regression error, got {other:?}"),
    }
    assert_eq!(store.load("p3").unwrap(), Some(11));
}

#[test]
fn backoff_doubles_up_to_the_cap_then_exhausts() {
    let backoff = Backoff::new(100, 1_000, 6);
    assert_eq!(backoff.delay_for(0), None);
    assert_eq!(backoff.delay_for(1), Some(100));
    assert_eq!(backoff.delay_for(2), Some(200));
    assert_eq!(backoff.delay_for(3), Some(400));
    assert_eq!(backoff.delay_for(4), Some(800));
    assert_eq!(backoff.delay_for(5), Some(1_000));
    assert_eq!(backoff.delay_for(6), None);
}
