use crate::config::Settings;
use crate::engine::{ConsistencyEngine, EngineError};
use crate::event_model::{Clock, DedupDecision, DedupWindow, TransactionEvent};
use crate::ingest::backoff::Backoff;
use crate::ingest::checkpoint::{CheckpointError, CheckpointStore};
use crate::logging::{JsonLineLogger, PipelineLogEvent};
use crate::telemetry::bump;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// One serialized record delivered by the stream transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord {
    pub offset: u64,
    pub payload: Vec<u8>,
}

impl StreamRecord {
    pub fn new(offset: u64, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            offset,
            payload: payload.into(),
        }
    }
}

/// Transient transport failure; retried with backoff before turning fatal.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("stream fetch failed: {detail}")]
pub struct StreamSourceError {
    pub detail: String,
}

impl StreamSourceError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

/// Ordered, at-least-once source for a single stream partition. The
/// transport guarantees delivery order within the partition; redelivery is
/// tolerated because the write path is idempotent.
pub trait StreamSource {
    /// Fetches the next batch of records at or after the current position.
    /// An empty batch means no data is currently available.
    fn fetch(&mut self) -> Result<Vec<StreamRecord>, StreamSourceError>;
}

/// Unrecoverable ingest failure: the loop halts, the checkpoint does not
/// advance, and the partition needs operator or restart intervention.
#[derive(Debug, Error)]
pub enum FatalIngestError {
    #[error("stream source exhausted {attempts} fetch attempts on partition {partition_id}: {detail}")]
    SourceExhausted {
        partition_id: String,
        attempts: u32,
        detail: String,
    },
    #[error("engine halted ingest on partition {partition_id}: {source}")]
    Engine {
        partition_id: String,
        #[source]
        source: EngineError,
    },
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

/// Per-batch accounting returned by `run_once`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestBatchReport {
    pub fetched: usize,
    pub applied: usize,
    pub replayed: usize,
    pub skipped_invalid: usize,
    pub skipped_duplicate: usize,
    pub last_committed_offset: Option<u64>,
}

/// Drives one stream partition: fetch, validate, dedup, apply, checkpoint.
///
/// One ingestor instance owns one partition; entity keys are co-partitioned
/// by the transport so no two ingestors write the same entity under correct
/// partitioning. The engine's CAS is the safety net when that assumption is
/// violated (rebalance windows, operator error).
pub struct Ingestor<S: StreamSource> {
    partition_id: String,
    source: S,
    engine: Arc<ConsistencyEngine>,
    checkpoints: Arc<dyn CheckpointStore>,
    clock: Arc<dyn Clock>,
    dedup: DedupWindow,
    backoff: Backoff,
    logger: JsonLineLogger,
    last_committed_offset: Option<u64>,
}

impl<S: StreamSource> Ingestor<S> {
    pub fn new(
        partition_id: impl Into<String>,
        source: S,
        engine: Arc<ConsistencyEngine>,
        checkpoints: Arc<dyn CheckpointStore>,
        clock: Arc<dyn Clock>,
        settings: &Settings,
        logger: JsonLineLogger,
    ) -> Result<Self, FatalIngestError> {
        let partition_id = partition_id.into();
        let last_committed_offset = checkpoints.load(&partition_id)?;
        Ok(Self {
            partition_id,
            source,
            engine,
            checkpoints,
            clock,
            dedup: DedupWindow::new(settings.dedup_window_size),
            backoff: Backoff::new(
                settings.backoff_initial_ms,
                settings.backoff_cap_ms,
                settings.fetch_max_attempts,
            ),
            logger,
            last_committed_offset,
        })
    }

    /// Offset restored from the checkpoint store at construction, updated
    /// as commits succeed.
    pub fn last_committed_offset(&self) -> Option<u64> {
        self.last_committed_offset
    }

    /// Structured log segments accumulated so far.
    pub fn logger(&self) -> &JsonLineLogger {
        &self.logger
    }

    /// Consumes until the stop flag is raised or a fatal error occurs.
    ///
    /// The stop signal is cooperative: it is checked between records, so an
    /// in-flight apply always completes and no partial state is persisted.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<IngestBatchReport, FatalIngestError> {
        let mut totals = IngestBatchReport::default();
        while !stop.load(Ordering::SeqCst) {
            let report = self.run_once(stop)?;
            accumulate(&mut totals, &report);
            if report.fetched == 0 {
                // Idle partition; wait one base interval before polling again.
                thread::sleep(Duration::from_millis(self.backoff.delay_for(1).unwrap_or(0)));
            }
        }
        self.log(PipelineLogEvent::StopRequested {
            partition_id: self.partition_id.clone(),
            last_committed_offset: self.last_committed_offset,
        });
        totals.last_committed_offset = self.last_committed_offset;
        Ok(totals)
    }

    /// Fetches and processes a single batch; the unit-testable loop body.
    pub fn run_once(&mut self, stop: &AtomicBool) -> Result<IngestBatchReport, FatalIngestError> {
        let batch = self.fetch_with_backoff()?;
        let mut report = IngestBatchReport {
            fetched: batch.len(),
            ..IngestBatchReport::default()
        };
        for record in batch {
            if stop.load(Ordering::SeqCst) {
                break;
            }
            self.process_record(record, &mut report)?;
        }
        report.last_committed_offset = self.last_committed_offset;
        Ok(report)
    }

    fn process_record(
        &mut self,
        record: StreamRecord,
        report: &mut IngestBatchReport,
    ) -> Result<(), FatalIngestError> {
        bump(&self.engine.telemetry().events_total);

        let event = match TransactionEvent::decode(&record.payload) {
            Ok(event) => event,
            Err(validation) => {
                // Malformed input skips the record; the stream keeps moving
                // and the offset still commits so the poison record is not
                // refetched forever.
                bump(&self.engine.telemetry().validation_failures_total);
                report.skipped_invalid += 1;
                self.log(PipelineLogEvent::ValidationSkip {
                    partition_id: self.partition_id.clone(),
                    offset: record.offset,
                    detail: validation.to_string(),
                });
                return self.commit(record.offset);
            }
        };

        if self.dedup.check(&event.event_id) == DedupDecision::RecentDuplicate {
            // The window holds only engine-confirmed ids, so the offset is
            // safe to advance.
            bump(&self.engine.telemetry().dedup_skipped_total);
            report.skipped_duplicate += 1;
            self.log(PipelineLogEvent::DuplicateSkip {
                partition_id: self.partition_id.clone(),
                offset: record.offset,
                event_id: event.event_id.clone(),
            });
            return self.commit(record.offset);
        }

        match self.engine.apply(&event) {
            Ok(outcome) => {
                // Remembered only now that the write is durably confirmed;
                // a failed apply leaves the id fresh for the redelivery.
                self.dedup.confirm(&event.event_id);
                match outcome {
                    crate::engine::ApplyOutcome::Applied { .. } => report.applied += 1,
                    crate::engine::ApplyOutcome::Replayed { .. } => report.replayed += 1,
                }
                self.commit(record.offset)
            }
            Err(source) => {
                if let EngineError::WriteConflictExhausted {
                    entity_id,
                    attempted_version,
                    ..
                } = &source
                {
                    self.log(PipelineLogEvent::ConflictExhausted {
                        partition_id: self.partition_id.clone(),
                        entity_id: entity_id.clone(),
                        attempted_version: *attempted_version,
                    });
                }
                self.log(PipelineLogEvent::IngestHalt {
                    partition_id: self.partition_id.clone(),
                    detail: source.to_string(),
                });
                // Checkpoint deliberately not advanced: the record will be
                // redelivered after restart and the idempotent write makes
                // that safe.
                Err(FatalIngestError::Engine {
                    partition_id: self.partition_id.clone(),
                    source,
                })
            }
        }
    }

    fn commit(&mut self, offset: u64) -> Result<(), FatalIngestError> {
        // An at-least-once transport may redeliver offsets at or before
        // the committed position; those are already durable, not an error.
        // The store's regression check still guards against a rival worker
        // moving the partition backwards.
        if matches!(self.last_committed_offset, Some(committed) if offset <= committed) {
            return Ok(());
        }
        self.checkpoints.commit(&self.partition_id, offset)?;
        self.last_committed_offset = Some(offset);
        bump(&self.engine.telemetry().checkpoints_committed_total);
        Ok(())
    }

    fn fetch_with_backoff(&mut self) -> Result<Vec<StreamRecord>, FatalIngestError> {
        let mut attempt = 0u32;
        loop {
            match self.source.fetch() {
                Ok(batch) => return Ok(batch),
                Err(failure) => {
                    attempt += 1;
                    match self.backoff.delay_for(attempt) {
                        Some(delay_ms) => {
                            self.log(PipelineLogEvent::FetchRetry {
                                partition_id: self.partition_id.clone(),
                                attempt,
                                delay_ms,
                                detail: failure.detail.clone(),
                            });
                            thread::sleep(Duration::from_millis(delay_ms));
                        }
                        None => {
                            self.log(PipelineLogEvent::IngestHalt {
                                partition_id: self.partition_id.clone(),
                                detail: failure.detail.clone(),
                            });
                            return Err(FatalIngestError::SourceExhausted {
                                partition_id: self.partition_id.clone(),
                                attempts: attempt,
                                detail: failure.detail,
                            });
                        }
                    }
                }
            }
        }
    }

    fn log(&mut self, event: PipelineLogEvent) {
        let ts_ms = self.clock.now_ms();
        // A logger serialization failure must never stall ingestion.
        let _ = self.logger.record(ts_ms, &event);
    }
}

fn accumulate(totals: &mut IngestBatchReport, report: &IngestBatchReport) {
    totals.fetched += report.fetched;
    totals.applied += report.applied;
    totals.replayed += report.replayed;
    totals.skipped_invalid += report.skipped_invalid;
    totals.skipped_duplicate += report.skipped_duplicate;
    totals.last_committed_offset = report.last_committed_offset;
}
