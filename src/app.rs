use crate::config::{self, Settings};
use crate::engine::ConsistencyEngine;
use crate::event_model::{Clock, SystemClock};
use crate::logging::{JsonLineLogger, PipelineLogEvent};
use crate::store::{MemoryOnlineStore, SnapshotOfflineStore};
use crate::telemetry::PipelineTelemetry;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

/// Application bootstrap: load and validate settings, stand up the stores
/// and engine, and report readiness. The stream transport and scoring
/// gateway attach as collaborators around this core.
pub fn run() -> Result<()> {
    let config_path = config::config_path_from_env();
    let settings = if Path::new(&config_path).exists() {
        config::load_settings(Path::new(&config_path))
            .with_context(|| format!("loading settings from {config_path}"))?
    } else {
        Settings::default()
    };

    let clock = Arc::new(SystemClock::new());
    let telemetry = Arc::new(PipelineTelemetry::new());
    let online = Arc::new(MemoryOnlineStore::new());
    let offline = Arc::new(SnapshotOfflineStore::new());
    let engine = ConsistencyEngine::new(
        online,
        offline,
        clock.clone(),
        &settings,
        telemetry.clone(),
    );

    let mut logger = JsonLineLogger::default();
    logger.record(
        clock.now_ms(),
        &PipelineLogEvent::Startup {
            config_path,
            partitions: settings.partitions,
            ttl_seconds: settings.ttl_seconds,
        },
    )?;

    let snapshot = telemetry.snapshot(clock.now_ms());
    println!(
        "coheron ready (schema v{}, {} partitions)",
        engine.schema().version(),
        settings.partitions
    );
    println!(
        "{}",
        serde_json::to_string_pretty(&snapshot).context("serializing startup metrics")?
    );
    Ok(())
}
