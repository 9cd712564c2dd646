//! `chainproject replay`: apply a JSON-lines event feed and dump the tables.

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use chainproject_core::{
    CheckpointStore, ContractState, DeadLetter, DispatcherStats, EngineConfig, EntityStore, Event, Row,
    StaticContractReader,
};
use chainproject_storage::{InMemoryStore, SqliteStore};

pub struct ReplayArgs<'a> {
    pub events: &'a Path,
    pub state: Option<&'a Path>,
    pub db: Option<&'a str>,
    /// Only dump these tables; all when empty.
    pub tables: &'a [String],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDump {
    pub table: &'static str,
    pub rows: Vec<Row>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    pub tables: Vec<TableDump>,
    pub stats: DispatcherStats,
    pub dead_letters: Vec<DeadLetter>,
}

pub async fn run(args: ReplayArgs<'_>, config: Option<EngineConfig>) -> Result<()> {
    let file = std::fs::File::open(args.events)
        .with_context(|| format!("open event feed '{}'", args.events.display()))?;
    let events = read_events(std::io::BufReader::new(file))
        .with_context(|| format!("read event feed '{}'", args.events.display()))?;

    let states = match args.state {
        Some(path) => read_snapshot(path)?,
        None => Vec::new(),
    };
    let reader = Arc::new(StaticContractReader::from_snapshot(states));

    let report = match args.db {
        Some(path) => {
            let store = Arc::new(SqliteStore::open(path).await.with_context(|| format!("open database '{path}'"))?);
            replay(store, reader, events, config, args.tables).await?
        }
        None => replay(Arc::new(InMemoryStore::new()), reader, events, config, args.tables).await?,
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// One event per line; blank lines and `#` comments are skipped.
pub fn read_events(input: impl BufRead) -> Result<Vec<Event>> {
    let mut events = Vec::new();
    for (i, line) in input.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let event: Event = serde_json::from_str(line).with_context(|| format!("line {}", i + 1))?;
        events.push(event);
    }
    Ok(events)
}

/// A JSON array of contract states for the side channel.
pub fn read_snapshot(path: &Path) -> Result<Vec<ContractState>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read state snapshot '{}'", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parse state snapshot '{}'", path.display()))
}

pub async fn replay<S>(
    store: Arc<S>,
    reader: Arc<StaticContractReader>,
    events: Vec<Event>,
    config: Option<EngineConfig>,
    only: &[String],
) -> Result<ReplayReport>
where
    S: EntityStore + CheckpointStore + 'static,
{
    let mut builder = chainproject_allo::engine_builder();
    if let Some(config) = config {
        builder = builder.config(config);
    }
    let dispatcher = builder
        .store(store.clone())
        .checkpoints(store.clone())
        .reader(reader)
        .build_dispatcher()?;

    info!(events = events.len(), "replaying feed");
    for event in events {
        dispatcher.dispatch(event).await?;
    }
    dispatcher.flush().await;

    let stats = dispatcher.stats();
    let dead_letters = dispatcher.dead_letters();
    for letter in &dead_letters {
        warn!(
            partition = %letter.partition,
            event = %letter.event.name,
            error = %letter.error,
            "event was not applied"
        );
    }

    let mut tables = Vec::new();
    for &table in dispatcher.engine().registry().tables() {
        if !only.is_empty() && !only.iter().any(|t| t == table.name) {
            continue;
        }
        tables.push(TableDump {
            table: table.name,
            rows: store.rows(table).await?,
        });
    }
    dispatcher.shutdown().await;

    info!(
        applied = stats.applied,
        unrouted = stats.unrouted,
        skipped = stats.skipped_replays,
        dead_lettered = stats.dead_lettered,
        "replay finished"
    );
    Ok(ReplayReport {
        tables,
        stats,
        dead_letters,
    })
}
