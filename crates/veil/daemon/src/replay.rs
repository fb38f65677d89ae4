//! Replay feed
//!
//! Reads observations from a JSON Lines file and submits them to the
//! engine with their original spacing, compressed by a speed factor.
//! Timestamps are re-stamped at submission so the ingest skew check sees
//! live data.
//!
//! ```text
//! {"at_ms": 0, "kind": "player_sighting", "name": "Vex", "faction": "Rebel", "distance": 18.0, "risk_type": "hostile"}
//! {"at_ms": 1500, "kind": "zone_update", "zone": "Mos Eisley", "planet": "Tatooine", "risk_level": "high", "player_count": 22}
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};
use veil_engine::{Admission, RiskEngine};
use veil_types::{Observation, ObservationKind};

use crate::error::{DaemonError, DaemonResult};

/// One line of a replay file
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayRecord {
    /// Offset from the start of the recording
    pub at_ms: u64,

    #[serde(flatten)]
    pub kind: ObservationKind,
}

/// Summary of a finished replay
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    pub submitted: usize,
    pub rejected: usize,
}

/// Parse a replay file. Blank lines and `#` comments are ignored;
/// unparseable lines are skipped with a warning.
pub fn parse(contents: &str) -> (Vec<ReplayRecord>, usize) {
    let mut records = Vec::new();
    let mut skipped = 0;

    for (number, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match serde_json::from_str::<ReplayRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(line = number + 1, error = %e, "Skipping unparseable replay line");
                skipped += 1;
            }
        }
    }

    records.sort_by_key(|r| r.at_ms);
    (records, skipped)
}

/// Load a replay file from disk.
pub async fn load(path: &Path) -> DaemonResult<(Vec<ReplayRecord>, usize)> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| DaemonError::Replay(format!("{}: {}", path.display(), e)))?;
    Ok(parse(&contents))
}

/// Delay before the next record at `speed`.
fn gap(previous_ms: u64, next_ms: u64, speed: f64) -> Duration {
    let raw = next_ms.saturating_sub(previous_ms) as f64 / speed;
    Duration::from_millis(raw.round() as u64)
}

/// Feed `records` into the engine.
pub async fn run(
    engine: Arc<RiskEngine>,
    records: Vec<ReplayRecord>,
    speed: f64,
) -> DaemonResult<ReplaySummary> {
    if !(speed.is_finite() && speed > 0.0) {
        return Err(DaemonError::Config(format!(
            "replay speed must be positive, got {}",
            speed
        )));
    }

    info!(records = records.len(), speed, "Starting replay");
    let mut summary = ReplaySummary::default();
    let mut previous_ms = records.first().map_or(0, |r| r.at_ms);

    for record in records {
        tokio::time::sleep(gap(previous_ms, record.at_ms, speed)).await;
        previous_ms = record.at_ms;

        let observation = Observation::new(record.kind, chrono::Utc::now());
        match engine.submit_observation(observation) {
            Admission::Accepted(sequence) => {
                debug!(%sequence, "Replayed observation");
                summary.submitted += 1;
            }
            Admission::Rejected(_) => summary.rejected += 1,
        }
    }

    info!(
        submitted = summary.submitted,
        rejected = summary.rejected,
        "Replay finished"
    );
    Ok(summary)
}
