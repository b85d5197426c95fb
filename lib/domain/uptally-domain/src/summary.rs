use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::EventLog;

/// Reliability figures derived from one entity's event log.
///
/// Durations serialize as integer milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    #[serde(rename = "up_time_ms", with = "millis")]
    pub up_time: Duration,
    #[serde(rename = "down_time_ms", with = "millis")]
    pub down_time: Duration,
    /// Length of the initial provisioning wait.
    #[serde(rename = "time_to_first_available_ms", with = "millis")]
    pub time_to_first_available: Duration,

    pub interruption_count: u32,
    pub recovery_count: u32,

    #[serde(rename = "total_up_between_interruptions_ms", with = "millis")]
    pub total_up_between_interruptions: Duration,
    #[serde(rename = "mean_up_between_interruptions_ms", with = "millis")]
    pub mean_up_between_interruptions: Duration,
    #[serde(rename = "latest_up_between_interruptions_ms", with = "millis")]
    pub latest_up_between_interruptions: Duration,

    #[serde(rename = "total_down_between_recoveries_ms", with = "millis")]
    pub total_down_between_recoveries: Duration,
    #[serde(rename = "mean_down_between_recoveries_ms", with = "millis")]
    pub mean_down_between_recoveries: Duration,
    #[serde(rename = "latest_down_between_recoveries_ms", with = "millis")]
    pub latest_down_between_recoveries: Duration,
}

impl Summary {
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    /// Fraction of observed time spent available, if any time was observed.
    pub fn availability(&self) -> Option<f64> {
        let total = self.up_time + self.down_time;
        if total.is_zero() {
            return None;
        }
        Some(self.up_time.as_secs_f64() / total.as_secs_f64())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Down,
    Up,
}

/// Reduces an event log to a [`Summary`] as of `now`.
///
/// The first record anchors the timeline and must be unavailable; logs
/// without that anchor yield the zero summary. Time after the last record is
/// credited to the current phase but never counts as an interruption or a
/// recovery, since neither has ended yet.
pub fn summarize(log: &EventLog, now: DateTime<Utc>) -> Summary {
    let mut summary = Summary::default();
    let Some(anchor) = log.first() else {
        return summary;
    };
    if anchor.available {
        return summary;
    }

    let mut phase = Phase::Down;
    let mut phase_start = anchor.at;
    let mut has_been_up_once = false;

    for record in &log.records[1..] {
        let next = if record.available { Phase::Up } else { Phase::Down };
        if next == phase {
            // Same state reported again; the open interval keeps running.
            continue;
        }

        let elapsed = elapsed_between(phase_start, record.at);
        match phase {
            Phase::Down => {
                summary.down_time += elapsed;
                if has_been_up_once {
                    summary.total_down_between_recoveries += elapsed;
                    summary.latest_down_between_recoveries = elapsed;
                    summary.recovery_count += 1;
                } else {
                    summary.time_to_first_available = elapsed;
                    has_been_up_once = true;
                }
            }
            Phase::Up => {
                summary.up_time += elapsed;
                summary.total_up_between_interruptions += elapsed;
                summary.latest_up_between_interruptions = elapsed;
                summary.interruption_count += 1;
            }
        }

        phase = next;
        phase_start = record.at;
    }

    let trailing = elapsed_between(phase_start, now);
    match phase {
        Phase::Down => summary.down_time += trailing,
        Phase::Up => summary.up_time += trailing,
    }

    if summary.interruption_count > 0 {
        summary.mean_up_between_interruptions =
            summary.total_up_between_interruptions / summary.interruption_count;
    }
    if summary.recovery_count > 0 {
        summary.mean_down_between_recoveries =
            summary.total_down_between_recoveries / summary.recovery_count;
    }
    summary
}

fn elapsed_between(start: DateTime<Utc>, end: DateTime<Utc>) -> Duration {
    (end - start).to_std().unwrap_or(Duration::ZERO)
}

impl EventLog {
    pub fn summarize(&self, now: DateTime<Utc>) -> Summary {
        summarize(self, now)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
