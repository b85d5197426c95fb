use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single observed availability transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub available: bool,
    pub at: DateTime<Utc>,
}

impl EventRecord {
    pub fn up(at: DateTime<Utc>) -> Self {
        Self {
            available: true,
            at,
        }
    }

    pub fn down(at: DateTime<Utc>) -> Self {
        Self {
            available: false,
            at,
        }
    }
}

#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("event log is not valid json: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("event {index} at {at} precedes the previous event at {previous}")]
    OutOfOrder {
        index: usize,
        at: DateTime<Utc>,
        previous: DateTime<Utc>,
    },
}

/// Ordered availability history of one tracked entity.
///
/// Written by the reconciliation layer; read-only here. The serialized form
/// is `{"records": [{"available": false, "at": "<rfc3339>"}, ...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    #[serde(default)]
    pub records: Vec<EventRecord>,
}

impl EventLog {
    pub fn new(records: Vec<EventRecord>) -> Self {
        Self { records }
    }

    /// Decodes and validates a stored log entry.
    pub fn from_json(raw: &str) -> Result<Self, EventLogError> {
        let log: Self = serde_json::from_str(raw)?;
        log.validate()?;
        Ok(log)
    }

    /// Rejects logs whose timestamps go backwards.
    pub fn validate(&self) -> Result<(), EventLogError> {
        for (index, pair) in self.records.windows(2).enumerate() {
            if pair[1].at < pair[0].at {
                return Err(EventLogError::OutOfOrder {
                    index: index + 1,
                    at: pair[1].at,
                    previous: pair[0].at,
                });
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn first(&self) -> Option<&EventRecord> {
        self.records.first()
    }

    pub fn last(&self) -> Option<&EventRecord> {
        self.records.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn decodes_stored_entry() {
        let raw = r#"{"records":[
            {"available":false,"at":"2021-01-01T00:00:00Z"},
            {"available":true,"at":"2021-01-01T01:00:00Z"}
        ]}"#;
        let log = EventLog::from_json(raw).expect("decode");
        assert_eq!(log.len(), 2);
        assert_eq!(log.first(), Some(&EventRecord::down(t0())));
        assert_eq!(log.last(), Some(&EventRecord::up(t0() + Duration::hours(1))));
    }

    #[test]
    fn missing_records_decode_as_empty() {
        let log = EventLog::from_json("{}").expect("decode");
        assert!(log.is_empty());
    }

    #[test]
    fn rejects_garbage() {
        let err = EventLog::from_json("not json").unwrap_err();
        assert!(matches!(err, EventLogError::Decode(_)));
    }

    #[test]
    fn rejects_out_of_order_timestamps() {
        let log = EventLog::new(vec![
            EventRecord::down(t0()),
            EventRecord::up(t0() + Duration::hours(2)),
            EventRecord::down(t0() + Duration::hours(1)),
        ]);
        match log.validate() {
            Err(EventLogError::OutOfOrder { index, .. }) => assert_eq!(index, 2),
            other => panic!("expected out-of-order error, got {other:?}"),
        }
    }

    #[test]
    fn equal_timestamps_are_allowed() {
        let log = EventLog::new(vec![EventRecord::down(t0()), EventRecord::up(t0())]);
        assert!(log.validate().is_ok());
    }
}
