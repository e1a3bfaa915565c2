//! Non-fatal diagnostics collected while a command runs
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt;

/// A recorded non-fatal failure, as the client will see it
#[derive(Debug)]
pub struct CommandWarning {
    /// Position in recording order, starting at 0 for the context
    pub sequence: u64,
    pub request_id: String,
    pub recorded_at: DateTime<Utc>,
    error: anyhow::Error,
}

impl CommandWarning {
    pub fn error(&self) -> &anyhow::Error {
        &self.error
    }

    pub fn into_error(self) -> anyhow::Error {
        self.error
    }

    /// Top-level message
    pub fn message(&self) -> String {
        self.error.to_string()
    }

    /// Message including the cause chain
    pub fn detail(&self) -> String {
        format!("{:#}", self.error)
    }
}

impl fmt::Display for CommandWarning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}#{}] {:#}", self.request_id, self.sequence, self.error)
    }
}

#[derive(Debug, Default)]
struct Entries {
    warnings: Vec<CommandWarning>,
    next_sequence: u64,
}

/// Append-only warning list safe for concurrent writers.
///
/// Every warning pushed before a drain starts is part of that drain.
#[derive(Debug, Default)]
pub struct WarningAccumulator {
    entries: Mutex<Entries>,
}

impl WarningAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning and return its sequence number
    pub fn push(&self, request_id: &str, error: anyhow::Error) -> u64 {
        let mut entries = self.entries.lock();
        let sequence = entries.next_sequence;
        entries.next_sequence += 1;

        entries.warnings.push(CommandWarning {
            sequence,
            request_id: request_id.to_string(),
            recorded_at: Utc::now(),
            error,
        });
        sequence
    }

    /// Remove and return every warning in recording order
    pub fn drain(&self) -> Vec<CommandWarning> {
        std::mem::take(&mut self.entries.lock().warnings)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().warnings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_drain_preserves_order() {
        let acc = WarningAccumulator::new();
        acc.push("r1", anyhow!("W1"));
        acc.push("r1", anyhow!("W2"));
        acc.push("r1", anyhow!("W3"));

        let drained: Vec<String> = acc.drain().iter().map(CommandWarning::message).collect();
        assert_eq!(drained, vec!["W1", "W2", "W3"]);
        assert!(acc.is_empty());
    }

    #[test]
    fn test_sequence_continues_after_drain() {
        let acc = WarningAccumulator::new();
        acc.push("r1", anyhow!("a"));
        acc.drain();

        assert_eq!(acc.push("r1", anyhow!("b")), 1);
    }

    #[test]
    fn test_large_bursts_are_kept_whole() {
        let acc = WarningAccumulator::new();
        for i in 0..20_000 {
            acc.push("r1", anyhow!("w{}", i));
        }

        let drained = acc.drain();
        assert_eq!(drained.len(), 20_000);
        assert_eq!(drained[0].message(), "w0");
        assert_eq!(drained[19_999].message(), "w19999");
        assert!(drained.windows(2).all(|w| w[0].sequence + 1 == w[1].sequence));
    }

    #[test]
    fn test_detail_includes_cause() {
        let acc = WarningAccumulator::new();
        acc.push("r9", anyhow!("connection reset").context("source orders unavailable"));

        let warning = acc.drain().pop().unwrap();
        assert_eq!(warning.message(), "source orders unavailable");
        assert_eq!(warning.detail(), "source orders unavailable: connection reset");
        assert_eq!(warning.to_string(), "[r9#0] source orders unavailable: connection reset");
    }
}
