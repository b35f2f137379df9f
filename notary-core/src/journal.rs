//! Session-scoped operation journal.
//!
//! Unlike [`CanvasState`], the journal keeps every applied operation,
//! `Clear` included, in local-apply order. Replaying it reproduces the live
//! canvas. Nothing here is written to disk unless the caller exports it.

use crate::canvas::CanvasState;
use crate::op::Operation;

/// Where an operation came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Local,
    Remote(String),
}

/// A journal entry: local sequence number, origin and the operation.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub seq: u64,
    pub origin: Origin,
    pub op: Operation,
}

/// Append-only log of applied operations.
#[derive(Debug, Default)]
pub struct OperationLog {
    entries: Vec<LogEntry>,
    next_seq: u64,
}

impl OperationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an operation; returns its sequence number.
    pub fn record(&mut self, origin: Origin, op: Operation) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(LogEntry { seq, origin, op });
        seq
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries that were received from `identity`.
    pub fn from_peer<'a>(&'a self, identity: &'a str) -> impl Iterator<Item = &'a LogEntry> + 'a {
        self.entries
            .iter()
            .filter(move |e| matches!(&e.origin, Origin::Remote(id) if id == identity))
    }

    /// Rebuild page state from scratch.
    pub fn replay(&self) -> CanvasState {
        let mut canvas = CanvasState::new();
        canvas.apply_all(self.entries.iter().map(|e| e.op.clone()));
        canvas
    }

    /// One wire-format JSON operation per line.
    pub fn to_json_lines(&self) -> Result<String, serde_json::Error> {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&serde_json::to_string(&entry.op)?);
            out.push('\n');
        }
        Ok(out)
    }

    /// Start over; sequence numbers restart at zero.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.next_seq = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::{Color, Point};

    fn sample_log() -> OperationLog {
        let mut log = OperationLog::new();
        log.record(
            Origin::Local,
            Operation::draw(1, [Point::new(0.0, 0.0), Point::new(4.0, 4.0)], Color::RED, 2.0),
        );
        log.record(
            Origin::Remote("client".into()),
            Operation::text(1, 1.0, 1.0, "hi", 10.0, Color::BLACK),
        );
        log.record(Origin::Local, Operation::clear(1));
        log.record(
            Origin::Local,
            Operation::draw(2, [Point::new(1.0, 1.0)], Color::BLACK, 1.0),
        );
        log
    }

    #[test]
    fn test_sequence_numbers() {
        let log = sample_log();
        let seqs: Vec<u64> = log.entries().iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_clear_kept_in_journal() {
        let log = sample_log();
        assert_eq!(log.len(), 4);
        assert!(log.entries().iter().any(|e| matches!(e.op, Operation::Clear(_))));
    }

    #[test]
    fn test_replay_matches_live_state() {
        let log = sample_log();
        let mut live = CanvasState::new();
        for entry in log.entries() {
            live.apply(entry.op.clone());
        }
        assert_eq!(log.replay(), live);
        assert!(log.replay().page(1).is_empty());
        assert_eq!(log.replay().page(2).len(), 1);
    }

    #[test]
    fn test_from_peer() {
        let log = sample_log();
        assert_eq!(log.from_peer("client").count(), 1);
        assert_eq!(log.from_peer("nobody").count(), 0);
    }

    #[test]
    fn test_json_lines_parse_back() {
        let log = sample_log();
        let text = log.to_json_lines().unwrap();
        let parsed: Vec<Operation> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        let original: Vec<Operation> = log.entries().iter().map(|e| e.op.clone()).collect();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_json_lines_are_bare_wire_operations() {
        let text = sample_log().to_json_lines().unwrap();
        let remote: serde_json::Value = serde_json::from_str(text.lines().nth(1).unwrap()).unwrap();
        let keys: Vec<&str> = remote.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys.len(), 7);
        assert!(!keys.contains(&"origin"));
        assert!(!keys.contains(&"seq"));
    }

    #[test]
    fn test_clear_resets_sequence() {
        let mut log = sample_log();
        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.record(Origin::Local, Operation::clear(1)), 0);
    }
}
