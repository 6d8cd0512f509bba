//! Bookkeeping for requests that are awaiting a reply.

use std::collections::HashMap;

/// One transmitted request that has not been answered yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    /// Request id on the wire.
    pub id: i64,
    /// Method name, kept for logging and mismatch diagnostics.
    pub method: String,
}

/// Record of sent requests awaiting responses, keyed by request id.
///
/// Entries are inserted by the outbound drain task before the request bytes
/// are written, and removed by the inbound dispatcher when the matching
/// reply arrives. Keying by id tolerates the analyzer replying out of
/// request order.
#[derive(Debug, Default)]
pub struct PendingLedger {
    entries: HashMap<i64, PendingEntry>,
}

impl PendingLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a transmitted request.
    pub fn insert(&mut self, id: i64, method: impl Into<String>) {
        self.entries.insert(
            id,
            PendingEntry {
                id,
                method: method.into(),
            },
        );
    }

    /// Removes and returns the entry matching a reply, if any.
    pub fn complete(&mut self, id: i64) -> Option<PendingEntry> {
        self.entries.remove(&id)
    }

    /// Number of requests still awaiting a reply.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no requests are outstanding.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops all outstanding entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_tracks_sent_minus_matched() {
        let mut ledger = PendingLedger::new();
        assert!(ledger.is_empty());

        ledger.insert(11, "initialize");
        ledger.insert(12, "workspace/symbol");
        assert_eq!(ledger.len(), 2);

        let entry = ledger.complete(11).unwrap();
        assert_eq!(entry.method, "initialize");
        assert_eq!(ledger.len(), 1);

        ledger.complete(12).unwrap();
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_out_of_order_completion() {
        let mut ledger = PendingLedger::new();
        ledger.insert(11, "textDocument/definition");
        ledger.insert(12, "textDocument/references");

        // replies may arrive in any order
        assert_eq!(ledger.complete(12).unwrap().method, "textDocument/references");
        assert_eq!(ledger.complete(11).unwrap().method, "textDocument/definition");
    }

    #[test]
    fn test_unknown_id_completes_nothing() {
        let mut ledger = PendingLedger::new();
        ledger.insert(11, "initialize");

        assert!(ledger.complete(99).is_none());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_clear() {
        let mut ledger = PendingLedger::new();
        ledger.insert(11, "initialize");
        ledger.clear();
        assert!(ledger.is_empty());
    }
}
