//! Pending-ARP table: packets blocked on an outstanding ARP reply (§3, §4.D).
//!
//! Keyed by next-hop MIP, fixed-capacity, at most one entry per key. The PDU
//! stored here has a blank link header (no MAC addresses yet); on ARP
//! reply, the router fills it in and transmits.

use std::time::Instant;

use crate::config::{ARP_PENDING_TIMEOUT, MAX_QUEUE_SIZE};
use crate::pdu::Pdu;

struct PendingEntry {
    next_hop: u8,
    pdu: Pdu,
    inserted_at: Instant,
}

/// A fixed-size table of PDUs awaiting ARP resolution, keyed by next-hop
/// MIP address.
#[derive(Default)]
pub struct PendingArpTable {
    entries: Vec<PendingEntry>,
}

impl PendingArpTable {
    pub fn new() -> PendingArpTable {
        PendingArpTable { entries: Vec::with_capacity(MAX_QUEUE_SIZE) }
    }

    /// Insert a PDU awaiting resolution for `next_hop`. Returns `false`
    /// (and drops nothing) if an entry for `next_hop` already exists or the
    /// table is full — `spec.md` §3 invariant: "at most one pending ARP
    /// entry per next-hop MIP at a time."
    pub fn insert(&mut self, next_hop: u8, pdu: Pdu) -> bool {
        if self.entries.iter().any(|e| e.next_hop == next_hop) {
            return false;
        }
        if self.entries.len() >= MAX_QUEUE_SIZE {
            return false;
        }
        self.entries.push(PendingEntry { next_hop, pdu, inserted_at: Instant::now() });
        true
    }

    /// Reclaim the entry for `next_hop`, if any — "the router reclaims at
    /// most one pending entry keyed by X" (§4.D).
    pub fn take(&mut self, next_hop: u8) -> Option<Pdu> {
        let idx = self.entries.iter().position(|e| e.next_hop == next_hop)?;
        Some(self.entries.remove(idx).pdu)
    }

    /// Drop every entry older than [`ARP_PENDING_TIMEOUT`], returning how
    /// many were dropped. Callers do not get the dropped PDUs back: a
    /// pending-ARP timeout is a silent drop (§5 "Cancellation and
    /// timeouts").
    pub fn evict_expired(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.inserted_at.elapsed() < ARP_PENDING_TIMEOUT);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdu::SduType;
    use std::thread::sleep;
    use std::time::Duration;

    fn dummy_pdu() -> Pdu {
        Pdu::with_blank_link_header(20, 10, 5, SduType::Ping, b"PING:hi".to_vec())
    }

    #[test]
    fn insert_then_take_round_trips() {
        let mut table = PendingArpTable::new();
        assert!(table.insert(20, dummy_pdu()));
        assert!(table.take(20).is_some());
        assert!(table.take(20).is_none());
    }

    #[test]
    fn at_most_one_entry_per_next_hop() {
        let mut table = PendingArpTable::new();
        assert!(table.insert(20, dummy_pdu()));
        assert!(!table.insert(20, dummy_pdu()));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn table_rejects_inserts_past_capacity() {
        let mut table = PendingArpTable::new();
        for mip in 0..MAX_QUEUE_SIZE as u8 {
            assert!(table.insert(mip, dummy_pdu()));
        }
        assert!(!table.insert(MAX_QUEUE_SIZE as u8, dummy_pdu()));
    }

    #[test]
    fn fresh_entries_are_not_evicted() {
        let mut table = PendingArpTable::new();
        table.insert(20, dummy_pdu());
        assert_eq!(table.evict_expired(), 0);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn entries_older_than_timeout_are_evicted_silently() {
        let mut table = PendingArpTable::new();
        table.insert(20, dummy_pdu());
        sleep(ARP_PENDING_TIMEOUT + Duration::from_millis(50));
        assert_eq!(table.evict_expired(), 1);
        assert!(table.is_empty());
    }
}
