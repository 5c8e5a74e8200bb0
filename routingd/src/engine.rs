//! Distance-vector routing table and neighbour bookkeeping (§4.G).
//!
//! Grounded directly on `examples/original_source/src/route.c`'s
//! `routingTable`/`neighborTable`/`neighborStatus` globals: a dense
//! `MAX_NODES`-entry table indexed by MIP address, poison reverse on
//! `UPD` ingestion, and a neighbour-timeout sweep that withdraws a route
//! back to infinity. The state lives behind a `Mutex` here instead of
//! global statics since two threads (timer and receiver) touch it
//! concurrently.

use std::time::Instant;

use mip_proto::config::{MAX_NODES, TIMEOUT_INTERVAL};
use mip_proto::route_msg::{RouteEntryWire, ROUTE_DISTANCE_INFINITY};

#[derive(Debug, Clone, Copy)]
struct Entry {
    next_hop: Option<u8>,
    distance: u8,
}

impl Entry {
    const UNKNOWN: Entry = Entry { next_hop: None, distance: ROUTE_DISTANCE_INFINITY };
}

struct Neighbor {
    last_hello: Instant,
}

/// The routing daemon's full mutable state: one table entry per possible
/// MIP address, plus which of those are currently direct neighbours.
pub struct RoutingState {
    local_mip: u8,
    table: Vec<Entry>,
    neighbors: std::collections::HashMap<u8, Neighbor>,
    changed: bool,
}

impl RoutingState {
    pub fn new(local_mip: u8) -> RoutingState {
        let mut table = vec![Entry::UNKNOWN; MAX_NODES];
        if (local_mip as usize) < MAX_NODES {
            table[local_mip as usize] = Entry { next_hop: Some(local_mip), distance: 0 };
        }
        RoutingState { local_mip, table, neighbors: std::collections::HashMap::new(), changed: false }
    }

    fn entry_mut(&mut self, mip: u8) -> Option<&mut Entry> {
        self.table.get_mut(mip as usize)
    }

    /// `HEL` received from `from` (§4.G "Hello"): mark it a neighbour, and
    /// if we have no better-than-direct route to it already, install one.
    pub fn handle_hello(&mut self, from: u8) {
        if from as usize >= MAX_NODES {
            return;
        }
        self.neighbors.insert(from, Neighbor { last_hello: Instant::now() });

        if let Some(entry) = self.entry_mut(from) {
            if entry.next_hop.is_none() || entry.distance > 1 {
                entry.next_hop = Some(from);
                entry.distance = 1;
                self.changed = true;
            }
        }
    }

    /// `UPD` received from `from` (§4.G "Update", poison reverse, and the
    /// "reject updates from non-neighbours" decision in SPEC_FULL.md §9).
    pub fn handle_update(&mut self, from: u8, entries: &[RouteEntryWire]) {
        if !self.neighbors.contains_key(&from) {
            return;
        }

        for e in entries {
            if e.next_hop == self.local_mip || e.destination == self.local_mip {
                continue; // poison reverse: never learn a route back through, or to, ourselves
            }
            let candidate = e.distance.saturating_add(1);
            let Some(entry) = self.entry_mut(e.destination) else { continue };
            if candidate < entry.distance {
                entry.next_hop = Some(from);
                entry.distance = candidate;
                self.changed = true;
            }
        }
    }

    /// Answer a `REQ` for `destination` with a next-hop MIP, or
    /// [`ROUTE_DISTANCE_INFINITY`] if unreachable (§4.G "Request/Response").
    pub fn resolve_next_hop(&self, destination: u8) -> u8 {
        self.table
            .get(destination as usize)
            .and_then(|e| e.next_hop)
            .filter(|_| self.table[destination as usize].distance != ROUTE_DISTANCE_INFINITY)
            .unwrap_or(ROUTE_DISTANCE_INFINITY)
    }

    /// Withdraw any neighbour whose last `HEL` is older than
    /// [`TIMEOUT_INTERVAL`]. Returns true if anything changed.
    pub fn evict_timed_out_neighbors(&mut self) -> bool {
        let stale: Vec<u8> =
            self.neighbors.iter().filter(|(_, n)| n.last_hello.elapsed() > TIMEOUT_INTERVAL).map(|(mip, _)| *mip).collect();

        for mip in &stale {
            self.neighbors.remove(mip);
            for entry in self.table.iter_mut() {
                if entry.next_hop == Some(*mip) {
                    *entry = Entry::UNKNOWN;
                }
            }
            self.changed = true;
        }

        !stale.is_empty()
    }

    /// Every entry this node currently has a route for, for an outgoing
    /// `UPD` message.
    pub fn update_entries(&self) -> Vec<RouteEntryWire> {
        self.table
            .iter()
            .enumerate()
            .filter_map(|(dest, e)| {
                e.next_hop.map(|next_hop| RouteEntryWire { destination: dest as u8, next_hop, distance: e.distance })
            })
            .collect()
    }

    /// Consume the "table changed since last check" flag.
    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn hello_installs_a_direct_route() {
        let mut state = RoutingState::new(10);
        state.handle_hello(20);
        assert_eq!(state.resolve_next_hop(20), 20);
        assert!(state.take_changed());
    }

    #[test]
    fn update_from_non_neighbor_is_rejected() {
        let mut state = RoutingState::new(10);
        state.handle_update(20, &[RouteEntryWire { destination: 30, next_hop: 20, distance: 1 }]);
        assert_eq!(state.resolve_next_hop(30), ROUTE_DISTANCE_INFINITY);
    }

    #[test]
    fn update_from_neighbor_learns_a_shorter_route() {
        let mut state = RoutingState::new(10);
        state.handle_hello(20);
        state.take_changed();
        state.handle_update(20, &[RouteEntryWire { destination: 30, next_hop: 20, distance: 1 }]);
        assert_eq!(state.resolve_next_hop(30), 20);
        assert!(state.take_changed());
    }

    #[test]
    fn self_entry_is_seeded_at_distance_zero() {
        let state = RoutingState::new(10);
        assert_eq!(state.resolve_next_hop(10), 10);
    }

    #[test]
    fn poison_reverse_drops_routes_back_through_self() {
        let mut state = RoutingState::new(10);
        state.handle_hello(20);
        state.take_changed();
        state.handle_update(20, &[RouteEntryWire { destination: 15, next_hop: 10, distance: 1 }]);
        assert_eq!(state.resolve_next_hop(15), ROUTE_DISTANCE_INFINITY);
        assert!(!state.take_changed());
    }

    #[test]
    fn poison_reverse_rejects_updates_naming_self_as_destination() {
        let mut state = RoutingState::new(10);
        state.handle_hello(20);
        state.take_changed();
        state.handle_update(20, &[RouteEntryWire { destination: 10, next_hop: 30, distance: 1 }]);
        assert_eq!(state.resolve_next_hop(10), 10);
        assert!(!state.take_changed());
    }

    #[test]
    fn worse_update_does_not_replace_a_better_route() {
        let mut state = RoutingState::new(10);
        state.handle_hello(20);
        state.take_changed();
        state.handle_update(20, &[RouteEntryWire { destination: 20, next_hop: 20, distance: 5 }]);
        assert_eq!(state.resolve_next_hop(20), 20);
        assert!(!state.take_changed());
    }

    #[test]
    fn unreachable_destination_resolves_to_infinity_sentinel() {
        let state = RoutingState::new(10);
        assert_eq!(state.resolve_next_hop(99), ROUTE_DISTANCE_INFINITY);
    }

    #[test]
    fn update_entries_only_lists_known_routes() {
        let mut state = RoutingState::new(10);
        assert_eq!(state.update_entries(), vec![RouteEntryWire { destination: 10, next_hop: 10, distance: 0 }]);
        state.handle_hello(20);
        let entries = state.update_entries();
        assert_eq!(entries.len(), 2);
        assert!(entries.contains(&RouteEntryWire { destination: 20, next_hop: 20, distance: 1 }));
    }

    #[test]
    fn neighbor_timeout_invalidates_indirect_routes_learned_through_it() {
        let mut state = RoutingState::new(10);
        state.handle_hello(20);
        state.handle_update(20, &[RouteEntryWire { destination: 30, next_hop: 20, distance: 1 }]);
        assert_eq!(state.resolve_next_hop(30), 20);

        state.neighbors.get_mut(&20).unwrap().last_hello = Instant::now() - TIMEOUT_INTERVAL - Duration::from_secs(1);
        assert!(state.evict_timed_out_neighbors());

        assert_eq!(state.resolve_next_hop(20), ROUTE_DISTANCE_INFINITY);
        assert_eq!(state.resolve_next_hop(30), ROUTE_DISTANCE_INFINITY);
    }
}
