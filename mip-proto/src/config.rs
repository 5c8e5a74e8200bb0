//! Constants shared across the router and the routing daemon.
//!
//! Values match `spec.md` §3/§4 and `examples/original_source/include/route.h`.

use std::time::Duration;

/// Maximum number of interfaces a node enumerates at startup.
pub const MAX_IF: usize = 3;

/// Number of slots in the ARP cache before LRU eviction kicks in.
pub const ARP_CACHE_SIZE: usize = 10;

/// Number of slots in the pending-ARP table (keyed by next-hop MIP).
pub const MAX_QUEUE_SIZE: usize = 8;

/// Dense routing-table size; MIP addresses `0..MAX_NODES` have a slot.
pub const MAX_NODES: usize = 52;

/// Period between routing-daemon HELLO emissions.
pub const HELLO_INTERVAL: Duration = Duration::from_secs(10);

/// A neighbour not heard from within this window is declared unreachable.
pub const TIMEOUT_INTERVAL: Duration = Duration::from_secs(30);

/// A pending-ARP entry older than this is dropped with no notification.
pub const ARP_PENDING_TIMEOUT: Duration = Duration::from_secs(1);

/// Read timeout observed by the ping client before reporting failure.
pub const PING_CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// `listen()` backlog for the local `SOCK_SEQPACKET` socket.
pub const LOCAL_LISTEN_BACKLOG: i32 = 3;
