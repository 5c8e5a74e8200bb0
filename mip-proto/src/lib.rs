//! Shared wire format, address-resolution state, and local-IPC framing for
//! the MIP internetworking stack: the types `mipd`, `routingd`,
//! `ping_client`, and `ping_server` all build on.

pub mod addr;
pub mod arp;
pub mod config;
pub mod error;
pub mod forward;
pub mod ipc;
pub mod pdu;
pub mod pending;
pub mod route_msg;
pub mod words;
