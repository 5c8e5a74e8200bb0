//! Local-socket route message framing between `mipd` and `routingd` (§3,
//! §4.F, §4.G).
//!
//! Every message starts with the 5-byte header `{src_MIP, TTL=0, tag}`
//! where `tag` is one of `"HEL"`, `"UPD"`, `"REQ"`, `"RES"` (the original's
//! `sendHelloMessage`/`sendRoutingUpdate`/`sendResponseMessage` in
//! `examples/original_source/src/route.c` use the same five-byte preamble).
//! The TTL byte here is always zero — it's a local-only envelope, never
//! interpreted as a MIP hop count.

use crate::error::{MipError, Result};

/// Wire sentinel for "no route" / poisoned distance. 255 is unambiguous
/// since `MAX_NODES` is 52; the original used a C `INFINITY` macro that had
/// no wire representation of its own.
pub const ROUTE_DISTANCE_INFINITY: u8 = 0xFF;

/// One `{destination, next_hop, distance}` triplet inside an `UPD` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteEntryWire {
    pub destination: u8,
    pub next_hop: u8,
    pub distance: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteMessage {
    Hello { src: u8 },
    Update { src: u8, entries: Vec<RouteEntryWire> },
    Request { src: u8, destination: u8 },
    Response { src: u8, next_hop: u8 },
}

const TAG_HELLO: [u8; 3] = *b"HEL";
const TAG_UPDATE: [u8; 3] = *b"UPD";
const TAG_REQUEST: [u8; 3] = *b"REQ";
const TAG_RESPONSE: [u8; 3] = *b"RES";

impl RouteMessage {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            RouteMessage::Hello { src } => header(*src, TAG_HELLO),
            RouteMessage::Update { src, entries } => {
                let mut buf = header(*src, TAG_UPDATE);
                for e in entries {
                    buf.push(e.destination);
                    buf.push(e.next_hop);
                    buf.push(e.distance);
                }
                buf
            }
            RouteMessage::Request { src, destination } => {
                let mut buf = header(*src, TAG_REQUEST);
                buf.push(*destination);
                buf
            }
            RouteMessage::Response { src, next_hop } => {
                let mut buf = header(*src, TAG_RESPONSE);
                buf.push(*next_hop);
                buf
            }
        }
    }

    pub fn decode(data: &[u8]) -> Result<RouteMessage> {
        if data.len() < 5 {
            return Err(MipError::Parse("route message shorter than 5-byte header".into()));
        }
        let src = data[0];
        let tag: [u8; 3] = data[2..5].try_into().unwrap();
        let trailer = &data[5..];

        match tag {
            TAG_HELLO => Ok(RouteMessage::Hello { src }),
            TAG_UPDATE => {
                if trailer.len() % 3 != 0 {
                    return Err(MipError::Parse("UPD trailer is not a multiple of 3 bytes".into()));
                }
                let entries = trailer
                    .chunks(3)
                    .map(|c| RouteEntryWire { destination: c[0], next_hop: c[1], distance: c[2] })
                    .collect();
                Ok(RouteMessage::Update { src, entries })
            }
            TAG_REQUEST => {
                let destination = *trailer.first().ok_or_else(|| MipError::Parse("REQ missing destination byte".into()))?;
                Ok(RouteMessage::Request { src, destination })
            }
            TAG_RESPONSE => {
                let next_hop = *trailer.first().ok_or_else(|| MipError::Parse("RES missing next_hop byte".into()))?;
                Ok(RouteMessage::Response { src, next_hop })
            }
            other => Err(MipError::Parse(format!("unknown route message tag {:?}", other))),
        }
    }
}

fn header(src: u8, tag: [u8; 3]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(5);
    buf.push(src);
    buf.push(0x00); // TTL, always zero on the local route socket
    buf.extend_from_slice(&tag);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_round_trips() {
        let msg = RouteMessage::Hello { src: 10 };
        assert_eq!(RouteMessage::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn update_round_trips_with_entries() {
        let msg = RouteMessage::Update {
            src: 10,
            entries: vec![
                RouteEntryWire { destination: 20, next_hop: 20, distance: 1 },
                RouteEntryWire { destination: 30, next_hop: 20, distance: ROUTE_DISTANCE_INFINITY },
            ],
        };
        assert_eq!(RouteMessage::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn update_with_no_entries_round_trips() {
        let msg = RouteMessage::Update { src: 10, entries: vec![] };
        assert_eq!(RouteMessage::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn request_round_trips() {
        let msg = RouteMessage::Request { src: 10, destination: 30 };
        assert_eq!(RouteMessage::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn response_round_trips() {
        let msg = RouteMessage::Response { src: 10, next_hop: 255 };
        assert_eq!(RouteMessage::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn rejects_short_messages() {
        assert!(RouteMessage::decode(&[1, 2, 3]).is_err());
    }

    #[test]
    fn rejects_unknown_tag() {
        let mut bytes = RouteMessage::Hello { src: 1 }.encode();
        bytes[2] = b'X';
        assert!(RouteMessage::decode(&bytes).is_err());
    }
}
