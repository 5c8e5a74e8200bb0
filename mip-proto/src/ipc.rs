//! Ping-endpoint ↔ router local-socket framing (§4.F).
//!
//! One datagram in, one message: `byte 0 = dst MIP`, `byte 1 = TTL`,
//! `bytes 2.. = ASCII "PING:" or "PONG:" followed by the payload`. Router →
//! endpoint messages are just the raw payload bytes, with length implicit
//! in the datagram (so they don't need a type here).

use crate::error::{MipError, Result};

/// Identifier byte a newly accepted local-socket peer sends as its first
/// byte, selecting its role (`spec.md` §4.E, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerIdentifier {
    PingEndpoint = 0x01,
    RoutingDaemon = 0x02,
}

impl PeerIdentifier {
    pub fn from_byte(b: u8) -> Option<PeerIdentifier> {
        match b {
            0x01 => Some(PeerIdentifier::PingEndpoint),
            0x02 => Some(PeerIdentifier::RoutingDaemon),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingKind {
    Ping,
    Pong,
}

impl PingKind {
    fn tag(self) -> &'static [u8] {
        match self {
            PingKind::Ping => b"PING:",
            PingKind::Pong => b"PONG:",
        }
    }

    /// The same tag, as the `str` prefix carried in the wire SDU's
    /// word-packed text (`spec.md` §3 "Ping SDU").
    pub fn wire_tag(self) -> &'static str {
        match self {
            PingKind::Ping => "PING:",
            PingKind::Pong => "PONG:",
        }
    }
}

/// A message sent from the ping endpoint (client or server) to the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingRequest {
    pub dst_mip: u8,
    pub ttl: u8,
    pub kind: PingKind,
    pub payload: Vec<u8>,
}

impl PingRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(2 + 5 + self.payload.len());
        buf.push(self.dst_mip);
        buf.push(self.ttl);
        buf.extend_from_slice(self.kind.tag());
        buf.extend_from_slice(&self.payload);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<PingRequest> {
        if data.len() < 2 + 5 {
            return Err(MipError::Parse("ping endpoint message shorter than header+tag".into()));
        }
        let dst_mip = data[0];
        let ttl = data[1];
        let tag = &data[2..7];
        let kind = if tag == PingKind::Ping.tag() {
            PingKind::Ping
        } else if tag == PingKind::Pong.tag() {
            PingKind::Pong
        } else {
            return Err(MipError::Parse(format!("unknown ping endpoint tag {:?}", tag)));
        };
        Ok(PingRequest { dst_mip, ttl, kind, payload: data[7..].to_vec() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_request_round_trips() {
        let req = PingRequest { dst_mip: 20, ttl: 5, kind: PingKind::Ping, payload: b"hello".to_vec() };
        assert_eq!(PingRequest::decode(&req.encode()).unwrap(), req);
    }

    #[test]
    fn pong_request_round_trips() {
        let req = PingRequest { dst_mip: 10, ttl: 4, kind: PingKind::Pong, payload: b"hello".to_vec() };
        assert_eq!(PingRequest::decode(&req.encode()).unwrap(), req);
    }

    #[test]
    fn identifier_byte_round_trips() {
        assert_eq!(PeerIdentifier::from_byte(0x01), Some(PeerIdentifier::PingEndpoint));
        assert_eq!(PeerIdentifier::from_byte(0x02), Some(PeerIdentifier::RoutingDaemon));
        assert_eq!(PeerIdentifier::from_byte(0x03), None);
        assert_eq!(PeerIdentifier::PingEndpoint.to_byte(), 0x01);
    }

    #[test]
    fn rejects_unknown_tag() {
        let mut bytes = PingRequest { dst_mip: 1, ttl: 1, kind: PingKind::Ping, payload: vec![] }.encode();
        bytes[2] = b'X';
        assert!(PingRequest::decode(&bytes).is_err());
    }
}
