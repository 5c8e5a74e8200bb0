//! Component E: the router's single-threaded, event-driven core (§4.E).

use std::io;
use std::path::Path;
use std::time::Duration;

use log::{debug, info, warn};
use mio::{Events, Interest, Poll, Token};

use mip_proto::addr::{is_node_address, MacAddr, MIP_BROADCAST};
use mip_proto::arp::ArpCache;
use mip_proto::forward::ForwardFifo;
use mip_proto::ipc::{PeerIdentifier, PingKind, PingRequest};
use mip_proto::pdu::{build_arp_reply, build_arp_request, ArpMessage, Pdu, SduType};
use mip_proto::pending::PendingArpTable;
use mip_proto::route_msg::{RouteMessage, ROUTE_DISTANCE_INFINITY};
use mip_proto::words::{string_to_words, words_to_string};

use crate::link::{Interface, RawLink};
use crate::peers::{LocalListener, PeerConn};

const TOKEN_LINK: Token = Token(0);
const TOKEN_LISTENER: Token = Token(1);
const TOKEN_PING: Token = Token(2);
const TOKEN_ROUTING: Token = Token(3);

/// How often the event loop wakes up even with nothing readable, purely to
/// run pending-ARP eviction (§4.D, §5 "a pending-ARP entry older than 1s is
/// dropped"). Short enough that a 1s-old entry is noticed promptly.
const HOUSEKEEPING_TICK: Duration = Duration::from_millis(200);

/// (src_mip, ttl) remembered across a PING delivery so the eventual PONG
/// from the local ping server can be routed back (§3 "Return context").
type ReturnContext = (u8, u8);

pub struct RouterContext {
    pub local_mip: u8,
    pub interfaces: Vec<Interface>,
    pub link: RawLink,
    pub listener: LocalListener,
    pub ping_peer: Option<PeerConn>,
    pub routing_peer: Option<PeerConn>,
    pub arp: ArpCache,
    pub pending: PendingArpTable,
    pub forward: ForwardFifo,
    pub return_ctx: Option<ReturnContext>,
}

impl RouterContext {
    pub fn new(local_mip: u8, socket_path: &Path) -> anyhow::Result<RouterContext> {
        let interfaces = crate::link::enumerate_interfaces()?;
        let link = RawLink::open()?;
        let listener = LocalListener::bind(socket_path)?;
        Ok(RouterContext {
            local_mip,
            interfaces,
            link,
            listener,
            ping_peer: None,
            routing_peer: None,
            arp: ArpCache::new(),
            pending: PendingArpTable::new(),
            forward: ForwardFifo::new(),
            return_ctx: None,
        })
    }

    fn iface_mac(&self, index: i32) -> Option<MacAddr> {
        self.interfaces.iter().find(|i| i.index == index).map(|i| i.mac)
    }

    /// Run the event loop forever. Only returns on an unrecoverable I/O
    /// error from the poller itself.
    pub fn run(&mut self) -> anyhow::Result<()> {
        let mut poll = Poll::new()?;
        poll.registry().register(&mut self.link, TOKEN_LINK, Interest::READABLE)?;
        poll.registry().register(&mut self.listener, TOKEN_LISTENER, Interest::READABLE)?;
        let mut events = Events::with_capacity(16);

        loop {
            match poll.poll(&mut events, Some(HOUSEKEEPING_TICK)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }

            for event in events.iter() {
                match event.token() {
                    TOKEN_LINK => self.drain_link(),
                    TOKEN_LISTENER => self.accept_peers(&poll),
                    TOKEN_PING => self.handle_ping_peer(&poll),
                    TOKEN_ROUTING => self.handle_routing_peer(&poll),
                    _ => {}
                }
            }

            let dropped = self.pending.evict_expired();
            if dropped > 0 {
                debug!("dropped {dropped} pending-ARP entr{} after timeout", if dropped == 1 { "y" } else { "ies" });
            }
        }
    }

    fn accept_peers(&mut self, poll: &Poll) {
        loop {
            match self.listener.accept_one() {
                Ok(None) => break,
                Ok(Some((PeerIdentifier::PingEndpoint, mut conn))) => {
                    if self.ping_peer.is_some() {
                        warn!("rejecting second ping endpoint connection");
                        continue;
                    }
                    if let Err(e) = poll.registry().register(&mut conn.stream, TOKEN_PING, Interest::READABLE) {
                        warn!("failed to register ping endpoint: {e}");
                        continue;
                    }
                    info!("ping endpoint connected");
                    self.ping_peer = Some(conn);
                }
                Ok(Some((PeerIdentifier::RoutingDaemon, mut conn))) => {
                    if self.routing_peer.is_some() {
                        warn!("rejecting second routing daemon connection");
                        continue;
                    }
                    if let Err(e) = poll.registry().register(&mut conn.stream, TOKEN_ROUTING, Interest::READABLE) {
                        warn!("failed to register routing daemon: {e}");
                        continue;
                    }
                    if let Err(e) = conn.send(&[self.local_mip]) {
                        warn!("failed to send local MIP to routing daemon: {e}");
                    }
                    info!("routing daemon connected");
                    self.routing_peer = Some(conn);
                }
                Err(e) => {
                    warn!("accept failed: {e}");
                    break;
                }
            }
        }
    }

    fn drain_link(&mut self) {
        loop {
            match self.link.recv() {
                Ok(None) => break,
                Ok(Some((bytes, iface))) => self.handle_link_frame(&bytes, iface),
                Err(e) => {
                    warn!("raw socket recv error: {e}");
                    break;
                }
            }
        }
    }

    fn handle_link_frame(&mut self, bytes: &[u8], iface: i32) {
        let pdu = match Pdu::deserialize(bytes) {
            Ok(p) => p,
            Err(e) => {
                debug!("dropping unparseable frame: {e}");
                return;
            }
        };

        if pdu.header.dst != self.local_mip && pdu.header.dst != MIP_BROADCAST {
            self.transit_forward(pdu);
            return;
        }

        match pdu.header.sdu_type {
            SduType::MipArp => self.handle_arp(pdu, iface),
            SduType::Ping => self.handle_wire_ping(pdu),
            SduType::Route => self.handle_wire_route(pdu),
        }
    }

    fn transit_forward(&mut self, mut pdu: Pdu) {
        let Some(routing) = self.routing_peer.as_mut() else {
            debug!("no routing daemon connected, dropping transit packet to {}", pdu.header.dst);
            return;
        };
        if pdu.decrement_ttl().is_err() {
            debug!("TTL exhausted on transit, dropping");
            return;
        }
        let dst = pdu.header.dst;
        self.forward.push(pdu);
        if let Err(e) = routing.send(&RouteMessage::Request { src: self.local_mip, destination: dst }.encode()) {
            warn!("failed to send ROUTE_REQ: {e}");
        }
    }

    fn handle_arp(&mut self, pdu: Pdu, iface: i32) {
        let msg = match ArpMessage::decode(&pdu.sdu) {
            Ok(m) => m,
            Err(e) => {
                debug!("dropping malformed ARP SDU: {e}");
                return;
            }
        };

        match msg {
            ArpMessage::Request { subject } => {
                if subject != self.local_mip {
                    return;
                }
                self.arp.insert(pdu.header.src, pdu.src_mac, iface as usize);
                if pdu.header.ttl == 0 {
                    debug!("ARP request TTL exhausted, dropping");
                    return;
                }
                let Some(my_mac) = self.iface_mac(iface) else { return };
                let reply = build_arp_reply(my_mac, pdu.src_mac, self.local_mip, pdu.header.src, pdu.header.ttl - 1);
                if let Err(e) = self.link.send(&reply.serialize(), iface) {
                    warn!("failed to send ARP reply: {e}");
                }
            }
            ArpMessage::Reply { subject: _ } => {
                self.arp.insert(pdu.header.src, pdu.src_mac, iface as usize);
                if let Some(mut waiting) = self.pending.take(pdu.header.src) {
                    let Some(my_mac) = self.iface_mac(iface) else { return };
                    waiting.set_link_header(pdu.src_mac, my_mac);
                    if let Err(e) = self.link.send(&waiting.serialize(), iface) {
                        warn!("failed to transmit ARP-resolved packet: {e}");
                    }
                }
            }
        }
    }

    fn handle_wire_ping(&mut self, pdu: Pdu) {
        let Some(text) = bytes_to_words(&pdu.sdu).and_then(|words| words_to_string(&words)) else {
            debug!("dropping malformed ping SDU");
            return;
        };

        let Some(ping) = self.ping_peer.as_mut() else {
            debug!("no ping endpoint connected, dropping inbound PING/PONG");
            return;
        };
        if let Err(e) = ping.send(text.as_bytes()) {
            warn!("failed to deliver ping payload to local endpoint: {e}");
        }
        self.return_ctx = Some((pdu.header.src, pdu.header.ttl.saturating_sub(1)));
    }

    fn handle_wire_route(&mut self, pdu: Pdu) {
        let Some(routing) = self.routing_peer.as_mut() else {
            debug!("no routing daemon connected, dropping ROUTE payload");
            return;
        };
        if let Err(e) = routing.send(&pdu.sdu) {
            warn!("failed to forward ROUTE payload to routing daemon: {e}");
        }
    }

    fn handle_ping_peer(&mut self, poll: &Poll) {
        let mut messages = Vec::new();
        {
            let Some(ping) = self.ping_peer.as_mut() else { return };
            loop {
                match ping.recv() {
                    Ok(None) => {
                        info!("ping endpoint disconnected");
                        let _ = poll.registry().deregister(&mut ping.stream);
                        self.ping_peer = None;
                        self.return_ctx = None;
                        return;
                    }
                    Ok(Some(bytes)) if bytes.is_empty() => break,
                    Ok(Some(bytes)) => messages.push(bytes),
                    Err(e) => {
                        warn!("ping endpoint recv error: {e}");
                        break;
                    }
                }
            }
        }
        for bytes in messages {
            self.handle_ping_message(&bytes);
        }
    }

    fn handle_ping_message(&mut self, bytes: &[u8]) {
        let req = match PingRequest::decode(bytes) {
            Ok(r) => r,
            Err(e) => {
                debug!("dropping malformed ping endpoint message: {e}");
                return;
            }
        };

        match req.kind {
            PingKind::Ping => {
                let sdu = tagged_wire_sdu(PingKind::Ping, &req.payload);
                self.originate_send(req.dst_mip, req.ttl, sdu)
            }
            PingKind::Pong => match self.return_ctx.take() {
                Some((dst, ttl)) if ttl > 0 => {
                    let sdu = tagged_wire_sdu(PingKind::Pong, &req.payload);
                    self.originate_send(dst, ttl, sdu)
                }
                Some(_) => debug!("TTL exhausted on return path, dropping PONG"),
                None => debug!("no return context set, dropping PONG silently"),
            },
        }
    }

    /// Originate a PING/PONG SDU toward `dst`: build a PDU, obtain the
    /// next-hop via the routing daemon (enqueue + REQ), then resolve the
    /// MAC and transmit once the RES arrives (§4.E "Ping endpoint
    /// receive"). `sdu` is already word-packed per §3's ping payload
    /// layout. Unlike a transit packet, a locally-originated PDU's TTL is
    /// the caller's chosen starting value (or, for a PONG, the already-
    /// decremented return-path value) and must not be decremented again
    /// before it leaves this node.
    fn originate_send(&mut self, dst: u8, ttl: u8, sdu: Vec<u8>) {
        if !is_node_address(dst) {
            debug!("refusing to originate a packet to the broadcast address");
            return;
        }

        let Some(routing) = self.routing_peer.as_mut() else {
            debug!("no routing daemon connected, dropping originate to {dst}");
            return;
        };

        let pdu = Pdu::with_blank_link_header(dst, self.local_mip, ttl, SduType::Ping, sdu);
        self.forward.push(pdu);
        if let Err(e) = routing.send(&RouteMessage::Request { src: self.local_mip, destination: dst }.encode()) {
            warn!("failed to send ROUTE_REQ: {e}");
        }
    }

    fn send_resolved(&mut self, mut pdu: Pdu, mac: MacAddr, iface: usize) {
        let Some(my_mac) = self.iface_mac(iface as i32) else { return };
        pdu.set_link_header(mac, my_mac);
        if let Err(e) = self.link.send(&pdu.serialize(), iface as i32) {
            warn!("failed to transmit resolved packet: {e}");
        }
    }

    fn broadcast_arp_request(&mut self, subject: u8) {
        for iface in self.interfaces.clone() {
            let req = build_arp_request(iface.mac, self.local_mip, subject);
            if let Err(e) = self.link.send(&req.serialize(), iface.index) {
                warn!("failed to send ARP request on {}: {e}", iface.name);
            }
        }
    }

    fn handle_routing_peer(&mut self, poll: &Poll) {
        let mut messages = Vec::new();
        {
            let Some(routing) = self.routing_peer.as_mut() else { return };
            loop {
                match routing.recv() {
                    Ok(None) => {
                        info!("routing daemon disconnected");
                        let _ = poll.registry().deregister(&mut routing.stream);
                        self.routing_peer = None;
                        return;
                    }
                    Ok(Some(bytes)) if bytes.is_empty() => break,
                    Ok(Some(bytes)) => messages.push(bytes),
                    Err(e) => {
                        warn!("routing daemon recv error: {e}");
                        break;
                    }
                }
            }
        }
        for bytes in messages {
            self.handle_route_message(&bytes);
        }
    }

    fn handle_route_message(&mut self, bytes: &[u8]) {
        let msg = match RouteMessage::decode(bytes) {
            Ok(m) => m,
            Err(e) => {
                debug!("dropping malformed route message: {e}");
                return;
            }
        };

        match msg {
            RouteMessage::Hello { .. } | RouteMessage::Update { .. } => self.broadcast_route_plane(bytes),
            RouteMessage::Response { next_hop, .. } => self.resolve_forward_front(next_hop),
            RouteMessage::Request { .. } => {
                debug!("unexpected ROUTE_REQ arriving from the routing daemon, ignoring");
            }
        }
    }

    /// HELLO/UPD are rebroadcast as broadcast-MIP PDUs on every interface
    /// with TTL=1 (§4.E).
    fn broadcast_route_plane(&mut self, payload: &[u8]) {
        for iface in self.interfaces.clone() {
            let pdu = Pdu::new(
                MacAddr::BROADCAST,
                iface.mac,
                MIP_BROADCAST,
                self.local_mip,
                1,
                SduType::Route,
                payload.to_vec(),
            );
            if let Err(e) = self.link.send(&pdu.serialize(), iface.index) {
                warn!("failed to broadcast route-plane message on {}: {e}", iface.name);
            }
        }
    }

    fn resolve_forward_front(&mut self, next_hop: u8) {
        let Some(pdu) = self.forward.pop_front() else {
            debug!("ROUTE_RESPONSE arrived with no pending forward packet");
            return;
        };

        if next_hop == ROUTE_DISTANCE_INFINITY {
            debug!("no route to destination, dropping forwarded packet");
            return;
        }

        if let Some((mac, iface)) = self.arp.lookup(next_hop) {
            self.send_resolved(pdu, mac, iface);
        } else if self.pending.insert(next_hop, pdu) {
            self.broadcast_arp_request(next_hop);
        } else {
            warn!("pending-ARP table full, dropping forwarded packet to {next_hop}");
        }
    }
}

/// Build the word-packed wire SDU for a ping endpoint message: the
/// `"PING:"`/`"PONG:"` tag followed by the payload text, packed per §3's
/// ping payload layout. Non-UTF-8 payload bytes are lossily replaced —
/// ping messages are ASCII text on the wire.
fn tagged_wire_sdu(kind: PingKind, payload: &[u8]) -> Vec<u8> {
    let mut text = String::from(kind.wire_tag());
    text.push_str(&String::from_utf8_lossy(payload));
    string_to_words(&text).iter().flat_map(|w| w.to_be_bytes()).collect()
}

/// Reinterpret a whole-word-aligned SDU as its packed `u32` words, for
/// [`words_to_string`]. Returns `None` if the byte length isn't a multiple
/// of 4 (a malformed frame).
fn bytes_to_words(bytes: &[u8]) -> Option<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(bytes.chunks_exact(4).map(|c| u32::from_be_bytes(c.try_into().unwrap())).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_wire_sdu_round_trips_through_bytes_to_words() {
        let sdu = tagged_wire_sdu(PingKind::Ping, b"hello");
        assert_eq!(sdu.len() % 4, 0);
        let words = bytes_to_words(&sdu).unwrap();
        assert_eq!(words_to_string(&words).unwrap(), "PING:hello");
    }

    #[test]
    fn pong_tag_is_distinguishable_from_ping() {
        let ping = tagged_wire_sdu(PingKind::Ping, b"x");
        let pong = tagged_wire_sdu(PingKind::Pong, b"x");
        assert_ne!(ping, pong);
    }

    #[test]
    fn bytes_to_words_rejects_non_word_aligned_input() {
        assert!(bytes_to_words(&[1, 2, 3]).is_none());
    }

    #[test]
    fn empty_payload_round_trips() {
        let sdu = tagged_wire_sdu(PingKind::Pong, b"");
        let words = bytes_to_words(&sdu).unwrap();
        assert_eq!(words_to_string(&words).unwrap(), "PONG:");
    }
}
