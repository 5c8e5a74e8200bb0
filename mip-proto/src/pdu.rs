//! The MIP Protocol Data Unit: link header + MIP header + SDU (§3, §4.B).
//!
//! The 32-bit MIP header is serialized with explicit shifts and masks in
//! network byte order, not through a packed `#[repr(C)]` struct — relying on
//! compiler bitfield layout here would be a portability trap (`spec.md` §9,
//! "Design Notes").

use crate::addr::{MacAddr, ETHERTYPE_MIP, MAC_BROADCAST};
use crate::error::{MipError, Result};

/// Ethernet header size, in bytes (no VLAN tag).
pub const ETH_HDR_LEN: usize = 14;
/// MIP header size, in bytes.
pub const MIP_HDR_LEN: usize = 4;

/// SDU type tag carried in the MIP header's low 3 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SduType {
    MipArp = 0x01,
    Ping = 0x02,
    Route = 0x04,
}

impl SduType {
    fn from_u8(v: u8) -> Option<SduType> {
        match v {
            0x01 => Some(SduType::MipArp),
            0x02 => Some(SduType::Ping),
            0x04 => Some(SduType::Route),
            _ => None,
        }
    }
}

/// The 32-bit MIP header, decoded into its constituent fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MipHeader {
    pub dst: u8,
    pub src: u8,
    pub ttl: u8,
    pub sdu_len_words: u16,
    pub sdu_type: SduType,
}

impl MipHeader {
    /// Pack the header into its 32-bit network-byte-order wire form.
    pub fn encode(&self) -> [u8; MIP_HDR_LEN] {
        let word: u32 = ((self.dst as u32) << 24)
            | ((self.src as u32) << 16)
            | (((self.ttl & 0x0f) as u32) << 12)
            | (((self.sdu_len_words & 0x1ff) as u32) << 3)
            | ((self.sdu_type as u32) & 0x7);
        word.to_be_bytes()
    }

    /// Unpack a 32-bit network-byte-order header.
    pub fn decode(bytes: [u8; MIP_HDR_LEN]) -> Result<MipHeader> {
        let word = u32::from_be_bytes(bytes);
        let dst = (word >> 24) as u8;
        let src = (word >> 16) as u8;
        let ttl = ((word >> 12) & 0x0f) as u8;
        let sdu_len_words = ((word >> 3) & 0x1ff) as u16;
        let sdu_type_raw = (word & 0x7) as u8;
        let sdu_type = SduType::from_u8(sdu_type_raw)
            .ok_or_else(|| MipError::Parse(format!("unknown sdu_type {sdu_type_raw}")))?;
        Ok(MipHeader { dst, src, ttl, sdu_len_words, sdu_type })
    }
}

/// A full MIP PDU: Ethernet header fields plus the MIP header and SDU bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    pub dst_mac: MacAddr,
    pub src_mac: MacAddr,
    pub header: MipHeader,
    pub sdu: Vec<u8>,
}

impl Pdu {
    /// Build a PDU, computing `sdu_len_words` from `sdu`'s byte length
    /// (rounded up to a whole 32-bit word, per §3).
    pub fn new(dst_mac: MacAddr, src_mac: MacAddr, dst: u8, src: u8, ttl: u8, sdu_type: SduType, sdu: Vec<u8>) -> Pdu {
        let sdu_len_words = (sdu.len().div_ceil(4)) as u16;
        Pdu {
            dst_mac,
            src_mac,
            header: MipHeader { dst, src, ttl, sdu_len_words, sdu_type },
            sdu,
        }
    }

    /// A PDU with a blank (all-zero) link header, used while a packet sits
    /// in the pending-ARP table waiting for its destination MAC.
    pub fn with_blank_link_header(dst: u8, src: u8, ttl: u8, sdu_type: SduType, sdu: Vec<u8>) -> Pdu {
        Pdu::new(MacAddr::default(), MacAddr::default(), dst, src, ttl, sdu_type, sdu)
    }

    pub fn set_link_header(&mut self, dst_mac: MacAddr, src_mac: MacAddr) {
        self.dst_mac = dst_mac;
        self.src_mac = src_mac;
    }

    pub fn is_broadcast_mip(&self) -> bool {
        self.header.dst == crate::addr::MIP_BROADCAST
    }

    /// Decrement TTL by one. Returns `Err(MipError::TtlExhausted)` without
    /// mutating the header if TTL is already zero (§3 invariant: "TTL=0 at
    /// forward-time = drop").
    pub fn decrement_ttl(&mut self) -> Result<()> {
        if self.header.ttl == 0 {
            return Err(MipError::TtlExhausted);
        }
        self.header.ttl -= 1;
        Ok(())
    }

    /// Serialize the full link + MIP + SDU frame, padding to the Ethernet
    /// minimum frame size the way raw sockets require.
    pub fn serialize(&self) -> Vec<u8> {
        let padded_sdu_len = (self.header.sdu_len_words as usize) * 4;
        let mut frame = Vec::with_capacity(ETH_HDR_LEN + MIP_HDR_LEN + padded_sdu_len);
        frame.extend_from_slice(&self.dst_mac.0);
        frame.extend_from_slice(&self.src_mac.0);
        frame.extend_from_slice(&ETHERTYPE_MIP.to_be_bytes());
        frame.extend_from_slice(&self.header.encode());
        frame.extend_from_slice(&self.sdu);
        frame.resize(frame.len() + (padded_sdu_len - self.sdu.len()), 0);

        const ETH_MIN_SIZE: usize = 60;
        if frame.len() < ETH_MIN_SIZE {
            frame.resize(ETH_MIN_SIZE, 0);
        }
        frame
    }

    /// Parse a received link frame into a `Pdu`. Validates Ethertype, that
    /// the declared SDU length does not exceed the bytes actually received,
    /// and that `sdu_type` is one of the three known values.
    pub fn deserialize(data: &[u8]) -> Result<Pdu> {
        if data.len() < ETH_HDR_LEN + MIP_HDR_LEN {
            return Err(MipError::Parse("frame shorter than link+MIP header".into()));
        }

        let dst_mac = MacAddr([data[0], data[1], data[2], data[3], data[4], data[5]]);
        let src_mac = MacAddr([data[6], data[7], data[8], data[9], data[10], data[11]]);
        let ethertype = u16::from_be_bytes([data[12], data[13]]);
        if ethertype != ETHERTYPE_MIP {
            return Err(MipError::Parse(format!("unexpected ethertype {ethertype:#06x}")));
        }

        let mip_bytes: [u8; MIP_HDR_LEN] = data[ETH_HDR_LEN..ETH_HDR_LEN + MIP_HDR_LEN]
            .try_into()
            .expect("slice length checked above");
        let header = MipHeader::decode(mip_bytes)?;

        let sdu_byte_len = header.sdu_len_words as usize * 4;
        let sdu_start = ETH_HDR_LEN + MIP_HDR_LEN;
        let sdu_end = sdu_start + sdu_byte_len;
        if data.len() < sdu_end {
            return Err(MipError::Parse(format!(
                "declared sdu_len {sdu_byte_len} exceeds received {} bytes",
                data.len() - sdu_start
            )));
        }

        Ok(Pdu { dst_mac, src_mac, header, sdu: data[sdu_start..sdu_end].to_vec() })
    }
}

/// Build the standalone ARP broadcast/unicast link+MIP framing shared by
/// request and reply (`spec.md` §3 "ARP SDU").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpMessage {
    Request { subject: u8 },
    Reply { subject: u8 },
}

impl ArpMessage {
    /// Encode into the single 32-bit ARP SDU word: bit 31 = type
    /// (0=request, 1=reply), bits 30..23 = subject MIP, remainder reserved.
    pub fn encode(&self) -> [u8; 4] {
        let (type_bit, subject) = match *self {
            ArpMessage::Request { subject } => (0u32, subject),
            ArpMessage::Reply { subject } => (1u32, subject),
        };
        let word = (type_bit << 31) | ((subject as u32) << 23);
        word.to_be_bytes()
    }

    pub fn decode(sdu: &[u8]) -> Result<ArpMessage> {
        if sdu.len() != 4 {
            return Err(MipError::Parse(format!("ARP SDU must be exactly one word, got {} bytes", sdu.len())));
        }
        let word = u32::from_be_bytes(sdu.try_into().unwrap());
        let subject = ((word >> 23) & 0xff) as u8;
        if word & (1 << 31) != 0 {
            Ok(ArpMessage::Reply { subject })
        } else {
            Ok(ArpMessage::Request { subject })
        }
    }
}

/// Build an ARP-request PDU, broadcast on one interface.
pub fn build_arp_request(src_mac: MacAddr, local_mip: u8, subject: u8) -> Pdu {
    Pdu::new(
        MacAddr(MAC_BROADCAST),
        src_mac,
        crate::addr::MIP_BROADCAST,
        local_mip,
        1,
        SduType::MipArp,
        ArpMessage::Request { subject }.encode().to_vec(),
    )
}

/// Build an ARP-reply PDU addressed back to `dst_mac`/`dst_mip`.
pub fn build_arp_reply(src_mac: MacAddr, dst_mac: MacAddr, local_mip: u8, dst_mip: u8, ttl: u8) -> Pdu {
    Pdu::new(
        dst_mac,
        src_mac,
        dst_mip,
        local_mip,
        ttl,
        SduType::MipArp,
        ArpMessage::Reply { subject: local_mip }.encode().to_vec(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pdu() -> Pdu {
        Pdu::new(
            MacAddr([1, 2, 3, 4, 5, 6]),
            MacAddr([6, 5, 4, 3, 2, 1]),
            20,
            10,
            5,
            SduType::Ping,
            b"PING:hello".to_vec(),
        )
    }

    #[test]
    fn header_bit_layout_matches_formula() {
        let hdr = MipHeader { dst: 20, src: 10, ttl: 5, sdu_len_words: 3, sdu_type: SduType::Ping };
        let expected: u32 = ((20u32) << 24) | ((10u32) << 16) | ((5u32 & 0xf) << 12) | ((3u32 & 0x1ff) << 3) | (0x02 & 0x7);
        assert_eq!(hdr.encode(), expected.to_be_bytes());
        assert_eq!(MipHeader::decode(hdr.encode()).unwrap(), hdr);
    }

    #[test]
    fn pdu_round_trips_through_serialize_deserialize() {
        let pdu = sample_pdu();
        let bytes = pdu.serialize();
        let parsed = Pdu::deserialize(&bytes).unwrap();
        assert_eq!(parsed.dst_mac, pdu.dst_mac);
        assert_eq!(parsed.src_mac, pdu.src_mac);
        assert_eq!(parsed.header, pdu.header);
        // trailing zero padding from word-rounding/min-frame-size is allowed.
        assert_eq!(&parsed.sdu[..pdu.sdu.len()], &pdu.sdu[..]);
    }

    #[test]
    fn sdu_len_times_four_equals_serialized_sdu_bytes() {
        let pdu = sample_pdu();
        let bytes = pdu.serialize();
        let declared = pdu.header.sdu_len_words as usize * 4;
        assert_eq!(bytes.len() - ETH_HDR_LEN - MIP_HDR_LEN, declared.max(60 - ETH_HDR_LEN - MIP_HDR_LEN));
    }

    #[test]
    fn rejects_wrong_ethertype() {
        let mut bytes = sample_pdu().serialize();
        bytes[12] = 0x08;
        bytes[13] = 0x00;
        assert!(Pdu::deserialize(&bytes).is_err());
    }

    #[test]
    fn rejects_truncated_sdu() {
        let mut bytes = sample_pdu().serialize();
        bytes.truncate(ETH_HDR_LEN + MIP_HDR_LEN + 1);
        assert!(Pdu::deserialize(&bytes).is_err());
    }

    #[test]
    fn rejects_unknown_sdu_type() {
        let mut bytes = sample_pdu().serialize();
        // sdu_type occupies the low 3 bits of the 4th header byte.
        let idx = ETH_HDR_LEN + MIP_HDR_LEN - 1;
        bytes[idx] = (bytes[idx] & !0x7) | 0x7;
        assert!(Pdu::deserialize(&bytes).is_err());
    }

    #[test]
    fn decrement_ttl_drops_at_zero() {
        let mut pdu = sample_pdu();
        pdu.header.ttl = 0;
        assert!(pdu.decrement_ttl().is_err());
    }

    #[test]
    fn arp_message_round_trips() {
        for msg in [ArpMessage::Request { subject: 20 }, ArpMessage::Reply { subject: 200 }] {
            assert_eq!(ArpMessage::decode(&msg.encode()).unwrap(), msg);
        }
    }

    #[test]
    fn arp_discovery_scenario_wire_bytes() {
        // spec.md §8 scenario 2: A(10) broadcasts an ARP request for B(20).
        let pdu = build_arp_request(MacAddr([0xAA; 6]), 10, 20);
        assert_eq!(pdu.header, MipHeader { dst: 0xFF, src: 10, ttl: 1, sdu_len_words: 1, sdu_type: SduType::MipArp });
        let sdu_word = u32::from_be_bytes(pdu.sdu.clone().try_into().unwrap());
        assert_eq!(sdu_word, 0x14u32 << 23);
    }
}
