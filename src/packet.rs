//! Per-packet header and adaptation field parsing.

use crate::{pts_format_args, Error, ErrorDetails, Result, SliceReader};
use log::warn;
use modular_bitfield_msb::prelude::*;
use smallvec::SmallVec;
use std::fmt::{Debug, Formatter};

/// TSC (transport scrambling control) field of a packet header.
#[repr(u8)]
#[derive(Debug, BitfieldSpecifier)]
#[bits = 2]
pub enum TransportScramblingControl {
    /// Not scrambled.
    NotScrambled,
    /// Reserved value.
    Reserved,
    /// Scrambled with an even key.
    ScrambledEvenKey,
    /// Scrambled with an odd key.
    ScrambledOddKey,
}

/// Link-layer header found at the start of every 188-byte MPEG-TS packet.
#[bitfield]
#[derive(Debug)]
pub struct PacketHeader {
    pub sync_byte: B8,
    pub tei: bool,
    pub pusi: bool,
    pub priority: bool,
    pub pid: B13,
    pub tsc: TransportScramblingControl,
    pub has_adaptation_field: bool,
    pub has_payload: bool,
    pub continuity_counter: B4,
}

/// Header describing which optional fields an adaptation field carries.
#[bitfield]
#[derive(Debug)]
pub struct AdaptationFieldHeader {
    pub length: B8,
    pub discontinuity: bool,
    pub random_access: bool,
    pub priority: bool,
    pub has_pcr: bool,
    pub has_opcr: bool,
    pub has_splice_countdown: bool,
    pub has_transport_private_data: bool,
    pub has_adaptation_field_extension: bool,
}

/// Program Clock Reference: a 33-bit, 90kHz base plus a 9-bit, 27MHz extension.
#[derive(Default, Copy, Clone, PartialEq, Eq)]
pub struct PcrTimestamp {
    /// 33-bit base, 90kHz. May be formatted with [`pts_format_args`].
    pub base: u64,
    /// 9-bit extension, rolling over every 300 counts to the base.
    pub extension: u16,
}

impl PcrTimestamp {
    /// The full 27MHz composite value: `base * 300 + extension`.
    pub fn composite(&self) -> u64 {
        self.base * 300 + self.extension as u64
    }
}

impl Debug for PcrTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PcrTimestamp")
            .field("base", &pts_format_args!(self.base))
            .field("extension", &self.extension)
            .finish()
    }
}

/// Non-payload packet metadata carried between the packet header and the payload.
#[derive(Debug)]
pub struct AdaptationField {
    /// Fixed flags describing which optional fields follow.
    pub header: AdaptationFieldHeader,
    /// Program Clock Reference, present when `header.has_pcr()`.
    pub pcr: Option<PcrTimestamp>,
    /// Original Program Clock Reference, present when `header.has_opcr()`.
    pub opcr: Option<PcrTimestamp>,
    /// Splice countdown, present when `header.has_splice_countdown()`.
    pub splice_countdown: Option<i8>,
    /// Raw transport-private-data bytes, present when
    /// `header.has_transport_private_data()`. Interpreted by [`crate::adaptation_private`].
    pub private_data: SmallVec<[u8; 16]>,
}

/// Parses a 6-byte PCR field into base + extension.
pub fn parse_pcr(b: &[u8; 6]) -> PcrTimestamp {
    let mut base: u64 = (b[0] as u64) << 25;
    base |= (b[1] as u64) << 17;
    base |= (b[2] as u64) << 9;
    base |= (b[3] as u64) << 1;
    base |= (b[4] as u64) >> 7;

    let mut extension: u16 = ((b[4] & 0x1) as u16) << 8;
    extension |= b[5] as u16;
    PcrTimestamp { base, extension }
}

/// Parses a 5-byte PES timestamp (PTS or DTS) encoding a 33-bit, 90kHz value.
pub fn parse_timestamp(b: &[u8; 5]) -> u64 {
    let mut ts: u64 = ((b[0] & 0x0E) as u64) << 29;
    ts |= (b[1] as u64) << 22;
    ts |= ((b[2] & 0xFE) as u64) << 14;
    ts |= (b[3] as u64) << 7;
    ts |= ((b[4] & 0xFE) as u64) >> 1;
    ts
}

/// One fully parsed 188-byte TS packet, tagged with its ordinal position in the stream.
#[derive(Debug)]
pub struct TsPacket<'a> {
    /// Monotonically increasing ordinal assigned by the engine, starting at 0.
    pub pos: u64,
    /// Fixed 4-byte link-layer header.
    pub header: PacketHeader,
    /// Adaptation field, present when `header.has_adaptation_field()`.
    pub adaptation_field: Option<AdaptationField>,
    /// Remaining bytes after the header and adaptation field; empty if none present.
    pub payload: &'a [u8],
}

impl<'a> TsPacket<'a> {
    /// Whether this packet carries a PCR in its adaptation field.
    pub fn pcr(&self) -> Option<PcrTimestamp> {
        self.adaptation_field.as_ref().and_then(|af| af.pcr)
    }

    /// Payload-unit-start-indicator.
    pub fn pusi(&self) -> bool {
        self.header.pusi()
    }

    /// 13-bit packet identifier.
    pub fn pid(&self) -> u16 {
        self.header.pid()
    }
}

fn read_adaptation_field<'a>(reader: &mut SliceReader<'a>) -> Result<AdaptationField> {
    let header = read_bitfield!(reader, AdaptationFieldHeader);
    let adaptation_field_length = header.length() as usize;
    if adaptation_field_length == 0 {
        return Ok(AdaptationField {
            header,
            pcr: None,
            opcr: None,
            splice_countdown: None,
            private_data: SmallVec::new(),
        });
    }
    if adaptation_field_length > 183 {
        warn!("Bad adaptation field length: {}", adaptation_field_length);
        return Err(reader.make_error(ErrorDetails::BadAdaptationHeader));
    }
    let mut a_reader = reader.new_sub_reader(adaptation_field_length - 1)?;
    let mut out = AdaptationField {
        header,
        pcr: None,
        opcr: None,
        splice_countdown: None,
        private_data: SmallVec::new(),
    };
    if out.header.has_pcr() {
        if a_reader.remaining_len() < 6 {
            warn!("Short read of PCR");
            return Err(reader.make_error(ErrorDetails::BadAdaptationHeader));
        }
        out.pcr = Some(parse_pcr(a_reader.read_array_ref::<6>()?));
    }
    if out.header.has_opcr() {
        if a_reader.remaining_len() < 6 {
            warn!("Short read of OPCR");
            return Err(reader.make_error(ErrorDetails::BadAdaptationHeader));
        }
        out.opcr = Some(parse_pcr(a_reader.read_array_ref::<6>()?));
    }
    if out.header.has_splice_countdown() {
        if a_reader.remaining_len() < 1 {
            warn!("Short read of splice countdown");
            return Err(reader.make_error(ErrorDetails::BadAdaptationHeader));
        }
        out.splice_countdown = Some(a_reader.read_u8()? as i8);
    }
    if out.header.has_transport_private_data() {
        if a_reader.remaining_len() < 1 {
            warn!("Short read of private data length");
            return Err(reader.make_error(ErrorDetails::BadAdaptationHeader));
        }
        let private_len = a_reader.read_u8()? as usize;
        if a_reader.remaining_len() < private_len {
            warn!("Short read of private data");
            return Err(reader.make_error(ErrorDetails::BadAdaptationHeader));
        }
        out.private_data.extend_from_slice(a_reader.read(private_len)?);
    }
    // Adaptation field extension is not consumed by any record in this crate; the remainder of
    // a_reader (extension + stuffing bytes) is simply dropped along with the sub-reader.
    Ok(out)
}

/// Parses a single 188-byte TS packet. `pos` is supplied by the caller (the engine), since a
/// packet alone carries no notion of its own ordinal position in the stream.
pub fn parse_packet<'a>(pos: u64, packet: &'a [u8; 188]) -> Result<TsPacket<'a>> {
    let mut reader = SliceReader::new(packet);
    let header: PacketHeader = read_bitfield!(reader, PacketHeader);
    if header.sync_byte() != 0x47 {
        return Err(reader.make_error(ErrorDetails::LostSync));
    }

    let mut adaptation_field = None;
    if header.has_adaptation_field() {
        adaptation_field = Some(read_adaptation_field(&mut reader)?);
    }

    let payload = if header.has_payload() {
        reader.read_to_end()?
    } else {
        &[]
    };

    Ok(TsPacket {
        pos,
        header,
        adaptation_field,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet_with_payload(pid: u16, pusi: bool, payload: &[u8]) -> [u8; 188] {
        let mut buf = [0xFFu8; 188];
        buf[0] = 0x47;
        buf[1] = ((pusi as u8) << 6) | ((pid >> 8) as u8 & 0x1F);
        buf[2] = (pid & 0xFF) as u8;
        buf[3] = 0x10; // no adaptation field, has payload, cc=0
        buf[4..4 + payload.len()].copy_from_slice(payload);
        buf
    }

    #[test]
    fn parses_minimal_header() {
        let buf = packet_with_payload(0x100, true, &[0xAA, 0xBB]);
        let pkt = parse_packet(0, &buf).unwrap();
        assert_eq!(pkt.pid(), 0x100);
        assert!(pkt.pusi());
        assert_eq!(&pkt.payload[0..2], &[0xAA, 0xBB]);
    }

    #[test]
    fn lost_sync_is_an_error() {
        let mut buf = packet_with_payload(0, false, &[]);
        buf[0] = 0x00;
        assert!(parse_packet(0, &buf).is_err());
    }

    #[test]
    fn adaptation_only_packet_has_empty_payload() {
        let mut buf = [0xFFu8; 188];
        buf[0] = 0x47;
        buf[1] = 0x00;
        buf[2] = 0x00;
        buf[3] = 0x20; // adaptation field only, no payload
        buf[4] = 183; // adaptation_field_length
        buf[5] = 0x00; // no flags set
        let pkt = parse_packet(0, &buf).unwrap();
        assert!(pkt.payload.is_empty());
        assert!(pkt.adaptation_field.is_some());
    }

    #[test]
    fn extracts_pcr() {
        let mut buf = [0xFFu8; 188];
        buf[0] = 0x47;
        buf[1] = 0x00;
        buf[2] = 0x00;
        buf[3] = 0x30; // adaptation field + payload
        buf[4] = 7; // adaptation_field_length (flags + 6-byte pcr)
        buf[5] = 0x10; // has_pcr
        // base = 1, extension = 0
        buf[6] = 0x00;
        buf[7] = 0x00;
        buf[8] = 0x00;
        buf[9] = 0x02;
        buf[10] = 0x7E;
        buf[11] = 0x00;
        let pkt = parse_packet(0, &buf).unwrap();
        let pcr = pkt.pcr().unwrap();
        assert_eq!(pcr.base, 1);
        assert_eq!(pcr.extension, 0);
    }
}
