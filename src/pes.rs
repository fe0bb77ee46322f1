//! PES (Packetized Elementary Stream) header parsing.

use crate::{parse_timestamp, ErrorDetails, Result, SliceReader};
use log::warn;
use modular_bitfield_msb::prelude::*;

/// Fixed 6-byte PES packet header.
#[bitfield]
#[derive(Debug, Clone, Copy)]
pub struct PesHeader {
    pub start_code: B24,
    pub stream_id: B8,
    pub packet_length: B16,
}

/// Fixed 3-byte PES optional header, present for most stream IDs.
#[bitfield]
#[derive(Debug, Clone, Copy)]
pub struct PesOptionalHeader {
    pub marker_bits: B2,
    pub scrambling_control: B2,
    pub priority: bool,
    pub data_alignment_indicator: bool,
    pub copyright: bool,
    pub original: bool,
    pub has_pts: bool,
    pub has_dts: bool,
    pub escr: bool,
    pub es_rate: bool,
    pub dsm_trick_mode: bool,
    pub has_additional_copy_info: bool,
    pub has_crc: bool,
    pub has_extension: bool,
    pub additional_header_length: B8,
}

/// Outcome of parsing a PES header from the start of a PUSI packet's payload.
pub struct ParsedPesHeader {
    /// Fixed 6-byte PES header.
    pub header: PesHeader,
    /// 3-byte optional header, present for most stream IDs.
    pub optional_header: Option<PesOptionalHeader>,
    /// Presentation timestamp, in 90kHz units, or 0 if none was present.
    pub pts: u64,
    /// Decode timestamp, in 90kHz units, or 0 if none was present.
    pub dts: u64,
    /// Number of bytes consumed from the input; the caller should resume accumulating the
    /// elementary stream payload starting at this offset.
    pub header_len: usize,
}

/// Minimum bytes needed for [`parse_pes_header`] to succeed: 6-byte fixed header + 3-byte
/// optional header + up to 10 bytes of PTS/DTS.
pub const MIN_PES_HEADER_LEN: usize = 19;

/// Parses a PES header starting at `data[0]`, which must begin with the `00 00 01` start code.
///
/// `stream_id == 0xBF` (private stream 2) carries no optional header at all; its payload begins
/// immediately after the 6-byte fixed header, matching every source generation consulted for
/// this implementation.
pub fn parse_pes_header(data: &[u8]) -> Result<ParsedPesHeader> {
    let mut reader = SliceReader::new(data);
    let header = PesHeader::from_bytes(*reader.read_array_ref::<6>()?);
    if header.start_code() != 1 {
        return Err(reader.make_error(ErrorDetails::BadPesHeader));
    }

    let stream_id = header.stream_id();
    if stream_id == 0xBF {
        return Ok(ParsedPesHeader {
            header,
            optional_header: None,
            pts: 0,
            dts: 0,
            header_len: 6,
        });
    }

    let mut pts = 0u64;
    let mut dts = 0u64;
    let optional_header = PesOptionalHeader::from_bytes(*reader.read_array_ref::<3>()?);
    let additional_length = optional_header.additional_header_length() as usize;
    let mut o_reader = reader.new_sub_reader(additional_length)?;

    if optional_header.has_pts() {
        if o_reader.remaining_len() < 5 {
            warn!("Short read of PTS");
            return Err(o_reader.make_error(ErrorDetails::BadPesHeader));
        }
        pts = parse_timestamp(o_reader.read_array_ref::<5>()?);
    }
    if optional_header.has_dts() {
        if o_reader.remaining_len() < 5 {
            warn!("Short read of DTS");
            return Err(o_reader.make_error(ErrorDetails::BadPesHeader));
        }
        dts = parse_timestamp(o_reader.read_array_ref::<5>()?);
    }

    Ok(ParsedPesHeader {
        header,
        optional_header: Some(optional_header),
        pts,
        dts,
        header_len: 6 + 3 + additional_length,
    })
}

/// Stream ID ranges for the PES dispatch in record state machines.
pub mod stream_id {
    /// `0xC0..0xF0` is audio; the teacher's and reference's ranges both fold video (`0xE0..0xF0`)
    /// into the same interval, since the optional-header shape is identical.
    pub fn is_audio_or_video(stream_id: u8) -> bool {
        (0xC0..0xF0).contains(&stream_id)
    }

    /// `private_stream_1`: carries data private to the stream's owning application (SCTE-35 among others).
    pub const PRIVATE_STREAM_1: u8 = 0xBD;
    /// `padding_stream`: payload carries no reportable unit.
    pub const PADDING_STREAM: u8 = 0xBE;
    /// `private_stream_2`: carries data private to the stream's owning application.
    pub const PRIVATE_STREAM_2: u8 = 0xBF;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts_bytes(marker: u8, pts: u64) -> [u8; 5] {
        let mut b = [0u8; 5];
        b[0] = marker | (((pts >> 30) & 0x7) as u8) << 1 | 1;
        b[1] = ((pts >> 22) & 0xFF) as u8;
        b[2] = (((pts >> 15) & 0x7F) as u8) << 1 | 1;
        b[3] = ((pts >> 7) & 0xFF) as u8;
        b[4] = ((pts & 0x7F) as u8) << 1 | 1;
        b
    }

    #[test]
    fn parses_header_with_pts_only() {
        let pts: u64 = 0x1_5555_5555 & 0x1_FFFF_FFFF;
        let mut data = vec![0x00, 0x00, 0x01, 0xE0, 0x00, 0x00];
        data.push(0x80); // marker bits
        data.push(0x80); // has_pts
        data.push(5); // additional_header_length
        data.extend_from_slice(&pts_bytes(0x20, pts));
        let parsed = parse_pes_header(&data).unwrap();
        assert_eq!(parsed.header.stream_id(), 0xE0);
        assert_eq!(parsed.pts, pts);
        assert_eq!(parsed.dts, 0);
        assert_eq!(parsed.header_len, 14);
    }

    #[test]
    fn private_stream_2_has_no_optional_header() {
        let data = [0x00, 0x00, 0x01, 0xBF, 0x00, 0x04, 0xAA, 0xBB, 0xCC, 0xDD];
        let parsed = parse_pes_header(&data).unwrap();
        assert!(parsed.optional_header.is_none());
        assert_eq!(parsed.header_len, 6);
    }

    #[test]
    fn bad_start_code_is_an_error() {
        let data = [0x00, 0x00, 0x00, 0xE0, 0x00, 0x00];
        assert!(parse_pes_header(&data).is_err());
    }
}
