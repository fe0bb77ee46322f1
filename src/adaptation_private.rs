//! Adaptation-field private-data TLV parsing: AuInfo, DirecTV time code, BroadcastId, and
//! pre-standard/CableLabs Encoder Boundary Point (EBP) records.

use crate::BitReader;
use serde::Serialize;

/// NTP epoch offset (seconds between 1900-01-01 and 1970-01-01), used to convert an EBP NTP
/// timestamp to Unix time.
pub const NTP_UNIX_EPOCH_OFFSET: u64 = 0x83AA7E80;

/// Decoded `AuInfo` (tag 0x02) adaptation-field private data.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct AuInfo {
    /// Codec identifier (e.g. MPEG-2 Video, H.264, H.265).
    pub coding_format: u8,
    /// Coding-format-specific picture/frame/field type.
    pub coding_type: u8,
    /// H.264/H.265 `nal_ref_idc`-style reference-picture indicator.
    pub ref_pic_idc: u8,
    /// Picture structure (frame, top field, bottom field).
    pub pic_struct: u8,
    /// Whether `pts` carries a real value.
    pub pts_present: bool,
    /// Whether profile/level fields are present.
    pub profile_info_present: bool,
    /// Whether stream-info fields (e.g. `frame_rate_code`) are present.
    pub stream_info_present: bool,
    /// Whether trick-mode info is present.
    pub trick_mode_info_present: bool,
    /// Presentation timestamp, in 90kHz units, when `pts_present` is set.
    pub pts: u64,
    /// Frame rate code, when `stream_info_present` is set.
    pub frame_rate_code: u8,
    /// Codec profile, when `profile_info_present` is set.
    pub profile: u8,
    /// H.264-specific profile flags, when `profile_info_present` is set.
    pub avc_flags: u8,
    /// Codec level, when `profile_info_present` is set.
    pub level: u8,
}

/// Decoded DirecTV time code (tag 0xA0).
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DirecTvTimeCode {
    /// Whether this is a drop-frame timecode.
    pub drop_flag: bool,
    /// Hours component.
    pub hours: u8,
    /// Minutes component.
    pub minutes: u8,
    /// Seconds component.
    pub seconds: u8,
    /// Frame/picture count component.
    pub pictures: u8,
}

/// Decoded BroadcastId (tag 0xAD).
#[derive(Debug, Clone, Default, Serialize)]
pub struct BroadcastId {
    /// Broadcaster-assigned identifier.
    pub identifier: u32,
    /// Origin indicator (network vs. affiliate).
    pub origin: u8,
    /// Service (station) name.
    pub service_name: String,
    /// Transport stream id of the originating multiplex.
    pub transport_stream_id: u16,
    /// ATSC major channel number, when present.
    pub major_channel: Option<u16>,
    /// ATSC minor channel number, when present.
    pub minor_channel: Option<u16>,
}

/// Which EBP source variant a record was decoded from. Both are kept as a union rather than
/// picked between, since the two source generations consulted for this implementation disagree
/// on which tag byte they use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EbpVariant {
    /// Pre-standard tag `0xA9`.
    PreStandard,
    /// CableLabs tag `0xDF`.
    CableLabs,
}

/// Decoded Encoder Boundary Point (tags 0xA9 pre-standard, 0xDF CableLabs).
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Ebp {
    /// Which source variant this record was decoded from.
    pub variant: EbpVariant,
    /// Whether this boundary point starts a new fragment.
    pub fragment_flag: bool,
    /// Whether this boundary point starts a new segment.
    pub segment_flag: bool,
    /// Whether this boundary point is a Stream Access Point.
    pub sap_flag: bool,
    /// Whether a SAP grouping type is present.
    pub grouping_flag: bool,
    /// Whether `ntp_timestamp` is present.
    pub time_flag: bool,
    /// Whether extension fields are present.
    pub extension_flag: bool,
    /// NTP timestamp, present when `time_flag` is set.
    pub ntp_timestamp: Option<u64>,
}

impl Ebp {
    /// Unix seconds derived from the NTP timestamp's integer part, when present.
    pub fn unix_seconds(&self) -> Option<i64> {
        self.ntp_timestamp
            .map(|ntp| ((ntp >> 32) as i64) - NTP_UNIX_EPOCH_OFFSET as i64)
    }
}

/// One decoded adaptation-field private-data TLV.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum AdaptFieldPrivData {
    /// Tag `0x02`.
    AuInfo(AuInfo),
    /// Tag `0xA0`.
    DirecTvTimeCode(DirecTvTimeCode),
    /// Tag `0xAD`.
    BroadcastId(BroadcastId),
    /// Tags `0xA9`/`0xDF`.
    Ebp(Ebp),
    /// Tag not recognized; raw payload retained.
    Unknown {
        /// The unrecognized tag byte.
        tag: u8,
        /// Raw TLV payload.
        data: Vec<u8>,
    },
}

/// Parses every TLV present in `data` (the raw `transport_private_data_byte` sequence captured
/// from an adaptation field). Unknown tags are skipped by their declared length, exactly as the
/// reference's `ParseAdaptFieldPrivData` does for tags it doesn't special-case.
pub fn parse_adapt_field_priv_data(mut data: &[u8]) -> Vec<AdaptFieldPrivData> {
    let mut out = Vec::new();
    while data.len() >= 2 {
        let tag = data[0];
        let len = data[1] as usize;
        if data.len() < 2 + len {
            break;
        }
        let body = &data[2..2 + len];
        let parsed = match tag {
            0x02 => parse_au_info(body).map(AdaptFieldPrivData::AuInfo),
            0xA0 => parse_directv_timecode(body).map(AdaptFieldPrivData::DirecTvTimeCode),
            0xAD => parse_broadcast_id(body).map(AdaptFieldPrivData::BroadcastId),
            0xA9 => parse_ebp(body, EbpVariant::PreStandard).map(AdaptFieldPrivData::Ebp),
            0xDF => parse_ebp(body, EbpVariant::CableLabs).map(AdaptFieldPrivData::Ebp),
            _ => None,
        };
        out.push(parsed.unwrap_or_else(|| AdaptFieldPrivData::Unknown {
            tag,
            data: body.to_vec(),
        }));
        data = &data[2 + len..];
    }
    out
}

fn parse_au_info(body: &[u8]) -> Option<AuInfo> {
    let mut r = BitReader::new(body);
    let mut info = AuInfo {
        coding_format: r.read_bits(4).ok()? as u8,
        coding_type: r.read_bits(4).ok()? as u8,
        ..Default::default()
    };
    if body.len() <= 1 {
        return Some(info);
    }
    info.ref_pic_idc = r.read_bits(2).ok()? as u8;
    info.pic_struct = r.read_bits(2).ok()? as u8;
    info.pts_present = r.read_flag().ok()?;
    info.profile_info_present = r.read_flag().ok()?;
    info.stream_info_present = r.read_flag().ok()?;
    info.trick_mode_info_present = r.read_flag().ok()?;
    if info.pts_present {
        info.pts = r.read_bits64(32).ok()?;
    }
    if r.remaining_bits() >= 4 {
        let _reserved = r.read_bits(4).ok()?;
        info.frame_rate_code = r.read_bits(4).ok()? as u8;
    }
    if info.profile_info_present && r.remaining_bits() >= 24 {
        info.profile = r.read_bits(8).ok()? as u8;
        info.avc_flags = r.read_bits(8).ok()? as u8;
        info.level = r.read_bits(8).ok()? as u8;
    }
    Some(info)
}

fn parse_directv_timecode(body: &[u8]) -> Option<DirecTvTimeCode> {
    if body.len() < 4 {
        return None;
    }
    let mut r = BitReader::new(body);
    Some(DirecTvTimeCode {
        drop_flag: r.read_flag().ok()?,
        hours: r.read_bits(5).ok()? as u8,
        minutes: r.read_bits(6).ok()? as u8,
        seconds: r.read_bits(6).ok()? as u8,
        pictures: r.read_bits(6).ok()? as u8,
    })
}

fn parse_broadcast_id(body: &[u8]) -> Option<BroadcastId> {
    if body.len() < 21 {
        return None;
    }
    let mut r = BitReader::new(body);
    let identifier = r.read_bits(32).ok()?;
    let origin = r.read_bits(8).ok()? as u8;
    let name_bytes = body.get(5..19)?;
    let service_name = String::from_utf8_lossy(name_bytes)
        .trim_end_matches('\0')
        .to_string();
    r.skip_bytes(14).ok()?;
    let transport_stream_id = r.read_bits(16).ok()? as u16;
    let (mut major_channel, mut minor_channel) = (None, None);
    if origin == 1 && r.remaining_bits() >= 24 {
        r.skip_bits(4).ok()?;
        major_channel = Some(r.read_bits(10).ok()? as u16);
        minor_channel = Some(r.read_bits(10).ok()? as u16);
    }
    Some(BroadcastId {
        identifier,
        origin,
        service_name,
        transport_stream_id,
        major_channel,
        minor_channel,
    })
}

fn parse_ebp(body: &[u8], variant: EbpVariant) -> Option<Ebp> {
    if body.is_empty() {
        return None;
    }
    let mut r = BitReader::new(body);
    let fragment_flag = r.read_flag().ok()?;
    let segment_flag = r.read_flag().ok()?;
    let sap_flag = r.read_flag().ok()?;
    let grouping_flag = r.read_flag().ok()?;
    let time_flag = r.read_flag().ok()?;
    let extension_flag = r.read_flag().ok()?;
    let _reserved = r.read_bits(2).ok()?;
    let ntp_timestamp = if time_flag && r.remaining_bits() >= 64 {
        Some(r.read_bits64(64).ok()?)
    } else {
        None
    };
    Some(Ebp {
        variant,
        fragment_flag,
        segment_flag,
        sap_flag,
        grouping_flag,
        time_flag,
        extension_flag,
        ntp_timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ebp_time_flag_yields_unix_seconds() {
        let mut body = vec![0b0000_1000u8]; // time_flag set, rest clear
        let ntp: u64 = (NTP_UNIX_EPOCH_OFFSET + 1_000) << 32;
        body.extend_from_slice(&ntp.to_be_bytes());
        let ebp = parse_ebp(&body, EbpVariant::CableLabs).unwrap();
        assert_eq!(ebp.unix_seconds(), Some(1_000));
    }

    #[test]
    fn unknown_tag_is_retained_raw() {
        let data = [0x99, 0x02, 0xAA, 0xBB];
        let parsed = parse_adapt_field_priv_data(&data);
        assert_eq!(parsed.len(), 1);
        match &parsed[0] {
            AdaptFieldPrivData::Unknown { tag, data } => {
                assert_eq!(*tag, 0x99);
                assert_eq!(data, &[0xAA, 0xBB]);
            }
            _ => panic!("expected Unknown"),
        }
    }

    #[test]
    fn directv_timecode_parses_fields() {
        // drop=1, hours=5, minutes=30, seconds=15, pictures=2 packed MSB-first across 3 bytes.
        let body = [0b1_00101_01u8, 0b1110_0011u8, 0b11_000010u8];
        let tc = parse_directv_timecode(&body).unwrap();
        assert!(tc.drop_flag);
        assert_eq!(tc.hours, 5);
    }
}
