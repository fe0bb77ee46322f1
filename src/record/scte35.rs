//! SCTE-35 Splice Information Section parsing and reporting.
//!
//! Unlike the other record types, a SCTE-35 PID carries complete PSI-style sections rather than
//! PES units, so accumulation here is driven directly by PUSI transitions over the raw section
//! bytes rather than through [`super::pes_unit::PesAccumulator`].

use super::{RecordBase, RecordObject};
use crate::bit_reader::BitReader;
use crate::packet::TsPacket;
use crate::report::Reporter;
use crate::{Error, ErrorDetails, Result};
use std::io;

/// A `splice_time()` structure: either an explicit PTS or an unspecified marker.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpliceTime {
    /// Whether `pts_time` carries a real value.
    pub time_specified: bool,
    /// 90kHz PTS the splice takes effect at, or -1 when `time_specified` is false.
    pub pts_time: i64,
}

fn parse_splice_time(r: &mut BitReader) -> Result<SpliceTime> {
    let time_specified = r.read_flag()?;
    if time_specified {
        r.skip_bits(6)?;
        Ok(SpliceTime {
            time_specified,
            pts_time: r.read_bits64(33)? as i64,
        })
    } else {
        r.skip_bits(7)?;
        Ok(SpliceTime {
            time_specified,
            pts_time: -1,
        })
    }
}

/// A `break_duration()` structure attached to a `splice_insert`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BreakDuration {
    /// Whether the decoder should automatically return from the break after `duration`.
    pub auto_return: bool,
    /// Break duration, in 90kHz units.
    pub duration: i64,
}

fn parse_break_duration(r: &mut BitReader) -> Result<BreakDuration> {
    let auto_return = r.read_flag()?;
    r.skip_bits(6)?;
    Ok(BreakDuration {
        auto_return,
        duration: r.read_bits64(33)? as i64,
    })
}

/// A parsed `splice_insert()` command.
#[derive(Debug, Clone, Default)]
pub struct SpliceInsert {
    /// Identifies this splice event; paired with a later cancellation event of the same id.
    pub splice_event_id: u32,
    /// Whether a previously signaled event with this id is being cancelled.
    pub splice_event_cancel_indicator: bool,
    /// `true` for "out of network" (leaving the network feed), `false` for returning to it.
    pub out_of_network_indicator: bool,
    /// Whether the splice point applies to the whole program rather than per-component.
    pub program_splice_flag: bool,
    /// Whether `break_duration` is present.
    pub duration_flag: bool,
    /// Whether the splice takes effect immediately rather than at a specified `splice_time`.
    pub splice_immediate_flag: bool,
    /// Splice point time, present when `program_splice_flag` is set and not immediate.
    pub splice_time: Option<SpliceTime>,
    /// Duration of the break being spliced in, when `duration_flag` is set.
    pub break_duration: Option<BreakDuration>,
    /// Identifies a specific avail.
    pub unique_program_id: u16,
    /// This avail's index among `avails_expected`.
    pub avail_num: u8,
    /// Total number of avails expected for `unique_program_id`.
    pub avails_expected: u8,
}

fn parse_splice_insert(r: &mut BitReader) -> Result<SpliceInsert> {
    let mut insert = SpliceInsert {
        splice_event_id: r.read_bits(32)?,
        splice_event_cancel_indicator: r.read_flag()?,
        ..Default::default()
    };
    r.skip_bits(7)?;
    if !insert.splice_event_cancel_indicator {
        insert.out_of_network_indicator = r.read_flag()?;
        insert.program_splice_flag = r.read_flag()?;
        insert.duration_flag = r.read_flag()?;
        insert.splice_immediate_flag = r.read_flag()?;
        r.skip_bits(4)?;
        if insert.program_splice_flag && !insert.splice_immediate_flag {
            insert.splice_time = Some(parse_splice_time(r)?);
        }
        if !insert.program_splice_flag {
            let component_count = r.read_bits(8)?;
            for _ in 0..component_count {
                r.skip_bits(8)?; // component_tag
                if !insert.splice_immediate_flag {
                    insert.splice_time = Some(parse_splice_time(r)?);
                }
            }
        }
        if insert.duration_flag {
            insert.break_duration = Some(parse_break_duration(r)?);
        }
        insert.unique_program_id = r.read_bits(16)? as u16;
        insert.avail_num = r.read_bits(8)? as u8;
        insert.avails_expected = r.read_bits(8)? as u8;
    }
    Ok(insert)
}

/// A parsed `time_signal()` command: a splice point carried independently of `splice_insert`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeSignal {
    /// The signaled splice point.
    pub splice_time: SpliceTime,
}

fn parse_time_signal(r: &mut BitReader) -> Result<TimeSignal> {
    Ok(TimeSignal {
        splice_time: parse_splice_time(r)?,
    })
}

/// A parsed `segmentation_descriptor()` splice descriptor (tag 2).
#[derive(Debug, Clone, Default)]
pub struct SegmentationDescriptor {
    /// Identifies this segmentation event; paired with a later cancellation of the same id.
    pub segmentation_event_id: u32,
    /// Whether a previously signaled event with this id is being cancelled.
    pub segmentation_event_cancel_indicator: bool,
    /// Whether the segmentation point applies to the whole program rather than per-component.
    pub program_segmentation_flag: bool,
    /// Whether `segmentation_duration` is present.
    pub segmentation_duration_flag: bool,
    /// Segmentation duration in 90kHz units, or -1 when not present.
    pub segmentation_duration: i64,
    /// Segmentation type, e.g. program/chapter/provider-ad start or end.
    pub segmentation_type_id: u8,
    /// This segment's index among `segments_expected`.
    pub segment_num: u8,
    /// Total number of segments expected for this event.
    pub segments_expected: u8,
}

fn parse_segmentation_descriptor(r: &mut BitReader) -> Result<SegmentationDescriptor> {
    let mut seg = SegmentationDescriptor {
        segmentation_event_id: r.read_bits(32)?,
        segmentation_event_cancel_indicator: r.read_flag()?,
        ..Default::default()
    };
    r.skip_bits(7)?;
    if !seg.segmentation_event_cancel_indicator {
        seg.program_segmentation_flag = r.read_flag()?;
        seg.segmentation_duration_flag = r.read_flag()?;
        let delivery_not_restricted_flag = r.read_flag()?;
        if !delivery_not_restricted_flag {
            r.skip_bits(5)?;
        } else {
            r.skip_bits(5)?;
        }
        if !seg.program_segmentation_flag {
            let component_count = r.read_bits(8)?;
            for _ in 0..component_count {
                r.skip_bits(8)?; // component_tag
                r.skip_bits(7)?;
                r.skip_bits(33)?; // pts_offset
            }
        }
        if seg.segmentation_duration_flag {
            r.skip_bits(7)?;
            seg.segmentation_duration = r.read_bits64(33)? as i64;
        } else {
            seg.segmentation_duration = -1;
        }
        let upid_type = r.read_bits(8)?;
        let _ = upid_type;
        let upid_length = r.read_bits(8)? as usize;
        r.skip_bytes(upid_length)?;
        seg.segmentation_type_id = r.read_bits(8)? as u8;
        seg.segment_num = r.read_bits(8)? as u8;
        seg.segments_expected = r.read_bits(8)? as u8;
    } else {
        seg.segmentation_duration = -1;
    }
    Ok(seg)
}

/// One entry of a `splice_info_section`'s descriptor loop.
#[derive(Debug, Clone, Default)]
pub struct SpliceDescriptor {
    /// Descriptor tag; `2` identifies a `segmentation_descriptor()`.
    pub tag: u8,
    /// `identifier` field, expected to be the `"CUEI"` ASCII value.
    pub identifier: u32,
    /// Decoded payload, when `tag` is a `segmentation_descriptor()`.
    pub segmentation: Option<SegmentationDescriptor>,
}

/// A fully parsed `splice_info_section()`.
#[derive(Debug, Clone, Default)]
pub struct SpliceInfoSection {
    /// Section table id; `0xFC` for SCTE-35.
    pub table_id: u8,
    /// PTS adjustment added to every PTS value carried in this section.
    pub pts_adjustment: i64,
    /// Splice command type; `5` is `splice_insert`, `6` is `time_signal`.
    pub splice_command_type: u8,
    /// Decoded command, when `splice_command_type` is `5`.
    pub splice_insert: Option<SpliceInsert>,
    /// Decoded command, when `splice_command_type` is `6`.
    pub time_signal: Option<TimeSignal>,
    /// The section's descriptor loop.
    pub descriptors: Vec<SpliceDescriptor>,
}

impl SpliceInfoSection {
    /// `"splice_insert"`, `"time_signal"`, or `"private"` depending on `splice_command_type`.
    pub fn splice_type_name(&self) -> &'static str {
        match self.splice_command_type {
            5 => "splice_insert",
            6 => "time_signal",
            _ => "private",
        }
    }

    /// `(pts_time, pts_adjustment)`, with `pts_time` -1 when not present.
    pub fn splice_time_and_adjustment(&self) -> (i64, i64) {
        let pts_time = match self.splice_command_type {
            5 => self
                .splice_insert
                .as_ref()
                .and_then(|i| i.splice_time)
                .filter(|t| t.time_specified)
                .map(|t| t.pts_time)
                .unwrap_or(-1),
            6 => self
                .time_signal
                .as_ref()
                .filter(|s| s.splice_time.time_specified)
                .map(|s| s.splice_time.pts_time)
                .unwrap_or(-1),
            _ => -1,
        };
        (pts_time, self.pts_adjustment)
    }

    fn segmentation_descriptor(&self) -> Option<&SegmentationDescriptor> {
        self.descriptors.iter().find_map(|d| d.segmentation.as_ref())
    }

    /// Break/segment duration in 90kHz units, or -1 when not present.
    pub fn duration(&self) -> i64 {
        match self.splice_command_type {
            5 => self
                .splice_insert
                .as_ref()
                .and_then(|i| i.break_duration)
                .map(|d| d.duration)
                .unwrap_or(-1),
            6 => self.segmentation_descriptor().map(|s| s.segmentation_duration).unwrap_or(-1),
            _ => -1,
        }
    }

    /// `out_of_network_indicator` for `splice_insert`, `segmentation_type_id` for `time_signal`.
    pub fn out_or_seg_type(&self) -> i64 {
        match self.splice_command_type {
            5 => self
                .splice_insert
                .as_ref()
                .map(|i| i.out_of_network_indicator as i64)
                .unwrap_or(-1),
            6 => self
                .segmentation_descriptor()
                .map(|s| s.segmentation_type_id as i64)
                .unwrap_or(-1),
            _ => -1,
        }
    }
}

/// Parses a complete SCTE-35 `splice_info_section`, including the leading `pointer_field` present
/// on the section's first TS-packet payload.
pub fn parse_splice_info_section(data: &[u8]) -> Result<SpliceInfoSection> {
    let mut r = BitReader::new(data);
    let pointer = r.read_bits(8)? as usize;
    r.skip_bytes(pointer)?;

    let mut section = SpliceInfoSection {
        table_id: r.read_bits(8)? as u8,
        ..Default::default()
    };
    r.skip_bits(2)?; // section_syntax_indicator, private_indicator
    r.skip_bits(2)?; // reserved
    let _section_length = r.read_bits(12)?;
    let _protocol_version = r.read_bits(8)?;
    r.skip_bits(1)?; // encrypted_packet
    r.skip_bits(6)?; // encryption_algorithm
    section.pts_adjustment = r.read_bits64(33)? as i64;
    let _cw_index = r.read_bits(8)?;
    let _tier = r.read_bits(12)?;
    let splice_command_length = r.read_bits(12)? as usize;
    section.splice_command_type = r.read_bits(8)? as u8;

    match section.splice_command_type {
        5 => section.splice_insert = Some(parse_splice_insert(&mut r)?),
        6 => section.time_signal = Some(parse_time_signal(&mut r)?),
        _ => {
            if splice_command_length != 0xFFF {
                r.skip_bytes(splice_command_length)?;
            }
        }
    }

    let mut descriptor_loop_length = r.read_bits(16)? as i64;
    while descriptor_loop_length > 0 {
        let tag = r.read_bits(8)? as u8;
        let len = r.read_bits(8)? as usize;
        let identifier = r.read_bits(32)?;
        let segmentation = if tag == 2 {
            Some(parse_segmentation_descriptor(&mut r)?)
        } else {
            if len > 4 {
                r.skip_bytes(len - 4)?;
            }
            None
        };
        section.descriptors.push(SpliceDescriptor {
            tag,
            identifier,
            segmentation,
        });
        descriptor_loop_length -= len as i64 + 2;
    }

    Ok(section)
}

/// One finalized SCTE-35 section, paired with the packet ordinal and PCR context it was opened
/// under. Exposed so [`crate::report::Reporter`] implementations can format it without
/// depending on `Scte35Record`'s private accumulation state.
pub struct Scte35Row {
    /// Packet ordinal the section's first TS packet started at.
    pub pos: u64,
    /// Governing PCR clock's composite value at the time this section was opened.
    pub pcr_time: i64,
    /// The decoded section.
    pub section: SpliceInfoSection,
}

/// SCTE-35 record state machine (section 4.9), driven directly by raw section bytes rather than
/// PES reassembly.
#[derive(Default)]
pub struct Scte35Record {
    base: RecordBase,
    cur_pos: u64,
    cur_pcr_time: i64,
    cur_data: Option<Vec<u8>>,
    sections: Vec<Scte35Row>,
}

impl Scte35Record {
    /// Builds a fresh, un-clocked SCTE-35 record owning `pid`.
    pub fn new(pid: u16) -> Self {
        Self {
            base: RecordBase::new(pid),
            ..Default::default()
        }
    }

    fn finish_section(&mut self) {
        if let Some(data) = self.cur_data.take() {
            match parse_splice_info_section(&data) {
                Ok(section) => self.sections.push(Scte35Row {
                    pos: self.cur_pos,
                    pcr_time: self.cur_pcr_time,
                    section,
                }),
                Err(e) => log::warn!("SCTE-35 section parse error at pos {}: {}", self.cur_pos, e),
            }
        }
    }
}

impl RecordObject for Scte35Record {
    fn process(&mut self, packet: &TsPacket) {
        if packet.pusi() {
            self.finish_section();
            self.cur_pos = packet.pos;
            self.cur_pcr_time = self.base.pcr_time;
            self.cur_data = Some(packet.payload.to_vec());
        } else if let Some(data) = self.cur_data.as_mut() {
            data.extend_from_slice(packet.payload);
        }
    }

    fn notify_time(&mut self, pcr: i64, pos: u64) {
        self.base.notify_time(pcr, pos);
    }

    fn flush(&mut self) {
        self.finish_section();
    }

    fn report(&self, reporter: &mut dyn Reporter) -> io::Result<()> {
        reporter.report_scte35(self.base.pid, &self.sections)
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splice_type_name_maps_command_type() {
        let section = SpliceInfoSection {
            splice_command_type: 5,
            ..Default::default()
        };
        assert_eq!(section.splice_type_name(), "splice_insert");
        let section2 = SpliceInfoSection {
            splice_command_type: 6,
            ..Default::default()
        };
        assert_eq!(section2.splice_type_name(), "time_signal");
    }

    #[test]
    fn cancelled_splice_insert_reports_sentinels() {
        let section = SpliceInfoSection {
            splice_command_type: 5,
            pts_adjustment: 0,
            splice_insert: Some(SpliceInsert {
                splice_event_cancel_indicator: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(section.splice_time_and_adjustment(), (-1, 0));
        assert_eq!(section.duration(), -1);
        assert_eq!(section.out_or_seg_type(), -1);
    }

    #[test]
    fn parses_minimal_time_signal_section() {
        // time_signal with time_specified_flag=0 (no pts_time present) and an empty descriptor
        // loop.
        let bytes = [
            0x00, 0xFC, 0x30, 0x11, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01,
            0x06, 0x00, 0x00, 0x00,
        ];
        let section = parse_splice_info_section(&bytes).unwrap();
        assert_eq!(section.splice_command_type, 6);
        assert_eq!(section.splice_type_name(), "time_signal");
        let (pts_time, _) = section.splice_time_and_adjustment();
        assert_eq!(pts_time, -1);
    }
}
