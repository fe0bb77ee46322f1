//! MPEG-2 Video record: PES reassembly plus GOP/picture/user-data header scanning (section 4.9).
//!
//! The reference's own `mp2v` record only accounts for PES size/timing; the GOP-closed-bit and
//! I-picture detection implemented here is this system's own addition, built directly from the
//! ISO/IEC 13818-2 header layouts since there is no prior-art record to generalize from.

use super::pes_unit::{PesAccumulator, PesUnit};
use super::{IFrameEntry, RecordBase, RecordObject};
use crate::adaptation_private::{parse_adapt_field_priv_data, AdaptFieldPrivData};
use crate::bit_reader::BitReader;
use crate::packet::TsPacket;
use crate::report::Reporter;
use std::io;

const GOP_START_CODE: u8 = 0xB8;
const PICTURE_START_CODE: u8 = 0x00;
const USER_DATA_START_CODE: u8 = 0xB2;

/// One decoded picture header: whether it is an I-picture, and whether the nearest preceding GOP
/// in this unit (or a prior unit) was closed.
#[derive(Debug, Clone, Copy, Default)]
struct PictureHeader {
    temporal_reference: u16,
    picture_coding_type: u8,
}

impl PictureHeader {
    fn is_i_picture(&self) -> bool {
        self.picture_coding_type == 1
    }
}

fn parse_gop_closed(body: &[u8]) -> Option<bool> {
    let mut r = BitReader::new(body);
    r.skip_bits(25).ok()?;
    r.read_flag().ok()
}

fn parse_picture_header(body: &[u8]) -> Option<PictureHeader> {
    let mut r = BitReader::new(body);
    Some(PictureHeader {
        temporal_reference: r.read_bits(10).ok()? as u16,
        picture_coding_type: r.read_bits(3).ok()? as u8,
    })
}

/// User-data tags this system recognizes, mirroring the ATSC caption/bar-data ("GA94") and AFD
/// ("DTG1") conventions.
fn user_data_tag_name(body: &[u8]) -> Option<&'static str> {
    if body.len() < 4 {
        return None;
    }
    match &body[0..4] {
        b"GA94" => Some("ga94_captions"),
        b"DTG1" => Some("dtg1_afd"),
        _ => None,
    }
}

/// Scans `data` for 4-byte MPEG-2 Video start codes and returns, in order, whether the nearest
/// preceding GOP was closed (carried forward across pictures until the next GOP) and every
/// I-picture position found, plus any recognized user-data tags.
fn scan_mpeg2_video(data: &[u8]) -> (Vec<bool>, Vec<&'static str>) {
    let mut i_picture_flags = Vec::new();
    let mut user_data_tags = Vec::new();
    let mut closed_gop = false;

    let mut pos = 0usize;
    while pos + 4 <= data.len() {
        if data[pos..pos + 3] == [0, 0, 1] {
            let code = data[pos + 3];
            let body = &data[pos + 4..];
            match code {
                GOP_START_CODE => {
                    if let Some(closed) = parse_gop_closed(body) {
                        closed_gop = closed;
                    }
                }
                PICTURE_START_CODE => {
                    if let Some(hdr) = parse_picture_header(body) {
                        if hdr.is_i_picture() {
                            i_picture_flags.push(closed_gop);
                        }
                    }
                }
                USER_DATA_START_CODE => {
                    if let Some(tag) = user_data_tag_name(body) {
                        user_data_tags.push(tag);
                    }
                }
                _ => {}
            }
            pos += 4;
        } else {
            pos += 1;
        }
    }
    (i_picture_flags, user_data_tags)
}

/// MPEG-2 Video record state machine (section 4.9).
#[derive(Default)]
pub struct Mpeg2VideoRecord {
    base: RecordBase,
    accum: PesAccumulator,
    units: Vec<PesUnit>,
    iframes: Vec<IFrameEntry>,
    user_data: Vec<(u64, &'static str)>,
    priv_data: Vec<(u64, AdaptFieldPrivData)>,
}

impl Mpeg2VideoRecord {
    /// Builds a fresh, un-clocked MPEG-2 Video record owning `pid`.
    pub fn new(pid: u16) -> Self {
        Self {
            base: RecordBase::new(pid),
            ..Default::default()
        }
    }

    fn finish_unit(&mut self, unit: PesUnit) {
        let (i_pictures, user_data_tags) = scan_mpeg2_video(&unit.data);
        for closed in i_pictures {
            self.iframes.push(IFrameEntry {
                pos: unit.pos,
                pts: unit.pts,
                key: closed,
            });
        }
        for tag in user_data_tags {
            self.user_data.push((unit.pos, tag));
        }
        self.units.push(unit);
    }
}

impl RecordObject for Mpeg2VideoRecord {
    fn process(&mut self, packet: &TsPacket) {
        if let Some(af) = &packet.adaptation_field {
            if !af.private_data.is_empty() {
                for p in parse_adapt_field_priv_data(&af.private_data) {
                    self.priv_data.push((packet.pos, p));
                }
            }
        }
        if packet.pusi() {
            if let Some(finished) =
                self.accum
                    .start(packet.pos, self.base.pcr_time, self.base.pcr_pos, packet.payload)
            {
                self.finish_unit(finished);
            }
        } else {
            self.accum.append(packet.payload);
        }
    }

    fn notify_time(&mut self, pcr: i64, pos: u64) {
        self.base.notify_time(pcr, pos);
    }

    fn flush(&mut self) {
        if let Some(unit) = self.accum.flush() {
            self.finish_unit(unit);
        }
    }

    fn report(&self, reporter: &mut dyn Reporter) -> io::Result<()> {
        let pid = self.base.pid;
        reporter.report_pes(pid, &self.units)?;
        reporter.report_iframes(pid, &self.iframes)?;
        if !self.user_data.is_empty() {
            reporter.report_user_data(pid, &self.user_data)?;
        }
        if !self.priv_data.is_empty() {
            reporter.report_priv_data(pid, &self.priv_data)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_gop_carries_forward_to_i_picture() {
        let mut data = vec![0x00, 0x00, 0x01, GOP_START_CODE];
        // time_code (25 bits) then closed_gop=1, broken_link=0: 25 ones bits worth of padding is
        // irrelevant to this test, only the closed_gop bit position matters.
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0b0100_0000]);
        data.extend_from_slice(&[0x00, 0x00, 0x01, PICTURE_START_CODE]);
        // temporal_reference (10 bits) = 0, picture_coding_type (3 bits) = 1 (I-picture).
        data.extend_from_slice(&[0x00, 0b0000_1000]);
        let (flags, _) = scan_mpeg2_video(&data);
        assert_eq!(flags, vec![true]);
    }

    #[test]
    fn recognizes_ga94_user_data() {
        let mut data = vec![0x00, 0x00, 0x01, USER_DATA_START_CODE];
        data.extend_from_slice(b"GA94");
        let (_, tags) = scan_mpeg2_video(&data);
        assert_eq!(tags, vec!["ga94_captions"]);
    }
}
