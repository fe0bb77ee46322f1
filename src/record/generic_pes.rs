//! Generic PES record: size/timing accounting only, for stream types with no codec-specific
//! parsing of their own (anything not routed to H.264, H.265, MPEG-2 Video, or SCTE-35).

use super::pes_unit::{PesAccumulator, PesUnit};
use super::{RecordBase, RecordObject};
use crate::adaptation_private::{parse_adapt_field_priv_data, AdaptFieldPrivData};
use crate::packet::TsPacket;
use crate::report::Reporter;
use std::io;

/// Generic elementary-stream record (section 4.9): reassembles PES units and records their
/// size/timing, without any codec-specific unit inspection.
#[derive(Default)]
pub struct GenericPesRecord {
    base: RecordBase,
    accum: PesAccumulator,
    units: Vec<PesUnit>,
    priv_data: Vec<(u64, AdaptFieldPrivData)>,
}

impl GenericPesRecord {
    /// Builds a fresh, un-clocked generic PES record owning `pid`.
    pub fn new(pid: u16) -> Self {
        Self {
            base: RecordBase::new(pid),
            ..Default::default()
        }
    }
}

impl RecordObject for GenericPesRecord {
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
                self.units.push(finished);
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
            self.units.push(unit);
        }
    }

    fn report(&self, reporter: &mut dyn Reporter) -> io::Result<()> {
        let pid = self.base.pid;
        reporter.report_pes(pid, &self.units)?;
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
    fn accumulates_units_across_pusi_boundaries() {
        let mut r = GenericPesRecord::new(300);
        let mut pes = vec![0x00, 0x00, 0x01, 0xBD, 0x00, 0x00, 0x80, 0x00, 0x00];
        pes.extend_from_slice(&[0xAA, 0xBB, 0xCC]);
        let buf = packet_with_payload(300, true, &pes);
        let pkt = crate::packet::parse_packet(0, &buf).unwrap();
        r.process(&pkt);
        r.flush();
        assert_eq!(r.units.len(), 1);
        assert_eq!(r.units[0].data, vec![0xAA, 0xBB, 0xCC]);
    }

    fn packet_with_payload(pid: u16, pusi: bool, payload: &[u8]) -> [u8; 188] {
        let mut buf = [0xFFu8; 188];
        buf[0] = 0x47;
        buf[1] = ((pusi as u8) << 6) | ((pid >> 8) as u8 & 0x1F);
        buf[2] = (pid & 0xFF) as u8;
        buf[3] = 0x10;
        buf[4..4 + payload.len()].copy_from_slice(payload);
        buf
    }
}
