//! Shared PES-unit accumulation state machine used by every elementary-stream record type
//! (H.264, H.265, MPEG-2 Video, generic PES).
//!
//! Mirrors the PUSI-transition logic found in every one of the reference's per-type `Process`
//! methods, generalized with the "straddling PES header" recovery path described in section 4.9:
//! a PUSI packet whose payload is shorter than a full PES header is accumulated into a scratch
//! buffer across subsequent packets until enough bytes are available to parse it.

use crate::pes::{parse_pes_header, stream_id, MIN_PES_HEADER_LEN};
use log::warn;

/// One reassembled PES unit: payload bytes accumulated across every TS packet between one PUSI
/// packet and the next (or end-of-stream flush).
#[derive(Debug, Default, Clone)]
pub struct PesUnit {
    /// Ordinal of the opening PUSI packet.
    pub pos: u64,
    /// Sum of payload bytes across every contributing TS packet.
    pub size: usize,
    /// Latest notified PCR composite value at the time this unit was opened.
    pub pcr_at_pusi: i64,
    /// Latest notified PCR packet ordinal at the time this unit was opened.
    pub pcr_pos_at_pusi: u64,
    /// PES `stream_id` byte.
    pub stream_id: u8,
    /// Presentation timestamp, in 90kHz units, or 0 if the PES header carried none.
    pub pts: u64,
    /// Decode timestamp, in 90kHz units, or 0 if the PES header carried none.
    pub dts: u64,
    /// Accumulated PES payload bytes.
    pub data: Vec<u8>,
}

#[derive(Default)]
pub(crate) struct PesAccumulator {
    current: Option<PesUnit>,
    awaiting_header: bool,
    scratch: Vec<u8>,
}

impl PesAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drives the PUSI-transition half of section 4.9: finalizes and returns whatever unit was
    /// open, then opens a fresh one at `pos`.
    pub fn start(&mut self, pos: u64, pcr_time: i64, pcr_pos: u64, payload: &[u8]) -> Option<PesUnit> {
        let finished = self.current.take();
        self.awaiting_header = false;
        self.scratch.clear();

        let mut unit = PesUnit {
            pos,
            pcr_at_pusi: pcr_time,
            pcr_pos_at_pusi: pcr_pos,
            ..Default::default()
        };

        if payload.len() >= MIN_PES_HEADER_LEN {
            match parse_pes_header(payload) {
                Ok(parsed) => {
                    if parsed.header.stream_id() == stream_id::PADDING_STREAM {
                        // Padding stream: abandon the unit entirely, matching the reference's
                        // drop of stream_id 0xBE.
                        self.current = None;
                        return finished;
                    }
                    unit.stream_id = parsed.header.stream_id();
                    unit.pts = parsed.pts;
                    unit.dts = parsed.dts;
                    let rest = &payload[parsed.header_len..];
                    unit.size = rest.len();
                    unit.data.extend_from_slice(rest);
                }
                Err(_) => {
                    warn!("PES start code error at pos {}", pos);
                    unit.size = payload.len();
                    unit.data.extend_from_slice(payload);
                }
            }
            self.current = Some(unit);
        } else {
            warn!("Short PUSI payload at pos {} (len {}), entering straddling-header recovery", pos, payload.len());
            self.awaiting_header = true;
            self.scratch.extend_from_slice(payload);
            self.current = Some(unit);
        }

        finished
    }

    /// Drives the non-PUSI accumulation half, including completing a straddling-header parse
    /// once enough bytes have arrived.
    pub fn append(&mut self, payload: &[u8]) {
        if self.awaiting_header {
            self.scratch.extend_from_slice(payload);
            if self.scratch.len() >= MIN_PES_HEADER_LEN {
                match parse_pes_header(&self.scratch) {
                    Ok(parsed) => {
                        if let Some(unit) = self.current.as_mut() {
                            unit.stream_id = parsed.header.stream_id();
                            unit.pts = parsed.pts;
                            unit.dts = parsed.dts;
                            let rest = &self.scratch[parsed.header_len..];
                            unit.size += rest.len();
                            unit.data.extend_from_slice(rest);
                        }
                        self.awaiting_header = false;
                        self.scratch.clear();
                    }
                    Err(_) => {
                        warn!("PES start code error in straddling-header recovery");
                    }
                }
            }
            return;
        }
        if let Some(unit) = self.current.as_mut() {
            unit.size += payload.len();
            unit.data.extend_from_slice(payload);
        }
    }

    /// Finalizes and returns whatever unit is open, for the end-of-stream `flush`.
    pub fn flush(&mut self) -> Option<PesUnit> {
        self.current.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straddling_header_recovers_once_enough_bytes_arrive() {
        let mut acc = PesAccumulator::new();
        // Short first packet: only 6 bytes, below MIN_PES_HEADER_LEN.
        assert!(acc.start(0, 0, 0, &[0x00, 0x00, 0x01, 0xE0, 0x00, 0x00]).is_none());
        // Remaining header bytes plus a couple of payload bytes arrive on the next packet.
        acc.append(&[0x80, 0x80, 0x05, 0, 0, 0, 0, 0, 0xAA, 0xBB]);
        let finished = acc.flush().unwrap();
        assert_eq!(finished.data, vec![0xAA, 0xBB]);
    }

    #[test]
    fn padding_stream_abandons_unit() {
        let mut acc = PesAccumulator::new();
        let mut data = vec![0x00, 0x00, 0x01, 0xBE, 0x00, 0x02, 0xAA, 0xBB];
        data.resize(MIN_PES_HEADER_LEN, 0);
        assert!(acc.start(0, 0, 0, &data).is_none());
        assert!(acc.flush().is_none());
    }
}
