//! Program/stream catalog built from pass-1 PSI discovery, and the record-type mapping used to
//! instantiate pass-2 record state machines.

use crate::psi::{stream_type_name, Pat, Pmt};
use std::collections::HashMap;

/// Which [`crate::record`] state machine a stream PID should be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// H.264/AVC video (`stream_type` 0x1B).
    H264,
    /// H.265/HEVC video (`stream_type` 0x24).
    H265,
    /// MPEG-2 video (`stream_type` 0x01/0x02).
    Mpeg2Video,
    /// SCTE-35 splice information (`stream_type` 0x86).
    Scte35,
    /// Any other stream type, reported without codec-specific parsing.
    GenericPes,
}

/// Maps an MPEG-2 `stream_type` byte to the record kind that should own that PID, per the
/// reference's `CreateRecord` switch (extended with HEVC, which its source generation predates).
pub fn record_kind_for_stream_type(stream_type: u8) -> RecordKind {
    match stream_type {
        0x1B => RecordKind::H264,
        0x24 => RecordKind::H265,
        0x01 | 0x02 => RecordKind::Mpeg2Video,
        0x86 => RecordKind::Scte35,
        _ => RecordKind::GenericPes,
    }
}

/// One entry in the catalog: a stream PID's type and the record kind it routes to.
#[derive(Debug, Clone, Copy)]
pub struct StreamEntry {
    /// The program this stream belongs to.
    pub program_number: u16,
    /// Raw PMT `stream_type` byte.
    pub stream_type: u8,
    /// Record state machine this stream's PID routes to.
    pub kind: RecordKind,
}

impl StreamEntry {
    /// Human-readable name for this entry's `stream_type` byte.
    pub fn stream_type_name(&self) -> &'static str {
        stream_type_name(self.stream_type)
    }
}

/// Finalized program/stream catalog, built once pass-1 PSI discovery completes.
///
/// Mirrors `PsiParser.ParseDone` in the reference implementation: every elementary stream across
/// every parsed PMT is indexed by PID, and every PMT's `pcr_pid` accumulates the set of stream
/// PIDs that share that clock (a PCR PID that no PMT uses as its own elementary PID but that is
/// still referenced is tracked as an "extra" clock with no direct stream entry).
#[derive(Debug, Default)]
pub struct Catalog {
    /// Every elementary stream PID across every parsed PMT.
    pub streams: HashMap<u16, StreamEntry>,
    /// Stream PIDs sharing each PCR PID's clock.
    pub pcr_consumers: HashMap<u16, Vec<u16>>,
}

impl Catalog {
    /// Builds a catalog from a parsed PAT and the PMTs it names.
    pub fn build(pat: &Pat, pmts: &HashMap<u16, Pmt>) -> Self {
        let mut catalog = Catalog::default();
        for (program_number, pmt_pid) in &pat.programs {
            let pmt = match pmts.get(pmt_pid) {
                Some(pmt) => pmt,
                None => continue,
            };
            let consumers = catalog.pcr_consumers.entry(pmt.pcr_pid).or_insert_with(Vec::new);
            for es in &pmt.streams {
                let kind = record_kind_for_stream_type(es.stream_type());
                catalog.streams.insert(
                    es.pid(),
                    StreamEntry {
                        program_number: *program_number,
                        stream_type: es.stream_type(),
                        kind,
                    },
                );
                consumers.push(es.pid());
            }
        }
        catalog
    }

    /// Stream PIDs bound to a record that are driven by `pcr_pid`'s clock.
    pub fn consumers_of(&self, pcr_pid: u16) -> &[u16] {
        self.pcr_consumers
            .get(&pcr_pid)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every PCR PID referenced by any PMT, whether or not it is itself an elementary stream.
    pub fn pcr_pids(&self) -> impl Iterator<Item = &u16> {
        self.pcr_consumers.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psi::{ElementaryStreamInfo, ElementaryStreamInfoHeader};

    #[test]
    fn builds_stream_map_and_pcr_consumers() {
        let pat = Pat {
            transport_stream_id: 1,
            version: 0,
            programs: vec![(1, 256)],
            nit_pid: 0x10,
        };
        let es_header = ElementaryStreamInfoHeader::new()
            .with_stream_type(0x1B)
            .with_elementary_pid(257)
            .with_es_info_length(0);
        let pmt = Pmt {
            program_number: 1,
            version: 0,
            pcr_pid: 257,
            program_descriptors: vec![],
            streams: vec![ElementaryStreamInfo {
                header: es_header,
                descriptors: vec![],
            }],
        };
        let mut pmts = HashMap::new();
        pmts.insert(256, pmt);

        let catalog = Catalog::build(&pat, &pmts);
        assert_eq!(catalog.streams.get(&257).unwrap().kind, RecordKind::H264);
        assert_eq!(catalog.consumers_of(257), &[257]);
    }
}
