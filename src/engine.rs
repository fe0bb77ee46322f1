//! Two-pass driver: PSI discovery followed by PCR-tracked record dispatch, plus the default
//! `PacketSource` implementations used to feed it.

use crate::catalog::Catalog;
use crate::packet::{parse_packet, TsPacket};
use crate::pcr::PcrTracker;
use crate::psi::PsiDiscovery;
use crate::record::Record;
use crate::record::RecordObject;
use crate::report;
use log::warn;
use std::collections::HashMap;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Pulls 188-byte TS packet frames in order. The engine assigns each frame's ordinal `Pos`; a
/// source only needs to yield bytes and signal end-of-stream.
pub trait PacketSource {
    /// Returns the next 188-byte frame, or `Ok(None)` at end-of-stream.
    fn next_packet(&mut self) -> io::Result<Option<[u8; 188]>>;
}

/// Wraps an in-memory buffer of concatenated 188-byte packets, primarily for tests.
pub struct SliceSource<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceSource<'a> {
    /// Wraps `data`, which must be a multiple of 188 bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl<'a> PacketSource for SliceSource<'a> {
    fn next_packet(&mut self) -> io::Result<Option<[u8; 188]>> {
        if self.pos + 188 > self.data.len() {
            return Ok(None);
        }
        let mut buf = [0u8; 188];
        buf.copy_from_slice(&self.data[self.pos..self.pos + 188]);
        self.pos += 188;
        Ok(Some(buf))
    }
}

/// Bytes of leading framing to strip from a UDP datagram carrying 7 back-to-back TS packets
/// (1316 bytes): 44 for HRTP (RTP header + extension), 0 for plain 7x188.
fn hrtp_strip_len(datagram_len: usize) -> usize {
    datagram_len.saturating_sub(7 * 188)
}

/// Wraps any [`Read`], stripping HRTP/UDP framing before each 7x188-byte group and yielding the
/// 7 TS packets it contains, mirroring the reference's `tsextract`/`tspcap` handling of
/// 1316-byte (plain) and 1360-byte (44-byte HRTP header + 1316) datagrams.
///
/// Packets not already aligned to the stream's actual packet size (detected by locating the
/// first `0x47` sync byte) are logged and skipped rather than aborting the read.
pub struct FramedSource<R> {
    reader: R,
    datagram_len: usize,
    buf: Vec<u8>,
    queued: std::collections::VecDeque<[u8; 188]>,
}

impl<R: Read> FramedSource<R> {
    /// Wraps `reader`, reading `datagram_len`-byte UDP datagrams (1316 plain or 1360 HRTP).
    pub fn new(reader: R, datagram_len: usize) -> Self {
        Self {
            reader,
            datagram_len,
            buf: vec![0u8; datagram_len],
            queued: std::collections::VecDeque::new(),
        }
    }

    fn fill_queue(&mut self) -> io::Result<bool> {
        match self.reader.read_exact(&mut self.buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(false),
            Err(e) => return Err(e),
        }
        let strip = hrtp_strip_len(self.datagram_len);
        let ts_payload = &self.buf[strip..];
        for chunk in ts_payload.chunks(188) {
            if chunk.len() != 188 || chunk[0] != 0x47 {
                warn!("Skipping misaligned 188-byte window in framed datagram");
                continue;
            }
            let mut packet = [0u8; 188];
            packet.copy_from_slice(chunk);
            self.queued.push_back(packet);
        }
        Ok(true)
    }
}

impl<R: Read> PacketSource for FramedSource<R> {
    fn next_packet(&mut self) -> io::Result<Option<[u8; 188]>> {
        loop {
            if let Some(packet) = self.queued.pop_front() {
                return Ok(Some(packet));
            }
            if !self.fill_queue()? {
                return Ok(None);
            }
        }
    }
}

/// Run-time knobs for [`Engine`]. The core is otherwise parameter-free: everything else is
/// declared by the stream itself (stream types, PCR PIDs).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Verify PSI/SCTE-35 section CRC32s. Off by default.
    pub verify_crc: bool,
    /// Directory the CSV/JSON reports are written under.
    pub output_root: PathBuf,
}

impl EngineConfig {
    /// Builds a config writing reports to `output_root`, with CRC verification off.
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            verify_crc: false,
            output_root: output_root.into(),
        }
    }
}

/// Orchestrates pass 1 (PSI discovery) and pass 2 (PCR tracking + record dispatch), owning the
/// catalog and PCR tracker built along the way.
pub struct Engine {
    config: EngineConfig,
    catalog: Catalog,
    pcr_tracker: PcrTracker,
    records: HashMap<u16, Record>,
}

impl Engine {
    /// Runs pass 1 (PSI discovery) to completion against `source`, building the program/stream
    /// catalog and instantiating one record per discovered elementary stream PID.
    pub fn discover(config: EngineConfig, source: &mut dyn PacketSource) -> io::Result<Self> {
        let mut discovery = PsiDiscovery::new(config.verify_crc);
        let mut pos = 0u64;
        loop {
            let packet = match source.next_packet()? {
                Some(p) => p,
                None => {
                    discovery.finish();
                    break;
                }
            };
            let parsed = match parse_packet(pos, &packet) {
                Ok(p) => p,
                Err(e) => {
                    warn!("Pass 1: skipping packet at pos {}: {}", pos, e);
                    pos += 1;
                    continue;
                }
            };
            pos += 1;
            match discovery.feed(parsed.pid(), parsed.pusi(), parsed.payload) {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => warn!("Pass 1: PSI parse error at pos {}: {}", parsed.pos, e),
            }
        }

        let pat = discovery.pat.unwrap_or_default();
        let catalog = Catalog::build(&pat, &discovery.pmts);
        let mut records = HashMap::new();
        for (pid, entry) in &catalog.streams {
            records.insert(*pid, Record::new(entry.kind, *pid));
        }

        Ok(Self {
            config,
            catalog,
            pcr_tracker: PcrTracker::new(),
            records,
        })
    }

    /// Runs pass 2 against `source`, tracking PCR samples and dispatching every packet on a
    /// known PID to its record, then flushes and reports every record plus the catalog.
    pub fn analyze(&mut self, source: &mut dyn PacketSource) -> io::Result<()> {
        std::fs::create_dir_all(&self.config.output_root)?;
        let mut pos = 0u64;
        while let Some(packet) = source.next_packet()? {
            let parsed = match parse_packet(pos, &packet) {
                Ok(p) => p,
                Err(e) => {
                    warn!("Pass 2: skipping packet at pos {}: {}", pos, e);
                    pos += 1;
                    continue;
                }
            };
            pos += 1;
            self.dispatch(&parsed);
        }

        for record in self.records.values_mut() {
            record.flush();
        }
        self.report()
    }

    fn dispatch(&mut self, packet: &TsPacket) {
        let pid = packet.pid();
        if let Some(pcr) = packet.pcr() {
            self.pcr_tracker.record(pid, packet.pos, pcr.composite() as i64);
            for consumer in self.catalog.consumers_of(pid).to_vec() {
                if let Some(record) = self.records.get_mut(&consumer) {
                    record.notify_time(pcr.composite() as i64, packet.pos);
                }
            }
        }
        if let Some(record) = self.records.get_mut(&pid) {
            record.process(packet);
        }
    }

    fn report(&self) -> io::Result<()> {
        let mut reporter = report::CsvJsonReporter::new(self.config.output_root.clone());
        for record in self.records.values() {
            record.report(&mut reporter)?;
        }
        for pcr_pid in self.catalog.pcr_pids() {
            reporter.report_pcr(*pcr_pid, &self.pcr_tracker)?;
        }
        reporter.report_catalog(&self.catalog)
    }

    /// The discovered program/stream catalog.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }
}

/// Convenience entry point: runs both passes against the file at `path`, using `source_for` to
/// rebuild a fresh [`PacketSource`] for each pass (pass 2 replays the same bytes as pass 1).
pub fn analyze_file(path: &Path, output_root: &Path, verify_crc: bool) -> io::Result<Engine> {
    let data = std::fs::read(path)?;
    let mut config = EngineConfig::new(output_root);
    config.verify_crc = verify_crc;
    let mut pass1_source = SliceSource::new(&data);
    let mut engine = Engine::discover(config, &mut pass1_source)?;
    let mut pass2_source = SliceSource::new(&data);
    engine.analyze(&mut pass2_source)?;
    Ok(engine)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hrtp_framing_strips_44_byte_header() {
        assert_eq!(hrtp_strip_len(1360), 44);
        assert_eq!(hrtp_strip_len(1316), 0);
    }

    #[test]
    fn slice_source_yields_whole_packets_only() {
        let data = vec![0x47u8; 188 * 2 + 10];
        let mut source = SliceSource::new(&data);
        assert!(source.next_packet().unwrap().is_some());
        assert!(source.next_packet().unwrap().is_some());
        assert!(source.next_packet().unwrap().is_none());
    }
}
