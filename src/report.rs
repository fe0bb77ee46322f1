//! Reporting collaborator: the `Reporter` trait each record hands its finalized artifacts to at
//! end-of-stream, plus the bundled CSV/JSON implementation used by `demos/dump.rs` and this
//! crate's own tests.
//!
//! Reporting is explicitly pluggable (SPEC_FULL.md §4.11/§6): the core only ever calls through
//! `&mut dyn Reporter`, so a consumer can swap in a database sink or an in-memory collector
//! without touching any record state machine. `CsvJsonReporter` is the one implementation this
//! crate ships, reproducing the reference's CSV/JSON column layouts.

use crate::adaptation_private::AdaptFieldPrivData;
use crate::catalog::Catalog;
use crate::pcr::PcrTracker;
use crate::record::scte35::Scte35Row;
use crate::record::{IFrameEntry, PesUnit};
use serde::Serialize;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

/// Sink for every artifact a record or the engine produces at end-of-stream.
///
/// One call per PID per artifact kind; implementations decide how (or whether) to persist each
/// one. `CsvJsonReporter` opens one file per call, matching the "scoped acquisition with
/// guaranteed release" redesign direction in SPEC_FULL.md §9: each `File` is realized on first
/// write and dropped as soon as that write completes, rather than held open for the run's
/// duration.
pub trait Reporter {
    /// `Pos, Size, PCR, PcrPos, PTS, DTS, (DTS-PCR)` rows for `pid`'s reassembled PES units.
    fn report_pes(&mut self, pid: u16, units: &[PesUnit]) -> io::Result<()>;
    /// Comma-joined NAL type names per PES unit, for H.264/H.265 PIDs.
    fn report_nals(&mut self, pid: u16, nals: &[Vec<&'static str>]) -> io::Result<()>;
    /// `Pos, PTS, Key` rows for `pid`'s detected I-frames.
    fn report_iframes(&mut self, pid: u16, iframes: &[IFrameEntry]) -> io::Result<()>;
    /// One JSON object per line, pairing a packet `Pos` with a decoded private-data TLV.
    fn report_priv_data(&mut self, pid: u16, entries: &[(u64, AdaptFieldPrivData)]) -> io::Result<()>;
    /// `pos, pcr, type, pts_time, pts_adjust, duration, out_or_seg_type` rows for a SCTE-35 PID.
    fn report_scte35(&mut self, pid: u16, rows: &[Scte35Row]) -> io::Result<()>;
    /// `Pos, Tag` rows for recognized MPEG-2 Video user-data (ATSC captions/bar-data, AFD).
    fn report_user_data(&mut self, pid: u16, entries: &[(u64, &'static str)]) -> io::Result<()>;
    /// `pos, pcr, diff` rows (with the `ErrInterval` token on over-threshold intervals) for one
    /// PCR PID's sample history.
    fn report_pcr(&mut self, pcr_pid: u16, tracker: &PcrTracker) -> io::Result<()>;
    /// The final program/stream catalog, once per run.
    fn report_catalog(&mut self, catalog: &Catalog) -> io::Result<()>;
}

/// Bundled CSV/JSON reporter: writes every artifact under one output root directory, using the
/// reference's own file-naming and column conventions.
pub struct CsvJsonReporter {
    root: PathBuf,
}

impl CsvJsonReporter {
    /// Builds a reporter writing under `root`, which must already exist (the engine creates it
    /// before running pass 2).
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl Reporter for CsvJsonReporter {
    fn report_pes(&mut self, pid: u16, units: &[PesUnit]) -> io::Result<()> {
        let mut w = File::create(self.root.join(format!("{}.csv", pid)))?;
        writeln!(w, "Pos, Size, PCR, PcrPos, PTS, DTS, (DTS-PCR)")?;
        for u in units {
            let pcr_90k = u.pcr_at_pusi / 300;
            let dts = if u.dts == 0 { u.pts } else { u.dts };
            writeln!(
                w,
                "{}, {}, {}, {}, {}, {}, {}",
                u.pos,
                u.size,
                pcr_90k,
                u.pcr_pos_at_pusi,
                u.pts,
                dts,
                dts as i64 - pcr_90k
            )?;
        }
        Ok(())
    }

    fn report_nals(&mut self, pid: u16, nals: &[Vec<&'static str>]) -> io::Result<()> {
        let mut w = File::create(self.root.join(format!("{}-nal.csv", pid)))?;
        writeln!(w, "Pos, Nals")?;
        for (i, unit_nals) in nals.iter().enumerate() {
            writeln!(w, "{}, {}", i, unit_nals.join(","))?;
        }
        Ok(())
    }

    fn report_iframes(&mut self, pid: u16, iframes: &[IFrameEntry]) -> io::Result<()> {
        let mut w = File::create(self.root.join(format!("{}-iframe.csv", pid)))?;
        writeln!(w, "Pos, PTS, Key")?;
        for f in iframes {
            writeln!(w, "{}, {}, {}", f.pos, f.pts, f.key)?;
        }
        Ok(())
    }

    fn report_priv_data(&mut self, pid: u16, entries: &[(u64, AdaptFieldPrivData)]) -> io::Result<()> {
        #[derive(Serialize)]
        struct PrivDataLogLine<'a> {
            pos: u64,
            #[serde(flatten)]
            data: &'a AdaptFieldPrivData,
        }

        let mut w = File::create(self.root.join(format!("{}-tspriv.csv", pid)))?;
        for (pos, data) in entries {
            let line = PrivDataLogLine { pos: *pos, data };
            serde_json::to_writer(&mut w, &line)?;
            writeln!(w)?;
        }
        Ok(())
    }

    fn report_scte35(&mut self, pid: u16, rows: &[Scte35Row]) -> io::Result<()> {
        let mut w = File::create(self.root.join(format!("{}.csv", pid)))?;
        writeln!(w, "pos, pcr, type, pts_time, pts_adjust, duration, out_or_segType")?;
        for rec in rows {
            let (pts_time, pts_adjust) = rec.section.splice_time_and_adjustment();
            writeln!(
                w,
                "{}, {}, {}, {}, {}, {}, {}",
                rec.pos,
                rec.pcr_time / 300,
                rec.section.splice_type_name(),
                pts_time,
                pts_adjust,
                rec.section.duration(),
                rec.section.out_or_seg_type()
            )?;
        }
        Ok(())
    }

    fn report_user_data(&mut self, pid: u16, entries: &[(u64, &'static str)]) -> io::Result<()> {
        let mut w = File::create(self.root.join(format!("{}-userdata.csv", pid)))?;
        writeln!(w, "Pos, Tag")?;
        for (pos, tag) in entries {
            writeln!(w, "{}, {}", pos, tag)?;
        }
        Ok(())
    }

    fn report_pcr(&mut self, pcr_pid: u16, tracker: &PcrTracker) -> io::Result<()> {
        let mut w = File::create(self.root.join(format!("pcr-{}.csv", pcr_pid)))?;
        writeln!(w, "pos, pcr, diff")?;
        for (pos, pcr, diff, over) in tracker.interval_report(pcr_pid) {
            if over {
                writeln!(w, "{}, {}, {}, ErrInterval", pos, pcr, diff)?;
            } else {
                writeln!(w, "{}, {}, {}", pos, pcr, diff)?;
            }
        }
        Ok(())
    }

    fn report_catalog(&mut self, catalog: &Catalog) -> io::Result<()> {
        #[derive(Serialize)]
        struct CatalogStreamJson {
            pid: u16,
            program_number: u16,
            stream_type: u8,
            stream_type_name: &'static str,
        }
        #[derive(Serialize)]
        struct CatalogJson {
            streams: Vec<CatalogStreamJson>,
        }

        let mut streams: Vec<_> = catalog
            .streams
            .iter()
            .map(|(pid, entry)| CatalogStreamJson {
                pid: *pid,
                program_number: entry.program_number,
                stream_type: entry.stream_type,
                stream_type_name: entry.stream_type_name(),
            })
            .collect();
        streams.sort_by_key(|s| s.pid);

        let json = CatalogJson { streams };
        let mut jw = File::create(self.root.join("psi.json"))?;
        serde_json::to_writer_pretty(&mut jw, &json)?;
        writeln!(jw)?;

        let mut lw = File::create(self.root.join("psi.log"))?;
        for s in &json.streams {
            writeln!(
                lw,
                "PID {:#06x}: program {} stream_type {:#04x} ({})",
                s.pid, s.program_number, s.stream_type, s.stream_type_name
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn iframe_csv_has_expected_header() {
        let dir = std::env::temp_dir().join(format!("mpegts-analyzer-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let mut reporter = CsvJsonReporter::new(dir.clone());
        reporter
            .report_iframes(
                257,
                &[IFrameEntry {
                    pos: 1,
                    pts: 2,
                    key: true,
                }],
            )
            .unwrap();
        let mut contents = String::new();
        File::open(dir.join("257-iframe.csv"))
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert!(contents.starts_with("Pos, PTS, Key\n"));
        assert!(contents.contains("1, 2, true"));
    }
}
