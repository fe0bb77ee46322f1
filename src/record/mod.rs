//! Per-stream-type record state machines (section 4.9) and the polymorphic dispatch used to
//! drive them from the pass-2 engine loop.
//!
//! Every concrete record type consumes one PID's worth of TS packets via [`RecordObject::process`],
//! is kept abreast of the PID's governing PCR clock via [`RecordObject::notify_time`], and at
//! end-of-stream is asked to [`RecordObject::flush`] any partially-accumulated unit before
//! [`RecordObject::report`] hands its finalized artifacts to a [`crate::report::Reporter`].
//! Dispatch across the five concrete types goes through [`enum_dispatch`] rather than a boxed
//! trait object, following the same pattern the reference uses for its own span/builder
//! polymorphism.

mod generic_pes;
mod h264;
mod h265;
mod mpeg2_video;
mod pes_unit;
pub mod scte35;

pub use generic_pes::GenericPesRecord;
pub use h264::H264Record;
pub use h265::H265Record;
pub use mpeg2_video::Mpeg2VideoRecord;
pub use pes_unit::PesUnit;
pub use scte35::Scte35Record;

use crate::catalog::RecordKind;
use crate::packet::TsPacket;
use crate::report::Reporter;
use enum_dispatch::enum_dispatch;
use std::io;

/// Common per-PID bookkeeping shared by every record type: the PID it owns, and the latest PCR
/// time/position notified by the engine for the clock that governs it.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecordBase {
    /// The PID this record owns.
    pub pid: u16,
    /// Latest PCR composite value notified for this PID's governing clock.
    pub pcr_time: i64,
    /// Packet ordinal the latest notified PCR sample arrived on.
    pub pcr_pos: u64,
}

impl RecordBase {
    /// Builds a fresh, un-clocked base for `pid`.
    pub fn new(pid: u16) -> Self {
        Self {
            pid,
            pcr_time: 0,
            pcr_pos: 0,
        }
    }

    /// Records the latest PCR composite value and the packet position it arrived at.
    pub fn notify_time(&mut self, pcr: i64, pos: u64) {
        self.pcr_time = pcr;
        self.pcr_pos = pos;
    }
}

/// One logged I-frame (key frame) occurrence, shared by every video record type's `-iframe.csv`
/// report.
#[derive(Debug, Clone, Copy, Default)]
pub struct IFrameEntry {
    /// Packet ordinal the containing PES unit started at.
    pub pos: u64,
    /// Presentation timestamp, in 90kHz units.
    pub pts: u64,
    /// Whether this occurrence is a true IDR/closed-GOP key frame.
    pub key: bool,
}

/// Behavior every concrete record state machine implements, dispatched polymorphically via
/// [`Record`].
#[enum_dispatch]
pub trait RecordObject {
    /// Feeds one TS packet belonging to this record's PID.
    fn process(&mut self, packet: &TsPacket);
    /// Informs the record of its governing PCR clock's latest known time and packet position,
    /// called once per packet by the engine before `process`.
    fn notify_time(&mut self, pcr: i64, pos: u64);
    /// Finalizes any partially-accumulated unit at end-of-stream.
    fn flush(&mut self);
    /// Hands this record's finalized artifacts to `reporter`.
    fn report(&self, reporter: &mut dyn Reporter) -> io::Result<()>;
}

/// Polymorphic wrapper over every concrete record type, dispatched via `enum_dispatch` to avoid a
/// boxed trait object per PID.
#[enum_dispatch(RecordObject)]
pub enum Record {
    /// H.264/AVC video.
    H264(H264Record),
    /// H.265/HEVC video.
    H265(H265Record),
    /// MPEG-2 video.
    Mpeg2Video(Mpeg2VideoRecord),
    /// Any stream type with no codec-specific handling of its own.
    GenericPes(GenericPesRecord),
    /// SCTE-35 splice information.
    Scte35(Scte35Record),
}

impl Record {
    /// Instantiates the record state machine appropriate for `kind`, owning `pid`.
    pub fn new(kind: RecordKind, pid: u16) -> Self {
        match kind {
            RecordKind::H264 => Record::H264(H264Record::new(pid)),
            RecordKind::H265 => Record::H265(H265Record::new(pid)),
            RecordKind::Mpeg2Video => Record::Mpeg2Video(Mpeg2VideoRecord::new(pid)),
            RecordKind::GenericPes => Record::GenericPes(GenericPesRecord::new(pid)),
            RecordKind::Scte35 => Record::Scte35(Scte35Record::new(pid)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructs_expected_variant_for_each_kind() {
        assert!(matches!(Record::new(RecordKind::H264, 1), Record::H264(_)));
        assert!(matches!(Record::new(RecordKind::H265, 1), Record::H265(_)));
        assert!(matches!(
            Record::new(RecordKind::Mpeg2Video, 1),
            Record::Mpeg2Video(_)
        ));
        assert!(matches!(
            Record::new(RecordKind::GenericPes, 1),
            Record::GenericPes(_)
        ));
        assert!(matches!(Record::new(RecordKind::Scte35, 1), Record::Scte35(_)));
    }
}
