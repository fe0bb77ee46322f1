//! Demultiplexing and parsing engine for MPEG-2 Transport Streams.
//!
//! Two passes over a [`PacketSource`](engine::PacketSource) of 188-byte packets: pass 1 discovers
//! the program/stream catalog from PSI (PAT/PMT); pass 2 tracks PCR clocks and dispatches each
//! packet to the [`record`] state machine that owns its PID, reassembling PES units or SCTE-35
//! sections as appropriate for that stream's codec. See [`engine`] for the driver and [`report`]
//! for the CSV/JSON artifacts each record produces.
//!
//! # Usage
//! Simply add this crate as a dependency in your `Cargo.toml`.
//!
//! ```toml
//! [dependencies]
//! mpegts-analyzer = "~0.1.0"
//! ```

#![deny(missing_docs, unsafe_code, warnings)]

use crc::{Crc, Digest, CRC_32_MPEG_2};

mod slice_reader;
pub use slice_reader::SliceReader;

mod bit_reader;
pub use bit_reader::BitReader;

mod error;
pub use error::{Error, ErrorDetails, Result};

pub mod packet;
pub use packet::{parse_packet, parse_pcr, parse_timestamp, PcrTimestamp, TsPacket};

pub mod pes;
pub mod psi;

pub mod adaptation_private;
pub mod catalog;
pub mod pcr;
pub mod record;
pub mod report;

pub mod engine;

const CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);
type CrcDigest = Digest<'static, u32>;

/// Expands to [`format_args`] for a 90kHz timestamp of any integer type.
///
/// Format is `<hours>:<minutes>:<seconds>:<90kHz-ticks>`.
///
/// # Example
///
/// ```
/// use mpegts_analyzer::pts_format_args;
/// assert_eq!(std::fmt::format(pts_format_args!(900000)), "0:0:10:0");
/// ```
#[macro_export]
macro_rules! pts_format_args {
    ($pts:expr) => {
        format_args!(
            "{}:{}:{}:{}",
            $pts / (90000 * 60 * 60),
            $pts / (90000 * 60) % 60,
            $pts / 90000 % 60,
            $pts % 90000
        )
    };
}
