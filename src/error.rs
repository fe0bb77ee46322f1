//! Error types shared by every parsing stage.

use std::fmt;
use std::result;

/// Information about what went wrong while parsing a packet, section, or payload unit.
#[derive(Debug)]
pub enum ErrorDetails {
    /// Encountered when a [`crate::SliceReader`] or [`crate::BitReader`] reads out of bounds.
    /// The [`usize`] parameter is the length (in bytes, or bits for [`crate::BitReader`]) of the
    /// offending read.
    PacketOverrun(usize),
    /// MPEG-TS packet headers must contain a sync byte of 0x47.
    LostSync,
    /// Encountered for inconsistent [`crate::packet::AdaptationFieldHeader`] parses.
    BadAdaptationHeader,
    /// Encountered for inconsistent PSI section headers.
    BadPsiHeader,
    /// Encountered for inconsistent PES headers.
    BadPesHeader,
    /// Encountered when a PSI section fails CRC32 validation (only surfaced when
    /// [`crate::engine::EngineConfig::verify_crc`] is enabled).
    PsiCrcMismatch,
    /// Encountered when a SCTE-35 Splice Information Section is shorter than its declared
    /// `splice_command_length` or `descriptor_loop_length`.
    TruncatedScte35Section,
}

impl fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorDetails::PacketOverrun(len) => write!(f, "read of {} bytes overran buffer", len),
            ErrorDetails::LostSync => write!(f, "lost sync (expected 0x47)"),
            ErrorDetails::BadAdaptationHeader => write!(f, "malformed adaptation field"),
            ErrorDetails::BadPsiHeader => write!(f, "malformed PSI section header"),
            ErrorDetails::BadPesHeader => write!(f, "malformed PES header"),
            ErrorDetails::PsiCrcMismatch => write!(f, "PSI section failed CRC32 check"),
            ErrorDetails::TruncatedScte35Section => {
                write!(f, "SCTE-35 section shorter than its declared length")
            }
        }
    }
}

/// Error encountered while parsing some part of a transport stream.
#[derive(Debug)]
pub struct Error {
    /// Byte (or bit, depending on the reader) offset within the unit being parsed at which the
    /// error was detected.
    pub location: usize,
    /// What went wrong.
    pub details: ErrorDetails,
}

impl Error {
    /// Builds an [`Error`] at the given location.
    pub fn new(location: usize, details: ErrorDetails) -> Self {
        Self { location, details }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at offset {}: {}", self.location, self.details)
    }
}

impl std::error::Error for Error {}

/// [`std::result::Result`] alias that uses [`Error`].
pub type Result<T> = result::Result<T, Error>;
