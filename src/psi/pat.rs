//! Program Association Table.

use super::PsiHeader;
use crate::{ErrorDetails, Result, SliceReader};
use modular_bitfield_msb::prelude::*;

/// One 4-byte PAT program entry.
#[bitfield]
#[derive(Debug, Clone, Copy)]
pub struct PatEntry {
    pub program_num: B16,
    pub reserved: B3,
    pub program_map_pid: B13,
}

/// Parsed Program Association Table.
///
/// `program_num == 0` entries are the Network Information Table pointer rather than a program,
/// matching the reference parser's special case; its `program_map_pid` is captured separately as
/// [`Pat::nit_pid`].
#[derive(Debug, Default)]
pub struct Pat {
    /// `transport_stream_id` field of the PAT's table syntax section.
    pub transport_stream_id: u16,
    /// `version_number` field of the PAT's table syntax section.
    pub version: u8,
    /// program_number -> pmt_pid
    pub programs: Vec<(u16, u16)>,
    /// PID of the Network Information Table, defaulting to 0x0010 when the PAT carries no
    /// explicit `program_num == 0` pointer.
    pub nit_pid: u16,
}

/// Parses a complete PAT section (header already consumed by the caller; `table_syntax` has
/// already been read by the caller too). `data` is the section payload after the 8-byte
/// header+table-syntax, up to but excluding the trailing CRC32.
pub fn parse_pat(header: &PsiHeader, transport_stream_id: u16, version: u8, data: &[u8]) -> Result<Pat> {
    let mut reader = SliceReader::new(data);
    let mut pat = Pat {
        transport_stream_id,
        version,
        programs: Vec::with_capacity(reader.remaining_len() / 4),
        nit_pid: 0x0010,
    };
    let _ = header;
    while reader.remaining_len() >= 4 {
        let entry = PatEntry::from_bytes(*reader.read_array_ref::<4>()?);
        if entry.program_num() == 0 {
            pat.nit_pid = entry.program_map_pid();
        } else {
            pat.programs.push((entry.program_num(), entry.program_map_pid()));
        }
    }
    if reader.remaining_len() != 0 {
        return Err(reader.make_error(ErrorDetails::BadPsiHeader));
    }
    Ok(pat)
}
