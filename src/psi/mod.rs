//! Program-Specific Information: section reassembly plus PAT/PMT table parsing.

mod descriptor;
mod pat;
mod pmt;

pub use descriptor::{
    descriptor_tag_name, Descriptor, Iso639LanguageDescriptor, RegistrationDescriptor,
};
pub use pat::{parse_pat, Pat, PatEntry};
pub use pmt::{parse_pmt, stream_type_name, ElementaryStreamInfo, ElementaryStreamInfoHeader, Pmt, PmtHeader};

use crate::{CrcDigest, Error, ErrorDetails, Result, SliceReader, CRC};
use log::warn;
use modular_bitfield_msb::prelude::*;
use std::collections::HashMap;

/// Fixed 3-byte PSI section header.
#[bitfield]
#[derive(Debug, Clone, Copy)]
pub struct PsiHeader {
    pub table_id: B8,
    pub section_syntax_indicator: bool,
    pub private_bit: bool,
    pub reserved_bits: B2,
    #[skip]
    pub unused_bits: B2,
    pub section_length: B10,
}

/// Fixed 5-byte PSI table syntax section, present whenever `section_length > 0`.
#[bitfield]
#[derive(Debug, Clone, Copy)]
pub struct PsiTableSyntax {
    pub table_id_extension: B16,
    pub reserved_bits: B2,
    pub version: B5,
    pub current_next_indicator: bool,
    pub section_num: B8,
    pub last_section_num: B8,
}

/// A fully reassembled and (optionally) CRC-validated PSI section, not yet interpreted as a
/// particular table type.
#[derive(Debug)]
pub struct PsiSection {
    /// Fixed 3-byte section header.
    pub header: PsiHeader,
    /// 5-byte table syntax section, present whenever `header.section_length() > 0`.
    pub table_syntax: Option<PsiTableSyntax>,
    /// Section payload after the table syntax, excluding the trailing CRC32.
    pub data: Vec<u8>,
}

fn verify_crc(full_section: &[u8]) -> Result<()> {
    if full_section.len() < 4 {
        return Err(Error::new(0, ErrorDetails::BadPsiHeader));
    }
    let len_minus_crc = full_section.len() - 4;
    let mut hasher: CrcDigest = CRC.digest();
    hasher.update(&full_section[..len_minus_crc]);
    let actual = hasher.finalize();
    let expected =
        u32::from_be_bytes(*SliceReader::new(&full_section[len_minus_crc..]).read_array_ref::<4>()?);
    if actual != expected {
        return Err(Error::new(len_minus_crc, ErrorDetails::PsiCrcMismatch));
    }
    Ok(())
}

/// Parses one PSI section out of `payload`, which must start at the `pointer_field` byte of a
/// PUSI packet (the "simple" discipline: the pointer field names how many filler bytes precede
/// the section start). Returns the parsed header/table-syntax/data plus the bytes actually
/// consumed from `payload`, so continuation packets can be appended before re-parsing once the
/// declared `section_length` is satisfied.
fn parse_section_header(payload: &[u8]) -> Result<(PsiHeader, Option<PsiTableSyntax>, usize)> {
    let mut reader = SliceReader::new(payload);
    if reader.remaining_len() < 1 {
        return Err(reader.make_error(ErrorDetails::BadPsiHeader));
    }
    let pointer_field = reader.read(1)?[0];
    reader.skip(pointer_field as usize)?;

    if reader.remaining_len() < 3 {
        return Err(reader.make_error(ErrorDetails::BadPsiHeader));
    }
    let header = PsiHeader::from_bytes(*reader.read_array_ref::<3>()?);
    let section_length = header.section_length() as usize;

    let table_syntax = if section_length > 0 {
        if reader.remaining_len() < 5 {
            return Err(reader.make_error(ErrorDetails::BadPsiHeader));
        }
        Some(PsiTableSyntax::from_bytes(*reader.read_array_ref::<5>()?))
    } else {
        None
    };

    // Bytes consumed so far: pointer field byte + filler + 3-byte header (+5 table syntax).
    let header_bytes = 1 + pointer_field as usize + 3 + if table_syntax.is_some() { 5 } else { 0 };
    Ok((header, table_syntax, header_bytes))
}

/// Buffers TS packet payloads for a single PID into complete PSI sections.
///
/// Implements the "simple" discipline described for pass-1 discovery: a PUSI packet starts a new
/// section (finishing whatever was previously buffered, if any); non-PUSI packets append. This
/// is what the engine uses for PID 0 (PAT) and every discovered PMT PID.
#[derive(Default)]
pub struct SectionAssembler {
    buf: Vec<u8>,
    want_len: Option<usize>,
}

impl SectionAssembler {
    /// Builds an assembler with no section in progress.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one packet's payload. Returns `Some(section)` once a complete section (including
    /// its trailing CRC32, for tables that carry one) has been assembled.
    pub fn feed(&mut self, pusi: bool, payload: &[u8], verify: bool) -> Result<Option<PsiSection>> {
        if pusi {
            self.buf.clear();
            self.buf.extend_from_slice(payload);
            self.want_len = None;
        } else {
            if self.buf.is_empty() {
                // No section in progress; drop stray continuation data.
                return Ok(None);
            }
            self.buf.extend_from_slice(payload);
        }

        let (header, table_syntax, header_bytes) = match parse_section_header(&self.buf) {
            Ok(v) => v,
            Err(_) => return Ok(None), // not enough bytes buffered yet
        };
        let pointer_field = self.buf[0] as usize;
        let section_length = header.section_length() as usize;
        let total_len = 1 + pointer_field + 3 + section_length;
        self.want_len = Some(total_len);
        if self.buf.len() < total_len {
            return Ok(None);
        }

        let body_start = header_bytes;
        let body_end = 1 + pointer_field + 3 + section_length;
        let with_crc_start = 1 + pointer_field + 3;
        let full_section = &self.buf[with_crc_start..body_end];
        if verify {
            verify_crc(full_section)?;
        }
        let data_end = if table_syntax.is_some() {
            body_end - 4
        } else {
            body_end
        };
        let data = self.buf[body_start..data_end.max(body_start)].to_vec();
        self.buf.clear();
        self.want_len = None;
        Ok(Some(PsiSection {
            header,
            table_syntax,
            data,
        }))
    }
}

/// Drives pass-1 PSI discovery: buffers PID 0 into a PAT, then buffers every `pmt_pid` named by
/// that PAT into PMTs, exactly mirroring `PsiParser.Parse`/`ParseDone` in the reference
/// implementation.
#[derive(Default)]
pub struct PsiDiscovery {
    pat_assembler: SectionAssembler,
    pmt_assemblers: HashMap<u16, SectionAssembler>,
    /// The discovered PAT, once its section has been assembled.
    pub pat: Option<Pat>,
    /// Discovered PMTs, keyed by PMT PID.
    pub pmts: HashMap<u16, Pmt>,
    verify_crc: bool,
}

impl PsiDiscovery {
    /// Builds a fresh discovery state, optionally verifying section CRC32s.
    pub fn new(verify_crc: bool) -> Self {
        Self {
            verify_crc,
            ..Self::default()
        }
    }

    /// Feeds one packet. Returns `true` once every PMT named by the PAT has been parsed (the
    /// `parse_done` condition); from that point pass 1 is complete.
    pub fn feed(&mut self, pid: u16, pusi: bool, payload: &[u8]) -> Result<bool> {
        if self.pat.is_none() {
            if pid != 0 {
                return Ok(false);
            }
            if let Some(section) = self.pat_assembler.feed(pusi, payload, self.verify_crc)? {
                let ts = section.table_syntax.ok_or_else(|| {
                    Error::new(0, ErrorDetails::BadPsiHeader)
                })?;
                let pat = parse_pat(&section.header, ts.table_id_extension(), ts.version(), &section.data)?;
                let done = pat.programs.is_empty();
                self.pat = Some(pat);
                return Ok(done);
            }
            return Ok(false);
        }

        let pat = self.pat.as_ref().unwrap();
        if !pat.programs.iter().any(|(_, pmt_pid)| *pmt_pid == pid) {
            return Ok(false);
        }

        let assembler = self.pmt_assemblers.entry(pid).or_insert_with(SectionAssembler::new);
        if let Some(section) = assembler.feed(pusi, payload, self.verify_crc)? {
            let ts = section
                .table_syntax
                .ok_or_else(|| Error::new(0, ErrorDetails::BadPsiHeader))?;
            let pmt = parse_pmt(&section.header, ts.table_id_extension(), ts.version(), &section.data)?;
            self.pmts.insert(pid, pmt);
        }

        Ok(self.pat.as_ref().unwrap().programs.len() == self.pmts.len())
    }

    /// Forces discovery to be considered finished (source exhausted before every PMT arrived).
    pub fn finish(&mut self) {
        // Nothing to tear down; the catalog builder simply uses whatever PMTs were parsed.
        if self.pat.is_none() {
            warn!("Source exhausted before a PAT was ever parsed");
        } else if self.pat.as_ref().unwrap().programs.len() != self.pmts.len() {
            warn!(
                "Source exhausted with {}/{} PMTs parsed",
                self.pmts.len(),
                self.pat.as_ref().unwrap().programs.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pat_section_bytes(program_num: u16, pmt_pid: u16) -> Vec<u8> {
        let mut out = vec![0u8]; // pointer field
        let section_length: u16 = 5 + 4 + 4; // table syntax + 1 program + crc
        out.push(0x00); // table_id
        out.extend_from_slice(&(0x8000 | section_length).to_be_bytes()); // ssi=1, section_length
        out.extend_from_slice(&1u16.to_be_bytes()); // transport_stream_id
        out.push(0b1100_0001); // reserved(2)=11, version=0, current_next=1
        out.push(0); // section_number
        out.push(0); // last_section_number
        let entry = PatEntry::new()
            .with_program_num(program_num)
            .with_program_map_pid(pmt_pid);
        out.extend_from_slice(&entry.into_bytes());
        out.extend_from_slice(&[0u8; 4]); // fake CRC, unverified by default
        out
    }

    #[test]
    fn discovers_pat_without_pmts_needed() {
        let mut d = PsiDiscovery::new(false);
        let bytes = pat_section_bytes(0, 0); // only the NIT pointer, no programs
        let done = d.feed(0, true, &bytes).unwrap();
        assert!(done);
        assert_eq!(d.pat.as_ref().unwrap().programs.len(), 0);
    }

    #[test]
    fn discovers_pat_then_waits_for_pmt() {
        let mut d = PsiDiscovery::new(false);
        let bytes = pat_section_bytes(1, 256);
        let done = d.feed(0, true, &bytes).unwrap();
        assert!(!done);
        assert_eq!(d.pat.as_ref().unwrap().programs, vec![(1, 256)]);
    }
}
