//! Program Map Table.

use super::{Descriptor, PsiHeader};
use crate::{Result, SliceReader};
use modular_bitfield_msb::prelude::*;

/// 4-byte fixed PMT header (after the shared 8-byte PSI section header + table syntax).
#[bitfield]
#[derive(Debug, Clone, Copy)]
pub struct PmtHeader {
    pub reserved: B3,
    pub pcr_pid: B13,
    pub reserved2: B4,
    #[skip]
    pub unused_bits: B2,
    pub program_info_length: B10,
}

/// 5-byte fixed elementary stream info header, preceding that stream's descriptor loop.
#[bitfield]
#[derive(Debug, Clone, Copy)]
pub struct ElementaryStreamInfoHeader {
    pub stream_type: B8,
    pub reserved: B3,
    pub elementary_pid: B13,
    pub reserved2: B4,
    #[skip]
    pub unused_bits: B2,
    pub es_info_length: B10,
}

/// One elementary stream entry in a PMT.
#[derive(Debug)]
pub struct ElementaryStreamInfo {
    /// Fixed 5-byte header preceding this stream's descriptor loop.
    pub header: ElementaryStreamInfoHeader,
    /// This stream's descriptor loop.
    pub descriptors: Vec<Descriptor>,
}

impl ElementaryStreamInfo {
    /// The elementary stream's `stream_type` byte.
    pub fn stream_type(&self) -> u8 {
        self.header.stream_type()
    }

    /// The elementary stream's PID.
    pub fn pid(&self) -> u16 {
        self.header.elementary_pid()
    }
}

/// Parsed Program Map Table.
#[derive(Debug)]
pub struct Pmt {
    /// `program_number` field of the PMT's table syntax section.
    pub program_number: u16,
    /// `version_number` field of the PMT's table syntax section.
    pub version: u8,
    /// PID carrying this program's PCR.
    pub pcr_pid: u16,
    /// Program-level descriptor loop.
    pub program_descriptors: Vec<Descriptor>,
    /// This program's elementary streams.
    pub streams: Vec<ElementaryStreamInfo>,
}

/// Human-readable stream type names, extended from the reference's table with HEVC (0x24),
/// which its source generation predates.
pub fn stream_type_name(stream_type: u8) -> &'static str {
    match stream_type {
        0x00 => "Reserved",
        0x01 => "MPEG-1 Video",
        0x02 => "MPEG-2 Video",
        0x03 => "MPEG-1 Audio",
        0x04 => "MPEG-2 Audio",
        0x05 => "Private Section",
        0x06 => "Private PES",
        0x0F => "MPEG-2 AAC Audio (ADTS)",
        0x10 => "MPEG-4 Video",
        0x11 => "MPEG-4 AAC Audio (LATM)",
        0x1B => "MPEG-4 AVC Video",
        0x24 => "HEVC Video",
        0x81 => "AC-3 Audio",
        0x82 => "SCTE-27",
        0x86 => "SCTE-35",
        0x87 => "E-AC-3 Audio",
        _ => "Unknown stream type",
    }
}

/// Parses a complete PMT section. `data` is the section payload after the 8-byte header+table
/// syntax, excluding the trailing CRC32.
pub fn parse_pmt(_header: &PsiHeader, program_number: u16, version: u8, data: &[u8]) -> Result<Pmt> {
    let mut reader = SliceReader::new(data);
    let pmt_header = PmtHeader::from_bytes(*reader.read_array_ref::<4>()?);
    let mut pmt = Pmt {
        program_number,
        version,
        pcr_pid: pmt_header.pcr_pid(),
        program_descriptors: Vec::new(),
        streams: Vec::new(),
    };

    let mut info_reader = reader.new_sub_reader(pmt_header.program_info_length() as usize)?;
    while info_reader.remaining_len() > 0 {
        pmt.program_descriptors
            .push(Descriptor::new_from_reader(&mut info_reader)?);
    }

    while reader.remaining_len() > 0 {
        let es_header = ElementaryStreamInfoHeader::from_bytes(*reader.read_array_ref::<5>()?);
        let mut es_info = ElementaryStreamInfo {
            header: es_header,
            descriptors: Vec::new(),
        };
        let mut es_reader = reader.new_sub_reader(es_info.header.es_info_length() as usize)?;
        while es_reader.remaining_len() > 0 {
            es_info
                .descriptors
                .push(Descriptor::new_from_reader(&mut es_reader)?);
        }
        pmt.streams.push(es_info);
    }

    Ok(pmt)
}
