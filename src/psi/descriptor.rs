//! Stream and program descriptors carried in PMT (and program-level) descriptor loops.

use crate::{Result, SliceReader};
use smallvec::SmallVec;

/// One `{tag, length, data}` descriptor TLV. Registration (0x05) and ISO-639-language (0x0A)
/// tags are decodable via [`Descriptor::as_registration`] / [`Descriptor::as_iso639_language`];
/// every other tag is retained by `tag` and `data` without further interpretation.
#[derive(Debug, Clone)]
pub struct Descriptor {
    /// Descriptor tag byte.
    pub tag: u8,
    /// Raw descriptor payload, following the tag and length bytes.
    pub data: SmallVec<[u8; 8]>,
}

impl Descriptor {
    pub(crate) fn new_from_reader(reader: &mut SliceReader) -> Result<Self> {
        let tag_len = reader.read_array_ref::<2>()?;
        let mut data = SmallVec::<[u8; 8]>::new();
        data.extend_from_slice(reader.read(tag_len[1] as usize)?);
        Ok(Self {
            tag: tag_len[0],
            data,
        })
    }

    /// Decodes this descriptor as a registration_descriptor (tag 0x05), if it is one.
    pub fn as_registration(&self) -> Option<RegistrationDescriptor> {
        if self.tag != 0x05 || self.data.len() < 4 {
            return None;
        }
        Some(RegistrationDescriptor {
            format_identifier: String::from_utf8_lossy(&self.data[0..4]).into_owned(),
        })
    }

    /// Decodes this descriptor as an ISO_639_language_descriptor (tag 0x0A), if it is one.
    pub fn as_iso639_language(&self) -> Option<Iso639LanguageDescriptor> {
        if self.tag != 0x0A {
            return None;
        }
        let mut languages = Vec::new();
        let mut audio_types = Vec::new();
        for chunk in self.data.chunks_exact(4) {
            languages.push(String::from_utf8_lossy(&chunk[0..3]).into_owned());
            audio_types.push(chunk[3]);
        }
        Some(Iso639LanguageDescriptor {
            iso_639_language_code: languages,
            audio_type: audio_types,
        })
    }

    /// Human-readable descriptor tag name, matching the reference implementation's tag table.
    pub fn tag_name(&self) -> &'static str {
        descriptor_tag_name(self.tag)
    }
}

/// Decoded registration_descriptor (ISO/IEC 13818-1 tag 0x05).
#[derive(Debug)]
pub struct RegistrationDescriptor {
    /// 4-byte organizationally-unique format identifier.
    pub format_identifier: String,
}

/// Decoded ISO_639_language_descriptor (ISO/IEC 13818-1 tag 0x0A).
#[derive(Debug)]
pub struct Iso639LanguageDescriptor {
    /// One 3-character ISO 639-2 language code per audio component.
    pub iso_639_language_code: Vec<String>,
    /// Audio type byte paired with each language code.
    pub audio_type: Vec<u8>,
}

/// Human-readable descriptor tag names.
pub fn descriptor_tag_name(tag: u8) -> &'static str {
    match tag {
        0 => "reserved",
        1 => "forbidden",
        2 => "video_stream_descriptor",
        3 => "audio_stream_descriptor",
        4 => "hierarchy_descriptor",
        5 => "registration_descriptor",
        6 => "data_stream_alignment_descriptor",
        7 => "target_background_grid_descriptor",
        8 => "video_window_descriptor",
        9 => "CA_descriptor",
        10 => "ISO_639_language_descriptor",
        11 => "system_clock_descriptor",
        12 => "multiplex_buffer_utilization_descriptor",
        13 => "copyright_descriptor",
        14 => "maximum_bitrate_descriptor",
        15 => "private_data_indicator_descriptor",
        16 => "smoothing_buffer_descriptor",
        17 => "STD_descriptor",
        18 => "IBP_descriptor",
        27 => "MPEG-4_video_descriptor",
        28 => "MPEG-4_audio_descriptor",
        29 => "IOD_descriptor",
        30 => "SL_descriptor",
        31 => "FMC_descriptor",
        32 => "external_ES_ID_descriptor",
        33 => "MuxCode_descriptor",
        34 => "FmxBufferSize_descriptor",
        35 => "multiplexbuffer_descriptor",
        36 => "content_labeling_descriptor",
        37 => "metadata_pointer_descriptor",
        38 => "metadata_descriptor",
        39 => "metadata_STD_descriptor",
        40 => "AVC_video_descriptor",
        41 => "IPMP_descriptor",
        42 => "AVC_timing_and_HRD_descriptor",
        43 => "MPEG-2_AAC_audio_descriptor",
        44 => "FlexMuxTiming_descriptor",
        45 => "MPEG-4_text_descriptor",
        46 => "MPEG-4_audio_extension_descriptor",
        47 => "auxiliary_video_stream_descriptor",
        48 => "SVC_extension_descriptor",
        49 => "MVC_extension_descriptor",
        50 => "J2K_video_descriptor",
        51 => "MVC_operation_point_descriptor",
        52 => "MPEG2_stereoscopic_video_format_descriptor",
        53 => "Stereoscopic_program_info_descriptor",
        54 => "Stereoscopic_video_info_descriptor",
        0x45 => "vbi_data_descriptor",
        0x46 => "vbi_teletext_descriptor",
        0x56 => "teletext_descriptor",
        0x59 => "subtitling_descriptor",
        0x6A => "AC-3_descriptor",
        0x81 => "AC-3_audio_stream_descriptor",
        0xDD => "harmonic_aac_bitrate_descriptor",
        0xDE => "harmonic_h264_bitrate_descriptor",
        _ => "unknown_descriptor_tag",
    }
}
