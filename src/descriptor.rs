//! DVB/MPEG descriptor engine.
//!
//! Descriptors are length-prefixed records dispatched on their tag byte.
//! The declared length is authoritative: whatever a variant parser consumes,
//! the loop always advances to `tag + 2 + length`. The raw body bytes are
//! retained on every descriptor so records can be re-serialized byte-exact
//! even where no structured encoder exists.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cursor::ByteCursor;
use crate::dvb::{parse_dvb_duration_minutes, parse_dvb_time, serialize_duration};
use crate::errors::Result;

// Descriptor tags, ETSI EN 300 468 chapter 6.1 / ISO 13818-1 table 2-45
pub const TAG_REGISTRATION: u8 = 0x05;
pub const TAG_DATA_STREAM_ALIGNMENT: u8 = 0x06;
pub const TAG_ISO639_LANGUAGE: u8 = 0x0A;
pub const TAG_MAXIMUM_BITRATE: u8 = 0x0E;
pub const TAG_PRIVATE_DATA_INDICATOR: u8 = 0x0F;
pub const TAG_AVC_VIDEO: u8 = 0x28;
pub const TAG_NETWORK_NAME: u8 = 0x40;
pub const TAG_VBI_DATA: u8 = 0x45;
pub const TAG_VBI_TELETEXT: u8 = 0x46;
pub const TAG_SERVICE: u8 = 0x48;
pub const TAG_SHORT_EVENT: u8 = 0x4D;
pub const TAG_EXTENDED_EVENT: u8 = 0x4E;
pub const TAG_COMPONENT: u8 = 0x50;
pub const TAG_STREAM_IDENTIFIER: u8 = 0x52;
pub const TAG_CONTENT: u8 = 0x54;
pub const TAG_PARENTAL_RATING: u8 = 0x55;
pub const TAG_TELETEXT: u8 = 0x56;
pub const TAG_LOCAL_TIME_OFFSET: u8 = 0x58;
pub const TAG_SUBTITLING: u8 = 0x59;
pub const TAG_PRIVATE_DATA_SPECIFIER: u8 = 0x5F;
pub const TAG_AC3: u8 = 0x6A;
pub const TAG_ENHANCED_AC3: u8 = 0x7A;
pub const TAG_EXTENSION: u8 = 0x7F;

/// Extension descriptor sub-tags, chapter 6.3
pub const EXTENSION_TAG_SUPPLEMENTARY_AUDIO: u8 = 0x06;

// Audio types carried by the ISO-639 language descriptor
pub const AUDIO_TYPE_CLEAN_EFFECTS: u8 = 0x01;
pub const AUDIO_TYPE_HEARING_IMPAIRED: u8 = 0x02;
pub const AUDIO_TYPE_VISUAL_IMPAIRED_COMMENTARY: u8 = 0x03;

// Data stream alignments, ISO 13818-1 chapter 2.6.11
pub const ALIGNMENT_AUDIO_SYNC_WORD: u8 = 0x01;
pub const ALIGNMENT_VIDEO_SLICE_OR_ACCESS_UNIT: u8 = 0x01;
pub const ALIGNMENT_VIDEO_ACCESS_UNIT: u8 = 0x02;
pub const ALIGNMENT_VIDEO_GOP_OR_SEQ: u8 = 0x03;
pub const ALIGNMENT_VIDEO_SEQ: u8 = 0x04;

// Service types, chapter 6.2.33
pub const SERVICE_TYPE_DIGITAL_TELEVISION: u8 = 0x01;

// Teletext types, chapter 6.2.43
pub const TELETEXT_TYPE_INITIAL_PAGE: u8 = 0x01;
pub const TELETEXT_TYPE_SUBTITLE_PAGE: u8 = 0x02;
pub const TELETEXT_TYPE_ADDITIONAL_INFORMATION_PAGE: u8 = 0x03;
pub const TELETEXT_TYPE_PROGRAMME_SCHEDULE_PAGE: u8 = 0x04;
pub const TELETEXT_TYPE_HEARING_IMPAIRED_SUBTITLE_PAGE: u8 = 0x05;

/// One parsed descriptor plus its verbatim body bytes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Descriptor {
    pub tag: u8,
    pub length: u8,
    /// Verbatim body copy, used for byte-exact re-serialization.
    pub raw: Vec<u8>,
    pub payload: DescriptorPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DescriptorPayload {
    Ac3(Ac3Descriptor),
    AvcVideo(AvcVideoDescriptor),
    Component(ComponentDescriptor),
    Content(Vec<ContentItem>),
    DataStreamAlignment(u8),
    EnhancedAc3(EnhancedAc3Descriptor),
    ExtendedEvent(ExtendedEventDescriptor),
    Extension(ExtensionDescriptor),
    Iso639Language(Iso639LanguageDescriptor),
    LocalTimeOffset(Vec<LocalTimeOffsetItem>),
    MaximumBitrate(u32),
    NetworkName(Vec<u8>),
    ParentalRating(Vec<ParentalRatingItem>),
    PrivateDataIndicator(u32),
    PrivateDataSpecifier(u32),
    Registration(RegistrationDescriptor),
    Service(ServiceDescriptor),
    ShortEvent(ShortEventDescriptor),
    StreamIdentifier(u8),
    Subtitling(Vec<SubtitlingItem>),
    Teletext(Vec<TeletextItem>),
    VbiData(Vec<VbiDataService>),
    VbiTeletext(Vec<TeletextItem>),
    /// Tags 0x80 through 0xFE carry user private content.
    UserDefined(Vec<u8>),
    /// Recognized as a standard tag range but not decoded here.
    Unknown(Vec<u8>),
    /// Zero-length body.
    Empty,
}

/// AC-3 descriptor, EN 300 468 annex D. A flags byte gates the presence of
/// each subsequent one-byte field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct Ac3Descriptor {
    pub component_type: Option<u8>,
    pub bsid: Option<u8>,
    pub main_id: Option<u8>,
    pub asvc: Option<u8>,
    pub additional_info: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct EnhancedAc3Descriptor {
    pub component_type: Option<u8>,
    pub bsid: Option<u8>,
    pub main_id: Option<u8>,
    pub asvc: Option<u8>,
    pub mix_info_exists: bool,
    pub substream1: Option<u8>,
    pub substream2: Option<u8>,
    pub substream3: Option<u8>,
    pub additional_info: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvcVideoDescriptor {
    pub profile_idc: u8,
    pub constraint_set0_flag: bool,
    pub constraint_set1_flag: bool,
    pub constraint_set2_flag: bool,
    pub compatible_flags: u8,
    pub level_idc: u8,
    pub avc_still_present: bool,
    pub avc_24_hour_picture: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentDescriptor {
    pub stream_content_ext: u8,
    pub stream_content: u8,
    pub component_type: u8,
    pub component_tag: u8,
    pub language: Vec<u8>,
    pub text: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentItem {
    pub nibble_level_1: u8,
    pub nibble_level_2: u8,
    pub user_byte: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtendedEventDescriptor {
    pub number: u8,
    pub last_descriptor_number: u8,
    pub language: Vec<u8>,
    pub items: Vec<ExtendedEventItem>,
    pub text: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtendedEventItem {
    pub description: Vec<u8>,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtensionDescriptor {
    pub tag: u8,
    pub payload: ExtensionPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ExtensionPayload {
    SupplementaryAudio(SupplementaryAudioDescriptor),
    Unknown(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupplementaryAudioDescriptor {
    pub mix_type: bool,
    pub editorial_classification: u8,
    pub language: Option<Vec<u8>>,
    pub private_data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Iso639LanguageDescriptor {
    /// May hold fewer than 3 bytes; some streams encode 2-letter codes.
    pub language: Vec<u8>,
    pub audio_type: u8,
}

impl Iso639LanguageDescriptor {
    /// Language code padded to the 3 bytes the wire format prescribes.
    pub fn language_code(&self) -> [u8; 3] {
        let mut code = [0u8; 3];
        for (i, b) in self.language.iter().take(3).enumerate() {
            code[i] = *b;
        }
        code
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalTimeOffsetItem {
    pub country_code: Vec<u8>,
    pub country_region_id: u8,
    pub polarity: bool,
    #[serde(serialize_with = "serialize_duration")]
    pub local_time_offset: chrono::Duration,
    pub time_of_change: DateTime<Utc>,
    #[serde(serialize_with = "serialize_duration")]
    pub next_time_offset: chrono::Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParentalRatingItem {
    pub country_code: Vec<u8>,
    pub rating: u8,
}

impl ParentalRatingItem {
    /// Minimum recommended age; 0 for undefined or user-defined ratings.
    pub fn minimum_age(&self) -> u8 {
        if self.rating == 0 || self.rating > 0x10 {
            return 0;
        }
        self.rating + 3
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationDescriptor {
    pub format_identifier: u32,
    pub additional_identification_info: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceDescriptor {
    pub service_type: u8,
    pub provider: Vec<u8>,
    pub name: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShortEventDescriptor {
    pub language: Vec<u8>,
    pub event_name: Vec<u8>,
    pub text: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubtitlingItem {
    pub language: Vec<u8>,
    pub subtitling_type: u8,
    pub composition_page_id: u16,
    pub ancillary_page_id: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeletextItem {
    pub language: Vec<u8>,
    pub teletext_type: u8,
    pub magazine: u8,
    /// Page number, decoded from its BCD form.
    pub page: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VbiDataService {
    pub data_service_id: u8,
    pub items: Vec<VbiDataItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VbiDataItem {
    pub field_parity: bool,
    pub line_offset: u8,
}

// VBI data service ids, chapter 6.2.47
const VBI_SERVICE_EBU_TELETEXT: u8 = 0x01;
const VBI_SERVICE_INVERTED_TELETEXT: u8 = 0x02;
const VBI_SERVICE_VPS: u8 = 0x04;
const VBI_SERVICE_WSS: u8 = 0x05;
const VBI_SERVICE_CLOSED_CAPTIONING: u8 = 0x06;
const VBI_SERVICE_MONOCHROME_442: u8 = 0x07;

/// Parses a descriptor loop. The loop starts with a 2-byte field whose low
/// 12 bits give the total descriptor bytes that follow.
pub fn parse_descriptors(c: &mut ByteCursor) -> Result<Vec<Descriptor>> {
    let b = c.next_bytes(2)?;
    let length = ((b[0] & 0x0F) as usize) << 8 | b[1] as usize;

    let mut out = Vec::new();
    let offset_end = c.offset() + length;
    while c.offset() < offset_end {
        let b = c.next_bytes(2)?;
        let (tag, length) = (b[0], b[1]);

        let raw = c.next_bytes(length as usize)?.to_vec();
        let descriptor_end = c.offset();
        c.seek(descriptor_end - length as usize);

        let payload = if length == 0 {
            DescriptorPayload::Empty
        } else if (0x80..=0xFE).contains(&tag) {
            DescriptorPayload::UserDefined(raw.clone())
        } else {
            parse_payload(c, tag, length, descriptor_end)?
        };

        // the declared length wins over whatever the variant parser consumed
        c.seek(descriptor_end);
        out.push(Descriptor {
            tag,
            length,
            raw,
            payload,
        });
    }
    Ok(out)
}

/// Writes a descriptor loop: 2-byte length prefix (reserved high bits as
/// ones) then each descriptor as tag, length, retained raw body.
pub fn write_descriptors(ds: &[Descriptor], out: &mut Vec<u8>) {
    let total: usize = ds.iter().map(|d| 2 + d.raw.len()).sum();
    out.push(0xF0 | (total >> 8) as u8);
    out.push(total as u8);
    for d in ds {
        out.push(d.tag);
        out.push(d.raw.len() as u8);
        out.extend_from_slice(&d.raw);
    }
}

fn parse_payload(
    c: &mut ByteCursor,
    tag: u8,
    length: u8,
    offset_end: usize,
) -> Result<DescriptorPayload> {
    let d = match tag {
        TAG_AC3 => DescriptorPayload::Ac3(parse_ac3(c, offset_end)?),
        TAG_AVC_VIDEO => DescriptorPayload::AvcVideo(parse_avc_video(c)?),
        TAG_COMPONENT => DescriptorPayload::Component(parse_component(c, offset_end)?),
        TAG_CONTENT => DescriptorPayload::Content(parse_content(c, offset_end)?),
        TAG_DATA_STREAM_ALIGNMENT => DescriptorPayload::DataStreamAlignment(c.next_byte()?),
        TAG_ENHANCED_AC3 => DescriptorPayload::EnhancedAc3(parse_enhanced_ac3(c, offset_end)?),
        TAG_EXTENDED_EVENT => DescriptorPayload::ExtendedEvent(parse_extended_event(c)?),
        TAG_EXTENSION => DescriptorPayload::Extension(parse_extension(c, offset_end)?),
        TAG_ISO639_LANGUAGE => DescriptorPayload::Iso639Language(parse_iso639(c, offset_end)?),
        TAG_LOCAL_TIME_OFFSET => {
            DescriptorPayload::LocalTimeOffset(parse_local_time_offset(c, offset_end)?)
        }
        TAG_MAXIMUM_BITRATE => {
            let b = c.next_bytes(3)?;
            let bitrate = ((b[0] & 0x3F) as u32) << 16 | (b[1] as u32) << 8 | b[2] as u32;
            DescriptorPayload::MaximumBitrate(bitrate * 50)
        }
        TAG_NETWORK_NAME => {
            DescriptorPayload::NetworkName(c.next_bytes(offset_end - c.offset())?.to_vec())
        }
        TAG_PARENTAL_RATING => {
            DescriptorPayload::ParentalRating(parse_parental_rating(c, offset_end)?)
        }
        TAG_PRIVATE_DATA_INDICATOR => {
            let b = c.next_bytes(4)?;
            DescriptorPayload::PrivateDataIndicator(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        }
        TAG_PRIVATE_DATA_SPECIFIER => {
            let b = c.next_bytes(4)?;
            DescriptorPayload::PrivateDataSpecifier(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        }
        TAG_REGISTRATION => DescriptorPayload::Registration(parse_registration(c, offset_end)?),
        TAG_SERVICE => DescriptorPayload::Service(parse_service(c)?),
        TAG_SHORT_EVENT => DescriptorPayload::ShortEvent(parse_short_event(c)?),
        TAG_STREAM_IDENTIFIER => DescriptorPayload::StreamIdentifier(c.next_byte()?),
        TAG_SUBTITLING => DescriptorPayload::Subtitling(parse_subtitling(c, offset_end)?),
        TAG_TELETEXT => DescriptorPayload::Teletext(parse_teletext(c, offset_end)?),
        TAG_VBI_DATA => DescriptorPayload::VbiData(parse_vbi_data(c, offset_end)?),
        TAG_VBI_TELETEXT => DescriptorPayload::VbiTeletext(parse_teletext(c, offset_end)?),
        _ => DescriptorPayload::Unknown(c.next_bytes(length as usize)?.to_vec()),
    };
    Ok(d)
}

fn parse_ac3(c: &mut ByteCursor, offset_end: usize) -> Result<Ac3Descriptor> {
    let flags = c.next_byte()?;
    let mut d = Ac3Descriptor::default();
    if flags & 0x80 != 0 {
        d.component_type = Some(c.next_byte()?);
    }
    if flags & 0x40 != 0 {
        d.bsid = Some(c.next_byte()?);
    }
    if flags & 0x20 != 0 {
        d.main_id = Some(c.next_byte()?);
    }
    if flags & 0x10 != 0 {
        d.asvc = Some(c.next_byte()?);
    }
    if c.offset() < offset_end {
        d.additional_info = c.next_bytes(offset_end - c.offset())?.to_vec();
    }
    Ok(d)
}

fn parse_enhanced_ac3(c: &mut ByteCursor, offset_end: usize) -> Result<EnhancedAc3Descriptor> {
    let flags = c.next_byte()?;
    let mut d = EnhancedAc3Descriptor {
        mix_info_exists: flags & 0x08 != 0,
        ..Default::default()
    };
    if flags & 0x80 != 0 {
        d.component_type = Some(c.next_byte()?);
    }
    if flags & 0x40 != 0 {
        d.bsid = Some(c.next_byte()?);
    }
    if flags & 0x20 != 0 {
        d.main_id = Some(c.next_byte()?);
    }
    if flags & 0x10 != 0 {
        d.asvc = Some(c.next_byte()?);
    }
    if flags & 0x04 != 0 {
        d.substream1 = Some(c.next_byte()?);
    }
    if flags & 0x02 != 0 {
        d.substream2 = Some(c.next_byte()?);
    }
    if flags & 0x01 != 0 {
        d.substream3 = Some(c.next_byte()?);
    }
    if c.offset() < offset_end {
        d.additional_info = c.next_bytes(offset_end - c.offset())?.to_vec();
    }
    Ok(d)
}

fn parse_avc_video(c: &mut ByteCursor) -> Result<AvcVideoDescriptor> {
    let b = c.next_bytes(4)?;
    Ok(AvcVideoDescriptor {
        profile_idc: b[0],
        constraint_set0_flag: b[1] & 0x80 != 0,
        constraint_set1_flag: b[1] & 0x40 != 0,
        constraint_set2_flag: b[1] & 0x20 != 0,
        compatible_flags: b[1] & 0x1F,
        level_idc: b[2],
        avc_still_present: b[3] & 0x80 != 0,
        avc_24_hour_picture: b[3] & 0x40 != 0,
    })
}

fn parse_component(c: &mut ByteCursor, offset_end: usize) -> Result<ComponentDescriptor> {
    let b = c.next_bytes(3)?;
    let mut d = ComponentDescriptor {
        stream_content_ext: b[0] >> 4,
        stream_content: b[0] & 0x0F,
        component_type: b[1],
        component_tag: b[2],
        language: c.next_bytes(3)?.to_vec(),
        text: Vec::new(),
    };
    if c.offset() < offset_end {
        d.text = c.next_bytes(offset_end - c.offset())?.to_vec();
    }
    Ok(d)
}

fn parse_content(c: &mut ByteCursor, offset_end: usize) -> Result<Vec<ContentItem>> {
    let mut items = Vec::new();
    while c.offset() < offset_end {
        let b = c.next_bytes(2)?;
        items.push(ContentItem {
            nibble_level_1: b[0] >> 4,
            nibble_level_2: b[0] & 0x0F,
            user_byte: b[1],
        });
    }
    Ok(items)
}

fn parse_extended_event(c: &mut ByteCursor) -> Result<ExtendedEventDescriptor> {
    let b = c.next_byte()?;
    let mut d = ExtendedEventDescriptor {
        number: b >> 4,
        last_descriptor_number: b & 0x0F,
        language: c.next_bytes(3)?.to_vec(),
        items: Vec::new(),
        text: Vec::new(),
    };
    let items_length = c.next_byte()? as usize;
    let items_end = c.offset() + items_length;
    while c.offset() < items_end {
        let description_length = c.next_byte()? as usize;
        let description = c.next_bytes(description_length)?.to_vec();
        let content_length = c.next_byte()? as usize;
        let content = c.next_bytes(content_length)?.to_vec();
        d.items.push(ExtendedEventItem {
            description,
            content,
        });
    }
    let text_length = c.next_byte()? as usize;
    d.text = c.next_bytes(text_length)?.to_vec();
    Ok(d)
}

fn parse_extension(c: &mut ByteCursor, offset_end: usize) -> Result<ExtensionDescriptor> {
    let tag = c.next_byte()?;
    let payload = match tag {
        EXTENSION_TAG_SUPPLEMENTARY_AUDIO => {
            let flags = c.next_byte()?;
            let mut d = SupplementaryAudioDescriptor {
                mix_type: flags & 0x80 != 0,
                editorial_classification: (flags >> 2) & 0x1F,
                language: None,
                private_data: Vec::new(),
            };
            if flags & 0x01 != 0 {
                d.language = Some(c.next_bytes(3)?.to_vec());
            }
            if c.offset() < offset_end {
                d.private_data = c.next_bytes(offset_end - c.offset())?.to_vec();
            }
            ExtensionPayload::SupplementaryAudio(d)
        }
        _ => ExtensionPayload::Unknown(c.next_bytes(offset_end - c.offset())?.to_vec()),
    };
    Ok(ExtensionDescriptor { tag, payload })
}

// Lenient on purpose: some streams encode a 2-byte language in a 3-byte body.
fn parse_iso639(c: &mut ByteCursor, offset_end: usize) -> Result<Iso639LanguageDescriptor> {
    let b = c.next_bytes(offset_end - c.offset())?;
    Ok(Iso639LanguageDescriptor {
        language: b[..b.len() - 1].to_vec(),
        audio_type: b[b.len() - 1],
    })
}

fn parse_local_time_offset(
    c: &mut ByteCursor,
    offset_end: usize,
) -> Result<Vec<LocalTimeOffsetItem>> {
    let mut items = Vec::new();
    while c.offset() < offset_end {
        let country_code = c.next_bytes(3)?.to_vec();
        let b = c.next_byte()?;
        items.push(LocalTimeOffsetItem {
            country_code,
            country_region_id: b >> 2,
            polarity: b & 0x01 != 0,
            local_time_offset: parse_dvb_duration_minutes(c)?,
            time_of_change: parse_dvb_time(c)?,
            next_time_offset: parse_dvb_duration_minutes(c)?,
        });
    }
    Ok(items)
}

fn parse_parental_rating(c: &mut ByteCursor, offset_end: usize) -> Result<Vec<ParentalRatingItem>> {
    let mut items = Vec::new();
    while c.offset() < offset_end {
        let b = c.next_bytes(4)?;
        items.push(ParentalRatingItem {
            country_code: b[..3].to_vec(),
            rating: b[3],
        });
    }
    Ok(items)
}

fn parse_registration(c: &mut ByteCursor, offset_end: usize) -> Result<RegistrationDescriptor> {
    let b = c.next_bytes(4)?;
    let mut d = RegistrationDescriptor {
        format_identifier: u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
        additional_identification_info: Vec::new(),
    };
    if c.offset() < offset_end {
        d.additional_identification_info = c.next_bytes(offset_end - c.offset())?.to_vec();
    }
    Ok(d)
}

fn parse_service(c: &mut ByteCursor) -> Result<ServiceDescriptor> {
    let service_type = c.next_byte()?;
    let provider_length = c.next_byte()? as usize;
    let provider = c.next_bytes(provider_length)?.to_vec();
    let name_length = c.next_byte()? as usize;
    let name = c.next_bytes(name_length)?.to_vec();
    Ok(ServiceDescriptor {
        service_type,
        provider,
        name,
    })
}

fn parse_short_event(c: &mut ByteCursor) -> Result<ShortEventDescriptor> {
    let language = c.next_bytes(3)?.to_vec();
    let name_length = c.next_byte()? as usize;
    let event_name = c.next_bytes(name_length)?.to_vec();
    let text_length = c.next_byte()? as usize;
    let text = c.next_bytes(text_length)?.to_vec();
    Ok(ShortEventDescriptor {
        language,
        event_name,
        text,
    })
}

fn parse_subtitling(c: &mut ByteCursor, offset_end: usize) -> Result<Vec<SubtitlingItem>> {
    let mut items = Vec::new();
    while c.offset() < offset_end {
        let language = c.next_bytes(3)?.to_vec();
        let subtitling_type = c.next_byte()?;
        let b = c.next_bytes(4)?;
        items.push(SubtitlingItem {
            language,
            subtitling_type,
            composition_page_id: (b[0] as u16) << 8 | b[1] as u16,
            ancillary_page_id: (b[2] as u16) << 8 | b[3] as u16,
        });
    }
    Ok(items)
}

fn parse_teletext(c: &mut ByteCursor, offset_end: usize) -> Result<Vec<TeletextItem>> {
    let mut items = Vec::new();
    while c.offset() < offset_end {
        let language = c.next_bytes(3)?.to_vec();
        let b = c.next_bytes(2)?;
        items.push(TeletextItem {
            language,
            teletext_type: b[0] >> 3,
            magazine: b[0] & 0x07,
            page: (b[1] >> 4) * 10 + (b[1] & 0x0F),
        });
    }
    Ok(items)
}

fn parse_vbi_data(c: &mut ByteCursor, offset_end: usize) -> Result<Vec<VbiDataService>> {
    let mut services = Vec::new();
    while c.offset() < offset_end {
        let data_service_id = c.next_byte()?;
        let data_length = c.next_byte()? as usize;
        let data_end = c.offset() + data_length;
        let mut items = Vec::new();
        match data_service_id {
            VBI_SERVICE_EBU_TELETEXT
            | VBI_SERVICE_INVERTED_TELETEXT
            | VBI_SERVICE_VPS
            | VBI_SERVICE_WSS
            | VBI_SERVICE_CLOSED_CAPTIONING
            | VBI_SERVICE_MONOCHROME_442 => {
                while c.offset() < data_end {
                    let b = c.next_byte()?;
                    items.push(VbiDataItem {
                        field_parity: b & 0x20 != 0,
                        line_offset: b & 0x1F,
                    });
                }
            }
            _ => c.seek(data_end),
        }
        services.push(VbiDataService {
            data_service_id,
            items,
        });
    }
    Ok(services)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn loop_bytes(body: &[u8]) -> Vec<u8> {
        let mut b = vec![0xF0 | (body.len() >> 8) as u8, body.len() as u8];
        b.extend_from_slice(body);
        b
    }

    fn parse_one(body: &[u8]) -> Descriptor {
        let buf = loop_bytes(body);
        let mut c = ByteCursor::new(&buf);
        let mut ds = parse_descriptors(&mut c).unwrap();
        assert_eq!(ds.len(), 1);
        ds.remove(0)
    }

    #[test]
    fn loop_length_is_authoritative() {
        // stream identifier, a user-defined tag, and an undecoded standard tag
        let body = [
            0x52, 0x01, 0x30, 0xFD, 0x03, 0x00, 0x08, 0x3D, 0x13, 0x04, 0x00, 0x00, 0x00, 0x01,
        ];
        let buf = loop_bytes(&body);
        let mut c = ByteCursor::new(&buf);
        let ds = parse_descriptors(&mut c).unwrap();
        assert_eq!(ds.len(), 3);
        let total: usize = ds.iter().map(|d| 2 + d.length as usize).sum();
        assert_eq!(total, body.len());
        assert_eq!(c.offset(), buf.len());

        assert_eq!(ds[0].payload, DescriptorPayload::StreamIdentifier(0x30));
        assert_eq!(
            ds[1].payload,
            DescriptorPayload::UserDefined(vec![0x00, 0x08, 0x3D])
        );
        assert_eq!(
            ds[2].payload,
            DescriptorPayload::Unknown(vec![0x00, 0x00, 0x00, 0x01])
        );
        // raw bytes retained verbatim on every descriptor
        assert_eq!(ds[2].raw, vec![0x00, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn writes_loop_back_byte_exact() {
        let body = [0x52, 0x01, 0x40, 0xFD, 0x02, 0x00, 0xA3];
        let buf = loop_bytes(&body);
        let mut c = ByteCursor::new(&buf);
        let ds = parse_descriptors(&mut c).unwrap();
        let mut out = Vec::new();
        write_descriptors(&ds, &mut out);
        assert_eq!(out, buf);
    }

    #[test]
    fn empty_loop_parses_and_writes() {
        let buf = loop_bytes(&[]);
        let mut c = ByteCursor::new(&buf);
        let ds = parse_descriptors(&mut c).unwrap();
        assert!(ds.is_empty());
        let mut out = Vec::new();
        write_descriptors(&ds, &mut out);
        assert_eq!(out, buf);
    }

    #[test]
    fn maximum_bitrate_scales_by_50() {
        let d = parse_one(&[TAG_MAXIMUM_BITRATE, 3, 0xC0 | 0x01, 0x00, 0x02]);
        assert_eq!(
            d.payload,
            DescriptorPayload::MaximumBitrate((0x010002) * 50)
        );
    }

    #[test]
    fn parental_rating_minimum_age() {
        let d = parse_one(&[
            TAG_PARENTAL_RATING,
            12,
            b'F', b'R', b'A', 0x00, // undefined
            b'F', b'R', b'A', 0x05, // age 8
            b'F', b'R', b'A', 0x2A, // user defined
        ]);
        let DescriptorPayload::ParentalRating(items) = &d.payload else {
            panic!("wrong payload");
        };
        let ages: Vec<u8> = items.iter().map(|i| i.minimum_age()).collect();
        assert_eq!(ages, vec![0, 8, 0]);
    }

    #[test]
    fn iso639_accepts_two_byte_language() {
        let d = parse_one(&[TAG_ISO639_LANGUAGE, 3, b'e', b'n', 0x03]);
        let DescriptorPayload::Iso639Language(lang) = &d.payload else {
            panic!("wrong payload");
        };
        assert_eq!(lang.language, b"en");
        assert_eq!(lang.audio_type, 3);
        assert_eq!(lang.language_code(), [b'e', b'n', 0]);

        let d = parse_one(&[TAG_ISO639_LANGUAGE, 4, b'e', b'n', b'g', 0x01]);
        let DescriptorPayload::Iso639Language(lang) = &d.payload else {
            panic!("wrong payload");
        };
        assert_eq!(lang.language_code(), *b"eng");
    }

    #[test]
    fn ac3_flags_gate_fields() {
        // component type + BSID present, trailing info bytes
        let d = parse_one(&[TAG_AC3, 4, 0xC0, 0x12, 0x08, 0x99]);
        assert_eq!(
            d.payload,
            DescriptorPayload::Ac3(Ac3Descriptor {
                component_type: Some(0x12),
                bsid: Some(0x08),
                main_id: None,
                asvc: None,
                additional_info: vec![0x99],
            })
        );
    }

    #[test]
    fn enhanced_ac3_substreams() {
        let d = parse_one(&[TAG_ENHANCED_AC3, 4, 0x0C, 0xAA, 0xBB, 0x01]);
        assert_eq!(
            d.payload,
            DescriptorPayload::EnhancedAc3(EnhancedAc3Descriptor {
                mix_info_exists: true,
                substream1: Some(0xAA),
                substream2: None,
                substream3: None,
                additional_info: vec![0xBB, 0x01],
                ..Default::default()
            })
        );
    }

    #[test]
    fn teletext_page_decodes_bcd() {
        let d = parse_one(&[
            TAG_TELETEXT,
            5,
            b'd', b'e', b'u',
            (0x02 << 3) | 0x03, // subtitle page, magazine 3
            0x88,               // page 88
        ]);
        let DescriptorPayload::Teletext(items) = &d.payload else {
            panic!("wrong payload");
        };
        assert_eq!(items[0].teletext_type, 0x02);
        assert_eq!(items[0].magazine, 3);
        assert_eq!(items[0].page, 88);
    }

    #[test]
    fn local_time_offset_items() {
        let mut body = vec![TAG_LOCAL_TIME_OFFSET, 13];
        body.extend_from_slice(b"GBR");
        body.push(0x02 << 2 | 0x01); // region 2, negative polarity
        body.extend_from_slice(&[0x01, 0x00]); // offset 1h
        body.extend_from_slice(&[0xE2, 0xC8, 0x21, 0x03, 0x54]);
        body.extend_from_slice(&[0x00, 0x30]); // next offset 30min
        let d = parse_one(&body);
        let DescriptorPayload::LocalTimeOffset(items) = &d.payload else {
            panic!("wrong payload");
        };
        let i = &items[0];
        assert_eq!(i.country_code, b"GBR");
        assert_eq!(i.country_region_id, 2);
        assert!(i.polarity);
        assert_eq!(i.local_time_offset, chrono::Duration::minutes(60));
        assert_eq!(
            i.time_of_change,
            Utc.with_ymd_and_hms(2017, 10, 30, 21, 3, 54).unwrap()
        );
        assert_eq!(i.next_time_offset, chrono::Duration::minutes(30));
    }

    #[test]
    fn service_and_events() {
        let d = parse_one(&[
            TAG_SERVICE,
            11,
            0x01,
            4, b'p', b'r', b'o', b'v',
            4, b'n', b'a', b'm', b'e',
        ]);
        assert_eq!(
            d.payload,
            DescriptorPayload::Service(ServiceDescriptor {
                service_type: 1,
                provider: b"prov".to_vec(),
                name: b"name".to_vec(),
            })
        );

        let d = parse_one(&[
            TAG_SHORT_EVENT,
            9,
            b'e', b'n', b'g',
            2, b'e', b'v',
            2, b't', b'x',
        ]);
        assert_eq!(
            d.payload,
            DescriptorPayload::ShortEvent(ShortEventDescriptor {
                language: b"eng".to_vec(),
                event_name: b"ev".to_vec(),
                text: b"tx".to_vec(),
            })
        );

        let d = parse_one(&[
            TAG_EXTENDED_EVENT,
            14,
            0x10, // number 1, last 0
            b'e', b'n', b'g',
            5, // items length
            1, b'd',
            2, b'c', b'c',
            3, b't', b'x', b't',
        ]);
        let DescriptorPayload::ExtendedEvent(ee) = &d.payload else {
            panic!("wrong payload");
        };
        assert_eq!(ee.number, 1);
        assert_eq!(ee.last_descriptor_number, 0);
        assert_eq!(ee.items.len(), 1);
        assert_eq!(ee.items[0].description, b"d");
        assert_eq!(ee.items[0].content, b"cc");
        assert_eq!(ee.text, b"txt");
    }

    #[test]
    fn subtitling_and_vbi() {
        let d = parse_one(&[
            TAG_SUBTITLING,
            8,
            b'f', b'r', b'a',
            0x10,
            0x00, 0x01,
            0x00, 0x02,
        ]);
        assert_eq!(
            d.payload,
            DescriptorPayload::Subtitling(vec![SubtitlingItem {
                language: b"fra".to_vec(),
                subtitling_type: 0x10,
                composition_page_id: 1,
                ancillary_page_id: 2,
            }])
        );

        // one teletext service with two line items, one unknown service skipped
        let d = parse_one(&[
            TAG_VBI_DATA,
            8,
            0x01, 2, 0x25, 0x06,
            0x03, 2, 0xAA, 0xBB,
        ]);
        let DescriptorPayload::VbiData(services) = &d.payload else {
            panic!("wrong payload");
        };
        assert_eq!(services.len(), 2);
        assert_eq!(
            services[0].items,
            vec![
                VbiDataItem {
                    field_parity: true,
                    line_offset: 5
                },
                VbiDataItem {
                    field_parity: false,
                    line_offset: 6
                },
            ]
        );
        assert!(services[1].items.is_empty());
    }

    #[test]
    fn extension_supplementary_audio() {
        let d = parse_one(&[
            TAG_EXTENSION,
            5,
            EXTENSION_TAG_SUPPLEMENTARY_AUDIO,
            0x81 | (0x05 << 2),
            b'e', b'n', b'g',
        ]);
        let DescriptorPayload::Extension(ext) = &d.payload else {
            panic!("wrong payload");
        };
        assert_eq!(ext.tag, EXTENSION_TAG_SUPPLEMENTARY_AUDIO);
        assert_eq!(
            ext.payload,
            ExtensionPayload::SupplementaryAudio(SupplementaryAudioDescriptor {
                mix_type: true,
                editorial_classification: 0x05,
                language: Some(b"eng".to_vec()),
                private_data: Vec::new(),
            })
        );
    }

    #[test]
    fn registration_and_alignment() {
        let d = parse_one(&[TAG_REGISTRATION, 6, b'C', b'U', b'E', b'I', 0x01, 0x02]);
        assert_eq!(
            d.payload,
            DescriptorPayload::Registration(RegistrationDescriptor {
                format_identifier: u32::from_be_bytes(*b"CUEI"),
                additional_identification_info: vec![0x01, 0x02],
            })
        );

        let d = parse_one(&[TAG_DATA_STREAM_ALIGNMENT, 1, 0x02]);
        assert_eq!(d.payload, DescriptorPayload::DataStreamAlignment(0x02));
    }

    #[test]
    fn avc_video_flags() {
        let d = parse_one(&[TAG_AVC_VIDEO, 4, 0x64, 0xC0 | 0x03, 0x28, 0x80]);
        assert_eq!(
            d.payload,
            DescriptorPayload::AvcVideo(AvcVideoDescriptor {
                profile_idc: 100,
                constraint_set0_flag: true,
                constraint_set1_flag: true,
                constraint_set2_flag: false,
                compatible_flags: 3,
                level_idc: 40,
                avc_still_present: true,
                avc_24_hour_picture: false,
            })
        );
    }

    #[test]
    fn truncated_variant_is_a_short_read() {
        // component descriptor cut short at the end of the loop
        let body = [0x52, 0x01, 0x07, 0x50, 0x02, 0x01, 0x02];
        let buf = loop_bytes(&body);
        let mut c = ByteCursor::new(&buf);
        assert!(matches!(
            parse_descriptors(&mut c),
            Err(crate::errors::DemuxError::ShortRead { .. })
        ));
    }

    #[test]
    fn content_items() {
        let d = parse_one(&[TAG_CONTENT, 4, 0x12, 0x00, 0x34, 0x56]);
        assert_eq!(
            d.payload,
            DescriptorPayload::Content(vec![
                ContentItem {
                    nibble_level_1: 1,
                    nibble_level_2: 2,
                    user_byte: 0
                },
                ContentItem {
                    nibble_level_1: 3,
                    nibble_level_2: 4,
                    user_byte: 0x56
                },
            ])
        );
    }
}
