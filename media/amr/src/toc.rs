use crate::{AmrPayloadFormat, FrameType};

const CONTINUATION_BIT: u8 = 1 << 7;
const QUALITY_BIT: u8 = 1 << 2;
const FRAME_TYPE_SHIFT: u8 = 3;

/// Single entry of the payload's table of contents
///
/// ```text
///  0 1 2 3 4 5 6 7
/// +-+-+-+-+-+-+-+-+
/// |F|  FT   |Q|P|P|
/// +-+-+-+-+-+-+-+-+
/// ```
///
/// In bandwidth-efficient mode the two padding bits are omitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TocEntry {
    pub frame_type: FrameType,
    /// Frame is not damaged
    pub quality: bool,
    /// Another entry follows this one
    pub continuation: bool,
}

impl TocEntry {
    pub fn from_octet(octet: u8) -> Self {
        Self {
            frame_type: FrameType::from_bits(octet >> FRAME_TYPE_SHIFT),
            quality: octet & QUALITY_BIT != 0,
            continuation: octet & CONTINUATION_BIT != 0,
        }
    }

    /// Serialize the entry into an octet, the reserved bits are always zero
    pub fn to_octet(self) -> u8 {
        let mut octet = self.frame_type.to_bits() << FRAME_TYPE_SHIFT;

        if self.continuation {
            octet |= CONTINUATION_BIT;
        }

        if self.quality {
            octet |= QUALITY_BIT;
        }

        octet
    }

    /// Read the entry from the lowest `format.toc_bits()` bits of `value`
    pub(crate) fn from_field(format: AmrPayloadFormat, value: u8) -> Self {
        match format {
            AmrPayloadFormat::OctetAligned => Self::from_octet(value),
            AmrPayloadFormat::BandwidthEfficient => Self::from_octet(value << 2),
        }
    }

    /// Inverse of [`TocEntry::from_field`]
    pub(crate) fn to_field(self, format: AmrPayloadFormat) -> u8 {
        match format {
            AmrPayloadFormat::OctetAligned => self.to_octet(),
            AmrPayloadFormat::BandwidthEfficient => self.to_octet() >> 2,
        }
    }

    /// Number of speech bits following in the payload for this entry
    ///
    /// Comfort noise and no data frames don't carry any speech bits.
    pub fn speech_bits(&self, format: AmrPayloadFormat) -> usize {
        self.frame_type
            .mode()
            .map(|mode| format.speech_bits(mode.frame_bits()))
            .unwrap_or(0)
    }
}
