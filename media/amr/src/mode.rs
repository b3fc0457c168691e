use std::fmt;

/// Number of speech bits per frame for each AMR narrowband mode
///
/// Taken from Table 2 of 3GPP TS 26.101.
const FRAME_BITS: [usize; 8] = [95, 103, 118, 134, 148, 159, 204, 244];

/// AMR narrowband codec mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AmrMode {
    /// 4.75 kbit/s
    Mode475 = 0,
    /// 5.15 kbit/s
    Mode515 = 1,
    /// 5.90 kbit/s
    Mode590 = 2,
    /// 6.70 kbit/s
    Mode670 = 3,
    /// 7.40 kbit/s
    Mode740 = 4,
    /// 7.95 kbit/s
    Mode795 = 5,
    /// 10.2 kbit/s
    Mode1020 = 6,
    /// 12.2 kbit/s
    Mode1220 = 7,
}

impl AmrMode {
    pub const ALL: [AmrMode; 8] = [
        AmrMode::Mode475,
        AmrMode::Mode515,
        AmrMode::Mode590,
        AmrMode::Mode670,
        AmrMode::Mode740,
        AmrMode::Mode795,
        AmrMode::Mode1020,
        AmrMode::Mode1220,
    ];

    /// Returns the mode for the given index, `None` for anything that isn't a speech mode (8 and above)
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(usize::from(index)).copied()
    }

    pub fn index(self) -> u8 {
        self as u8
    }

    /// Number of speech bits in a single frame of this mode
    pub fn frame_bits(self) -> usize {
        FRAME_BITS[self as usize]
    }

    /// Number of bytes required to hold a single frame of this mode
    pub fn frame_bytes(self) -> usize {
        self.frame_bits().div_ceil(8)
    }

    /// Bitrate in bit/s
    pub fn bitrate(self) -> u32 {
        match self {
            AmrMode::Mode475 => 4750,
            AmrMode::Mode515 => 5150,
            AmrMode::Mode590 => 5900,
            AmrMode::Mode670 => 6700,
            AmrMode::Mode740 => 7400,
            AmrMode::Mode795 => 7950,
            AmrMode::Mode1020 => 10200,
            AmrMode::Mode1220 => 12200,
        }
    }
}

impl fmt::Display for AmrMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bitrate = self.bitrate();
        write!(f, "AMR {}.{:02} kbit/s", bitrate / 1000, (bitrate % 1000) / 10)
    }
}

/// Frame type field of a table of contents entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// Speech frame of the given mode
    Speech(AmrMode),
    /// AMR comfort noise frame
    Sid,
    /// GSM-EFR comfort noise frame
    GsmEfrSid,
    /// TDMA-EFR comfort noise frame
    TdmaEfrSid,
    /// PDC-EFR comfort noise frame
    PdcEfrSid,
    /// Frame types 12 to 14, reserved for future use
    Reserved(ReservedFrameType),
    /// No data is transmitted for this frame
    NoData,
}

impl FrameType {
    pub const NO_DATA_BITS: u8 = 15;

    /// Interpret the low 4 bits of `bits` as frame type
    pub fn from_bits(bits: u8) -> Self {
        let bits = bits & 0x0F;

        if let Some(mode) = AmrMode::from_index(bits) {
            return FrameType::Speech(mode);
        }

        match bits {
            8 => FrameType::Sid,
            9 => FrameType::GsmEfrSid,
            10 => FrameType::TdmaEfrSid,
            11 => FrameType::PdcEfrSid,
            Self::NO_DATA_BITS => FrameType::NoData,
            reserved => FrameType::Reserved(ReservedFrameType(reserved)),
        }
    }

    pub fn to_bits(self) -> u8 {
        match self {
            FrameType::Speech(mode) => mode.index(),
            FrameType::Sid => 8,
            FrameType::GsmEfrSid => 9,
            FrameType::TdmaEfrSid => 10,
            FrameType::PdcEfrSid => 11,
            FrameType::Reserved(reserved) => reserved.bits(),
            FrameType::NoData => Self::NO_DATA_BITS,
        }
    }

    /// Returns the speech mode if this frame carries speech data
    pub fn mode(self) -> Option<AmrMode> {
        match self {
            FrameType::Speech(mode) => Some(mode),
            _ => None,
        }
    }
}

/// Frame type value in the reserved range 12..=14
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReservedFrameType(u8);

impl ReservedFrameType {
    pub fn new(bits: u8) -> Option<Self> {
        (12..=14).contains(&bits).then_some(Self(bits))
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl From<AmrMode> for FrameType {
    fn from(mode: AmrMode) -> Self {
        FrameType::Speech(mode)
    }
}

/// Codec Mode Request
///
/// Tells the remote encoder which mode it should use for the next frames it sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cmr(u8);

impl Cmr {
    /// No mode request present
    pub const NO_REQUEST: Cmr = Cmr(15);

    pub fn from_bits(bits: u8) -> Self {
        Cmr(bits & 0x0F)
    }

    pub fn to_bits(self) -> u8 {
        self.0
    }

    /// The requested mode, `None` if no (valid) mode is requested
    pub fn requested_mode(self) -> Option<AmrMode> {
        AmrMode::from_index(self.0)
    }
}

impl Default for Cmr {
    fn default() -> Self {
        Cmr::NO_REQUEST
    }
}

impl From<AmrMode> for Cmr {
    fn from(mode: AmrMode) -> Self {
        Cmr(mode.index())
    }
}
