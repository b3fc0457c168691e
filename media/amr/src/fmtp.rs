use crate::AmrMode;
use std::{fmt, num::ParseIntError, str::FromStr};

/// Framing variant of the AMR RTP payload
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmrPayloadFormat {
    /// Fields are packed back to back without any alignment, only the end of
    /// the payload is padded to a whole octet.
    #[default]
    BandwidthEfficient = 0,

    /// CMR, every table of contents entry and every speech frame are padded to whole octets.
    OctetAligned = 1,
}

impl AmrPayloadFormat {
    /// Size of the codec mode request field in bits
    pub fn cmr_bits(self) -> usize {
        match self {
            AmrPayloadFormat::BandwidthEfficient => 4,
            AmrPayloadFormat::OctetAligned => 8,
        }
    }

    /// Size of a single table of contents entry in bits
    pub fn toc_bits(self) -> usize {
        match self {
            AmrPayloadFormat::BandwidthEfficient => 6,
            AmrPayloadFormat::OctetAligned => 8,
        }
    }

    /// Number of payload bits occupied by a speech frame with `frame_bits` bits
    pub fn speech_bits(self, frame_bits: usize) -> usize {
        match self {
            AmrPayloadFormat::BandwidthEfficient => frame_bits,
            AmrPayloadFormat::OctetAligned => frame_bits.next_multiple_of(8),
        }
    }
}

/// Set of allowed AMR modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeSet(u8);

impl ModeSet {
    pub const ALL: ModeSet = ModeSet(0xFF);

    pub fn empty() -> Self {
        ModeSet(0)
    }

    pub fn insert(&mut self, mode: AmrMode) {
        self.0 |= 1 << mode.index();
    }

    pub fn contains(&self, mode: AmrMode) -> bool {
        self.0 & (1 << mode.index()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = AmrMode> + '_ {
        AmrMode::ALL.into_iter().filter(|mode| self.contains(*mode))
    }
}

impl Default for ModeSet {
    fn default() -> Self {
        Self::ALL
    }
}

impl FromIterator<AmrMode> for ModeSet {
    fn from_iter<T: IntoIterator<Item = AmrMode>>(iter: T) -> Self {
        let mut set = ModeSet::empty();
        for mode in iter {
            set.insert(mode);
        }
        set
    }
}

impl fmt::Display for ModeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, mode) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }

            write!(f, "{}", mode.index())?;
        }

        Ok(())
    }
}

/// Failed to parse AMR fmtp line
#[derive(Debug, thiserror::Error)]
pub enum ParseAmrFmtpOptionsError {
    #[error("encountered non integer value {0}")]
    InvalidValue(#[from] ParseIntError),
    #[error("mode-set contains invalid mode {0}")]
    InvalidMode(u8),
}

/// AMR specific format parameters used in SDP negotiation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AmrFmtpOptions {
    /// Use the octet-aligned payload format instead of the bandwidth-efficient one
    pub octet_align: bool,
    /// Restricts the modes the encoder may use, `None` allows all modes
    pub mode_set: Option<ModeSet>,
    /// Number of frame blocks between mode changes (1 or 2)
    pub mode_change_period: Option<u32>,
    /// Whether the sender can restrict mode changes to the given period
    pub mode_change_capability: Option<u32>,
    /// Mode changes are restricted to neighboring modes in the mode set
    pub mode_change_neighbor: bool,
    /// Frame CRCs are included in the payload
    pub crc: bool,
    /// Robust payload sorting is used
    pub robust_sorting: bool,
    /// Frame-block interleaving with the given maximum number of frame blocks
    pub interleaving: Option<u32>,
    /// Maximum redundancy in milliseconds
    pub max_red: Option<u32>,
}

impl AmrFmtpOptions {
    pub fn payload_format(&self) -> AmrPayloadFormat {
        if self.octet_align {
            AmrPayloadFormat::OctetAligned
        } else {
            AmrPayloadFormat::BandwidthEfficient
        }
    }

    /// Returns if the negotiated mode set allows the given mode
    pub fn allows_mode(&self, mode: AmrMode) -> bool {
        self.mode_set.unwrap_or_default().contains(mode)
    }

    /// Returns the name of the first negotiated option this crate cannot frame
    pub fn unsupported_option(&self) -> Option<&'static str> {
        if self.crc {
            Some("crc")
        } else if self.robust_sorting {
            Some("robust-sorting")
        } else if self.interleaving.is_some() {
            Some("interleaving")
        } else {
            None
        }
    }
}

fn parse_mode_set(value: &str) -> Result<ModeSet, ParseAmrFmtpOptionsError> {
    let mut set = ModeSet::empty();

    for index in value.split(',').map(str::trim) {
        let index = index.parse::<u8>()?;
        let mode = AmrMode::from_index(index).ok_or(ParseAmrFmtpOptionsError::InvalidMode(index))?;
        set.insert(mode);
    }

    Ok(set)
}

impl FromStr for AmrFmtpOptions {
    type Err = ParseAmrFmtpOptionsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut options = Self::default();

        for (key, value) in s.split(';').filter_map(|e| e.split_once('=')) {
            let value = value.trim();
            match key.trim() {
                "octet-align" => options.octet_align = value == "1",
                "mode-set" => options.mode_set = Some(parse_mode_set(value)?),
                "mode-change-period" => options.mode_change_period = Some(value.parse()?),
                "mode-change-capability" => options.mode_change_capability = Some(value.parse()?),
                "mode-change-neighbor" => options.mode_change_neighbor = value == "1",
                "crc" => options.crc = value == "1",
                "robust-sorting" => options.robust_sorting = value == "1",
                "interleaving" => options.interleaving = Some(value.parse()?),
                "max-red" => options.max_red = Some(value.parse()?),
                _ => continue,
            }
        }

        Ok(options)
    }
}

impl fmt::Display for AmrFmtpOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            octet_align,
            mode_set,
            mode_change_period,
            mode_change_capability,
            mode_change_neighbor,
            crc,
            robust_sorting,
            interleaving,
            max_red,
        } = self;

        write!(f, "octet-align={}", u8::from(*octet_align))?;

        if let Some(mode_set) = mode_set {
            write!(f, ";mode-set={mode_set}")?;
        }

        if let Some(mode_change_period) = mode_change_period {
            write!(f, ";mode-change-period={mode_change_period}")?;
        }

        if let Some(mode_change_capability) = mode_change_capability {
            write!(f, ";mode-change-capability={mode_change_capability}")?;
        }

        if *mode_change_neighbor {
            write!(f, ";mode-change-neighbor=1")?;
        }

        if *crc {
            write!(f, ";crc=1")?;
        }

        if *robust_sorting {
            write!(f, ";robust-sorting=1")?;
        }

        if let Some(interleaving) = interleaving {
            write!(f, ";interleaving={interleaving}")?;
        }

        if let Some(max_red) = max_red {
            write!(f, ";max-red={max_red}")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_typical_line() {
        let options: AmrFmtpOptions = "octet-align=1; mode-set=0,2,5,7; mode-change-period=2"
            .parse()
            .unwrap();

        assert!(options.octet_align);
        assert_eq!(options.payload_format(), AmrPayloadFormat::OctetAligned);
        assert_eq!(options.mode_change_period, Some(2));

        let modes: Vec<_> = options.mode_set.unwrap().iter().collect();
        assert_eq!(
            modes,
            [
                AmrMode::Mode475,
                AmrMode::Mode590,
                AmrMode::Mode795,
                AmrMode::Mode1220
            ]
        );

        assert!(options.allows_mode(AmrMode::Mode590));
        assert!(!options.allows_mode(AmrMode::Mode515));
        assert_eq!(options.unsupported_option(), None);
    }

    #[test]
    fn defaults() {
        let options: AmrFmtpOptions = "".parse().unwrap();

        assert_eq!(options.payload_format(), AmrPayloadFormat::BandwidthEfficient);
        assert!(AmrMode::ALL.iter().all(|mode| options.allows_mode(*mode)));
    }

    #[test]
    fn display_round_trip() {
        let line = "octet-align=1;mode-set=0,7;mode-change-neighbor=1;max-red=0";
        let options: AmrFmtpOptions = line.parse().unwrap();

        assert_eq!(options.to_string(), line);
    }

    #[test]
    fn reject_invalid_mode_set() {
        assert!(matches!(
            "mode-set=1,8".parse::<AmrFmtpOptions>(),
            Err(ParseAmrFmtpOptionsError::InvalidMode(8))
        ));
        assert!(matches!(
            "mode-set=a".parse::<AmrFmtpOptions>(),
            Err(ParseAmrFmtpOptionsError::InvalidValue(_))
        ));
    }

    #[test]
    fn unsupported_options() {
        let options: AmrFmtpOptions = "octet-align=1;crc=1".parse().unwrap();
        assert_eq!(options.unsupported_option(), Some("crc"));

        let options: AmrFmtpOptions = "octet-align=1;interleaving=4".parse().unwrap();
        assert_eq!(options.unsupported_option(), Some("interleaving"));
    }
}
