use crate::{
    AmrMode, AmrPayloadFormat, BitCursor, BitCursorError, Cmr, FrameCodecError, FrameType,
    TocEntry,
};
use bytes::Bytes;
use std::{borrow::Cow, slice};

/// Compressed speech frame as produced by an AMR encoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechFrame {
    /// Mode index reported by the encoder, only 0..=7 can be put into a payload
    pub mode_index: u8,
    /// Frame is not damaged
    pub quality: bool,
    /// Speech bits, MSB first. Must hold at least the mode's frame bits.
    pub bits: Bytes,
}

impl SpeechFrame {
    pub fn new(mode: AmrMode, quality: bool, bits: impl Into<Bytes>) -> Self {
        Self {
            mode_index: mode.index(),
            quality,
            bits: bits.into(),
        }
    }

    pub fn mode(&self) -> Option<AmrMode> {
        AmrMode::from_index(self.mode_index)
    }

    fn checked_mode(&self) -> Result<AmrMode, AmrPayloadError> {
        let mode = self
            .mode()
            .ok_or(AmrPayloadError::InvalidModeIndex(self.mode_index))?;

        if self.bits.len() * 8 < mode.frame_bits() {
            return Err(AmrPayloadError::InvalidSpeechLength {
                mode,
                expected: mode.frame_bits(),
                actual: self.bits.len() * 8,
            });
        }

        Ok(mode)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AmrPayloadError {
    #[error("codec handle is not initialized or was already destroyed")]
    UninitializedCodec,
    #[error("cannot create a payload without any frames")]
    NoFrames,
    #[error("invalid mode index {0}, only 0..=7 can be sent")]
    InvalidModeIndex(u8),
    #[error("{0} is not part of the negotiated mode-set")]
    ModeNotAllowed(AmrMode),
    #[error("speech frame for {mode} must hold {expected} bits, got {actual}")]
    InvalidSpeechLength {
        mode: AmrMode,
        expected: usize,
        actual: usize,
    },
    #[error("got {0} samples which is not a multiple of the frame size")]
    InvalidPcmLength(usize),
    #[error("octet-aligned payload requires {0} bits of padding")]
    PaddingInconsistency(usize),
    #[error("payload requires {required} bytes, but the output buffer only holds {available}")]
    BufferTooSmall { required: usize, available: usize },
    #[error(transparent)]
    BitCursor(#[from] BitCursorError),
    #[error("frame codec failed to encode")]
    Codec(#[source] FrameCodecError),
}

/// Packs AMR speech frames into RTP payloads
#[derive(Debug, Clone, Copy)]
pub struct AmrPayloader {
    format: AmrPayloadFormat,
}

impl AmrPayloader {
    pub fn new(format: AmrPayloadFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> AmrPayloadFormat {
        self.format
    }

    /// Returns the exact length in bytes of the payload containing the given frames
    pub fn required_len(&self, frames: &[SpeechFrame]) -> Result<usize, AmrPayloadError> {
        if frames.is_empty() {
            return Err(AmrPayloadError::NoFrames);
        }

        let format = self.format;
        let mut bits = format.cmr_bits() + frames.len() * format.toc_bits();

        for frame in frames {
            bits += format.speech_bits(frame.checked_mode()?.frame_bits());
        }

        let padding = (8 - bits % 8) % 8;

        // Every field is rounded up to octets, anything left over is a framing defect
        if format == AmrPayloadFormat::OctetAligned && padding != 0 {
            return Err(AmrPayloadError::PaddingInconsistency(padding));
        }

        Ok((bits + padding) / 8)
    }

    /// Write a payload containing the CMR and all `frames` into `out`
    ///
    /// Returns the length of the payload. Nothing is written if `out` is too small.
    pub fn payload(
        &self,
        cmr: Cmr,
        frames: &[SpeechFrame],
        out: &mut [u8],
    ) -> Result<usize, AmrPayloadError> {
        let required = self.required_len(frames)?;

        if out.len() < required {
            return Err(AmrPayloadError::BufferTooSmall {
                required,
                available: out.len(),
            });
        }

        let format = self.format;
        let mut cursor = BitCursor::new(&mut out[..required]);

        cursor.write_value(u64::from(cmr.to_bits()), 4)?;

        if format == AmrPayloadFormat::OctetAligned {
            // reserved bits after the CMR
            cursor.write_value(0, 4)?;
        }

        for (i, frame) in frames.iter().enumerate() {
            let entry = TocEntry {
                frame_type: FrameType::Speech(frame.checked_mode()?),
                quality: frame.quality,
                continuation: i + 1 < frames.len(),
            };

            cursor.write_value(u64::from(entry.to_field(format)), format.toc_bits())?;
        }

        for frame in frames {
            let mode = frame.checked_mode()?;

            cursor.write_bits(&frame.bits, mode.frame_bits())?;

            if format == AmrPayloadFormat::OctetAligned {
                cursor.align_to_byte()?;
            }
        }

        let padding = cursor.align_to_byte()?;

        if format == AmrPayloadFormat::OctetAligned && padding != 0 {
            return Err(AmrPayloadError::PaddingInconsistency(padding));
        }

        debug_assert_eq!(cursor.byte_len(), required);

        Ok(cursor.byte_len())
    }

    /// Same as [`AmrPayloader::payload`] but allocates the output
    pub fn payload_to_bytes(
        &self,
        cmr: Cmr,
        frames: &[SpeechFrame],
    ) -> Result<Bytes, AmrPayloadError> {
        let mut out = vec![0u8; self.required_len(frames)?];
        let len = self.payload(cmr, frames, &mut out)?;
        out.truncate(len);

        Ok(out.into())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AmrDePayloadError {
    #[error("codec handle is not initialized or was already destroyed")]
    UninitializedCodec,
    #[error("payload is empty")]
    EmptyPayload,
    #[error("table of contents is not terminated before the end of the payload")]
    MalformedPayload,
    #[error("frame {frame} requires {required} speech bits, but only {remaining} bits are left")]
    TruncatedPayload {
        frame: usize,
        required: usize,
        remaining: usize,
    },
    #[error("frame codec failed to decode")]
    Codec(#[source] FrameCodecError),
}

/// Parses AMR RTP payloads into their table of contents and speech frames
#[derive(Debug, Clone, Copy)]
pub struct AmrDePayloader {
    format: AmrPayloadFormat,
}

impl AmrDePayloader {
    pub fn new(format: AmrPayloadFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> AmrPayloadFormat {
        self.format
    }

    /// Parse the CMR and table of contents of `payload`
    ///
    /// Speech frames are extracted lazily using [`AmrPayload::frames`].
    pub fn parse<'a>(&self, payload: &'a [u8]) -> Result<AmrPayload<'a>, AmrDePayloadError> {
        let format = self.format;

        if payload.is_empty() {
            return Err(AmrDePayloadError::EmptyPayload);
        }

        let mut cursor = BitCursor::new(payload);

        let cmr = cursor
            .read_value(4)
            .map_err(|_| AmrDePayloadError::EmptyPayload)?;
        let cmr = Cmr::from_bits(cmr as u8);

        cursor
            .skip_bits(format.cmr_bits() - 4)
            .map_err(|_| AmrDePayloadError::MalformedPayload)?;

        let mut toc = Vec::new();

        loop {
            let Ok(field) = cursor.read_value(format.toc_bits()) else {
                log::debug!(
                    "AMR payload ended after {} table of contents entries without a terminating entry",
                    toc.len()
                );
                return Err(AmrDePayloadError::MalformedPayload);
            };

            let entry = TocEntry::from_field(format, field as u8);
            log::trace!("table of contents entry {}: {entry:?}", toc.len());

            toc.push(entry);

            if !entry.continuation {
                break;
            }
        }

        Ok(AmrPayload {
            format,
            cmr,
            toc,
            data: payload,
            speech_start: cursor.bit_position(),
        })
    }
}

/// Parsed AMR RTP payload
#[derive(Debug)]
pub struct AmrPayload<'a> {
    format: AmrPayloadFormat,
    cmr: Cmr,
    toc: Vec<TocEntry>,
    data: &'a [u8],
    speech_start: usize,
}

impl<'a> AmrPayload<'a> {
    pub fn format(&self) -> AmrPayloadFormat {
        self.format
    }

    /// The codec mode request of the sender
    pub fn cmr(&self) -> Cmr {
        self.cmr
    }

    /// All table of contents entries in payload order
    pub fn toc(&self) -> &[TocEntry] {
        &self.toc
    }

    /// Number of bits required to hold the speech data of all frames
    pub fn speech_bits(&self) -> usize {
        self.toc
            .iter()
            .map(|entry| entry.speech_bits(self.format))
            .sum()
    }

    /// Iterate over all frames in the payload
    ///
    /// Yields [`AmrDePayloadError::TruncatedPayload`] once for the first frame
    /// whose speech data exceeds the payload and stops afterwards.
    pub fn frames(&self) -> Frames<'a, '_> {
        Frames {
            format: self.format,
            cursor: BitCursor::at(self.data, self.speech_start),
            entries: self.toc.iter().enumerate(),
            truncated: false,
        }
    }
}

/// A single frame of an [`AmrPayload`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadFrame<'a> {
    pub entry: TocEntry,
    /// Speech bits MSB first, `None` for frames that don't carry any speech data
    ///
    /// Borrowed from the payload if the speech data is octet-aligned.
    pub speech: Option<Cow<'a, [u8]>>,
}

/// Iterator over the frames of an [`AmrPayload`]
pub struct Frames<'a, 'p> {
    format: AmrPayloadFormat,
    cursor: BitCursor<&'a [u8]>,
    entries: std::iter::Enumerate<slice::Iter<'p, TocEntry>>,
    truncated: bool,
}

impl<'a> Frames<'a, '_> {
    fn read_speech(&mut self, bits: usize) -> Result<Cow<'a, [u8]>, BitCursorError> {
        if bits % 8 == 0 && self.cursor.is_byte_aligned() {
            return self.cursor.read_aligned_slice(bits / 8).map(Cow::Borrowed);
        }

        let mut speech = vec![0u8; bits.div_ceil(8)];
        self.cursor.read_bits(bits, &mut speech)?;

        Ok(Cow::Owned(speech))
    }
}

impl<'a> Iterator for Frames<'a, '_> {
    type Item = Result<PayloadFrame<'a>, AmrDePayloadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.truncated {
            return None;
        }

        let (index, entry) = self.entries.next()?;
        let entry = *entry;

        let bits = entry.speech_bits(self.format);
        if bits == 0 {
            return Some(Ok(PayloadFrame {
                entry,
                speech: None,
            }));
        }

        let remaining = self.cursor.remaining_bits();

        match self.read_speech(bits) {
            Ok(speech) => Some(Ok(PayloadFrame {
                entry,
                speech: Some(speech),
            })),
            Err(_) => {
                log::debug!(
                    "AMR payload truncated at frame {index}, {bits} bits required, {remaining} left"
                );

                self.truncated = true;

                Some(Err(AmrDePayloadError::TruncatedPayload {
                    frame: index,
                    required: bits,
                    remaining,
                }))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn frame(mode: AmrMode, fill: u8) -> SpeechFrame {
        let mut bits = vec![fill; mode.frame_bytes()];
        let unused = mode.frame_bytes() * 8 - mode.frame_bits();
        if let Some(last) = bits.last_mut() {
            *last &= 0xFFu8.checked_shl(unused as u32).unwrap_or(0);
        }

        SpeechFrame::new(mode, true, bits)
    }

    #[test]
    fn single_frame_mode_7() {
        let payloader = AmrPayloader::new(AmrPayloadFormat::OctetAligned);
        let frames = [frame(AmrMode::Mode1220, 0xAB)];

        let mut out = [0u8; 64];
        let len = payloader.payload(Cmr::NO_REQUEST, &frames, &mut out).unwrap();

        assert_eq!(len, 33);
        assert_eq!(out[0], 0xF0);
        assert_eq!(out[1], 0b0_0111_1_00);
        assert_eq!(&out[2..32], &[0xAB; 30]);
        assert_eq!(out[32], 0xA0);
    }

    #[test]
    fn two_frames_continuation() {
        let payloader = AmrPayloader::new(AmrPayloadFormat::OctetAligned);
        let frames = [frame(AmrMode::Mode475, 0xFF), frame(AmrMode::Mode590, 0xFF)];

        let payload = payloader
            .payload_to_bytes(Cmr::from(AmrMode::Mode670), &frames)
            .unwrap();

        // CMR + 2 TOC + 12 + 15
        assert_eq!(payload.len(), 1 + 2 + 12 + 15);
        assert_eq!(payload[0], 0x30);
        assert_eq!(payload[1], 0b1_0000_1_00);
        assert_eq!(payload[2], 0b0_0010_1_00);

        // 95 bits of mode 0 leave a single zero bit in the last byte
        assert_eq!(payload[14], 0xFE);
        // 118 bits of mode 2 leave two zero bits
        assert_eq!(payload[29], 0xFC);

        let parsed = AmrDePayloader::new(AmrPayloadFormat::OctetAligned)
            .parse(&payload)
            .unwrap();

        assert_eq!(parsed.cmr(), Cmr::from(AmrMode::Mode670));
        assert_eq!(parsed.toc().len(), 2);
        assert!(parsed.toc()[0].continuation);
        assert!(!parsed.toc()[1].continuation);

        let speech: Vec<_> = parsed.frames().map(|f| f.unwrap().speech.unwrap()).collect();
        assert_eq!(speech[0].len(), 12);
        assert_eq!(speech[1].len(), 15);
        assert!(matches!(speech[0], Cow::Borrowed(_)));
    }

    #[test]
    fn unused_bits_are_cleared() {
        let frames = [
            SpeechFrame::new(AmrMode::Mode475, true, vec![0xFF; 12]),
            SpeechFrame::new(AmrMode::Mode590, true, vec![0xFF; 15]),
        ];

        for format in [AmrPayloadFormat::OctetAligned, AmrPayloadFormat::BandwidthEfficient] {
            let payloader = AmrPayloader::new(format);

            let mut zeroed = [0x00u8; 64];
            let mut dirty = [0xFFu8; 64];

            let len = payloader.payload(Cmr::NO_REQUEST, &frames, &mut zeroed).unwrap();
            assert_eq!(payloader.payload(Cmr::NO_REQUEST, &frames, &mut dirty).unwrap(), len);
            assert_eq!(&dirty[..len], &zeroed[..len], "{format:?}");

            if format == AmrPayloadFormat::OctetAligned {
                assert_eq!(dirty[0], 0xF0);
                assert_eq!(dirty[1] & 0b11, 0);
                assert_eq!(dirty[2] & 0b11, 0);
                assert_eq!(dirty[14], 0xFE);
                assert_eq!(dirty[len - 1], 0xFC);
            } else {
                // 4 + 2 * 6 + 95 + 118 = 229 bits, 3 bits padding
                assert_eq!(len, 29);
                assert_eq!(dirty[len - 1], 0b1111_1000);
            }
        }
    }

    #[test]
    fn padding_invariant_octet_aligned() {
        let payloader = AmrPayloader::new(AmrPayloadFormat::OctetAligned);

        for a in AmrMode::ALL {
            for b in AmrMode::ALL {
                let frames = [frame(a, 0x55), frame(b, 0x33)];
                let len = payloader.required_len(&frames).unwrap();

                let bits = 8 + 2 * 8 + a.frame_bits().next_multiple_of(8) + b.frame_bits().next_multiple_of(8);
                assert_eq!(bits % 8, 0);
                assert_eq!(len, bits / 8);
            }
        }
    }

    #[test]
    fn bandwidth_efficient_layout() {
        let payloader = AmrPayloader::new(AmrPayloadFormat::BandwidthEfficient);
        let frames = [frame(AmrMode::Mode1220, 0xFF)];

        let payload = payloader.payload_to_bytes(Cmr::NO_REQUEST, &frames).unwrap();

        // 4 + 6 + 244 = 254 bits, 2 padding bits
        assert_eq!(payload.len(), 32);
        // CMR 1111, F=0, FT=0111 starts in the low nibble
        assert_eq!(payload[0], 0b1111_0011);
        // FT continued, Q=1, then 6 speech bits
        assert_eq!(payload[1], 0b1_1_111111);
        assert_eq!(payload[31], 0b1111_1100);

        let parsed = AmrDePayloader::new(AmrPayloadFormat::BandwidthEfficient)
            .parse(&payload)
            .unwrap();
        let frames: Vec<_> = parsed.frames().collect::<Result<_, _>>().unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(
            frames[0].entry.frame_type,
            FrameType::Speech(AmrMode::Mode1220)
        );
        assert_eq!(frames[0].speech.as_deref(), Some(&payload_frame_bits(244)[..]));
    }

    fn payload_frame_bits(bits: usize) -> Vec<u8> {
        let mut out = vec![0xFF; bits.div_ceil(8)];
        if bits % 8 != 0 {
            let last = out.len() - 1;
            out[last] = 0xFF << (8 - bits % 8);
        }
        out
    }

    #[test]
    fn reject_invalid_mode() {
        let payloader = AmrPayloader::new(AmrPayloadFormat::OctetAligned);
        let frames = [SpeechFrame {
            mode_index: 8,
            quality: true,
            bits: Bytes::from_static(&[0; 5]),
        }];

        let mut out = [0u8; 64];
        assert!(matches!(
            payloader.payload(Cmr::NO_REQUEST, &frames, &mut out),
            Err(AmrPayloadError::InvalidModeIndex(8))
        ));
    }

    #[test]
    fn reject_short_speech() {
        let payloader = AmrPayloader::new(AmrPayloadFormat::OctetAligned);
        let frames = [SpeechFrame::new(AmrMode::Mode475, true, vec![0; 11])];

        assert!(matches!(
            payloader.required_len(&frames),
            Err(AmrPayloadError::InvalidSpeechLength {
                mode: AmrMode::Mode475,
                expected: 95,
                actual: 88
            })
        ));
    }

    #[test]
    fn buffer_too_small_writes_nothing() {
        let payloader = AmrPayloader::new(AmrPayloadFormat::OctetAligned);
        let frames = [frame(AmrMode::Mode1220, 0x11)];

        let mut out = [0xEEu8; 32];
        assert!(matches!(
            payloader.payload(Cmr::NO_REQUEST, &frames, &mut out),
            Err(AmrPayloadError::BufferTooSmall {
                required: 33,
                available: 32
            })
        ));
        assert_eq!(out, [0xEE; 32]);
    }

    #[test]
    fn no_frames() {
        let payloader = AmrPayloader::new(AmrPayloadFormat::OctetAligned);

        assert!(matches!(
            payloader.payload_to_bytes(Cmr::NO_REQUEST, &[]),
            Err(AmrPayloadError::NoFrames)
        ));
    }

    #[test]
    fn toc_termination() {
        let depayloader = AmrDePayloader::new(AmrPayloadFormat::OctetAligned);

        // three no data entries, the last one terminates the table of contents
        let payload = [0xF0, 0b1_1111_0_00, 0b1_1111_0_00, 0b0_1111_0_00];
        let parsed = depayloader.parse(&payload).unwrap();
        assert_eq!(parsed.toc().len(), 3);
        assert_eq!(parsed.speech_bits(), 0);

        // never terminated
        let payload = [0xF0, 0b1_1111_0_00, 0b1_1111_0_00];
        assert!(matches!(
            depayloader.parse(&payload),
            Err(AmrDePayloadError::MalformedPayload)
        ));

        // CMR only
        assert!(matches!(
            depayloader.parse(&[0xF0]),
            Err(AmrDePayloadError::MalformedPayload)
        ));

        assert!(matches!(
            depayloader.parse(&[]),
            Err(AmrDePayloadError::EmptyPayload)
        ));
    }

    #[test]
    fn marker_frame_consumes_no_bits() {
        let depayloader = AmrDePayloader::new(AmrPayloadFormat::OctetAligned);

        let mut payload = vec![0xF0, 0b1_1111_1_00, 0b0_0000_1_00];
        payload.extend_from_slice(&[0x42; 12]);

        let parsed = depayloader.parse(&payload).unwrap();
        let frames: Vec<_> = parsed.frames().collect::<Result<_, _>>().unwrap();

        assert_eq!(frames[0].entry.frame_type, FrameType::NoData);
        assert_eq!(frames[0].speech, None);
        assert_eq!(frames[1].speech.as_deref(), Some(&[0x42; 12][..]));
    }

    #[test]
    fn truncated_payload() {
        let depayloader = AmrDePayloader::new(AmrPayloadFormat::OctetAligned);

        // two mode 0 frames, but only 12 + 5 speech bytes present
        let mut payload = vec![0xF0, 0b1_0000_1_00, 0b0_0000_1_00];
        payload.extend_from_slice(&[0x42; 17]);

        let parsed = depayloader.parse(&payload).unwrap();
        let mut frames = parsed.frames();

        assert!(frames.next().unwrap().is_ok());
        assert!(matches!(
            frames.next(),
            Some(Err(AmrDePayloadError::TruncatedPayload {
                frame: 1,
                required: 96,
                remaining: 40
            }))
        ));
        assert!(frames.next().is_none());
    }
}
