//! AMR narrowband RTP payload format
//!
//! Packs AMR speech frames into RTP payloads (and back) as described in
//! [RFC 4867](https://datatracker.ietf.org/doc/html/rfc4867), supporting both
//! the octet-aligned and bandwidth-efficient formats. The speech codec itself
//! is provided by the user through the [`FrameCodec`] trait.

mod bit_cursor;
mod codec;
mod fmtp;
mod mode;
mod payload;
mod toc;

pub use bit_cursor::{BitCursor, BitCursorError};
pub use codec::{AmrSession, AmrSessionError, DecodedPayload, FrameCodec, FrameCodecError};
pub use fmtp::{AmrFmtpOptions, AmrPayloadFormat, ModeSet, ParseAmrFmtpOptionsError};
pub use mode::{AmrMode, Cmr, FrameType, ReservedFrameType};
pub use payload::{
    AmrDePayloadError, AmrDePayloader, AmrPayload, AmrPayloadError, AmrPayloader, Frames,
    PayloadFrame, SpeechFrame,
};
pub use toc::TocEntry;

/// Dynamic RTP payload type used for AMR
pub const AMR_PAYLOAD_TYPE: u8 = 118;

/// Number of samples in a single 20ms frame at 8kHz
pub const SAMPLES_PER_FRAME: usize = 160;

/// Nominal number of bytes per frame used for buffer sizing
pub const BYTES_PER_FRAME: usize = 10;

/// Static description of the AMR codec for registration with a media host
#[derive(Debug, Clone, Copy)]
pub struct CodecDescriptor {
    pub payload_type: u8,
    pub name: &'static str,
    pub clock_rate: u32,
    pub channels: u32,
    /// Number of samples that `n` bytes of encoded data represent
    pub bytes_to_samples: fn(usize) -> usize,
    /// Number of encoded bytes required for `n` samples
    pub samples_to_bytes: fn(usize) -> usize,
}

impl CodecDescriptor {
    /// Create the payloader and depayloader for the negotiated format parameters
    pub fn payloaders(&self, options: &AmrFmtpOptions) -> (AmrPayloader, AmrDePayloader) {
        let format = options.payload_format();

        (AmrPayloader::new(format), AmrDePayloader::new(format))
    }
}

pub const AMR_CODEC: CodecDescriptor = CodecDescriptor {
    payload_type: AMR_PAYLOAD_TYPE,
    name: "AMR",
    clock_rate: 8000,
    channels: 1,
    bytes_to_samples,
    samples_to_bytes,
};

/// Number of samples represented by `num_bytes` encoded bytes
///
/// Advisory value for pre-allocating buffers, based on the nominal frame size.
pub fn bytes_to_samples(num_bytes: usize) -> usize {
    num_bytes * SAMPLES_PER_FRAME / BYTES_PER_FRAME
}

/// Number of encoded bytes representing `num_samples` samples
///
/// Advisory value for pre-allocating buffers, based on the nominal frame size.
pub fn samples_to_bytes(num_samples: usize) -> usize {
    num_samples * BYTES_PER_FRAME / SAMPLES_PER_FRAME
}
