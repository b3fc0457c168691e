use crate::{
    AmrDePayloadError, AmrDePayloader, AmrFmtpOptions, AmrMode, AmrPayloadError, AmrPayloader,
    Cmr, ParseAmrFmtpOptionsError, SAMPLES_PER_FRAME, SpeechFrame,
};
use std::error::Error;

/// Error reported by a [`FrameCodec`] implementation
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct FrameCodecError(Box<dyn Error + Send + Sync>);

impl FrameCodecError {
    pub fn new(error: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        Self(error.into())
    }
}

/// AMR narrowband speech encoder and decoder state
///
/// The state is carried across frames, so an instance must only ever be driven by a single session.
/// Releasing the engine happens when the value is dropped.
pub trait FrameCodec {
    /// Encode a single frame of [`SAMPLES_PER_FRAME`] samples
    fn encode(&mut self, pcm: &[i16]) -> Result<SpeechFrame, FrameCodecError>;

    /// Decode a single frame of speech bits into [`SAMPLES_PER_FRAME`] samples written to `pcm`
    fn decode(
        &mut self,
        mode: AmrMode,
        quality: bool,
        speech: &[u8],
        pcm: &mut [i16],
    ) -> Result<(), FrameCodecError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AmrSessionError {
    #[error("invalid format parameters")]
    InvalidParameters(#[from] ParseAmrFmtpOptionsError),
    #[error("format parameter {0} is not supported")]
    UnsupportedParameter(&'static str),
    #[error("failed to initialize frame codec")]
    InitializationError(#[source] FrameCodecError),
    #[error("codec handle is not initialized or was already destroyed")]
    UninitializedCodec,
}

/// Result of [`AmrSession::decode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedPayload {
    /// Codec mode request received from the remote
    pub cmr: Cmr,
    /// Number of table of contents entries in the payload
    pub frames: usize,
    /// Number of samples appended to the output
    pub samples: usize,
    /// Index of the first frame whose speech data exceeded the payload
    ///
    /// Frames from this index on were not decoded.
    pub truncated_at: Option<usize>,
}

impl DecodedPayload {
    /// Length of the decoded 16 bit PCM in bytes
    pub fn pcm_len_bytes(&self) -> usize {
        self.samples * size_of::<i16>()
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated_at.is_some()
    }
}

/// AMR session owning a frame codec
///
/// Converts PCM to AMR RTP payloads and back. After [`AmrSession::destroy`]
/// every operation fails with an uninitialized codec error.
pub struct AmrSession<C> {
    codec: Option<C>,
    options: AmrFmtpOptions,
    payloader: AmrPayloader,
    depayloader: AmrDePayloader,
}

impl<C: FrameCodec> AmrSession<C> {
    /// Create a session from an SDP fmtp line, `create_codec` constructs the codec engine
    pub fn create<F, E>(fmtp: &str, create_codec: F) -> Result<Self, AmrSessionError>
    where
        F: FnOnce(&AmrFmtpOptions) -> Result<C, E>,
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        let options: AmrFmtpOptions = fmtp.parse()?;

        if let Some(parameter) = options.unsupported_option() {
            log::warn!("cannot create AMR session, {parameter} is not supported");
            return Err(AmrSessionError::UnsupportedParameter(parameter));
        }

        let codec = create_codec(&options)
            .map_err(|e| AmrSessionError::InitializationError(FrameCodecError::new(e)))?;

        log::debug!("created AMR session with format parameters {options}");

        Ok(Self::new(options, codec))
    }

    pub(crate) fn new(options: AmrFmtpOptions, codec: C) -> Self {
        let format = options.payload_format();

        Self {
            codec: Some(codec),
            options,
            payloader: AmrPayloader::new(format),
            depayloader: AmrDePayloader::new(format),
        }
    }

    /// Access the codec engine, `None` after the session was destroyed
    pub fn codec(&self) -> Option<&C> {
        self.codec.as_ref()
    }

    pub fn options(&self) -> &AmrFmtpOptions {
        &self.options
    }

    /// Returns if the codec has not been destroyed yet
    pub fn is_active(&self) -> bool {
        self.codec.is_some()
    }

    /// Release the codec engine
    ///
    /// Fails if the codec was already destroyed.
    pub fn destroy(&mut self) -> Result<(), AmrSessionError> {
        match self.codec.take() {
            Some(codec) => {
                drop(codec);
                log::debug!("destroyed AMR session");
                Ok(())
            }
            None => Err(AmrSessionError::UninitializedCodec),
        }
    }

    /// Encode `pcm` into a single payload written to `out`, returns the length of the payload
    ///
    /// `pcm` must contain a whole number of frames, each one ends up as a separate entry in the payload.
    pub fn encode(&mut self, cmr: Cmr, pcm: &[i16], out: &mut [u8]) -> Result<usize, AmrPayloadError> {
        let codec = self
            .codec
            .as_mut()
            .ok_or(AmrPayloadError::UninitializedCodec)?;

        if pcm.is_empty() || pcm.len() % SAMPLES_PER_FRAME != 0 {
            return Err(AmrPayloadError::InvalidPcmLength(pcm.len()));
        }

        let mut frames = Vec::with_capacity(pcm.len() / SAMPLES_PER_FRAME);

        for samples in pcm.chunks_exact(SAMPLES_PER_FRAME) {
            let frame = codec.encode(samples).map_err(AmrPayloadError::Codec)?;

            let mode = frame
                .mode()
                .ok_or(AmrPayloadError::InvalidModeIndex(frame.mode_index))?;

            if !self.options.allows_mode(mode) {
                return Err(AmrPayloadError::ModeNotAllowed(mode));
            }

            frames.push(frame);
        }

        self.payloader.payload(cmr, &frames, out)
    }

    /// Decode all frames of `payload` and append the samples to `out`
    ///
    /// Frames without speech data contribute no samples. A truncated payload is not an error,
    /// the samples of all frames preceding the truncated one are returned and
    /// [`DecodedPayload::truncated_at`] is set.
    pub fn decode(
        &mut self,
        payload: &[u8],
        out: &mut Vec<i16>,
    ) -> Result<DecodedPayload, AmrDePayloadError> {
        let codec = self
            .codec
            .as_mut()
            .ok_or(AmrDePayloadError::UninitializedCodec)?;

        let payload = self.depayloader.parse(payload)?;
        let mut samples = 0;
        let mut truncated_at = None;

        for frame in payload.frames() {
            let frame = match frame {
                Ok(frame) => frame,
                Err(AmrDePayloadError::TruncatedPayload { frame, .. }) => {
                    truncated_at = Some(frame);
                    break;
                }
                Err(e) => return Err(e),
            };

            let (Some(mode), Some(speech)) = (frame.entry.frame_type.mode(), frame.speech) else {
                continue;
            };

            let start = out.len();
            out.resize(start + SAMPLES_PER_FRAME, 0);

            if let Err(e) = codec.decode(mode, frame.entry.quality, &speech, &mut out[start..]) {
                out.truncate(start);
                return Err(AmrDePayloadError::Codec(e));
            }

            samples += SAMPLES_PER_FRAME;
        }

        Ok(DecodedPayload {
            cmr: payload.cmr(),
            frames: payload.toc().len(),
            samples,
            truncated_at,
        })
    }
}
