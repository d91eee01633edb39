/// Crate-wide result alias.
pub type SlidecastResult<T> = Result<T, SlidecastError>;

/// Error taxonomy for storyboard composition and export.
#[derive(thiserror::Error, Debug)]
pub enum SlidecastError {
    /// Malformed configuration or out-of-contract arguments.
    #[error("validation error: {0}")]
    Validation(String),

    /// An asset (image, watermark, audio) could not be read or decoded.
    #[error("asset load error: {0}")]
    AssetLoad(String),

    /// A caption transcript payload violated the expected shape.
    #[error("caption format error: {0}")]
    CaptionFormat(String),

    /// The encoder process failed to start, write, or finish.
    #[error("encoder error: {0}")]
    Encoder(String),

    /// A recording/export lifecycle operation was called out of order.
    #[error("recording state error: {0}")]
    RecordingState(String),

    /// Wrapped lower-level error with context.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SlidecastError {
    /// Build a [`SlidecastError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`SlidecastError::AssetLoad`] value.
    pub fn asset_load(msg: impl Into<String>) -> Self {
        Self::AssetLoad(msg.into())
    }

    /// Build a [`SlidecastError::CaptionFormat`] value.
    pub fn caption_format(msg: impl Into<String>) -> Self {
        Self::CaptionFormat(msg.into())
    }

    /// Build a [`SlidecastError::Encoder`] value.
    pub fn encoder(msg: impl Into<String>) -> Self {
        Self::Encoder(msg.into())
    }

    /// Build a [`SlidecastError::RecordingState`] value.
    pub fn recording_state(msg: impl Into<String>) -> Self {
        Self::RecordingState(msg.into())
    }
}
