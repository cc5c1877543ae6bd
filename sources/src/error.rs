//! Error types for text sources.

use thiserror::Error;

/// Errors that can occur while extracting text from a file.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// The file extension is not one we can read.
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// The file is not valid UTF-8 text.
    #[error("file is not valid UTF-8: {0}")]
    InvalidUtf8(String),

    /// The file structure could not be parsed.
    #[error("malformed document: {0}")]
    Malformed(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

macro_rules! malformed_from {
    ($($source:ty),+ $(,)?) => {
        $(
            impl From<$source> for ExtractionError {
                fn from(err: $source) -> Self {
                    Self::Malformed(err.to_string())
                }
            }
        )+
    };
}

malformed_from!(
    zip::result::ZipError,
    csv::Error,
    calamine::Error,
    lopdf::Error,
    quick_xml::Error,
);

/// Errors that can occur while fetching captions.
#[derive(Error, Debug)]
pub enum CaptionError {
    /// The URL does not point at a video.
    #[error("invalid video URL: {0}")]
    InvalidUrl(String),

    /// The video has no usable caption track.
    #[error("no captions available: {0}")]
    NoCaptions(String),

    /// Transport or decoding failure.
    #[error("failed to fetch captions: {0}")]
    Fetch(String),
}

impl From<reqwest::Error> for CaptionError {
    fn from(err: reqwest::Error) -> Self {
        Self::Fetch(err.to_string())
    }
}
