//! # Sources
//!
//! Where VDB text comes from before it is embedded:
//!
//! - **Documents**: plain text, CSV, JSON, PDF, Word and Excel files ([`extract`])
//! - **Captions**: YouTube caption tracks ([`youtube`])
//!
//! ```rust,ignore
//! use vdb_sources::{extract_file, video_id_from_url, CaptionSource, YouTubeCaptionSource};
//!
//! let notes = extract_file("notes.docx").await?;
//!
//! let id = video_id_from_url("https://youtu.be/dQw4w9WgXcQ")?;
//! let captions = YouTubeCaptionSource::new()
//!     .fetch_captions(&id, &Default::default())
//!     .await?;
//! ```

pub mod error;
pub mod extract;
pub mod youtube;

pub use error::{CaptionError, ExtractionError};
pub use extract::{FileFormat, extract_bytes, extract_file};
pub use youtube::{
    CaptionSource, CaptionTrack, LanguagePolicy, YouTubeCaptionSource, select_track,
    video_id_from_url,
};
