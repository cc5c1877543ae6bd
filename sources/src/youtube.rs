//! YouTube caption fetching.
//!
//! The watch page embeds the list of caption tracks as JSON. We pick a track
//! according to a [`LanguagePolicy`], download it in the `json3` timed-text
//! format and flatten the segments into a single string.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::CaptionError;

/// Result type alias for caption operations.
pub type Result<T> = std::result::Result<T, CaptionError>;

const DEFAULT_BASE_URL: &str = "https://www.youtube.com";

/// Extract the video id from a YouTube link.
///
/// Accepts `watch?v=`, `youtu.be/`, `shorts/`, `embed/` and `live/` links.
pub fn video_id_from_url(input: &str) -> Result<String> {
    let invalid = || CaptionError::InvalidUrl(input.to_string());
    let url = Url::parse(input.trim()).map_err(|_| invalid())?;
    let host = url.host_str().ok_or_else(invalid)?;
    let host = host.strip_prefix("www.").unwrap_or(host);

    let mut segments = url.path_segments().into_iter().flatten();
    let id = match host {
        "youtu.be" => segments.next().map(str::to_string),
        "youtube.com" | "m.youtube.com" | "music.youtube.com" => match segments.next() {
            Some("watch") => url
                .query_pairs()
                .find(|(k, _)| k == "v")
                .map(|(_, v)| v.into_owned()),
            Some("shorts" | "embed" | "live") => segments.next().map(str::to_string),
            _ => None,
        },
        _ => None,
    };

    id.filter(|id| is_valid_video_id(id)).ok_or_else(invalid)
}

fn is_valid_video_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Which caption track to use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguagePolicy {
    /// Language codes in order of preference.
    pub preferred: Vec<String>,

    /// Use any generated track when no preferred language is available.
    pub fallback_to_auto: bool,
}

impl LanguagePolicy {
    /// Prefer the given languages, falling back to generated tracks.
    pub fn new(preferred: Vec<String>) -> Self {
        Self {
            preferred,
            fallback_to_auto: true,
        }
    }

    /// Disable the generated-track fallback.
    pub fn strict(mut self) -> Self {
        self.fallback_to_auto = false;
        self
    }
}

impl Default for LanguagePolicy {
    fn default() -> Self {
        Self::new(vec!["en".to_string()])
    }
}

/// A caption track listed on the watch page.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionTrack {
    /// URL of the timed-text document.
    pub base_url: String,

    /// Language code, e.g. `en` or `pt-BR`.
    pub language_code: String,

    /// `asr` for automatically generated tracks.
    #[serde(default)]
    pub kind: Option<String>,
}

impl CaptionTrack {
    /// Whether the track was produced by speech recognition.
    pub fn is_generated(&self) -> bool {
        self.kind.as_deref() == Some("asr")
    }

    fn has_language(&self, code: &str) -> bool {
        self.language_code.eq_ignore_ascii_case(code)
    }
}

/// Choose a track for `policy`.
///
/// Manually created tracks in a preferred language win over generated ones
/// in that language; a missing preferred language falls back to any
/// generated track when the policy allows it. With no preference at all the
/// first listed track is used.
pub fn select_track<'a>(
    tracks: &'a [CaptionTrack],
    policy: &LanguagePolicy,
) -> Option<&'a CaptionTrack> {
    let preferred = |generated: bool| {
        policy.preferred.iter().find_map(|code| {
            tracks
                .iter()
                .find(|t| t.is_generated() == generated && t.has_language(code))
        })
    };

    preferred(false)
        .or_else(|| preferred(true))
        .or_else(|| {
            if policy.fallback_to_auto {
                tracks.iter().find(|t| t.is_generated())
            } else {
                None
            }
        })
        .or_else(|| {
            if policy.preferred.is_empty() {
                tracks.first()
            } else {
                None
            }
        })
}

/// A source of video captions.
#[async_trait]
pub trait CaptionSource: Send + Sync {
    /// Fetch the caption text of `video_id`, joined into a single string.
    async fn fetch_captions(&self, video_id: &str, policy: &LanguagePolicy) -> Result<String>;
}

/// Fetches captions straight from youtube.com.
pub struct YouTubeCaptionSource {
    client: reqwest::Client,
    base_url: String,
}

impl YouTubeCaptionSource {
    /// Create a source talking to youtube.com.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the source at another host.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    /// List the caption tracks of a video.
    pub async fn list_tracks(&self, video_id: &str) -> Result<Vec<CaptionTrack>> {
        let response = self
            .client
            .get(format!("{}/watch", self.base_url))
            .query(&[("v", video_id)])
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CaptionError::Fetch(format!(
                "watch page returned {}",
                response.status()
            )));
        }

        let html = response.text().await?;
        let tracks = parse_caption_tracks(&html)?;
        debug!("Found {} caption tracks for {video_id}", tracks.len());
        Ok(tracks)
    }

    async fn download_track(&self, track: &CaptionTrack) -> Result<String> {
        let mut url = Url::parse(&track.base_url)
            .map_err(|e| CaptionError::Fetch(format!("bad track url: {e}")))?;
        url.query_pairs_mut().append_pair("fmt", "json3");

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(CaptionError::Fetch(format!(
                "caption track returned {}",
                response.status()
            )));
        }

        let body: TimedText = response
            .json()
            .await
            .map_err(|e| CaptionError::Fetch(format!("bad caption document: {e}")))?;
        Ok(body.into_text())
    }
}

impl Default for YouTubeCaptionSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptionSource for YouTubeCaptionSource {
    async fn fetch_captions(&self, video_id: &str, policy: &LanguagePolicy) -> Result<String> {
        let tracks = self.list_tracks(video_id).await?;
        let track = select_track(&tracks, policy).ok_or_else(|| {
            CaptionError::NoCaptions(format!(
                "no track for {video_id} in {:?}",
                policy.preferred
            ))
        })?;

        if track.is_generated()
            && !policy.preferred.iter().any(|code| track.has_language(code))
        {
            warn!(
                "No {:?} captions for {video_id}, using generated {} track",
                policy.preferred, track.language_code
            );
        }

        let text = self.download_track(track).await?;
        if text.is_empty() {
            return Err(CaptionError::NoCaptions(format!(
                "caption track for {video_id} is empty"
            )));
        }

        info!(
            "Fetched {} caption characters for {video_id} ({})",
            text.len(),
            track.language_code
        );
        Ok(text)
    }
}

/// Pull the `captionTracks` array out of a watch page.
fn parse_caption_tracks(html: &str) -> Result<Vec<CaptionTrack>> {
    const MARKER: &str = "\"captionTracks\":";
    let Some(start) = html.find(MARKER) else {
        return Err(CaptionError::NoCaptions(
            "captions are disabled for this video".to_string(),
        ));
    };

    let mut deserializer = serde_json::Deserializer::from_str(&html[start + MARKER.len()..]);
    Vec::<CaptionTrack>::deserialize(&mut deserializer)
        .map_err(|e| CaptionError::Fetch(format!("unreadable caption track list: {e}")))
}

#[derive(Debug, Deserialize)]
struct TimedText {
    #[serde(default)]
    events: Vec<TimedTextEvent>,
}

#[derive(Debug, Deserialize)]
struct TimedTextEvent {
    #[serde(default)]
    segs: Vec<TimedTextSegment>,
}

#[derive(Debug, Deserialize)]
struct TimedTextSegment {
    #[serde(default)]
    utf8: String,
}

impl TimedText {
    fn into_text(self) -> String {
        self.events
            .into_iter()
            .map(|event| event.segs.into_iter().map(|s| s.utf8).collect::<String>())
            .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
