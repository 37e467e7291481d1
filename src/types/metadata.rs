//! Content metadata attached to events.
//!
//! Metadata is only required for content that the collection service cannot
//! crawl (app-only URLs). Article and video metadata share one flat
//! structure; video content additionally carries a `duration`, which doubles
//! as part of the video session identity.

use serde::{Deserialize, Serialize};

/// Metadata describing a piece of tracked content.
///
/// All fields are optional except that video content must set `duration`
/// and `link` (the video id) for session identity checks to work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Authors of the content. Up to 10 are accepted by the endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,

    /// Canonical URL of a post, or the unique video id for video content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,

    /// The category or vertical the content belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,

    /// User-defined tags. Up to 20 are accepted by the endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,

    /// URL of the main image for the content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumb_url: Option<String>,

    /// Title of the content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Publication timestamp in epoch seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pub_date_tmsp: Option<i64>,

    /// Video duration in seconds. Present only for video content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
}

/// The identity of a video session.
///
/// A `trackPlay`-style call resumes the existing video session only when
/// every one of these fields matches the session's base event; any single
/// mismatch means a different video and forces a restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoIdentity {
    /// URL of the post the video is embedded in.
    pub url: String,

    /// Referrer URL associated with the video view.
    pub urlref: String,

    /// Unique video id (the metadata `link` field).
    pub link: String,

    /// Video duration in seconds.
    pub duration_seconds: u32,
}

impl VideoIdentity {
    pub fn new(
        url: impl Into<String>,
        urlref: impl Into<String>,
        link: impl Into<String>,
        duration_seconds: u32,
    ) -> Self {
        VideoIdentity {
            url: url.into(),
            urlref: urlref.into(),
            link: link.into(),
            duration_seconds,
        }
    }

    /// Returns the metadata block for this video's events.
    pub fn to_metadata(&self) -> Metadata {
        Metadata {
            link: Some(self.link.clone()),
            duration: Some(self.duration_seconds),
            ..Metadata::default()
        }
    }
}
