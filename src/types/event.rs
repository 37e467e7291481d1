//! The analytics event model.
//!
//! An [`Event`] is one analytics record (pageview, engagement heartbeat,
//! video start, video heartbeat). Events are compared for equality
//! structurally; the durable queue uses that equality for deduplication.
//!
//! Field names match the wire format exactly, so serializing an `Event`
//! with serde_json produces the payload entry the collection endpoint
//! expects.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::metadata::Metadata;

/// The action an event records.
///
/// Serialized as the lowercase wire strings (`pageview`, `heartbeat`,
/// `videostart`, `vheartbeat`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// A page (article) view.
    Pageview,
    /// An engaged-time heartbeat for an article.
    Heartbeat,
    /// The start of a video session.
    Videostart,
    /// An engaged-time heartbeat for a video.
    Vheartbeat,
}

impl Action {
    /// Returns the wire name of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Pageview => "pageview",
            Action::Heartbeat => "heartbeat",
            Action::Videostart => "videostart",
            Action::Vheartbeat => "vheartbeat",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A session pixel identifier (UUID string).
///
/// Carried as `pvid` on pageview/heartbeat events and as `vsid` on
/// videostart/vheartbeat events, tying heartbeats back to the view that
/// started the session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PixelId(pub String);

impl PixelId {
    pub fn new(s: impl Into<String>) -> Self {
        PixelId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PixelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for PixelId {
    fn from(s: String) -> Self {
        PixelId(s)
    }
}

/// The `data` block of an event: a timestamp plus whatever extra fields
/// the host application attached (device info, custom dimensions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    /// Event timestamp in epoch milliseconds.
    pub ts: i64,

    /// Additional host-supplied fields, flattened into the `data` object.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EventData {
    /// Creates a data block with only a timestamp.
    pub fn at(ts: i64) -> Self {
        EventData {
            ts,
            extra: Map::new(),
        }
    }
}

/// One analytics record.
///
/// Constructed by the host application's event builder; the pipeline treats
/// business fields as opaque apart from `url` (validated non-empty at the
/// engagement entry points) and the heartbeat bookkeeping fields `inc`/`tt`
/// that the engagement scheduler fills in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// The URL identifying the tracked content.
    pub url: String,

    /// Referrer URL associated with this event.
    pub urlref: String,

    /// The site identifier the event is attributed to.
    pub idsite: String,

    /// What this event records.
    pub action: Action,

    /// Timestamp and extra fields.
    pub data: EventData,

    /// Content metadata, when the URL is not crawlable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,

    /// Pageview session id (pageview/heartbeat events).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pvid: Option<PixelId>,

    /// Video session id (videostart/vheartbeat events).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vsid: Option<PixelId>,

    /// Incremental engaged time since the previous heartbeat, in whole
    /// seconds. Set by the engagement scheduler.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inc: Option<u64>,

    /// Cumulative engaged time since the session started, in milliseconds.
    /// Set by the engagement scheduler.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tt: Option<u64>,
}

impl Event {
    /// Creates a minimal event with the given identity fields and timestamp.
    pub fn new(
        action: Action,
        url: impl Into<String>,
        urlref: impl Into<String>,
        idsite: impl Into<String>,
        ts: i64,
    ) -> Self {
        Event {
            url: url.into(),
            urlref: urlref.into(),
            idsite: idsite.into(),
            action,
            data: EventData::at(ts),
            metadata: None,
            pvid: None,
            vsid: None,
            inc: None,
            tt: None,
        }
    }
}
