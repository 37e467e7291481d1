//! Domain types for the telemetry pipeline.
//!
//! - [`event`]: the analytics event model and its wire format
//! - [`metadata`]: content metadata and video session identity
//!
//! Event *construction* (device info, UUID generation, site id resolution)
//! belongs to the host application; the [`EventBuilder`] trait is the seam
//! through which built events enter the pipeline.

mod event;
mod metadata;

pub use event::{Action, Event, EventData, PixelId};
pub use metadata::{Metadata, VideoIdentity};

use serde_json::{Map, Value};

/// Which site id an event should be attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteIdSource {
    /// Use the site id the pipeline was configured with.
    Default,
    /// Override the site id for this event.
    Custom(String),
}

/// Builds complete events from business fields.
///
/// Implemented by the host application; the pipeline only consumes the
/// resulting [`Event`]. Implementations are responsible for filling in
/// device information and any extra data fields.
pub trait EventBuilder: Send + Sync {
    fn build_event(
        &self,
        url: &str,
        urlref: &str,
        action: Action,
        metadata: Option<Metadata>,
        extra_data: Option<Map<String, Value>>,
        pixel_id: &PixelId,
        site_id: &SiteIdSource,
    ) -> Event;
}
