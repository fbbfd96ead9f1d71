//! Domain types shared by the queue, the controller and the command surface.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::media::{MediaHandle, ResolvedMedia, TrackDuration};
use crate::utils::title_case;

/// Identifier of a chat that owns its own queue and live audio session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub i64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ChannelId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Unique identifier of a single playback request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The user who asked for a track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: i64,
    pub name: String,
}

impl UserRef {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// How a request's audio reaches the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// Downloaded to a local file before playback.
    #[default]
    Download,
    /// A remote URL streamed as-is.
    Live,
}

/// One user-submitted playback request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub id: RequestId,
    /// Display title, title-cased on construction.
    pub title: String,
    pub duration: TrackDuration,
    pub requested_by: UserRef,
    /// Opaque source: a URL or a search query.
    pub source: String,
    /// Chat the request is billed and displayed against.
    pub origin_channel: ChannelId,
    /// Local or remote handle. `None` while only metadata is known.
    pub media: Option<MediaHandle>,
    pub play_count: u32,
    pub kind: StreamKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploader: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

impl Request {
    /// Builds a request from fully resolved media (eager protocol).
    pub fn from_resolved(
        resolved: ResolvedMedia,
        requested_by: UserRef,
        source: impl Into<String>,
        origin_channel: ChannelId,
    ) -> Self {
        Self {
            id: RequestId::new(),
            title: title_case(&resolved.title),
            duration: resolved.duration,
            requested_by,
            source: source.into(),
            origin_channel,
            media: Some(resolved.media),
            play_count: 0,
            kind: StreamKind::Download,
            uploader: Some(resolved.uploader),
            source_url: resolved.source_url,
            thumbnail: resolved.thumbnail,
        }
    }

    /// Builds a live URL-stream request. The URL is its own media handle.
    pub fn live_stream(
        url: impl Into<String>,
        title: &str,
        duration: TrackDuration,
        requested_by: UserRef,
        origin_channel: ChannelId,
    ) -> Self {
        let url = url.into();
        Self {
            id: RequestId::new(),
            title: title_case(title),
            duration,
            requested_by,
            source: url.clone(),
            origin_channel,
            media: Some(MediaHandle::Remote(url.clone())),
            play_count: 0,
            kind: StreamKind::Live,
            uploader: None,
            source_url: Some(url),
            thumbnail: None,
        }
    }

    /// Builds a metadata-only request; media is resolved when it reaches the head of the queue.
    pub fn deferred(
        query: impl Into<String>,
        title: &str,
        requested_by: UserRef,
        origin_channel: ChannelId,
    ) -> Self {
        Self {
            id: RequestId::new(),
            title: title_case(title),
            duration: TrackDuration::Unknown,
            requested_by,
            source: query.into(),
            origin_channel,
            media: None,
            play_count: 0,
            kind: StreamKind::Download,
            uploader: None,
            source_url: None,
            thumbnail: None,
        }
    }

    /// Returns true if the media must still be resolved before playback.
    #[must_use]
    pub fn needs_resolution(&self) -> bool {
        self.media.is_none()
    }

    /// Fills in media and metadata produced by a deferred resolution.
    pub fn attach(&mut self, resolved: ResolvedMedia) {
        self.title = title_case(&resolved.title);
        self.duration = resolved.duration;
        self.media = Some(resolved.media);
        self.uploader = Some(resolved.uploader);
        self.source_url = resolved.source_url.or_else(|| self.source_url.take());
        self.thumbnail = resolved.thumbnail;
    }

    /// Returns the downloaded file handle, if this request owns one.
    #[must_use]
    pub fn file_handle(&self) -> Option<&MediaHandle> {
        self.media.as_ref().filter(|m| m.path().is_some())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn resolved(title: &str) -> ResolvedMedia {
        ResolvedMedia {
            id: "abc".into(),
            title: title.into(),
            uploader: "Uploader".into(),
            duration: TrackDuration::Known(180),
            media: MediaHandle::File(PathBuf::from("downloads/abc.mp3")),
            source_url: Some("https://youtu.be/abc".into()),
            thumbnail: None,
        }
    }

    #[test]
    fn resolved_request_is_title_cased_and_ready() {
        let req = Request::from_resolved(
            resolved("lofi beats to study to"),
            UserRef::new(1, "ana"),
            "lofi",
            ChannelId(-100),
        );
        assert_eq!(req.title, "Lofi Beats To Study To");
        assert_eq!(req.play_count, 0);
        assert!(!req.needs_resolution());
        assert!(req.file_handle().is_some());
    }

    #[test]
    fn live_request_uses_url_as_handle() {
        let req = Request::live_stream(
            "https://radio.example/live",
            "radio",
            TrackDuration::Unknown,
            UserRef::new(1, "ana"),
            ChannelId(1),
        );
        assert_eq!(req.kind, StreamKind::Live);
        assert_eq!(
            req.media,
            Some(MediaHandle::Remote("https://radio.example/live".into()))
        );
        assert!(req.file_handle().is_none());
    }

    #[test]
    fn deferred_request_gets_media_on_attach() {
        let mut req = Request::deferred("some song", "some song", UserRef::new(2, "bo"), ChannelId(1));
        assert!(req.needs_resolution());
        assert!(req.duration.is_unknown());

        req.attach(resolved("real title"));
        assert!(!req.needs_resolution());
        assert_eq!(req.title, "Real Title");
        assert_eq!(req.duration, TrackDuration::Known(180));
    }

    #[test]
    fn request_ids_are_unique() {
        assert_ne!(RequestId::new(), RequestId::new());
    }
}
