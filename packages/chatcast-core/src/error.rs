//! Centralized error types for the Chatcast core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::media::ResolutionError;
use crate::transport::TransportError;

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

/// Failures of playback operations on a single channel.
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// The query could not be resolved into playable media.
    #[error("could not resolve media: {0}")]
    Resolution(#[from] ResolutionError),

    /// There is no live session to join in the channel.
    #[error("no active voice chat: {0}")]
    TransportJoin(String),

    /// The transport refused to start or control the stream.
    #[error("transport rejected the stream: {0}")]
    TransportStream(String),

    /// The operation needs something to be playing.
    #[error("nothing is playing")]
    NotPlaying,

    /// Resume was issued while the stream is not paused.
    #[error("playback is not paused")]
    NotPaused,

    /// The pending queue is at capacity.
    #[error("maximum queue size ({max}) reached")]
    QueueFull { max: usize },

    /// The media file disappeared before it could be played.
    #[error("media file is missing: {}", .0.display())]
    ResourceMissing(PathBuf),

    /// The resolved track is longer than the configured limit.
    #[error("track is longer than the {limit_minutes} minute limit")]
    DurationLimitExceeded { limit_minutes: u64 },

    /// Caller supplied an unusable request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The channel was stopped before the request could start.
    #[error("playback was stopped before the request started")]
    Stopped,
}

impl From<TransportError> for PlaybackError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::NoActiveSession(channel) => {
                Self::TransportJoin(format!("channel {channel}"))
            }
            other => Self::TransportStream(other.to_string()),
        }
    }
}

impl ErrorCode for PlaybackError {
    fn code(&self) -> &'static str {
        match self {
            Self::Resolution(e) => e.code(),
            Self::TransportJoin(_) => "no_active_session",
            Self::TransportStream(_) => "transport_rejected",
            Self::NotPlaying => "not_playing",
            Self::NotPaused => "not_paused",
            Self::QueueFull { .. } => "queue_full",
            Self::ResourceMissing(_) => "resource_missing",
            Self::DurationLimitExceeded { .. } => "duration_limit_exceeded",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Stopped => "stopped",
        }
    }
}

pub type PlaybackResult<T> = Result<T, PlaybackError>;

/// Application-wide error type for the Chatcast server.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum ChatcastError {
    /// A playback operation was rejected or failed.
    #[error("{message}")]
    Playback {
        code: &'static str,
        message: String,
    },

    /// Requested channel has no session.
    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    /// Client sent an invalid or malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Server configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ChatcastError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Playback { code, .. } => code,
            Self::ChannelNotFound(_) => "channel_not_found",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Internal(_) => "internal_error",
            Self::Configuration(_) => "configuration_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Playback { code, .. } => playback_status(code),
            Self::ChannelNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn playback_status(code: &str) -> StatusCode {
    match code {
        "not_playing" | "not_paused" | "stopped" => StatusCode::CONFLICT,
        "queue_full" => StatusCode::TOO_MANY_REQUESTS,
        "invalid_request" | "duration_limit_exceeded" => StatusCode::BAD_REQUEST,
        "media_not_found" | "media_network_error" | "media_unsupported" => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<PlaybackError> for ChatcastError {
    fn from(err: PlaybackError) -> Self {
        Self::Playback {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type ChatcastResult<T> = Result<T, ChatcastError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for ChatcastError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}
