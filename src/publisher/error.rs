//! Publishing and download error types

use thiserror::Error;

use crate::models::ErrorKind;

/// Errors from payload downloads and the publishing API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// Payload reference is neither a supported URL nor a file id
    #[error("Invalid payload reference: {0}")]
    InvalidPayloadRef(String),

    /// Payload could not be fetched
    #[error("Payload download failed for {payload_ref}: {reason}")]
    Download {
        payload_ref: String,
        reason: String,
        status: Option<u16>,
    },

    /// Publishing API returned an error object
    #[error("Publishing API error {code} (HTTP {status}): {message}")]
    Api {
        code: i64,
        status: u16,
        message: String,
    },

    /// Transport-level failure talking to the publishing API
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Connection could not be established, so nothing was sent
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Publishing API answered with something we could not interpret
    #[error("Unexpected publishing API response: {0}")]
    InvalidResponse(String),

    /// Caller-supplied time budget ran out
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Graph API error codes documented as transient
const TRANSIENT_API_CODES: &[i64] = &[1, 2, 4, 17, 32, 341, 368];

/// Graph API throttling codes; the call was rejected before any side effect
const THROTTLING_API_CODES: &[i64] = &[4, 17, 32, 341];

impl PublishError {
    pub fn download(
        payload_ref: impl Into<String>,
        reason: impl Into<String>,
        status: Option<u16>,
    ) -> Self {
        Self::Download {
            payload_ref: payload_ref.into(),
            reason: reason.into(),
            status,
        }
    }

    /// Outcome classification recorded for this failure
    pub fn error_kind(&self) -> ErrorKind {
        match self {
            Self::InvalidPayloadRef(_) | Self::Download { .. } => ErrorKind::Download,
            Self::Api { .. }
            | Self::Http(_)
            | Self::Connect(_)
            | Self::InvalidResponse(_)
            | Self::Timeout { .. } => ErrorKind::Publish,
        }
    }

    /// Whether another attempt inside the same call could succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Connect(_) | Self::Timeout { .. } => true,
            Self::Download { status, .. } => match status {
                Some(code) => is_retryable_status(*code),
                None => true,
            },
            Self::Api { code, status, .. } => {
                is_retryable_status(*status) || TRANSIENT_API_CODES.contains(code)
            }
            Self::InvalidPayloadRef(_) | Self::InvalidResponse(_) => false,
        }
    }

    /// Whether a photo POST may be sent again without risking a second post.
    ///
    /// Only failures where the platform provably did not act qualify: the
    /// connection never opened, or the call was throttled. Timeouts, 5xx and
    /// broken response bodies may follow a post that was already created.
    pub fn is_safe_to_resend(&self) -> bool {
        match self {
            Self::Connect(_) => true,
            Self::Api { code, status, .. } => {
                *status == 429 || THROTTLING_API_CODES.contains(code)
            }
            Self::Http(_)
            | Self::Timeout { .. }
            | Self::InvalidResponse(_)
            | Self::InvalidPayloadRef(_)
            | Self::Download { .. } => false,
        }
    }
}

/// 429 and gateway-style 5xx responses are worth retrying
pub(crate) fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}
