//! Error handling for the camera bridge
//!
//! Every operation the host can invoke fails with a [`CameraError`]. Errors are
//! surfaced synchronously as the failure of the originating request; nothing in
//! this crate retries automatically.
//!
//! ## Error Categories
//!
//! - `ContextUnavailable`: the engine or activity context is missing
//! - `PermissionDenied`: the user refused the camera permission
//! - `NotFound`: the request referenced a session key with no bound session
//! - `AlreadyBound`: a bind targeted a key that already has a session
//! - `UnrecognizedEnum`: a protocol value this version does not understand
//! - `HardwareFailure`: the camera stack failed during open, bind or torch control
//! - `InvalidMessage`: the request bytes could not be decoded
//!
//! ## Logging Errors
//!
//! Background tasks (orientation polling, torch observation) have nobody to
//! report to, so they log and continue:
//!
//! ```rust,ignore
//! if let Err(e) = activity.quarter_turns() {
//!     warn!("Skipping orientation poll: {}", e);
//! }
//! ```

use crate::message::SessionKey;
use thiserror::Error;

/// Result type for camera bridge operations
pub type Result<T> = std::result::Result<T, CameraError>;

/// Errors that can occur while serving host requests
///
/// # Examples
///
/// ```rust
/// use camerax_protocol::CameraError;
///
/// let error = CameraError::NotFound(7);
/// assert_eq!(error.to_string(), "No camera bound for key 7");
/// assert_eq!(error.code(), "not-found");
/// ```
#[derive(Error, Debug)]
pub enum CameraError {
    /// Engine or activity context is missing
    ///
    /// Fatal for the requested operation; the host has to attach again.
    #[error("Context unavailable: {0}")]
    ContextUnavailable(String),

    /// Camera permission was refused
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// No session is bound for the key
    #[error("No camera bound for key {0}")]
    NotFound(SessionKey),

    /// A session is already bound for the key
    #[error("Camera already bound for key {0}")]
    AlreadyBound(SessionKey),

    /// Protocol value not understood by this version
    #[error("Unrecognized {0} value")]
    UnrecognizedEnum(String),

    /// Camera stack failure during open, bind or control
    #[error("Hardware failure: {0}")]
    HardwareFailure(String),

    /// Request could not be decoded
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CameraError {
    /// Create a context error for a detached engine
    pub fn engine_detached() -> Self {
        CameraError::ContextUnavailable("Engine has been detached.".to_string())
    }

    /// Create a context error for a detached activity
    pub fn activity_detached() -> Self {
        CameraError::ContextUnavailable("Activity has been detached.".to_string())
    }

    /// Create a hardware error from any displayable cause
    pub fn hardware(msg: impl Into<String>) -> Self {
        CameraError::HardwareFailure(msg.into())
    }

    /// Stable machine-readable code used in error responses
    pub fn code(&self) -> &'static str {
        match self {
            CameraError::ContextUnavailable(_) => "context-unavailable",
            CameraError::PermissionDenied(_) => "permission-denied",
            CameraError::NotFound(_) => "not-found",
            CameraError::AlreadyBound(_) => "already-bound",
            CameraError::UnrecognizedEnum(_) => "unrecognized-enum",
            CameraError::HardwareFailure(_) => "hardware-failure",
            CameraError::InvalidMessage(_) | CameraError::Json(_) => "invalid-message",
        }
    }

    /// Check if this error requires user action
    ///
    /// Returns `true` when the host should involve the user (grant a
    /// permission, bring the app back to the foreground) before retrying.
    ///
    /// ```rust
    /// use camerax_protocol::CameraError;
    ///
    /// let error = CameraError::PermissionDenied("denied".to_string());
    /// assert!(error.requires_user_action());
    ///
    /// let error = CameraError::NotFound(1);
    /// assert!(!error.requires_user_action());
    /// ```
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            CameraError::PermissionDenied(_) | CameraError::ContextUnavailable(_)
        )
    }

    /// Get a user-friendly error message suitable for display in UI
    pub fn user_message(&self) -> String {
        match self {
            CameraError::ContextUnavailable(msg) => {
                format!("Camera is not available right now: {}", msg)
            }
            CameraError::PermissionDenied(_) => {
                "Camera permission was denied. Grant it in the system settings.".to_string()
            }
            CameraError::NotFound(key) => {
                format!("Camera {} is not open.", key)
            }
            CameraError::AlreadyBound(key) => {
                format!("Camera {} is already open.", key)
            }
            CameraError::UnrecognizedEnum(what) => {
                format!("Unsupported {}. Update the application.", what)
            }
            CameraError::HardwareFailure(msg) => {
                format!("Camera error: {}.", msg)
            }
            CameraError::InvalidMessage(msg) => {
                format!("Invalid request: {}.", msg)
            }
            CameraError::Json(e) => {
                format!("Data format error: {}.", e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CameraError::NotFound(3);
        assert_eq!(error.to_string(), "No camera bound for key 3");

        let error = CameraError::AlreadyBound(3);
        assert_eq!(error.to_string(), "Camera already bound for key 3");

        let error = CameraError::UnrecognizedEnum("camera facing".to_string());
        assert_eq!(error.to_string(), "Unrecognized camera facing value");

        let error = CameraError::engine_detached();
        assert_eq!(
            error.to_string(),
            "Context unavailable: Engine has been detached."
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(CameraError::activity_detached().code(), "context-unavailable");
        assert_eq!(
            CameraError::PermissionDenied(String::new()).code(),
            "permission-denied"
        );
        assert_eq!(CameraError::hardware("boom").code(), "hardware-failure");
        assert_eq!(
            CameraError::InvalidMessage("truncated".to_string()).code(),
            "invalid-message"
        );
    }

    #[test]
    fn test_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{\"open").unwrap_err();
        let error: CameraError = json_error.into();

        assert!(matches!(error, CameraError::Json(_)));
        assert_eq!(error.code(), "invalid-message");
    }

    #[test]
    fn test_user_action_classification() {
        assert!(CameraError::engine_detached().requires_user_action());
        assert!(!CameraError::hardware("driver crashed").requires_user_action());
        assert!(!CameraError::AlreadyBound(1).requires_user_action());
    }
}
