//! Bridge Messages
//!
//! Every request, response payload and event exchanged with the host is a
//! [`Message`]: a category, the session key it concerns, and at most one
//! category-specific body field.
//!
//! ## Message Shape
//!
//! ```json
//! {"category":"bind","key":1,"bindArgs":{"selector":{"facing":"back"}}}
//! {"category":"torch","key":1,"torchState":true}
//! {"category":"textureInfoEvent","key":1,"textureInfo":{"id":0,"size":{"width":480,"height":640},"quarterTurns":0}}
//! {"category":"torchEvent","key":1,"torchState":false}
//! ```
//!
//! Categories and facings this version does not know decode to an
//! `Unrecognized` variant instead of failing, so newer hosts get a
//! "not implemented" answer rather than a decode error.

use crate::orientation::QuarterTurns;
use crate::{CameraError, Result};
use serde::{Deserialize, Serialize};

/// Host-chosen identifier of one camera-to-surface binding
pub type SessionKey = i32;

/// Message category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageCategory {
    Bind,
    Unbind,
    TextureInfo,
    TextureInfoEvent,
    Torch,
    TorchEvent,
    AnalysisEvent,
    #[serde(other)]
    Unrecognized,
}

impl MessageCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bind => "bind",
            Self::Unbind => "unbind",
            Self::TextureInfo => "textureInfo",
            Self::TextureInfoEvent => "textureInfoEvent",
            Self::Torch => "torch",
            Self::TorchEvent => "torchEvent",
            Self::AnalysisEvent => "analysisEvent",
            Self::Unrecognized => "unrecognized",
        }
    }

    /// Whether this category only ever flows from bridge to host
    pub fn is_event(&self) -> bool {
        matches!(
            self,
            Self::TextureInfoEvent | Self::TorchEvent | Self::AnalysisEvent
        )
    }
}

/// Logical lens facing requested by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraFacing {
    /// Front-facing camera (selfie)
    Front,
    /// Back-facing camera (main)
    Back,
    #[serde(other)]
    Unrecognized,
}

impl CameraFacing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Front => "front",
            Self::Back => "back",
            Self::Unrecognized => "unrecognized",
        }
    }
}

/// Which camera to bind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraSelector {
    pub facing: CameraFacing,
}

/// Arguments of a bind request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindArgs {
    pub selector: CameraSelector,
}

impl BindArgs {
    pub fn new(facing: CameraFacing) -> Self {
        Self {
            selector: CameraSelector { facing },
        }
    }
}

/// Frame size reported to the host, already corrected for sensor rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextureSize {
    pub width: u32,
    pub height: u32,
}

impl TextureSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Metadata of a session's render target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextureInfo {
    /// Render target identifier allocated by the host
    pub id: i64,
    pub size: TextureSize,
    pub quarter_turns: QuarterTurns,
}

/// Capabilities returned by a successful bind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraCapabilities {
    pub has_torch: bool,
}

impl CameraCapabilities {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Bridge message envelope
///
/// # Examples
///
/// ```
/// use camerax_protocol::message::{CameraFacing, Message, MessageCategory};
///
/// let message = camerax_protocol::message::bind_request(1, CameraFacing::Back);
/// let bytes = message.to_bytes().unwrap();
///
/// let parsed = Message::from_bytes(&bytes).unwrap();
/// assert!(parsed.is_category(MessageCategory::Bind));
/// assert_eq!(parsed.key, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub category: MessageCategory,

    #[serde(default)]
    pub key: SessionKey,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_args: Option<BindArgs>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub torch_state: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub texture_info: Option<TextureInfo>,
}

impl Message {
    /// Create a message with no body
    pub fn new(category: MessageCategory, key: SessionKey) -> Self {
        Self {
            category,
            key,
            bind_args: None,
            torch_state: None,
            texture_info: None,
        }
    }

    pub fn with_bind_args(mut self, args: BindArgs) -> Self {
        self.bind_args = Some(args);
        self
    }

    pub fn with_torch_state(mut self, state: bool) -> Self {
        self.torch_state = Some(state);
        self
    }

    pub fn with_texture_info(mut self, info: TextureInfo) -> Self {
        self.texture_info = Some(info);
        self
    }

    pub fn is_category(&self, category: MessageCategory) -> bool {
        self.category == category
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from JSON bytes
    ///
    /// A trailing newline is tolerated so line-framed transports can pass
    /// their frames through untouched.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let trimmed = data
            .strip_suffix(b"\r\n")
            .or_else(|| data.strip_suffix(b"\n"))
            .unwrap_or(data);

        serde_json::from_slice(trimmed).map_err(|e| {
            CameraError::InvalidMessage(format!("Failed to deserialize message: {}", e))
        })
    }
}

/// Create a bind request
pub fn bind_request(key: SessionKey, facing: CameraFacing) -> Message {
    Message::new(MessageCategory::Bind, key).with_bind_args(BindArgs::new(facing))
}

/// Create an unbind request
pub fn unbind_request(key: SessionKey) -> Message {
    Message::new(MessageCategory::Unbind, key)
}

/// Create a texture info query
pub fn texture_info_request(key: SessionKey) -> Message {
    Message::new(MessageCategory::TextureInfo, key)
}

/// Create a torch request
pub fn torch_request(key: SessionKey, state: bool) -> Message {
    Message::new(MessageCategory::Torch, key).with_torch_state(state)
}

/// Create a texture info event
pub fn texture_info_event(key: SessionKey, info: TextureInfo) -> Message {
    Message::new(MessageCategory::TextureInfoEvent, key).with_texture_info(info)
}

/// Create a torch event
pub fn torch_event(key: SessionKey, state: bool) -> Message {
    Message::new(MessageCategory::TorchEvent, key).with_torch_state(state)
}
