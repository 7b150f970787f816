//! Host-side collaborators
//!
//! The host application owns the UI: it allocates render targets, shows the
//! permission prompt and knows the display rotation. These traits are the
//! bridge's view of it.

use crate::hardware::Resolution;
use crate::orientation::QuarterTurns;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Runtime permissions the bridge asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Camera,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Camera => "camera",
        }
    }
}

/// Outcome of one permission in a permission result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionResult {
    Granted,
    Denied,
}

/// Writable surface backed by a host render target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    pub texture_id: i64,
    pub buffer_size: Resolution,
}

/// Host render target the camera writes frames into
pub trait SurfaceTexture: Send + Sync {
    fn id(&self) -> i64;

    fn set_default_buffer_size(&self, resolution: Resolution);

    fn surface(&self) -> Surface;

    /// Return the render target to the host
    fn release(&self);
}

/// Render target allocator
pub trait TextureRegistry: Send + Sync {
    fn create_surface_texture(&self) -> Arc<dyn SurfaceTexture>;
}

/// Foreground UI context
pub trait Activity: Send + Sync {
    /// Current display rotation
    fn quarter_turns(&self) -> Result<QuarterTurns>;

    fn check_permission(&self, permission: Permission) -> bool;

    /// Show the permission prompt; the answer arrives later tagged with `request_code`
    fn request_permissions(&self, permissions: &[Permission], request_code: i32);
}

/// Handles valid while the engine is attached
#[derive(Clone)]
pub struct EngineBinding {
    pub textures: Arc<dyn TextureRegistry>,
}

impl EngineBinding {
    pub fn new(textures: Arc<dyn TextureRegistry>) -> Self {
        Self { textures }
    }
}
