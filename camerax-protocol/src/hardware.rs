//! Camera hardware abstraction
//!
//! The bridge never talks to a driver directly. A [`CameraProviderFactory`]
//! hands out the process-wide [`CameraProvider`], which enumerates cameras and
//! binds use cases to one of them. A bound camera then asks for one surface per
//! use case through [`SurfaceRequest`]s and reports torch state through a
//! `watch` channel.
//!
//! ```text
//! factory.acquire() ──► provider.enumerate() ──► provider.bind(camera, [Preview])
//!                                                     │
//!                                  ┌──────────────────┴──────────────────┐
//!                                  ▼                                     ▼
//!                         SurfaceRequest stream                 Camera (torch, properties)
//! ```

use crate::host::Surface;
use crate::message::TextureSize;
use crate::{CameraError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch, OnceCell};
use tracing::debug;

/// Physical lens facing reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LensFacing {
    Front,
    Back,
}

impl LensFacing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Front => "front",
            Self::Back => "back",
        }
    }
}

/// A camera known to the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDescriptor {
    pub id: String,
    pub facing: LensFacing,
}

impl CameraDescriptor {
    pub fn new(id: impl Into<String>, facing: LensFacing) -> Self {
        Self {
            id: id.into(),
            facing,
        }
    }
}

/// Static properties of an opened camera
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraProperties {
    pub has_flash_unit: bool,
    /// Sensor mounting rotation relative to the device's natural orientation
    pub sensor_rotation_degrees: i32,
}

/// Torch state as reported by the hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TorchState {
    #[default]
    Off,
    On,
}

impl TorchState {
    pub fn is_on(self) -> bool {
        self == TorchState::On
    }
}

impl From<bool> for TorchState {
    fn from(on: bool) -> Self {
        if on {
            TorchState::On
        } else {
            TorchState::Off
        }
    }
}

/// Kind of capture configuration bound to a camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UseCaseKind {
    Preview,
}

/// One bound capture configuration, identified by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UseCase {
    pub id: u64,
    pub kind: UseCaseKind,
}

impl fmt::Display for UseCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}#{}", self.kind, self.id)
    }
}

/// Buffer resolution requested by the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Frame size in device-orientation space
    ///
    /// Sensors mounted at 90 or 270 degrees deliver frames whose width and
    /// height are swapped relative to what the display shows.
    ///
    /// ```
    /// use camerax_protocol::hardware::Resolution;
    ///
    /// let size = Resolution::new(640, 480).corrected(90);
    /// assert_eq!((size.width, size.height), (480, 640));
    /// ```
    pub fn corrected(self, sensor_rotation_degrees: i32) -> TextureSize {
        if sensor_rotation_degrees % 180 == 0 {
            TextureSize::new(self.width, self.height)
        } else {
            TextureSize::new(self.height, self.width)
        }
    }
}

/// A camera asking the host for a surface to render a use case into
#[derive(Debug)]
pub struct SurfaceRequest {
    use_case: UseCase,
    resolution: Resolution,
    responder: oneshot::Sender<Surface>,
}

impl SurfaceRequest {
    /// Create a request and the receiver the hardware side waits on
    pub fn new(use_case: UseCase, resolution: Resolution) -> (Self, oneshot::Receiver<Surface>) {
        let (responder, rx) = oneshot::channel();
        (
            Self {
                use_case,
                resolution,
                responder,
            },
            rx,
        )
    }

    pub fn use_case(&self) -> UseCase {
        self.use_case
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Hand the surface to the camera
    ///
    /// Fails when the camera stopped waiting for it.
    pub fn provide_surface(self, surface: Surface) -> Result<()> {
        self.responder.send(surface).map_err(|_| {
            CameraError::hardware(format!(
                "Camera stopped waiting for a surface for {}",
                self.use_case
            ))
        })
    }
}

/// An opened camera
pub trait Camera: Send + Sync {
    fn id(&self) -> &str;

    fn properties(&self) -> CameraProperties;

    /// Switch the torch; the resulting state arrives through [`Camera::torch_state`]
    fn enable_torch(&self, enabled: bool) -> Result<()>;

    /// Observe torch state; the receiver starts with the current value
    fn torch_state(&self) -> watch::Receiver<TorchState>;
}

/// Result of binding use cases to a camera
pub struct BoundCamera {
    pub camera: Arc<dyn Camera>,
    pub use_cases: Vec<UseCase>,
    /// One request per use case, plus any later re-requests
    pub surface_requests: mpsc::UnboundedReceiver<SurfaceRequest>,
}

/// Process-wide camera provider
#[async_trait]
pub trait CameraProvider: Send + Sync {
    /// List the cameras available right now
    async fn enumerate(&self) -> Result<Vec<CameraDescriptor>>;

    /// Open `camera` and bind the given use cases to it
    async fn bind(&self, camera: &CameraDescriptor, kinds: &[UseCaseKind]) -> Result<BoundCamera>;

    /// Detach use cases; the camera closes once none remain
    async fn unbind(&self, use_cases: &[UseCase]) -> Result<()>;
}

/// Asynchronous source of the camera provider
#[async_trait]
pub trait CameraProviderFactory: Send + Sync {
    async fn acquire(&self) -> Result<Arc<dyn CameraProvider>>;
}

/// Lazily acquired provider shared by every session
///
/// The first successful acquisition is kept for the lifetime of this value;
/// a failed acquisition is retried by the next caller.
pub struct SharedProvider {
    factory: Arc<dyn CameraProviderFactory>,
    provider: OnceCell<Arc<dyn CameraProvider>>,
}

impl SharedProvider {
    pub fn new(factory: Arc<dyn CameraProviderFactory>) -> Self {
        Self {
            factory,
            provider: OnceCell::new(),
        }
    }

    pub async fn get(&self) -> Result<Arc<dyn CameraProvider>> {
        let provider = self
            .provider
            .get_or_try_init(|| async {
                debug!("Acquiring camera provider");
                self.factory.acquire().await
            })
            .await?;
        Ok(provider.clone())
    }

    pub fn is_acquired(&self) -> bool {
        self.provider.initialized()
    }
}
