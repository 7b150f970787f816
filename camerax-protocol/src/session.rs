//! Camera sessions
//!
//! A [`Session`] is one camera bound to one host render target under a
//! host-chosen key. It owns everything that has to be undone when the binding
//! ends: the camera handle, the render target, the torch observation and the
//! task serving later surface requests. Nothing is cleaned up implicitly;
//! [`Session::release`] is called on unbind and on teardown.

use crate::events::EventStream;
use crate::hardware::{Camera, TorchState, UseCase};
use crate::host::SurfaceTexture;
use crate::message::{torch_event, SessionKey, TextureInfo, TextureSize};
use crate::orientation::QuarterTurns;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Subscription pushing a torch event for every hardware torch state change
///
/// The current state is pushed once right after subscribing.
pub struct TorchSubscription {
    handle: JoinHandle<()>,
}

impl TorchSubscription {
    pub fn spawn(
        key: SessionKey,
        mut state: watch::Receiver<TorchState>,
        events: EventStream,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let current = *state.borrow_and_update();
            events.emit(&torch_event(key, current.is_on()));

            while state.changed().await.is_ok() {
                let current = *state.borrow_and_update();
                events.emit(&torch_event(key, current.is_on()));
            }

            debug!("Torch state source closed for key {}", key);
        });

        Self { handle }
    }

    pub fn cancel(self) {
        self.handle.abort();
    }

    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }
}

/// An active camera binding
pub struct Session {
    pub key: SessionKey,
    pub camera: Arc<dyn Camera>,
    pub use_cases: Vec<UseCase>,
    pub texture: Arc<dyn SurfaceTexture>,
    /// Render target size after sensor rotation correction
    pub size: TextureSize,
    torch_subscription: Option<TorchSubscription>,
    surface_task: Option<JoinHandle<()>>,
}

impl Session {
    pub fn new(
        key: SessionKey,
        camera: Arc<dyn Camera>,
        use_cases: Vec<UseCase>,
        texture: Arc<dyn SurfaceTexture>,
        size: TextureSize,
    ) -> Self {
        Self {
            key,
            camera,
            use_cases,
            texture,
            size,
            torch_subscription: None,
            surface_task: None,
        }
    }

    pub fn with_surface_task(mut self, task: JoinHandle<()>) -> Self {
        self.surface_task = Some(task);
        self
    }

    /// Attach the torch observation, cancelling any previous one
    pub fn set_torch_subscription(&mut self, subscription: TorchSubscription) {
        if let Some(previous) = self.torch_subscription.replace(subscription) {
            previous.cancel();
        }
    }

    pub fn is_observing_torch(&self) -> bool {
        self.torch_subscription
            .as_ref()
            .map(TorchSubscription::is_active)
            .unwrap_or(false)
    }

    /// Whether this session was created by the bind that produced `use_cases`
    pub fn is_binding(&self, use_cases: &[UseCase]) -> bool {
        self.use_cases == use_cases
    }

    pub fn texture_id(&self) -> i64 {
        self.texture.id()
    }

    /// Metadata event content for the given display rotation
    pub fn texture_info(&self, quarter_turns: QuarterTurns) -> TextureInfo {
        TextureInfo {
            id: self.texture.id(),
            size: self.size,
            quarter_turns,
        }
    }

    /// Swap in a new render target, returning the old one for release
    pub fn replace_render_target(
        &mut self,
        texture: Arc<dyn SurfaceTexture>,
        size: TextureSize,
    ) -> Arc<dyn SurfaceTexture> {
        self.size = size;
        std::mem::replace(&mut self.texture, texture)
    }

    /// Cheap copy of the parts callers need outside the registry lock
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            key: self.key,
            camera: self.camera.clone(),
            use_cases: self.use_cases.clone(),
            texture_id: self.texture.id(),
            size: self.size,
        }
    }

    /// Stop observing the camera and hand the render target back
    ///
    /// The camera handle is dropped with `self`.
    pub fn release(mut self) {
        if let Some(subscription) = self.torch_subscription.take() {
            subscription.cancel();
        }
        if let Some(task) = self.surface_task.take() {
            task.abort();
        }
        self.texture.release();
        debug!("Released session {} (camera {})", self.key, self.camera.id());
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("key", &self.key)
            .field("camera", &self.camera.id())
            .field("use_cases", &self.use_cases)
            .field("texture_id", &self.texture.id())
            .field("size", &self.size)
            .finish()
    }
}

/// Read-only view of a session
#[derive(Clone)]
pub struct SessionSnapshot {
    pub key: SessionKey,
    pub camera: Arc<dyn Camera>,
    pub use_cases: Vec<UseCase>,
    pub texture_id: i64,
    pub size: TextureSize,
}

impl fmt::Debug for SessionSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSnapshot")
            .field("key", &self.key)
            .field("camera", &self.camera.id())
            .field("use_cases", &self.use_cases)
            .field("texture_id", &self.texture_id)
            .field("size", &self.size)
            .finish()
    }
}
