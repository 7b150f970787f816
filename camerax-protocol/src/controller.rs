//! Camera session controller
//!
//! Lives for one activity attachment. Binding walks a session through
//! permission, provider acquisition, camera selection, hardware bind and the
//! first surface request before the session is registered:
//!
//! ```text
//! Idle ─► AwaitingPermission ─► AwaitingHardware ─► AwaitingSurfaceRequest ─► Bound
//!   ▲                                                                          │
//!   └────────────────────────────── unbind / shutdown ◄────────────────────────┘
//! ```
//!
//! Every step up to registration runs without the registry lock. Completion
//! inserts under the lock and fails cleanly if teardown got there first. The
//! host hears about a new session in order: the bind response, then the
//! texture-info event and torch events once [`Binding::announce`] runs.

use crate::config::CameraXConfig;
use crate::events::EventStream;
use crate::hardware::{
    BoundCamera, Camera, CameraProvider, LensFacing, SharedProvider, SurfaceRequest, UseCase,
    UseCaseKind,
};
use crate::host::{Activity, EngineBinding, SurfaceTexture, TextureRegistry};
use crate::message::{
    texture_info_event, BindArgs, CameraCapabilities, CameraFacing, SessionKey, TextureSize,
};
use crate::orientation::{OrientationState, OrientationWatcher, QuarterTurns};
use crate::permission::{PendingOperation, PermissionGate, PermissionRequest, CAMERA_PERMISSIONS};
use crate::registry::{InsertError, SessionRegistry};
use crate::session::{Session, TorchSubscription};
use crate::{CameraError, Result};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Allocate a render target for `request` and hand it to the camera
///
/// Returns the target and its size corrected for the sensor rotation.
fn serve_surface_request(
    textures: &dyn TextureRegistry,
    request: SurfaceRequest,
    sensor_rotation_degrees: i32,
) -> Result<(Arc<dyn SurfaceTexture>, TextureSize)> {
    let resolution = request.resolution();
    let texture = textures.create_surface_texture();
    texture.set_default_buffer_size(resolution);

    if let Err(e) = request.provide_surface(texture.surface()) {
        texture.release();
        return Err(e);
    }

    Ok((texture, resolution.corrected(sensor_rotation_degrees)))
}

/// Serves surface re-requests after the first one
///
/// Each new render target replaces the session's current one and the host is
/// told through a texture-info event. Requests arriving after the session was
/// removed or replaced get a target that is released straight away.
struct SurfaceRequestWorker {
    key: SessionKey,
    camera: Arc<dyn Camera>,
    use_cases: Vec<UseCase>,
    textures: Arc<dyn TextureRegistry>,
    registry: SessionRegistry,
    orientation: Arc<OrientationState>,
    events: EventStream,
}

impl SurfaceRequestWorker {
    async fn run(self, mut requests: mpsc::UnboundedReceiver<SurfaceRequest>) {
        while let Some(request) = requests.recv().await {
            debug!(
                "Surface re-requested for {} of key {}",
                request.use_case(),
                self.key
            );
            let rotation = self.camera.properties().sensor_rotation_degrees;
            let (texture, size) =
                match serve_surface_request(self.textures.as_ref(), request, rotation) {
                    Ok(served) => served,
                    Err(e) => {
                        warn!("Failed to serve surface request for key {}: {}", self.key, e);
                        continue;
                    }
                };

            let replaced = self
                .registry
                .update(self.key, |session| {
                    if !session.is_binding(&self.use_cases) {
                        return None;
                    }
                    let old = session.replace_render_target(texture.clone(), size);
                    self.events.emit(&texture_info_event(
                        self.key,
                        session.texture_info(self.orientation.get()),
                    ));
                    Some(old)
                })
                .await
                .flatten();

            match replaced {
                Some(old) => {
                    debug!(
                        "Session {} moved from texture {} to {}",
                        self.key,
                        old.id(),
                        texture.id()
                    );
                    old.release();
                }
                None => {
                    debug!("Surface request for unbound key {} discarded", self.key);
                    texture.release();
                }
            }
        }
        debug!("Surface request stream closed for key {}", self.key);
    }
}

/// A registered session the host has not been told about yet
///
/// Returned by a successful bind. Once the bind response is on its way,
/// [`Binding::announce`] emits the session's first texture-info event and
/// starts pushing torch events. Announcing a session that teardown or unbind
/// already removed does nothing.
#[must_use = "a binding emits no events until it is announced"]
pub struct Binding {
    pub capabilities: CameraCapabilities,
    key: SessionKey,
    camera: Arc<dyn Camera>,
    use_cases: Vec<UseCase>,
    registry: SessionRegistry,
    orientation: Arc<OrientationState>,
    events: EventStream,
}

impl Binding {
    pub async fn announce(self) {
        let announced = self
            .registry
            .update(self.key, |session| {
                if !session.is_binding(&self.use_cases) {
                    return false;
                }
                self.events.emit(&texture_info_event(
                    self.key,
                    session.texture_info(self.orientation.get()),
                ));
                session.set_torch_subscription(TorchSubscription::spawn(
                    self.key,
                    self.camera.torch_state(),
                    self.events.clone(),
                ));
                true
            })
            .await
            .unwrap_or(false);

        if !announced {
            debug!("Session {} was removed before it was announced", self.key);
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("capabilities", &self.capabilities)
            .field("key", &self.key)
            .field("camera", &self.camera.id())
            .field("use_cases", &self.use_cases)
            .finish()
    }
}

/// Session lifecycle manager for one attached activity
pub struct SessionController {
    activity: Arc<dyn Activity>,
    engine: EngineBinding,
    provider: Arc<SharedProvider>,
    events: EventStream,
    registry: SessionRegistry,
    orientation: Arc<OrientationState>,
    permissions: PermissionGate,
    watcher: Mutex<Option<OrientationWatcher>>,
}

impl SessionController {
    /// Build a controller and start watching the display rotation
    ///
    /// Must be called from within a Tokio runtime.
    pub fn attach(
        activity: Arc<dyn Activity>,
        engine: EngineBinding,
        provider: Arc<SharedProvider>,
        events: EventStream,
        config: &CameraXConfig,
    ) -> Self {
        let initial = activity.quarter_turns().unwrap_or_else(|e| {
            warn!("Could not read initial orientation, assuming 0: {}", e);
            QuarterTurns::ZERO
        });
        let orientation = Arc::new(OrientationState::new(initial));
        let registry = SessionRegistry::new();

        let watcher = OrientationWatcher::spawn(
            activity.clone(),
            registry.clone(),
            orientation.clone(),
            events.clone(),
            config.orientation_poll_interval(),
        );

        info!("Session controller attached at {} quarter turns", initial);

        Self {
            permissions: PermissionGate::new(activity.clone(), config.permission_request_code),
            activity,
            engine,
            provider,
            events,
            registry,
            orientation,
            watcher: Mutex::new(Some(watcher)),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn orientation(&self) -> QuarterTurns {
        self.orientation.get()
    }

    pub fn permissions(&self) -> &PermissionGate {
        &self.permissions
    }

    pub fn activity(&self) -> &Arc<dyn Activity> {
        &self.activity
    }

    /// Bind the camera selected by `args` to a fresh render target under `key`
    ///
    /// On success the session is registered and no event has been emitted
    /// yet; announce the returned [`Binding`] after answering the host.
    pub async fn bind(&self, key: SessionKey, args: BindArgs) -> Result<Binding> {
        if self.registry.contains(key).await {
            return Err(CameraError::AlreadyBound(key));
        }

        let facing = args.selector.facing;
        let operation = PendingOperation::Bind { key, facing };
        if let PermissionRequest::Pending(ticket) =
            self.permissions.request(CAMERA_PERMISSIONS, operation)?
        {
            if !ticket.outcome().await? {
                info!("Camera permission denied, bind {} dropped", key);
                return Err(CameraError::PermissionDenied(
                    "Permissions was denied by user.".to_string(),
                ));
            }
        }

        let provider = self.provider.get().await?;
        let lens = match facing {
            CameraFacing::Front => LensFacing::Front,
            CameraFacing::Back => LensFacing::Back,
            CameraFacing::Unrecognized => {
                return Err(CameraError::UnrecognizedEnum("camera facing".to_string()))
            }
        };

        let descriptor = provider
            .enumerate()
            .await?
            .into_iter()
            .find(|camera| camera.facing == lens)
            .ok_or_else(|| {
                CameraError::hardware(format!("No {} camera available", lens.as_str()))
            })?;

        let BoundCamera {
            camera,
            use_cases,
            mut surface_requests,
        } = provider.bind(&descriptor, &[UseCaseKind::Preview]).await?;
        debug!("Camera {} bound for key {}", camera.id(), key);

        let Some(request) = surface_requests.recv().await else {
            detach_use_cases(provider.as_ref(), &use_cases).await;
            return Err(CameraError::hardware(format!(
                "Camera {} closed before requesting a surface",
                camera.id()
            )));
        };

        let properties = camera.properties();
        let (texture, size) = match serve_surface_request(
            self.engine.textures.as_ref(),
            request,
            properties.sensor_rotation_degrees,
        ) {
            Ok(served) => served,
            Err(e) => {
                detach_use_cases(provider.as_ref(), &use_cases).await;
                return Err(e);
            }
        };

        let worker = SurfaceRequestWorker {
            key,
            camera: camera.clone(),
            use_cases: use_cases.clone(),
            textures: self.engine.textures.clone(),
            registry: self.registry.clone(),
            orientation: self.orientation.clone(),
            events: self.events.clone(),
        };
        let session = Session::new(key, camera.clone(), use_cases.clone(), texture, size)
            .with_surface_task(tokio::spawn(worker.run(surface_requests)));

        if let Err(InsertError { error, session }) = self.registry.insert(session).await {
            warn!("Discarding completed bind for key {}: {}", key, error);
            session.release();
            detach_use_cases(provider.as_ref(), &use_cases).await;
            return Err(error);
        }

        info!(
            "Session {} bound to camera {} ({}x{})",
            key,
            camera.id(),
            size.width,
            size.height
        );

        Ok(Binding {
            capabilities: CameraCapabilities {
                has_torch: properties.has_flash_unit,
            },
            key,
            camera,
            use_cases,
            registry: self.registry.clone(),
            orientation: self.orientation.clone(),
            events: self.events.clone(),
        })
    }

    /// Detach the session's use cases from the camera, then forget it
    ///
    /// The session is claimed before the hardware is touched, so of two
    /// concurrent unbinds only one succeeds. If detaching fails the session is
    /// put back and the error returned.
    pub async fn unbind(&self, key: SessionKey) -> Result<()> {
        let session = self.registry.remove(key).await?;

        let detached = match self.provider.get().await {
            Ok(provider) => provider.unbind(&session.use_cases).await,
            Err(e) => Err(e),
        };

        if let Err(e) = detached {
            warn!("Failed to unbind session {}: {}", key, e);
            if let Err(InsertError { error, session }) = self.registry.insert(session).await {
                debug!("Session {} not restored ({}), releasing", key, error);
                session.release();
            }
            return Err(e);
        }

        session.release();
        info!("Session {} unbound", key);
        Ok(())
    }

    /// Switch the torch of a bound session
    ///
    /// The resulting torch event arrives through the session's observation.
    pub async fn torch(&self, key: SessionKey, enabled: bool) -> Result<()> {
        let snapshot = self
            .registry
            .get(key)
            .await
            .ok_or(CameraError::NotFound(key))?;
        snapshot.camera.enable_torch(enabled)
    }

    /// Re-emit the session's metadata; a no-op for unbound keys
    pub async fn texture_info(&self, key: SessionKey) -> Result<()> {
        let emitted = self
            .registry
            .with_sessions(|sessions| match sessions.get(&key) {
                Some(session) => {
                    self.events.emit(&texture_info_event(
                        key,
                        session.texture_info(self.orientation.get()),
                    ));
                    true
                }
                None => false,
            })
            .await;

        if !emitted {
            debug!("Texture info requested for unbound key {}", key);
        }
        Ok(())
    }

    /// Release every session unconditionally and stop background work
    ///
    /// Pending binds fail with `ContextUnavailable`. Safe to call twice.
    pub async fn shutdown(&self) {
        let watcher = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(watcher) = watcher {
            watcher.join().await;
        }

        self.permissions.close();

        let sessions = self.registry.drain().await;
        if sessions.is_empty() {
            return;
        }

        let use_cases: Vec<UseCase> = sessions
            .iter()
            .flat_map(|session| session.use_cases.iter().copied())
            .collect();
        let count = sessions.len();
        for session in sessions {
            session.release();
        }
        info!("Released {} session(s) on teardown", count);

        match self.provider.get().await {
            Ok(provider) => detach_use_cases(provider.as_ref(), &use_cases).await,
            Err(e) => warn!("Camera provider unavailable during teardown: {}", e),
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.permissions.close();
    }
}

async fn detach_use_cases(provider: &dyn CameraProvider, use_cases: &[UseCase]) {
    if let Err(e) = provider.unbind(use_cases).await {
        warn!("Failed to detach {} use case(s): {}", use_cases.len(), e);
    }
}
