//! In-process camera stack and host
//!
//! Deterministic stand-ins for the hardware and host collaborators. Tests use
//! them directly; the daemon wires them to the plugin so the bridge can be
//! driven end to end without a device.

use crate::hardware::{
    BoundCamera, Camera, CameraDescriptor, CameraProperties, CameraProvider,
    CameraProviderFactory, LensFacing, Resolution, SurfaceRequest, TorchState, UseCase,
    UseCaseKind,
};
use crate::host::{Activity, Permission, Surface, SurfaceTexture, TextureRegistry};
use crate::orientation::QuarterTurns;
use crate::{CameraError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One simulated camera
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedCameraSpec {
    pub id: String,
    pub facing: LensFacing,
    #[serde(default)]
    pub has_flash_unit: bool,
    #[serde(default)]
    pub sensor_rotation_degrees: i32,
    #[serde(default = "default_resolution")]
    pub resolution: Resolution,
}

fn default_resolution() -> Resolution {
    Resolution::new(640, 480)
}

/// Cameras exposed by the simulated provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedCameraConfig {
    #[serde(default = "default_cameras")]
    pub cameras: Vec<SimulatedCameraSpec>,
}

fn default_cameras() -> Vec<SimulatedCameraSpec> {
    vec![
        SimulatedCameraSpec {
            id: "0".to_string(),
            facing: LensFacing::Back,
            has_flash_unit: true,
            sensor_rotation_degrees: 90,
            resolution: default_resolution(),
        },
        SimulatedCameraSpec {
            id: "1".to_string(),
            facing: LensFacing::Front,
            has_flash_unit: false,
            sensor_rotation_degrees: 270,
            resolution: default_resolution(),
        },
    ]
}

impl Default for SimulatedCameraConfig {
    fn default() -> Self {
        Self {
            cameras: default_cameras(),
        }
    }
}

/// Camera whose torch is a `watch` channel
pub struct SimulatedCamera {
    id: String,
    properties: CameraProperties,
    torch: watch::Sender<TorchState>,
}

impl SimulatedCamera {
    pub fn new(id: impl Into<String>, has_flash_unit: bool, sensor_rotation_degrees: i32) -> Self {
        let (torch, _) = watch::channel(TorchState::Off);
        Self {
            id: id.into(),
            properties: CameraProperties {
                has_flash_unit,
                sensor_rotation_degrees,
            },
            torch,
        }
    }

    pub fn torch(&self) -> TorchState {
        *self.torch.borrow()
    }
}

impl Camera for SimulatedCamera {
    fn id(&self) -> &str {
        &self.id
    }

    fn properties(&self) -> CameraProperties {
        self.properties
    }

    fn enable_torch(&self, enabled: bool) -> Result<()> {
        if !self.properties.has_flash_unit {
            return Err(CameraError::hardware(format!(
                "Camera {} has no flash unit",
                self.id
            )));
        }
        self.torch.send_replace(TorchState::from(enabled));
        debug!("Camera {} torch {}", self.id, if enabled { "on" } else { "off" });
        Ok(())
    }

    fn torch_state(&self) -> watch::Receiver<TorchState> {
        self.torch.subscribe()
    }
}

struct Binding {
    camera_id: String,
    resolution: Resolution,
    use_cases: Vec<UseCase>,
    requests: mpsc::UnboundedSender<SurfaceRequest>,
}

#[derive(Default)]
struct ProviderState {
    next_use_case_id: u64,
    bindings: Vec<Binding>,
    unbound: Vec<UseCase>,
    waiting_surfaces: Vec<(UseCase, oneshot::Receiver<Surface>)>,
    provided_surfaces: Vec<(UseCase, Surface)>,
    fail_next_bind: Option<String>,
    withhold_next_surface: bool,
    hold_next_surface: bool,
    held_surfaces: Vec<(UseCase, Resolution)>,
}

impl ProviderState {
    /// Record surfaces the bridge handed over and forget abandoned requests
    fn settle_surfaces(&mut self) {
        let waiting = std::mem::take(&mut self.waiting_surfaces);
        for (use_case, mut rx) in waiting {
            match rx.try_recv() {
                Ok(surface) => self.provided_surfaces.push((use_case, surface)),
                Err(oneshot::error::TryRecvError::Empty) => {
                    self.waiting_surfaces.push((use_case, rx))
                }
                Err(oneshot::error::TryRecvError::Closed) => {}
            }
        }
    }

    fn forget(&mut self, use_cases: &[UseCase]) {
        self.waiting_surfaces
            .retain(|(use_case, _)| !use_cases.contains(use_case));
        self.provided_surfaces
            .retain(|(use_case, _)| !use_cases.contains(use_case));
        self.held_surfaces
            .retain(|(use_case, _)| !use_cases.contains(use_case));
    }
}

/// Provider over a fixed set of simulated cameras
pub struct SimulatedProvider {
    specs: Vec<SimulatedCameraSpec>,
    cameras: HashMap<String, Arc<SimulatedCamera>>,
    state: Mutex<ProviderState>,
}

impl SimulatedProvider {
    pub fn new(config: SimulatedCameraConfig) -> Self {
        let cameras = config
            .cameras
            .iter()
            .map(|spec| {
                (
                    spec.id.clone(),
                    Arc::new(SimulatedCamera::new(
                        spec.id.clone(),
                        spec.has_flash_unit,
                        spec.sensor_rotation_degrees,
                    )),
                )
            })
            .collect();

        Self {
            specs: config.cameras,
            cameras,
            state: Mutex::new(ProviderState::default()),
        }
    }

    /// Make the next bind fail with a hardware error
    pub fn fail_next_bind(&self, reason: impl Into<String>) {
        lock(&self.state).fail_next_bind = Some(reason.into());
    }

    /// Close the surface request stream of the next bind without a request
    pub fn withhold_next_surface(&self) {
        lock(&self.state).withhold_next_surface = true;
    }

    /// Keep the surface requests of the next bind until
    /// [`release_held_surfaces`](Self::release_held_surfaces)
    pub fn hold_next_surface(&self) {
        lock(&self.state).hold_next_surface = true;
    }

    /// Send every held surface request; returns how many went out
    pub fn release_held_surfaces(&self) -> usize {
        let mut state = lock(&self.state);
        let held = std::mem::take(&mut state.held_surfaces);
        let mut sent = 0;
        for (use_case, resolution) in held {
            let Some(binding) = state
                .bindings
                .iter()
                .find(|binding| binding.use_cases.contains(&use_case))
            else {
                continue;
            };
            let (request, rx) = SurfaceRequest::new(use_case, resolution);
            if binding.requests.send(request).is_ok() {
                state.waiting_surfaces.push((use_case, rx));
                sent += 1;
            }
        }
        sent
    }

    /// Re-request a surface for the first use case bound to `camera_id`
    pub fn request_new_surface(&self, camera_id: &str, resolution: Resolution) -> bool {
        let mut state = lock(&self.state);
        let Some(binding) = state
            .bindings
            .iter()
            .find(|binding| binding.camera_id == camera_id)
        else {
            return false;
        };
        let Some(use_case) = binding.use_cases.first().copied() else {
            return false;
        };

        let (request, rx) = SurfaceRequest::new(use_case, resolution);
        if binding.requests.send(request).is_err() {
            return false;
        }
        state.waiting_surfaces.push((use_case, rx));
        true
    }

    /// Use cases currently attached to a camera
    pub fn bound_use_cases(&self) -> Vec<UseCase> {
        lock(&self.state)
            .bindings
            .iter()
            .flat_map(|binding| binding.use_cases.iter().copied())
            .collect()
    }

    pub fn unbound_use_cases(&self) -> Vec<UseCase> {
        lock(&self.state).unbound.clone()
    }

    /// Surfaces handed over by the bridge so far
    pub fn provided_surfaces(&self) -> Vec<(UseCase, Surface)> {
        let mut state = lock(&self.state);
        state.settle_surfaces();
        state.provided_surfaces.clone()
    }
}

#[async_trait]
impl CameraProvider for SimulatedProvider {
    async fn enumerate(&self) -> Result<Vec<CameraDescriptor>> {
        Ok(self
            .specs
            .iter()
            .map(|spec| CameraDescriptor::new(spec.id.clone(), spec.facing))
            .collect())
    }

    async fn bind(&self, camera: &CameraDescriptor, kinds: &[UseCaseKind]) -> Result<BoundCamera> {
        tokio::task::yield_now().await;

        let spec = self
            .specs
            .iter()
            .find(|spec| spec.id == camera.id)
            .ok_or_else(|| CameraError::hardware(format!("Unknown camera {}", camera.id)))?;
        let handle = self
            .cameras
            .get(&spec.id)
            .cloned()
            .ok_or_else(|| CameraError::hardware(format!("Unknown camera {}", camera.id)))?;

        let mut state = lock(&self.state);
        state.settle_surfaces();
        if let Some(reason) = state.fail_next_bind.take() {
            return Err(CameraError::hardware(reason));
        }

        let use_cases: Vec<UseCase> = kinds
            .iter()
            .map(|kind| {
                state.next_use_case_id += 1;
                UseCase {
                    id: state.next_use_case_id,
                    kind: *kind,
                }
            })
            .collect();

        let (tx, rx) = mpsc::unbounded_channel();
        if std::mem::take(&mut state.withhold_next_surface) {
            drop(tx);
        } else {
            let hold = std::mem::take(&mut state.hold_next_surface);
            for use_case in &use_cases {
                if hold {
                    state.held_surfaces.push((*use_case, spec.resolution));
                    continue;
                }
                let (request, surface_rx) = SurfaceRequest::new(*use_case, spec.resolution);
                // The receiver is held below, so the send cannot fail
                let _ = tx.send(request);
                state.waiting_surfaces.push((*use_case, surface_rx));
            }
            state.bindings.push(Binding {
                camera_id: spec.id.clone(),
                resolution: spec.resolution,
                use_cases: use_cases.clone(),
                requests: tx,
            });
        }

        info!(
            "Bound {} use case(s) to simulated camera {}",
            use_cases.len(),
            spec.id
        );

        Ok(BoundCamera {
            camera: handle,
            use_cases,
            surface_requests: rx,
        })
    }

    async fn unbind(&self, use_cases: &[UseCase]) -> Result<()> {
        tokio::task::yield_now().await;

        let mut state = lock(&self.state);
        for binding in &mut state.bindings {
            binding.use_cases.retain(|use_case| !use_cases.contains(use_case));
        }
        state.bindings.retain(|binding| {
            let keep = !binding.use_cases.is_empty();
            if !keep {
                debug!(
                    "Simulated camera {} closed ({}x{})",
                    binding.camera_id, binding.resolution.width, binding.resolution.height
                );
            }
            keep
        });
        state.forget(use_cases);
        state.settle_surfaces();
        state.unbound.extend_from_slice(use_cases);
        Ok(())
    }
}

/// Factory handing out one shared [`SimulatedProvider`]
pub struct SimulatedProviderFactory {
    provider: Arc<SimulatedProvider>,
    acquisitions: AtomicUsize,
    fail_next: AtomicBool,
}

impl SimulatedProviderFactory {
    pub fn new(config: SimulatedCameraConfig) -> Self {
        Self {
            provider: Arc::new(SimulatedProvider::new(config)),
            acquisitions: AtomicUsize::new(0),
            fail_next: AtomicBool::new(false),
        }
    }

    pub fn provider(&self) -> Arc<SimulatedProvider> {
        self.provider.clone()
    }

    /// Number of acquire attempts, failed ones included
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    pub fn fail_next_acquire(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl CameraProviderFactory for SimulatedProviderFactory {
    async fn acquire(&self) -> Result<Arc<dyn CameraProvider>> {
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;

        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(CameraError::hardware("Camera service unavailable"));
        }
        Ok(self.provider.clone())
    }
}

/// Render target that only records what was done to it
#[derive(Debug)]
pub struct SimulatedSurfaceTexture {
    id: i64,
    buffer_size: Mutex<Option<Resolution>>,
    released: AtomicBool,
}

impl SimulatedSurfaceTexture {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            buffer_size: Mutex::new(None),
            released: AtomicBool::new(false),
        }
    }

    pub fn buffer_size(&self) -> Option<Resolution> {
        *lock(&self.buffer_size)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl SurfaceTexture for SimulatedSurfaceTexture {
    fn id(&self) -> i64 {
        self.id
    }

    fn set_default_buffer_size(&self, resolution: Resolution) {
        *lock(&self.buffer_size) = Some(resolution);
    }

    fn surface(&self) -> Surface {
        Surface {
            texture_id: self.id,
            buffer_size: self.buffer_size().unwrap_or(Resolution::new(0, 0)),
        }
    }

    fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Allocator issuing sequential texture ids from zero
#[derive(Debug, Default)]
pub struct SimulatedTextureRegistry {
    next_id: AtomicI64,
    textures: Mutex<Vec<Arc<SimulatedSurfaceTexture>>>,
}

impl SimulatedTextureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of textures not yet released
    pub fn live_textures(&self) -> Vec<i64> {
        lock(&self.textures)
            .iter()
            .filter(|texture| !texture.is_released())
            .map(|texture| texture.id)
            .collect()
    }

    pub fn released_textures(&self) -> Vec<i64> {
        lock(&self.textures)
            .iter()
            .filter(|texture| texture.is_released())
            .map(|texture| texture.id)
            .collect()
    }
}

impl TextureRegistry for SimulatedTextureRegistry {
    fn create_surface_texture(&self) -> Arc<dyn SurfaceTexture> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let texture = Arc::new(SimulatedSurfaceTexture::new(id));
        lock(&self.textures).push(texture.clone());
        texture
    }
}

/// Activity with a settable rotation and permission state
#[derive(Debug)]
pub struct SimulatedActivity {
    quarter_turns: AtomicU8,
    orientation_fails: AtomicBool,
    granted: AtomicBool,
    permission_requests: Mutex<Vec<i32>>,
    prompt_tx: Mutex<Option<mpsc::UnboundedSender<i32>>>,
}

impl SimulatedActivity {
    /// Start at `initial` rotation with the camera permission granted
    pub fn new(initial: QuarterTurns) -> Self {
        Self {
            quarter_turns: AtomicU8::new(initial.get()),
            orientation_fails: AtomicBool::new(false),
            granted: AtomicBool::new(true),
            permission_requests: Mutex::new(Vec::new()),
            prompt_tx: Mutex::new(None),
        }
    }

    pub fn rotate(&self, turns: QuarterTurns) {
        self.quarter_turns.store(turns.get(), Ordering::SeqCst);
    }

    pub fn fail_orientation(&self, fail: bool) {
        self.orientation_fails.store(fail, Ordering::SeqCst);
    }

    pub fn set_granted(&self, granted: bool) {
        self.granted.store(granted, Ordering::SeqCst);
    }

    /// Request codes of every permission prompt shown
    pub fn permission_requests(&self) -> Vec<i32> {
        lock(&self.permission_requests).clone()
    }

    /// Receive the request code of each prompt as it is shown
    pub fn subscribe_prompts(&self) -> mpsc::UnboundedReceiver<i32> {
        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&self.prompt_tx) = Some(tx);
        rx
    }
}

impl Activity for SimulatedActivity {
    fn quarter_turns(&self) -> Result<QuarterTurns> {
        if self.orientation_fails.load(Ordering::SeqCst) {
            return Err(CameraError::ContextUnavailable(
                "Display is not available".to_string(),
            ));
        }
        QuarterTurns::try_from(self.quarter_turns.load(Ordering::SeqCst))
    }

    fn check_permission(&self, _permission: Permission) -> bool {
        self.granted.load(Ordering::SeqCst)
    }

    fn request_permissions(&self, permissions: &[Permission], request_code: i32) {
        debug!(
            "Permission prompt for {} permission(s), code {}",
            permissions.len(),
            request_code
        );
        lock(&self.permission_requests).push(request_code);
        if let Some(tx) = lock(&self.prompt_tx).as_ref() {
            let _ = tx.send(request_code);
        }
    }
}
