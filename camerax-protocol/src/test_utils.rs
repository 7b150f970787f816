//! Shared fixtures for unit tests

use crate::hardware::{UseCase, UseCaseKind};
use crate::message::{SessionKey, TextureSize};
use crate::session::Session;
use crate::simulated::{SimulatedCamera, SimulatedSurfaceTexture};
use std::sync::Arc;

/// Session over a simulated back camera, texture id `100 + key`
pub fn bound_session(key: SessionKey) -> Session {
    bound_session_with_texture(key).0
}

pub fn bound_session_with_texture(key: SessionKey) -> (Session, Arc<SimulatedSurfaceTexture>) {
    let texture = Arc::new(SimulatedSurfaceTexture::new(100 + i64::from(key)));
    let session = Session::new(
        key,
        Arc::new(SimulatedCamera::new(format!("sim-{}", key), true, 90)),
        vec![UseCase {
            id: key as u64,
            kind: UseCaseKind::Preview,
        }],
        texture.clone(),
        TextureSize::new(480, 640),
    );
    (session, texture)
}
