//! CameraX Bridge Implementation
//!
//! This library exposes a device camera to a host application through a small
//! message protocol: the host binds a camera to a render target under a key of
//! its choosing, receives texture and torch metadata as events, and unbinds
//! when done.
//!
//! ## Layout
//!
//! - [`plugin`]: host lifecycle and the method-call entry point
//! - [`dispatcher`]: request decoding and routing
//! - [`controller`]: the per-activity session lifecycle
//! - [`registry`], [`session`]: active bindings
//! - [`permission`]: the permission prompt queue
//! - [`orientation`]: display rotation polling
//! - [`hardware`], [`host`]: traits for the camera stack and the host UI
//! - [`simulated`]: in-process implementations of those traits

pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod events;
pub mod hardware;
pub mod host;
pub mod message;
pub mod orientation;
pub mod permission;
pub mod plugin;
pub mod registry;
pub mod session;
pub mod simulated;

mod error;

#[cfg(test)]
mod test_utils;

pub use config::CameraXConfig;
pub use controller::{Binding, SessionController};
pub use dispatcher::{decode, dispatch, Decoded, MethodResult, Request};
pub use error::{CameraError, Result};
pub use events::{ChannelEventSink, EventSink, EventStream};
pub use hardware::{
    Camera, CameraDescriptor, CameraProvider, CameraProviderFactory, LensFacing, Resolution,
    SharedProvider, SurfaceRequest, TorchState,
};
pub use host::{Activity, EngineBinding, Permission, PermissionResult, SurfaceTexture, TextureRegistry};
pub use message::{
    BindArgs, CameraCapabilities, CameraFacing, Message, MessageCategory, SessionKey, TextureInfo,
    TextureSize,
};
pub use orientation::{OrientationWatcher, QuarterTurns};
pub use permission::{PendingOperation, PermissionGate};
pub use plugin::CameraXPlugin;
pub use registry::SessionRegistry;
pub use session::Session;
