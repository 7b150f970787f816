//! Error Handling Tests
//!
//! Failure paths through mock collaborators:
//! - Error classification and response codes
//! - Provider acquisition failures and retry on the next request
//! - Hardware failures during bind and unbind
//! - Orientation read failures in the background watcher

use async_trait::async_trait;
use camerax_protocol::hardware::{BoundCamera, UseCase, UseCaseKind};
use camerax_protocol::message::{bind_request, unbind_request};
use camerax_protocol::simulated::{
    SimulatedActivity, SimulatedCameraConfig, SimulatedProvider, SimulatedTextureRegistry,
};
use camerax_protocol::{
    CameraDescriptor, CameraError, CameraFacing, CameraProvider, CameraProviderFactory,
    CameraXConfig, CameraXPlugin, ChannelEventSink, EngineBinding, MethodResult, QuarterTurns,
    Result,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Provider wrapper with switchable failures
struct FlakyProvider {
    inner: SimulatedProvider,
    fail_unbind: AtomicBool,
}

#[async_trait]
impl CameraProvider for FlakyProvider {
    async fn enumerate(&self) -> Result<Vec<CameraDescriptor>> {
        self.inner.enumerate().await
    }

    async fn bind(&self, camera: &CameraDescriptor, kinds: &[UseCaseKind]) -> Result<BoundCamera> {
        self.inner.bind(camera, kinds).await
    }

    async fn unbind(&self, use_cases: &[UseCase]) -> Result<()> {
        if self.fail_unbind.load(Ordering::SeqCst) {
            return Err(CameraError::hardware("camera service died"));
        }
        self.inner.unbind(use_cases).await
    }
}

/// Factory failing the first `failures` acquisitions
struct FlakyFactory {
    provider: Arc<FlakyProvider>,
    failures: AtomicUsize,
}

impl FlakyFactory {
    fn new(failures: usize) -> Self {
        Self {
            provider: Arc::new(FlakyProvider {
                inner: SimulatedProvider::new(SimulatedCameraConfig::default()),
                fail_unbind: AtomicBool::new(false),
            }),
            failures: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl CameraProviderFactory for FlakyFactory {
    async fn acquire(&self) -> Result<Arc<dyn CameraProvider>> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(CameraError::hardware("provider not ready"));
        }
        Ok(self.provider.clone())
    }
}

async fn attached(factory: Arc<FlakyFactory>) -> (CameraXPlugin, Arc<SimulatedActivity>) {
    let plugin = CameraXPlugin::new(factory, CameraXConfig::default());
    let activity = Arc::new(SimulatedActivity::new(QuarterTurns::ZERO));
    plugin
        .on_attached_to_engine(EngineBinding::new(Arc::new(SimulatedTextureRegistry::new())))
        .await;
    plugin
        .on_attached_to_activity(activity.clone())
        .await
        .unwrap();
    (plugin, activity)
}

async fn call(plugin: &CameraXPlugin, message: camerax_protocol::Message) -> MethodResult {
    let mut answered = None;
    plugin
        .handle_method_call(&message.to_bytes().unwrap(), |result| answered = Some(result))
        .await;
    answered.expect("call was never answered")
}

/// Test error classification for user action required errors
#[test]
fn test_user_action_classification() {
    let error = CameraError::PermissionDenied("denied".to_string());
    assert!(error.requires_user_action());

    let error = CameraError::activity_detached();
    assert!(error.requires_user_action());

    let error = CameraError::hardware("bind failed");
    assert!(!error.requires_user_action());

    let error = CameraError::UnrecognizedEnum("camera facing".to_string());
    assert!(!error.requires_user_action());
}

/// Test user-facing messages never leak internal codes
#[test]
fn test_user_messages() {
    let message = CameraError::NotFound(4).user_message();
    assert!(message.contains('4'));
    assert!(!message.contains("not-found"));

    let message = CameraError::PermissionDenied(String::new()).user_message();
    assert!(message.contains("permission"));
}

#[tokio::test]
async fn test_failed_acquisition_is_retried_by_next_bind() {
    let (plugin, _activity) = attached(Arc::new(FlakyFactory::new(1))).await;

    let first = call(&plugin, bind_request(1, CameraFacing::Back)).await;
    match first {
        MethodResult::Error { code, message } => {
            assert_eq!(code, "hardware-failure");
            assert!(message.contains("provider not ready"));
        }
        other => panic!("unexpected {:?}", other),
    }

    let second = call(&plugin, bind_request(1, CameraFacing::Back)).await;
    assert!(second.is_success());
}

#[tokio::test]
async fn test_failed_unbind_keeps_session() {
    let factory = Arc::new(FlakyFactory::new(0));
    let (plugin, _activity) = attached(factory.clone()).await;
    assert!(call(&plugin, bind_request(1, CameraFacing::Back))
        .await
        .is_success());

    factory.provider.fail_unbind.store(true, Ordering::SeqCst);
    let result = call(&plugin, unbind_request(1)).await;
    assert!(matches!(result, MethodResult::Error { ref code, .. } if code == "hardware-failure"));

    let controller = plugin.controller().await.unwrap();
    assert!(controller.registry().contains(1).await);

    factory.provider.fail_unbind.store(false, Ordering::SeqCst);
    assert!(call(&plugin, unbind_request(1)).await.is_success());
}

#[tokio::test]
async fn test_teardown_survives_failing_provider() {
    let factory = Arc::new(FlakyFactory::new(0));
    let (plugin, _activity) = attached(factory.clone()).await;
    call(&plugin, bind_request(1, CameraFacing::Back)).await;
    call(&plugin, bind_request(2, CameraFacing::Front)).await;

    factory.provider.fail_unbind.store(true, Ordering::SeqCst);
    let controller = plugin.controller().await.unwrap();
    plugin.on_detached_from_activity().await;

    assert!(controller.registry().is_empty().await);
    assert!(!plugin.is_attached().await);
}

#[tokio::test]
async fn test_orientation_failure_is_skipped() {
    let (plugin, activity) = attached(Arc::new(FlakyFactory::new(0))).await;
    let (sink, mut events) = ChannelEventSink::channel();
    plugin.listen(Arc::new(sink));
    call(&plugin, bind_request(1, CameraFacing::Back)).await;
    while let Ok(Some(_)) = tokio::time::timeout(Duration::from_millis(50), events.recv()).await {}

    activity.fail_orientation(true);
    activity.rotate(QuarterTurns::new(2).unwrap());
    tokio::time::sleep(Duration::from_millis(250)).await;

    let controller = plugin.controller().await.unwrap();
    assert_eq!(controller.orientation(), QuarterTurns::ZERO);

    activity.fail_orientation(false);
    let rotated = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("no event after recovery")
        .unwrap();
    let message = camerax_protocol::Message::from_bytes(&rotated).unwrap();
    assert_eq!(message.texture_info.unwrap().quarter_turns.get(), 2);
}
