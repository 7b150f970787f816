//! Camera bridge plugin
//!
//! [`CameraXPlugin`] is the object the host keeps for the whole process. It
//! follows the host's lifecycle signals and creates a [`SessionController`]
//! when an activity attaches to an attached engine. Everything that needs the
//! camera goes through that controller; without one, requests fail with
//! `ContextUnavailable`.
//!
//! ```text
//! engine attach ──► activity attach ──► controller ──► activity detach
//!                         ▲                                  │
//!                         └──── reattach (config change) ◄───┘
//! ```

use crate::config::CameraXConfig;
use crate::controller::{Binding, SessionController};
use crate::dispatcher::{self, MethodResult};
use crate::events::{EventSink, EventStream};
use crate::hardware::{CameraProviderFactory, SharedProvider};
use crate::host::{Activity, EngineBinding, PermissionResult};
use crate::message::{BindArgs, SessionKey};
use crate::{CameraError, Result};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Default)]
struct HostContext {
    engine: Option<EngineBinding>,
    activity: Option<Arc<dyn Activity>>,
    controller: Option<Arc<SessionController>>,
}

/// Host-facing entry point of the camera bridge
pub struct CameraXPlugin {
    config: CameraXConfig,
    provider: Arc<SharedProvider>,
    events: EventStream,
    context: RwLock<HostContext>,
}

impl CameraXPlugin {
    pub fn new(factory: Arc<dyn CameraProviderFactory>, config: CameraXConfig) -> Self {
        Self {
            config,
            provider: Arc::new(SharedProvider::new(factory)),
            events: EventStream::new(),
            context: RwLock::new(HostContext::default()),
        }
    }

    pub async fn on_attached_to_engine(&self, engine: EngineBinding) {
        self.context.write().await.engine = Some(engine);
        info!("Attached to engine");
    }

    /// Forget the engine; any live controller is torn down with it
    pub async fn on_detached_from_engine(&self) {
        let mut context = self.context.write().await;
        if let Some(controller) = context.controller.take() {
            controller.shutdown().await;
        }
        context.activity = None;
        context.engine = None;
        info!("Detached from engine");
    }

    /// Start serving camera requests for `activity`
    ///
    /// Requires an attached engine. A controller left over from a previous
    /// activity is torn down first.
    pub async fn on_attached_to_activity(&self, activity: Arc<dyn Activity>) -> Result<()> {
        let mut context = self.context.write().await;
        let engine = context
            .engine
            .clone()
            .ok_or_else(CameraError::engine_detached)?;

        if let Some(previous) = context.controller.take() {
            warn!("Activity attached twice, tearing down previous controller");
            previous.shutdown().await;
        }

        let controller = SessionController::attach(
            activity.clone(),
            engine,
            self.provider.clone(),
            self.events.clone(),
            &self.config,
        );
        context.controller = Some(Arc::new(controller));
        context.activity = Some(activity);
        info!("Attached to activity");
        Ok(())
    }

    /// Release every session before the activity reference is dropped
    pub async fn on_detached_from_activity(&self) {
        let mut context = self.context.write().await;
        if let Some(controller) = context.controller.take() {
            controller.shutdown().await;
        }
        context.activity = None;
        info!("Detached from activity");
    }

    pub async fn on_detached_from_activity_for_config_changes(&self) {
        debug!("Detaching for configuration change");
        self.on_detached_from_activity().await;
    }

    pub async fn on_reattached_to_activity_for_config_changes(
        &self,
        activity: Arc<dyn Activity>,
    ) -> Result<()> {
        debug!("Reattaching after configuration change");
        self.on_attached_to_activity(activity).await
    }

    /// Deliver a permission result from the host
    ///
    /// Returns whether the result belonged to this bridge.
    pub async fn on_request_permissions_result(
        &self,
        request_code: i32,
        results: &[PermissionResult],
    ) -> bool {
        match self.context.read().await.controller.as_ref() {
            Some(controller) => controller
                .permissions()
                .handle_result(request_code, results),
            None => {
                debug!("Permission result {} with no activity attached", request_code);
                false
            }
        }
    }

    /// Install the host's event sink
    pub fn listen(&self, sink: Arc<dyn EventSink>) {
        self.events.listen(sink);
    }

    pub fn cancel(&self) {
        self.events.cancel();
    }

    pub async fn is_attached(&self) -> bool {
        self.context.read().await.controller.is_some()
    }

    /// Current controller, or why there is none
    pub async fn controller(&self) -> Result<Arc<SessionController>> {
        let context = self.context.read().await;
        if context.engine.is_none() {
            return Err(CameraError::engine_detached());
        }
        context
            .controller
            .clone()
            .ok_or_else(CameraError::activity_detached)
    }

    /// Bind through the current controller; see [`SessionController::bind`]
    pub async fn bind(&self, key: SessionKey, args: BindArgs) -> Result<Binding> {
        self.controller().await?.bind(key, args).await
    }

    /// Unbind a session; without an activity no session can exist
    pub async fn unbind(&self, key: SessionKey) -> Result<()> {
        match self.controller().await {
            Ok(controller) => controller.unbind(key).await,
            Err(CameraError::ContextUnavailable(_)) if self.has_engine().await => {
                Err(CameraError::NotFound(key))
            }
            Err(e) => Err(e),
        }
    }

    /// Re-emit a session's metadata; succeeds silently when nothing is bound
    pub async fn texture_info(&self, key: SessionKey) -> Result<()> {
        match self.controller().await {
            Ok(controller) => controller.texture_info(key).await,
            Err(e) => {
                debug!("Texture info for key {} without a controller: {}", key, e);
                Ok(())
            }
        }
    }

    pub async fn torch(&self, key: SessionKey, enabled: bool) -> Result<()> {
        match self.controller().await {
            Ok(controller) => controller.torch(key, enabled).await,
            Err(CameraError::ContextUnavailable(_)) if self.has_engine().await => {
                Err(CameraError::NotFound(key))
            }
            Err(e) => Err(e),
        }
    }

    /// Decode and serve one method call, answering through `respond`
    pub async fn handle_method_call<R>(&self, data: &[u8], respond: R)
    where
        R: FnOnce(MethodResult),
    {
        dispatcher::dispatch(self, data, respond).await
    }

    async fn has_engine(&self) -> bool {
        self.context.read().await.engine.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{bind_request, CameraFacing, Message};
    use crate::orientation::QuarterTurns;
    use crate::simulated::{
        SimulatedActivity, SimulatedCameraConfig, SimulatedProviderFactory,
        SimulatedTextureRegistry,
    };
    use std::sync::Mutex;
    use std::time::Duration;

    /// Sink writing event categories into a log shared with the responder
    struct RecordingSink(Arc<Mutex<Vec<String>>>);

    impl EventSink for RecordingSink {
        fn success(&self, event: Vec<u8>) {
            let message = Message::from_bytes(&event).unwrap();
            self.0
                .lock()
                .unwrap()
                .push(message.category.as_str().to_string());
        }
    }

    fn plugin() -> CameraXPlugin {
        CameraXPlugin::new(
            Arc::new(SimulatedProviderFactory::new(
                SimulatedCameraConfig::default(),
            )),
            CameraXConfig::default(),
        )
    }

    fn engine() -> EngineBinding {
        EngineBinding::new(Arc::new(SimulatedTextureRegistry::new()))
    }

    fn activity() -> Arc<SimulatedActivity> {
        Arc::new(SimulatedActivity::new(QuarterTurns::ZERO))
    }

    #[tokio::test]
    async fn test_bind_without_engine() {
        let plugin = plugin();
        let result = plugin.bind(1, BindArgs::new(CameraFacing::Back)).await;
        match result {
            Err(CameraError::ContextUnavailable(msg)) => {
                assert_eq!(msg, "Engine has been detached.")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_activity_requires_engine() {
        let plugin = plugin();
        assert!(plugin.on_attached_to_activity(activity()).await.is_err());
        assert!(!plugin.is_attached().await);
    }

    #[tokio::test]
    async fn test_bind_without_activity() {
        let plugin = plugin();
        plugin.on_attached_to_engine(engine()).await;

        let result = plugin.bind(1, BindArgs::new(CameraFacing::Back)).await;
        assert!(matches!(result, Err(CameraError::ContextUnavailable(_))));
        assert!(matches!(
            plugin.unbind(1).await,
            Err(CameraError::NotFound(1))
        ));
        assert!(plugin.texture_info(1).await.is_ok());
    }

    #[tokio::test]
    async fn test_config_change_drops_sessions() {
        let plugin = plugin();
        plugin.on_attached_to_engine(engine()).await;
        plugin.on_attached_to_activity(activity()).await.unwrap();
        plugin
            .bind(1, BindArgs::new(CameraFacing::Back))
            .await
            .unwrap()
            .announce()
            .await;

        plugin.on_detached_from_activity_for_config_changes().await;
        assert!(!plugin.is_attached().await);

        plugin
            .on_reattached_to_activity_for_config_changes(activity())
            .await
            .unwrap();
        let controller = plugin.controller().await.unwrap();
        assert!(controller.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_permission_result_without_activity() {
        let plugin = plugin();
        assert!(
            !plugin
                .on_request_permissions_result(3543, &[PermissionResult::Granted])
                .await
        );
    }

    #[tokio::test]
    async fn test_engine_detach_tears_down() {
        let plugin = plugin();
        plugin.on_attached_to_engine(engine()).await;
        plugin.on_attached_to_activity(activity()).await.unwrap();
        plugin
            .bind(1, BindArgs::new(CameraFacing::Back))
            .await
            .unwrap()
            .announce()
            .await;

        plugin.on_detached_from_engine().await;
        assert!(!plugin.is_attached().await);
        assert!(matches!(
            plugin.unbind(1).await,
            Err(CameraError::ContextUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_bind_response_precedes_first_events() {
        let plugin = plugin();
        plugin.on_attached_to_engine(engine()).await;
        plugin.on_attached_to_activity(activity()).await.unwrap();

        let log = Arc::new(Mutex::new(Vec::new()));
        plugin.listen(Arc::new(RecordingSink(log.clone())));

        let request = bind_request(1, CameraFacing::Back).to_bytes().unwrap();
        let responses = log.clone();
        plugin
            .handle_method_call(&request, move |result| {
                assert!(result.is_success());
                responses.lock().unwrap().push("response".to_string());
            })
            .await;

        // The initial torch event comes from the observation task
        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                let len = log.lock().unwrap().len();
                if len >= 3 {
                    break;
                }
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("bind events never arrived");

        assert_eq!(
            *log.lock().unwrap(),
            vec!["response", "textureInfoEvent", "torchEvent"]
        );
    }
}
