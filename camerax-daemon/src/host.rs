//! Simulated host driving the bridge
//!
//! Plays the part of the host application: owns the plugin, the simulated
//! activity and texture registry, and turns newline-delimited JSON commands
//! into lifecycle signals and method calls. Everything the bridge sends back
//! (method results, events, permission prompts) becomes an [`Output`] line.

use crate::config::Config;
use anyhow::{Context, Result};
use camerax_protocol::simulated::{
    SimulatedActivity, SimulatedProviderFactory, SimulatedTextureRegistry,
};
use camerax_protocol::{
    CameraXPlugin, EngineBinding, EventSink, MethodResult, PermissionResult, QuarterTurns,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// One command read from stdin
#[derive(Debug, Clone, Deserialize)]
pub struct CommandLine {
    /// Echoed back on the reply
    #[serde(default)]
    pub id: Option<u64>,

    #[serde(flatten)]
    pub command: HostCommand,
}

/// Host-side actions
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum HostCommand {
    /// Method call carrying a bridge message
    Call { message: Value },

    /// Answer to a permission prompt
    #[serde(rename_all = "camelCase")]
    PermissionResult { request_code: i32, granted: bool },

    /// Rotate the simulated display
    #[serde(rename_all = "camelCase")]
    Rotate { quarter_turns: u8 },

    Listen,
    Cancel,
    AttachEngine,
    DetachEngine,
    AttachActivity,
    DetachActivity,
    /// Detach and reattach as for a configuration change
    ReattachActivity,
}

/// Reply to one command
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum Response {
    Success {
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    Error {
        code: String,
        message: String,
    },
    NotImplemented,
}

impl Response {
    fn ok() -> Self {
        Self::Success { payload: None }
    }

    fn error(code: &str, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl From<MethodResult> for Response {
    fn from(result: MethodResult) -> Self {
        match result {
            MethodResult::Success(None) => Self::ok(),
            MethodResult::Success(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(payload) => Self::Success {
                    payload: Some(payload),
                },
                Err(e) => Self::error("invalid-message", format!("Undecodable payload: {}", e)),
            },
            MethodResult::Error { code, message } => Self::Error { code, message },
            MethodResult::NotImplemented => Self::NotImplemented,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,

    #[serde(flatten)]
    pub response: Response,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionPrompt {
    pub request_code: i32,
}

/// One stdout line
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Output {
    Response(Reply),
    Event(Value),
    PermissionRequest(PermissionPrompt),
}

/// Event sink writing bridge events to the output channel
struct OutputEventSink {
    tx: mpsc::UnboundedSender<Output>,
}

impl EventSink for OutputEventSink {
    fn success(&self, event: Vec<u8>) {
        match serde_json::from_slice(&event) {
            Ok(value) => {
                if self.tx.send(Output::Event(value)).is_err() {
                    debug!("Output closed, dropping event");
                }
            }
            Err(e) => warn!("Dropping undecodable event: {}", e),
        }
    }
}

/// The simulated host application
pub struct Host {
    plugin: Arc<CameraXPlugin>,
    activity: Arc<SimulatedActivity>,
    textures: Arc<SimulatedTextureRegistry>,
    output: mpsc::UnboundedSender<Output>,
}

impl Host {
    /// Attach engine and activity and start listening for events
    pub async fn start(config: &Config, output: mpsc::UnboundedSender<Output>) -> Result<Arc<Self>> {
        let initial = QuarterTurns::new(config.simulator.initial_quarter_turns)
            .context("initial_quarter_turns must be between 0 and 3")?;

        let factory = Arc::new(SimulatedProviderFactory::new(
            config.simulator.camera_config(),
        ));
        let plugin = Arc::new(CameraXPlugin::new(factory, config.plugin.clone()));
        let activity = Arc::new(SimulatedActivity::new(initial));
        activity.set_granted(config.simulator.permission_granted);

        let mut prompts = activity.subscribe_prompts();
        let prompt_tx = output.clone();
        tokio::spawn(async move {
            while let Some(request_code) = prompts.recv().await {
                let prompt = Output::PermissionRequest(PermissionPrompt { request_code });
                if prompt_tx.send(prompt).is_err() {
                    break;
                }
            }
        });

        let host = Arc::new(Self {
            plugin,
            activity,
            textures: Arc::new(SimulatedTextureRegistry::new()),
            output,
        });

        host.listen();
        host.attach_engine().await;
        host.plugin
            .on_attached_to_activity(host.activity.clone())
            .await
            .context("Failed to attach activity")?;

        info!(
            "Host ready with {} simulated camera(s)",
            config.simulator.cameras.len()
        );
        Ok(host)
    }

    /// Parse and run one stdin line
    pub async fn dispatch_line(self: &Arc<Self>, line: &str) {
        match serde_json::from_str::<CommandLine>(line) {
            Ok(command) => self.handle(command.id, command.command).await,
            Err(e) => {
                warn!("Ignoring malformed command: {}", e);
                self.reply(None, Response::error("invalid-command", e.to_string()));
            }
        }
    }

    /// Run one command and write its reply
    pub async fn handle(self: &Arc<Self>, id: Option<u64>, command: HostCommand) {
        debug!("Host command {:?}", command);

        let response = match command {
            HostCommand::Call { message } => return self.spawn_call(id, message),
            HostCommand::PermissionResult {
                request_code,
                granted,
            } => {
                self.activity.set_granted(granted);
                let result = if granted {
                    PermissionResult::Granted
                } else {
                    PermissionResult::Denied
                };
                let handled = self
                    .plugin
                    .on_request_permissions_result(request_code, &[result])
                    .await;
                Response::Success {
                    payload: Some(serde_json::json!({ "handled": handled })),
                }
            }
            HostCommand::Rotate { quarter_turns } => match QuarterTurns::new(quarter_turns) {
                Some(turns) => {
                    self.activity.rotate(turns);
                    Response::ok()
                }
                None => Response::error(
                    "invalid-command",
                    format!("quarterTurns {} is not between 0 and 3", quarter_turns),
                ),
            },
            HostCommand::Listen => {
                self.listen();
                Response::ok()
            }
            HostCommand::Cancel => {
                self.plugin.cancel();
                Response::ok()
            }
            HostCommand::AttachEngine => {
                self.attach_engine().await;
                Response::ok()
            }
            HostCommand::DetachEngine => {
                self.plugin.on_detached_from_engine().await;
                Response::ok()
            }
            HostCommand::AttachActivity => self.attach_activity().await,
            HostCommand::DetachActivity => {
                self.plugin.on_detached_from_activity().await;
                Response::ok()
            }
            HostCommand::ReattachActivity => {
                self.plugin
                    .on_detached_from_activity_for_config_changes()
                    .await;
                match self
                    .plugin
                    .on_reattached_to_activity_for_config_changes(self.activity.clone())
                    .await
                {
                    Ok(()) => Response::ok(),
                    Err(e) => MethodResult::from_error(&e).into(),
                }
            }
        };

        self.reply(id, response);
    }

    /// Serve a method call on its own task
    ///
    /// A bind waiting for permission must not block the permission result
    /// queued behind it. The reply is written from the plugin's responder so
    /// it lands ahead of any event the call triggers.
    fn spawn_call(self: &Arc<Self>, id: Option<u64>, message: Value) {
        let bytes = match serde_json::to_vec(&message) {
            Ok(bytes) => bytes,
            Err(e) => return self.reply(id, Response::error("invalid-message", e.to_string())),
        };

        let host = self.clone();
        tokio::spawn(async move {
            let responder = host.clone();
            host.plugin
                .handle_method_call(&bytes, move |result| responder.reply(id, result.into()))
                .await;
        });
    }

    /// Tear everything down
    pub async fn shutdown(&self) {
        self.plugin.on_detached_from_activity().await;
        self.plugin.on_detached_from_engine().await;
        self.plugin.cancel();
        info!(
            "Host shut down, {} render target(s) still live",
            self.textures.live_textures().len()
        );
    }

    fn listen(&self) {
        self.plugin.listen(Arc::new(OutputEventSink {
            tx: self.output.clone(),
        }));
    }

    async fn attach_engine(&self) {
        self.plugin
            .on_attached_to_engine(EngineBinding::new(self.textures.clone()))
            .await;
    }

    async fn attach_activity(&self) -> Response {
        match self
            .plugin
            .on_attached_to_activity(self.activity.clone())
            .await
        {
            Ok(()) => Response::ok(),
            Err(e) => MethodResult::from_error(&e).into(),
        }
    }

    fn reply(&self, id: Option<u64>, response: Response) {
        if self
            .output
            .send(Output::Response(Reply { id, response }))
            .is_err()
        {
            debug!("Output closed, dropping reply");
        }
    }
}
