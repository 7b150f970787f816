//! Method call decoding and routing

use crate::message::{BindArgs, Message, MessageCategory, SessionKey};
use crate::plugin::CameraXPlugin;
use crate::{CameraError, Result};
use tracing::{debug, warn};

/// A decoded host request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Bind { key: SessionKey, args: BindArgs },
    Unbind { key: SessionKey },
    TextureInfo { key: SessionKey },
    Torch { key: SessionKey, state: bool },
}

impl Request {
    pub fn key(&self) -> SessionKey {
        match self {
            Self::Bind { key, .. }
            | Self::Unbind { key }
            | Self::TextureInfo { key }
            | Self::Torch { key, .. } => *key,
        }
    }
}

/// Decoding outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    Request(Request),
    /// Category the bridge does not serve as a request
    NotImplemented(MessageCategory),
}

/// Decode request bytes
///
/// Fails with `InvalidMessage` when the bytes are not a message or a
/// served category lacks its payload.
pub fn decode(data: &[u8]) -> Result<Decoded> {
    let message = Message::from_bytes(data)?;
    let key = message.key;

    let request = match message.category {
        MessageCategory::Bind => Request::Bind {
            key,
            args: message.bind_args.ok_or_else(|| {
                CameraError::InvalidMessage("bind request without bindArgs".to_string())
            })?,
        },
        MessageCategory::Unbind => Request::Unbind { key },
        MessageCategory::TextureInfo => Request::TextureInfo { key },
        MessageCategory::Torch => Request::Torch {
            key,
            state: message.torch_state.ok_or_else(|| {
                CameraError::InvalidMessage("torch request without torchState".to_string())
            })?,
        },
        category @ (MessageCategory::TextureInfoEvent
        | MessageCategory::TorchEvent
        | MessageCategory::AnalysisEvent
        | MessageCategory::Unrecognized) => return Ok(Decoded::NotImplemented(category)),
    };

    Ok(Decoded::Request(request))
}

/// Answer to one method call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodResult {
    /// Optional encoded payload
    Success(Option<Vec<u8>>),
    Error { code: String, message: String },
    NotImplemented,
}

impl MethodResult {
    pub fn from_error(error: &CameraError) -> Self {
        Self::Error {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<Result<()>> for MethodResult {
    fn from(result: Result<()>) -> Self {
        match result {
            Ok(()) => Self::Success(None),
            Err(e) => Self::from_error(&e),
        }
    }
}

fn log_failure(request: &Request, result: &MethodResult) {
    if let MethodResult::Error { code, message } = result {
        warn!("Request for key {} failed ({}): {}", request.key(), code, message);
    }
}

/// Decode `data`, run the request against `plugin` and answer through `respond`
///
/// `respond` is called exactly once. For a successful bind it is called
/// before the session's first events are emitted, so the host always sees
/// the bind response first.
pub async fn dispatch<R>(plugin: &CameraXPlugin, data: &[u8], respond: R)
where
    R: FnOnce(MethodResult),
{
    let request = match decode(data) {
        Ok(Decoded::Request(request)) => request,
        Ok(Decoded::NotImplemented(category)) => {
            if category.is_event() {
                debug!("Event category {} sent as a request", category.as_str());
            } else {
                debug!("No handler for category {}", category.as_str());
            }
            return respond(MethodResult::NotImplemented);
        }
        Err(e) => {
            warn!("Rejecting undecodable method call: {}", e);
            return respond(MethodResult::from_error(&e));
        }
    };

    debug!("Dispatching {:?}", request);

    let result = match request {
        Request::Bind { key, args } => match plugin.bind(key, args).await {
            Ok(binding) => {
                let result = match binding.capabilities.to_bytes() {
                    Ok(bytes) => MethodResult::Success(Some(bytes)),
                    Err(e) => MethodResult::from_error(&e),
                };
                log_failure(&request, &result);
                respond(result);
                binding.announce().await;
                return;
            }
            Err(e) => MethodResult::from_error(&e),
        },
        Request::Unbind { key } => plugin.unbind(key).await.into(),
        Request::TextureInfo { key } => plugin.texture_info(key).await.into(),
        Request::Torch { key, state } => plugin.torch(key, state).await.into(),
    };

    log_failure(&request, &result);
    respond(result);
}
