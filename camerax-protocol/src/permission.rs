//! Runtime permission handling
//!
//! The permission prompt is host UI: it is shown once and answered later
//! through a permission result carrying the request code it was opened with.
//! Binds that need the camera while the prompt is up queue a
//! [`PendingOperation`] and wait on a ticket; the result resolves the whole
//! queue with one outcome.
//!
//! ```text
//! request ──► granted? ──yes──► PermissionRequest::Granted
//!                │no
//!                ▼
//!         queue operation ──first in queue?──► activity.request_permissions()
//!                │
//!                ▼
//!         PermissionTicket ◄── resolve(code, granted) wakes every ticket once
//! ```

use crate::host::{Activity, Permission, PermissionResult};
use crate::message::{CameraFacing, SessionKey};
use crate::{CameraError, Result};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Permissions a camera bind needs
pub const CAMERA_PERMISSIONS: &[Permission] = &[Permission::Camera];

/// Operation parked until the permission prompt is answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingOperation {
    Bind { key: SessionKey, facing: CameraFacing },
}

impl PendingOperation {
    pub fn key(&self) -> SessionKey {
        match self {
            Self::Bind { key, .. } => *key,
        }
    }
}

struct PendingEntry {
    operation: PendingOperation,
    responder: oneshot::Sender<bool>,
}

#[derive(Default)]
struct GateState {
    pending: Vec<PendingEntry>,
    closed: bool,
}

/// Outcome of asking for permissions
#[derive(Debug)]
pub enum PermissionRequest {
    /// Already granted, proceed now
    Granted,
    /// Queued behind the permission prompt
    Pending(PermissionTicket),
}

/// Wait handle for a queued operation
#[derive(Debug)]
pub struct PermissionTicket {
    rx: oneshot::Receiver<bool>,
}

impl PermissionTicket {
    /// Wait for the user's answer
    ///
    /// Fails with `ContextUnavailable` if the gate closes first.
    pub async fn outcome(self) -> Result<bool> {
        self.rx.await.map_err(|_| CameraError::activity_detached())
    }
}

/// Queue of operations waiting for the permission prompt
pub struct PermissionGate {
    activity: Arc<dyn Activity>,
    request_code: i32,
    state: Mutex<GateState>,
}

impl PermissionGate {
    pub fn new(activity: Arc<dyn Activity>, request_code: i32) -> Self {
        Self {
            activity,
            request_code,
            state: Mutex::new(GateState::default()),
        }
    }

    /// Ask for `permissions` on behalf of `operation`
    ///
    /// Shows the prompt only when the queue was empty.
    pub fn request(
        &self,
        permissions: &[Permission],
        operation: PendingOperation,
    ) -> Result<PermissionRequest> {
        if permissions
            .iter()
            .all(|permission| self.activity.check_permission(*permission))
        {
            return Ok(PermissionRequest::Granted);
        }

        let (responder, rx) = oneshot::channel();
        let first = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.closed {
                return Err(CameraError::activity_detached());
            }
            state.pending.push(PendingEntry {
                operation,
                responder,
            });
            state.pending.len() == 1
        };

        if first {
            info!(
                "Requesting {:?} for {:?}",
                permissions.iter().map(Permission::as_str).collect::<Vec<_>>(),
                operation
            );
            self.activity
                .request_permissions(permissions, self.request_code);
        } else {
            debug!("Permission prompt already open, queued {:?}", operation);
        }

        Ok(PermissionRequest::Pending(PermissionTicket { rx }))
    }

    /// Resolve every queued operation with `granted`
    ///
    /// Returns `false` and leaves the queue alone when `request_code` belongs
    /// to someone else.
    pub fn resolve(&self, request_code: i32, granted: bool) -> bool {
        if request_code != self.request_code {
            return false;
        }

        let pending = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut state.pending)
        };

        info!(
            "Permission {} for {} pending operation(s)",
            if granted { "granted" } else { "denied" },
            pending.len()
        );

        for entry in pending {
            if entry.responder.send(granted).is_err() {
                debug!(
                    "Operation for key {} stopped waiting for permission",
                    entry.operation.key()
                );
            }
        }
        true
    }

    /// Resolve from the host's per-permission results
    ///
    /// An empty result list means the prompt was interrupted and counts as a
    /// denial.
    pub fn handle_result(&self, request_code: i32, results: &[PermissionResult]) -> bool {
        let granted =
            !results.is_empty() && results.iter().all(|r| *r == PermissionResult::Granted);
        if results.is_empty() && request_code == self.request_code {
            warn!("Permission prompt was interrupted");
        }
        self.resolve(request_code, granted)
    }

    /// Operations currently waiting
    pub fn pending(&self) -> Vec<PendingOperation> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .iter()
            .map(|entry| entry.operation)
            .collect()
    }

    /// Refuse new requests and wake every waiter with `ContextUnavailable`
    pub fn close(&self) {
        let dropped = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.closed = true;
            std::mem::take(&mut state.pending)
        };
        if !dropped.is_empty() {
            debug!("Dropping {} pending permission request(s)", dropped.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orientation::QuarterTurns;
    use crate::simulated::SimulatedActivity;

    const CODE: i32 = 3543;

    fn bind(key: SessionKey) -> PendingOperation {
        PendingOperation::Bind {
            key,
            facing: CameraFacing::Back,
        }
    }

    fn ungranted() -> Arc<SimulatedActivity> {
        let activity = Arc::new(SimulatedActivity::new(QuarterTurns::ZERO));
        activity.set_granted(false);
        activity
    }

    #[tokio::test]
    async fn test_granted_skips_queue() {
        let activity = Arc::new(SimulatedActivity::new(QuarterTurns::ZERO));
        let gate = PermissionGate::new(activity.clone(), CODE);

        let request = gate.request(CAMERA_PERMISSIONS, bind(1)).unwrap();
        assert!(matches!(request, PermissionRequest::Granted));
        assert!(gate.pending().is_empty());
        assert!(activity.permission_requests().is_empty());
    }

    #[tokio::test]
    async fn test_prompt_shown_once_for_many_requests() {
        let activity = ungranted();
        let gate = PermissionGate::new(activity.clone(), CODE);

        let mut tickets = Vec::new();
        for key in 0..3 {
            match gate.request(CAMERA_PERMISSIONS, bind(key)).unwrap() {
                PermissionRequest::Pending(ticket) => tickets.push(ticket),
                PermissionRequest::Granted => panic!("expected pending"),
            }
        }

        assert_eq!(activity.permission_requests(), vec![CODE]);
        assert_eq!(gate.pending(), vec![bind(0), bind(1), bind(2)]);

        assert!(gate.resolve(CODE, true));
        for ticket in tickets {
            assert!(ticket.outcome().await.unwrap());
        }
        assert!(gate.pending().is_empty());
    }

    #[tokio::test]
    async fn test_foreign_code_leaves_queue() {
        let gate = PermissionGate::new(ungranted(), CODE);
        let _ticket = gate.request(CAMERA_PERMISSIONS, bind(1)).unwrap();

        assert!(!gate.resolve(CODE + 1, true));
        assert_eq!(gate.pending(), vec![bind(1)]);
    }

    #[tokio::test]
    async fn test_request_after_resolve_starts_fresh_queue() {
        let activity = ungranted();
        let gate = PermissionGate::new(activity.clone(), CODE);

        let first = gate.request(CAMERA_PERMISSIONS, bind(1)).unwrap();
        gate.resolve(CODE, false);

        let second = gate.request(CAMERA_PERMISSIONS, bind(2)).unwrap();
        assert_eq!(gate.pending(), vec![bind(2)]);
        assert_eq!(activity.permission_requests(), vec![CODE, CODE]);

        match first {
            PermissionRequest::Pending(ticket) => assert!(!ticket.outcome().await.unwrap()),
            PermissionRequest::Granted => panic!("expected pending"),
        }
        drop(second);
    }

    #[tokio::test]
    async fn test_empty_result_is_denial() {
        let gate = PermissionGate::new(ungranted(), CODE);
        let request = gate.request(CAMERA_PERMISSIONS, bind(1)).unwrap();

        assert!(gate.handle_result(CODE, &[]));
        match request {
            PermissionRequest::Pending(ticket) => assert!(!ticket.outcome().await.unwrap()),
            PermissionRequest::Granted => panic!("expected pending"),
        }
    }

    #[tokio::test]
    async fn test_close_wakes_waiters() {
        let gate = PermissionGate::new(ungranted(), CODE);
        let request = gate.request(CAMERA_PERMISSIONS, bind(1)).unwrap();

        gate.close();
        match request {
            PermissionRequest::Pending(ticket) => assert!(matches!(
                ticket.outcome().await,
                Err(CameraError::ContextUnavailable(_))
            )),
            PermissionRequest::Granted => panic!("expected pending"),
        }
        assert!(gate.request(CAMERA_PERMISSIONS, bind(2)).is_err());
    }
}
