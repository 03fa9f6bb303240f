//! Capture session lifecycle
//!
//! Owns the open device and its active session: target set, frame-rate
//! selection, and the repeating capture request. One session may be open per
//! manager at a time; the repeating request is rebuilt whenever the target
//! set changes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::backend::{CaptureBackend, CaptureDevice, CaptureState, OutputTarget, TargetId};
use super::fps::{select_range, FrameRateRange};
use crate::error::{PipelineError, Result};
use crate::events::{EventBus, PipelineEvent};
use crate::video::ColorProfile;

/// The live repeating request: selected rate plus targeted surfaces
struct RepeatingRequest {
    fps_range: FrameRateRange,
    target_fps: u32,
    targets: Vec<TargetId>,
}

/// An open session binding a device to its target set
struct ActiveSession {
    id: Uuid,
    device_id: String,
    device: Box<dyn CaptureDevice>,
    targets: Vec<OutputTarget>,
    request: Option<RepeatingRequest>,
}

impl ActiveSession {
    fn request_targets(&self) -> Vec<OutputTarget> {
        let Some(request) = &self.request else {
            return Vec::new();
        };
        self.targets
            .iter()
            .filter(|t| request.targets.contains(&t.id()))
            .cloned()
            .collect()
    }
}

/// Session lifecycle state machine.
///
/// `Opening` carries the claim of the `open()` call that owns it, so a
/// cancelled open cannot tear down a claim staked by a newer open.
enum SessionSlot {
    Closed,
    Opening {
        cancel: CancellationToken,
        claim: u64,
    },
    Open(ActiveSession),
}

/// Manages the lifecycle of one capture device and its session
pub struct CaptureSessionManager {
    backend: Arc<dyn CaptureBackend>,
    slot: Mutex<SessionSlot>,
    events: Arc<EventBus>,
    current_range: parking_lot::RwLock<Option<FrameRateRange>>,
    open_claims: AtomicU64,
}

impl CaptureSessionManager {
    pub fn new(backend: Arc<dyn CaptureBackend>, events: Arc<EventBus>) -> Self {
        Self {
            backend,
            slot: Mutex::new(SessionSlot::Closed),
            events,
            current_range: parking_lot::RwLock::new(None),
            open_claims: AtomicU64::new(0),
        }
    }

    /// Open `device_id` and configure a session with the given output
    /// targets. Fails with the platform's device fault, or with a
    /// configuration fault when the target set is rejected. A concurrent
    /// [`Self::close`] cancels an in-flight open.
    pub async fn open(
        &self,
        device_id: &str,
        targets: Vec<OutputTarget>,
        color_profile: ColorProfile,
    ) -> Result<Uuid> {
        if targets.is_empty() {
            return Err(PipelineError::ConfigurationFailed(
                "session needs at least one output target".into(),
            ));
        }

        let cancel = CancellationToken::new();
        let claim = self.open_claims.fetch_add(1, Ordering::Relaxed);
        {
            let mut slot = self.slot.lock().await;
            match *slot {
                SessionSlot::Closed => {}
                _ => {
                    return Err(PipelineError::ConfigurationFailed(
                        "a capture session is already open".into(),
                    ))
                }
            }
            *slot = SessionSlot::Opening {
                cancel: cancel.clone(),
                claim,
            };
        }
        // Slot lock released: the open itself may be slow and must stay
        // cancellable from close()

        let opened = tokio::select! {
            _ = cancel.cancelled() => Err(PipelineError::Cancelled),
            res = self.backend.open(device_id) => res,
        };

        let mut device = match opened {
            Ok(device) => device,
            Err(e) => {
                self.reset_opening_slot(claim).await;
                self.events.publish(PipelineEvent::CaptureFailed {
                    device: device_id.to_string(),
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        if let Err(e) = device.configure(&targets, color_profile).await {
            device.release().await;
            self.reset_opening_slot(claim).await;
            self.events.publish(PipelineEvent::CaptureFailed {
                device: device_id.to_string(),
                reason: e.to_string(),
            });
            return Err(e);
        }

        let mut slot = self.slot.lock().await;
        if cancel.is_cancelled() {
            // close() won the race while we were configuring
            device.release().await;
            return Err(PipelineError::Cancelled);
        }

        let id = Uuid::new_v4();
        info!("Capture session {} open on {}", id, device_id);
        *slot = SessionSlot::Open(ActiveSession {
            id,
            device_id: device_id.to_string(),
            device,
            targets,
            request: None,
        });
        self.events.publish(PipelineEvent::CaptureSessionOpened {
            device: device_id.to_string(),
            session_id: id.to_string(),
        });
        Ok(id)
    }

    /// Select a frame-rate range for `target_fps`, build the repeating
    /// request for `surfaces`, and submit it. Returns the selected range.
    pub async fn start_repeating(
        &self,
        target_fps: u32,
        surfaces: &[TargetId],
    ) -> Result<FrameRateRange> {
        if surfaces.is_empty() {
            return Err(PipelineError::ConfigurationFailed(
                "repeating request needs at least one surface".into(),
            ));
        }

        let mut slot = self.slot.lock().await;
        let session = match &mut *slot {
            SessionSlot::Open(session) => session,
            _ => return Err(PipelineError::SessionNotOpen),
        };

        let selected: Vec<OutputTarget> = session
            .targets
            .iter()
            .filter(|t| surfaces.contains(&t.id()))
            .cloned()
            .collect();
        if selected.len() != surfaces.len() {
            return Err(PipelineError::ConfigurationFailed(
                "repeating request names a surface outside the session target set".into(),
            ));
        }

        let ranges = session.device.fps_ranges();
        let range = select_range(target_fps, &ranges).ok_or_else(|| {
            PipelineError::ConfigurationFailed("device advertises no frame-rate ranges".into())
        })?;

        session.device.submit_repeating(&selected, range).await?;
        session.request = Some(RepeatingRequest {
            fps_range: range,
            target_fps,
            targets: surfaces.to_vec(),
        });
        *self.current_range.write() = Some(range);

        info!(
            "Repeating capture on {} at {} (requested {} fps, {} surfaces)",
            session.device_id,
            range,
            target_fps,
            selected.len()
        );
        self.events.publish(PipelineEvent::CaptureStarted {
            device: session.device_id.clone(),
            fps_range: range.as_tuple(),
        });
        Ok(range)
    }

    /// Add a target to the live request's target set and resubmit. A failed
    /// resubmit rolls the set back, leaving the device on the old request.
    pub async fn add_target(&self, target: OutputTarget) -> Result<()> {
        let mut slot = self.slot.lock().await;
        let session = match &mut *slot {
            SessionSlot::Open(session) => session,
            _ => return Err(PipelineError::NoActiveRequest),
        };
        let Some(request) = &mut session.request else {
            return Err(PipelineError::NoActiveRequest);
        };

        let id = target.id();
        if request.targets.contains(&id) {
            return Ok(());
        }
        request.targets.push(id);
        let added_session_target = !session.targets.iter().any(|t| t.id() == id);
        if added_session_target {
            session.targets.push(target);
        }

        if let Err(e) = Self::resubmit(session).await {
            if let Some(request) = &mut session.request {
                request.targets.retain(|t| *t != id);
            }
            if added_session_target {
                session.targets.retain(|t| t.id() != id);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Remove a target from the live request's target set and resubmit.
    /// The removed id keeps its position on rollback.
    pub async fn remove_target(&self, id: TargetId) -> Result<()> {
        let mut slot = self.slot.lock().await;
        let session = match &mut *slot {
            SessionSlot::Open(session) => session,
            _ => return Err(PipelineError::NoActiveRequest),
        };
        let Some(request) = &mut session.request else {
            return Err(PipelineError::NoActiveRequest);
        };

        let Some(position) = request.targets.iter().position(|t| *t == id) else {
            return Ok(());
        };
        request.targets.remove(position);
        if request.targets.is_empty() {
            request.targets.insert(position, id);
            return Err(PipelineError::ConfigurationFailed(
                "repeating request needs at least one surface".into(),
            ));
        }

        if let Err(e) = Self::resubmit(session).await {
            if let Some(request) = &mut session.request {
                request.targets.insert(position.min(request.targets.len()), id);
            }
            return Err(e);
        }
        Ok(())
    }

    async fn resubmit(session: &mut ActiveSession) -> Result<()> {
        let Some(request) = &session.request else {
            return Err(PipelineError::NoActiveRequest);
        };
        let range = request.fps_range;
        let targets = session.request_targets();
        session.device.submit_repeating(&targets, range).await
    }

    /// Release the request, session, and device, in that order. Idempotent;
    /// cancels an in-flight open.
    pub async fn close(&self) {
        let mut slot = self.slot.lock().await;
        match std::mem::replace(&mut *slot, SessionSlot::Closed) {
            SessionSlot::Closed => {}
            SessionSlot::Opening { cancel, .. } => {
                cancel.cancel();
                info!("Cancelled in-flight session open");
            }
            SessionSlot::Open(mut session) => {
                if session.request.take().is_some() {
                    if let Err(e) = session.device.stop_repeating().await {
                        warn!("Stopping repeating request failed: {}", e);
                    }
                }
                session.device.release().await;
                *self.current_range.write() = None;
                info!("Capture session {} closed", session.id);
                self.events.publish(PipelineEvent::CaptureClosed {
                    device: session.device_id,
                });
            }
        }
    }

    /// Selected range of the active repeating request, if any.
    pub fn current_range(&self) -> Option<FrameRateRange> {
        *self.current_range.read()
    }

    /// Delivery-state watch of the open device, if a session is open.
    pub async fn capture_state(&self) -> Option<tokio::sync::watch::Receiver<CaptureState>> {
        match &*self.slot.lock().await {
            SessionSlot::Open(session) => Some(session.device.state_watch()),
            _ => None,
        }
    }

    /// Ordered target ids of the active repeating request, if any.
    pub async fn request_targets(&self) -> Vec<TargetId> {
        match &*self.slot.lock().await {
            SessionSlot::Open(session) => session
                .request
                .as_ref()
                .map(|r| r.targets.clone())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Target rate the caller asked for, if a request is active.
    pub async fn requested_fps(&self) -> Option<u32> {
        match &*self.slot.lock().await {
            SessionSlot::Open(session) => session.request.as_ref().map(|r| r.target_fps),
            _ => None,
        }
    }

    pub async fn is_open(&self) -> bool {
        matches!(&*self.slot.lock().await, SessionSlot::Open(_))
    }

    /// Clear an `Opening` claim, but only the caller's own: a cancelled
    /// open must not free a slot a newer open has already claimed.
    async fn reset_opening_slot(&self, claim: u64) {
        let mut slot = self.slot.lock().await;
        if matches!(&*slot, SessionSlot::Opening { claim: c, .. } if *c == claim) {
            *slot = SessionSlot::Closed;
        }
    }
}
