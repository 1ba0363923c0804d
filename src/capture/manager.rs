// SPDX-License-Identifier: GPL-3.0-only

//! Stream lifecycle manager
//!
//! Owns the permission flow, the per-eye device selections and the two live
//! capture sessions. The manager provides:
//! - All-or-nothing `start()`: acquisitions run left then right, and a
//!   right-eye failure closes the left eye before the failure is reported
//! - Idempotent `stop()` that always releases the hardware
//! - A generation counter so a stop (or newer start) wins over any start
//!   still in flight
//!
//! Blocking backend calls happen with the state lock released; callers on a
//! render thread should run `start`/`stop`/`refresh_devices` on a worker.

use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use super::registry::DeviceRegistry;
use super::types::{Eye, FrameTap, PermissionState, SessionStatus, VideoDevice};
use super::{CaptureBackend, LiveSource};
use crate::errors::CaptureError;

/// Per-eye session slot
#[derive(Default)]
struct EyeSession {
    status: SessionStatus,
    device_id: Option<String>,
    source: Option<Box<dyn LiveSource>>,
    tap: FrameTap,
}

/// Internal manager state
struct ManagerState {
    permission: PermissionState,
    devices: Vec<VideoDevice>,
    selected: [Option<String>; 2],
    sessions: [EyeSession; 2],
    last_error: Option<CaptureError>,
    /// Bumped by every stop and every start attempt; an in-flight start
    /// commits only if the generation still matches the one it drew
    generation: u64,
}

impl Default for ManagerState {
    fn default() -> Self {
        Self {
            permission: PermissionState::Unknown,
            devices: Vec::new(),
            selected: [None, None],
            sessions: [EyeSession::default(), EyeSession::default()],
            last_error: None,
            generation: 0,
        }
    }
}

/// Point-in-time view of the manager for the control surface
#[derive(Debug, Clone)]
pub struct ManagerSnapshot {
    pub permission: PermissionState,
    pub devices: Vec<VideoDevice>,
    pub selected: [Option<String>; 2],
    pub status: [SessionStatus; 2],
    pub last_error: Option<CaptureError>,
}

impl ManagerSnapshot {
    /// True when both eyes are actively streaming
    pub fn is_running(&self) -> bool {
        self.status.iter().all(|s| *s == SessionStatus::Active)
    }

    pub fn status_of(&self, eye: Eye) -> SessionStatus {
        self.status[eye.index()]
    }

    pub fn selected_of(&self, eye: Eye) -> Option<&str> {
        self.selected[eye.index()].as_deref()
    }
}

/// Stream lifecycle manager
///
/// Thread-safe and clonable; every clone shares the same state.
#[derive(Clone)]
pub struct CaptureManager {
    backend: Arc<dyn CaptureBackend>,
    registry: DeviceRegistry,
    state: Arc<Mutex<ManagerState>>,
}

impl CaptureManager {
    /// Create a manager over the given backend
    pub fn new(backend: Arc<dyn CaptureBackend>) -> Self {
        info!("Creating capture manager");
        Self {
            registry: DeviceRegistry::new(backend.clone()),
            backend,
            state: Arc::new(Mutex::new(ManagerState::default())),
        }
    }

    /// Check if the capture stack is usable on this system
    pub fn is_available(&self) -> bool {
        self.backend.is_available()
    }

    /// Store the control surface's device selection for one eye
    ///
    /// Takes effect on the next start; a running session keeps its device.
    pub fn select_device(&self, eye: Eye, device_id: impl Into<String>) {
        let device_id = device_id.into();
        info!(eye = %eye, device_id = %device_id, "Selecting device");
        self.state.lock().unwrap().selected[eye.index()] = Some(device_id);
    }

    /// Current state for the control surface
    pub fn snapshot(&self) -> ManagerSnapshot {
        let state = self.state.lock().unwrap();
        ManagerSnapshot {
            permission: state.permission,
            devices: state.devices.clone(),
            selected: state.selected.clone(),
            status: [state.sessions[0].status, state.sessions[1].status],
            last_error: state.last_error.clone(),
        }
    }

    /// Frame tap of one eye's current session
    ///
    /// Replaced by every start, so fetch taps again after observing a
    /// session transition to Active.
    pub fn tap(&self, eye: Eye) -> FrameTap {
        self.state.lock().unwrap().sessions[eye.index()].tap.clone()
    }

    /// Re-enumerate devices, optionally forcing the permission prompt
    ///
    /// Applies the selection re-default rule: a selection whose device is no
    /// longer listed falls back to the first device for the left eye and the
    /// second-or-first for the right, never a dangling ID.
    pub fn refresh_devices(&self, prompt: bool) -> Vec<VideoDevice> {
        let permission = {
            let mut state = self.state.lock().unwrap();
            // Each refresh owns the error slot; stale failures do not
            // carry over
            state.last_error = None;
            if prompt && state.permission != PermissionState::Granted {
                state.permission = PermissionState::Prompting;
            }
            state.permission
        };

        // Probe and enumeration block; the lock stays released
        let scan = self.registry.scan(prompt, permission);

        let mut state = self.state.lock().unwrap();
        state.permission = scan.permission;
        if let Some(failure) = scan.failure {
            state.last_error = Some(failure);
        }
        state.devices = scan.devices.clone();
        apply_selection_defaults(&mut state);
        scan.devices
    }

    /// Start both capture sessions as one transaction
    ///
    /// Replaces any running sessions. Returns `Ok(true)` once both eyes are
    /// Active, `Ok(false)` if a concurrent stop or newer start superseded
    /// this attempt (everything it acquired has been released), and `Err`
    /// after a failure (with both sessions torn back down).
    pub fn start(&self) -> Result<bool, CaptureError> {
        info!("Starting capture");

        // Replace semantics: tear down whatever is already running
        let (generation, stale) = {
            let mut state = self.state.lock().unwrap();
            state.generation += 1;
            state.last_error = None;
            let stale = take_sources(&mut state, SessionStatus::Stopped);
            (state.generation, stale)
        };
        close_sources(stale);

        // Both eyes need a selection before anything else
        {
            let state = self.state.lock().unwrap();
            if state.selected.iter().any(|s| s.is_none()) {
                drop(state);
                return self.abort_start(generation, CaptureError::SelectionIncomplete, Vec::new());
            }
        }

        // Drive the permission flow if access was never granted
        if self.state.lock().unwrap().permission != PermissionState::Granted {
            self.refresh_devices(true);
        }

        // Draw the selections for this attempt
        let (left_id, right_id, left_tap, right_tap) = {
            let mut state = self.state.lock().unwrap();
            if state.generation != generation {
                debug!("Start superseded during permission flow");
                return Ok(false);
            }
            if state.permission != PermissionState::Granted {
                let err = state.last_error.clone().unwrap_or_else(|| {
                    CaptureError::PermissionDenied("camera access was not granted".into())
                });
                fail_sessions(&mut state, &err);
                return Err(err);
            }
            let (Some(left_id), Some(right_id)) =
                (state.selected[0].clone(), state.selected[1].clone())
            else {
                let err = CaptureError::SelectionIncomplete;
                fail_sessions(&mut state, &err);
                return Err(err);
            };

            // Fresh taps so stale frames from an old session can't show up
            for session in &mut state.sessions {
                session.status = SessionStatus::Acquiring;
                session.device_id = None;
                session.tap = FrameTap::new();
            }
            let left_tap = state.sessions[0].tap.clone();
            let right_tap = state.sessions[1].tap.clone();
            (left_id, right_id, left_tap, right_tap)
        };

        // Blocking acquisitions, left then right, no lock held
        let left = match self.backend.open(&left_id, left_tap) {
            Ok(source) => source,
            Err(err) => return self.abort_start(generation, err, Vec::new()),
        };
        let right = match self.backend.open(&right_id, right_tap) {
            Ok(source) => source,
            Err(err) => return self.abort_start(generation, err, vec![left]),
        };

        // Commit, unless a stop or newer start won the race
        {
            let mut state = self.state.lock().unwrap();
            if state.generation != generation {
                drop(state);
                debug!("Start superseded after acquisition, releasing sessions");
                close_sources(vec![left, right]);
                return Ok(false);
            }

            let session = &mut state.sessions[Eye::Left.index()];
            session.source = Some(left);
            session.device_id = Some(left_id.clone());
            session.status = SessionStatus::Active;

            let session = &mut state.sessions[Eye::Right.index()];
            session.source = Some(right);
            session.device_id = Some(right_id.clone());
            session.status = SessionStatus::Active;
        }
        info!(left = %left_id, right = %right_id, "Capture running on both eyes");

        // Labels often gain detail once access is granted; refresh quietly
        self.refresh_devices(false);

        Ok(true)
    }

    /// Stop both sessions and release the hardware
    ///
    /// Safe to call at any time, including when nothing is running or while
    /// a start is still in flight; that start then releases everything it
    /// acquired and reports itself superseded. Never downgrades a granted
    /// permission.
    pub fn stop(&self) {
        info!("Stopping capture");
        let sources = {
            let mut state = self.state.lock().unwrap();
            state.generation += 1;
            take_sources(&mut state, SessionStatus::Stopped)
        };
        close_sources(sources);
    }

    /// Roll back a failed or superseded start attempt
    fn abort_start(
        &self,
        generation: u64,
        err: CaptureError,
        acquired: Vec<Box<dyn LiveSource>>,
    ) -> Result<bool, CaptureError> {
        if !acquired.is_empty() {
            info!(count = acquired.len(), "Rolling back partial acquisition");
        }
        close_sources(acquired);

        let mut state = self.state.lock().unwrap();
        if state.generation != generation {
            debug!("Start superseded, rollback complete");
            return Ok(false);
        }
        fail_sessions(&mut state, &err);
        Err(err)
    }
}

impl std::fmt::Debug for CaptureManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("CaptureManager")
            .field("permission", &state.permission)
            .field("devices", &state.devices.len())
            .field("status", &[state.sessions[0].status, state.sessions[1].status])
            .field("generation", &state.generation)
            .finish()
    }
}

/// Pull both live sources out of the state, leaving the given status behind
fn take_sources(state: &mut ManagerState, status: SessionStatus) -> Vec<Box<dyn LiveSource>> {
    let mut sources = Vec::new();
    for session in &mut state.sessions {
        if let Some(source) = session.source.take() {
            sources.push(source);
        }
        session.device_id = None;
        session.status = status;
    }
    sources
}

/// Close sources outside the state lock
fn close_sources(sources: Vec<Box<dyn LiveSource>>) {
    for source in sources {
        source.close();
    }
}

/// Mark both sessions failed and record the error
fn fail_sessions(state: &mut ManagerState, err: &CaptureError) {
    warn!(error = %err, "Capture start failed");
    state.last_error = Some(err.clone());
    for session in &mut state.sessions {
        session.status = SessionStatus::Failed;
        session.device_id = None;
    }
}

/// Re-default selections whose device vanished from the current list
///
/// Left falls back to the first device, right to the second-or-first. An
/// empty selection is treated the same as a vanished one.
fn apply_selection_defaults(state: &mut ManagerState) {
    for eye in Eye::BOTH {
        let index = eye.index();
        let valid = state.selected[index]
            .as_ref()
            .is_some_and(|id| state.devices.iter().any(|d| &d.id == id));
        if valid {
            continue;
        }
        let fallback = match eye {
            Eye::Left => state.devices.first(),
            Eye::Right => state.devices.get(1).or_else(|| state.devices.first()),
        };
        let fallback_id = fallback.map(|d| d.id.clone());
        if state.selected[index] != fallback_id {
            info!(eye = %eye, device_id = ?fallback_id, "Selection re-defaulted");
        }
        state.selected[index] = fallback_id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: &str) -> VideoDevice {
        VideoDevice {
            id: id.into(),
            label: format!("Cam {}", id),
        }
    }

    fn state_with(devices: Vec<VideoDevice>, selected: [Option<String>; 2]) -> ManagerState {
        ManagerState {
            devices,
            selected,
            ..ManagerState::default()
        }
    }

    #[test]
    fn test_defaults_fill_empty_selection() {
        let mut state = state_with(vec![device("a"), device("b")], [None, None]);
        apply_selection_defaults(&mut state);
        assert_eq!(state.selected[0].as_deref(), Some("a"));
        assert_eq!(state.selected[1].as_deref(), Some("b"));
    }

    #[test]
    fn test_defaults_keep_valid_selection() {
        let mut state = state_with(
            vec![device("a"), device("b")],
            [Some("b".into()), Some("a".into())],
        );
        apply_selection_defaults(&mut state);
        assert_eq!(state.selected[0].as_deref(), Some("b"));
        assert_eq!(state.selected[1].as_deref(), Some("a"));
    }

    #[test]
    fn test_vanished_selection_redefaults() {
        let mut state = state_with(
            vec![device("a")],
            [Some("gone".into()), Some("gone".into())],
        );
        apply_selection_defaults(&mut state);
        // Single device: both eyes fall back to it
        assert_eq!(state.selected[0].as_deref(), Some("a"));
        assert_eq!(state.selected[1].as_deref(), Some("a"));
    }

    #[test]
    fn test_no_devices_clears_selection() {
        let mut state = state_with(Vec::new(), [Some("gone".into()), None]);
        apply_selection_defaults(&mut state);
        assert_eq!(state.selected, [None, None]);
    }
}
