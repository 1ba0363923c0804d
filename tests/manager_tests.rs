// SPDX-License-Identifier: MPL-2.0

//! Integration tests for the stream lifecycle manager
//!
//! A scripted backend stands in for the capture stack so the transactional
//! start, rollback and supersede behavior can be driven deterministically,
//! including a stop that lands while a start is still acquiring hardware.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use anaglyph::capture::types::{Eye, FrameTap, PermissionState, SessionStatus, VideoDevice, VideoFrame};
use anaglyph::capture::{CaptureBackend, CaptureManager, LiveSource};
use anaglyph::errors::CaptureError;

/// Capture stack stand-in with scriptable devices, probe verdict and
/// per-device open failures
///
/// Every handle it gives out is counted, so tests can assert the hardware
/// really was released. Opens can also be held at a gate to let a stop
/// race an in-flight start.
#[derive(Default)]
struct ScriptedBackend {
    devices: Mutex<Vec<VideoDevice>>,
    unavailable: AtomicBool,
    probe_error: Mutex<Option<CaptureError>>,
    open_errors: Mutex<HashMap<String, CaptureError>>,
    probe_calls: AtomicUsize,
    opens_entered: AtomicUsize,
    live_handles: Arc<AtomicUsize>,
    peak_handles: AtomicUsize,
    holding: Mutex<bool>,
    gate: Condvar,
}

impl ScriptedBackend {
    fn with_devices(ids: &[&str]) -> Arc<Self> {
        let backend = Self::default();
        backend.set_devices(ids);
        Arc::new(backend)
    }

    fn set_devices(&self, ids: &[&str]) {
        *self.devices.lock().unwrap() = ids
            .iter()
            .map(|id| VideoDevice {
                id: (*id).into(),
                label: format!("Cam {}", id),
            })
            .collect();
    }

    fn set_unavailable(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }

    fn fail_probe(&self, err: CaptureError) {
        *self.probe_error.lock().unwrap() = Some(err);
    }

    fn allow_probe(&self) {
        *self.probe_error.lock().unwrap() = None;
    }

    fn fail_open(&self, id: &str, err: CaptureError) {
        self.open_errors.lock().unwrap().insert(id.into(), err);
    }

    /// Make subsequent opens block until [`release_opens`] is called
    fn hold_opens(&self) {
        *self.holding.lock().unwrap() = true;
    }

    fn release_opens(&self) {
        *self.holding.lock().unwrap() = false;
        self.gate.notify_all();
    }

    fn live_handles(&self) -> usize {
        self.live_handles.load(Ordering::SeqCst)
    }

    fn peak_handles(&self) -> usize {
        self.peak_handles.load(Ordering::SeqCst)
    }

    fn probe_calls(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    fn opens_entered(&self) -> usize {
        self.opens_entered.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` opens have been entered (not necessarily
    /// completed)
    fn wait_for_opens(&self, count: usize) {
        for _ in 0..200 {
            if self.opens_entered() >= count {
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("backend never saw {} open calls", count);
    }
}

impl CaptureBackend for ScriptedBackend {
    fn is_available(&self) -> bool {
        !self.unavailable.load(Ordering::SeqCst)
    }

    fn enumerate(&self) -> Result<Vec<VideoDevice>, CaptureError> {
        Ok(self.devices.lock().unwrap().clone())
    }

    fn probe_access(&self) -> Result<(), CaptureError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        match self.probe_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn open(&self, device_id: &str, tap: FrameTap) -> Result<Box<dyn LiveSource>, CaptureError> {
        self.opens_entered.fetch_add(1, Ordering::SeqCst);

        let mut holding = self.holding.lock().unwrap();
        while *holding {
            holding = self.gate.wait(holding).unwrap();
        }
        drop(holding);

        if let Some(err) = self.open_errors.lock().unwrap().get(device_id) {
            return Err(err.clone());
        }

        // One frame right away, as a warm camera would deliver
        tap.publish(VideoFrame {
            width: 2,
            height: 2,
            stride: 8,
            data: vec![0u8; 16].into(),
        });

        let now = self.live_handles.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_handles.fetch_max(now, Ordering::SeqCst);
        Ok(Box::new(ScriptedSource {
            live: self.live_handles.clone(),
        }))
    }
}

struct ScriptedSource {
    live: Arc<AtomicUsize>,
}

impl LiveSource for ScriptedSource {
    fn close(self: Box<Self>) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Manager over a scripted backend with selections already defaulted
fn manager_with(ids: &[&str]) -> (CaptureManager, Arc<ScriptedBackend>) {
    let backend = ScriptedBackend::with_devices(ids);
    let manager = CaptureManager::new(backend.clone());
    manager.refresh_devices(false);
    (manager, backend)
}

#[test]
fn test_start_activates_both_eyes() {
    let (manager, backend) = manager_with(&["a", "b"]);

    let started = manager.start().expect("start should succeed");
    assert!(started);

    let snapshot = manager.snapshot();
    assert!(snapshot.is_running());
    assert_eq!(snapshot.permission, PermissionState::Granted);
    assert_eq!(snapshot.selected_of(Eye::Left), Some("a"));
    assert_eq!(snapshot.selected_of(Eye::Right), Some("b"));
    assert!(snapshot.last_error.is_none());

    assert_eq!(backend.live_handles(), 2);
    assert_eq!(backend.probe_calls(), 1, "one probe elevates access");
    assert!(manager.tap(Eye::Left).has_frame());
    assert!(manager.tap(Eye::Right).has_frame());
}

#[test]
fn test_stop_releases_hardware_and_is_idempotent() {
    let (manager, backend) = manager_with(&["a", "b"]);
    manager.start().expect("start should succeed");

    manager.stop();
    assert_eq!(backend.live_handles(), 0);

    let snapshot = manager.snapshot();
    assert!(!snapshot.is_running());
    assert_eq!(snapshot.status_of(Eye::Left), SessionStatus::Stopped);
    assert_eq!(snapshot.status_of(Eye::Right), SessionStatus::Stopped);
    // Stopping must not downgrade a granted permission
    assert_eq!(snapshot.permission, PermissionState::Granted);

    manager.stop();
    assert_eq!(backend.live_handles(), 0);
    assert_eq!(
        manager.snapshot().status_of(Eye::Left),
        SessionStatus::Stopped
    );
}

#[test]
fn test_right_eye_failure_rolls_back_left() {
    let (manager, backend) = manager_with(&["a", "b"]);
    backend.fail_open(
        "b",
        CaptureError::DeviceUnavailable("camera unplugged".into()),
    );

    let err = manager.start().expect_err("right eye cannot open");
    assert!(matches!(err, CaptureError::DeviceUnavailable(_)));

    // The left eye was acquired first and must have been released again
    assert_eq!(backend.live_handles(), 0);

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.status_of(Eye::Left), SessionStatus::Failed);
    assert_eq!(snapshot.status_of(Eye::Right), SessionStatus::Failed);
    assert!(matches!(
        snapshot.last_error,
        Some(CaptureError::DeviceUnavailable(_))
    ));
}

#[test]
fn test_start_without_devices_reports_selection_incomplete() {
    let (manager, backend) = manager_with(&[]);

    let err = manager.start().expect_err("nothing to select");
    assert!(matches!(err, CaptureError::SelectionIncomplete));
    assert_eq!(backend.opens_entered(), 0);
    assert_eq!(
        manager.snapshot().status_of(Eye::Left),
        SessionStatus::Failed
    );
}

#[test]
fn test_denied_probe_fails_the_start() {
    let (manager, backend) = manager_with(&["a", "b"]);
    backend.fail_probe(CaptureError::PermissionDenied("portal refused".into()));

    let err = manager.start().expect_err("probe is refused");
    assert!(matches!(err, CaptureError::PermissionDenied(_)));
    assert_eq!(backend.opens_entered(), 0, "no device may be opened");

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.permission, PermissionState::Denied);
    assert_eq!(snapshot.status_of(Eye::Left), SessionStatus::Failed);
    assert_eq!(snapshot.status_of(Eye::Right), SessionStatus::Failed);
}

#[test]
fn test_unavailable_stack_does_not_stick_in_prompting() {
    let backend = Arc::new(ScriptedBackend::default());
    backend.set_unavailable();
    let manager = CaptureManager::new(backend.clone());

    let devices = manager.refresh_devices(true);
    assert!(devices.is_empty());

    // No probe ever ran, so no prompt can be pending
    let snapshot = manager.snapshot();
    assert_eq!(snapshot.permission, PermissionState::Unknown);
    assert!(matches!(
        snapshot.last_error,
        Some(CaptureError::ApiUnsupported(_))
    ));
    assert_eq!(backend.probe_calls(), 0);
}

#[test]
fn test_granted_refresh_clears_a_stale_denial() {
    let (manager, backend) = manager_with(&["a", "b"]);
    backend.fail_probe(CaptureError::PermissionDenied("portal refused".into()));

    manager.refresh_devices(true);
    let snapshot = manager.snapshot();
    assert_eq!(snapshot.permission, PermissionState::Denied);
    assert!(snapshot.last_error.is_some());

    // Access granted on the next prompt; the old denial must not linger
    backend.allow_probe();
    manager.refresh_devices(true);

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.permission, PermissionState::Granted);
    assert!(snapshot.last_error.is_none());
    assert_eq!(snapshot.devices.len(), 2);
}

#[test]
fn test_stop_during_inflight_start_leaves_everything_stopped() {
    let (manager, backend) = manager_with(&["a", "b"]);
    backend.hold_opens();

    let worker = {
        let manager = manager.clone();
        thread::spawn(move || manager.start())
    };

    // The start is now blocked inside the first device open
    backend.wait_for_opens(1);
    manager.stop();
    backend.release_opens();

    let result = worker.join().expect("start thread panicked");
    assert!(!result.expect("superseded start is not an error"));

    // Everything the superseded start acquired has been released
    assert_eq!(backend.live_handles(), 0);
    let snapshot = manager.snapshot();
    assert!(!snapshot.is_running());
    assert_eq!(snapshot.status_of(Eye::Left), SessionStatus::Stopped);
    assert_eq!(snapshot.status_of(Eye::Right), SessionStatus::Stopped);
    assert!(snapshot.last_error.is_none());
}

#[test]
fn test_restart_replaces_running_sessions() {
    let (manager, backend) = manager_with(&["a", "b"]);

    manager.start().expect("first start");
    manager.start().expect("second start");

    // Two pairs opened, first pair closed again, and the old pair was
    // released before the new one was acquired
    assert_eq!(backend.opens_entered(), 4);
    assert_eq!(backend.live_handles(), 2);
    assert!(backend.peak_handles() <= 2);
    assert!(manager.snapshot().is_running());
}

#[test]
fn test_vanished_device_redefaults_selection() {
    let (manager, backend) = manager_with(&["a", "b"]);
    assert_eq!(manager.snapshot().selected_of(Eye::Left), Some("a"));
    assert_eq!(manager.snapshot().selected_of(Eye::Right), Some("b"));

    backend.set_devices(&["b"]);
    manager.refresh_devices(false);

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.devices.len(), 1);
    assert_eq!(snapshot.selected_of(Eye::Left), Some("b"));
    assert_eq!(snapshot.selected_of(Eye::Right), Some("b"));
}

#[test]
fn test_present_selection_survives_refresh() {
    let (manager, _backend) = manager_with(&["a", "b"]);

    manager.select_device(Eye::Left, "b");
    manager.refresh_devices(false);

    assert_eq!(manager.snapshot().selected_of(Eye::Left), Some("b"));
}
