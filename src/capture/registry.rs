// SPDX-License-Identifier: GPL-3.0-only

//! Device discovery and the permission probe
//!
//! Wraps the capture backend's enumeration with label normalization and the
//! throwaway-session access probe. Selection bookkeeping stays in the
//! manager; this layer only reports what exists.

use std::sync::Arc;

use tracing::{info, warn};

use super::CaptureBackend;
use super::types::{PermissionState, VideoDevice};
use crate::errors::CaptureError;

/// Result of one device scan
#[derive(Debug, Clone)]
pub struct DeviceScan {
    /// Discovered video inputs, possibly empty
    pub devices: Vec<VideoDevice>,
    /// Permission state after the scan
    pub permission: PermissionState,
    /// Failure that cut the scan short, if any
    pub failure: Option<CaptureError>,
}

/// Enumerates video inputs through the capture backend
#[derive(Clone)]
pub struct DeviceRegistry {
    backend: Arc<dyn CaptureBackend>,
}

impl DeviceRegistry {
    pub fn new(backend: Arc<dyn CaptureBackend>) -> Self {
        Self { backend }
    }

    /// Scan for devices, optionally driving the permission probe first
    ///
    /// With `prompt` set and permission not yet granted, a throwaway session
    /// elevates OS-level access before enumerating. A refused probe yields
    /// `Denied`, an empty list and the failure reason; the probe is never
    /// re-run once permission is granted.
    pub fn scan(&self, prompt: bool, permission: PermissionState) -> DeviceScan {
        if !self.backend.is_available() {
            let failure = CaptureError::ApiUnsupported("capture stack not available".into());
            warn!(error = %failure, "Device scan aborted");
            // A probe that never ran must not leave Prompting behind
            let permission = if permission == PermissionState::Prompting {
                PermissionState::Unknown
            } else {
                permission
            };
            return DeviceScan {
                devices: Vec::new(),
                permission,
                failure: Some(failure),
            };
        }

        let permission = if prompt && permission != PermissionState::Granted {
            match self.backend.probe_access() {
                Ok(()) => {
                    info!("Camera access probe succeeded");
                    PermissionState::Granted
                }
                Err(err) => {
                    warn!(error = %err, "Camera access probe failed");
                    return DeviceScan {
                        devices: Vec::new(),
                        permission: PermissionState::Denied,
                        failure: Some(err),
                    };
                }
            }
        } else {
            permission
        };

        match self.backend.enumerate() {
            Ok(devices) => {
                let devices = normalize_labels(devices);
                info!(count = devices.len(), "Enumerated video inputs");
                DeviceScan {
                    devices,
                    permission,
                    failure: None,
                }
            }
            Err(err) => {
                warn!(error = %err, "Device enumeration failed");
                DeviceScan {
                    devices: Vec::new(),
                    permission,
                    failure: Some(err),
                }
            }
        }
    }
}

/// Fill in `Camera N` (1-based) for devices reported without a label
fn normalize_labels(mut devices: Vec<VideoDevice>) -> Vec<VideoDevice> {
    for (index, device) in devices.iter_mut().enumerate() {
        if device.label.trim().is_empty() {
            device.label = format!("Camera {}", index + 1);
        }
    }
    devices
}
