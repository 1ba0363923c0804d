// SPDX-License-Identifier: MPL-2.0

//! Capture backend abstraction
//!
//! Trait seam between the stream lifecycle manager and the platform capture
//! stack, keeping lifecycle and transaction logic testable without cameras.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │    Viewer / CLI      │
//! └──────────┬───────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐
//! │   CaptureManager     │  ← Permission flow, per-eye lifecycle, rollback
//! └──────────┬───────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐
//! │ CaptureBackend trait │  ← Enumeration, access probe, session open
//! └──────────┬───────────┘
//!            │
//!            ▼
//!      ┌───────────┐
//!      │ GStreamer │  ← Concrete implementation
//!      └───────────┘
//! ```

pub mod gst;
pub mod manager;
pub mod registry;
pub mod types;

pub use manager::{CaptureManager, ManagerSnapshot};
pub use types::*;

use std::sync::Arc;

use crate::errors::CaptureError;

/// Platform capture stack interface
pub trait CaptureBackend: Send + Sync {
    /// Check if the capture stack is usable on this system
    fn is_available(&self) -> bool;

    /// Enumerate video input devices
    ///
    /// Labels may be empty or generic before access has been granted. IDs
    /// are stable across calls for the same physical device.
    fn enumerate(&self) -> Result<Vec<VideoDevice>, CaptureError>;

    /// Open and immediately release a throwaway session to elevate OS-level
    /// camera access
    ///
    /// # Returns
    /// * `Ok(())` - access is granted
    /// * `Err(CaptureError)` - access refused, or no device to probe with
    fn probe_access(&self) -> Result<(), CaptureError>;

    /// Open a live capture session on the given device
    ///
    /// Decoded RGBA frames are published into `tap` from the backend's
    /// streaming thread until the returned source is closed.
    fn open(&self, device_id: &str, tap: FrameTap) -> Result<Box<dyn LiveSource>, CaptureError>;
}

/// A running capture session bound to one hardware device
pub trait LiveSource: Send {
    /// Release the underlying hardware
    ///
    /// Blocks until the device is freed; the tap receives no further frames
    /// afterwards.
    fn close(self: Box<Self>);
}

/// Get the production capture backend
pub fn get_backend() -> Arc<dyn CaptureBackend> {
    Arc::new(gst::GstBackend::new())
}
