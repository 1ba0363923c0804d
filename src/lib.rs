// SPDX-License-Identifier: MPL-2.0

//! Anaglyph - a stereo webcam compositor
//!
//! Captures two webcams as a stereo pair and composites them into a
//! red/cyan anaglyph rendered to a window in real time.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`capture`]: Device enumeration, permission flow and the per-eye
//!   stream lifecycle over GStreamer
//! - [`compositor`]: GPU pipeline turning the two camera feeds into the
//!   anaglyph image, plus the rotation and parallax transforms
//! - [`viewer`]: The windowed event loop and keyboard controls
//! - [`config`]: Persisted device selection and transform settings
//!
//! # Example
//!
//! ```ignore
//! // This is a windowed application, typically run via:
//! // anaglyph
//! ```

pub mod capture;
pub mod compositor;
pub mod config;
pub mod constants;
pub mod errors;
pub mod viewer;

// Re-export commonly used types
pub use capture::{CaptureManager, ManagerSnapshot};
pub use compositor::{Compositor, EyeTransforms, Rotation};
pub use errors::{AppError, AppResult, CaptureError};
