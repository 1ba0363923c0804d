// SPDX-License-Identifier: GPL-3.0-only
//! Realtime red/cyan anaglyph compositing
//!
//! This module turns the two capture taps into the on-screen stereo image:
//! `transform` holds the rotation and parallax math shared with the shader,
//! `feed` moves frames onto the GPU, and `pipeline` owns the device and the
//! fullscreen render pass.

pub mod feed;
pub mod pipeline;
pub mod transform;

pub use pipeline::Compositor;
pub use transform::{EyeTransforms, Rotation};
