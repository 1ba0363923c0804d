// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

/// GStreamer pipeline constants
pub mod pipeline {
    /// Maximum appsink buffer queue size (keep small for low latency)
    pub const MAX_BUFFERS: u32 = 2;

    /// Output pixel format for appsink
    /// RGBA uses 4 bytes/pixel and uploads straight into the GPU texture
    pub const OUTPUT_FORMAT: &str = "RGBA";

    /// Get number of threads for videoconvert based on available CPU threads
    pub fn videoconvert_threads() -> u32 {
        std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(4) // Fallback to 4 if detection fails
    }
}

/// Timing constants
pub mod timing {
    /// Frame counter modulo for periodic logging
    pub const FRAME_LOG_INTERVAL: u64 = 30;

    /// Pipeline playing state timeout on start
    pub const START_TIMEOUT_SECS: u64 = 5;

    /// Pipeline state change timeout on stop
    pub const STOP_TIMEOUT_SECS: u64 = 2;
}

/// Transform parameter ranges shared by the control surface and the shader
pub mod transform {
    /// Largest parallax magnitude accepted from the control surface
    pub const PARALLAX_CONTROL_MAX: f32 = 100.0;

    /// UV shift applied per eye at full parallax deflection
    pub const PARALLAX_UV_RANGE: f32 = 0.02;

    /// Keyboard step for parallax adjustment
    pub const PARALLAX_STEP: f32 = 5.0;
}

/// Viewer window constants
pub mod viewer {
    /// Initial window width
    pub const WINDOW_WIDTH: u32 = 1280;

    /// Initial window height
    pub const WINDOW_HEIGHT: u32 = 720;

    /// Base window title; current status is appended after a separator
    pub const WINDOW_TITLE: &str = "Anaglyph";
}

/// Application information utilities
pub mod app_info {
    /// Get the application version from Cargo metadata
    pub fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_videoconvert_threads_nonzero() {
        assert!(pipeline::videoconvert_threads() >= 1);
    }

    #[test]
    fn test_parallax_range_sane() {
        assert!(transform::PARALLAX_UV_RANGE > 0.0);
        assert!(transform::PARALLAX_STEP <= transform::PARALLAX_CONTROL_MAX);
    }
}
