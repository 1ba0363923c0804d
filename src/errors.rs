// SPDX-License-Identifier: MPL-2.0

//! Error types for the anaglyph viewer

use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Main application error type
#[derive(Debug, Clone)]
pub enum AppError {
    /// Capture subsystem errors
    Capture(CaptureError),
    /// GPU/compositor errors
    Compositor(CompositorError),
    /// Settings load/save errors
    Settings(String),
    /// Generic error with message
    Other(String),
}

/// Capture failures surfaced to the control surface.
///
/// Every variant is recoverable by user action; low-level GStreamer errors
/// are normalized into one of these at the backend boundary and never leak
/// out raw.
#[derive(Debug, Clone)]
pub enum CaptureError {
    /// The platform capture stack is missing or failed to initialize
    ApiUnsupported(String),
    /// Camera access was refused
    PermissionDenied(String),
    /// A selected device is gone or cannot be opened
    DeviceUnavailable(String),
    /// Start requested before both eyes have a device selected
    SelectionIncomplete,
}

/// GPU setup and presentation errors
#[derive(Debug, Clone)]
pub enum CompositorError {
    /// No compatible graphics adapter
    NoAdapter,
    /// Device acquisition failed
    RequestDevice(String),
    /// Surface creation or configuration failed
    Surface(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Capture(e) => write!(f, "Capture error: {}", e),
            AppError::Compositor(e) => write!(f, "Compositor error: {}", e),
            AppError::Settings(msg) => write!(f, "Settings error: {}", msg),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::ApiUnsupported(msg) => write!(f, "Capture API unsupported: {}", msg),
            CaptureError::PermissionDenied(msg) => write!(f, "Camera access denied: {}", msg),
            CaptureError::DeviceUnavailable(msg) => write!(f, "Device unavailable: {}", msg),
            CaptureError::SelectionIncomplete => {
                write!(f, "Both eyes need a selected device")
            }
        }
    }
}

impl fmt::Display for CompositorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompositorError::NoAdapter => write!(f, "No compatible graphics adapter found"),
            CompositorError::RequestDevice(msg) => {
                write!(f, "Failed to acquire graphics device: {}", msg)
            }
            CompositorError::Surface(msg) => write!(f, "Surface error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for CaptureError {}
impl std::error::Error for CompositorError {}

// Conversions from sub-errors to AppError
impl From<CaptureError> for AppError {
    fn from(err: CaptureError) -> Self {
        AppError::Capture(err)
    }
}

impl From<CompositorError> for AppError {
    fn from(err: CompositorError) -> Self {
        AppError::Compositor(err)
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

// Settings are the only filesystem concern in this application
impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Settings(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Settings(err.to_string())
    }
}
