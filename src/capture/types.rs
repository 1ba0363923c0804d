// SPDX-License-Identifier: GPL-3.0-only
// Shared types for the capture subsystem

//! Shared types for capture backends

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// One side of the stereo pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    /// Both eyes in acquisition order (left first)
    pub const BOTH: [Eye; 2] = [Eye::Left, Eye::Right];

    /// Index into per-eye arrays
    pub fn index(self) -> usize {
        match self {
            Eye::Left => 0,
            Eye::Right => 1,
        }
    }
}

impl std::fmt::Display for Eye {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Eye::Left => write!(f, "left"),
            Eye::Right => write!(f, "right"),
        }
    }
}

/// Camera permission state for this process
///
/// Advances through the prompt flow once; after `Denied` another prompt only
/// happens on an explicit user-triggered refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PermissionState {
    /// Access never requested
    #[default]
    Unknown,
    /// An access probe is in flight
    Prompting,
    /// Access granted
    Granted,
    /// Access refused
    Denied,
}

impl std::fmt::Display for PermissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionState::Unknown => write!(f, "unknown"),
            PermissionState::Prompting => write!(f, "prompting"),
            PermissionState::Granted => write!(f, "granted"),
            PermissionState::Denied => write!(f, "denied"),
        }
    }
}

/// Lifecycle state of one eye's capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    /// No session has ever been started
    #[default]
    Idle,
    /// Device open in progress
    Acquiring,
    /// Frames are flowing
    Active,
    /// The last start attempt failed
    Failed,
    /// Stopped by request
    Stopped,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Idle => write!(f, "idle"),
            SessionStatus::Acquiring => write!(f, "acquiring"),
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::Failed => write!(f, "failed"),
            SessionStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// A discovered video input device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoDevice {
    /// Stable identifier derived from backend properties, never list position
    pub id: String,
    /// Human-readable label, with a `Camera N` fallback when the platform
    /// withholds the real name
    pub label: String,
}

/// One decoded RGBA frame
#[derive(Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// Bytes per row, may include padding
    pub stride: u32,
    /// RGBA pixel data, `stride * height` bytes
    pub data: Arc<[u8]>,
}

impl std::fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "VideoFrame({}x{}, stride {}, {} bytes)",
            self.width,
            self.height,
            self.stride,
            self.data.len()
        )
    }
}

/// Latest-frame slot shared between a capture session and the render loop
///
/// The producer replaces the slot under a short lock and bumps the sequence
/// number; the reader polls the sequence without locking and takes the frame
/// only when it has advanced. Sequence 0 means nothing was ever published.
#[derive(Clone, Default)]
pub struct FrameTap {
    inner: Arc<TapInner>,
}

#[derive(Default)]
struct TapInner {
    slot: Mutex<Option<Arc<VideoFrame>>>,
    seq: AtomicU64,
}

impl FrameTap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a frame, replacing any unconsumed previous one
    pub fn publish(&self, frame: VideoFrame) {
        let mut slot = self.inner.slot.lock().unwrap();
        *slot = Some(Arc::new(frame));
        self.inner.seq.fetch_add(1, Ordering::Release);
    }

    /// Sequence number of the newest published frame
    pub fn sequence(&self) -> u64 {
        self.inner.seq.load(Ordering::Acquire)
    }

    /// True once at least one frame has been published
    pub fn has_frame(&self) -> bool {
        self.sequence() != 0
    }

    /// Newest frame together with its sequence number
    pub fn latest(&self) -> Option<(Arc<VideoFrame>, u64)> {
        let slot = self.inner.slot.lock().unwrap();
        let frame = slot.as_ref()?.clone();
        Some((frame, self.inner.seq.load(Ordering::Acquire)))
    }
}

impl std::fmt::Debug for FrameTap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FrameTap(seq {})", self.sequence())
    }
}
