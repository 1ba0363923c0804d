// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer capture backend
//!
//! Discovery goes through a `DeviceMonitor` filtered to `Video/Source`
//! providers. Live capture builds a
//! `source ! videoconvert ! capsfilter ! appsink` pipeline per device and
//! publishes decoded RGBA frames into the session's tap from the streaming
//! thread. Pipelines must reach the Null state to free the hardware, so
//! closing waits for the state change and `Drop` acts as a backstop.

use std::sync::Arc;

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video::VideoInfo;
use tracing::{debug, error, info, warn};

use super::types::{FrameTap, VideoDevice, VideoFrame};
use super::{CaptureBackend, LiveSource};
use crate::constants::{pipeline, timing};
use crate::errors::CaptureError;

/// GStreamer-backed production capture stack
#[derive(Debug, Default)]
pub struct GstBackend;

impl GstBackend {
    pub fn new() -> Self {
        Self
    }
}

/// Initialize GStreamer, normalizing failure into the capture taxonomy
fn ensure_init() -> Result<(), CaptureError> {
    gst::init()
        .map_err(|e| CaptureError::ApiUnsupported(format!("GStreamer init failed: {}", e)))
}

/// Run one device monitor scan filtered to video sources
fn scan_devices() -> Result<Vec<gst::Device>, CaptureError> {
    ensure_init()?;

    let monitor = gst::DeviceMonitor::new();
    let _filter = monitor.add_filter(Some("Video/Source"), None);
    monitor.start().map_err(|e| {
        CaptureError::ApiUnsupported(format!("device monitor failed to start: {}", e))
    })?;
    let devices: Vec<gst::Device> = monitor.devices().into_iter().collect();
    monitor.stop();

    Ok(devices)
}

/// Read a structure field as a string, accepting integer-typed values
fn property_string(props: &gst::StructureRef, key: &str) -> Option<String> {
    if let Ok(value) = props.get::<String>(key) {
        return Some(value);
    }
    if let Ok(value) = props.get::<u64>(key) {
        return Some(value.to_string());
    }
    if let Ok(value) = props.get::<i64>(key) {
        return Some(value.to_string());
    }
    None
}

/// Derive a stable device ID from backend properties
///
/// Prefers the object serial, then the device path. The GStreamer object
/// name is a last resort for providers that expose neither.
fn device_id(device: &gst::Device) -> String {
    if let Some(props) = device.properties() {
        if let Some(serial) = property_string(&props, "object.serial") {
            return format!("gst-serial-{}", serial);
        }
        if let Some(path) = property_string(&props, "device.path") {
            return format!("gst-path-{}", path);
        }
    }
    debug!(name = %device.name(), "Device exposes no stable properties, using object name");
    format!("gst-{}", device.name())
}

/// Find a monitored device by its derived ID
fn find_device(id: &str) -> Result<gst::Device, CaptureError> {
    let devices = scan_devices()?;
    devices
        .into_iter()
        .find(|device| device_id(device) == id)
        .ok_or_else(|| CaptureError::DeviceUnavailable(format!("no such device: {}", id)))
}

impl CaptureBackend for GstBackend {
    fn is_available(&self) -> bool {
        if gst::init().is_err() {
            return false;
        }
        gst::ElementFactory::find("videoconvert").is_some()
            && gst::ElementFactory::find("appsink").is_some()
    }

    fn enumerate(&self) -> Result<Vec<VideoDevice>, CaptureError> {
        let devices = scan_devices()?;
        Ok(devices
            .iter()
            .map(|device| VideoDevice {
                id: device_id(device),
                label: device.display_name().to_string(),
            })
            .collect())
    }

    fn probe_access(&self) -> Result<(), CaptureError> {
        let devices = scan_devices()?;
        let Some(device) = devices.first() else {
            return Err(CaptureError::DeviceUnavailable(
                "no video inputs to probe".into(),
            ));
        };
        info!(label = %device.display_name(), "Probing camera access");

        let source = device.create_element(None).map_err(|e| {
            CaptureError::PermissionDenied(format!("probe source refused: {}", e))
        })?;
        let sink = gst::ElementFactory::make("fakesink")
            .build()
            .map_err(|e| CaptureError::ApiUnsupported(format!("Failed to create fakesink: {}", e)))?;

        let probe = gst::Pipeline::new();
        probe
            .add_many([&source, &sink])
            .map_err(|e| CaptureError::ApiUnsupported(format!("Failed to assemble probe: {}", e)))?;
        source
            .link(&sink)
            .map_err(|_| CaptureError::ApiUnsupported("Failed to link probe elements".into()))?;

        let outcome = run_probe(&probe);

        // Release probe resources before reporting, success or not
        let _ = probe.set_state(gst::State::Null);
        let _ = probe.state(gst::ClockTime::from_seconds(timing::STOP_TIMEOUT_SECS));

        outcome
    }

    fn open(&self, device_id: &str, tap: FrameTap) -> Result<Box<dyn LiveSource>, CaptureError> {
        let device = find_device(device_id)?;
        info!(device_id = %device_id, label = %device.display_name(), "Opening capture session");

        let source = device.create_element(None).map_err(|e| {
            CaptureError::DeviceUnavailable(format!("Failed to create source element: {}", e))
        })?;

        let videoconvert = gst::ElementFactory::make("videoconvert")
            .property("n-threads", pipeline::videoconvert_threads())
            .build()
            .map_err(|e| {
                CaptureError::ApiUnsupported(format!("Failed to create videoconvert: {}", e))
            })?;

        let caps = gst::Caps::builder("video/x-raw")
            .field("format", pipeline::OUTPUT_FORMAT)
            .build();

        let appsink = gst::ElementFactory::make("appsink")
            .build()
            .map_err(|e| CaptureError::ApiUnsupported(format!("Failed to create appsink: {}", e)))?
            .dynamic_cast::<gst_app::AppSink>()
            .map_err(|_| CaptureError::ApiUnsupported("Failed to cast to AppSink".into()))?;

        // Low-latency appsink: tiny queue, drop stale frames, no sync
        appsink.set_caps(Some(&caps));
        appsink.set_property("emit-signals", true);
        appsink.set_property("sync", false);
        appsink.set_property("max-buffers", pipeline::MAX_BUFFERS);
        appsink.set_property("drop", true);
        appsink.set_property("enable-last-sample", false);

        let mut frame_num: u64 = 0;
        appsink.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    frame_num += 1;

                    let sample = appsink.pull_sample().map_err(|e| {
                        if frame_num % timing::FRAME_LOG_INTERVAL == 0 {
                            error!(frame = frame_num, error = ?e, "Failed to pull sample");
                        }
                        gst::FlowError::Eos
                    })?;

                    let buffer = sample.buffer().ok_or_else(|| {
                        if frame_num % timing::FRAME_LOG_INTERVAL == 0 {
                            error!(frame = frame_num, "No buffer in sample");
                        }
                        gst::FlowError::Error
                    })?;

                    // Incomplete DMA transfers surface as corrupted buffers
                    if buffer.flags().contains(gst::BufferFlags::CORRUPTED) {
                        if frame_num % timing::FRAME_LOG_INTERVAL == 0 {
                            warn!(frame = frame_num, "Buffer marked as corrupted, skipping frame");
                        }
                        return Err(gst::FlowError::Error);
                    }

                    let caps = sample.caps().ok_or_else(|| {
                        if frame_num % timing::FRAME_LOG_INTERVAL == 0 {
                            error!(frame = frame_num, "No caps in sample");
                        }
                        gst::FlowError::Error
                    })?;

                    let video_info = VideoInfo::from_caps(caps).map_err(|e| {
                        if frame_num % timing::FRAME_LOG_INTERVAL == 0 {
                            error!(frame = frame_num, error = ?e, "Failed to get video info");
                        }
                        gst::FlowError::Error
                    })?;

                    let map = buffer.map_readable().map_err(|e| {
                        if frame_num % timing::FRAME_LOG_INTERVAL == 0 {
                            error!(frame = frame_num, error = ?e, "Failed to map buffer");
                        }
                        gst::FlowError::Error
                    })?;

                    tap.publish(VideoFrame {
                        width: video_info.width(),
                        height: video_info.height(),
                        stride: video_info.stride()[0] as u32,
                        data: Arc::from(map.as_slice()),
                    });

                    if frame_num % timing::FRAME_LOG_INTERVAL == 0 {
                        debug!(
                            frame = frame_num,
                            width = video_info.width(),
                            height = video_info.height(),
                            size_kb = map.as_slice().len() / 1024,
                            "Published frame"
                        );
                    }

                    Ok(gst::FlowSuccess::Ok)
                })
                .build(),
        );

        let session = gst::Pipeline::new();
        session
            .add_many([&source, &videoconvert, appsink.upcast_ref::<gst::Element>()])
            .map_err(|e| {
                CaptureError::ApiUnsupported(format!("Failed to assemble pipeline: {}", e))
            })?;
        source
            .link(&videoconvert)
            .map_err(|_| CaptureError::DeviceUnavailable("Failed to link source".into()))?;
        videoconvert
            .link(appsink.upcast_ref::<gst::Element>())
            .map_err(|_| CaptureError::ApiUnsupported("Failed to link appsink".into()))?;

        let state = start_session(&session)?;
        if state != gst::State::Playing {
            warn!(device_id = %device_id, "Pipeline is not in PLAYING state yet");
        }

        info!(device_id = %device_id, "Capture session running");

        Ok(Box::new(GstSource {
            pipeline: session,
            appsink,
            device_id: device_id.to_string(),
        }))
    }
}

/// Drive a capture pipeline to Playing, reporting the state it reached
///
/// Any failure rolls the pipeline back to Null before the error is
/// returned; async completion is accepted.
fn start_session(session: &gst::Pipeline) -> Result<gst::State, CaptureError> {
    if let Err(e) = session.set_state(gst::State::Playing) {
        let _ = session.set_state(gst::State::Null);
        return Err(CaptureError::DeviceUnavailable(format!(
            "Failed to start pipeline: {}",
            e
        )));
    }

    let (result, state, pending) =
        session.state(gst::ClockTime::from_seconds(timing::START_TIMEOUT_SECS));
    debug!(result = ?result, state = ?state, pending = ?pending, "Pipeline state");
    if let Err(e) = result {
        let _ = session.set_state(gst::State::Null);
        return Err(CaptureError::DeviceUnavailable(format!(
            "pipeline failed to reach playing state: {}",
            e
        )));
    }
    Ok(state)
}

/// Drive a probe pipeline to Playing and interpret the outcome
fn run_probe(probe: &gst::Pipeline) -> Result<(), CaptureError> {
    probe.set_state(gst::State::Playing).map_err(|e| {
        CaptureError::PermissionDenied(format!("probe rejected playing state: {}", e))
    })?;

    let (result, state, pending) =
        probe.state(gst::ClockTime::from_seconds(timing::START_TIMEOUT_SECS));
    debug!(result = ?result, state = ?state, pending = ?pending, "Probe state");
    match result {
        Ok(_) => Ok(()),
        Err(e) => Err(CaptureError::PermissionDenied(format!(
            "camera refused to start: {}",
            e
        ))),
    }
}

/// A live GStreamer capture session
struct GstSource {
    pipeline: gst::Pipeline,
    appsink: gst_app::AppSink,
    device_id: String,
}

impl LiveSource for GstSource {
    fn close(self: Box<Self>) {
        info!(device_id = %self.device_id, "Stopping capture session");

        // Clear appsink callbacks to release the tap reference
        self.appsink
            .set_callbacks(gst_app::AppSinkCallbacks::builder().build());

        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            warn!(device_id = %self.device_id, error = %e, "Failed to stop pipeline");
            return;
        }

        // Wait for the state change so the hardware is actually freed
        let (result, state, _) = self
            .pipeline
            .state(gst::ClockTime::from_seconds(timing::STOP_TIMEOUT_SECS));
        match result {
            Ok(_) => {
                debug!(device_id = %self.device_id, state = ?state, "Capture session stopped")
            }
            Err(e) => {
                debug!(
                    device_id = %self.device_id,
                    error = ?e,
                    state = ?state,
                    "Pipeline state change had issues"
                )
            }
        }
    }
}

impl Drop for GstSource {
    fn drop(&mut self) {
        self.appsink
            .set_callbacks(gst_app::AppSinkCallbacks::builder().build());
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}
