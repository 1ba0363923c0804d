// SPDX-License-Identifier: GPL-3.0-only

//! Windowed anaglyph viewer
//!
//! Runs the winit event loop, drives the capture manager from a worker
//! runtime so acquisitions never block rendering, and maps the keyboard
//! onto capture and transform controls:
//!
//! - Space toggles capture, `r` re-enumerates devices
//! - `q`/`e` rotate the left eye, `u`/`o` the right
//! - Left/Right arrows step the parallax, `0` resets all transforms
//! - Escape (or closing the window, or Ctrl+C) stops capture, saves the
//!   settings and exits
//!
//! Session status lives in the window title; there is no other chrome.

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use winit::dpi::LogicalSize;
use winit::event::{ElementState, Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder};
use winit::keyboard::{Key, NamedKey};
use winit::window::WindowBuilder;

use crate::capture::types::{Eye, PermissionState, SessionStatus};
use crate::capture::{get_backend, CaptureManager, ManagerSnapshot};
use crate::compositor::transform::EyeTransforms;
use crate::compositor::{Compositor, Rotation};
use crate::config::Settings;
use crate::constants::app_info;
use crate::constants::transform::PARALLAX_STEP;
use crate::constants::viewer::{WINDOW_HEIGHT, WINDOW_TITLE, WINDOW_WIDTH};
use crate::errors::{AppError, AppResult};

/// Command-line overrides for a viewer run
#[derive(Debug, Clone, Default)]
pub struct ViewerOptions {
    pub left_device: Option<String>,
    pub right_device: Option<String>,
    pub left_rotation: Option<Rotation>,
    pub right_rotation: Option<Rotation>,
    pub parallax: Option<f32>,
    pub autostart: bool,
}

/// Events injected into the loop from outside the window
#[derive(Debug, Clone, Copy)]
enum ViewerEvent {
    Quit,
}

/// Run the viewer until the user quits
pub fn run(options: ViewerOptions) -> AppResult<()> {
    info!(version = app_info::version(), "Starting viewer");

    let manager = CaptureManager::new(get_backend());
    if !manager.is_available() {
        warn!("Capture stack unavailable, running without cameras");
    }

    let mut settings = Settings::load_or_default();
    apply_overrides(&mut settings, &options);

    let mut transforms = EyeTransforms {
        left_rotation: settings.left_rotation,
        right_rotation: settings.right_rotation,
        parallax: 0.0,
    };
    transforms.set_parallax(settings.parallax);

    // Seed selections before the first scan so the re-default rule can
    // keep them when the devices are still present
    if let Some(id) = settings.left_device.clone() {
        manager.select_device(Eye::Left, id);
    }
    if let Some(id) = settings.right_device.clone() {
        manager.select_device(Eye::Right, id);
    }
    manager.refresh_devices(false);

    let event_loop = EventLoopBuilder::<ViewerEvent>::with_user_event()
        .build()
        .map_err(|e| AppError::Other(format!("Failed to create event loop: {}", e)))?;
    let window = WindowBuilder::new()
        .with_title(WINDOW_TITLE)
        .with_inner_size(LogicalSize::new(WINDOW_WIDTH, WINDOW_HEIGHT))
        .build(&event_loop)
        .map_err(|e| AppError::Other(format!("Failed to create window: {}", e)))?;
    let window = Arc::new(window);

    let mut compositor = pollster::block_on(Compositor::new(
        window.clone(),
        manager.tap(Eye::Left),
        manager.tap(Eye::Right),
    ))?;
    compositor.set_transforms(&transforms);

    // Capture calls block, so they run on the worker runtime while the
    // loop watches for the results through snapshots
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| AppError::Other(format!("Failed to start worker runtime: {}", e)))?;

    // Route Ctrl+C through the loop so capture always stops cleanly
    let proxy = event_loop.create_proxy();
    ctrlc::set_handler(move || {
        let _ = proxy.send_event(ViewerEvent::Quit);
    })
    .map_err(|e| AppError::Other(format!("Failed to install signal handler: {}", e)))?;

    if options.autostart {
        spawn_start(&runtime, &manager);
    }

    let mut was_running = false;
    let mut last_title = String::new();

    event_loop
        .run(move |event, elwt| {
            elwt.set_control_flow(ControlFlow::Poll);
            match event {
                Event::UserEvent(ViewerEvent::Quit) => elwt.exit(),
                Event::WindowEvent { window_id, event } if window_id == window.id() => {
                    match event {
                        WindowEvent::CloseRequested | WindowEvent::Destroyed => elwt.exit(),
                        WindowEvent::Resized(size) => {
                            compositor.resize(size.width, size.height);
                        }
                        WindowEvent::KeyboardInput { event, .. }
                            if event.state == ElementState::Pressed =>
                        {
                            match &event.logical_key {
                                Key::Named(NamedKey::Escape) => elwt.exit(),
                                Key::Named(NamedKey::Space) if !event.repeat => {
                                    if capture_busy(&manager.snapshot()) {
                                        spawn_stop(&runtime, &manager);
                                    } else {
                                        spawn_start(&runtime, &manager);
                                    }
                                }
                                Key::Named(NamedKey::ArrowLeft) => {
                                    transforms.nudge_parallax(-PARALLAX_STEP);
                                    compositor.set_transforms(&transforms);
                                }
                                Key::Named(NamedKey::ArrowRight) => {
                                    transforms.nudge_parallax(PARALLAX_STEP);
                                    compositor.set_transforms(&transforms);
                                }
                                Key::Character(text) => {
                                    let rotated = match text.as_str() {
                                        "q" => Some((Eye::Left, false)),
                                        "e" => Some((Eye::Left, true)),
                                        "u" => Some((Eye::Right, false)),
                                        "o" => Some((Eye::Right, true)),
                                        _ => None,
                                    };
                                    if let Some((eye, clockwise)) = rotated {
                                        transforms.rotate(eye, clockwise);
                                        compositor.set_transforms(&transforms);
                                    } else {
                                        match text.as_str() {
                                            "r" if !event.repeat => {
                                                spawn_refresh(&runtime, &manager);
                                            }
                                            "0" => {
                                                transforms.reset();
                                                compositor.set_transforms(&transforms);
                                            }
                                            _ => {}
                                        }
                                    }
                                }
                                _ => {}
                            }
                        }
                        WindowEvent::RedrawRequested => match compositor.render() {
                            Ok(()) => {}
                            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                                let (width, height) = compositor.size();
                                compositor.resize(width, height);
                            }
                            Err(wgpu::SurfaceError::OutOfMemory) => {
                                error!("Graphics memory exhausted, shutting down");
                                elwt.exit();
                            }
                            Err(err) => debug!(error = %err, "Skipping frame"),
                        },
                        _ => {}
                    }
                }
                Event::AboutToWait => {
                    let snapshot = manager.snapshot();
                    if snapshot.is_running() && !was_running {
                        // New sessions publish through new taps
                        compositor
                            .rebind_feeds(manager.tap(Eye::Left), manager.tap(Eye::Right));
                        persist_settings(&mut settings, &snapshot, &transforms);
                    }
                    if !snapshot.is_running() && was_running {
                        compositor.release_feeds();
                    }
                    was_running = snapshot.is_running();

                    let title = render_title(&snapshot, &transforms);
                    if title != last_title {
                        window.set_title(&title);
                        last_title = title;
                    }

                    window.request_redraw();
                }
                Event::LoopExiting => {
                    info!("Shutting down");
                    manager.stop();
                    persist_settings(&mut settings, &manager.snapshot(), &transforms);
                }
                _ => {}
            }
        })
        .map_err(|e| AppError::Other(format!("Event loop error: {}", e)))
}

/// Fold command-line flags over the persisted settings
fn apply_overrides(settings: &mut Settings, options: &ViewerOptions) {
    if options.left_device.is_some() {
        settings.left_device = options.left_device.clone();
    }
    if options.right_device.is_some() {
        settings.right_device = options.right_device.clone();
    }
    if let Some(rotation) = options.left_rotation {
        settings.left_rotation = rotation;
    }
    if let Some(rotation) = options.right_rotation {
        settings.right_rotation = rotation;
    }
    if let Some(parallax) = options.parallax {
        settings.parallax = parallax;
    }
}

/// A session pair that is starting or streaming counts as busy; Space
/// then stops instead of starting again
fn capture_busy(snapshot: &ManagerSnapshot) -> bool {
    snapshot
        .status
        .iter()
        .any(|s| matches!(s, SessionStatus::Acquiring | SessionStatus::Active))
}

fn spawn_start(runtime: &tokio::runtime::Runtime, manager: &CaptureManager) {
    let manager = manager.clone();
    runtime.spawn_blocking(move || match manager.start() {
        Ok(true) => {}
        Ok(false) => debug!("Start attempt superseded"),
        // Failures are recorded in the manager state and logged there
        Err(_) => {}
    });
}

fn spawn_stop(runtime: &tokio::runtime::Runtime, manager: &CaptureManager) {
    let manager = manager.clone();
    runtime.spawn_blocking(move || manager.stop());
}

fn spawn_refresh(runtime: &tokio::runtime::Runtime, manager: &CaptureManager) {
    let manager = manager.clone();
    runtime.spawn_blocking(move || {
        let devices = manager.refresh_devices(true);
        info!(count = devices.len(), "Devices refreshed");
    });
}

/// Copy the live selection and transforms into the settings and save them
fn persist_settings(
    settings: &mut Settings,
    snapshot: &ManagerSnapshot,
    transforms: &EyeTransforms,
) {
    settings.left_device = snapshot.selected[Eye::Left.index()].clone();
    settings.right_device = snapshot.selected[Eye::Right.index()].clone();
    settings.left_rotation = transforms.left_rotation;
    settings.right_rotation = transforms.right_rotation;
    settings.parallax = transforms.parallax;
    settings.store();
}

/// One-line status for the window title
fn render_title(snapshot: &ManagerSnapshot, transforms: &EyeTransforms) -> String {
    let mut title = format!(
        "{} | L {} {} | R {} {} | parallax {:+.0}",
        WINDOW_TITLE,
        eye_summary(snapshot, Eye::Left),
        transforms.left_rotation,
        eye_summary(snapshot, Eye::Right),
        transforms.right_rotation,
        transforms.parallax,
    );
    if snapshot.permission != PermissionState::Granted {
        title.push_str(&format!(" | permission: {}", snapshot.permission));
    }
    if let Some(err) = &snapshot.last_error {
        title.push_str(&format!(" | {}", err));
    }
    title
}

/// Device label and session status for one eye
fn eye_summary(snapshot: &ManagerSnapshot, eye: Eye) -> String {
    let label = match snapshot.selected_of(eye) {
        Some(id) => snapshot
            .devices
            .iter()
            .find(|d| d.id == id)
            .map(|d| d.label.clone())
            .unwrap_or_else(|| id.to_string()),
        None => "no device".into(),
    };
    format!("{} ({})", label, snapshot.status_of(eye))
}
