// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands that run without a window

use anaglyph::capture::{get_backend, CaptureManager};

/// List all available cameras
///
/// Prompts for camera access first so device labels come through, then
/// prints index, label and the stable id accepted by `--left`/`--right`.
pub fn list_cameras() -> Result<(), Box<dyn std::error::Error>> {
    let manager = CaptureManager::new(get_backend());
    let devices = manager.refresh_devices(true);

    if let Some(err) = manager.snapshot().last_error {
        return Err(err.into());
    }

    if devices.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras:");
    println!();
    for (index, device) in devices.iter().enumerate() {
        println!("  [{}] {}", index, device.label);
        println!("      id: {}", device.id);
        println!();
    }

    Ok(())
}
