// SPDX-License-Identifier: GPL-3.0-only

//! Per-eye transform parameters and the CPU mirror of the shader's
//! sampling-coordinate derivation
//!
//! The shader and this module must agree on the coordinate pipeline:
//! vertical flip, then the parallax shift along the horizontal baseline
//! (left eye minus, right eye plus), then the quarter-turn rotation about
//! the image center, then a clamp to the valid [0,1] sampling range.

use serde::{Deserialize, Serialize};

use crate::capture::types::Eye;
use crate::constants::transform::{PARALLAX_CONTROL_MAX, PARALLAX_UV_RANGE};

/// Quarter-turn rotation correction (clockwise)
///
/// Webcams in a stereo rig are often mounted sideways or upside down;
/// each eye carries its own correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rotation {
    /// No rotation
    #[default]
    None,
    /// 90 degrees clockwise
    Rotate90,
    /// 180 degrees (upside down)
    Rotate180,
    /// 270 degrees clockwise (90 degrees counter-clockwise)
    Rotate270,
}

impl Rotation {
    /// Create rotation from an integer degree value (normalised to 0-360)
    pub fn from_degrees_int(degrees: i32) -> Self {
        match degrees.rem_euclid(360) {
            90 => Rotation::Rotate90,
            180 => Rotation::Rotate180,
            270 => Rotation::Rotate270,
            _ => Rotation::None,
        }
    }

    /// Strict parse for command-line validation
    pub fn try_from_degrees(degrees: u32) -> Result<Self, String> {
        match degrees {
            0 => Ok(Rotation::None),
            90 => Ok(Rotation::Rotate90),
            180 => Ok(Rotation::Rotate180),
            270 => Ok(Rotation::Rotate270),
            other => Err(format!("rotation must be 0, 90, 180 or 270, got {}", other)),
        }
    }

    /// Get the rotation in degrees
    pub fn degrees(&self) -> u32 {
        match self {
            Rotation::None => 0,
            Rotation::Rotate90 => 90,
            Rotation::Rotate180 => 180,
            Rotation::Rotate270 => 270,
        }
    }

    /// Next quarter turn clockwise
    pub fn rotated_cw(self) -> Self {
        Self::from_degrees_int(self.degrees() as i32 + 90)
    }

    /// Next quarter turn counter-clockwise
    pub fn rotated_ccw(self) -> Self {
        Self::from_degrees_int(self.degrees() as i32 - 90)
    }

    /// Get the rotation as a GPU shader code (0=None, 1=90CW, 2=180, 3=270CW)
    pub fn gpu_code(&self) -> u32 {
        match self {
            Rotation::None => 0,
            Rotation::Rotate90 => 1,
            Rotation::Rotate180 => 2,
            Rotation::Rotate270 => 3,
        }
    }

    /// Rotate a UV coordinate about the image center (0.5, 0.5)
    pub fn rotate_about_center(self, u: f32, v: f32) -> (f32, f32) {
        let x = u - 0.5;
        let y = v - 0.5;
        let (rx, ry) = match self {
            Rotation::None => (x, y),
            Rotation::Rotate90 => (y, -x),
            Rotation::Rotate180 => (-x, -y),
            Rotation::Rotate270 => (-y, x),
        };
        (rx + 0.5, ry + 0.5)
    }
}

impl std::fmt::Display for Rotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Map a control-range parallax value to the UV shift applied per eye
///
/// Input clamps to the control range and maps linearly; 0 maps to 0.
pub fn parallax_uv(control: f32) -> f32 {
    let clamped = control.clamp(-PARALLAX_CONTROL_MAX, PARALLAX_CONTROL_MAX);
    clamped / PARALLAX_CONTROL_MAX * PARALLAX_UV_RANGE
}

/// Per-eye rotation corrections plus the shared parallax control
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EyeTransforms {
    pub left_rotation: Rotation,
    pub right_rotation: Rotation,
    /// Control-range value; the per-eye UV shift comes from [`parallax_uv`]
    pub parallax: f32,
}

impl EyeTransforms {
    pub fn rotation(&self, eye: Eye) -> Rotation {
        match eye {
            Eye::Left => self.left_rotation,
            Eye::Right => self.right_rotation,
        }
    }

    /// Step one eye's rotation by a quarter turn
    pub fn rotate(&mut self, eye: Eye, clockwise: bool) {
        let slot = match eye {
            Eye::Left => &mut self.left_rotation,
            Eye::Right => &mut self.right_rotation,
        };
        *slot = if clockwise {
            slot.rotated_cw()
        } else {
            slot.rotated_ccw()
        };
    }

    /// Set the parallax control, clamped to the control range
    pub fn set_parallax(&mut self, value: f32) {
        self.parallax = value.clamp(-PARALLAX_CONTROL_MAX, PARALLAX_CONTROL_MAX);
    }

    /// Nudge the parallax control by a delta, clamped
    pub fn nudge_parallax(&mut self, delta: f32) {
        self.set_parallax(self.parallax + delta);
    }

    /// Back to no rotation and zero parallax
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// CPU mirror of the shader's per-eye sampling coordinate
///
/// `uv` is the normalized surface coordinate with the origin at the
/// bottom left; the vertical flip maps it onto the top-down frame rows.
/// The parallax shift applies before the rotation so it always acts
/// along the physical camera baseline, whatever the mounting orientation.
pub fn sample_coord(eye: Eye, uv: (f32, f32), transforms: &EyeTransforms) -> (f32, f32) {
    let shift = parallax_uv(transforms.parallax);
    let signed = match eye {
        Eye::Left => -shift,
        Eye::Right => shift,
    };

    let u = uv.0 + signed;
    let v = 1.0 - uv.1;

    let (ru, rv) = transforms.rotation(eye).rotate_about_center(u, v);
    (ru.clamp(0.0, 1.0), rv.clamp(0.0, 1.0))
}

/// Fixed anaglyph channel rule: red from the left eye, green and blue from
/// the right
pub fn compose(left: [f32; 3], right: [f32; 3]) -> [f32; 3] {
    [left[0], right[1], right[2]]
}
