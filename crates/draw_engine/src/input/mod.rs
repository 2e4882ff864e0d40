//! Touch gesture handling
//!
//! Drags rotate the scene: horizontal motion turns it about the Y axis and
//! vertical motion about the X axis. A touch that lifts without any single
//! move exceeding the click threshold counts as a click and cycles the
//! display mode.

use crate::config::InputConfig;
use crate::foundation::math::MatrixState;

/// Touch screen event in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TouchEvent {
    /// Finger pressed
    Down {
        /// Horizontal position in pixels
        x: f32,
        /// Vertical position in pixels
        y: f32,
    },
    /// Finger moved
    Move {
        /// Horizontal position in pixels
        x: f32,
        /// Vertical position in pixels
        y: f32,
    },
    /// Finger lifted
    Up,
}

/// Rotation and mode state driven by touch input
#[derive(Debug, Clone)]
pub struct TouchController {
    config: InputConfig,
    x_prev: f32,
    y_prev: f32,
    x_angle: f32,
    y_angle: f32,
    is_click: bool,
    mode: u32,
}

impl TouchController {
    /// Controller at zero rotation in mode 0
    pub fn new(config: InputConfig) -> Self {
        Self {
            config,
            x_prev: 0.0,
            y_prev: 0.0,
            x_angle: 0.0,
            y_angle: 0.0,
            is_click: true,
            mode: 0,
        }
    }

    /// Apply one event. Returns the new mode when a click cycled it.
    pub fn handle(&mut self, event: TouchEvent) -> Option<u32> {
        match event {
            TouchEvent::Down { x, y } => {
                self.is_click = true;
                self.x_prev = x;
                self.y_prev = y;
                None
            }
            TouchEvent::Move { x, y } => {
                let dx = x - self.x_prev;
                let dy = y - self.y_prev;
                let threshold = self.config.click_threshold;
                if dx.abs() > threshold || dy.abs() > threshold {
                    self.is_click = false;
                }
                self.x_angle += dy * self.config.touch_scale_factor;
                self.y_angle += dx * self.config.touch_scale_factor;
                self.x_prev = x;
                self.y_prev = y;
                None
            }
            TouchEvent::Up => {
                if !self.is_click || self.config.mode_count == 0 {
                    return None;
                }
                self.mode = (self.mode + 1) % self.config.mode_count;
                log::debug!("Touch click, mode now {}", self.mode);
                Some(self.mode)
            }
        }
    }

    /// Rotation about the X axis, in degrees
    pub fn x_angle(&self) -> f32 {
        self.x_angle
    }

    /// Rotation about the Y axis, in degrees
    pub fn y_angle(&self) -> f32 {
        self.y_angle
    }

    /// Current display mode, in `0..mode_count`
    pub fn mode(&self) -> u32 {
        self.mode
    }

    /// Rotate the current model matrix by the accumulated angles
    pub fn apply_rotation(&self, matrices: &mut MatrixState) {
        matrices.rotate(self.x_angle, 1.0, 0.0, 0.0);
        matrices.rotate(self.y_angle, 0.0, 1.0, 0.0);
    }
}

impl Default for TouchController {
    fn default() -> Self {
        Self::new(InputConfig::default())
    }
}
