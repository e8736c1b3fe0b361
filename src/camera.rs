use std::f32::consts::FRAC_PI_2;

use glam::{Mat4, Vec3};

use crate::config::CameraConfig;
use crate::input::{InputState, KeyCode, NamedKey};

const FORWARD_KEYS: [KeyCode; 2] = [KeyCode::Character('W'), KeyCode::Named(NamedKey::Up)];
const BACKWARD_KEYS: [KeyCode; 2] = [KeyCode::Character('S'), KeyCode::Named(NamedKey::Down)];
const LEFT_KEYS: [KeyCode; 2] = [KeyCode::Character('A'), KeyCode::Named(NamedKey::Left)];
const RIGHT_KEYS: [KeyCode; 2] = [KeyCode::Character('D'), KeyCode::Named(NamedKey::Right)];

const PITCH_LIMIT: f32 = FRAC_PI_2 - 0.01;

/// First-person camera driven by keyboard movement and pointer-drag look.
#[derive(Debug, Clone, PartialEq)]
pub struct UniversalCamera {
    pub name: String,
    position: Vec3,
    target: Vec3,
    yaw: f32,
    pitch: f32,
    pub fov: f32,
    pub min_z: f32,
    pub max_z: f32,
    pub speed: f32,
    pub angular_sensibility: f32,
    attached_to: Option<String>,
}

impl UniversalCamera {
    /// Places a camera at `position` looking down the negative depth axis.
    pub fn new(name: &str, position: Vec3, config: &CameraConfig) -> Self {
        Self {
            name: name.to_string(),
            position,
            target: position + Vec3::NEG_Z,
            yaw: 0.0,
            pitch: 0.0,
            fov: config.fov,
            min_z: config.min_z,
            max_z: config.max_z,
            speed: config.speed,
            angular_sensibility: config.angular_sensibility,
            attached_to: None,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn target(&self) -> Vec3 {
        self.target
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    /// Orients the camera towards `target`. A target equal to the position is ignored.
    /// Targets steeper than the pitch limit are pulled back onto it.
    pub fn set_target(&mut self, target: Vec3) {
        let offset = target - self.position;
        if offset.length_squared() <= f32::EPSILON {
            return;
        }
        let direction = offset.normalize();
        let pitch = direction.y.clamp(-1.0, 1.0).asin();
        self.yaw = direction.x.atan2(-direction.z);
        self.pitch = pitch.clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.target = if pitch.abs() > PITCH_LIMIT {
            self.position + self.forward()
        } else {
            target
        };
    }

    /// Binds keyboard and pointer input from the named surface.
    pub fn attach_control(&mut self, surface_id: &str) {
        self.attached_to = Some(surface_id.to_string());
    }

    pub fn detach_control(&mut self) {
        self.attached_to = None;
    }

    pub fn attached_surface(&self) -> Option<&str> {
        self.attached_to.as_deref()
    }

    pub fn forward(&self) -> Vec3 {
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        Vec3::new(sin_yaw * cos_pitch, sin_pitch, -cos_yaw * cos_pitch)
    }

    pub fn right(&self) -> Vec3 {
        self.forward().cross(Vec3::Y).normalize_or_zero()
    }

    /// Applies held keys and accumulated drag for a frame of `dt` seconds.
    /// Returns whether the camera moved or turned.
    pub fn update(&mut self, input: &InputState, dt: f32) -> bool {
        if self.attached_to.is_none() {
            return false;
        }

        let mut changed = false;
        let drag = input.take_drag_delta();
        if drag != glam::Vec2::ZERO && self.angular_sensibility > 0.0 {
            self.yaw += drag.x / self.angular_sensibility;
            self.pitch =
                (self.pitch - drag.y / self.angular_sensibility).clamp(-PITCH_LIMIT, PITCH_LIMIT);
            changed = true;
        }

        let axis = |positive: &[KeyCode], negative: &[KeyCode]| -> f32 {
            input.is_any_key_down(positive) as i32 as f32
                - input.is_any_key_down(negative) as i32 as f32
        };
        let forward_amount = axis(&FORWARD_KEYS, &BACKWARD_KEYS);
        let right_amount = axis(&RIGHT_KEYS, &LEFT_KEYS);
        let movement = self.forward() * forward_amount + self.right() * right_amount;
        if movement.length_squared() > 0.0 && dt > 0.0 {
            self.position += movement.normalize() * self.speed * dt;
            changed = true;
        }

        if changed {
            self.target = self.position + self.forward();
        }
        changed
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, Vec3::Y)
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov, aspect.max(0.01), self.min_z, self.max_z)
    }

    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        self.projection_matrix(aspect) * self.view_matrix()
    }
}
