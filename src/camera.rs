// camera.rs — 视角参数（yaw / pitch / fov）与 view-projection 矩阵

use glam::{Mat4, Vec3};

pub const DEFAULT_FOV: f32 = 75.0;
const MIN_FOV: f32 = 5.0;
const MAX_FOV: f32 = 120.0;
pub const NEAR: f32 = 0.05;
pub const FAR: f32 = 1000.0;

/// Camera at the centre of the panorama surface. Angles in degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerCamera {
    pub yaw: f32,
    pub pitch: f32,
    pub fov: f32,
    pub sensitivity_scale: f32,
}

impl Default for ViewerCamera {
    fn default() -> Self {
        Self::new(DEFAULT_FOV, 1.0)
    }
}

impl ViewerCamera {
    pub fn new(fov: f32, sensitivity_scale: f32) -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            fov: fov.clamp(MIN_FOV, MAX_FOV),
            sensitivity_scale,
        }
    }

    pub fn reset(&mut self, fov: f32) {
        self.yaw = 0.0;
        self.pitch = 0.0;
        self.fov = fov.clamp(MIN_FOV, MAX_FOV);
    }

    /// Unit view direction. `yaw = pitch = 0` looks down `+Z`, the centre of
    /// the equirectangular image.
    pub fn forward(&self) -> Vec3 {
        let yaw = self.yaw.to_radians();
        let pitch = self.pitch.to_radians();
        Vec3::new(yaw.sin() * pitch.cos(), pitch.sin(), yaw.cos() * pitch.cos())
    }

    /// Rotates by a mouse drag of `(dx, dy)` pixels in a `width` x `height`
    /// viewport so the image follows the cursor.
    pub fn drag(&mut self, dx: f32, dy: f32, width: f32, height: f32) {
        if width <= 0.0 || height <= 0.0 {
            return;
        }
        let v_f = self.fov.to_radians();
        let aspect = width / height;
        let h_f = 2.0 * ((v_f / 2.0).tan() * aspect).atan();

        let yaw_per_px_deg = (h_f / width).to_degrees();
        let pitch_per_px_deg = (v_f / height).to_degrees();

        // 从球内部看，向右拖动时画面随鼠标移动
        self.yaw += dx * yaw_per_px_deg * self.sensitivity_scale;
        // 到达 ±90° 时 look_to 的 up 向量退化
        self.pitch = (self.pitch + dy * pitch_per_px_deg * self.sensitivity_scale).clamp(-89.9, 89.9);
    }

    pub fn zoom(&mut self, scroll: f32) {
        self.fov = (self.fov - scroll * 2.5).clamp(MIN_FOV, MAX_FOV);
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_to_rh(Vec3::ZERO, self.forward(), Vec3::Y)
    }

    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        let proj = Mat4::perspective_rh(self.fov.to_radians(), aspect.max(1e-3), NEAR, FAR);
        proj * self.view()
    }
}
