// SPDX-License-Identifier: CEPL-1.0
use glam::{Mat4, Vec3};

/// GL-style clip space to Vulkan: flip Y, map Z from [-1,1] to [0,1].
pub const VULKAN_CLIP: Mat4 = Mat4::from_cols_array(&[
    1.0, 0.0, 0.0, 0.0, //
    0.0, -1.0, 0.0, 0.0, //
    0.0, 0.0, 0.5, 0.0, //
    0.0, 0.0, 0.5, 1.0, //
]);

#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub fov_y_deg: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            fov_y_deg: 45.0,
            aspect: 1.0,
            near: 0.1,
            far: 100.0,
            eye: Vec3::new(-5.0, 3.0, -10.0),
            target: Vec3::ZERO,
            // Y points down in the cube's model space
            up: Vec3::new(0.0, -1.0, 0.0),
        }
    }
}

impl Camera {
    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh_gl(
            self.fov_y_deg.to_radians(),
            self.aspect,
            self.near,
            self.far,
        )
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }
}

/// `clip * projection * view * model`, ready to upload as the uniform.
pub fn model_view_projection(camera: &Camera, model: Mat4) -> Mat4 {
    VULKAN_CLIP * camera.projection() * camera.view() * model
}
