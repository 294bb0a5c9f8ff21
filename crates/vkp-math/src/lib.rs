// SPDX-License-Identifier: CEPL-1.0
mod cube;
mod transform;

pub use cube::{Vertex, CUBE_SOLID_FACE_COLORS};
pub use glam::{Mat4, Vec3};
pub use transform::{model_view_projection, Camera, VULKAN_CLIP};
