// SPDX-License-Identifier: CEPL-1.0
use bytemuck::{Pod, Zeroable};

/// One vertex record as the pipeline consumes it: two vec4 attributes.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 4],
    pub color: [f32; 4],
}

const fn v(x: f32, y: f32, z: f32, rgb: [f32; 3]) -> Vertex {
    Vertex {
        pos: [x, y, z, 1.0],
        color: [rgb[0], rgb[1], rgb[2], 1.0],
    }
}

const RED: [f32; 3] = [1.0, 0.0, 0.0];
const GREEN: [f32; 3] = [0.0, 1.0, 0.0];
const BLUE: [f32; 3] = [0.0, 0.0, 1.0];
const YELLOW: [f32; 3] = [1.0, 1.0, 0.0];
const MAGENTA: [f32; 3] = [1.0, 0.0, 1.0];
const CYAN: [f32; 3] = [0.0, 1.0, 1.0];

/// Unit cube (half-extent 1), two triangles per face, clockwise winding.
pub const CUBE_SOLID_FACE_COLORS: [Vertex; 36] = [
    v(-1.0, -1.0, 1.0, RED),
    v(-1.0, 1.0, 1.0, RED),
    v(1.0, -1.0, 1.0, RED),
    v(1.0, -1.0, 1.0, RED),
    v(-1.0, 1.0, 1.0, RED),
    v(1.0, 1.0, 1.0, RED),
    //
    v(-1.0, -1.0, -1.0, GREEN),
    v(1.0, -1.0, -1.0, GREEN),
    v(-1.0, 1.0, -1.0, GREEN),
    v(-1.0, 1.0, -1.0, GREEN),
    v(1.0, -1.0, -1.0, GREEN),
    v(1.0, 1.0, -1.0, GREEN),
    //
    v(-1.0, 1.0, 1.0, BLUE),
    v(-1.0, -1.0, 1.0, BLUE),
    v(-1.0, 1.0, -1.0, BLUE),
    v(-1.0, 1.0, -1.0, BLUE),
    v(-1.0, -1.0, 1.0, BLUE),
    v(-1.0, -1.0, -1.0, BLUE),
    //
    v(1.0, 1.0, 1.0, YELLOW),
    v(1.0, 1.0, -1.0, YELLOW),
    v(1.0, -1.0, 1.0, YELLOW),
    v(1.0, -1.0, 1.0, YELLOW),
    v(1.0, 1.0, -1.0, YELLOW),
    v(1.0, -1.0, -1.0, YELLOW),
    //
    v(1.0, 1.0, 1.0, MAGENTA),
    v(-1.0, 1.0, 1.0, MAGENTA),
    v(1.0, 1.0, -1.0, MAGENTA),
    v(1.0, 1.0, -1.0, MAGENTA),
    v(-1.0, 1.0, 1.0, MAGENTA),
    v(-1.0, 1.0, -1.0, MAGENTA),
    //
    v(1.0, -1.0, 1.0, CYAN),
    v(1.0, -1.0, -1.0, CYAN),
    v(-1.0, -1.0, 1.0, CYAN),
    v(-1.0, -1.0, 1.0, CYAN),
    v(1.0, -1.0, -1.0, CYAN),
    v(-1.0, -1.0, -1.0, CYAN),
];
