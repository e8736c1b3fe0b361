use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Vec3};

use crate::scene::{FrameSnapshot, Mesh};

/// Per-frame camera and lighting state, laid out for the WGSL `Globals` struct.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub(crate) struct GlobalUniform {
    pub view_proj: [[f32; 4]; 4],
    pub camera_position: [f32; 4],
    /// xyz: hemisphere sky direction.
    pub hemi_direction: [f32; 4],
    /// rgb: diffuse premultiplied by intensity.
    pub hemi_sky: [f32; 4],
    pub hemi_ground: [f32; 4],
    /// xyz: direction the sunlight travels.
    pub sun_direction: [f32; 4],
    pub sun_color: [f32; 4],
}

impl GlobalUniform {
    pub fn from_snapshot(frame: &FrameSnapshot<'_>) -> Self {
        let (hemi_direction, hemi_sky, hemi_ground) = match frame.ambient {
            Some(light) => (
                light.direction.normalize_or_zero(),
                light.diffuse * light.intensity,
                light.ground_color * light.intensity,
            ),
            None => (Vec3::Y, Vec3::ZERO, Vec3::ZERO),
        };
        let (sun_direction, sun_color) = match frame.sun {
            Some(light) => (
                light.direction.normalize_or_zero(),
                light.diffuse * light.intensity,
            ),
            None => (Vec3::NEG_Y, Vec3::ZERO),
        };
        Self {
            view_proj: frame.view_proj.to_cols_array_2d(),
            camera_position: frame.camera_position.extend(1.0).into(),
            hemi_direction: hemi_direction.extend(0.0).into(),
            hemi_sky: hemi_sky.extend(1.0).into(),
            hemi_ground: hemi_ground.extend(1.0).into(),
            sun_direction: sun_direction.extend(0.0).into(),
            sun_color: sun_color.extend(1.0).into(),
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub(crate) struct ObjectConstants {
    pub model: [[f32; 4]; 4],
    pub normal: [[f32; 4]; 3],
    pub color: [f32; 4],
    /// x: 1.0 when the mesh ignores lighting.
    pub flags: [f32; 4],
}

impl ObjectConstants {
    pub fn for_mesh(mesh: &Mesh, camera_position: Vec3) -> Self {
        let model = mesh.world_matrix(camera_position);
        let normal = Mat3::from_mat4(model).inverse().transpose();
        Self {
            model: model.to_cols_array_2d(),
            normal: mat3_to_3x4(normal),
            color: mesh.material.color.extend(mesh.material.alpha).into(),
            flags: [if mesh.material.unlit { 1.0 } else { 0.0 }, 0.0, 0.0, 0.0],
        }
    }
}

fn mat3_to_3x4(matrix: Mat3) -> [[f32; 4]; 3] {
    let cols = matrix.to_cols_array();
    [
        [cols[0], cols[1], cols[2], 0.0],
        [cols[3], cols[4], cols[5], 0.0],
        [cols[6], cols[7], cols[8], 0.0],
    ]
}

pub(crate) const SHADER: &str = r#"
struct Globals {
    view_proj: mat4x4<f32>,
    camera_position: vec4<f32>,
    hemi_direction: vec4<f32>,
    hemi_sky: vec4<f32>,
    hemi_ground: vec4<f32>,
    sun_direction: vec4<f32>,
    sun_color: vec4<f32>,
}

struct ObjectConstants {
    model: mat4x4<f32>,
    normal: mat3x4<f32>,
    color: vec4<f32>,
    flags: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> globals: Globals;

@group(1) @binding(0)
var<uniform> object: ObjectConstants;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) normal: vec3<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world_position = object.model * vec4<f32>(input.position, 1.0);
    out.position = globals.view_proj * world_position;
    let normal_matrix = mat3x3<f32>(
        object.normal[0].xyz,
        object.normal[1].xyz,
        object.normal[2].xyz
    );
    out.normal = normalize(normal_matrix * input.normal);
    return out;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    if (object.flags.x > 0.5) {
        return object.color;
    }
    let normal = normalize(input.normal);
    let hemi_weight = 0.5 + 0.5 * dot(normal, globals.hemi_direction.xyz);
    let hemi = mix(globals.hemi_ground.rgb, globals.hemi_sky.rgb, hemi_weight);
    let sun = globals.sun_color.rgb * max(dot(normal, -globals.sun_direction.xyz), 0.0);
    return vec4<f32>((hemi + sun) * object.color.rgb, object.color.a);
}
"#;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use glam::Vec4;

    use super::*;
    use crate::config::ViewerConfig;
    use crate::scene::{Geometry, Material, Scene};
    use crate::surface::Viewport;

    #[test]
    fn globals_premultiply_light_intensity() {
        let mut config = ViewerConfig::default();
        config.ambient.intensity = 2.0;
        let mut scene = Scene::new();
        scene.populate_default(&config, "renderCanvas");
        let frame = scene.snapshot(Viewport::new(800, 600), 1).unwrap();

        let globals = GlobalUniform::from_snapshot(&frame);
        assert_eq!(globals.hemi_sky, [0.5, 0.5, 0.5, 1.0]);
        assert_eq!(globals.sun_direction, [0.0, -1.0, 0.0, 0.0]);
        assert_eq!(globals.sun_color, [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(globals.camera_position, [0.0, 1.7, 0.0, 1.0]);
    }

    #[test]
    fn unlit_meshes_set_flag() {
        let mut scene = Scene::new();
        let id = scene.add_mesh(
            "sky",
            Arc::new(Geometry::cube()),
            Material {
                color: Vec3::new(0.1, 0.2, 0.3),
                alpha: 1.0,
                unlit: true,
            },
        );
        let constants = ObjectConstants::for_mesh(scene.mesh(id).unwrap(), Vec3::ZERO);
        assert_eq!(constants.flags[0], 1.0);
        assert_eq!(Vec4::from(constants.color), Vec4::new(0.1, 0.2, 0.3, 1.0));
    }

    #[test]
    fn uniform_sizes_are_16_byte_aligned() {
        assert_eq!(std::mem::size_of::<GlobalUniform>() % 16, 0);
        assert_eq!(std::mem::size_of::<ObjectConstants>() % 16, 0);
    }
}
