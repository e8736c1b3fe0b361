use std::sync::Arc;

use glam::{Mat4, Vec3, Vec4};
use log::debug;

use crate::camera::UniversalCamera;
use crate::config::ViewerConfig;
use crate::engine::{RenderBackend, RenderTarget};
use crate::error::RenderError;
use crate::surface::Viewport;

/// Handle to a mesh owned by a [`Scene`]. Only the scene hands these out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(u32);

impl MeshId {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Indexed triangle list with interleaved position and normal.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    /// `[px, py, pz, nx, ny, nz]` per vertex.
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
}

impl Geometry {
    pub const FLOATS_PER_VERTEX: usize = 6;

    /// Unit square in the XZ plane facing up, centred on the origin.
    pub fn ground_plane() -> Self {
        #[rustfmt::skip]
        let vertices = vec![
            -0.5, 0.0, -0.5, 0.0, 1.0, 0.0,
            -0.5, 0.0,  0.5, 0.0, 1.0, 0.0,
             0.5, 0.0,  0.5, 0.0, 1.0, 0.0,
             0.5, 0.0, -0.5, 0.0, 1.0, 0.0,
        ];
        Self {
            vertices,
            indices: vec![0, 1, 2, 0, 2, 3],
        }
    }

    /// Unit cube centred on the origin with outward normals.
    pub fn cube() -> Self {
        Self {
            vertices: UNIT_CUBE_VERTICES.to_vec(),
            indices: UNIT_CUBE_INDICES.to_vec(),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / Self::FLOATS_PER_VERTEX
    }

    pub fn positions(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.vertices
            .chunks_exact(Self::FLOATS_PER_VERTEX)
            .map(|v| Vec3::new(v[0], v[1], v[2]))
    }

    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        self.positions().fold(None, |acc, p| match acc {
            None => Some((p, p)),
            Some((min, max)) => Some((min.min(p), max.max(p))),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub color: Vec3,
    pub alpha: f32,
    /// Ignores scene lights and shows `color` as-is (backdrops).
    pub unlit: bool,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            alpha: 1.0,
            unlit: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    id: MeshId,
    pub name: String,
    pub geometry: Arc<Geometry>,
    pub position: Vec3,
    pub scaling: Vec3,
    pub material: Material,
    pub visible: bool,
    /// Keeps the mesh centred on the camera (skyboxes).
    pub infinite_distance: bool,
}

impl Mesh {
    pub fn id(&self) -> MeshId {
        self.id
    }

    pub fn world_matrix(&self, camera_position: Vec3) -> Mat4 {
        let translation = if self.infinite_distance {
            camera_position + self.position
        } else {
            self.position
        };
        Mat4::from_translation(translation) * Mat4::from_scale(self.scaling)
    }

    /// Axis-aligned bounds in world space, ignoring camera-relative placement.
    pub fn world_bounds(&self) -> Option<(Vec3, Vec3)> {
        let (min, max) = self.geometry.bounds()?;
        let a = self.position + min * self.scaling;
        let b = self.position + max * self.scaling;
        Some((a.min(b), a.max(b)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HemisphericLight {
    pub name: String,
    /// Points at the sky half of the hemisphere.
    pub direction: Vec3,
    pub intensity: f32,
    pub diffuse: Vec3,
    pub ground_color: Vec3,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DirectionalLight {
    pub name: String,
    /// Direction the light travels in.
    pub direction: Vec3,
    pub intensity: f32,
    pub diffuse: Vec3,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Light {
    Hemispheric(HemisphericLight),
    Directional(DirectionalLight),
}

impl Light {
    pub fn name(&self) -> &str {
        match self {
            Light::Hemispheric(light) => &light.name,
            Light::Directional(light) => &light.name,
        }
    }
}

/// Everything a backend needs to draw one frame.
#[derive(Debug, Clone)]
pub struct FrameSnapshot<'a> {
    pub frame_index: u64,
    pub viewport: Viewport,
    pub view_proj: Mat4,
    pub camera_position: Vec3,
    pub clear_color: Vec4,
    pub ambient: Option<&'a HemisphericLight>,
    pub sun: Option<&'a DirectionalLight>,
    pub meshes: &'a [Mesh],
}

/// In-memory graph of the camera, lights and meshes to render.
#[derive(Debug, Clone)]
pub struct Scene {
    camera: Option<UniversalCamera>,
    lights: Vec<Light>,
    meshes: Vec<Mesh>,
    next_mesh_id: u32,
    pub clear_color: Vec4,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self {
            camera: None,
            lights: Vec::new(),
            meshes: Vec::new(),
            next_mesh_id: 0,
            clear_color: Vec4::new(0.2, 0.2, 0.3, 1.0),
        }
    }

    /// Adds the stock camera and lights, in order: camera bound to
    /// `surface_id`, hemispheric fill, then the overhead sun.
    pub fn populate_default(&mut self, config: &ViewerConfig, surface_id: &str) {
        let mut camera = UniversalCamera::new("camera1", config.camera.position, &config.camera);
        camera.set_target(config.camera.target);
        camera.attach_control(surface_id);
        self.set_active_camera(camera);

        self.add_light(Light::Hemispheric(HemisphericLight {
            name: "ambient".into(),
            direction: config.ambient.direction,
            intensity: config.ambient.intensity,
            diffuse: config.ambient.diffuse,
            ground_color: config.ambient.ground_color,
        }));

        self.add_light(Light::Directional(DirectionalLight {
            name: "sunlight".into(),
            direction: config.sun.direction,
            intensity: config.sun.intensity,
            diffuse: config.sun.diffuse,
        }));
        debug!("Scene populated with camera and {} lights", self.lights.len());
    }

    pub fn set_active_camera(&mut self, camera: UniversalCamera) {
        self.camera = Some(camera);
    }

    pub fn active_camera(&self) -> Option<&UniversalCamera> {
        self.camera.as_ref()
    }

    pub fn active_camera_mut(&mut self) -> Option<&mut UniversalCamera> {
        self.camera.as_mut()
    }

    pub fn add_light(&mut self, light: Light) {
        self.lights.push(light);
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    pub fn light(&self, name: &str) -> Option<&Light> {
        self.lights.iter().find(|light| light.name() == name)
    }

    pub fn add_mesh(&mut self, name: &str, geometry: Arc<Geometry>, material: Material) -> MeshId {
        let id = MeshId(self.next_mesh_id);
        self.next_mesh_id += 1;
        self.meshes.push(Mesh {
            id,
            name: name.to_string(),
            geometry,
            position: Vec3::ZERO,
            scaling: Vec3::ONE,
            material,
            visible: true,
            infinite_distance: false,
        });
        id
    }

    pub fn mesh(&self, id: MeshId) -> Option<&Mesh> {
        self.meshes.iter().find(|mesh| mesh.id == id)
    }

    pub fn mesh_mut(&mut self, id: MeshId) -> Option<&mut Mesh> {
        self.meshes.iter_mut().find(|mesh| mesh.id == id)
    }

    pub fn mesh_by_name(&self, name: &str) -> Option<&Mesh> {
        self.meshes.iter().find(|mesh| mesh.name == name)
    }

    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    /// Number of cameras, lights and meshes in the scene.
    pub fn object_count(&self) -> usize {
        self.camera.iter().count() + self.lights.len() + self.meshes.len()
    }

    /// Union of the world bounds of visible, world-anchored meshes.
    pub fn world_extents(&self) -> Option<(Vec3, Vec3)> {
        self.meshes
            .iter()
            .filter(|mesh| mesh.visible && !mesh.infinite_distance)
            .filter_map(Mesh::world_bounds)
            .reduce(|(min_a, max_a), (min_b, max_b)| (min_a.min(min_b), max_a.max(max_b)))
    }

    pub fn snapshot(&self, viewport: Viewport, frame_index: u64) -> Option<FrameSnapshot<'_>> {
        let camera = self.camera.as_ref()?;
        let ambient = self.lights.iter().find_map(|light| match light {
            Light::Hemispheric(light) => Some(light),
            Light::Directional(_) => None,
        });
        let sun = self.lights.iter().find_map(|light| match light {
            Light::Directional(light) => Some(light),
            Light::Hemispheric(_) => None,
        });
        Some(FrameSnapshot {
            frame_index,
            viewport,
            view_proj: camera.view_projection(viewport.aspect()),
            camera_position: camera.position(),
            clear_color: self.clear_color,
            ambient,
            sun,
            meshes: &self.meshes,
        })
    }

    /// Issues one draw of the current state through the target's backend.
    pub fn render<B: RenderBackend>(
        &self,
        target: &mut RenderTarget<'_, B>,
    ) -> Result<(), RenderError> {
        let snapshot = self
            .snapshot(target.viewport, target.frame_index)
            .ok_or_else(|| RenderError::Backend("scene has no active camera".into()))?;
        target.backend.draw(&snapshot)
    }
}

const UNIT_CUBE_VERTICES: &[f32] = &[
    // positions        // normals
    -0.5, -0.5, 0.5, 0.0, 0.0, 1.0, 0.5, -0.5, 0.5, 0.0, 0.0, 1.0, 0.5, 0.5, 0.5, 0.0, 0.0, 1.0,
    -0.5, 0.5, 0.5, 0.0, 0.0, 1.0, -0.5, -0.5, -0.5, 0.0, 0.0, -1.0, 0.5, -0.5, -0.5, 0.0, 0.0,
    -1.0, 0.5, 0.5, -0.5, 0.0, 0.0, -1.0, -0.5, 0.5, -0.5, 0.0, 0.0, -1.0, -0.5, -0.5, -0.5, -1.0,
    0.0, 0.0, -0.5, -0.5, 0.5, -1.0, 0.0, 0.0, -0.5, 0.5, 0.5, -1.0, 0.0, 0.0, -0.5, 0.5, -0.5,
    -1.0, 0.0, 0.0, 0.5, -0.5, -0.5, 1.0, 0.0, 0.0, 0.5, -0.5, 0.5, 1.0, 0.0, 0.0, 0.5, 0.5, 0.5,
    1.0, 0.0, 0.0, 0.5, 0.5, -0.5, 1.0, 0.0, 0.0, -0.5, -0.5, -0.5, 0.0, -1.0, 0.0, 0.5, -0.5,
    -0.5, 0.0, -1.0, 0.0, 0.5, -0.5, 0.5, 0.0, -1.0, 0.0, -0.5, -0.5, 0.5, 0.0, -1.0, 0.0, -0.5,
    0.5, -0.5, 0.0, 1.0, 0.0, 0.5, 0.5, -0.5, 0.0, 1.0, 0.0, 0.5, 0.5, 0.5, 0.0, 1.0, 0.0, -0.5,
    0.5, 0.5, 0.0, 1.0, 0.0,
];

const UNIT_CUBE_INDICES: &[u32] = &[
    0, 1, 2, 0, 2, 3, // front
    4, 6, 5, 4, 7, 6, // back
    8, 9, 10, 8, 10, 11, // left
    12, 14, 13, 12, 15, 14, // right
    16, 18, 17, 16, 19, 18, // bottom
    20, 21, 22, 20, 22, 23, // top
];

#[cfg(test)]
mod tests {
    use super::*;

    fn populated() -> Scene {
        let mut scene = Scene::new();
        scene.populate_default(&ViewerConfig::default(), "renderCanvas");
        scene
    }

    #[test]
    fn default_population_uses_literal_values() {
        let scene = populated();
        let camera = scene.active_camera().unwrap();
        assert_eq!(camera.name, "camera1");
        assert_eq!(camera.position(), Vec3::new(0.0, 1.7, 0.0));
        assert_eq!(camera.target(), Vec3::new(0.0, 1.7, -1.0));
        assert_eq!(camera.attached_surface(), Some("renderCanvas"));

        let Some(Light::Hemispheric(ambient)) = scene.light("ambient") else {
            panic!("missing ambient light");
        };
        assert_eq!(ambient.intensity, 1.0);
        assert_eq!(ambient.diffuse, Vec3::new(0.25, 0.25, 0.25));
        assert_eq!(ambient.direction, Vec3::new(0.0, 1.0, 0.0));

        let Some(Light::Directional(sun)) = scene.light("sunlight") else {
            panic!("missing sunlight");
        };
        assert_eq!(sun.intensity, 1.0);
        assert_eq!(sun.direction, Vec3::new(0.0, -1.0, 0.0));
    }

    #[test]
    fn lights_are_added_in_order() {
        let scene = populated();
        let names: Vec<_> = scene.lights().iter().map(Light::name).collect();
        assert_eq!(names, ["ambient", "sunlight"]);
        assert_eq!(scene.object_count(), 3);
    }

    #[test]
    fn mesh_ids_are_unique() {
        let mut scene = Scene::new();
        let plane = Arc::new(Geometry::ground_plane());
        let a = scene.add_mesh("a", Arc::clone(&plane), Material::default());
        let b = scene.add_mesh("b", plane, Material::default());
        assert_ne!(a, b);
        assert_eq!(scene.mesh(b).unwrap().name, "b");
        assert_eq!(scene.mesh_by_name("a").unwrap().id(), a);
    }

    #[test]
    fn world_extents_skip_camera_anchored_meshes() {
        let mut scene = Scene::new();
        let ground = scene.add_mesh("ground", Arc::new(Geometry::ground_plane()), Material::default());
        scene.mesh_mut(ground).unwrap().scaling = Vec3::new(10.0, 1.0, 4.0);
        let sky = scene.add_mesh("sky", Arc::new(Geometry::cube()), Material::default());
        let sky = scene.mesh_mut(sky).unwrap();
        sky.scaling = Vec3::splat(500.0);
        sky.infinite_distance = true;

        let (min, max) = scene.world_extents().unwrap();
        assert_eq!(min, Vec3::new(-5.0, 0.0, -2.0));
        assert_eq!(max, Vec3::new(5.0, 0.0, 2.0));
    }

    #[test]
    fn skybox_follows_camera() {
        let mut scene = Scene::new();
        let id = scene.add_mesh("sky", Arc::new(Geometry::cube()), Material::default());
        scene.mesh_mut(id).unwrap().infinite_distance = true;
        let model = scene.mesh(id).unwrap().world_matrix(Vec3::new(3.0, 1.7, -2.0));
        assert_eq!(model.w_axis.truncate(), Vec3::new(3.0, 1.7, -2.0));
    }

    #[test]
    fn snapshot_requires_camera() {
        let scene = Scene::new();
        assert!(scene.snapshot(Viewport::new(10, 10), 1).is_none());

        let scene = populated();
        let snapshot = scene.snapshot(Viewport::new(10, 10), 1).unwrap();
        assert_eq!(snapshot.ambient.unwrap().name, "ambient");
        assert_eq!(snapshot.sun.unwrap().name, "sunlight");
        assert!(snapshot.meshes.is_empty());
    }

    #[test]
    fn cube_geometry_is_consistent() {
        let cube = Geometry::cube();
        assert_eq!(cube.vertex_count(), 24);
        assert!(cube.indices.iter().all(|&i| (i as usize) < cube.vertex_count()));
        assert_eq!(
            cube.bounds(),
            Some((Vec3::splat(-0.5), Vec3::splat(0.5)))
        );
    }
}
