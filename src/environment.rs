//! Default placeholder world: a ground plane and a skybox.

use std::sync::Arc;

use glam::Vec3;
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::ViewerError;
use crate::scene::{Geometry, Material, MeshId, Scene};

pub const GROUND_MESH_NAME: &str = "BackgroundPlane";
pub const SKYBOX_MESH_NAME: &str = "BackgroundSkybox";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentOptions {
    pub create_ground: bool,
    /// Edge length of the square ground.
    pub ground_size: f32,
    pub ground_color: Vec3,
    /// Lowers the ground slightly below the root to avoid z-fighting with content.
    pub ground_y_bias: f32,
    pub create_skybox: bool,
    pub skybox_size: f32,
    pub skybox_color: Vec3,
    /// Grow ground and skybox to cover meshes already in the scene.
    pub size_auto: bool,
    pub root_position: Vec3,
}

impl Default for EnvironmentOptions {
    fn default() -> Self {
        Self {
            create_ground: true,
            ground_size: 15.0,
            ground_color: Vec3::new(0.5, 0.5, 0.55),
            ground_y_bias: 0.00001,
            create_skybox: true,
            skybox_size: 20.0,
            skybox_color: Vec3::new(0.2, 0.2, 0.3),
            size_auto: true,
            root_position: Vec3::ZERO,
        }
    }
}

/// Resolved environment. Holding one guarantees the ground mesh exists.
#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
    ground: MeshId,
    skybox: Option<MeshId>,
    ground_size: f32,
    skybox_size: f32,
    root_position: Vec3,
}

impl Environment {
    pub fn new(ground: MeshId, skybox: Option<MeshId>, ground_size: f32, skybox_size: f32) -> Self {
        Self {
            ground,
            skybox,
            ground_size,
            skybox_size,
            root_position: Vec3::ZERO,
        }
    }

    pub fn with_root_position(mut self, root_position: Vec3) -> Self {
        self.root_position = root_position;
        self
    }

    pub fn ground(&self) -> MeshId {
        self.ground
    }

    pub fn skybox(&self) -> Option<MeshId> {
        self.skybox
    }

    pub fn ground_size(&self) -> f32 {
        self.ground_size
    }

    pub fn skybox_size(&self) -> f32 {
        self.skybox_size
    }

    pub fn root_position(&self) -> Vec3 {
        self.root_position
    }
}

/// Builds the default environment inside a scene.
///
/// Implementations may suspend while geometry or materials load; the
/// returned environment is only observed once every part is ready.
#[allow(async_fn_in_trait)]
pub trait EnvironmentLoader {
    async fn create_default_environment(
        &self,
        scene: &mut Scene,
        options: &EnvironmentOptions,
    ) -> Result<Environment, ViewerError>;
}

/// Generates the environment from built-in geometry.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProceduralEnvironment;

impl EnvironmentLoader for ProceduralEnvironment {
    async fn create_default_environment(
        &self,
        scene: &mut Scene,
        options: &EnvironmentOptions,
    ) -> Result<Environment, ViewerError> {
        if !options.create_ground {
            return Err(ViewerError::Environment(
                "ground creation is disabled; the environment needs a floor".into(),
            ));
        }
        let layout = EnvironmentLayout::compute(scene, options);

        let ground = scene.add_mesh(
            GROUND_MESH_NAME,
            Arc::new(Geometry::ground_plane()),
            Material {
                color: options.ground_color,
                ..Material::default()
            },
        );
        if let Some(mesh) = scene.mesh_mut(ground) {
            mesh.position = layout.root - Vec3::Y * options.ground_y_bias;
            mesh.scaling = Vec3::new(layout.ground_size, 1.0, layout.ground_size);
        }

        let skybox = options.create_skybox.then(|| {
            let id = scene.add_mesh(
                SKYBOX_MESH_NAME,
                Arc::new(Geometry::cube()),
                Material {
                    color: options.skybox_color,
                    alpha: 1.0,
                    unlit: true,
                },
            );
            if let Some(mesh) = scene.mesh_mut(id) {
                mesh.position = layout.root;
                mesh.scaling = Vec3::splat(layout.skybox_size);
            }
            id
        });

        info!(
            "Created default environment (ground {:.1}, skybox {:.1})",
            layout.ground_size,
            if skybox.is_some() { layout.skybox_size } else { 0.0 }
        );
        Ok(
            Environment::new(ground, skybox, layout.ground_size, layout.skybox_size)
                .with_root_position(layout.root),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct EnvironmentLayout {
    ground_size: f32,
    skybox_size: f32,
    root: Vec3,
}

impl EnvironmentLayout {
    fn compute(scene: &Scene, options: &EnvironmentOptions) -> Self {
        let fixed = Self {
            ground_size: options.ground_size,
            skybox_size: options.skybox_size,
            root: options.root_position,
        };
        if !options.size_auto {
            return fixed;
        }
        let Some((min, max)) = scene.world_extents() else {
            return fixed;
        };
        let extent = max - min;
        let centre = (min + max) * 0.5;
        let ground_size = options.ground_size.max(extent.x.max(extent.z));
        let skybox_size = options.skybox_size.max(ground_size).max(extent.length());
        Self {
            ground_size,
            skybox_size,
            root: Vec3::new(centre.x, min.y, centre.z),
        }
    }
}
