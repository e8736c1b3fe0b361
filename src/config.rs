use std::fs;
use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::engine::EngineOptions;
use crate::environment::EnvironmentOptions;
use crate::error::ViewerError;
use crate::xr::XrOptions;

/// Identifier of the drawing surface the viewer binds to unless configured otherwise.
pub const DEFAULT_CANVAS_ID: &str = "renderCanvas";

/// Complete viewer configuration. Every field has a literal default so an
/// empty JSON object yields the stock scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub canvas_id: String,
    pub engine: EngineOptions,
    pub camera: CameraConfig,
    pub ambient: HemisphericLightConfig,
    pub sun: DirectionalLightConfig,
    pub environment: EnvironmentOptions,
    pub xr: XrOptions,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            canvas_id: DEFAULT_CANVAS_ID.to_string(),
            engine: EngineOptions::default(),
            camera: CameraConfig::default(),
            ambient: HemisphericLightConfig::default(),
            sun: DirectionalLightConfig::default(),
            environment: EnvironmentOptions::default(),
            xr: XrOptions::default(),
        }
    }
}

impl ViewerConfig {
    /// Parses a configuration document; missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ViewerError> {
        let config: Self =
            serde_json::from_str(json).map_err(|err| ViewerError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ViewerError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|err| ViewerError::Config(format!("{}: {err}", path.display())))?;
        Self::from_json_str(&json)
    }

    pub fn to_json_pretty(&self) -> Result<String, ViewerError> {
        serde_json::to_string_pretty(self).map_err(|err| ViewerError::Config(err.to_string()))
    }

    pub fn validate(&self) -> Result<(), ViewerError> {
        if self.canvas_id.trim().is_empty() {
            return Err(ViewerError::Config("canvas_id must not be empty".into()));
        }
        if self.camera.position == self.camera.target {
            return Err(ViewerError::Config(
                "camera target must differ from camera position".into(),
            ));
        }
        if self.camera.min_z <= 0.0 || self.camera.max_z <= self.camera.min_z {
            return Err(ViewerError::Config(
                "camera clip planes must satisfy 0 < min_z < max_z".into(),
            ));
        }
        if self.sun.direction.length_squared() <= f32::EPSILON {
            return Err(ViewerError::Config("sun direction must be non-zero".into()));
        }
        Ok(())
    }
}

/// Initial placement and control tuning of the first-person camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub position: Vec3,
    pub target: Vec3,
    /// Units per second while a movement key is held.
    pub speed: f32,
    /// Pointer pixels per radian of rotation; larger is slower.
    pub angular_sensibility: f32,
    /// Vertical field of view in radians.
    pub fov: f32,
    pub min_z: f32,
    pub max_z: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 1.7, 0.0),
            target: Vec3::new(0.0, 1.7, -1.0),
            speed: 2.0,
            angular_sensibility: 2000.0,
            fov: 0.8,
            min_z: 0.1,
            max_z: 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HemisphericLightConfig {
    /// Direction pointing towards the "sky" half of the hemisphere.
    pub direction: Vec3,
    pub intensity: f32,
    pub diffuse: Vec3,
    pub ground_color: Vec3,
}

impl Default for HemisphericLightConfig {
    fn default() -> Self {
        Self {
            direction: Vec3::Y,
            intensity: 1.0,
            diffuse: Vec3::splat(0.25),
            ground_color: Vec3::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectionalLightConfig {
    pub direction: Vec3,
    pub intensity: f32,
    pub diffuse: Vec3,
}

impl Default for DirectionalLightConfig {
    fn default() -> Self {
        Self {
            direction: Vec3::NEG_Y,
            intensity: 1.0,
            diffuse: Vec3::ONE,
        }
    }
}
