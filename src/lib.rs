//! Bootstrap for an immersive 3D viewer.
//!
//! A [`Viewer`] binds an [`Engine`] to a drawing surface, fills a [`Scene`]
//! with a camera and two lights, waits for the default [`Environment`] and
//! then for an immersive session before the render loop starts. Platform
//! pieces (surfaces, GPU backend, environment loader, XR runtime) sit behind
//! traits so the bootstrap can run headless.

#[cfg(not(target_arch = "wasm32"))]
pub mod app;
pub mod camera;
pub mod config;
pub mod engine;
pub mod environment;
pub mod error;
pub mod input;
pub mod render;
pub mod scene;
pub mod surface;
pub mod viewer;
#[cfg(target_arch = "wasm32")]
pub mod web;
pub mod xr;

pub use camera::UniversalCamera;
pub use config::{ViewerConfig, DEFAULT_CANVAS_ID};
pub use engine::{Engine, EngineOptions, RenderBackend, RenderTarget};
pub use environment::{Environment, EnvironmentLoader, EnvironmentOptions, ProceduralEnvironment};
pub use error::{RenderError, ViewerError};
pub use input::{InputState, KeyCode, MouseButton, NamedKey};
pub use render::GpuRenderer;
pub use scene::{FrameSnapshot, Light, Mesh, MeshId, Scene};
pub use surface::{DrawingSurface, StaticHost, StaticSurface, SurfaceHost, Viewport};
pub use viewer::{FrameOutcome, Viewer, ViewerState};
pub use xr::{UnsupportedXr, XrExperience, XrOptions, XrRuntime, XrSessionMode, XrState};
