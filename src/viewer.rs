//! The viewer context: one engine, one scene, and the bootstrap that joins
//! them to the environment and the immersive session.

use std::future::Future;
use std::sync::Arc;

use log::{info, warn};

use crate::config::ViewerConfig;
use crate::engine::{Engine, EngineOptions, RenderBackend};
use crate::environment::{Environment, EnvironmentLoader};
use crate::error::ViewerError;
use crate::input::InputState;
use crate::scene::Scene;
use crate::surface::{DrawingSurface, SurfaceHost, Viewport};
use crate::xr::{XrExperience, XrRuntime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerState {
    /// Engine and scene exist; nothing has been populated yet.
    Created,
    Starting,
    Running,
    Failed,
    Disposed,
}

/// Result of one host refresh tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// No render loop is registered.
    Idle,
    /// The given number of render loops ran.
    Rendered(usize),
    /// The backend asked to retry on the next refresh.
    Skipped,
}

pub struct Viewer<S, B> {
    config: ViewerConfig,
    engine: Engine<S, B>,
    scene: Scene,
    input: Arc<InputState>,
    environment: Option<Environment>,
    xr: Option<XrExperience>,
    state: ViewerState,
    resize_attached: bool,
}

impl<S, B> Viewer<S, B>
where
    S: DrawingSurface + 'static,
    B: RenderBackend + 'static,
{
    /// Binds an engine to the configured surface and creates the empty scene.
    pub async fn create<H, F, Fut>(
        host: &H,
        config: ViewerConfig,
        backend_factory: F,
    ) -> Result<Self, ViewerError>
    where
        H: SurfaceHost<Surface = S>,
        F: FnOnce(S, EngineOptions) -> Fut,
        Fut: Future<Output = Result<B, ViewerError>>,
    {
        config.validate()?;
        let engine =
            Engine::create(host, &config.canvas_id, config.engine, backend_factory).await?;
        Ok(Self {
            config,
            engine,
            scene: Scene::new(),
            input: Arc::new(InputState::new()),
            environment: None,
            xr: None,
            state: ViewerState::Created,
            resize_attached: false,
        })
    }

    /// Builds the scene, waits for the environment and the XR support check,
    /// then registers the render loop and starts honouring resize events.
    /// The immersive session itself is entered later with [`enter_xr`](Self::enter_xr).
    ///
    /// On failure nothing is registered and the viewer stays [`ViewerState::Failed`].
    pub async fn start<L, R>(&mut self, loader: &L, runtime: &R) -> Result<(), ViewerError>
    where
        L: EnvironmentLoader,
        R: XrRuntime,
    {
        if self.state != ViewerState::Created {
            return Err(ViewerError::AlreadyStarted);
        }
        self.state = ViewerState::Starting;
        if let Err(err) = self.create_scene(loader, runtime).await {
            self.state = ViewerState::Failed;
            return Err(err);
        }

        self.engine
            .run_render_loop(|scene, target| scene.render(target));
        self.resize_attached = true;
        self.state = ViewerState::Running;
        info!("Viewer running");
        Ok(())
    }

    async fn create_scene<L, R>(&mut self, loader: &L, runtime: &R) -> Result<(), ViewerError>
    where
        L: EnvironmentLoader,
        R: XrRuntime,
    {
        let surface_id = self.engine.surface().id().to_string();
        self.scene.populate_default(&self.config, &surface_id);

        let environment = loader
            .create_default_environment(&mut self.scene, &self.config.environment)
            .await?;

        let xr = match XrExperience::create(runtime, &environment, &self.config.xr).await {
            Ok(xr) => Some(xr),
            Err(err @ ViewerError::XrUnsupported { .. }) if self.config.xr.flat_fallback => {
                warn!("{err}; continuing without an immersive session");
                None
            }
            Err(err) => return Err(err),
        };

        self.environment = Some(environment);
        self.xr = xr;
        Ok(())
    }

    /// One display refresh: applies camera controls, then runs the render loop.
    pub fn frame(&mut self, dt: f32) -> Result<FrameOutcome, ViewerError> {
        if self.state != ViewerState::Running {
            return Ok(FrameOutcome::Idle);
        }
        if let Some(camera) = self.scene.active_camera_mut() {
            camera.update(&self.input, dt);
        }
        match self.engine.render_frame(&self.scene) {
            Ok(0) => Ok(FrameOutcome::Idle),
            Ok(count) => Ok(FrameOutcome::Rendered(count)),
            Err(err) if err.is_transient() => {
                warn!("{err}; retrying next frame");
                Ok(FrameOutcome::Skipped)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Host resize event. Ignored until the viewer is running.
    pub fn handle_resize(&mut self) -> Option<Viewport> {
        if !self.resize_attached {
            return None;
        }
        Some(self.engine.resize())
    }

    /// Requests the immersive session. Browsers only grant it from inside a
    /// user gesture handler.
    pub async fn enter_xr<R: XrRuntime>(&mut self, runtime: &R) -> Result<(), ViewerError> {
        if self.state != ViewerState::Running {
            return Err(ViewerError::NotStarted);
        }
        let Some(xr) = self.xr.as_mut() else {
            return Err(ViewerError::XrUnsupported {
                mode: self.config.xr.session_mode,
            });
        };
        xr.enter(runtime).await
    }

    /// Stops rendering and leaves any running immersive session.
    pub async fn dispose<R: XrRuntime>(&mut self, runtime: &R) -> Result<(), ViewerError> {
        self.engine.stop_render_loop();
        self.resize_attached = false;
        self.state = ViewerState::Disposed;
        if let Some(camera) = self.scene.active_camera_mut() {
            camera.detach_control();
        }
        if let Some(xr) = self.xr.as_mut() {
            xr.exit(runtime).await?;
        }
        Ok(())
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn engine(&self) -> &Engine<S, B> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine<S, B> {
        &mut self.engine
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Shared input snapshot the host's event callbacks write into.
    pub fn input(&self) -> Arc<InputState> {
        Arc::clone(&self.input)
    }

    pub fn environment(&self) -> Option<&Environment> {
        self.environment.as_ref()
    }

    pub fn xr(&self) -> Option<&XrExperience> {
        self.xr.as_ref()
    }

    pub fn xr_mut(&mut self) -> Option<&mut XrExperience> {
        self.xr.as_mut()
    }

    pub fn state(&self) -> ViewerState {
        self.state
    }
}
