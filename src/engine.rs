//! Render engine bound to a single drawing surface.
//!
//! The engine owns the graphics backend, tracks the viewport it renders to
//! and keeps the list of render loops the host invokes once per display
//! refresh. It knows nothing about how frames are scheduled: native hosts
//! call [`Engine::render_frame`] from the winit event loop, browser hosts
//! from `requestAnimationFrame`.

use std::future::Future;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{RenderError, ViewerError};
use crate::scene::{FrameSnapshot, Scene};
use crate::surface::{DrawingSurface, SurfaceHost, Viewport};

/// Options fixed at engine construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    pub antialias: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self { antialias: true }
    }
}

/// Graphics context that turns scene snapshots into pixels.
pub trait RenderBackend {
    /// Recomputes back buffers for the new viewport.
    fn resize(&mut self, viewport: Viewport);

    fn draw(&mut self, frame: &FrameSnapshot<'_>) -> Result<(), RenderError>;
}

/// State handed to a render loop for one tick.
pub struct RenderTarget<'a, B> {
    pub backend: &'a mut B,
    pub viewport: Viewport,
    pub frame_index: u64,
}

pub type RenderLoop<B> =
    Box<dyn FnMut(&Scene, &mut RenderTarget<'_, B>) -> Result<(), RenderError>>;

pub struct Engine<S, B> {
    surface: S,
    backend: B,
    options: EngineOptions,
    viewport: Viewport,
    render_loops: Vec<RenderLoop<B>>,
    frame_index: u64,
}

impl<S, B> Engine<S, B>
where
    S: DrawingSurface,
    B: RenderBackend,
{
    /// Resolves `surface_id` on the host and builds the backend for it.
    ///
    /// The backend factory only runs once the surface exists; a missing
    /// surface fails before any graphics resource is allocated.
    pub async fn create<H, F, Fut>(
        host: &H,
        surface_id: &str,
        options: EngineOptions,
        factory: F,
    ) -> Result<Self, ViewerError>
    where
        H: SurfaceHost<Surface = S>,
        F: FnOnce(S, EngineOptions) -> Fut,
        Fut: Future<Output = Result<B, ViewerError>>,
    {
        let surface = host
            .find_surface(surface_id)
            .ok_or_else(|| ViewerError::SurfaceNotFound {
                id: surface_id.to_string(),
            })?;
        let viewport = Viewport::from_size(surface.pixel_size());
        let backend = factory(surface.clone(), options).await?;
        info!(
            "Engine bound to `{}` at {}x{} (antialias: {})",
            surface.id(),
            viewport.width,
            viewport.height,
            options.antialias
        );
        Ok(Self {
            surface,
            backend,
            options,
            viewport,
            render_loops: Vec::new(),
            frame_index: 0,
        })
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Matches the viewport and back buffers to the surface's current size.
    ///
    /// Zero-area sizes (minimized windows, hidden canvases) keep the previous
    /// viewport.
    pub fn resize(&mut self) -> Viewport {
        let viewport = Viewport::from_size(self.surface.pixel_size());
        if viewport.is_empty() {
            debug!("Ignoring resize to empty surface {viewport:?}");
            return self.viewport;
        }
        self.viewport = viewport;
        self.backend.resize(viewport);
        debug!("Viewport resized to {}x{}", viewport.width, viewport.height);
        viewport
    }

    pub fn run_render_loop<F>(&mut self, render_loop: F)
    where
        F: FnMut(&Scene, &mut RenderTarget<'_, B>) -> Result<(), RenderError> + 'static,
    {
        self.render_loops.push(Box::new(render_loop));
    }

    pub fn stop_render_loop(&mut self) {
        self.render_loops.clear();
    }

    pub fn render_loop_count(&self) -> usize {
        self.render_loops.len()
    }

    /// Number of ticks that invoked at least one render loop.
    pub fn frame_count(&self) -> u64 {
        self.frame_index
    }

    /// Runs every registered render loop once. Returns how many ran.
    pub fn render_frame(&mut self, scene: &Scene) -> Result<usize, RenderError> {
        if self.render_loops.is_empty() {
            return Ok(0);
        }
        self.frame_index += 1;
        let mut target = RenderTarget {
            backend: &mut self.backend,
            viewport: self.viewport,
            frame_index: self.frame_index,
        };
        for render_loop in self.render_loops.iter_mut() {
            render_loop(scene, &mut target)?;
        }
        Ok(self.render_loops.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ViewerConfig;
    use crate::surface::{StaticHost, StaticSurface};

    #[derive(Default)]
    struct CountingBackend {
        resizes: Vec<Viewport>,
        draws: usize,
    }

    impl RenderBackend for CountingBackend {
        fn resize(&mut self, viewport: Viewport) {
            self.resizes.push(viewport);
        }

        fn draw(&mut self, _frame: &FrameSnapshot<'_>) -> Result<(), RenderError> {
            self.draws += 1;
            Ok(())
        }
    }

    fn engine(surface: &StaticSurface) -> Engine<StaticSurface, CountingBackend> {
        let host = StaticHost::new().with_surface(surface.clone());
        pollster::block_on(Engine::create(
            &host,
            surface.id(),
            EngineOptions::default(),
            |_, _| async { Ok::<_, ViewerError>(CountingBackend::default()) },
        ))
        .unwrap()
    }

    #[test]
    fn missing_surface_skips_backend_factory() {
        let host = StaticHost::new();
        let mut factory_ran = false;
        let result: Result<Engine<StaticSurface, CountingBackend>, _> =
            pollster::block_on(Engine::create(
                &host,
                "renderCanvas",
                EngineOptions::default(),
                |_, _| {
                    factory_ran = true;
                    async { Ok::<_, ViewerError>(CountingBackend::default()) }
                },
            ));
        assert!(matches!(result, Err(ViewerError::SurfaceNotFound { .. })));
        assert!(!factory_ran);
    }

    #[test]
    fn viewport_starts_at_surface_size() {
        let surface = StaticSurface::new("renderCanvas", 640, 480);
        let engine = engine(&surface);
        assert_eq!(engine.viewport(), Viewport::new(640, 480));
        assert!(engine.options().antialias);
    }

    #[test]
    fn resize_ignores_empty_surface() {
        let surface = StaticSurface::new("renderCanvas", 640, 480);
        let mut engine = engine(&surface);
        surface.set_size(0, 480);
        assert_eq!(engine.resize(), Viewport::new(640, 480));
        assert!(engine.backend().resizes.is_empty());
    }

    #[test]
    fn loop_fails_without_active_camera() {
        let surface = StaticSurface::new("renderCanvas", 640, 480);
        let mut engine = engine(&surface);
        engine.run_render_loop(|scene, target| scene.render(target));
        assert!(matches!(
            engine.render_frame(&Scene::new()),
            Err(RenderError::Backend(_))
        ));
        assert_eq!(engine.backend().draws, 0);
    }

    #[test]
    fn render_frame_without_loops_draws_nothing() {
        let surface = StaticSurface::new("renderCanvas", 640, 480);
        let mut engine = engine(&surface);
        assert_eq!(engine.render_frame(&Scene::new()).unwrap(), 0);
        assert_eq!(engine.frame_count(), 0);
    }

    #[test]
    fn each_tick_runs_every_loop_once() {
        let surface = StaticSurface::new("renderCanvas", 640, 480);
        let mut engine = engine(&surface);
        engine.run_render_loop(|scene, target| scene.render(target));
        let mut scene = Scene::new();
        scene.populate_default(&ViewerConfig::default(), "renderCanvas");
        for _ in 0..3 {
            assert_eq!(engine.render_frame(&scene).unwrap(), 1);
        }
        assert_eq!(engine.backend().draws, 3);
        assert_eq!(engine.frame_count(), 3);

        engine.stop_render_loop();
        assert_eq!(engine.render_frame(&scene).unwrap(), 0);
        assert_eq!(engine.backend().draws, 3);
    }
}
