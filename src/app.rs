//! Native host: a winit window standing in for the page canvas.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use glam::Vec2;
use log::{debug, error, info};
use pollster::block_on;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, MouseButton as WinitMouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode as WinitKey, PhysicalKey};
use winit::window::{Window, WindowId};

use crate::config::ViewerConfig;
use crate::engine::EngineOptions;
use crate::environment::ProceduralEnvironment;
use crate::error::ViewerError;
use crate::input::{KeyCode, MouseButton, NamedKey};
use crate::render::GpuRenderer;
use crate::surface::{DrawingSurface, SurfaceHost, Viewport};
use crate::viewer::{FrameOutcome, Viewer};
use crate::xr::UnsupportedXr;

/// A window registered under the configured surface id.
#[derive(Debug, Clone)]
pub struct WindowSurface {
    id: Arc<str>,
    window: Arc<Window>,
}

impl WindowSurface {
    pub fn window(&self) -> Arc<Window> {
        Arc::clone(&self.window)
    }
}

impl DrawingSurface for WindowSurface {
    fn id(&self) -> &str {
        &self.id
    }

    fn pixel_size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }
}

/// Host owning exactly one window.
pub struct WindowHost {
    surface: WindowSurface,
}

impl WindowHost {
    pub fn new(id: &str, window: Arc<Window>) -> Self {
        Self {
            surface: WindowSurface {
                id: Arc::from(id),
                window,
            },
        }
    }
}

impl SurfaceHost for WindowHost {
    type Surface = WindowSurface;

    fn find_surface(&self, id: &str) -> Option<WindowSurface> {
        (self.surface.id() == id).then(|| self.surface.clone())
    }
}

type NativeViewer = Viewer<WindowSurface, GpuRenderer>;

/// Opens a window and runs the viewer until it is closed or fails.
pub fn run(config: ViewerConfig) -> Result<()> {
    let event_loop = EventLoop::new().context("failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);
    let mut app = ViewerApp::new(config);
    event_loop
        .run_app(&mut app)
        .context("event loop terminated unexpectedly")?;
    match app.last_error.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

struct ViewerApp {
    config: ViewerConfig,
    window: Option<Arc<Window>>,
    viewer: Option<NativeViewer>,
    last_frame: Option<Instant>,
    last_error: Option<anyhow::Error>,
}

impl ViewerApp {
    fn new(config: ViewerConfig) -> Self {
        Self {
            config,
            window: None,
            viewer: None,
            last_frame: None,
            last_error: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{err:#}");
        self.last_error = Some(err);
        event_loop.exit();
    }

    fn launch(&mut self, window: Arc<Window>) -> Result<NativeViewer> {
        let host = WindowHost::new(&self.config.canvas_id, window);
        let mut viewer = block_on(Viewer::create(
            &host,
            self.config.clone(),
            create_backend,
        ))?;
        block_on(viewer.start(&ProceduralEnvironment, &UnsupportedXr))
            .context("viewer bootstrap failed")?;
        Ok(viewer)
    }

    fn redraw(&mut self) -> Result<()> {
        let Some(viewer) = self.viewer.as_mut() else {
            return Ok(());
        };
        let now = Instant::now();
        let dt = self
            .last_frame
            .replace(now)
            .map_or(0.0, |last| now.duration_since(last).as_secs_f32());
        if viewer.frame(dt)? == FrameOutcome::Skipped {
            debug!("Frame skipped");
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Some(mut viewer) = self.viewer.take() {
            if let Err(err) = block_on(viewer.dispose(&UnsupportedXr)) {
                error!("Error disposing viewer: {err}");
            }
        }
    }
}

async fn create_backend(
    surface: WindowSurface,
    options: EngineOptions,
) -> Result<GpuRenderer, ViewerError> {
    let viewport = Viewport::from_size(surface.pixel_size());
    GpuRenderer::new(surface.window(), viewport, options)
        .await
        .map_err(|err| ViewerError::Backend(format!("{err:#}")))
}

impl ApplicationHandler for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attributes = Window::default_attributes()
            .with_title("XR Viewer")
            .with_inner_size(LogicalSize::new(1280.0, 720.0));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                self.fail(event_loop, anyhow!("failed to create window: {err}"));
                return;
            }
        };
        self.window = Some(Arc::clone(&window));
        match self.launch(window) {
            Ok(viewer) => {
                info!("Viewer attached to `{}`", self.config.canvas_id);
                self.viewer = Some(viewer);
            }
            Err(err) => self.fail(event_loop, err),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                self.shutdown();
                event_loop.exit();
            }
            WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(viewport) = self.viewer.as_mut().and_then(Viewer::handle_resize) {
                    debug!("Resized to {}x{}", viewport.width, viewport.height);
                }
            }
            WindowEvent::Focused(false) => {
                if let Some(viewer) = self.viewer.as_ref() {
                    viewer.input().clear();
                }
            }
            WindowEvent::KeyboardInput { event, .. } => self.handle_keyboard(&event),
            WindowEvent::MouseInput { state, button, .. } => {
                self.handle_mouse_button(state, button)
            }
            WindowEvent::CursorMoved { position, .. } => {
                if let Some(viewer) = self.viewer.as_ref() {
                    viewer
                        .input()
                        .set_mouse_position(Vec2::new(position.x as f32, position.y as f32));
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(err) = self.redraw() {
                    self.fail(event_loop, err);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}

impl ViewerApp {
    fn handle_keyboard(&self, event: &KeyEvent) {
        let Some(viewer) = self.viewer.as_ref() else {
            return;
        };
        let Some(keycode) = map_keycode(&event.physical_key) else {
            return;
        };
        if event.repeat {
            return;
        }
        let input = viewer.input();
        match event.state {
            ElementState::Pressed => input.set_key_down(keycode),
            ElementState::Released => input.set_key_up(keycode),
        }
    }

    fn handle_mouse_button(&self, state: ElementState, button: WinitMouseButton) {
        let Some(viewer) = self.viewer.as_ref() else {
            return;
        };
        let button = map_mouse_button(button);
        let input = viewer.input();
        match state {
            ElementState::Pressed => input.set_mouse_button_down(button),
            ElementState::Released => input.set_mouse_button_up(button),
        }
    }
}

pub(crate) fn map_keycode(key: &PhysicalKey) -> Option<KeyCode> {
    let PhysicalKey::Code(code) = key else {
        return None;
    };
    Some(match code {
        WinitKey::Space => KeyCode::Named(NamedKey::Space),
        WinitKey::Enter => KeyCode::Named(NamedKey::Enter),
        WinitKey::ArrowLeft => KeyCode::Named(NamedKey::Left),
        WinitKey::ArrowRight => KeyCode::Named(NamedKey::Right),
        WinitKey::ArrowUp => KeyCode::Named(NamedKey::Up),
        WinitKey::ArrowDown => KeyCode::Named(NamedKey::Down),
        WinitKey::Escape => KeyCode::Named(NamedKey::Escape),
        WinitKey::ShiftLeft => KeyCode::Named(NamedKey::LeftShift),
        WinitKey::Digit0 => KeyCode::Digit(0),
        WinitKey::Digit1 => KeyCode::Digit(1),
        WinitKey::Digit2 => KeyCode::Digit(2),
        WinitKey::Digit3 => KeyCode::Digit(3),
        WinitKey::Digit4 => KeyCode::Digit(4),
        WinitKey::Digit5 => KeyCode::Digit(5),
        WinitKey::Digit6 => KeyCode::Digit(6),
        WinitKey::Digit7 => KeyCode::Digit(7),
        WinitKey::Digit8 => KeyCode::Digit(8),
        WinitKey::Digit9 => KeyCode::Digit(9),
        WinitKey::KeyA => KeyCode::Character('A'),
        WinitKey::KeyD => KeyCode::Character('D'),
        WinitKey::KeyE => KeyCode::Character('E'),
        WinitKey::KeyQ => KeyCode::Character('Q'),
        WinitKey::KeyS => KeyCode::Character('S'),
        WinitKey::KeyW => KeyCode::Character('W'),
        _ => return None,
    })
}

pub(crate) fn map_mouse_button(button: WinitMouseButton) -> MouseButton {
    let index = match button {
        WinitMouseButton::Left => 0,
        WinitMouseButton::Middle => 1,
        WinitMouseButton::Right => 2,
        WinitMouseButton::Back => 3,
        WinitMouseButton::Forward => 4,
        WinitMouseButton::Other(value) => value.min(u8::MAX as u16) as u8,
    };
    MouseButton::new(index)
}
