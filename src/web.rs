#![cfg(target_arch = "wasm32")]

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use glam::Vec2;
use js_sys::{Array, Function, Object, Promise, Reflect};
use log::{debug, error, info, warn};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    Document, Event, EventTarget, HtmlCanvasElement, HtmlElement, KeyboardEvent, MouseEvent,
    PointerEvent,
};

use crate::config::ViewerConfig;
use crate::engine::EngineOptions;
use crate::environment::ProceduralEnvironment;
use crate::error::ViewerError;
use crate::input::{is_text_entry_element, InputState, KeyCode, MouseButton};
use crate::render::GpuRenderer;
use crate::surface::{DrawingSurface, SurfaceHost, Viewport};
use crate::viewer::Viewer;
use crate::xr::{
    Handedness, ReferenceSpaceType, XrInputSource, XrRuntime, XrSessionInfo, XrSessionMode,
    XrSessionRequest,
};

#[wasm_bindgen(start)]
pub fn init_logging() {
    console_error_panic_hook::set_once();
    // A second init (hot reload) is harmless.
    let _ = console_log::init_with_level(log::Level::Info);
}

/// Binds the viewer to the canvas with id `canvas_id` and starts rendering
/// once the environment is ready. Clicking the canvas enters the immersive
/// session when the browser supports it.
#[wasm_bindgen]
pub async fn start_viewer(canvas_id: String) -> Result<(), JsValue> {
    start(canvas_id).await.map_err(|err| {
        error!("{err}");
        JsValue::from_str(&err.to_string())
    })
}

async fn start(canvas_id: String) -> Result<(), ViewerError> {
    let window = web_sys::window().ok_or_else(|| ViewerError::Backend("no window".into()))?;
    let document = window
        .document()
        .ok_or_else(|| ViewerError::Backend("no document".into()))?;
    let host = DocumentHost { document };
    if let Some(surface) = host.find_surface(&canvas_id) {
        surface.sync_size(window.device_pixel_ratio());
    }

    let config = ViewerConfig {
        canvas_id,
        ..ViewerConfig::default()
    };
    let mut viewer = Viewer::create(&host, config, create_backend).await?;
    let runtime = Rc::new(WebXrRuntime::new(&window.navigator()));
    viewer.start(&ProceduralEnvironment, runtime.as_ref()).await?;

    let canvas = viewer.engine().surface().canvas.clone();
    // Touch drags turn the camera instead of scrolling the page.
    canvas
        .style()
        .set_property("touch-action", "none")
        .map_err(js_error)?;
    let app = Rc::new(RefCell::new(WebApp {
        viewer,
        last_timestamp: None,
        _listeners: Vec::new(),
        _session_listeners: Vec::new(),
    }));
    let listeners =
        attach_listeners(&host.document, &canvas, &app, &runtime).map_err(js_error)?;
    app.borrow_mut()._listeners = listeners;
    schedule_animation_loop(app).map_err(js_error)?;
    info!("Viewer running in `{}`", canvas.id());
    Ok(())
}

async fn create_backend(
    surface: CanvasSurface,
    options: EngineOptions,
) -> Result<GpuRenderer, ViewerError> {
    let viewport = Viewport::from_size(surface.pixel_size());
    GpuRenderer::new(
        wgpu::SurfaceTarget::Canvas(surface.canvas.clone()),
        viewport,
        options,
    )
    .await
    .map_err(|err| ViewerError::Backend(format!("{err:#}")))
}

#[derive(Debug, Clone)]
pub struct CanvasSurface {
    id: Arc<str>,
    canvas: HtmlCanvasElement,
}

impl CanvasSurface {
    /// Matches the back buffer to the element's CSS size.
    fn sync_size(&self, pixel_ratio: f64) {
        let width = (self.canvas.client_width().max(0) as f64 * pixel_ratio).round() as u32;
        let height = (self.canvas.client_height().max(0) as f64 * pixel_ratio).round() as u32;
        self.canvas.set_width(width);
        self.canvas.set_height(height);
    }
}

impl DrawingSurface for CanvasSurface {
    fn id(&self) -> &str {
        &self.id
    }

    fn pixel_size(&self) -> (u32, u32) {
        (self.canvas.width(), self.canvas.height())
    }
}

struct DocumentHost {
    document: Document,
}

impl SurfaceHost for DocumentHost {
    type Surface = CanvasSurface;

    fn find_surface(&self, id: &str) -> Option<CanvasSurface> {
        let canvas = self
            .document
            .get_element_by_id(id)?
            .dyn_into::<HtmlCanvasElement>()
            .ok()?;
        Some(CanvasSurface {
            id: Arc::from(id),
            canvas,
        })
    }
}

struct WebApp {
    viewer: Viewer<CanvasSurface, GpuRenderer>,
    last_timestamp: Option<f64>,
    _listeners: Vec<Listener>,
    _session_listeners: Vec<Listener>,
}

impl WebApp {
    fn render_frame(&mut self, timestamp: f64) -> Result<(), ViewerError> {
        let dt = self
            .last_timestamp
            .replace(timestamp)
            .map_or(0.0, |last| ((timestamp - last) / 1000.0) as f32);
        self.viewer.frame(dt)?;
        Ok(())
    }
}

fn schedule_animation_loop(app: Rc<RefCell<WebApp>>) -> Result<(), JsValue> {
    let handle: Rc<RefCell<Option<Closure<dyn FnMut(f64)>>>> = Rc::new(RefCell::new(None));
    let next = Rc::clone(&handle);

    *handle.borrow_mut() = Some(Closure::new(move |timestamp: f64| {
        if let Err(err) = app.borrow_mut().render_frame(timestamp) {
            error!("Render loop stopped: {err}");
            return;
        }
        if let Some(closure) = next.borrow().as_ref() {
            if let Err(err) = request_animation_frame(closure) {
                error!("requestAnimationFrame failed: {err:?}");
            }
        }
    }));

    let first = handle.borrow();
    if let Some(closure) = first.as_ref() {
        request_animation_frame(closure)?;
    }
    Ok(())
}

fn request_animation_frame(closure: &Closure<dyn FnMut(f64)>) -> Result<i32, JsValue> {
    web_sys::window()
        .ok_or_else(|| JsValue::from_str("window not available"))?
        .request_animation_frame(closure.as_ref().unchecked_ref())
}

/// A registered DOM listener; kept alive as long as the app.
struct Listener {
    _closure: Closure<dyn FnMut(Event)>,
}

fn listen<E, F>(target: &EventTarget, kind: &str, mut handler: F) -> Result<Listener, JsValue>
where
    E: JsCast + 'static,
    F: FnMut(&E) + 'static,
{
    let closure = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
        if let Some(event) = event.dyn_ref::<E>() {
            handler(event);
        }
    });
    target.add_event_listener_with_callback(kind, closure.as_ref().unchecked_ref())?;
    Ok(Listener { _closure: closure })
}

/// Pointer travel, in CSS pixels, beyond which a press counts as a drag
/// rather than a click.
const CLICK_SLOP: f32 = 6.0;

fn attach_listeners(
    document: &Document,
    canvas: &HtmlCanvasElement,
    app: &Rc<RefCell<WebApp>>,
    runtime: &Rc<WebXrRuntime>,
) -> Result<Vec<Listener>, JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("window not available"))?;
    let input: Arc<InputState> = app.borrow().viewer.input();
    let press_origin: Rc<Cell<Option<Vec2>>> = Rc::new(Cell::new(None));
    let mut listeners = Vec::new();

    // Keys are captured on the document so they work before the canvas has focus.
    {
        let input = Arc::clone(&input);
        listeners.push(listen(document, "keydown", move |event: &KeyboardEvent| {
            if targets_text_entry(event) {
                return;
            }
            if let Some(code) = KeyCode::from_name(&event.key()) {
                if code.scrolls_page() {
                    event.prevent_default();
                }
                input.set_key_down(code);
            }
        })?);
    }
    {
        let input = Arc::clone(&input);
        listeners.push(listen(document, "keyup", move |event: &KeyboardEvent| {
            if let Some(code) = KeyCode::from_name(&event.key()) {
                input.set_key_up(code);
            }
        })?);
    }
    {
        let input = Arc::clone(&input);
        let press_origin = Rc::clone(&press_origin);
        let capture_canvas = canvas.clone();
        listeners.push(listen(canvas, "pointerdown", move |event: &PointerEvent| {
            let position = pointer_position(event);
            press_origin.set(Some(position));
            input.press_pointer(MouseButton::new(event.button() as u8), position);
            if let Err(err) = capture_canvas.set_pointer_capture(event.pointer_id()) {
                debug!("pointer capture refused: {err:?}");
            }
        })?);
    }
    {
        let input = Arc::clone(&input);
        listeners.push(listen(canvas, "pointermove", move |event: &PointerEvent| {
            input.set_mouse_position(pointer_position(event));
        })?);
    }
    for kind in ["pointerup", "pointercancel"] {
        let input = Arc::clone(&input);
        listeners.push(listen(&window, kind, move |event: &PointerEvent| {
            input.set_mouse_button_up(MouseButton::new(event.button() as u8));
        })?);
    }
    {
        let input = Arc::clone(&input);
        listeners.push(listen(&window, "blur", move |_: &Event| input.clear())?);
    }
    {
        let app = Rc::clone(app);
        let runtime = Rc::clone(runtime);
        listeners.push(listen(canvas, "click", move |event: &MouseEvent| {
            let released = pointer_position(event);
            let dragged = press_origin
                .take()
                .is_some_and(|origin| origin.distance(released) > CLICK_SLOP);
            if !dragged {
                enter_xr(&app, &runtime);
            }
        })?);
    }
    {
        let app = Rc::clone(app);
        let resize_window = window.clone();
        listeners.push(listen(&window, "resize", move |_: &Event| {
            let mut app = app.borrow_mut();
            app.viewer
                .engine()
                .surface()
                .sync_size(resize_window.device_pixel_ratio());
            if let Some(viewport) = app.viewer.handle_resize() {
                debug!("Canvas resized to {}x{}", viewport.width, viewport.height);
            }
        })?);
    }
    Ok(listeners)
}

fn pointer_position(event: &MouseEvent) -> Vec2 {
    Vec2::new(event.offset_x() as f32, event.offset_y() as f32)
}

fn targets_text_entry(event: &KeyboardEvent) -> bool {
    let Some(element) = event
        .target()
        .and_then(|target| target.dyn_into::<HtmlElement>().ok())
    else {
        return false;
    };
    element.is_content_editable() || is_text_entry_element(&element.tag_name())
}

/// Runs from the click handler so the request carries the user gesture. The
/// app is not borrowed while the browser negotiates the session.
fn enter_xr(app: &Rc<RefCell<WebApp>>, runtime: &Rc<WebXrRuntime>) {
    let request = app
        .borrow_mut()
        .viewer
        .xr_mut()
        .and_then(|xr| xr.begin_enter());
    let Some(request) = request else {
        return;
    };
    let app = Rc::clone(app);
    let runtime = Rc::clone(runtime);
    wasm_bindgen_futures::spawn_local(async move {
        let session = runtime.request_session(&request).await;
        let entered = match app.borrow_mut().viewer.xr_mut() {
            Some(xr) => xr.finish_enter(session),
            None => return,
        };
        if let Err(err) = entered {
            warn!("Could not enter XR: {err}");
            return;
        }
        let Some(session) = runtime.session() else {
            return;
        };
        match watch_session(&session, &app, &runtime) {
            Ok(listeners) => app.borrow_mut()._session_listeners = listeners,
            Err(err) => error!("Could not watch XR session: {err:?}"),
        }
    });
}

/// Keeps the experience in step with controller changes and with sessions
/// the browser ends on its own.
fn watch_session(
    session: &JsValue,
    app: &Rc<RefCell<WebApp>>,
    runtime: &Rc<WebXrRuntime>,
) -> Result<Vec<Listener>, JsValue> {
    let target: EventTarget = session.clone().dyn_into()?;
    let mut listeners = Vec::new();
    {
        let app = Rc::clone(app);
        let session = session.clone();
        listeners.push(listen(&target, "inputsourceschange", move |_: &Event| {
            if let Some(xr) = app.borrow_mut().viewer.xr_mut() {
                xr.set_input_sources(input_sources(&session));
            }
        })?);
    }
    {
        let app = Rc::clone(app);
        let runtime = Rc::clone(runtime);
        listeners.push(listen(&target, "end", move |_: &Event| {
            runtime.forget_session();
            if let Some(xr) = app.borrow_mut().viewer.xr_mut() {
                xr.session_ended();
            }
        })?);
    }
    Ok(listeners)
}

fn js_error(err: JsValue) -> ViewerError {
    ViewerError::Backend(format!("{err:?}"))
}

/// WebXR device API reached through `navigator.xr`.
pub struct WebXrRuntime {
    xr: Option<JsValue>,
    session: RefCell<Option<JsValue>>,
}

impl WebXrRuntime {
    pub fn new(navigator: &web_sys::Navigator) -> Self {
        let xr = Reflect::get(navigator, &JsValue::from_str("xr"))
            .ok()
            .filter(|xr| !xr.is_undefined() && !xr.is_null());
        if xr.is_none() {
            warn!("navigator.xr is not available");
        }
        Self {
            xr,
            session: RefCell::new(None),
        }
    }

    /// The running `XRSession`, if any.
    pub fn session(&self) -> Option<JsValue> {
        self.session.borrow().clone()
    }

    fn forget_session(&self) {
        self.session.borrow_mut().take();
    }
}

impl XrRuntime for WebXrRuntime {
    async fn is_session_supported(&self, mode: XrSessionMode) -> Result<bool, ViewerError> {
        let Some(xr) = self.xr.as_ref() else {
            return Ok(false);
        };
        let supported = call_async(xr, "isSessionSupported", &[JsValue::from_str(mode.as_str())])
            .await
            .map_err(xr_error)?;
        Ok(supported.as_bool().unwrap_or(false))
    }

    async fn request_session(
        &self,
        request: &XrSessionRequest,
    ) -> Result<XrSessionInfo, ViewerError> {
        let Some(xr) = self.xr.as_ref() else {
            return Err(ViewerError::XrUnsupported { mode: request.mode });
        };

        let features = Array::new();
        features.push(&JsValue::from_str(request.reference_space.as_str()));
        for feature in &request.optional_features {
            features.push(&JsValue::from_str(feature));
        }
        let init = Object::new();
        Reflect::set(&init, &JsValue::from_str("optionalFeatures"), &features)
            .map_err(xr_error)?;

        let session = call_async(
            xr,
            "requestSession",
            &[JsValue::from_str(request.mode.as_str()), init.into()],
        )
        .await
        .map_err(xr_error)?;
        *self.session.borrow_mut() = Some(session.clone());

        let reference_space = match call_async(
            &session,
            "requestReferenceSpace",
            &[JsValue::from_str(request.reference_space.as_str())],
        )
        .await
        {
            Ok(_) => request.reference_space,
            Err(err) => {
                debug!("reference space request failed: {err:?}");
                call_async(&session, "requestReferenceSpace", &[JsValue::from_str("local")])
                    .await
                    .map_err(xr_error)?;
                ReferenceSpaceType::Local
            }
        };

        // Controllers arrive through `inputsourceschange`.
        Ok(XrSessionInfo {
            reference_space,
            input_sources: Vec::new(),
        })
    }

    async fn end_session(&self) -> Result<(), ViewerError> {
        let Some(session) = self.session.borrow_mut().take() else {
            return Ok(());
        };
        call_async(&session, "end", &[]).await.map_err(xr_error)?;
        Ok(())
    }
}

async fn call_async(target: &JsValue, method: &str, args: &[JsValue]) -> Result<JsValue, JsValue> {
    let function: Function = Reflect::get(target, &JsValue::from_str(method))?.dyn_into()?;
    let args: Array = args.iter().collect();
    let promise: Promise = function.apply(target, &args)?.dyn_into()?;
    JsFuture::from(promise).await
}

fn input_sources(session: &JsValue) -> Vec<XrInputSource> {
    let Ok(sources) = Reflect::get(session, &JsValue::from_str("inputSources")) else {
        return Vec::new();
    };
    Array::from(&sources)
        .iter()
        .map(|source| {
            let handedness = Reflect::get(&source, &JsValue::from_str("handedness"))
                .ok()
                .and_then(|value| value.as_string());
            let profiles = Reflect::get(&source, &JsValue::from_str("profiles"))
                .map(|value| {
                    Array::from(&value)
                        .iter()
                        .filter_map(|profile| profile.as_string())
                        .collect()
                })
                .unwrap_or_default();
            XrInputSource {
                handedness: match handedness.as_deref() {
                    Some("left") => Handedness::Left,
                    Some("right") => Handedness::Right,
                    _ => Handedness::None,
                },
                profiles,
            }
        })
        .collect()
}

fn xr_error(err: JsValue) -> ViewerError {
    ViewerError::XrSession(
        err.as_string()
            .unwrap_or_else(|| format!("{err:?}")),
    )
}
