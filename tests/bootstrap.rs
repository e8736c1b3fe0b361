use std::cell::{Cell, RefCell};
use std::rc::Rc;

use glam::Vec3;
use pollster::block_on;
use xr_viewer::engine::{EngineOptions, RenderBackend};
use xr_viewer::environment::{Environment, EnvironmentLoader, EnvironmentOptions};
use xr_viewer::error::{RenderError, ViewerError};
use xr_viewer::scene::{FrameSnapshot, Light, Scene};
use xr_viewer::xr::{XrRuntime, XrSessionInfo, XrSessionMode, XrSessionRequest};
use xr_viewer::{
    FrameOutcome, ProceduralEnvironment, StaticHost, StaticSurface, Viewer, ViewerConfig,
    ViewerState, Viewport, XrState,
};

type CallLog = Rc<RefCell<Vec<&'static str>>>;

#[derive(Default)]
struct RecordingBackend {
    draws: Cell<usize>,
    resizes: RefCell<Vec<Viewport>>,
    fail_with: Option<RenderError>,
}

impl RenderBackend for RecordingBackend {
    fn resize(&mut self, viewport: Viewport) {
        self.resizes.borrow_mut().push(viewport);
    }

    fn draw(&mut self, _frame: &FrameSnapshot<'_>) -> Result<(), RenderError> {
        if let Some(err) = self.fail_with.clone() {
            return Err(err);
        }
        self.draws.set(self.draws.get() + 1);
        Ok(())
    }
}

struct RecordingEnvironment {
    log: CallLog,
    fail: bool,
}

impl EnvironmentLoader for RecordingEnvironment {
    async fn create_default_environment(
        &self,
        scene: &mut Scene,
        options: &EnvironmentOptions,
    ) -> Result<Environment, ViewerError> {
        self.log.borrow_mut().push("environment:start");
        if self.fail {
            return Err(ViewerError::Environment("skybox texture fetch failed".into()));
        }
        let environment = ProceduralEnvironment
            .create_default_environment(scene, options)
            .await?;
        self.log.borrow_mut().push("environment:ready");
        Ok(environment)
    }
}

struct RecordingXr {
    log: CallLog,
    supported: bool,
    support_error: bool,
    reject_request: bool,
}

impl XrRuntime for RecordingXr {
    async fn is_session_supported(&self, _mode: XrSessionMode) -> Result<bool, ViewerError> {
        self.log.borrow_mut().push("xr:supported");
        if self.support_error {
            return Err(ViewerError::XrSession("SecurityError: insecure context".into()));
        }
        Ok(self.supported)
    }

    async fn request_session(
        &self,
        request: &XrSessionRequest,
    ) -> Result<XrSessionInfo, ViewerError> {
        self.log.borrow_mut().push("xr:request");
        if self.reject_request {
            return Err(ViewerError::XrSession("NotAllowedError: no user activation".into()));
        }
        Ok(XrSessionInfo {
            reference_space: request.reference_space,
            input_sources: Vec::new(),
        })
    }

    async fn end_session(&self) -> Result<(), ViewerError> {
        self.log.borrow_mut().push("xr:end");
        Ok(())
    }
}

struct Fixture {
    log: CallLog,
    surface: StaticSurface,
    viewer: Viewer<StaticSurface, RecordingBackend>,
}

impl Fixture {
    fn new(config: ViewerConfig) -> Self {
        let log = CallLog::default();
        let surface = StaticSurface::new("renderCanvas", 800, 600);
        let host = StaticHost::new().with_surface(surface.clone());
        let factory_log = Rc::clone(&log);
        let viewer = block_on(Viewer::create(&host, config, move |_surface, _options| {
            factory_log.borrow_mut().push("backend");
            async { Ok::<_, ViewerError>(RecordingBackend::default()) }
        }))
        .expect("viewer");
        Self {
            log,
            surface,
            viewer,
        }
    }

    fn start(&mut self, fail_environment: bool, xr_supported: bool) -> Result<(), ViewerError> {
        let runtime = self.runtime(xr_supported);
        self.start_with(fail_environment, &runtime)
    }

    fn start_with(
        &mut self,
        fail_environment: bool,
        runtime: &RecordingXr,
    ) -> Result<(), ViewerError> {
        let loader = RecordingEnvironment {
            log: Rc::clone(&self.log),
            fail: fail_environment,
        };
        block_on(self.viewer.start(&loader, runtime))
    }

    fn runtime(&self, supported: bool) -> RecordingXr {
        RecordingXr {
            log: Rc::clone(&self.log),
            supported,
            support_error: false,
            reject_request: false,
        }
    }

    fn enter_xr(&mut self) -> Result<(), ViewerError> {
        let runtime = self.runtime(true);
        block_on(self.viewer.enter_xr(&runtime))
    }

    fn calls(&self) -> Vec<&'static str> {
        self.log.borrow().clone()
    }

    fn draws(&self) -> usize {
        self.viewer.engine().backend().draws.get()
    }
}

fn started() -> Fixture {
    let mut fixture = Fixture::new(ViewerConfig::default());
    fixture.start(false, true).expect("start");
    fixture
}

#[test]
fn start_registers_exactly_one_render_loop() {
    let mut fixture = started();
    assert_eq!(fixture.viewer.state(), ViewerState::Running);
    assert_eq!(fixture.viewer.engine().render_loop_count(), 1);

    assert_eq!(fixture.viewer.frame(0.016).unwrap(), FrameOutcome::Rendered(1));
    assert_eq!(fixture.viewer.frame(0.016).unwrap(), FrameOutcome::Rendered(1));
    assert_eq!(fixture.draws(), 2);
    assert_eq!(fixture.viewer.engine().frame_count(), 2);
}

#[test]
fn environment_resolves_before_xr_is_requested() {
    let fixture = started();
    assert_eq!(
        fixture.calls(),
        [
            "backend",
            "environment:start",
            "environment:ready",
            "xr:supported"
        ]
    );
}

#[test]
fn session_waits_for_the_user_to_enter() {
    let mut fixture = started();
    assert_eq!(
        fixture.viewer.xr().map(|xr| xr.state()),
        Some(XrState::NotInXr)
    );
    assert!(!fixture.calls().contains(&"xr:request"));

    fixture.enter_xr().expect("enter");
    assert_eq!(fixture.calls().last(), Some(&"xr:request"));
    assert_eq!(fixture.viewer.xr().map(|xr| xr.state()), Some(XrState::InXr));

    // Entering again does not renegotiate.
    fixture.enter_xr().expect("enter");
    assert_eq!(fixture.calls().iter().filter(|call| **call == "xr:request").count(), 1);
}

#[test]
fn entering_before_start_is_rejected() {
    let mut fixture = Fixture::new(ViewerConfig::default());
    assert!(matches!(fixture.enter_xr(), Err(ViewerError::NotStarted)));
    assert!(fixture.calls().iter().all(|call| !call.starts_with("xr:")));
}

#[test]
fn rejected_enter_keeps_rendering_flat() {
    let mut fixture = started();
    let mut runtime = fixture.runtime(true);
    runtime.reject_request = true;
    let err = block_on(fixture.viewer.enter_xr(&runtime)).unwrap_err();
    assert!(matches!(err, ViewerError::XrSession(_)));

    assert_eq!(fixture.viewer.xr().map(|xr| xr.state()), Some(XrState::NotInXr));
    assert_eq!(fixture.viewer.state(), ViewerState::Running);
    assert_eq!(fixture.viewer.frame(0.016).unwrap(), FrameOutcome::Rendered(1));

    fixture.enter_xr().expect("second attempt");
    assert_eq!(fixture.viewer.xr().map(|xr| xr.state()), Some(XrState::InXr));
}

#[test]
fn xr_negotiation_failure_aborts_startup() {
    for flat_fallback in [false, true] {
        let mut config = ViewerConfig::default();
        config.xr.flat_fallback = flat_fallback;
        let mut fixture = Fixture::new(config);
        let mut runtime = fixture.runtime(true);
        runtime.support_error = true;

        let err = fixture.start_with(false, &runtime).unwrap_err();
        assert!(matches!(err, ViewerError::XrSession(_)), "{err}");
        assert_eq!(fixture.viewer.state(), ViewerState::Failed);
        assert_eq!(fixture.viewer.engine().render_loop_count(), 0);
        assert!(fixture.viewer.xr().is_none());
        assert_eq!(fixture.viewer.frame(0.016).unwrap(), FrameOutcome::Idle);
        assert_eq!(fixture.draws(), 0);
    }
}

#[test]
fn default_scene_matches_stock_layout() {
    let fixture = started();
    let scene = fixture.viewer.scene();

    let camera = scene.active_camera().expect("camera");
    assert_eq!(camera.name, "camera1");
    assert_eq!(camera.position(), Vec3::new(0.0, 1.7, 0.0));
    assert_eq!(camera.target(), Vec3::new(0.0, 1.7, -1.0));
    assert_eq!(camera.attached_surface(), Some("renderCanvas"));

    let Some(Light::Hemispheric(ambient)) = scene.light("ambient") else {
        panic!("missing hemispheric light");
    };
    assert_eq!(ambient.direction, Vec3::Y);
    assert_eq!(ambient.intensity, 1.0);
    assert_eq!(ambient.diffuse, Vec3::splat(0.25));

    let Some(Light::Directional(sun)) = scene.light("sunlight") else {
        panic!("missing directional light");
    };
    assert_eq!(sun.direction, Vec3::new(0.0, -1.0, 0.0));
    assert_eq!(sun.intensity, 1.0);

    assert_eq!(scene.lights().len(), 2);
    assert!(scene.mesh_by_name("BackgroundPlane").is_some());
}

#[test]
fn xr_floor_is_the_environment_ground() {
    let fixture = started();
    let environment = fixture.viewer.environment().expect("environment");
    let xr = fixture.viewer.xr().expect("xr");
    assert_eq!(xr.state(), XrState::NotInXr);
    assert_eq!(xr.floor_meshes(), [environment.ground()]);

    let hit = xr
        .teleport_destination(
            fixture.viewer.scene(),
            Vec3::new(0.0, 1.7, 0.0),
            Vec3::new(0.0, -1.0, -1.0),
        )
        .expect("ray lands on the ground");
    assert!(hit.y.abs() < 1e-3);
    assert!((hit.z + 1.7).abs() < 1e-3);
}

#[test]
fn resize_is_idempotent() {
    let mut fixture = started();
    fixture.surface.set_size(1024, 768);

    let first = fixture.viewer.handle_resize();
    let second = fixture.viewer.handle_resize();
    assert_eq!(first, Some(Viewport::new(1024, 768)));
    assert_eq!(first, second);
    assert_eq!(fixture.viewer.engine().viewport(), Viewport::new(1024, 768));
    assert_eq!(
        *fixture.viewer.engine().backend().resizes.borrow(),
        [Viewport::new(1024, 768), Viewport::new(1024, 768)]
    );
}

#[test]
fn zero_area_resize_keeps_previous_viewport() {
    let mut fixture = started();
    fixture.surface.set_size(0, 0);
    assert_eq!(fixture.viewer.handle_resize(), Some(Viewport::new(800, 600)));
    assert!(fixture.viewer.engine().backend().resizes.borrow().is_empty());
}

#[test]
fn resize_before_start_is_ignored() {
    let mut fixture = Fixture::new(ViewerConfig::default());
    fixture.surface.set_size(1024, 768);
    assert_eq!(fixture.viewer.handle_resize(), None);
    assert_eq!(fixture.viewer.engine().viewport(), Viewport::new(800, 600));
}

#[test]
fn missing_surface_fails_before_backend_creation() {
    let host = StaticHost::new().with_surface(StaticSurface::new("otherCanvas", 800, 600));
    let factory_called = Rc::new(Cell::new(false));
    let called = Rc::clone(&factory_called);
    let result = block_on(Viewer::create(
        &host,
        ViewerConfig::default(),
        move |_surface: StaticSurface, _options: EngineOptions| {
            called.set(true);
            async { Ok::<_, ViewerError>(RecordingBackend::default()) }
        },
    ));

    match result {
        Err(ViewerError::SurfaceNotFound { id }) => assert_eq!(id, "renderCanvas"),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("viewer created without a surface"),
    }
    assert!(!factory_called.get());
}

#[test]
fn environment_failure_skips_xr_and_rendering() {
    let mut fixture = Fixture::new(ViewerConfig::default());
    let err = fixture.start(true, true).unwrap_err();
    assert!(matches!(err, ViewerError::Environment(_)));

    assert_eq!(fixture.calls(), ["backend", "environment:start"]);
    assert_eq!(fixture.viewer.state(), ViewerState::Failed);
    assert_eq!(fixture.viewer.engine().render_loop_count(), 0);
    assert!(fixture.viewer.environment().is_none());
    assert!(fixture.viewer.xr().is_none());

    assert_eq!(fixture.viewer.frame(0.016).unwrap(), FrameOutcome::Idle);
    assert_eq!(fixture.draws(), 0);
    assert_eq!(fixture.viewer.handle_resize(), None);
}

#[test]
fn unsupported_xr_aborts_startup_by_default() {
    let mut fixture = Fixture::new(ViewerConfig::default());
    let err = fixture.start(false, false).unwrap_err();
    assert!(matches!(
        err,
        ViewerError::XrUnsupported {
            mode: XrSessionMode::ImmersiveVr
        }
    ));
    assert!(!fixture.calls().contains(&"xr:request"));
    assert_eq!(fixture.viewer.engine().render_loop_count(), 0);
    assert_eq!(fixture.draws(), 0);
}

#[test]
fn flat_fallback_renders_without_xr() {
    let mut config = ViewerConfig::default();
    config.xr.flat_fallback = true;
    let mut fixture = Fixture::new(config);
    fixture.start(false, false).expect("start");

    assert!(fixture.viewer.xr().is_none());
    assert!(fixture.viewer.environment().is_some());
    assert_eq!(fixture.viewer.engine().render_loop_count(), 1);
    assert_eq!(fixture.viewer.frame(0.016).unwrap(), FrameOutcome::Rendered(1));
}

#[test]
fn second_start_is_rejected() {
    let mut fixture = started();
    let err = fixture.start(false, true).unwrap_err();
    assert!(matches!(err, ViewerError::AlreadyStarted));
    assert_eq!(fixture.viewer.engine().render_loop_count(), 1);
    assert_eq!(fixture.viewer.state(), ViewerState::Running);
}

#[test]
fn dispose_ends_session_and_stops_rendering() {
    let mut fixture = started();
    fixture.enter_xr().expect("enter");
    let runtime = fixture.runtime(true);
    block_on(fixture.viewer.dispose(&runtime)).expect("dispose");

    assert_eq!(fixture.calls().last(), Some(&"xr:end"));
    assert_eq!(fixture.viewer.state(), ViewerState::Disposed);
    assert_eq!(fixture.viewer.engine().render_loop_count(), 0);
    assert_eq!(fixture.viewer.xr().map(|xr| xr.state()), Some(XrState::NotInXr));
    assert_eq!(fixture.viewer.frame(0.016).unwrap(), FrameOutcome::Idle);

    let camera = fixture.viewer.scene().active_camera().expect("camera");
    assert_eq!(camera.attached_surface(), None);
}

#[test]
fn dispose_without_session_skips_runtime() {
    let mut fixture = started();
    let runtime = fixture.runtime(true);
    block_on(fixture.viewer.dispose(&runtime)).expect("dispose");
    assert!(!fixture.calls().contains(&"xr:end"));
    assert_eq!(fixture.viewer.state(), ViewerState::Disposed);
}

#[test]
fn transient_backend_errors_skip_the_frame() {
    let mut fixture = started();
    fixture.viewer_backend_fails(RenderError::Timeout);
    assert_eq!(fixture.viewer.frame(0.016).unwrap(), FrameOutcome::Skipped);

    fixture.viewer_backend_fails(RenderError::SurfaceLost);
    assert_eq!(fixture.viewer.frame(0.016).unwrap(), FrameOutcome::Skipped);
    assert_eq!(fixture.draws(), 0);

    fixture.viewer_backend_fails(RenderError::OutOfMemory);
    assert!(matches!(
        fixture.viewer.frame(0.016),
        Err(ViewerError::Render(RenderError::OutOfMemory))
    ));
}

impl Fixture {
    fn viewer_backend_fails(&mut self, err: RenderError) {
        self.viewer.engine_mut().backend_mut().fail_with = Some(err);
    }
}
