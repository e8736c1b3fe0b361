//! Immersive session negotiation and the floor it is anchored to.

use std::fmt;

use glam::Vec3;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::environment::Environment;
use crate::error::ViewerError;
use crate::scene::{MeshId, Scene};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum XrSessionMode {
    ImmersiveVr,
    ImmersiveAr,
    Inline,
}

impl XrSessionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            XrSessionMode::ImmersiveVr => "immersive-vr",
            XrSessionMode::ImmersiveAr => "immersive-ar",
            XrSessionMode::Inline => "inline",
        }
    }
}

impl fmt::Display for XrSessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferenceSpaceType {
    Viewer,
    Local,
    LocalFloor,
    BoundedFloor,
    Unbounded,
}

impl ReferenceSpaceType {
    pub fn as_str(self) -> &'static str {
        match self {
            ReferenceSpaceType::Viewer => "viewer",
            ReferenceSpaceType::Local => "local",
            ReferenceSpaceType::LocalFloor => "local-floor",
            ReferenceSpaceType::BoundedFloor => "bounded-floor",
            ReferenceSpaceType::Unbounded => "unbounded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct XrOptions {
    pub session_mode: XrSessionMode,
    pub reference_space: ReferenceSpaceType,
    pub optional_features: Vec<String>,
    /// Keep rendering without XR when the runtime reports the mode as
    /// unsupported. Off by default: an unsupported runtime aborts startup.
    pub flat_fallback: bool,
}

impl Default for XrOptions {
    fn default() -> Self {
        Self {
            session_mode: XrSessionMode::ImmersiveVr,
            reference_space: ReferenceSpaceType::LocalFloor,
            optional_features: Vec::new(),
            flat_fallback: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XrSessionRequest {
    pub mode: XrSessionMode,
    pub reference_space: ReferenceSpaceType,
    pub optional_features: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handedness {
    None,
    Left,
    Right,
}

/// Controller or hand reported by the runtime, with the model profiles it matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XrInputSource {
    pub handedness: Handedness,
    pub profiles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XrSessionInfo {
    pub reference_space: ReferenceSpaceType,
    pub input_sources: Vec<XrInputSource>,
}

/// Platform service that negotiates immersive sessions.
#[allow(async_fn_in_trait)]
pub trait XrRuntime {
    async fn is_session_supported(&self, mode: XrSessionMode) -> Result<bool, ViewerError>;

    /// Resolves once the session runs, input models are loaded and the
    /// reference space is established.
    async fn request_session(
        &self,
        request: &XrSessionRequest,
    ) -> Result<XrSessionInfo, ViewerError>;

    async fn end_session(&self) -> Result<(), ViewerError>;
}

/// Runtime for hosts without any XR support.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedXr;

impl XrRuntime for UnsupportedXr {
    async fn is_session_supported(&self, _mode: XrSessionMode) -> Result<bool, ViewerError> {
        Ok(false)
    }

    async fn request_session(
        &self,
        request: &XrSessionRequest,
    ) -> Result<XrSessionInfo, ViewerError> {
        Err(ViewerError::XrUnsupported { mode: request.mode })
    }

    async fn end_session(&self) -> Result<(), ViewerError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrState {
    NotInXr,
    EnteringXr,
    InXr,
    ExitingXr,
}

/// Immersive support for a scene: the floor users can stand on and, once the
/// user asks for it, a running session.
#[derive(Debug, Clone, PartialEq)]
pub struct XrExperience {
    state: XrState,
    request: XrSessionRequest,
    reference_space: ReferenceSpaceType,
    floor_meshes: Vec<MeshId>,
    input_sources: Vec<XrInputSource>,
}

impl XrExperience {
    /// Checks that the runtime supports the configured mode and registers the
    /// environment's ground as the floor. No session is started.
    pub async fn create<R: XrRuntime>(
        runtime: &R,
        environment: &Environment,
        options: &XrOptions,
    ) -> Result<Self, ViewerError> {
        let mode = options.session_mode;
        if !runtime.is_session_supported(mode).await? {
            return Err(ViewerError::XrUnsupported { mode });
        }
        info!("{mode} sessions available; waiting for the user to enter");
        Ok(Self {
            state: XrState::NotInXr,
            request: XrSessionRequest {
                mode,
                reference_space: options.reference_space,
                optional_features: options.optional_features.clone(),
            },
            reference_space: options.reference_space,
            floor_meshes: vec![environment.ground()],
            input_sources: Vec::new(),
        })
    }

    /// Requests the session. Runtimes that gate sessions behind a user
    /// gesture must be called from one.
    pub async fn enter<R: XrRuntime>(&mut self, runtime: &R) -> Result<(), ViewerError> {
        let Some(request) = self.begin_enter() else {
            return Ok(());
        };
        let session = runtime.request_session(&request).await;
        self.finish_enter(session)
    }

    /// First half of [`enter`](Self::enter) for hosts that cannot hold the
    /// experience across the runtime call. Returns `None` unless the
    /// experience is idle.
    pub fn begin_enter(&mut self) -> Option<XrSessionRequest> {
        if self.state != XrState::NotInXr {
            return None;
        }
        self.state = XrState::EnteringXr;
        Some(self.request.clone())
    }

    /// Applies the runtime's answer to a request from [`begin_enter`](Self::begin_enter).
    pub fn finish_enter(
        &mut self,
        session: Result<XrSessionInfo, ViewerError>,
    ) -> Result<(), ViewerError> {
        let session = match session {
            Ok(session) => session,
            Err(err) => {
                self.state = XrState::NotInXr;
                return Err(err);
            }
        };
        if session.reference_space != self.request.reference_space {
            warn!(
                "XR runtime granted `{}` instead of `{}`",
                session.reference_space.as_str(),
                self.request.reference_space.as_str()
            );
        }
        self.reference_space = session.reference_space;
        self.input_sources = session.input_sources;
        self.state = XrState::InXr;
        info!(
            "Entered {} session (reference space {})",
            self.request.mode,
            self.reference_space.as_str()
        );
        Ok(())
    }

    /// Ends the session. Calling it outside a running session does nothing.
    pub async fn exit<R: XrRuntime>(&mut self, runtime: &R) -> Result<(), ViewerError> {
        if self.state != XrState::InXr {
            return Ok(());
        }
        self.state = XrState::ExitingXr;
        match runtime.end_session().await {
            Ok(()) => {
                self.session_ended();
                Ok(())
            }
            Err(err) => {
                self.state = XrState::InXr;
                Err(err)
            }
        }
    }

    /// The runtime closed the session (headset removed, system menu).
    pub fn session_ended(&mut self) {
        if self.state == XrState::NotInXr {
            return;
        }
        self.state = XrState::NotInXr;
        self.input_sources.clear();
        info!("Exited {} session", self.request.mode);
    }

    /// Replaces the connected controllers after the runtime reports a change.
    pub fn set_input_sources(&mut self, sources: Vec<XrInputSource>) {
        debug!("{} XR input source(s) connected", sources.len());
        self.input_sources = sources;
    }

    pub fn state(&self) -> XrState {
        self.state
    }

    pub fn mode(&self) -> XrSessionMode {
        self.request.mode
    }

    pub fn reference_space(&self) -> ReferenceSpaceType {
        self.reference_space
    }

    pub fn floor_meshes(&self) -> &[MeshId] {
        &self.floor_meshes
    }

    pub fn input_sources(&self) -> &[XrInputSource] {
        &self.input_sources
    }

    /// Closest point where a pointer ray lands on the top of a floor mesh.
    pub fn teleport_destination(
        &self,
        scene: &Scene,
        origin: Vec3,
        direction: Vec3,
    ) -> Option<Vec3> {
        if direction.y >= -f32::EPSILON {
            return None;
        }
        self.floor_meshes
            .iter()
            .filter_map(|&id| scene.mesh(id))
            .filter(|mesh| mesh.visible)
            .filter_map(|mesh| {
                let (min, max) = mesh.world_bounds()?;
                let t = (max.y - origin.y) / direction.y;
                if t < 0.0 {
                    return None;
                }
                let hit = origin + direction * t;
                let inside = hit.x >= min.x && hit.x <= max.x && hit.z >= min.z && hit.z <= max.z;
                inside.then_some((t, hit))
            })
            .min_by(|(a, _), (b, _)| a.total_cmp(b))
            .map(|(_, hit)| hit)
    }
}
