use std::sync::Arc;

use parking_lot::RwLock;

/// Platform pixel target the engine draws into.
pub trait DrawingSurface: Clone {
    /// Identifier the hosting document (or window registry) knows the surface by.
    fn id(&self) -> &str;

    /// Current size of the back buffer in physical pixels.
    fn pixel_size(&self) -> (u32, u32);
}

/// Looks up pre-existing drawing surfaces by identifier.
pub trait SurfaceHost {
    type Surface: DrawingSurface;

    fn find_surface(&self, id: &str) -> Option<Self::Surface>;
}

/// Dimensions of the region the engine renders to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn from_size((width, height): (u32, u32)) -> Self {
        Self::new(width, height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

/// In-memory surface whose size is set by its owner, for headless hosts and tests.
#[derive(Debug, Clone)]
pub struct StaticSurface {
    id: Arc<str>,
    size: Arc<RwLock<(u32, u32)>>,
}

impl StaticSurface {
    pub fn new(id: &str, width: u32, height: u32) -> Self {
        Self {
            id: Arc::from(id),
            size: Arc::new(RwLock::new((width, height))),
        }
    }

    /// Simulates the host resizing the surface. Clones observe the new size.
    pub fn set_size(&self, width: u32, height: u32) {
        *self.size.write() = (width, height);
    }
}

impl DrawingSurface for StaticSurface {
    fn id(&self) -> &str {
        &self.id
    }

    fn pixel_size(&self) -> (u32, u32) {
        *self.size.read()
    }
}

/// Host that only knows the surfaces it was given.
#[derive(Debug, Clone, Default)]
pub struct StaticHost {
    surfaces: Vec<StaticSurface>,
}

impl StaticHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_surface(mut self, surface: StaticSurface) -> Self {
        self.surfaces.push(surface);
        self
    }
}

impl SurfaceHost for StaticHost {
    type Surface = StaticSurface;

    fn find_surface(&self, id: &str) -> Option<StaticSurface> {
        self.surfaces.iter().find(|s| s.id() == id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_resolves_surfaces_by_id() {
        let host = StaticHost::new().with_surface(StaticSurface::new("renderCanvas", 800, 600));
        assert!(host.find_surface("renderCanvas").is_some());
        assert!(host.find_surface("missing").is_none());
    }

    #[test]
    fn clones_share_size_updates() {
        let surface = StaticSurface::new("renderCanvas", 800, 600);
        let clone = surface.clone();
        surface.set_size(1024, 768);
        assert_eq!(clone.pixel_size(), (1024, 768));
    }

    #[test]
    fn viewport_aspect_handles_zero_height() {
        assert_eq!(Viewport::new(1600, 800).aspect(), 2.0);
        assert_eq!(Viewport::new(10, 0).aspect(), 1.0);
        assert!(Viewport::new(10, 0).is_empty());
    }
}
