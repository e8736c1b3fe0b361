mod common;
mod gpu;

pub use gpu::GpuRenderer;
