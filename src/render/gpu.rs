use std::collections::HashMap;

use anyhow::{Context, Result};
use bytemuck::bytes_of;
use log::{debug, warn};
use wgpu::util::DeviceExt;

use crate::engine::{EngineOptions, RenderBackend};
use crate::error::RenderError;
use crate::scene::{FrameSnapshot, Geometry, MeshId};
use crate::surface::Viewport;

use super::common::{GlobalUniform, ObjectConstants, SHADER};

const MSAA_SAMPLES: u32 = 4;

/// wgpu backend drawing scene snapshots into a window or canvas surface.
pub struct GpuRenderer {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    sample_count: u32,
    msaa: Option<RenderTexture>,
    depth: RenderTexture,
    pipeline: wgpu::RenderPipeline,
    global_buffer: wgpu::Buffer,
    global_bind_group: wgpu::BindGroup,
    object_layout: wgpu::BindGroupLayout,
    mesh_cache: HashMap<MeshId, MeshBuffers>,
}

impl GpuRenderer {
    /// Creates the device and swapchain for `target`.
    pub async fn new(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        viewport: Viewport,
        options: EngineOptions,
    ) -> Result<Self> {
        let width = viewport.width.max(1);
        let height = viewport.height.max(1);

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY | wgpu::Backends::GL,
            ..Default::default()
        });
        let surface = instance
            .create_surface(target)
            .context("failed to create rendering surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to acquire GPU adapter")?;

        let required_limits = if cfg!(target_arch = "wasm32") {
            wgpu::Limits::downlevel_webgl2_defaults().using_resolution(adapter.limits())
        } else {
            wgpu::Limits::default()
        };
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("viewer-device"),
                required_features: wgpu::Features::empty(),
                required_limits,
                experimental_features: Default::default(),
                memory_hints: Default::default(),
                trace: Default::default(),
            })
            .await
            .context("failed to create GPU device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|format| format.is_srgb())
            .copied()
            .or_else(|| surface_caps.formats.first().copied())
            .context("surface reports no supported formats")?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode: wgpu::PresentMode::AutoVsync,
            desired_maximum_frame_latency: 2,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let sample_count = if !options.antialias {
            1
        } else if adapter
            .get_texture_format_features(surface_format)
            .flags
            .sample_count_supported(MSAA_SAMPLES)
        {
            MSAA_SAMPLES
        } else {
            warn!("{surface_format:?} does not support {MSAA_SAMPLES}x MSAA; antialiasing disabled");
            1
        };

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("viewer-shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER.into()),
        });

        let global_layout = uniform_layout::<GlobalUniform>(&device, "global-bind-layout");
        let object_layout = uniform_layout::<ObjectConstants>(&device, "object-bind-layout");

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("viewer-pipeline-layout"),
            bind_group_layouts: &[&global_layout, &object_layout],
            push_constant_ranges: &[],
        });

        let global_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("global-uniform"),
            size: std::mem::size_of::<GlobalUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let global_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("global-bind-group"),
            layout: &global_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: global_buffer.as_entire_binding(),
            }],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("viewer-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: (Geometry::FLOATS_PER_VERTEX * std::mem::size_of::<f32>())
                        as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &[
                        wgpu::VertexAttribute {
                            format: wgpu::VertexFormat::Float32x3,
                            offset: 0,
                            shader_location: 0,
                        },
                        wgpu::VertexAttribute {
                            format: wgpu::VertexFormat::Float32x3,
                            offset: (3 * std::mem::size_of::<f32>()) as u64,
                            shader_location: 1,
                        },
                    ],
                }],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                // The skybox is seen from the inside.
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: RenderTexture::DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: wgpu::MultisampleState {
                count: sample_count,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        });

        let depth = RenderTexture::depth(&device, width, height, sample_count);
        let msaa = (sample_count > 1)
            .then(|| RenderTexture::msaa(&device, &config, sample_count));

        debug!("GPU renderer ready ({surface_format:?}, {sample_count}x samples)");
        Ok(Self {
            surface,
            device,
            queue,
            config,
            sample_count,
            msaa,
            depth,
            pipeline,
            global_buffer,
            global_bind_group,
            object_layout,
            mesh_cache: HashMap::new(),
        })
    }

    fn reconfigure(&mut self) {
        self.surface.configure(&self.device, &self.config);
        self.depth = RenderTexture::depth(
            &self.device,
            self.config.width,
            self.config.height,
            self.sample_count,
        );
        self.msaa = (self.sample_count > 1)
            .then(|| RenderTexture::msaa(&self.device, &self.config, self.sample_count));
    }
}

impl RenderBackend for GpuRenderer {
    fn resize(&mut self, viewport: Viewport) {
        if viewport.is_empty() {
            return;
        }
        self.config.width = viewport.width;
        self.config.height = viewport.height;
        self.reconfigure();
    }

    fn draw(&mut self, frame: &FrameSnapshot<'_>) -> Result<(), RenderError> {
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(err) => {
                let err = surface_error(err);
                if err == RenderError::SurfaceLost {
                    debug!("Surface lost or outdated; reconfiguring");
                    self.reconfigure();
                }
                return Err(err);
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        self.queue.write_buffer(
            &self.global_buffer,
            0,
            bytes_of(&GlobalUniform::from_snapshot(frame)),
        );

        let mut draw_list = Vec::new();
        for mesh in frame.meshes.iter().filter(|mesh| mesh.visible) {
            let (device, layout) = (&self.device, &self.object_layout);
            let buffers = self.mesh_cache.entry(mesh.id()).or_insert_with(|| {
                MeshBuffers::from_geometry(device, layout, &mesh.geometry, &mesh.name)
            });
            let constants = ObjectConstants::for_mesh(mesh, frame.camera_position);
            self.queue
                .write_buffer(&buffers.uniform, 0, bytes_of(&constants));
            draw_list.push(mesh.id());
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("viewer-encoder"),
            });
        let (color_view, resolve_target) = match self.msaa.as_ref() {
            Some(msaa) => (&msaa.view, Some(&view)),
            None => (&view, None),
        };
        let clear = frame.clear_color;
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("main-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color_view,
                depth_slice: None,
                resolve_target,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: clear.x as f64,
                        g: clear.y as f64,
                        b: clear.z as f64,
                        a: clear.w as f64,
                    }),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.global_bind_group, &[]);
        for id in &draw_list {
            let Some(mesh) = self.mesh_cache.get(id) else {
                continue;
            };
            pass.set_vertex_buffer(0, mesh.vertex.slice(..));
            pass.set_index_buffer(mesh.index.slice(..), wgpu::IndexFormat::Uint32);
            pass.set_bind_group(1, &mesh.bind_group, &[]);
            pass.draw_indexed(0..mesh.index_count, 0, 0..1);
        }
        drop(pass);

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

/// Maps a swapchain failure to the error the viewer acts on. Lost and
/// outdated surfaces are reconfigured by the caller and the frame is retried.
fn surface_error(err: wgpu::SurfaceError) -> RenderError {
    match err {
        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => RenderError::SurfaceLost,
        wgpu::SurfaceError::Timeout => RenderError::Timeout,
        wgpu::SurfaceError::OutOfMemory => RenderError::OutOfMemory,
        other => RenderError::Backend(other.to_string()),
    }
}

fn uniform_layout<T>(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<T>() as u64),
            },
            count: None,
        }],
    })
}

/// GPU resources for one mesh, kept for the lifetime of the renderer.
struct MeshBuffers {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
    uniform: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl MeshBuffers {
    fn from_geometry(
        device: &wgpu::Device,
        object_layout: &wgpu::BindGroupLayout,
        geometry: &Geometry,
        label: &str,
    ) -> Self {
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-vertices")),
            contents: bytemuck::cast_slice(&geometry.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-indices")),
            contents: bytemuck::cast_slice(&geometry.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        let uniform = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{label}-uniform")),
            size: std::mem::size_of::<ObjectConstants>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{label}-bind-group")),
            layout: object_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform.as_entire_binding(),
            }],
        });
        Self {
            vertex,
            index,
            index_count: geometry.indices.len() as u32,
            uniform,
            bind_group,
        }
    }
}

struct RenderTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl RenderTexture {
    const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

    fn depth(device: &wgpu::Device, width: u32, height: u32, sample_count: u32) -> Self {
        Self::create(
            device,
            "depth-texture",
            width,
            height,
            sample_count,
            Self::DEPTH_FORMAT,
        )
    }

    fn msaa(
        device: &wgpu::Device,
        config: &wgpu::SurfaceConfiguration,
        sample_count: u32,
    ) -> Self {
        Self::create(
            device,
            "msaa-color",
            config.width,
            config.height,
            sample_count,
            config.format,
        )
    }

    fn create(
        device: &wgpu::Device,
        label: &str,
        width: u32,
        height: u32,
        sample_count: u32,
        format: wgpu::TextureFormat,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}
