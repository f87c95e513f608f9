//! Heightmap generator: runs a compiled program over every texel of an N×N
//! target and hands back the RGBA bytes synchronously.
//!
//! The GPU backend draws a fullscreen triangle into an off-screen
//! `Rgba8Unorm` texture and copies it into a mappable buffer; the software
//! backend evaluates the lowered program per texel with the interpreter.
//! Both sample texel `(i, j)` at UV `(i / N, j / N)`.

use std::str::FromStr;
use std::sync::{mpsc, Arc};

use anyhow::{anyhow, bail, Context, Result};
use bytemuck::{Pod, Zeroable};
use log::{debug, error, warn};
use wgpu::util::DeviceExt;

use crate::compiler::emit::{self, Dialect, GRID_WORLD_SIZE};
use crate::compiler::ir::{Program, ProgramResult};
use crate::compiler::{compile, CompileOptions, CompiledShader};
use crate::graph::Graph;
use crate::interpreter::{EvalContext, Sample};
use crate::vecmath::Vec3;

pub const MAX_RESOLUTION: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    Gpu,
    Software,
    /// GPU when an adapter is available, software otherwise.
    #[default]
    Auto,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gpu => "gpu",
            Self::Software => "software",
            Self::Auto => "auto",
        }
    }
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "gpu" => Ok(Self::Gpu),
            "software" | "cpu" => Ok(Self::Software),
            "auto" => Ok(Self::Auto),
            other => bail!("unknown backend '{other}' (expected gpu, software or auto)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeightmapConfig {
    pub resolution: u32,
    /// World-space extent sampled when `use_world_pos` is set.
    pub world_size: [f32; 2],
    pub use_world_pos: bool,
    pub backend: BackendKind,
}

impl Default for HeightmapConfig {
    fn default() -> Self {
        Self {
            resolution: 64,
            world_size: [GRID_WORLD_SIZE, GRID_WORLD_SIZE],
            use_world_pos: false,
            backend: BackendKind::Auto,
        }
    }
}

impl HeightmapConfig {
    pub fn validate(&self) -> Result<()> {
        if self.resolution == 0 || self.resolution > MAX_RESOLUTION {
            bail!(
                "heightmap resolution must be within 1..={MAX_RESOLUTION}, got {}",
                self.resolution
            );
        }
        for extent in self.world_size {
            if !extent.is_finite() || extent <= 0.0 {
                bail!("world size must be finite and positive, got {:?}", self.world_size);
            }
        }
        Ok(())
    }

    pub fn byte_len(&self) -> usize {
        let n = self.resolution as usize;
        n * n * 4
    }

    fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            use_world_pos: self.use_world_pos,
            dialect: Dialect::Wgsl,
        }
    }
}

/// Normalized UV sampled by texel `(i, j)`: the texel's top-left corner.
pub fn sample_uv(i: u32, j: u32, resolution: u32) -> [f32; 2] {
    let n = resolution as f32;
    [i as f32 / n, j as f32 / n]
}

/// Position the compiled program sees at texel `(i, j)`.
pub fn sample_position(i: u32, j: u32, config: &HeightmapConfig) -> Vec3 {
    let [u, v] = sample_uv(i, j, config.resolution);
    let [width, depth] = if config.use_world_pos {
        config.world_size
    } else {
        [GRID_WORLD_SIZE, GRID_WORLD_SIZE]
    };
    Vec3::new((u - 0.5) * width, (v - 0.5) * depth, 0.0)
}

/// Device and queue shared by every generator of a pipeline.
pub struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,
}

impl GpuContext {
    pub async fn new() -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .ok_or_else(|| anyhow!("no suitable GPU adapter found"))?;
        let adapter_name = adapter.get_info().name;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("relief-device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .context("failed to request wgpu device")?;

        Ok(Self {
            device,
            queue,
            adapter_name,
        })
    }

    pub fn blocking() -> Result<Arc<Self>> {
        pollster::block_on(Self::new()).map(Arc::new)
    }

    /// Resolves a backend choice to an optional device. `Auto` swallows the
    /// missing-adapter error and selects the software backend.
    pub fn for_backend(kind: BackendKind) -> Result<Option<Arc<Self>>> {
        match kind {
            BackendKind::Software => Ok(None),
            BackendKind::Gpu => Self::blocking().map(Some),
            BackendKind::Auto => match Self::blocking() {
                Ok(context) => Ok(Some(context)),
                Err(err) => {
                    warn!("falling back to software heightmaps: {err:#}");
                    Ok(None)
                }
            },
        }
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderUpdate {
    /// Same source as the installed program; nothing was rebuilt.
    Unchanged,
    Installed,
    /// The source failed to build (now or on an earlier call); the previous
    /// program stays active.
    Rejected,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable, PartialEq)]
struct Globals {
    time: f32,
    resolution: f32,
    world_size: [f32; 2],
}

pub struct HeightmapGenerator {
    config: HeightmapConfig,
    backend: Backend,
    installed_source: String,
    rejected_source: Option<String>,
    relinks: u64,
    build_failures: u64,
    time: f32,
    pixels: Vec<u8>,
}

enum Backend {
    Gpu(GpuTarget),
    Software(SoftwareTarget),
}

impl HeightmapGenerator {
    /// Builds a generator, creating a device when the backend asks for one.
    pub fn new(config: HeightmapConfig) -> Result<Self> {
        let gpu = GpuContext::for_backend(config.backend)?;
        Self::with_context(config, gpu)
    }

    /// Builds a generator on `gpu`, or on the software backend when `None`.
    /// A constant-zero placeholder program is installed until the first
    /// [`update_shader`](Self::update_shader).
    pub fn with_context(config: HeightmapConfig, gpu: Option<Arc<GpuContext>>) -> Result<Self> {
        config.validate()?;

        let placeholder = Program::constant(ProgramResult::Zero, config.use_world_pos);
        let placeholder_source = emit::render(&placeholder, Dialect::Wgsl);
        let backend = match gpu {
            Some(context) => Backend::Gpu(GpuTarget::new(context, &config, &placeholder_source)?),
            None => Backend::Software(SoftwareTarget {
                program: placeholder,
                context: EvalContext::new(),
            }),
        };

        let generator = Self {
            pixels: vec![0_u8; config.byte_len()],
            config,
            backend,
            installed_source: placeholder_source,
            rejected_source: None,
            relinks: 0,
            build_failures: 0,
            time: 0.0,
        };
        generator.update_gpu_uniforms();
        debug!(
            "heightmap generator ready: {}x{} on {}",
            config.resolution,
            config.resolution,
            generator.backend_name()
        );
        Ok(generator)
    }

    pub fn config(&self) -> &HeightmapConfig {
        &self.config
    }

    pub fn resolution(&self) -> u32 {
        self.config.resolution
    }

    pub fn is_gpu_backend(&self) -> bool {
        matches!(self.backend, Backend::Gpu(_))
    }

    pub fn backend_name(&self) -> String {
        match &self.backend {
            Backend::Gpu(target) => format!("gpu ({})", target.context.adapter_name()),
            Backend::Software(_) => "software".to_owned(),
        }
    }

    pub fn installed_source(&self) -> &str {
        &self.installed_source
    }

    /// Number of programs installed since construction.
    pub fn relink_count(&self) -> u64 {
        self.relinks
    }

    /// Number of builds that failed. Resubmitting a source that already
    /// failed does not count again.
    pub fn build_failures(&self) -> u64 {
        self.build_failures
    }

    /// Compiles `graph` (or takes `precompiled`) and installs it if the source
    /// differs from the installed one.
    pub fn update_shader(
        &mut self,
        graph: &Graph,
        precompiled: Option<&CompiledShader>,
    ) -> ShaderUpdate {
        let compiled;
        let shader = match precompiled {
            Some(shader) if shader.dialect == Dialect::Wgsl => shader,
            Some(shader) => {
                warn!(
                    "ignoring precompiled {} shader; heightmaps need wgsl",
                    shader.dialect
                );
                compiled = compile(graph, &self.config.compile_options());
                &compiled
            }
            None => {
                compiled = compile(graph, &self.config.compile_options());
                &compiled
            }
        };

        if shader.source == self.installed_source {
            return ShaderUpdate::Unchanged;
        }
        if self.rejected_source.as_deref() == Some(shader.source.as_str()) {
            return ShaderUpdate::Rejected;
        }

        let digest = shader.digest();
        let installed = match &mut self.backend {
            Backend::Gpu(target) => target.install(&shader.source),
            Backend::Software(target) => target.install(shader),
        };
        match installed {
            Ok(()) => {
                self.installed_source = shader.source.clone();
                self.rejected_source = None;
                self.relinks += 1;
                debug!("installed heightmap program {}", &digest[..12]);
                ShaderUpdate::Installed
            }
            Err(err) => {
                error!(
                    "heightmap program {} failed to build; keeping the previous program: {err:#}",
                    &digest[..12]
                );
                self.rejected_source = Some(shader.source.clone());
                self.build_failures += 1;
                ShaderUpdate::Rejected
            }
        }
    }

    /// Sets the time uniform. Callers pass time already scaled by the TIME
    /// node's speed.
    pub fn update_uniforms(&mut self, time: f32) {
        self.time = time;
        self.update_gpu_uniforms();
    }

    /// Renders one frame into the generator's reusable buffer
    /// (`4 × resolution²` bytes, row-major RGBA8). The buffer is overwritten
    /// by the next call.
    pub fn render(&mut self) -> Result<&[u8]> {
        match &mut self.backend {
            Backend::Gpu(target) => target.render(&mut self.pixels)?,
            Backend::Software(target) => {
                target.render(&self.config, self.time, &mut self.pixels)
            }
        }
        Ok(&self.pixels)
    }

    /// Last rendered frame.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Releases the render target, readback buffer and program.
    pub fn dispose(self) {
        debug!(
            "disposing {}x{} heightmap generator",
            self.config.resolution, self.config.resolution
        );
        drop(self);
    }

    fn update_gpu_uniforms(&self) {
        if let Backend::Gpu(target) = &self.backend {
            target.write_globals(&Globals {
                time: self.time,
                resolution: self.config.resolution as f32,
                world_size: self.config.world_size,
            });
        }
    }
}

struct SoftwareTarget {
    program: Program,
    context: EvalContext,
}

impl SoftwareTarget {
    /// The interpreter runs the lowered program, so the source must be exactly
    /// that program's rendering.
    fn install(&mut self, shader: &CompiledShader) -> Result<()> {
        if emit::render(&shader.program, Dialect::Wgsl) != shader.source {
            bail!("shader source does not match its lowered program");
        }
        self.program = shader.program.clone();
        Ok(())
    }

    fn render(&mut self, config: &HeightmapConfig, time: f32, pixels: &mut [u8]) {
        let n = config.resolution;
        for j in 0..n {
            for i in 0..n {
                let sample = Sample {
                    time,
                    position: sample_position(i, j, config),
                };
                let rgba = self.context.eval_rgba(&self.program, &sample);
                let offset = ((j * n + i) * 4) as usize;
                for (dst, channel) in pixels[offset..offset + 4].iter_mut().zip(rgba) {
                    *dst = unorm8(channel);
                }
            }
        }
    }
}

/// Float to `Rgba8Unorm` the way the GPU stores it: clamp, scale, round.
pub fn unorm8(value: f32) -> u8 {
    if value.is_nan() {
        return 0;
    }
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

struct GpuTarget {
    context: Arc<GpuContext>,
    width: u32,
    output_texture: wgpu::Texture,
    output_view: wgpu::TextureView,
    readback_buffer: wgpu::Buffer,
    unpadded_bytes_per_row: u32,
    padded_bytes_per_row: u32,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    pipeline_layout: wgpu::PipelineLayout,
    pipeline: wgpu::RenderPipeline,
}

impl GpuTarget {
    fn new(context: Arc<GpuContext>, config: &HeightmapConfig, source: &str) -> Result<Self> {
        let device = &context.device;
        let width = config.resolution;

        let output_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("relief-heightmap-target"),
            size: wgpu::Extent3d {
                width,
                height: width,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let output_view = output_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let unpadded_bytes_per_row = width
            .checked_mul(4)
            .ok_or_else(|| anyhow!("heightmap width overflow when computing row bytes"))?;
        let padded_bytes_per_row =
            align_to(unpadded_bytes_per_row, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let readback_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("relief-heightmap-readback"),
            size: u64::from(padded_bytes_per_row) * u64::from(width),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("relief-heightmap-globals"),
            contents: bytemuck::bytes_of(&Globals::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("relief-heightmap-bind-group-layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<Globals>() as u64),
                },
                count: None,
            }],
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("relief-heightmap-bind-group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("relief-heightmap-pipeline-layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = build_pipeline(device, &pipeline_layout, source)
            .context("placeholder heightmap program failed to build")?;

        Ok(Self {
            context,
            width,
            output_texture,
            output_view,
            readback_buffer,
            unpadded_bytes_per_row,
            padded_bytes_per_row,
            uniform_buffer,
            bind_group,
            pipeline_layout,
            pipeline,
        })
    }

    fn install(&mut self, source: &str) -> Result<()> {
        self.pipeline = build_pipeline(&self.context.device, &self.pipeline_layout, source)?;
        Ok(())
    }

    fn write_globals(&self, globals: &Globals) {
        self.context
            .queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(globals));
    }

    fn render(&mut self, pixels: &mut [u8]) -> Result<()> {
        let device = &self.context.device;
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("relief-heightmap-encoder"),
        });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("relief-heightmap-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.output_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            render_pass.set_pipeline(&self.pipeline);
            render_pass.set_bind_group(0, &self.bind_group, &[]);
            render_pass.draw(0..3, 0..1);
        }

        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.output_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &self.readback_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_bytes_per_row),
                    rows_per_image: Some(self.width),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.width,
                depth_or_array_layers: 1,
            },
        );
        self.context.queue.submit(Some(encoder.finish()));

        let buffer_slice = self.readback_buffer.slice(..);
        let (sender, receiver) = mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        device.poll(wgpu::Maintain::Wait);

        receiver
            .recv()
            .map_err(|_| anyhow!("failed receiving GPU map callback"))?
            .context("GPU buffer mapping failed")?;

        let row_bytes = self.unpadded_bytes_per_row as usize;
        {
            let mapped = buffer_slice.get_mapped_range();
            for (row_index, chunk) in mapped
                .chunks(self.padded_bytes_per_row as usize)
                .take(self.width as usize)
                .enumerate()
            {
                let dst_start = row_index * row_bytes;
                pixels[dst_start..dst_start + row_bytes].copy_from_slice(&chunk[..row_bytes]);
            }
        }
        self.readback_buffer.unmap();
        Ok(())
    }
}

impl Drop for GpuTarget {
    fn drop(&mut self) {
        self.output_texture.destroy();
        self.readback_buffer.destroy();
        self.uniform_buffer.destroy();
    }
}

/// Builds the fullscreen pipeline for `source`, capturing validation errors
/// instead of letting them reach the device's uncaptured-error handler.
fn build_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    source: &str,
) -> Result<wgpu::RenderPipeline> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("relief-heightmap-shader"),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("relief-heightmap-pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: &module,
            entry_point: "vs_main",
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &module,
            entry_point: "fs_main",
            targets: &[Some(wgpu::ColorTargetState {
                format: wgpu::TextureFormat::Rgba8Unorm,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
    });

    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        bail!("shader rejected by the device: {err}");
    }
    Ok(pipeline)
}

fn align_to(value: u32, alignment: u32) -> u32 {
    let mask = alignment - 1;
    (value + mask) & !mask
}
