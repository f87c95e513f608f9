//! Frame loop that ties a graph, a heightmap generator and a terrace mesh
//! together.
//!
//! Every frame runs shader update, uniform update, render, then terrace
//! rebuild, in that order, against one reusable pixel buffer. The pipeline
//! owns its generator: a resolution change disposes the old one before the
//! replacement is built, and dropping the pipeline disposes the current one.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use log::debug;

use crate::graph::Graph;
use crate::heightmap::{
    BackendKind, GpuContext, HeightmapConfig, HeightmapGenerator, ShaderUpdate,
};
use crate::preset::Preset;
use crate::terrace::{ColorRamp, FaceMode, TerraceConfig, TerraceMesh};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub shader: ShaderUpdate,
    /// Speed-scaled time written to the uniform this frame.
    pub time: f32,
    pub instances: usize,
}

pub struct ReliefPipeline {
    graph: Graph,
    gpu: Option<Arc<GpuContext>>,
    heightmap_config: HeightmapConfig,
    terrace_config: TerraceConfig,
    ramp: ColorRamp,
    faces: FaceMode,
    generator: Option<HeightmapGenerator>,
    mesh: TerraceMesh,
    elapsed: f32,
    frames: u64,
    generators_created: u64,
    generators_disposed: u64,
}

impl ReliefPipeline {
    pub fn new(
        graph: Graph,
        heightmap_config: HeightmapConfig,
        terrace_config: TerraceConfig,
        ramp: ColorRamp,
        faces: FaceMode,
    ) -> Result<Self> {
        heightmap_config.validate()?;
        let terrace_config = TerraceConfig {
            resolution: heightmap_config.resolution,
            ..terrace_config
        };
        let mesh = TerraceMesh::new(terrace_config, ramp.clone(), faces)?;
        let gpu = GpuContext::for_backend(heightmap_config.backend)?;
        let generator = HeightmapGenerator::with_context(heightmap_config, gpu.clone())?;

        Ok(Self {
            graph,
            gpu,
            heightmap_config,
            terrace_config,
            ramp,
            faces,
            generator: Some(generator),
            mesh,
            elapsed: 0.0,
            frames: 0,
            generators_created: 1,
            generators_disposed: 0,
        })
    }

    pub fn from_preset(preset: &Preset, backend: BackendKind, faces: FaceMode) -> Result<Self> {
        let heightmap_config = preset.heightmap_config(backend);
        let terrace_config = preset.terrace_config(heightmap_config.resolution);
        Self::new(
            preset.graph.clone(),
            heightmap_config,
            terrace_config,
            preset.color_ramp.clone(),
            faces,
        )
        .with_context(|| format!("failed to build pipeline for preset '{}'", preset.name))
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Replaces the graph snapshot; the next frame recompiles if the source changed.
    pub fn set_graph(&mut self, graph: Graph) {
        self.graph = graph;
    }

    pub fn resolution(&self) -> u32 {
        self.heightmap_config.resolution
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn generator(&self) -> Option<&HeightmapGenerator> {
        self.generator.as_ref()
    }

    pub fn mesh(&self) -> &TerraceMesh {
        &self.mesh
    }

    pub fn generators_created(&self) -> u64 {
        self.generators_created
    }

    pub fn generators_disposed(&self) -> u64 {
        self.generators_disposed
    }

    /// Swaps in a generator and mesh of the new size. A no-op when the
    /// resolution is unchanged.
    pub fn request_resolution(&mut self, resolution: u32) -> Result<()> {
        if resolution == self.heightmap_config.resolution && self.generator.is_some() {
            return Ok(());
        }

        let heightmap_config = HeightmapConfig {
            resolution,
            ..self.heightmap_config
        };
        heightmap_config.validate()?;
        let terrace_config = TerraceConfig {
            resolution,
            ..self.terrace_config
        };
        TerraceMesh::required_capacity(&terrace_config, &self.ramp, self.faces)?;

        self.dispose_generator();
        let generator = HeightmapGenerator::with_context(heightmap_config, self.gpu.clone())?;
        self.generators_created += 1;
        self.generator = Some(generator);
        self.mesh = TerraceMesh::new(terrace_config, self.ramp.clone(), self.faces)?;
        self.heightmap_config = heightmap_config;
        self.terrace_config = terrace_config;
        debug!("heightmap resolution changed to {resolution}");
        Ok(())
    }

    /// Advances time by `dt` seconds (scaled by the graph's TIME speed) and
    /// renders one frame.
    pub fn frame(&mut self, dt: f32) -> Result<FrameReport> {
        if dt.is_finite() {
            self.elapsed += dt * self.graph.time_speed();
        }
        self.render_current()
    }

    /// Renders at the current elapsed time without advancing it.
    pub fn render_current(&mut self) -> Result<FrameReport> {
        let generator = self
            .generator
            .as_mut()
            .ok_or_else(|| anyhow!("pipeline has no heightmap generator"))?;

        let shader = generator.update_shader(&self.graph, None);
        generator.update_uniforms(self.elapsed);
        let pixels = generator.render()?;
        let instances = self.mesh.update(pixels)?;
        self.frames += 1;

        Ok(FrameReport {
            shader,
            time: self.elapsed,
            instances,
        })
    }

    /// Last frame's heightmap bytes.
    pub fn pixels(&self) -> &[u8] {
        self.generator
            .as_ref()
            .map(HeightmapGenerator::pixels)
            .unwrap_or_default()
    }

    pub fn dispose(mut self) {
        self.dispose_generator();
    }

    fn dispose_generator(&mut self) {
        if let Some(generator) = self.generator.take() {
            generator.dispose();
            self.generators_disposed += 1;
        }
    }
}

impl Drop for ReliefPipeline {
    fn drop(&mut self) {
        self.dispose_generator();
    }
}
