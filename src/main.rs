use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use relief::compiler::emit::Dialect;
use relief::compiler::{compile, CompileOptions, GRID_WORLD_SIZE};
use relief::heightmap::BackendKind;
use relief::pipeline::ReliefPipeline;
use relief::preset::{load_preset, ParamOverride, Preset};
use relief::terrace::FaceMode;

#[derive(Debug, Parser)]
#[command(name = "relief")]
#[command(about = "Node-graph heightfield compiler and terrace previewer")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("RELIEF_GIT_HASH"), ")"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the shader source generated for a preset.
    Compile {
        preset: PathBuf,
        #[arg(long, default_value = "wgsl")]
        dialect: Dialect,
        #[arg(long = "world-pos")]
        world_pos: bool,
        #[arg(long = "set", value_name = "NAME=VALUE")]
        overrides: Vec<ParamOverride>,
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// Load a preset and print graph diagnostics.
    Check { preset: PathBuf },
    /// Render the heightmap to a grayscale PNG.
    Render {
        #[command(flatten)]
        frame: FrameArgs,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
    },
    /// Print per-layer terrace instance counts as JSON.
    Terrace {
        #[command(flatten)]
        frame: FrameArgs,
        /// Wrap the grid around the six faces of a cube.
        #[arg(long)]
        cube: bool,
    },
    /// Bake a parameter across its range and print one shader digest per variant.
    Variations {
        preset: PathBuf,
        parameter: String,
        #[arg(long, default_value_t = 4)]
        count: usize,
    },
}

#[derive(Debug, Args)]
struct FrameArgs {
    preset: PathBuf,
    /// Elapsed seconds, before TIME speed scaling.
    #[arg(long, default_value_t = 0.0)]
    time: f32,
    #[arg(long)]
    resolution: Option<u32>,
    #[arg(long, default_value = "auto")]
    backend: BackendKind,
    /// Sample world-space positions; the extent is the preset's worldSize,
    /// or the default grid size when the preset has none.
    #[arg(long = "world-pos")]
    world_pos: bool,
    #[arg(long = "set", value_name = "NAME=VALUE")]
    overrides: Vec<ParamOverride>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Compile {
            preset,
            dialect,
            world_pos,
            overrides,
            output,
        } => run_compile(&preset, dialect, world_pos, &overrides, output.as_deref()),
        Commands::Check { preset } => run_check(&preset),
        Commands::Render { frame, output } => run_render(&frame, &output),
        Commands::Terrace { frame, cube } => run_terrace(&frame, cube),
        Commands::Variations {
            preset,
            parameter,
            count,
        } => run_variations(&preset, &parameter, count),
    }
}

fn load_with_overrides(path: &Path, overrides: &[ParamOverride]) -> Result<Preset> {
    let mut preset = load_preset(path)?;
    preset.apply_overrides(overrides)?;
    for diagnostic in preset.graph.diagnostics() {
        eprintln!("warning: {diagnostic}");
    }
    Ok(preset)
}

fn run_compile(
    preset_path: &Path,
    dialect: Dialect,
    world_pos: bool,
    overrides: &[ParamOverride],
    output: Option<&Path>,
) -> Result<()> {
    let preset = load_with_overrides(preset_path, overrides)?;
    let shader = compile(
        &preset.graph,
        &CompileOptions {
            use_world_pos: world_pos || preset.world_size.is_some(),
            dialect,
        },
    );

    match output {
        Some(path) => {
            fs::write(path, &shader.source)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("{} shader {} -> {}", dialect, &shader.digest()[..12], path.display());
        }
        None => print!("{}", shader.source),
    }
    Ok(())
}

fn run_check(preset_path: &Path) -> Result<()> {
    let preset = load_preset(preset_path)?;
    let diagnostics = preset.graph.diagnostics();

    println!(
        "OK: {} ({} nodes, {} connections, {} ramp stops)",
        preset.name,
        preset.graph.nodes.len(),
        preset.graph.connections.len(),
        preset.color_ramp.layer_count()
    );
    for (name, settings) in preset.graph.parameters() {
        println!(
            "Parameter {name}: {} in [{}, {}]",
            settings.value, settings.min, settings.max
        );
    }
    if diagnostics.is_empty() {
        println!("Diagnostics: none");
    } else {
        println!("Diagnostics: {}", diagnostics.len());
        for diagnostic in diagnostics {
            println!("  - {diagnostic}");
        }
    }
    Ok(())
}

fn build_pipeline(frame: &FrameArgs, faces: FaceMode) -> Result<ReliefPipeline> {
    let mut preset = load_with_overrides(&frame.preset, &frame.overrides)?;
    if let Some(resolution) = frame.resolution {
        preset.resolution = Some(resolution);
    }
    if frame.world_pos && preset.world_size.is_none() {
        preset.world_size = Some([GRID_WORLD_SIZE, GRID_WORLD_SIZE]);
    }
    let mut pipeline = ReliefPipeline::from_preset(&preset, frame.backend, faces)?;
    if let Some(generator) = pipeline.generator() {
        eprintln!(
            "{}: {}x{} on {}",
            preset.name,
            generator.resolution(),
            generator.resolution(),
            generator.backend_name()
        );
    }
    pipeline.frame(frame.time)?;
    Ok(pipeline)
}

fn run_render(frame: &FrameArgs, output: &Path) -> Result<()> {
    let pipeline = build_pipeline(frame, FaceMode::Single)?;
    let resolution = pipeline.resolution();
    let gray = pipeline
        .pixels()
        .chunks_exact(4)
        .map(|rgba| rgba[0])
        .collect::<Vec<_>>();

    let image = image::GrayImage::from_raw(resolution, resolution, gray)
        .ok_or_else(|| anyhow!("heightmap buffer does not match {resolution}x{resolution}"))?;
    image
        .save(output)
        .with_context(|| format!("failed to write {}", output.display()))?;

    println!("Wrote {}", output.display());
    Ok(())
}

fn run_terrace(frame: &FrameArgs, cube: bool) -> Result<()> {
    let faces = if cube { FaceMode::Cube } else { FaceMode::Single };
    let pipeline = build_pipeline(frame, faces)?;
    let stats = pipeline.mesh().stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

#[derive(Debug, Serialize)]
struct VariationSummary {
    value: f32,
    digest: String,
}

fn run_variations(preset_path: &Path, parameter: &str, count: usize) -> Result<()> {
    let preset = load_preset(preset_path)?;
    let options = CompileOptions {
        use_world_pos: preset.world_size.is_some(),
        ..CompileOptions::default()
    };
    let summaries = preset
        .variations(parameter, count)?
        .into_iter()
        .map(|variation| VariationSummary {
            value: variation.value,
            digest: compile(&variation.graph, &options).digest(),
        })
        .collect::<Vec<_>>();
    println!("{}", serde_json::to_string_pretty(&summaries)?);
    Ok(())
}
