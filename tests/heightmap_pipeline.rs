use std::path::PathBuf;

use relief::graph::{Connection, Graph, Node, NodeKind, WaveSettings, WaveType};
use relief::heightmap::{BackendKind, HeightmapConfig, HeightmapGenerator, ShaderUpdate};
use relief::pipeline::ReliefPipeline;
use relief::preset::load_preset;
use relief::terrace::{ColorRamp, FaceMode, TerraceConfig};

fn rings_graph() -> Graph {
    Graph::new(
        vec![
            Node::new("time", NodeKind::Time { speed: 1.0 }),
            Node::new(
                "wave",
                NodeKind::WaveTexture(WaveSettings {
                    wave_type: WaveType::Rings,
                    wave_scale: 5.0,
                    ..WaveSettings::default()
                }),
            ),
            Node::new("out", NodeKind::Output),
        ],
        vec![
            Connection::new("time", "value", "wave", "phase"),
            Connection::new("wave", "value", "out", "value"),
        ],
    )
}

fn software(resolution: u32) -> HeightmapConfig {
    HeightmapConfig {
        resolution,
        backend: BackendKind::Software,
        ..HeightmapConfig::default()
    }
}

fn red(pixels: &[u8], resolution: u32, i: u32, j: u32) -> u8 {
    pixels[((j * resolution + i) * 4) as usize]
}

#[test]
fn rings_render_is_centred_on_the_grid() {
    let mut generator = HeightmapGenerator::new(software(10)).expect("software generator");
    assert_eq!(
        generator.update_shader(&rings_graph(), None),
        ShaderUpdate::Installed
    );
    generator.update_uniforms(0.0);
    let pixels = generator.render().expect("render should succeed").to_vec();

    assert_eq!(pixels.len(), 400);
    assert_eq!(red(&pixels, 10, 5, 5), 128);
    assert_ne!(red(&pixels, 10, 0, 0), red(&pixels, 10, 5, 5));
    assert!(pixels.chunks(4).all(|px| px[0] == px[1] && px[1] == px[2] && px[3] == 255));
}

#[test]
fn rings_are_radially_symmetric() {
    let mut generator = HeightmapGenerator::new(software(8)).expect("software generator");
    generator.update_shader(&rings_graph(), None);
    let pixels = generator.render().expect("render should succeed").to_vec();

    // Cells 3 and 5 sit 1.25 units either side of the origin on each axis.
    assert_eq!(red(&pixels, 8, 3, 4), red(&pixels, 8, 5, 4));
    assert_eq!(red(&pixels, 8, 4, 3), red(&pixels, 8, 4, 5));
    assert_eq!(red(&pixels, 8, 3, 4), red(&pixels, 8, 4, 3));
    assert_eq!(red(&pixels, 8, 4, 4), 128);
}

#[test]
fn time_uniform_moves_the_pattern() {
    let mut generator = HeightmapGenerator::new(software(10)).expect("software generator");
    generator.update_shader(&rings_graph(), None);
    let at_zero = generator.render().expect("render").to_vec();
    generator.update_uniforms(0.25);
    let later = generator.render().expect("render").to_vec();

    assert_ne!(at_zero, later);
    // sin(2π · 0.25) = 1 at the origin.
    assert_eq!(red(&later, 10, 5, 5), 255);
    assert_eq!(generator.relink_count(), 1);
}

#[test]
fn resolution_change_disposes_then_rebuilds() {
    let mut pipeline = ReliefPipeline::new(
        rings_graph(),
        software(8),
        TerraceConfig::default(),
        ColorRamp::default(),
        FaceMode::Single,
    )
    .expect("pipeline");
    pipeline.frame(0.0).expect("first frame");
    assert_eq!(pipeline.pixels().len(), 8 * 8 * 4);

    pipeline.request_resolution(16).expect("resize");
    assert_eq!(pipeline.generators_created(), 2);
    assert_eq!(pipeline.generators_disposed(), 1);

    let report = pipeline.frame(0.0).expect("frame after resize");
    assert_eq!(report.shader, ShaderUpdate::Installed);
    assert_eq!(pipeline.pixels().len(), 16 * 16 * 4);
    assert_eq!(pipeline.mesh().config().resolution, 16);
    assert_eq!(report.instances, pipeline.mesh().active_count());

    assert!(pipeline.request_resolution(5000).is_err());
    assert_eq!(pipeline.resolution(), 16);
    assert_eq!(pipeline.generators_disposed(), 1);
}

#[test]
fn bundled_rings_preset_runs_end_to_end() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("presets/rings.yaml");
    let mut preset = load_preset(&path).expect("rings preset");
    preset.resolution = Some(10);

    let mut pipeline =
        ReliefPipeline::from_preset(&preset, BackendKind::Software, FaceMode::Single)
            .expect("pipeline");
    let report = pipeline.frame(0.0).expect("frame");

    assert_eq!(pipeline.pixels().len(), 400);
    assert_eq!(red(pipeline.pixels(), 10, 5, 5), 128);
    // Layer 0 is drawn for every cell.
    assert!(report.instances >= 100);
    assert_eq!(pipeline.mesh().layer_counts()[0], 100);
}
