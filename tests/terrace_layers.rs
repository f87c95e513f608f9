use relief::graph::{Connection, Graph, Node, NodeKind};
use relief::heightmap::{BackendKind, HeightmapConfig};
use relief::pipeline::ReliefPipeline;
use relief::terrace::{ColorRamp, ColorStop, FaceMode, TerraceConfig, TerraceMesh};

fn constant_graph(value: f32) -> Graph {
    Graph::new(
        vec![
            Node::new("height", NodeKind::Value { value }),
            Node::new("out", NodeKind::Output),
        ],
        vec![Connection::new("height", "value", "out", "value")],
    )
}

fn pipeline(value: f32, faces: FaceMode) -> ReliefPipeline {
    ReliefPipeline::new(
        constant_graph(value),
        HeightmapConfig {
            resolution: 4,
            backend: BackendKind::Software,
            ..HeightmapConfig::default()
        },
        TerraceConfig::default(),
        ColorRamp::default(),
        faces,
    )
    .expect("software pipeline")
}

#[test]
fn flat_field_draws_the_same_layers_everywhere() {
    let mut flat = pipeline(0.6, FaceMode::Single);
    let report = flat.frame(0.0).expect("frame");

    // 0.6 reaches the 0.25 and 0.5 stops but not 0.75.
    assert_eq!(report.instances, 16 * 3);
    assert_eq!(flat.mesh().layer_counts(), &[16, 16, 16, 0]);
    assert_eq!(flat.mesh().instances().len(), report.instances);
    assert_eq!(flat.mesh().capacity(), 16 * 4);
}

#[test]
fn zero_field_still_draws_the_base_layer() {
    let mut low = pipeline(0.0, FaceMode::Single);
    assert_eq!(low.frame(0.0).expect("frame").instances, 16);

    let mut negative = pipeline(-4.0, FaceMode::Single);
    assert_eq!(negative.frame(0.0).expect("frame").instances, 16);
}

#[test]
fn cube_wrap_repeats_the_grid_on_six_faces() {
    let mut cube = pipeline(1.0, FaceMode::Cube);
    let report = cube.frame(0.0).expect("frame");
    assert_eq!(report.instances, 6 * 16 * 4);

    let stats = cube.mesh().stats();
    let json = serde_json::to_value(&stats).expect("stats serialize");
    assert_eq!(json["faces"], "cube");
    assert_eq!(json["active_instances"], 384);
    assert_eq!(json["layers"][3]["instances"], 96);
    assert_eq!(json["layers"][0]["color"], "#1b263b");
}

#[test]
fn raising_the_field_only_adds_layers() {
    let ramp = ColorRamp::new(vec![
        ColorStop::new(0.0, [0.0, 0.0, 0.0]),
        ColorStop::new(0.3, [0.3, 0.3, 0.3]),
        ColorStop::new(0.6, [0.6, 0.6, 0.6]),
    ])
    .expect("ramp");
    let mut mesh = TerraceMesh::new(
        TerraceConfig {
            resolution: 1,
            ..TerraceConfig::default()
        },
        ramp,
        FaceMode::Single,
    )
    .expect("mesh");

    let mut previous = 0;
    for red in (0..=255_u8).step_by(5) {
        let drawn = mesh.update(&[red, red, red, 255]).expect("update");
        assert!(drawn >= previous, "{red}: {drawn} < {previous}");
        previous = drawn;
    }
    assert_eq!(previous, 3);
    assert!(mesh.update(&[0; 8]).is_err());
}

#[test]
fn graph_swap_rebuilds_the_terrace_next_frame() {
    let mut relief = pipeline(0.0, FaceMode::Single);
    assert_eq!(relief.frame(0.0).expect("frame").instances, 16);
    relief.set_graph(constant_graph(1.0));
    assert_eq!(relief.frame(0.0).expect("frame").instances, 64);
}

#[test]
fn oversized_resolution_fails_without_losing_the_generator() {
    let mut cube = pipeline(0.5, FaceMode::Cube);
    cube.frame(0.0).expect("frame");

    assert!(cube.request_resolution(relief::heightmap::MAX_RESOLUTION).is_err());
    assert_eq!(cube.resolution(), 4);
    assert_eq!(cube.generators_disposed(), 0);
    assert!(cube.frame(0.0).is_ok());

    let oversized = ReliefPipeline::new(
        constant_graph(0.5),
        HeightmapConfig {
            resolution: relief::heightmap::MAX_RESOLUTION,
            backend: BackendKind::Software,
            ..HeightmapConfig::default()
        },
        TerraceConfig::default(),
        ColorRamp::default(),
        FaceMode::Cube,
    );
    assert!(oversized.is_err());
}
