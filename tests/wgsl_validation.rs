use relief::compiler::{compile, CompileOptions, Dialect};
use relief::graph::{
    Connection, Graph, MathOperation, Node, NodeKind, ParameterSettings, VectorMathOperation,
    WaveSettings, WaveType,
};

fn validate_wgsl(source: &str) -> Result<(), String> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|error| error.emit_to_string(source))?;
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map(|_| ())
    .map_err(|error| format!("{error:?}"))
}

/// Touches every node type: POSITION feeds SEPARATE_XYZ, whose components
/// feed COMBINE_XYZ and MATH; the scalar MATH result is broadcast into
/// VECTOR_MATH, which drives a WAVE_TEXTURE that sums with a NOISE_TEXTURE.
fn every_node_graph(math: MathOperation, vector_math: VectorMathOperation) -> Graph {
    Graph::new(
        vec![
            Node::new("time", NodeKind::Time { speed: 1.0 }),
            Node::new("pos", NodeKind::Position),
            Node::new("sep", NodeKind::SeparateXyz),
            Node::new("comb", NodeKind::CombineXyz { x: 0.0, y: 0.0, z: -1.5 }),
            Node::new(
                "offset",
                NodeKind::Vector {
                    x: 1.0,
                    y: -2.0,
                    z: 0.5,
                },
            ),
            Node::new(
                "gain",
                NodeKind::Parameter(ParameterSettings {
                    name: "gain".to_owned(),
                    value: 0.75,
                    min: 0.0,
                    max: 2.0,
                    default: 0.75,
                    step: 0.05,
                }),
            ),
            Node::new("noise", NodeKind::NoiseTexture { scale: 2.0 }),
            Node::new(
                "m",
                NodeKind::Math {
                    operation: math,
                    value: -3.0,
                },
            ),
            Node::new(
                "vm",
                NodeKind::VectorMath {
                    operation: vector_math,
                    scale: 2.0,
                },
            ),
            Node::new(
                "wave",
                NodeKind::WaveTexture(WaveSettings {
                    wave_type: WaveType::Rings,
                    distortion: 0.5,
                    detail: 3,
                    ..WaveSettings::default()
                }),
            ),
            Node::new(
                "sum",
                NodeKind::Math {
                    operation: MathOperation::Add,
                    value: 0.0,
                },
            ),
            Node::new("out", NodeKind::Output),
        ],
        vec![
            Connection::new("pos", "vector", "sep", "vector"),
            Connection::new("sep", "x", "comb", "x"),
            Connection::new("time", "value", "comb", "y"),
            Connection::new("sep", "y", "m", "a"),
            Connection::new("noise", "value", "m", "b"),
            Connection::new("comb", "vector", "noise", "vector"),
            Connection::new("m", "value", "vm", "a"),
            Connection::new("offset", "vector", "vm", "b"),
            Connection::new("gain", "value", "vm", "scale"),
            Connection::new("vm", "vector", "wave", "vector"),
            Connection::new("vm", "value", "wave", "phase"),
            Connection::new("wave", "value", "sum", "a"),
            Connection::new("sep", "z", "sum", "b"),
            Connection::new("sum", "value", "out", "value"),
        ],
    )
}

#[test]
fn every_operator_pair_emits_valid_wgsl() {
    let mut failures = Vec::new();
    for use_world_pos in [false, true] {
        let options = CompileOptions {
            use_world_pos,
            dialect: Dialect::Wgsl,
        };
        for math in MathOperation::ALL {
            for vector_math in VectorMathOperation::ALL {
                let shader = compile(&every_node_graph(math, vector_math), &options);
                if let Err(error) = validate_wgsl(&shader.source) {
                    failures.push(format!(
                        "{math:?} x {vector_math:?} (world_pos={use_world_pos}): {error}"
                    ));
                }
            }
        }
    }
    assert!(failures.is_empty(), "{}", failures.join("\n"));
}

#[test]
fn degraded_programs_emit_valid_wgsl() {
    let no_output = Graph::new(vec![Node::new("t", NodeKind::Time { speed: 1.0 })], vec![]);
    let unconnected = Graph::new(vec![Node::new("out", NodeKind::Output)], vec![]);
    let cycle = Graph::new(
        vec![
            Node::new(
                "a",
                NodeKind::Math {
                    operation: MathOperation::Add,
                    value: 1.0,
                },
            ),
            Node::new(
                "b",
                NodeKind::Math {
                    operation: MathOperation::Multiply,
                    value: 2.0,
                },
            ),
            Node::new("out", NodeKind::Output),
        ],
        vec![
            Connection::new("a", "value", "b", "a"),
            Connection::new("b", "value", "a", "a"),
            Connection::new("b", "value", "out", "value"),
        ],
    );

    for graph in [no_output, unconnected, cycle] {
        for use_world_pos in [false, true] {
            let shader = compile(
                &graph,
                &CompileOptions {
                    use_world_pos,
                    dialect: Dialect::Wgsl,
                },
            );
            validate_wgsl(&shader.source).unwrap_or_else(|error| panic!("{error}\n{}", shader.source));
        }
    }
}
