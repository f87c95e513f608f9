//! Pattern graph data model.
//!
//! The editor hands us loosely typed records (`{id, type, data, inputs, x, y}`)
//! whose valid `data` fields depend on the node type. Loading converts every
//! record into a [`NodeKind`] variant that carries only its own typed
//! configuration, so nothing downstream has to guess at optional fields.
//! Loading never fails on malformed content: unknown enum strings fall back to
//! a documented default and are recorded as [`GraphDiagnostic`]s.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use serde::Deserialize;
use serde_json::Value;

// ---------------------------------------------------------------------------
// Node types and typed configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Time,
    Value,
    Vector,
    Position,
    CombineXyz,
    SeparateXyz,
    Math,
    VectorMath,
    WaveTexture,
    NoiseTexture,
    Parameter,
    Output,
}

impl NodeType {
    pub fn parse(raw: &str) -> Option<Self> {
        let node_type = match raw.trim().to_ascii_uppercase().as_str() {
            "TIME" => Self::Time,
            "VALUE" => Self::Value,
            "VECTOR" => Self::Vector,
            "POSITION" => Self::Position,
            "COMBINE_XYZ" => Self::CombineXyz,
            "SEPARATE_XYZ" => Self::SeparateXyz,
            "MATH" => Self::Math,
            "VECTOR_MATH" => Self::VectorMath,
            "WAVE_TEXTURE" => Self::WaveTexture,
            "NOISE_TEXTURE" => Self::NoiseTexture,
            "PARAMETER" => Self::Parameter,
            "OUTPUT" => Self::Output,
            _ => return None,
        };
        Some(node_type)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Time => "TIME",
            Self::Value => "VALUE",
            Self::Vector => "VECTOR",
            Self::Position => "POSITION",
            Self::CombineXyz => "COMBINE_XYZ",
            Self::SeparateXyz => "SEPARATE_XYZ",
            Self::Math => "MATH",
            Self::VectorMath => "VECTOR_MATH",
            Self::WaveTexture => "WAVE_TEXTURE",
            Self::NoiseTexture => "NOISE_TEXTURE",
            Self::Parameter => "PARAMETER",
            Self::Output => "OUTPUT",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enum-valued node settings that are parsed leniently from editor strings.
pub trait Variant: Sized + Copy + Default {
    const LABEL: &'static str;

    fn parse(raw: &str) -> Option<Self>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MathOperation {
    #[default]
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
    Sqrt,
    Absolute,
    Floor,
    Ceil,
    Round,
    Fract,
    Modulo,
    Minimum,
    Maximum,
    Sign,
    Sine,
    Cosine,
    Tangent,
}

impl Variant for MathOperation {
    const LABEL: &'static str = "math operation";

    fn parse(raw: &str) -> Option<Self> {
        let op = match raw.trim().to_ascii_uppercase().as_str() {
            "ADD" => Self::Add,
            "SUBTRACT" | "SUB" => Self::Subtract,
            "MULTIPLY" | "MUL" => Self::Multiply,
            "DIVIDE" | "DIV" => Self::Divide,
            "POWER" | "POW" => Self::Power,
            "SQRT" => Self::Sqrt,
            "ABSOLUTE" | "ABS" => Self::Absolute,
            "FLOOR" => Self::Floor,
            "CEIL" => Self::Ceil,
            "ROUND" => Self::Round,
            "FRACT" | "FRACTION" => Self::Fract,
            "MODULO" | "MOD" => Self::Modulo,
            "MINIMUM" | "MIN" => Self::Minimum,
            "MAXIMUM" | "MAX" => Self::Maximum,
            "SIGN" => Self::Sign,
            "SINE" | "SIN" => Self::Sine,
            "COSINE" | "COS" => Self::Cosine,
            "TANGENT" | "TAN" => Self::Tangent,
            _ => return None,
        };
        Some(op)
    }
}

impl MathOperation {
    pub const ALL: [MathOperation; 18] = [
        Self::Add,
        Self::Subtract,
        Self::Multiply,
        Self::Divide,
        Self::Power,
        Self::Sqrt,
        Self::Absolute,
        Self::Floor,
        Self::Ceil,
        Self::Round,
        Self::Fract,
        Self::Modulo,
        Self::Minimum,
        Self::Maximum,
        Self::Sign,
        Self::Sine,
        Self::Cosine,
        Self::Tangent,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VectorMathOperation {
    #[default]
    Add,
    Subtract,
    Multiply,
    Divide,
    Scale,
    CrossProduct,
    DotProduct,
    Length,
    Distance,
    Normalize,
    Floor,
    Ceil,
    Fraction,
    Absolute,
    Minimum,
    Maximum,
    Sine,
    Cosine,
    Tangent,
}

impl Variant for VectorMathOperation {
    const LABEL: &'static str = "vector math operation";

    fn parse(raw: &str) -> Option<Self> {
        let op = match raw.trim().to_ascii_uppercase().as_str() {
            "ADD" => Self::Add,
            "SUBTRACT" | "SUB" => Self::Subtract,
            "MULTIPLY" | "MUL" => Self::Multiply,
            "DIVIDE" | "DIV" => Self::Divide,
            "SCALE" => Self::Scale,
            "CROSS_PRODUCT" | "CROSS" => Self::CrossProduct,
            "DOT_PRODUCT" | "DOT" => Self::DotProduct,
            "LENGTH" => Self::Length,
            "DISTANCE" => Self::Distance,
            "NORMALIZE" => Self::Normalize,
            "FLOOR" => Self::Floor,
            "CEIL" => Self::Ceil,
            "FRACTION" | "FRACT" => Self::Fraction,
            "ABSOLUTE" | "ABS" => Self::Absolute,
            "MINIMUM" | "MIN" => Self::Minimum,
            "MAXIMUM" | "MAX" => Self::Maximum,
            "SINE" | "SIN" => Self::Sine,
            "COSINE" | "COS" => Self::Cosine,
            "TANGENT" | "TAN" => Self::Tangent,
            _ => return None,
        };
        Some(op)
    }
}

impl VectorMathOperation {
    pub const ALL: [VectorMathOperation; 19] = [
        Self::Add,
        Self::Subtract,
        Self::Multiply,
        Self::Divide,
        Self::Scale,
        Self::CrossProduct,
        Self::DotProduct,
        Self::Length,
        Self::Distance,
        Self::Normalize,
        Self::Floor,
        Self::Ceil,
        Self::Fraction,
        Self::Absolute,
        Self::Minimum,
        Self::Maximum,
        Self::Sine,
        Self::Cosine,
        Self::Tangent,
    ];

    /// Operators whose natural result is a scalar.
    pub fn is_scalar_result(self) -> bool {
        matches!(self, Self::DotProduct | Self::Length | Self::Distance)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WaveType {
    #[default]
    Bands,
    Rings,
}

impl Variant for WaveType {
    const LABEL: &'static str = "wave type";

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "BANDS" => Some(Self::Bands),
            "RINGS" => Some(Self::Rings),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WaveDirection {
    #[default]
    X,
    Y,
    Z,
    Diagonal,
}

impl Variant for WaveDirection {
    const LABEL: &'static str = "wave direction";

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "X" => Some(Self::X),
            "Y" => Some(Self::Y),
            "Z" => Some(Self::Z),
            "DIAGONAL" => Some(Self::Diagonal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WaveProfile {
    #[default]
    Sine,
    Saw,
}

impl Variant for WaveProfile {
    const LABEL: &'static str = "wave profile";

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SINE" | "SIN" => Some(Self::Sine),
            "SAW" => Some(Self::Saw),
            _ => None,
        }
    }
}

pub const MAX_WAVE_DETAIL: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveSettings {
    pub wave_type: WaveType,
    pub direction: WaveDirection,
    pub profile: WaveProfile,
    pub wave_scale: f32,
    pub distortion: f32,
    /// Octave count, always within `0..=MAX_WAVE_DETAIL`.
    pub detail: u32,
    pub detail_scale: f32,
    pub detail_roughness: f32,
}

impl Default for WaveSettings {
    fn default() -> Self {
        Self {
            wave_type: WaveType::Bands,
            direction: WaveDirection::X,
            profile: WaveProfile::Sine,
            wave_scale: 5.0,
            distortion: 0.0,
            detail: 0,
            detail_scale: 1.0,
            detail_roughness: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSettings {
    pub name: String,
    pub value: f32,
    pub min: f32,
    pub max: f32,
    pub default: f32,
    pub step: f32,
}

impl ParameterSettings {
    /// Clamps into `[min, max]` when the range is well formed.
    pub fn clamp_value(&self, value: f32) -> f32 {
        if self.min <= self.max {
            value.clamp(self.min, self.max)
        } else {
            value
        }
    }
}

/// One node's typed configuration. Each variant carries only its own fields.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Time { speed: f32 },
    Value { value: f32 },
    Vector { x: f32, y: f32, z: f32 },
    Position,
    CombineXyz { x: f32, y: f32, z: f32 },
    SeparateXyz,
    Math { operation: MathOperation, value: f32 },
    VectorMath { operation: VectorMathOperation, scale: f32 },
    WaveTexture(WaveSettings),
    NoiseTexture { scale: f32 },
    Parameter(ParameterSettings),
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketType {
    Scalar,
    Vector,
}

impl NodeKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Time { .. } => NodeType::Time,
            Self::Value { .. } => NodeType::Value,
            Self::Vector { .. } => NodeType::Vector,
            Self::Position => NodeType::Position,
            Self::CombineXyz { .. } => NodeType::CombineXyz,
            Self::SeparateXyz => NodeType::SeparateXyz,
            Self::Math { .. } => NodeType::Math,
            Self::VectorMath { .. } => NodeType::VectorMath,
            Self::WaveTexture(_) => NodeType::WaveTexture,
            Self::NoiseTexture { .. } => NodeType::NoiseTexture,
            Self::Parameter(_) => NodeType::Parameter,
            Self::Output => NodeType::Output,
        }
    }

    /// Output sockets in emission order, with the kind of value each produces.
    pub fn outputs(&self) -> &'static [(&'static str, SocketType)] {
        match self {
            Self::Time { .. }
            | Self::Value { .. }
            | Self::Parameter(_)
            | Self::Math { .. }
            | Self::WaveTexture(_)
            | Self::NoiseTexture { .. } => &[("value", SocketType::Scalar)],
            Self::Vector { .. } | Self::Position | Self::CombineXyz { .. } => {
                &[("vector", SocketType::Vector)]
            }
            Self::SeparateXyz => &[
                ("x", SocketType::Scalar),
                ("y", SocketType::Scalar),
                ("z", SocketType::Scalar),
            ],
            Self::VectorMath { .. } => {
                &[("vector", SocketType::Vector), ("value", SocketType::Scalar)]
            }
            Self::Output => &[],
        }
    }

    /// Kind produced by `socket`. Unknown socket names fall back to the
    /// node's primary output; sockets literally named x/y/z are scalar.
    pub fn output_type(&self, socket: &str) -> Option<SocketType> {
        let outputs = self.outputs();
        if let Some((_, socket_type)) = outputs.iter().find(|(name, _)| *name == socket) {
            return Some(*socket_type);
        }
        if matches!(socket, "x" | "y" | "z") {
            return Some(SocketType::Scalar);
        }
        outputs.first().map(|(_, socket_type)| *socket_type)
    }

    /// Inputs this node reads, with the kind each expects.
    pub fn inputs(&self) -> &'static [(&'static str, SocketType)] {
        match self {
            Self::CombineXyz { .. } => &[
                ("x", SocketType::Scalar),
                ("y", SocketType::Scalar),
                ("z", SocketType::Scalar),
            ],
            Self::SeparateXyz => &[("vector", SocketType::Vector)],
            Self::Math { .. } => &[("a", SocketType::Scalar), ("b", SocketType::Scalar)],
            Self::VectorMath { .. } => &[
                ("a", SocketType::Vector),
                ("b", SocketType::Vector),
                ("scale", SocketType::Scalar),
            ],
            Self::WaveTexture(_) => &[("vector", SocketType::Vector), ("phase", SocketType::Scalar)],
            Self::NoiseTexture { .. } => {
                &[("vector", SocketType::Vector), ("scale", SocketType::Scalar)]
            }
            Self::Output => &[("value", SocketType::Scalar)],
            Self::Time { .. }
            | Self::Value { .. }
            | Self::Vector { .. }
            | Self::Position
            | Self::Parameter(_) => &[],
        }
    }

    pub fn input_type(&self, socket: &str) -> Option<SocketType> {
        self.inputs()
            .iter()
            .find(|(name, _)| *name == socket)
            .map(|(_, socket_type)| *socket_type)
    }
}

// ---------------------------------------------------------------------------
// Nodes, connections, graph
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    /// Editor bookkeeping: input socket -> connection id. Not used for evaluation.
    pub inputs: BTreeMap<String, Option<String>>,
    pub x: f32,
    pub y: f32,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            inputs: BTreeMap::new(),
            x: 0.0,
            y: 0.0,
        }
    }

    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    #[serde(default)]
    pub id: String,
    pub from_node: String,
    pub from_socket: String,
    pub to_node: String,
    pub to_socket: String,
}

impl Connection {
    pub fn new(
        from_node: impl Into<String>,
        from_socket: impl Into<String>,
        to_node: impl Into<String>,
        to_socket: impl Into<String>,
    ) -> Self {
        let from_node = from_node.into();
        let from_socket = from_socket.into();
        let to_node = to_node.into();
        let to_socket = to_socket.into();
        Self {
            id: format!("{from_node}.{from_socket}->{to_node}.{to_socket}"),
            from_node,
            from_socket,
            to_node,
            to_socket,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GraphDiagnostic {
    MissingOutput,
    MultipleOutputs { ids: Vec<String> },
    UnconnectedOutput { id: String },
    DanglingConnection { id: String },
    DuplicateInput { node: String, socket: String, ignored: String },
    DuplicateNodeId { id: String },
    UnknownNodeType { id: String, raw: String },
    UnknownVariant { node: String, label: &'static str, raw: String },
}

impl fmt::Display for GraphDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingOutput => write!(f, "graph has no OUTPUT node"),
            Self::MultipleOutputs { ids } => {
                write!(f, "graph has {} OUTPUT nodes ({}); using the first", ids.len(), ids.join(", "))
            }
            Self::UnconnectedOutput { id } => {
                write!(f, "OUTPUT node '{id}' has no connection on 'value'")
            }
            Self::DanglingConnection { id } => {
                write!(f, "connection '{id}' references a missing node and is ignored")
            }
            Self::DuplicateInput {
                node,
                socket,
                ignored,
            } => write!(
                f,
                "input '{node}.{socket}' has more than one connection; '{ignored}' is ignored"
            ),
            Self::DuplicateNodeId { id } => {
                write!(f, "node id '{id}' is used more than once; the first wins")
            }
            Self::UnknownNodeType { id, raw } => {
                write!(f, "node '{id}' has unknown type '{raw}' and is skipped")
            }
            Self::UnknownVariant { node, label, raw } => {
                write!(f, "node '{node}' has unknown {label} '{raw}'; using the default")
            }
        }
    }
}

/// Immutable node/connection snapshot, as supplied once per compilation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "GraphRecord")]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub connections: Vec<Connection>,
    load_issues: Vec<GraphDiagnostic>,
}

impl Graph {
    pub fn new(nodes: Vec<Node>, connections: Vec<Connection>) -> Self {
        Self {
            nodes,
            connections,
            load_issues: Vec::new(),
        }
    }

    /// Builds a graph from editor records, degrading malformed content.
    pub fn from_records(nodes: Vec<NodeRecord>, connections: Vec<Connection>) -> Self {
        let mut load_issues = Vec::new();
        let nodes = nodes
            .into_iter()
            .filter_map(|record| record.into_node(&mut load_issues))
            .collect();
        Self {
            nodes,
            connections,
            load_issues,
        }
    }

    /// First node carrying `id`.
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// The compilation sink: the first OUTPUT node in array order.
    pub fn output_node(&self) -> Option<&Node> {
        self.nodes
            .iter()
            .find(|node| node.node_type() == NodeType::Output)
    }

    /// Speed factor of the first TIME node, applied by callers to elapsed time.
    pub fn time_speed(&self) -> f32 {
        self.nodes
            .iter()
            .find_map(|node| match node.kind {
                NodeKind::Time { speed } if speed.is_finite() => Some(speed),
                _ => None,
            })
            .unwrap_or(1.0)
    }

    pub fn parameters(&self) -> impl Iterator<Item = (&str, &ParameterSettings)> {
        self.nodes.iter().filter_map(|node| match &node.kind {
            NodeKind::Parameter(settings) => Some((node.id.as_str(), settings)),
            _ => None,
        })
    }

    /// Everything that is degraded rather than rejected, in a stable order.
    pub fn diagnostics(&self) -> Vec<GraphDiagnostic> {
        let mut diagnostics = self.load_issues.clone();

        let mut seen_ids = HashSet::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if !seen_ids.insert(node.id.as_str()) {
                diagnostics.push(GraphDiagnostic::DuplicateNodeId {
                    id: node.id.clone(),
                });
            }
        }

        let outputs = self
            .nodes
            .iter()
            .filter(|node| node.node_type() == NodeType::Output)
            .map(|node| node.id.clone())
            .collect::<Vec<_>>();
        match outputs.len() {
            0 => diagnostics.push(GraphDiagnostic::MissingOutput),
            1 => {}
            _ => diagnostics.push(GraphDiagnostic::MultipleOutputs {
                ids: outputs.clone(),
            }),
        }

        let mut targeted: HashMap<(&str, &str), &str> = HashMap::new();
        for connection in &self.connections {
            if !self.is_resolvable(connection) {
                diagnostics.push(GraphDiagnostic::DanglingConnection {
                    id: connection.id.clone(),
                });
                continue;
            }
            let key = (connection.to_node.as_str(), connection.to_socket.as_str());
            if targeted.contains_key(&key) {
                diagnostics.push(GraphDiagnostic::DuplicateInput {
                    node: connection.to_node.clone(),
                    socket: connection.to_socket.clone(),
                    ignored: connection.id.clone(),
                });
            } else {
                targeted.insert(key, connection.id.as_str());
            }
        }

        if let Some(first_output) = outputs.first() {
            if !targeted.contains_key(&(first_output.as_str(), "value")) {
                diagnostics.push(GraphDiagnostic::UnconnectedOutput {
                    id: first_output.clone(),
                });
            }
        }

        diagnostics
    }

    /// Connection feeding `(node_id, socket)`. Connections whose endpoints do
    /// not resolve are treated as absent; with several candidates the first wins.
    pub fn incoming(&self, node_id: &str, socket: &str) -> Option<&Connection> {
        self.connections.iter().find(|connection| {
            connection.to_node == node_id
                && connection.to_socket == socket
                && self.is_resolvable(connection)
        })
    }

    fn is_resolvable(&self, connection: &Connection) -> bool {
        self.node(&connection.from_node).is_some() && self.node(&connection.to_node).is_some()
    }
}

// ---------------------------------------------------------------------------
// Editor records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct GraphRecord {
    #[serde(default)]
    nodes: Vec<NodeRecord>,
    #[serde(default)]
    connections: Vec<Connection>,
}

impl From<GraphRecord> for Graph {
    fn from(record: GraphRecord) -> Self {
        Graph::from_records(record.nodes, record.connections)
    }
}

/// A node as the editor stores it: the `data` bag is interpreted per `type`.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub inputs: BTreeMap<String, Option<String>>,
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
}

impl NodeRecord {
    fn into_node(self, issues: &mut Vec<GraphDiagnostic>) -> Option<Node> {
        let Some(node_type) = NodeType::parse(&self.node_type) else {
            log::warn!(
                "node '{}' has unknown type '{}'; skipping it",
                self.id,
                self.node_type
            );
            issues.push(GraphDiagnostic::UnknownNodeType {
                id: self.id.clone(),
                raw: self.node_type.clone(),
            });
            return None;
        };

        let data = DataReader {
            node_id: &self.id,
            data: &self.data,
        };
        let kind = match node_type {
            NodeType::Time => NodeKind::Time {
                speed: data.number(&["speed"], 1.0),
            },
            NodeType::Value => NodeKind::Value {
                value: data.number(&["value"], 0.0),
            },
            NodeType::Vector => NodeKind::Vector {
                x: data.number(&["x"], 0.0),
                y: data.number(&["y"], 0.0),
                z: data.number(&["z"], 0.0),
            },
            NodeType::Position => NodeKind::Position,
            NodeType::CombineXyz => NodeKind::CombineXyz {
                x: data.number(&["x"], 0.0),
                y: data.number(&["y"], 0.0),
                z: data.number(&["z"], 0.0),
            },
            NodeType::SeparateXyz => NodeKind::SeparateXyz,
            NodeType::Math => NodeKind::Math {
                operation: data.variant(&["operation", "op"], issues),
                value: data.number(&["value", "b"], 0.0),
            },
            NodeType::VectorMath => NodeKind::VectorMath {
                operation: data.variant(&["operation", "op"], issues),
                scale: data.number(&["scale"], 1.0),
            },
            NodeType::WaveTexture => {
                let defaults = WaveSettings::default();
                let detail = data.number(&["detail"], 0.0);
                NodeKind::WaveTexture(WaveSettings {
                    wave_type: data.variant(&["waveType", "wave_type", "type"], issues),
                    direction: data.variant(&["direction", "bandsDirection"], issues),
                    profile: data.variant(&["profile", "waveProfile"], issues),
                    wave_scale: data.number(&["waveScale", "wave_scale", "scale"], defaults.wave_scale),
                    distortion: data.number(&["distortion"], defaults.distortion),
                    detail: clamp_detail(detail),
                    detail_scale: data.number(&["detailScale", "detail_scale"], defaults.detail_scale),
                    detail_roughness: data.number(
                        &["detailRoughness", "detail_roughness"],
                        defaults.detail_roughness,
                    ),
                })
            }
            NodeType::NoiseTexture => NodeKind::NoiseTexture {
                scale: data.number(&["scale"], 5.0),
            },
            NodeType::Parameter => {
                let default = data.number(&["default", "defaultValue"], 0.0);
                NodeKind::Parameter(ParameterSettings {
                    name: data
                        .text(&["name", "label"])
                        .unwrap_or_else(|| self.id.clone()),
                    value: data.number(&["value"], default),
                    min: data.number(&["min"], 0.0),
                    max: data.number(&["max"], 1.0),
                    default,
                    step: data.number(&["step"], 0.01),
                })
            }
            NodeType::Output => NodeKind::Output,
        };

        Some(Node {
            id: self.id,
            kind,
            inputs: self.inputs,
            x: self.x,
            y: self.y,
        })
    }
}

/// Detail is an iteration count: floor, then clamp to `0..=MAX_WAVE_DETAIL`.
pub fn clamp_detail(raw: f32) -> u32 {
    if !raw.is_finite() || raw <= 0.0 {
        return 0;
    }
    (raw.floor() as u32).min(MAX_WAVE_DETAIL)
}

struct DataReader<'a> {
    node_id: &'a str,
    data: &'a Value,
}

impl DataReader<'_> {
    fn field(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter().find_map(|key| self.data.get(key))
    }

    /// Numbers may arrive as JSON numbers or numeric strings; anything else,
    /// including non-finite values, yields `default`.
    fn number(&self, keys: &[&str], default: f32) -> f32 {
        let value = match self.field(keys) {
            Some(Value::Number(number)) => number.as_f64().map(|value| value as f32),
            Some(Value::String(raw)) => raw.trim().parse::<f32>().ok(),
            _ => None,
        };
        value.filter(|value| value.is_finite()).unwrap_or(default)
    }

    fn text(&self, keys: &[&str]) -> Option<String> {
        match self.field(keys) {
            Some(Value::String(raw)) if !raw.trim().is_empty() => Some(raw.trim().to_owned()),
            _ => None,
        }
    }

    fn variant<T: Variant>(&self, keys: &[&str], issues: &mut Vec<GraphDiagnostic>) -> T {
        let Some(raw) = self.field(keys) else {
            return T::default();
        };
        let raw = match raw {
            Value::Null => return T::default(),
            Value::String(raw) => raw.clone(),
            other => other.to_string(),
        };
        match T::parse(&raw) {
            Some(parsed) => parsed,
            None => {
                log::warn!(
                    "node '{}' has unknown {} '{}'; falling back to the default",
                    self.node_id,
                    T::LABEL,
                    raw
                );
                issues.push(GraphDiagnostic::UnknownVariant {
                    node: self.node_id.to_owned(),
                    label: T::LABEL,
                    raw,
                });
                T::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(json: &str) -> Graph {
        serde_json::from_str(json).expect("graph should parse")
    }

    #[test]
    fn editor_records_become_typed_variants() {
        let graph = load(
            r#"{
              "nodes": [
                {"id": "t", "type": "TIME", "data": {"speed": 2}, "x": 10, "y": 20},
                {"id": "w", "type": "WAVE_TEXTURE",
                 "data": {"waveType": "RINGS", "direction": "DIAGONAL", "profile": "SAW",
                          "waveScale": "3.5", "detail": 14.7}},
                {"id": "m", "type": "MATH", "data": {"operation": "DIV", "value": 4}},
                {"id": "out", "type": "OUTPUT", "data": {}, "inputs": {"value": "c1"}}
              ],
              "connections": [
                {"id": "c1", "fromNode": "w", "fromSocket": "value", "toNode": "out", "toSocket": "value"}
              ]
            }"#,
        );

        assert_eq!(graph.nodes.len(), 4);
        assert_eq!(graph.nodes[0].kind, NodeKind::Time { speed: 2.0 });
        assert_eq!(graph.time_speed(), 2.0);
        let NodeKind::WaveTexture(wave) = &graph.nodes[1].kind else {
            panic!("expected wave texture");
        };
        assert_eq!(wave.wave_type, WaveType::Rings);
        assert_eq!(wave.direction, WaveDirection::Diagonal);
        assert_eq!(wave.profile, WaveProfile::Saw);
        assert_eq!(wave.wave_scale, 3.5);
        assert_eq!(wave.detail, MAX_WAVE_DETAIL);
        assert_eq!(
            graph.nodes[2].kind,
            NodeKind::Math {
                operation: MathOperation::Divide,
                value: 4.0
            }
        );
        assert!(graph.diagnostics().is_empty());
    }

    #[test]
    fn unknown_operator_falls_back_to_add_with_diagnostic() {
        let graph = load(
            r#"{"nodes": [{"id": "m", "type": "MATH", "data": {"operation": "LOGARITHM"}}],
                "connections": []}"#,
        );
        assert_eq!(
            graph.nodes[0].kind,
            NodeKind::Math {
                operation: MathOperation::Add,
                value: 0.0
            }
        );
        let diagnostics = graph.diagnostics();
        assert!(diagnostics.contains(&GraphDiagnostic::UnknownVariant {
            node: "m".to_owned(),
            label: "math operation",
            raw: "LOGARITHM".to_owned(),
        }));
        assert!(diagnostics.contains(&GraphDiagnostic::MissingOutput));
    }

    #[test]
    fn unknown_node_types_are_skipped() {
        let graph = load(
            r#"{"nodes": [{"id": "q", "type": "SHADER_SCRIPT"}, {"id": "o", "type": "OUTPUT"}]}"#,
        );
        assert_eq!(graph.nodes.len(), 1);
        assert!(matches!(
            graph.diagnostics()[0],
            GraphDiagnostic::UnknownNodeType { .. }
        ));
    }

    #[test]
    fn incoming_ignores_dangling_and_prefers_first_connection() {
        let graph = Graph::new(
            vec![
                Node::new("a", NodeKind::Value { value: 1.0 }),
                Node::new("b", NodeKind::Value { value: 2.0 }),
                Node::new("out", NodeKind::Output),
            ],
            vec![
                Connection::new("ghost", "value", "out", "value"),
                Connection::new("a", "value", "out", "value"),
                Connection::new("b", "value", "out", "value"),
            ],
        );

        let incoming = graph.incoming("out", "value").expect("connection");
        assert_eq!(incoming.from_node, "a");

        let diagnostics = graph.diagnostics();
        assert!(diagnostics
            .iter()
            .any(|d| matches!(d, GraphDiagnostic::DanglingConnection { .. })));
        assert!(diagnostics
            .iter()
            .any(|d| matches!(d, GraphDiagnostic::DuplicateInput { .. })));
    }

    #[test]
    fn socket_typing_table_covers_coercion_sources() {
        let math = NodeKind::Math {
            operation: MathOperation::Add,
            value: 0.0,
        };
        assert_eq!(math.output_type("value"), Some(SocketType::Scalar));
        assert_eq!(
            NodeKind::Position.output_type("vector"),
            Some(SocketType::Vector)
        );
        assert_eq!(
            NodeKind::Position.output_type("x"),
            Some(SocketType::Scalar)
        );
        let vector_math = NodeKind::VectorMath {
            operation: VectorMathOperation::DotProduct,
            scale: 1.0,
        };
        assert_eq!(vector_math.output_type("value"), Some(SocketType::Scalar));
        assert_eq!(vector_math.output_type("vector"), Some(SocketType::Vector));
        assert_eq!(NodeKind::Output.output_type("value"), None);
    }

    #[test]
    fn detail_is_floored_and_clamped() {
        assert_eq!(clamp_detail(-2.0), 0);
        assert_eq!(clamp_detail(f32::NAN), 0);
        assert_eq!(clamp_detail(3.9), 3);
        assert_eq!(clamp_detail(99.0), MAX_WAVE_DETAIL);
    }
}
