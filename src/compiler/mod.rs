//! Graph to shader compiler.
//!
//! Lowering walks the graph depth-first from the OUTPUT node's `value`
//! connection, binding every reachable node's outputs to single-assignment
//! variables after its dependencies. Each node id is visited at most once, so
//! shared subgraphs are emitted once and cycles terminate: a node reached again
//! while its inputs are still being resolved reads the unconnected default.

pub mod emit;
pub mod ir;

use std::collections::{HashMap, HashSet};

use sha2::{Digest, Sha256};

use crate::graph::{Connection, Graph, Node, NodeKind, SocketType};

pub use emit::{format_float, Dialect, GRID_WORLD_SIZE};
use ir::{Axis, Expr, Program, ProgramResult, Stmt, Var, VarId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileOptions {
    /// Read the world-space position instead of deriving it from UV.
    pub use_world_pos: bool,
    pub dialect: Dialect,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledShader {
    /// Shader text; identical graphs produce identical text, so it doubles as
    /// the recompilation cache key.
    pub source: String,
    pub program: Program,
    pub dialect: Dialect,
}

impl CompiledShader {
    /// Hex SHA-256 of the source, for logs and short cache keys.
    pub fn digest(&self) -> String {
        format!("{:x}", Sha256::digest(self.source.as_bytes()))
    }
}

pub fn compile(graph: &Graph, options: &CompileOptions) -> CompiledShader {
    let program = lower(graph, options.use_world_pos);
    let source = emit::render(&program, options.dialect);
    CompiledShader {
        source,
        program,
        dialect: options.dialect,
    }
}

/// Lowers `graph` into a statement-list program. Never fails: a missing OUTPUT
/// yields the error-color program, a missing `value` connection yields zero.
pub fn lower(graph: &Graph, use_world_pos: bool) -> Program {
    let Some(output) = graph.output_node() else {
        return Program::constant(ProgramResult::ErrorColor, use_world_pos);
    };
    let Some(connection) = graph.incoming(&output.id, "value") else {
        return Program::constant(ProgramResult::Zero, use_world_pos);
    };

    let mut lowering = Lowering::new(graph);
    let result = match lowering.source(connection) {
        Some((expr, ty)) => ProgramResult::Value(expr.coerce(ty, SocketType::Scalar)),
        None => ProgramResult::Zero,
    };
    Program {
        vars: lowering.vars,
        stmts: lowering.stmts,
        result,
        use_world_pos,
    }
}

struct Lowering<'g> {
    graph: &'g Graph,
    visited: HashSet<&'g str>,
    bound: HashMap<(&'g str, &'static str), VarId>,
    taken_names: HashSet<String>,
    vars: Vec<Var>,
    stmts: Vec<Stmt>,
}

impl<'g> Lowering<'g> {
    fn new(graph: &'g Graph) -> Self {
        Self {
            graph,
            visited: HashSet::new(),
            bound: HashMap::new(),
            taken_names: HashSet::new(),
            vars: Vec::new(),
            stmts: Vec::new(),
        }
    }

    fn visit(&mut self, node: &'g Node) {
        if !self.visited.insert(node.id.as_str()) {
            return;
        }

        match &node.kind {
            NodeKind::Time { .. } => {
                self.bind(node, "value", SocketType::Scalar, Expr::Time);
            }
            NodeKind::Value { value } => {
                self.bind(node, "value", SocketType::Scalar, Expr::Scalar(*value));
            }
            NodeKind::Parameter(settings) => {
                self.bind(node, "value", SocketType::Scalar, Expr::Scalar(settings.value));
            }
            NodeKind::Vector { x, y, z } => {
                self.bind(node, "vector", SocketType::Vector, Expr::Vector([*x, *y, *z]));
            }
            NodeKind::Position => {
                self.bind(node, "vector", SocketType::Vector, Expr::Position);
            }
            NodeKind::CombineXyz { x, y, z } => {
                let x = self.input(node, "x").unwrap_or(Expr::Scalar(*x));
                let y = self.input(node, "y").unwrap_or(Expr::Scalar(*y));
                let z = self.input(node, "z").unwrap_or(Expr::Scalar(*z));
                self.bind(
                    node,
                    "vector",
                    SocketType::Vector,
                    Expr::Combine(Box::new([x, y, z])),
                );
            }
            NodeKind::SeparateXyz => {
                let vector = self.input(node, "vector").unwrap_or(Expr::Vector([0.0; 3]));
                let source = self.assign(&node.id, "in", SocketType::Vector, vector);
                for axis in [Axis::X, Axis::Y, Axis::Z] {
                    self.bind(
                        node,
                        axis.swizzle(),
                        SocketType::Scalar,
                        Expr::Var(source).component(axis),
                    );
                }
            }
            NodeKind::Math { operation, value } => {
                let a = self.input(node, "a").unwrap_or(Expr::Scalar(0.0));
                let b = self.input(node, "b").unwrap_or(Expr::Scalar(*value));
                let expr = Expr::Math {
                    operation: *operation,
                    a: Box::new(a),
                    b: Box::new(b),
                };
                self.bind(node, "value", SocketType::Scalar, expr);
            }
            NodeKind::VectorMath { operation, scale } => {
                let a = self.input(node, "a").unwrap_or(Expr::Vector([0.0; 3]));
                let b = self.input(node, "b").unwrap_or(Expr::Vector([0.0; 3]));
                let scale = self.input(node, "scale").unwrap_or(Expr::Scalar(*scale));
                let expr = Expr::VectorMath {
                    operation: *operation,
                    a: Box::new(a),
                    b: Box::new(b),
                    scale: Box::new(scale),
                };
                if operation.is_scalar_result() {
                    let value = self.bind(node, "value", SocketType::Scalar, expr);
                    self.bind(node, "vector", SocketType::Vector, Expr::Var(value).broadcast());
                } else {
                    let vector = self.bind(node, "vector", SocketType::Vector, expr);
                    self.bind(
                        node,
                        "value",
                        SocketType::Scalar,
                        Expr::Var(vector).component(Axis::X),
                    );
                }
            }
            NodeKind::WaveTexture(settings) => {
                let vector = self.input(node, "vector").unwrap_or(Expr::Position);
                let phase = self.input(node, "phase").unwrap_or(Expr::Scalar(0.0));
                let expr = Expr::Wave {
                    settings: *settings,
                    vector: Box::new(vector),
                    phase: Box::new(phase),
                };
                self.bind(node, "value", SocketType::Scalar, expr);
            }
            NodeKind::NoiseTexture { scale } => {
                let vector = self.input(node, "vector").unwrap_or(Expr::Position);
                let scale = self.input(node, "scale").unwrap_or(Expr::Scalar(*scale));
                let expr = Expr::Noise {
                    vector: Box::new(vector),
                    scale: Box::new(scale),
                };
                self.bind(node, "value", SocketType::Scalar, expr);
            }
            NodeKind::Output => {}
        }
    }

    /// Expression for input `socket` of `node`, coerced to the socket's kind.
    /// `None` when nothing usable is connected.
    fn input(&mut self, node: &'g Node, socket: &str) -> Option<Expr> {
        let expected = node.kind.input_type(socket)?;
        let connection = self.graph.incoming(&node.id, socket)?;
        let (expr, ty) = self.source(connection)?;
        Some(expr.coerce(ty, expected))
    }

    /// Lowers the producer of `connection` and returns the referenced output.
    /// Unknown socket names resolve to the primary output; `x`/`y`/`z` on a
    /// vector-only producer select that component.
    fn source(&mut self, connection: &'g Connection) -> Option<(Expr, SocketType)> {
        let from = self.graph.node(&connection.from_node)?;
        self.visit(from);

        let outputs = from.kind.outputs();
        if let Some(&(name, ty)) = outputs
            .iter()
            .find(|(name, _)| *name == connection.from_socket)
        {
            let var = *self.bound.get(&(from.id.as_str(), name))?;
            return Some((Expr::Var(var), ty));
        }

        let &(name, ty) = outputs.first()?;
        let var = Expr::Var(*self.bound.get(&(from.id.as_str(), name))?);
        match (ty, Axis::parse(&connection.from_socket)) {
            (SocketType::Vector, Some(axis)) => Some((var.component(axis), SocketType::Scalar)),
            _ => Some((var, ty)),
        }
    }

    fn bind(&mut self, node: &'g Node, socket: &'static str, ty: SocketType, expr: Expr) -> VarId {
        let var = self.assign(&node.id, socket, ty, expr);
        self.bound.insert((node.id.as_str(), socket), var);
        var
    }

    fn assign(&mut self, node_id: &str, socket: &str, ty: SocketType, expr: Expr) -> VarId {
        let base = format!("n_{}_{}", sanitize_identifier(node_id), socket);
        let mut name = base.clone();
        let mut suffix = 2;
        while !self.taken_names.insert(name.clone()) {
            name = format!("{base}_{suffix}");
            suffix += 1;
        }

        let var = VarId(self.vars.len());
        self.vars.push(Var { name, ty });
        self.stmts.push(Stmt { var, expr });
        var
    }
}

/// Maps an arbitrary node id onto `[A-Za-z0-9_]` without double underscores,
/// which GLSL reserves.
fn sanitize_identifier(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for ch in id.chars() {
        let ch = if ch.is_ascii_alphanumeric() { ch } else { '_' };
        if ch == '_' && (out.is_empty() || out.ends_with('_')) {
            continue;
        }
        out.push(ch);
    }
    while out.ends_with('_') {
        out.pop();
    }
    if out.is_empty() {
        out.push_str("node");
    }
    out
}
