//! Statement-list program produced by lowering a graph.
//!
//! A program is a sequence of single-assignment bindings in dependency order
//! followed by one scalar result. It describes what is computed; the
//! dialect-specific syntax lives in `emit`.

use crate::graph::{MathOperation, SocketType, VectorMathOperation, WaveSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "x" => Some(Self::X),
            "y" => Some(Self::Y),
            "z" => Some(Self::Z),
            _ => None,
        }
    }

    pub fn swizzle(self) -> &'static str {
        match self {
            Self::X => "x",
            Self::Y => "y",
            Self::Z => "z",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Var {
    pub name: String,
    pub ty: SocketType,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Scalar(f32),
    Vector([f32; 3]),
    /// Elapsed-time uniform, already speed-scaled by the caller.
    Time,
    /// Sample position: UV-derived grid position or the world-space varying.
    Position,
    Var(VarId),
    /// Scalar widened to all three components.
    Broadcast(Box<Expr>),
    /// Vector narrowed to one component.
    Component(Box<Expr>, Axis),
    Combine(Box<[Expr; 3]>),
    Math {
        operation: MathOperation,
        a: Box<Expr>,
        b: Box<Expr>,
    },
    /// Vector operator; produces a scalar when `operation.is_scalar_result()`.
    VectorMath {
        operation: VectorMathOperation,
        a: Box<Expr>,
        b: Box<Expr>,
        scale: Box<Expr>,
    },
    Wave {
        settings: WaveSettings,
        vector: Box<Expr>,
        phase: Box<Expr>,
    },
    Noise {
        vector: Box<Expr>,
        scale: Box<Expr>,
    },
}

impl Expr {
    pub fn broadcast(self) -> Self {
        Self::Broadcast(Box::new(self))
    }

    pub fn component(self, axis: Axis) -> Self {
        Self::Component(Box::new(self), axis)
    }

    /// Converts a value of kind `from` into kind `to`.
    pub fn coerce(self, from: SocketType, to: SocketType) -> Self {
        match (from, to) {
            (SocketType::Scalar, SocketType::Vector) => self.broadcast(),
            (SocketType::Vector, SocketType::Scalar) => self.component(Axis::X),
            _ => self,
        }
    }

    /// Bare operands that can take a swizzle without parentheses.
    pub fn is_atom(&self) -> bool {
        matches!(self, Self::Var(_) | Self::Position | Self::Time)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub var: VarId,
    pub expr: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgramResult {
    /// Scalar expression clamped to `[0, 1]` and written as grayscale.
    Value(Expr),
    /// OUTPUT exists but nothing usable feeds its `value` socket.
    Zero,
    /// No OUTPUT node: a fixed magenta program.
    ErrorColor,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub vars: Vec<Var>,
    pub stmts: Vec<Stmt>,
    pub result: ProgramResult,
    pub use_world_pos: bool,
}

impl Program {
    pub fn constant(result: ProgramResult, use_world_pos: bool) -> Self {
        Self {
            vars: Vec::new(),
            stmts: Vec::new(),
            result,
            use_world_pos,
        }
    }

    pub fn var(&self, id: VarId) -> &Var {
        &self.vars[id.0]
    }

    pub fn var_named(&self, name: &str) -> Option<VarId> {
        self.vars
            .iter()
            .position(|var| var.name == name)
            .map(VarId)
    }
}
