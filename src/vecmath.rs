//! Scalar and vector operator tables shared by the interpreter.
//!
//! Every operator degrades to a defined value instead of producing NaN or
//! infinity, because results end up in a color channel. The emitted shader
//! text applies the same guards (see `compiler::emit`).

use std::ops::{Add, Mul, Sub};

use crate::graph::{MathOperation, VectorMathOperation};

/// Lengths below this are treated as zero when normalizing.
pub const NORMALIZE_EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub const fn splat(value: f32) -> Self {
        Self::new(value, value, value)
    }

    pub fn map(self, f: impl Fn(f32) -> f32) -> Self {
        Self::new(f(self.x), f(self.y), f(self.z))
    }

    pub fn zip(self, other: Self, f: impl Fn(f32, f32) -> f32) -> Self {
        Self::new(f(self.x, other.x), f(self.y, other.y), f(self.z, other.z))
    }

    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    pub fn floor(self) -> Self {
        self.map(f32::floor)
    }
}

impl From<[f32; 3]> for Vec3 {
    fn from(value: [f32; 3]) -> Self {
        Self::new(value[0], value[1], value[2])
    }
}

impl Add for Vec3 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.zip(rhs, |a, b| a + b)
    }
}

impl Sub for Vec3 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self.zip(rhs, |a, b| a - b)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        self.map(|a| a * rhs)
    }
}

pub fn safe_div(a: f32, b: f32) -> f32 {
    if b == 0.0 {
        0.0
    } else {
        a / b
    }
}

pub fn safe_sqrt(a: f32) -> f32 {
    if a < 0.0 {
        0.0
    } else {
        a.sqrt()
    }
}

/// Non-positive bases yield 0; shading languages leave them undefined.
pub fn safe_pow(a: f32, b: f32) -> f32 {
    if a <= 0.0 {
        0.0
    } else {
        a.powf(b)
    }
}

/// Floored modulo (result takes the sign of `b`), 0 when `b` is 0.
pub fn floored_mod(a: f32, b: f32) -> f32 {
    if b == 0.0 {
        0.0
    } else {
        a - b * (a / b).floor()
    }
}

/// Shading-language `fract`: always in `[0, 1)`, also for negative input.
pub fn fract(a: f32) -> f32 {
    a - a.floor()
}

/// Shading-language `sign`: 0 stays 0.
pub fn sign(a: f32) -> f32 {
    if a > 0.0 {
        1.0
    } else if a < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Rounds half up. Emitted as `floor(a + 0.5)` since WGSL `round` rounds
/// half to even and GLSL leaves the tie direction to the driver.
pub fn round(a: f32) -> f32 {
    (a + 0.5).floor()
}

pub fn math(operation: MathOperation, a: f32, b: f32) -> f32 {
    match operation {
        MathOperation::Add => a + b,
        MathOperation::Subtract => a - b,
        MathOperation::Multiply => a * b,
        MathOperation::Divide => safe_div(a, b),
        MathOperation::Power => safe_pow(a, b),
        MathOperation::Sqrt => safe_sqrt(a),
        MathOperation::Absolute => a.abs(),
        MathOperation::Floor => a.floor(),
        MathOperation::Ceil => a.ceil(),
        MathOperation::Round => round(a),
        MathOperation::Fract => fract(a),
        MathOperation::Modulo => floored_mod(a, b),
        MathOperation::Minimum => a.min(b),
        MathOperation::Maximum => a.max(b),
        MathOperation::Sign => sign(a),
        MathOperation::Sine => a.sin(),
        MathOperation::Cosine => a.cos(),
        MathOperation::Tangent => a.tan(),
    }
}

/// Both outputs of a VECTOR_MATH node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorMathResult {
    pub vector: Vec3,
    pub value: f32,
}

impl VectorMathResult {
    fn from_vector(vector: Vec3) -> Self {
        Self {
            vector,
            value: vector.x,
        }
    }

    fn from_value(value: f32) -> Self {
        Self {
            vector: Vec3::splat(value),
            value,
        }
    }
}

pub fn normalize(v: Vec3) -> Vec3 {
    let length = v.length();
    if length < NORMALIZE_EPSILON {
        Vec3::ZERO
    } else {
        v * (1.0 / length)
    }
}

pub fn vector_math(operation: VectorMathOperation, a: Vec3, b: Vec3, scale: f32) -> VectorMathResult {
    match operation {
        VectorMathOperation::Add => VectorMathResult::from_vector(a + b),
        VectorMathOperation::Subtract => VectorMathResult::from_vector(a - b),
        VectorMathOperation::Multiply => VectorMathResult::from_vector(a.zip(b, |x, y| x * y)),
        VectorMathOperation::Divide => VectorMathResult::from_vector(a.zip(b, safe_div)),
        VectorMathOperation::Scale => VectorMathResult::from_vector(a * scale),
        VectorMathOperation::CrossProduct => VectorMathResult::from_vector(a.cross(b)),
        VectorMathOperation::DotProduct => VectorMathResult::from_value(a.dot(b)),
        VectorMathOperation::Length => VectorMathResult::from_value(a.length()),
        VectorMathOperation::Distance => VectorMathResult::from_value((a - b).length()),
        VectorMathOperation::Normalize => VectorMathResult::from_vector(normalize(a)),
        VectorMathOperation::Floor => VectorMathResult::from_vector(a.floor()),
        VectorMathOperation::Ceil => VectorMathResult::from_vector(a.map(f32::ceil)),
        VectorMathOperation::Fraction => VectorMathResult::from_vector(a.map(fract)),
        VectorMathOperation::Absolute => VectorMathResult::from_vector(a.map(f32::abs)),
        VectorMathOperation::Minimum => VectorMathResult::from_vector(a.zip(b, f32::min)),
        VectorMathOperation::Maximum => VectorMathResult::from_vector(a.zip(b, f32::max)),
        VectorMathOperation::Sine => VectorMathResult::from_vector(a.map(f32::sin)),
        VectorMathOperation::Cosine => VectorMathResult::from_vector(a.map(f32::cos)),
        VectorMathOperation::Tangent => VectorMathResult::from_vector(a.map(f32::tan)),
    }
}
