//! Renders a lowered [`Program`] as shader source text.
//!
//! WGSL output is a complete module (vertex + fragment entry points) that the
//! wgpu heightmap generator builds directly. GLSL output is an ES 1.0
//! fragment shader for a WebGL material that provides `vUv` (and `vWorldPos`
//! when world positions are requested).

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};

use super::ir::{Expr, Program, ProgramResult, Stmt};
use crate::graph::{MathOperation, SocketType, VectorMathOperation};
use crate::noise::{GLSL_LIBRARY, WGSL_LIBRARY};

/// Side length of the square the UV-derived POSITION spans in world units.
pub const GRID_WORLD_SIZE: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dialect {
    #[default]
    Wgsl,
    Glsl,
}

impl Dialect {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wgsl => "wgsl",
            Self::Glsl => "glsl",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "wgsl" => Ok(Self::Wgsl),
            "glsl" => Ok(Self::Glsl),
            other => bail!("unknown shader dialect '{other}' (expected wgsl or glsl)"),
        }
    }
}

/// Formats a float so both dialects parse it as a float literal: integral
/// values get a trailing `.0`, negative zero prints as `0.0`, and non-finite
/// values (which have no literal form) degrade to `0.0`.
pub fn format_float(value: f32) -> String {
    if !value.is_finite() {
        return "0.0".to_owned();
    }
    let value = if value == 0.0 { 0.0 } else { value };
    let text = value.to_string();
    if text.contains(['.', 'e', 'E']) {
        text
    } else {
        format!("{text}.0")
    }
}

/// Literal as an operand: negative values are parenthesized so `a - -1.0`
/// never appears in the output.
fn literal(value: f32) -> String {
    let text = format_float(value);
    if text.starts_with('-') {
        format!("({text})")
    } else {
        text
    }
}

pub fn render(program: &Program, dialect: Dialect) -> String {
    let emitter = Emitter { program, dialect };
    match dialect {
        Dialect::Wgsl => emitter.wgsl(),
        Dialect::Glsl => emitter.glsl(),
    }
}

const WGSL_PRELUDE: &str = r#"struct Globals {
  time: f32,
  resolution: f32,
  world_size: vec2<f32>,
}

@group(0) @binding(0) var<uniform> globals: Globals;

struct VertexOutput {
  @builtin(position) position: vec4<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
  var positions = array<vec2<f32>, 3>(
    vec2<f32>(-1.0, -3.0),
    vec2<f32>(-1.0, 1.0),
    vec2<f32>(3.0, 1.0)
  );

  var out: VertexOutput;
  out.position = vec4<f32>(positions[vertex_index], 0.0, 1.0);
  return out;
}

fn safe_div(a: f32, b: f32) -> f32 {
  if (b == 0.0) {
    return 0.0;
  }
  return a / b;
}

fn safe_div3(a: vec3<f32>, b: vec3<f32>) -> vec3<f32> {
  return vec3<f32>(safe_div(a.x, b.x), safe_div(a.y, b.y), safe_div(a.z, b.z));
}

fn safe_sqrt(a: f32) -> f32 {
  if (a < 0.0) {
    return 0.0;
  }
  return sqrt(a);
}

fn safe_pow(a: f32, b: f32) -> f32 {
  if (a <= 0.0) {
    return 0.0;
  }
  return pow(a, b);
}

fn floored_mod(a: f32, b: f32) -> f32 {
  if (b == 0.0) {
    return 0.0;
  }
  return a - b * floor(a / b);
}

fn safe_normalize(v: vec3<f32>) -> vec3<f32> {
  let len = length(v);
  if (len < 0.000001) {
    return vec3<f32>(0.0);
  }
  return v * (1.0 / len);
}
"#;

const GLSL_PRELUDE: &str = r#"float safe_div(float a, float b) {
  return b == 0.0 ? 0.0 : a / b;
}

vec3 safe_div3(vec3 a, vec3 b) {
  return vec3(safe_div(a.x, b.x), safe_div(a.y, b.y), safe_div(a.z, b.z));
}

float safe_sqrt(float a) {
  return a < 0.0 ? 0.0 : sqrt(a);
}

float safe_pow(float a, float b) {
  return a <= 0.0 ? 0.0 : pow(a, b);
}

float floored_mod(float a, float b) {
  return b == 0.0 ? 0.0 : a - b * floor(a / b);
}

vec3 safe_normalize(vec3 v) {
  float len = length(v);
  return len < 0.000001 ? vec3(0.0) : v * (1.0 / len);
}
"#;

struct Emitter<'p> {
    program: &'p Program,
    dialect: Dialect,
}

impl Emitter<'_> {
    fn wgsl(&self) -> String {
        let mut out = String::with_capacity(8 * 1024);
        out.push_str(WGSL_PRELUDE);
        out.push('\n');
        out.push_str(WGSL_LIBRARY);
        out.push('\n');
        out.push_str(&format!(
            "const GRID_WORLD_SIZE: f32 = {};\n\n",
            format_float(GRID_WORLD_SIZE)
        ));
        out.push_str("@fragment\n");
        out.push_str("fn fs_main(frag: VertexOutput) -> @location(0) vec4<f32> {\n");
        out.push_str("  let cell_uv = floor(frag.position.xy) / globals.resolution;\n");
        if self.program.use_world_pos {
            out.push_str(
                "  let sample_pos = vec3<f32>((cell_uv - 0.5) * globals.world_size, 0.0);\n",
            );
        } else {
            out.push_str("  let sample_pos = vec3<f32>((cell_uv - 0.5) * GRID_WORLD_SIZE, 0.0);\n");
        }
        self.body(&mut out);
        out.push_str("}\n");
        out
    }

    fn glsl(&self) -> String {
        let mut out = String::with_capacity(8 * 1024);
        out.push_str("precision highp float;\n\n");
        out.push_str("uniform float uTime;\n");
        out.push_str("varying vec2 vUv;\n");
        if self.program.use_world_pos {
            out.push_str("varying vec3 vWorldPos;\n");
        }
        out.push('\n');
        out.push_str(&format!(
            "const float GRID_WORLD_SIZE = {};\n\n",
            format_float(GRID_WORLD_SIZE)
        ));
        out.push_str(GLSL_PRELUDE);
        out.push('\n');
        out.push_str(GLSL_LIBRARY);
        out.push('\n');
        out.push_str("void main() {\n");
        if self.program.use_world_pos {
            out.push_str("  vec3 samplePos = vWorldPos;\n");
        } else {
            out.push_str("  vec3 samplePos = vec3((vUv - 0.5) * GRID_WORLD_SIZE, 0.0);\n");
        }
        self.body(&mut out);
        out.push_str("}\n");
        out
    }

    fn body(&self, out: &mut String) {
        for stmt in &self.program.stmts {
            out.push_str(&self.statement(stmt));
        }
        match &self.program.result {
            ProgramResult::ErrorColor => out.push_str(&format!(
                "  {}\n",
                self.write_color("1.0, 0.0, 1.0, 1.0")
            )),
            ProgramResult::Zero => self.epilogue(out, "0.0"),
            ProgramResult::Value(expr) => self.epilogue(out, &self.expr(expr)),
        }
    }

    fn epilogue(&self, out: &mut String, value: &str) {
        match self.dialect {
            Dialect::Wgsl => {
                out.push_str(&format!("  let finalValue = clamp({value}, 0.0, 1.0);\n"));
                out.push_str(&format!(
                    "  {}\n",
                    self.write_color("finalValue, finalValue, finalValue, 1.0")
                ));
            }
            Dialect::Glsl => {
                out.push_str(&format!("  float finalValue = clamp({value}, 0.0, 1.0);\n"));
                out.push_str(&format!(
                    "  {}\n",
                    self.write_color("vec3(finalValue), 1.0")
                ));
            }
        }
    }

    fn write_color(&self, components: &str) -> String {
        match self.dialect {
            Dialect::Wgsl => format!("return vec4<f32>({components});"),
            Dialect::Glsl => format!("gl_FragColor = vec4({components});"),
        }
    }

    fn statement(&self, stmt: &Stmt) -> String {
        let var = self.program.var(stmt.var);
        let value = self.expr(&stmt.expr);
        match self.dialect {
            Dialect::Wgsl => format!("  let {}: {} = {};\n", var.name, self.type_name(var.ty), value),
            Dialect::Glsl => format!("  {} {} = {};\n", self.type_name(var.ty), var.name, value),
        }
    }

    fn type_name(&self, ty: SocketType) -> &'static str {
        match (self.dialect, ty) {
            (Dialect::Wgsl, SocketType::Scalar) => "f32",
            (Dialect::Wgsl, SocketType::Vector) => "vec3<f32>",
            (Dialect::Glsl, SocketType::Scalar) => "float",
            (Dialect::Glsl, SocketType::Vector) => "vec3",
        }
    }

    fn vec3(&self, args: &str) -> String {
        match self.dialect {
            Dialect::Wgsl => format!("vec3<f32>({args})"),
            Dialect::Glsl => format!("vec3({args})"),
        }
    }

    fn expr(&self, expr: &Expr) -> String {
        match expr {
            Expr::Scalar(value) => literal(*value),
            Expr::Vector([x, y, z]) => self.vec3(&format!(
                "{}, {}, {}",
                format_float(*x),
                format_float(*y),
                format_float(*z)
            )),
            Expr::Time => match self.dialect {
                Dialect::Wgsl => "globals.time".to_owned(),
                Dialect::Glsl => "uTime".to_owned(),
            },
            Expr::Position => match self.dialect {
                Dialect::Wgsl => "sample_pos".to_owned(),
                Dialect::Glsl => "samplePos".to_owned(),
            },
            Expr::Var(id) => self.program.var(*id).name.clone(),
            Expr::Broadcast(inner) => self.vec3(&self.expr(inner)),
            Expr::Component(inner, axis) => {
                if inner.is_atom() {
                    format!("{}.{}", self.expr(inner), axis.swizzle())
                } else {
                    format!("({}).{}", self.expr(inner), axis.swizzle())
                }
            }
            Expr::Combine(parts) => {
                let [x, y, z] = &**parts;
                self.vec3(&format!("{}, {}, {}", self.expr(x), self.expr(y), self.expr(z)))
            }
            Expr::Math { operation, a, b } => self.math(*operation, &self.expr(a), &self.expr(b)),
            Expr::VectorMath {
                operation,
                a,
                b,
                scale,
            } => self.vector_math(*operation, &self.expr(a), &self.expr(b), &self.expr(scale)),
            Expr::Wave {
                settings,
                vector,
                phase,
            } => format!(
                "wave_texture({}, {}, {}, {}, {}, {}, {}, {}, {}, {})",
                self.expr(vector),
                self.expr(phase),
                literal(settings.wave_scale),
                literal(settings.distortion),
                settings.detail,
                literal(settings.detail_scale),
                literal(settings.detail_roughness),
                settings.wave_type.shader_code(),
                settings.direction.shader_code(),
                settings.profile.shader_code(),
            ),
            Expr::Noise { vector, scale } => format!(
                "(0.5 * snoise({} * {}) + 0.5)",
                self.expr(vector),
                self.expr(scale)
            ),
        }
    }

    fn math(&self, operation: MathOperation, a: &str, b: &str) -> String {
        match operation {
            MathOperation::Add => format!("({a} + {b})"),
            MathOperation::Subtract => format!("({a} - {b})"),
            MathOperation::Multiply => format!("({a} * {b})"),
            MathOperation::Divide => format!("safe_div({a}, {b})"),
            MathOperation::Power => format!("safe_pow({a}, {b})"),
            MathOperation::Sqrt => format!("safe_sqrt({a})"),
            MathOperation::Absolute => format!("abs({a})"),
            MathOperation::Floor => format!("floor({a})"),
            MathOperation::Ceil => format!("ceil({a})"),
            MathOperation::Round => format!("floor({a} + 0.5)"),
            MathOperation::Fract => format!("fract({a})"),
            MathOperation::Modulo => format!("floored_mod({a}, {b})"),
            MathOperation::Minimum => format!("min({a}, {b})"),
            MathOperation::Maximum => format!("max({a}, {b})"),
            MathOperation::Sign => format!("sign({a})"),
            MathOperation::Sine => format!("sin({a})"),
            MathOperation::Cosine => format!("cos({a})"),
            MathOperation::Tangent => format!("tan({a})"),
        }
    }

    fn vector_math(&self, operation: VectorMathOperation, a: &str, b: &str, scale: &str) -> String {
        match operation {
            VectorMathOperation::Add => format!("({a} + {b})"),
            VectorMathOperation::Subtract => format!("({a} - {b})"),
            VectorMathOperation::Multiply => format!("({a} * {b})"),
            VectorMathOperation::Divide => format!("safe_div3({a}, {b})"),
            VectorMathOperation::Scale => format!("({a} * {scale})"),
            VectorMathOperation::CrossProduct => format!("cross({a}, {b})"),
            VectorMathOperation::DotProduct => format!("dot({a}, {b})"),
            VectorMathOperation::Length => format!("length({a})"),
            VectorMathOperation::Distance => format!("distance({a}, {b})"),
            VectorMathOperation::Normalize => format!("safe_normalize({a})"),
            VectorMathOperation::Floor => format!("floor({a})"),
            VectorMathOperation::Ceil => format!("ceil({a})"),
            VectorMathOperation::Fraction => format!("fract({a})"),
            VectorMathOperation::Absolute => format!("abs({a})"),
            VectorMathOperation::Minimum => format!("min({a}, {b})"),
            VectorMathOperation::Maximum => format!("max({a}, {b})"),
            VectorMathOperation::Sine => format!("sin({a})"),
            VectorMathOperation::Cosine => format!("cos({a})"),
            VectorMathOperation::Tangent => format!("tan({a})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_literals_always_carry_a_decimal_point() {
        assert_eq!(format_float(2.0), "2.0");
        assert_eq!(format_float(0.0), "0.0");
        assert_eq!(format_float(-0.0), "0.0");
        assert_eq!(format_float(-3.0), "-3.0");
        assert_eq!(format_float(0.25), "0.25");
        assert_eq!(format_float(1e6), "1000000.0");
        assert_eq!(format_float(f32::NAN), "0.0");
        assert_eq!(format_float(f32::INFINITY), "0.0");
        assert_eq!(literal(-0.5), "(-0.5)");
    }

    #[test]
    fn dialect_names_parse() {
        assert_eq!("WGSL".parse::<Dialect>().unwrap(), Dialect::Wgsl);
        assert_eq!("glsl".parse::<Dialect>().unwrap(), Dialect::Glsl);
        assert!("hlsl".parse::<Dialect>().is_err());
    }

    #[test]
    fn error_program_writes_magenta_in_both_dialects() {
        let program = Program::constant(ProgramResult::ErrorColor, false);
        let wgsl = render(&program, Dialect::Wgsl);
        assert!(wgsl.contains("return vec4<f32>(1.0, 0.0, 1.0, 1.0);"));
        assert!(!wgsl.contains("finalValue"));
        let glsl = render(&program, Dialect::Glsl);
        assert!(glsl.contains("gl_FragColor = vec4(1.0, 0.0, 1.0, 1.0);"));
    }

    #[test]
    fn zero_program_clamps_constant() {
        let program = Program::constant(ProgramResult::Zero, false);
        let wgsl = render(&program, Dialect::Wgsl);
        assert!(wgsl.contains("let finalValue = clamp(0.0, 0.0, 1.0);"));
        assert_eq!(wgsl.matches("fn snoise(").count(), 1);
    }

    #[test]
    fn world_position_switches_the_sample_source() {
        let program = Program::constant(ProgramResult::Zero, true);
        let glsl = render(&program, Dialect::Glsl);
        assert!(glsl.contains("varying vec3 vWorldPos;"));
        assert!(glsl.contains("vec3 samplePos = vWorldPos;"));
        let wgsl = render(&program, Dialect::Wgsl);
        assert!(wgsl.contains("globals.world_size"));
    }
}
