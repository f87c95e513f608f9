//! CPU evaluation of a lowered program.
//!
//! Backs the software heightmap backend and lets tests check compiled
//! semantics without a GPU. All intermediate values live in the caller's
//! [`EvalContext`], so independent evaluations (one per preview tile, one per
//! thread) never share state.

use crate::compiler::ir::{Axis, Expr, Program, ProgramResult, VarId};
use crate::noise;
use crate::vecmath::{self, Vec3};

/// Color written by programs without an OUTPUT node.
pub const ERROR_COLOR: [f32; 4] = [1.0, 0.0, 1.0, 1.0];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Scalar(f32),
    Vector(Vec3),
}

impl Value {
    /// Scalar view; vectors narrow to their x component.
    pub fn scalar(self) -> f32 {
        match self {
            Self::Scalar(value) => value,
            Self::Vector(vector) => vector.x,
        }
    }

    /// Vector view; scalars broadcast.
    pub fn vector(self) -> Vec3 {
        match self {
            Self::Scalar(value) => Vec3::splat(value),
            Self::Vector(vector) => vector,
        }
    }
}

/// Inputs that vary per sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Elapsed time, already scaled by the TIME node's speed.
    pub time: f32,
    pub position: Vec3,
}

/// Register arena for one evaluation at a time. Reusable across samples.
#[derive(Debug, Default)]
pub struct EvalContext {
    registers: Vec<Value>,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clamped grayscale result, or `None` for the error-color program.
    pub fn eval(&mut self, program: &Program, sample: &Sample) -> Option<f32> {
        self.registers.clear();
        self.registers
            .resize(program.vars.len(), Value::Scalar(0.0));

        for stmt in &program.stmts {
            let value = self.expr(&stmt.expr, sample);
            if let Some(slot) = self.registers.get_mut(stmt.var.0) {
                *slot = value;
            }
        }

        match &program.result {
            ProgramResult::ErrorColor => None,
            ProgramResult::Zero => Some(0.0),
            ProgramResult::Value(expr) => Some(clamp_unit(self.expr(expr, sample).scalar())),
        }
    }

    /// RGBA as the fragment stage writes it.
    pub fn eval_rgba(&mut self, program: &Program, sample: &Sample) -> [f32; 4] {
        match self.eval(program, sample) {
            Some(value) => [value, value, value, 1.0],
            None => ERROR_COLOR,
        }
    }

    /// Value bound to `var` by the most recent evaluation.
    pub fn register(&self, var: VarId) -> Option<Value> {
        self.registers.get(var.0).copied()
    }

    fn expr(&self, expr: &Expr, sample: &Sample) -> Value {
        match expr {
            Expr::Scalar(value) => Value::Scalar(*value),
            Expr::Vector(components) => Value::Vector(Vec3::from(*components)),
            Expr::Time => Value::Scalar(sample.time),
            Expr::Position => Value::Vector(sample.position),
            Expr::Var(var) => self.register(*var).unwrap_or(Value::Scalar(0.0)),
            Expr::Broadcast(inner) => Value::Vector(self.expr(inner, sample).vector()),
            Expr::Component(inner, axis) => {
                let vector = self.expr(inner, sample).vector();
                Value::Scalar(match axis {
                    Axis::X => vector.x,
                    Axis::Y => vector.y,
                    Axis::Z => vector.z,
                })
            }
            Expr::Combine(parts) => {
                let [x, y, z] = &**parts;
                Value::Vector(Vec3::new(
                    self.expr(x, sample).scalar(),
                    self.expr(y, sample).scalar(),
                    self.expr(z, sample).scalar(),
                ))
            }
            Expr::Math { operation, a, b } => Value::Scalar(vecmath::math(
                *operation,
                self.expr(a, sample).scalar(),
                self.expr(b, sample).scalar(),
            )),
            Expr::VectorMath {
                operation,
                a,
                b,
                scale,
            } => {
                let result = vecmath::vector_math(
                    *operation,
                    self.expr(a, sample).vector(),
                    self.expr(b, sample).vector(),
                    self.expr(scale, sample).scalar(),
                );
                if operation.is_scalar_result() {
                    Value::Scalar(result.value)
                } else {
                    Value::Vector(result.vector)
                }
            }
            Expr::Wave {
                settings,
                vector,
                phase,
            } => Value::Scalar(noise::wave_texture(
                self.expr(vector, sample).vector(),
                self.expr(phase, sample).scalar(),
                settings,
            )),
            Expr::Noise { vector, scale } => Value::Scalar(noise::noise_texture(
                self.expr(vector, sample).vector(),
                self.expr(scale, sample).scalar(),
            )),
        }
    }
}

/// One-shot evaluation with a throwaway context.
pub fn evaluate(program: &Program, sample: &Sample) -> Option<f32> {
    EvalContext::new().eval(program, sample)
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::lower;
    use crate::graph::{
        Connection, Graph, MathOperation, Node, NodeKind, VectorMathOperation, WaveDirection,
        WaveSettings,
    };

    fn origin(time: f32) -> Sample {
        Sample {
            time,
            position: Vec3::ZERO,
        }
    }

    #[test]
    fn sine_bands_at_origin_evaluate_to_half_for_every_direction() {
        for direction in [
            WaveDirection::X,
            WaveDirection::Y,
            WaveDirection::Z,
            WaveDirection::Diagonal,
        ] {
            let graph = Graph::new(
                vec![
                    Node::new("time", NodeKind::Time { speed: 1.0 }),
                    Node::new(
                        "wave",
                        NodeKind::WaveTexture(WaveSettings {
                            direction,
                            wave_scale: 1.0,
                            ..WaveSettings::default()
                        }),
                    ),
                    Node::new("out", NodeKind::Output),
                ],
                vec![
                    Connection::new("time", "value", "wave", "phase"),
                    Connection::new("wave", "value", "out", "value"),
                ],
            );
            let program = lower(&graph, false);
            assert_eq!(evaluate(&program, &origin(0.0)), Some(0.5));
        }
    }

    #[test]
    fn division_by_zero_yields_zero() {
        for a in [-5.0, 0.0, 0.75, 1e20] {
            let graph = Graph::new(
                vec![
                    Node::new("a", NodeKind::Value { value: a }),
                    Node::new(
                        "div",
                        NodeKind::Math {
                            operation: MathOperation::Divide,
                            value: 0.0,
                        },
                    ),
                    Node::new("out", NodeKind::Output),
                ],
                vec![
                    Connection::new("a", "value", "div", "a"),
                    Connection::new("div", "value", "out", "value"),
                ],
            );
            let program = lower(&graph, false);
            let mut context = EvalContext::new();
            assert_eq!(context.eval(&program, &origin(0.0)), Some(0.0));
            let div = program.var_named("n_div_value").unwrap();
            assert_eq!(context.register(div), Some(Value::Scalar(0.0)));
        }
    }

    #[test]
    fn broadcast_scalar_feeds_equal_components() {
        let graph = Graph::new(
            vec![
                Node::new("v", NodeKind::Value { value: -3.0 }),
                Node::new(
                    "m",
                    NodeKind::Math {
                        operation: MathOperation::Multiply,
                        value: 1.0,
                    },
                ),
                Node::new(
                    "abs",
                    NodeKind::VectorMath {
                        operation: VectorMathOperation::Absolute,
                        scale: 1.0,
                    },
                ),
                Node::new("out", NodeKind::Output),
            ],
            vec![
                Connection::new("v", "value", "m", "a"),
                Connection::new("m", "value", "abs", "a"),
                Connection::new("abs", "vector", "out", "value"),
            ],
        );
        let program = lower(&graph, false);
        let mut context = EvalContext::new();
        assert_eq!(context.eval(&program, &origin(0.0)), Some(1.0));
        let vector = program.var_named("n_abs_vector").unwrap();
        assert_eq!(
            context.register(vector),
            Some(Value::Vector(Vec3::splat(3.0)))
        );
    }

    #[test]
    fn missing_output_is_error_color() {
        let graph = Graph::new(vec![Node::new("t", NodeKind::Time { speed: 1.0 })], vec![]);
        let program = lower(&graph, false);
        assert_eq!(
            EvalContext::new().eval_rgba(&program, &origin(0.0)),
            ERROR_COLOR
        );
    }

    #[test]
    fn separate_xyz_reads_position_components() {
        let graph = Graph::new(
            vec![
                Node::new("p", NodeKind::Position),
                Node::new("sep", NodeKind::SeparateXyz),
                Node::new("out", NodeKind::Output),
            ],
            vec![
                Connection::new("p", "vector", "sep", "vector"),
                Connection::new("sep", "y", "out", "value"),
            ],
        );
        let program = lower(&graph, false);
        let sample = Sample {
            time: 0.0,
            position: Vec3::new(0.9, 0.25, 0.0),
        };
        assert_eq!(evaluate(&program, &sample), Some(0.25));
    }
}
