//! Procedural pattern library: 3D simplex noise and the wave texture.
//!
//! Each function exists twice: as Rust for the software backend and as shader
//! boilerplate text (WGSL and GLSL) that the compiler prepends once to every
//! program. The two must stay operation-for-operation identical; the simplex
//! variant is the classic permutation-polynomial formulation that needs no
//! lookup tables or integer math, so it ports to GLSL ES 1.0 unchanged.

use std::f32::consts::TAU;

use crate::graph::{WaveDirection, WaveProfile, WaveSettings, WaveType, MAX_WAVE_DETAIL};
use crate::vecmath::{fract, Vec3};

// ---------------------------------------------------------------------------
// Simplex noise
// ---------------------------------------------------------------------------

const F3: f32 = 1.0 / 3.0;
const G3: f32 = 1.0 / 6.0;
const N7: f32 = 0.142857142857;

fn mod289(x: f32) -> f32 {
    x - (x * (1.0 / 289.0)).floor() * 289.0
}

fn permute(x: f32) -> f32 {
    mod289(((x * 34.0) + 1.0) * x)
}

fn taylor_inv_sqrt(r: f32) -> f32 {
    1.792_842_9 - 0.853_734_7 * r
}

fn step(edge: f32, x: f32) -> f32 {
    if x < edge {
        0.0
    } else {
        1.0
    }
}

/// Gradient for one simplex corner, picked from a 7x7 grid mapped onto an octahedron.
fn corner_gradient(p: f32) -> Vec3 {
    let ns_x = N7 * 2.0;
    let ns_y = N7 * 0.5 - 1.0;
    let ns_z = N7;

    let j = p - 49.0 * (p * ns_z * ns_z).floor();
    let x_cell = (j * ns_z).floor();
    let y_cell = (j - 7.0 * x_cell).floor();
    let x = x_cell * ns_x + ns_y;
    let y = y_cell * ns_x + ns_y;
    let h = 1.0 - x.abs() - y.abs();

    let sh = -step(h, 0.0);
    let gx = x + (x.floor() * 2.0 + 1.0) * sh;
    let gy = y + (y.floor() * 2.0 + 1.0) * sh;
    let gradient = Vec3::new(gx, gy, h);
    gradient * taylor_inv_sqrt(gradient.dot(gradient))
}

/// 3D simplex noise in roughly `[-1, 1]`.
pub fn simplex3(v: Vec3) -> f32 {
    let skew = (v.x + v.y + v.z) * F3;
    let i = Vec3::new((v.x + skew).floor(), (v.y + skew).floor(), (v.z + skew).floor());
    let unskew = (i.x + i.y + i.z) * G3;
    let x0 = v - i + Vec3::splat(unskew);

    let g = Vec3::new(step(x0.y, x0.x), step(x0.z, x0.y), step(x0.x, x0.z));
    let l = Vec3::splat(1.0) - g;
    let i1 = Vec3::new(g.x.min(l.z), g.y.min(l.x), g.z.min(l.y));
    let i2 = Vec3::new(g.x.max(l.z), g.y.max(l.x), g.z.max(l.y));

    let x1 = x0 - i1 + Vec3::splat(G3);
    let x2 = x0 - i2 + Vec3::splat(F3);
    let x3 = x0 - Vec3::splat(0.5);

    let i = i.map(mod289);
    let offsets = [Vec3::ZERO, i1, i2, Vec3::splat(1.0)];
    let corners = [x0, x1, x2, x3];

    let mut total = 0.0;
    for (offset, corner) in offsets.iter().zip(corners.iter()) {
        let p = permute(permute(permute(i.z + offset.z) + i.y + offset.y) + i.x + offset.x);
        let gradient = corner_gradient(p);
        let m = (0.6 - corner.dot(*corner)).max(0.0);
        let m = m * m;
        total += m * m * gradient.dot(*corner);
    }
    42.0 * total
}

/// NOISE_TEXTURE: single octave at `p * scale`, remapped to `[0, 1]`.
pub fn noise_texture(p: Vec3, scale: f32) -> f32 {
    0.5 * simplex3(p * scale) + 0.5
}

// ---------------------------------------------------------------------------
// Wave texture
// ---------------------------------------------------------------------------

impl WaveType {
    pub fn shader_code(self) -> i32 {
        match self {
            Self::Bands => 0,
            Self::Rings => 1,
        }
    }
}

impl WaveDirection {
    pub fn shader_code(self) -> i32 {
        match self {
            Self::X => 0,
            Self::Y => 1,
            Self::Z => 2,
            Self::Diagonal => 3,
        }
    }
}

impl WaveProfile {
    pub fn shader_code(self) -> i32 {
        match self {
            Self::Sine => 0,
            Self::Saw => 1,
        }
    }
}

fn wave_coordinate(p: Vec3, settings: &WaveSettings) -> f32 {
    match (settings.wave_type, settings.direction) {
        (WaveType::Rings, _) => p.length(),
        (WaveType::Bands, WaveDirection::X) => p.x,
        (WaveType::Bands, WaveDirection::Y) => p.y,
        (WaveType::Bands, WaveDirection::Z) => p.z,
        (WaveType::Bands, WaveDirection::Diagonal) => (p.x + p.y + p.z) * 0.5,
    }
}

/// WAVE_TEXTURE: projection, distortion, a small fBm loop, then the profile.
pub fn wave_texture(p: Vec3, phase: f32, settings: &WaveSettings) -> f32 {
    let scale = settings.wave_scale;
    let mut n = wave_coordinate(p, settings) * scale + phase;
    if settings.distortion != 0.0 {
        n += settings.distortion * simplex3(p * scale);
    }

    let mut amplitude = 1.0;
    let mut frequency = 1.0;
    for _ in 0..settings.detail.min(MAX_WAVE_DETAIL) {
        amplitude *= settings.detail_roughness;
        frequency *= settings.detail_scale;
        n += amplitude * simplex3(p * (scale * frequency));
    }

    match settings.profile {
        WaveProfile::Saw => fract(n),
        WaveProfile::Sine => 0.5 * ((TAU * n).sin() + 1.0),
    }
}

// ---------------------------------------------------------------------------
// Shader boilerplate
// ---------------------------------------------------------------------------

pub const WGSL_LIBRARY: &str = r#"fn mod289_3(x: vec3<f32>) -> vec3<f32> {
  return x - floor(x * (1.0 / 289.0)) * 289.0;
}

fn mod289_4(x: vec4<f32>) -> vec4<f32> {
  return x - floor(x * (1.0 / 289.0)) * 289.0;
}

fn permute4(x: vec4<f32>) -> vec4<f32> {
  return mod289_4(((x * 34.0) + 1.0) * x);
}

fn taylor_inv_sqrt4(r: vec4<f32>) -> vec4<f32> {
  return 1.79284291400159 - 0.85373472095314 * r;
}

fn snoise(v: vec3<f32>) -> f32 {
  let C = vec2<f32>(1.0 / 6.0, 1.0 / 3.0);
  let D = vec4<f32>(0.0, 0.5, 1.0, 2.0);

  var i = floor(v + dot(v, C.yyy));
  let x0 = v - i + dot(i, C.xxx);

  let g = step(x0.yzx, x0.xyz);
  let l = 1.0 - g;
  let i1 = min(g.xyz, l.zxy);
  let i2 = max(g.xyz, l.zxy);

  let x1 = x0 - i1 + C.xxx;
  let x2 = x0 - i2 + C.yyy;
  let x3 = x0 - D.yyy;

  i = mod289_3(i);
  let p = permute4(permute4(permute4(
      i.z + vec4<f32>(0.0, i1.z, i2.z, 1.0))
    + i.y + vec4<f32>(0.0, i1.y, i2.y, 1.0))
    + i.x + vec4<f32>(0.0, i1.x, i2.x, 1.0));

  let n_ = 0.142857142857;
  let ns = n_ * D.wyz - D.xzx;

  let j = p - 49.0 * floor(p * ns.z * ns.z);
  let x_ = floor(j * ns.z);
  let y_ = floor(j - 7.0 * x_);

  let x = x_ * ns.x + ns.yyyy;
  let y = y_ * ns.x + ns.yyyy;
  let h = 1.0 - abs(x) - abs(y);

  let b0 = vec4<f32>(x.xy, y.xy);
  let b1 = vec4<f32>(x.zw, y.zw);
  let s0 = floor(b0) * 2.0 + 1.0;
  let s1 = floor(b1) * 2.0 + 1.0;
  let sh = -step(h, vec4<f32>(0.0));

  let a0 = b0.xzyw + s0.xzyw * sh.xxyy;
  let a1 = b1.xzyw + s1.xzyw * sh.zzww;

  var p0 = vec3<f32>(a0.xy, h.x);
  var p1 = vec3<f32>(a0.zw, h.y);
  var p2 = vec3<f32>(a1.xy, h.z);
  var p3 = vec3<f32>(a1.zw, h.w);

  let norm = taylor_inv_sqrt4(vec4<f32>(dot(p0, p0), dot(p1, p1), dot(p2, p2), dot(p3, p3)));
  p0 = p0 * norm.x;
  p1 = p1 * norm.y;
  p2 = p2 * norm.z;
  p3 = p3 * norm.w;

  var m = max(0.6 - vec4<f32>(dot(x0, x0), dot(x1, x1), dot(x2, x2), dot(x3, x3)), vec4<f32>(0.0));
  m = m * m;
  return 42.0 * dot(m * m, vec4<f32>(dot(p0, x0), dot(p1, x1), dot(p2, x2), dot(p3, x3)));
}

fn wave_texture(p: vec3<f32>, phase: f32, scale: f32, distortion: f32, detail: i32, detail_scale: f32, roughness: f32, wave_type: i32, direction: i32, profile: i32) -> f32 {
  var coord = p.x;
  if (wave_type == 1) {
    coord = length(p);
  } else if (direction == 1) {
    coord = p.y;
  } else if (direction == 2) {
    coord = p.z;
  } else if (direction == 3) {
    coord = (p.x + p.y + p.z) * 0.5;
  }

  var n = coord * scale + phase;
  if (distortion != 0.0) {
    n = n + distortion * snoise(p * scale);
  }

  var amplitude = 1.0;
  var frequency = 1.0;
  for (var octave = 0; octave < 10; octave = octave + 1) {
    if (octave >= detail) {
      break;
    }
    amplitude = amplitude * roughness;
    frequency = frequency * detail_scale;
    n = n + amplitude * snoise(p * (scale * frequency));
  }

  if (profile == 1) {
    return fract(n);
  }
  return 0.5 * (sin(6.283185307179586 * n) + 1.0);
}
"#;

pub const GLSL_LIBRARY: &str = r#"vec3 mod289(vec3 x) {
  return x - floor(x * (1.0 / 289.0)) * 289.0;
}

vec4 mod289(vec4 x) {
  return x - floor(x * (1.0 / 289.0)) * 289.0;
}

vec4 permute(vec4 x) {
  return mod289(((x * 34.0) + 1.0) * x);
}

vec4 taylorInvSqrt(vec4 r) {
  return 1.79284291400159 - 0.85373472095314 * r;
}

float snoise(vec3 v) {
  const vec2 C = vec2(1.0 / 6.0, 1.0 / 3.0);
  const vec4 D = vec4(0.0, 0.5, 1.0, 2.0);

  vec3 i = floor(v + dot(v, C.yyy));
  vec3 x0 = v - i + dot(i, C.xxx);

  vec3 g = step(x0.yzx, x0.xyz);
  vec3 l = 1.0 - g;
  vec3 i1 = min(g.xyz, l.zxy);
  vec3 i2 = max(g.xyz, l.zxy);

  vec3 x1 = x0 - i1 + C.xxx;
  vec3 x2 = x0 - i2 + C.yyy;
  vec3 x3 = x0 - D.yyy;

  i = mod289(i);
  vec4 p = permute(permute(permute(
      i.z + vec4(0.0, i1.z, i2.z, 1.0))
    + i.y + vec4(0.0, i1.y, i2.y, 1.0))
    + i.x + vec4(0.0, i1.x, i2.x, 1.0));

  float n_ = 0.142857142857;
  vec3 ns = n_ * D.wyz - D.xzx;

  vec4 j = p - 49.0 * floor(p * ns.z * ns.z);
  vec4 x_ = floor(j * ns.z);
  vec4 y_ = floor(j - 7.0 * x_);

  vec4 x = x_ * ns.x + ns.yyyy;
  vec4 y = y_ * ns.x + ns.yyyy;
  vec4 h = 1.0 - abs(x) - abs(y);

  vec4 b0 = vec4(x.xy, y.xy);
  vec4 b1 = vec4(x.zw, y.zw);
  vec4 s0 = floor(b0) * 2.0 + 1.0;
  vec4 s1 = floor(b1) * 2.0 + 1.0;
  vec4 sh = -step(h, vec4(0.0));

  vec4 a0 = b0.xzyw + s0.xzyw * sh.xxyy;
  vec4 a1 = b1.xzyw + s1.xzyw * sh.zzww;

  vec3 p0 = vec3(a0.xy, h.x);
  vec3 p1 = vec3(a0.zw, h.y);
  vec3 p2 = vec3(a1.xy, h.z);
  vec3 p3 = vec3(a1.zw, h.w);

  vec4 norm = taylorInvSqrt(vec4(dot(p0, p0), dot(p1, p1), dot(p2, p2), dot(p3, p3)));
  p0 *= norm.x;
  p1 *= norm.y;
  p2 *= norm.z;
  p3 *= norm.w;

  vec4 m = max(0.6 - vec4(dot(x0, x0), dot(x1, x1), dot(x2, x2), dot(x3, x3)), 0.0);
  m = m * m;
  return 42.0 * dot(m * m, vec4(dot(p0, x0), dot(p1, x1), dot(p2, x2), dot(p3, x3)));
}

float wave_texture(vec3 p, float phase, float scale, float distortion, int detail, float detail_scale, float roughness, int wave_type, int direction, int profile) {
  float coord = p.x;
  if (wave_type == 1) {
    coord = length(p);
  } else if (direction == 1) {
    coord = p.y;
  } else if (direction == 2) {
    coord = p.z;
  } else if (direction == 3) {
    coord = (p.x + p.y + p.z) * 0.5;
  }

  float n = coord * scale + phase;
  if (distortion != 0.0) {
    n += distortion * snoise(p * scale);
  }

  float amplitude = 1.0;
  float frequency = 1.0;
  for (int octave = 0; octave < 10; octave++) {
    if (octave >= detail) {
      break;
    }
    amplitude *= roughness;
    frequency *= detail_scale;
    n += amplitude * snoise(p * (scale * frequency));
  }

  if (profile == 1) {
    return fract(n);
  }
  return 0.5 * (sin(6.283185307179586 * n) + 1.0);
}
"#;
