//! Instanced terraced grid driven by a heightmap.
//!
//! Each heightmap texel is one grid cell. Layer 0 of a cell is always drawn;
//! layer `L > 0` is drawn when the cell's value reaches `stops[L].position`.
//! Stops are sorted on construction, so the drawn layers of a cell are always
//! a prefix and raising the value can only add layers.

use anyhow::{bail, Context, Result};
use bytemuck::{Pod, Zeroable};
use serde::Serialize;

pub const MAX_LAYERS: usize = 8;

/// Upper bound on allocated instances across all layers and faces
/// (`InstanceRaw` is 80 bytes, so 320 MiB).
pub const MAX_INSTANCES: usize = 1 << 22;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorStop {
    pub position: f32,
    pub color: [f32; 3],
}

impl ColorStop {
    pub fn new(position: f32, color: [f32; 3]) -> Self {
        Self { position, color }
    }

    pub fn from_hex(position: f32, hex: &str) -> Result<Self> {
        Ok(Self::new(position, parse_hex_color(hex)?))
    }
}

/// Parses `#rrggbb` or `#rgb` (leading `#` optional) into linear 0..1 floats.
pub fn parse_hex_color(raw: &str) -> Result<[f32; 3]> {
    let digits = raw.trim().trim_start_matches('#');
    let expanded = match digits.len() {
        3 => digits.chars().flat_map(|ch| [ch, ch]).collect::<String>(),
        6 => digits.to_owned(),
        _ => bail!("color '{raw}' must be #rgb or #rrggbb"),
    };
    let mut color = [0.0; 3];
    for (index, channel) in color.iter_mut().enumerate() {
        let pair = expanded
            .get(index * 2..index * 2 + 2)
            .with_context(|| format!("color '{raw}' is not ASCII hex"))?;
        let byte = u8::from_str_radix(pair, 16)
            .with_context(|| format!("color '{raw}' has invalid hex digits"))?;
        *channel = f32::from(byte) / 255.0;
    }
    Ok(color)
}

pub fn format_hex_color(color: [f32; 3]) -> String {
    let [r, g, b] = color.map(|channel| (channel.clamp(0.0, 1.0) * 255.0).round() as u8);
    format!("#{r:02x}{g:02x}{b:02x}")
}

/// Ordered stops; one terrace layer per stop.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorRamp {
    stops: Vec<ColorStop>,
}

impl ColorRamp {
    pub fn new(mut stops: Vec<ColorStop>) -> Result<Self> {
        if stops.is_empty() {
            bail!("color ramp needs at least one stop");
        }
        if stops.len() > MAX_LAYERS {
            bail!(
                "color ramp has {} stops; at most {MAX_LAYERS} layers are supported",
                stops.len()
            );
        }
        for stop in &stops {
            if !stop.position.is_finite() || !(0.0..=1.0).contains(&stop.position) {
                bail!("color stop position {} is outside [0, 1]", stop.position);
            }
        }
        stops.sort_by(|a, b| a.position.total_cmp(&b.position));
        Ok(Self { stops })
    }

    pub fn stops(&self) -> &[ColorStop] {
        &self.stops
    }

    pub fn layer_count(&self) -> usize {
        self.stops.len()
    }

    pub fn is_layer_drawn(&self, layer: usize, value: f32) -> bool {
        match layer {
            0 => true,
            _ => self
                .stops
                .get(layer)
                .is_some_and(|stop| value >= stop.position),
        }
    }

    /// Number of layers drawn for `value`; the drawn set is `0..count`.
    pub fn layers_for_value(&self, value: f32) -> usize {
        1 + self.stops[1..]
            .iter()
            .take_while(|stop| value >= stop.position)
            .count()
    }
}

impl Default for ColorRamp {
    fn default() -> Self {
        Self {
            stops: vec![
                ColorStop::new(0.0, [0.106, 0.149, 0.231]),
                ColorStop::new(0.25, [0.180, 0.384, 0.463]),
                ColorStop::new(0.5, [0.471, 0.667, 0.510]),
                ColorStop::new(0.75, [0.937, 0.871, 0.631]),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerraceConfig {
    pub resolution: u32,
    pub cell_size: f32,
    pub layer_height: f32,
}

impl Default for TerraceConfig {
    fn default() -> Self {
        Self {
            resolution: 64,
            cell_size: 0.15,
            layer_height: 0.1,
        }
    }
}

impl TerraceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.resolution == 0 {
            bail!("terrace resolution must be positive");
        }
        if !self.cell_size.is_finite() || self.cell_size <= 0.0 {
            bail!("cell size must be finite and positive, got {}", self.cell_size);
        }
        if !self.layer_height.is_finite() || self.layer_height <= 0.0 {
            bail!(
                "layer height must be finite and positive, got {}",
                self.layer_height
            );
        }
        Ok(())
    }

    /// Distance from the grid's centre to its edge.
    pub fn half_extent(&self) -> f32 {
        self.resolution as f32 * self.cell_size / 2.0
    }

    /// Centre of the unit cube drawn for `layer` of cell `(i, j)`.
    pub fn instance_center(&self, i: u32, j: u32, layer: usize) -> [f32; 3] {
        let cs = self.cell_size;
        let offset = self.half_extent();
        [
            i as f32 * cs - offset + cs / 2.0,
            layer as f32 * self.layer_height + self.layer_height / 2.0,
            j as f32 * cs - offset + cs / 2.0,
        ]
    }

    pub fn instance_scale(&self) -> [f32; 3] {
        [self.cell_size, self.layer_height, self.cell_size]
    }
}

/// Orientation of one side of the cube-wrap variant. The grid's +Y (up)
/// axis is rotated onto the face normal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CubeFace {
    PosX,
    NegX,
    PosY,
    NegY,
    PosZ,
    NegZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        Self::PosX,
        Self::NegX,
        Self::PosY,
        Self::NegY,
        Self::PosZ,
        Self::NegZ,
    ];

    pub fn normal(self) -> [f32; 3] {
        match self {
            Self::PosX => [1.0, 0.0, 0.0],
            Self::NegX => [-1.0, 0.0, 0.0],
            Self::PosY => [0.0, 1.0, 0.0],
            Self::NegY => [0.0, -1.0, 0.0],
            Self::PosZ => [0.0, 0.0, 1.0],
            Self::NegZ => [0.0, 0.0, -1.0],
        }
    }

    /// Row-major rotation matrix.
    pub fn rotation(self) -> [[f32; 3]; 3] {
        match self {
            Self::PosX => [[0.0, 1.0, 0.0], [-1.0, 0.0, 0.0], [0.0, 0.0, 1.0]],
            Self::NegX => [[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]],
            Self::PosY => IDENTITY,
            Self::NegY => [[1.0, 0.0, 0.0], [0.0, -1.0, 0.0], [0.0, 0.0, -1.0]],
            Self::PosZ => [[1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]],
            Self::NegZ => [[1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, -1.0, 0.0]],
        }
    }
}

const IDENTITY: [[f32; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaceMode {
    /// One flat grid.
    Single,
    /// The same grid on all six sides of a cube, pushed out by half its extent.
    Cube,
}

impl FaceMode {
    fn placements(self) -> &'static [Option<CubeFace>] {
        static SINGLE: [Option<CubeFace>; 1] = [None];
        static CUBE: [Option<CubeFace>; 6] = [
            Some(CubeFace::PosX),
            Some(CubeFace::NegX),
            Some(CubeFace::PosY),
            Some(CubeFace::NegY),
            Some(CubeFace::PosZ),
            Some(CubeFace::NegZ),
        ];
        match self {
            Self::Single => &SINGLE,
            Self::Cube => &CUBE,
        }
    }
}

/// Per-instance vertex data: column-major model matrix plus RGBA color.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable, PartialEq)]
pub struct InstanceRaw {
    pub model: [[f32; 4]; 4],
    pub color: [f32; 4],
}

impl InstanceRaw {
    pub fn translation(&self) -> [f32; 3] {
        let [x, y, z, _] = self.model[3];
        [x, y, z]
    }
}

fn model_matrix(rotation: &[[f32; 3]; 3], translation: [f32; 3], scale: [f32; 3]) -> [[f32; 4]; 4] {
    let mut model = [[0.0; 4]; 4];
    for (column, axis_scale) in scale.iter().enumerate() {
        for (row, rotation_row) in rotation.iter().enumerate() {
            model[column][row] = rotation_row[column] * axis_scale;
        }
    }
    model[3] = [translation[0], translation[1], translation[2], 1.0];
    model
}

fn rotate(rotation: &[[f32; 3]; 3], v: [f32; 3]) -> [f32; 3] {
    rotation.map(|row| row[0] * v[0] + row[1] * v[1] + row[2] * v[2])
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerStats {
    pub layer: usize,
    pub position: f32,
    pub color: String,
    pub instances: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TerraceStats {
    pub resolution: u32,
    pub faces: FaceMode,
    pub active_instances: usize,
    pub capacity: usize,
    pub layers: Vec<LayerStats>,
}

/// Instance buffer for the terraced grid. Capacity covers every layer of
/// every cell; only the first `active_count` entries are current.
pub struct TerraceMesh {
    config: TerraceConfig,
    ramp: ColorRamp,
    faces: FaceMode,
    instances: Vec<InstanceRaw>,
    active_count: usize,
    layer_counts: Vec<usize>,
}

impl TerraceMesh {
    pub fn new(config: TerraceConfig, ramp: ColorRamp, faces: FaceMode) -> Result<Self> {
        let capacity = Self::required_capacity(&config, &ramp, faces)?;
        Ok(Self {
            layer_counts: vec![0; ramp.layer_count()],
            instances: vec![InstanceRaw::zeroed(); capacity],
            active_count: 0,
            config,
            ramp,
            faces,
        })
    }

    pub fn config(&self) -> &TerraceConfig {
        &self.config
    }

    /// Instances a mesh for `config` would allocate. Fails when the config is
    /// invalid or the count exceeds [`MAX_INSTANCES`].
    pub fn required_capacity(
        config: &TerraceConfig,
        ramp: &ColorRamp,
        faces: FaceMode,
    ) -> Result<usize> {
        config.validate()?;
        let resolution = config.resolution as usize;
        let capacity = resolution
            .checked_mul(resolution)
            .and_then(|cells| cells.checked_mul(ramp.layer_count()))
            .and_then(|count| count.checked_mul(faces.placements().len()))
            .filter(|count| *count <= MAX_INSTANCES);
        match capacity {
            Some(capacity) => Ok(capacity),
            None => bail!(
                "a {resolution}x{resolution} terrace with {} layers on {} face(s) exceeds \
                 {MAX_INSTANCES} instances",
                ramp.layer_count(),
                faces.placements().len()
            ),
        }
    }

    pub fn capacity(&self) -> usize {
        self.instances.len()
    }

    /// Instances drawn by the last update.
    pub fn active_count(&self) -> usize {
        self.active_count
    }

    pub fn instances(&self) -> &[InstanceRaw] {
        &self.instances[..self.active_count]
    }

    /// Per-layer instance counts of the last update, summed over faces.
    pub fn layer_counts(&self) -> &[usize] {
        &self.layer_counts
    }

    /// Rebuilds the instance list from an RGBA heightmap of the configured
    /// resolution and returns the new active count.
    pub fn update(&mut self, pixels: &[u8]) -> Result<usize> {
        let n = self.config.resolution;
        let expected = n as usize * n as usize * 4;
        if pixels.len() != expected {
            bail!(
                "heightmap has {} bytes; a {n}x{n} terrace needs {expected}",
                pixels.len()
            );
        }

        self.layer_counts.iter_mut().for_each(|count| *count = 0);
        let scale = self.config.instance_scale();
        let half = self.config.half_extent();
        let mut written = 0;

        for placement in self.faces.placements() {
            let (rotation, push) = match placement {
                Some(face) => (face.rotation(), face.normal().map(|axis| axis * half)),
                None => (IDENTITY, [0.0; 3]),
            };
            for j in 0..n {
                for i in 0..n {
                    let red = pixels[(j as usize * n as usize + i as usize) * 4];
                    let value = f32::from(red) / 255.0;
                    for layer in 0..self.ramp.layers_for_value(value) {
                        let center = rotate(&rotation, self.config.instance_center(i, j, layer));
                        let translation = [
                            center[0] + push[0],
                            center[1] + push[1],
                            center[2] + push[2],
                        ];
                        let [r, g, b] = self.ramp.stops[layer].color;
                        self.instances[written] = InstanceRaw {
                            model: model_matrix(&rotation, translation, scale),
                            color: [r, g, b, 1.0],
                        };
                        self.layer_counts[layer] += 1;
                        written += 1;
                    }
                }
            }
        }

        self.active_count = written;
        Ok(written)
    }

    pub fn stats(&self) -> TerraceStats {
        TerraceStats {
            resolution: self.config.resolution,
            faces: self.faces,
            active_instances: self.active_count,
            capacity: self.capacity(),
            layers: self
                .ramp
                .stops()
                .iter()
                .zip(&self.layer_counts)
                .enumerate()
                .map(|(layer, (stop, instances))| LayerStats {
                    layer,
                    position: stop.position,
                    color: format_hex_color(stop.color),
                    instances: *instances,
                })
                .collect(),
        }
    }
}
