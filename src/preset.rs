//! Preset files: a graph snapshot plus the settings the relief view needs.
//!
//! Presets are YAML or JSON (picked by extension) in the editor's shape:
//! `nodes` and `connections` arrays, with optional `resolution`,
//! `layerHeight`, `cellSize`, `worldSize` and `colorRamp`.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

use crate::graph::{Connection, Graph, NodeKind, NodeRecord, ParameterSettings};
use crate::heightmap::{BackendKind, HeightmapConfig, MAX_RESOLUTION};
use crate::terrace::{ColorRamp, ColorStop, TerraceConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetFormat {
    Yaml,
    Json,
}

impl PresetFormat {
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|extension| extension.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PresetRecord {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    nodes: Vec<NodeRecord>,
    #[serde(default)]
    connections: Vec<Connection>,
    #[serde(default, alias = "resolutionOverride")]
    resolution: Option<u32>,
    #[serde(default, alias = "layer_height")]
    layer_height: Option<f32>,
    #[serde(default, alias = "cell_size")]
    cell_size: Option<f32>,
    #[serde(default, alias = "world_size")]
    world_size: Option<[f32; 2]>,
    #[serde(default, alias = "color_ramp")]
    color_ramp: Vec<ColorStopRecord>,
}

#[derive(Debug, Clone, Deserialize)]
struct ColorStopRecord {
    position: f32,
    color: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Preset {
    pub name: String,
    pub graph: Graph,
    pub resolution: Option<u32>,
    pub layer_height: Option<f32>,
    pub cell_size: Option<f32>,
    pub world_size: Option<[f32; 2]>,
    pub color_ramp: ColorRamp,
}

pub fn load_preset(path: &Path) -> Result<Preset> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read preset {}", path.display()))?;
    let fallback_name = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("preset");
    parse_preset(&contents, PresetFormat::from_path(path), fallback_name)
        .with_context(|| format!("invalid preset {}", path.display()))
}

pub fn parse_preset(contents: &str, format: PresetFormat, fallback_name: &str) -> Result<Preset> {
    let record: PresetRecord = match format {
        PresetFormat::Yaml => serde_yaml::from_str(contents).map_err(|error| {
            let location = error
                .location()
                .map(|location| format!("line {}, column {}", location.line(), location.column()))
                .unwrap_or_else(|| "unknown location".to_owned());
            anyhow!("failed to parse yaml at {location}: {error}")
        })?,
        PresetFormat::Json => serde_json::from_str(contents).map_err(|error| {
            anyhow!(
                "failed to parse json at line {}, column {}: {error}",
                error.line(),
                error.column()
            )
        })?,
    };

    if let Some(resolution) = record.resolution {
        if resolution == 0 || resolution > MAX_RESOLUTION {
            bail!("resolution must be within 1..={MAX_RESOLUTION}, got {resolution}");
        }
    }

    let color_ramp = if record.color_ramp.is_empty() {
        ColorRamp::default()
    } else {
        let stops = record
            .color_ramp
            .iter()
            .map(|stop| ColorStop::from_hex(stop.position, &stop.color))
            .collect::<Result<Vec<_>>>()?;
        ColorRamp::new(stops).context("invalid colorRamp")?
    };

    Ok(Preset {
        name: record.name.unwrap_or_else(|| fallback_name.to_owned()),
        graph: Graph::from_records(record.nodes, record.connections),
        resolution: record.resolution,
        layer_height: record.layer_height,
        cell_size: record.cell_size,
        world_size: record.world_size,
        color_ramp,
    })
}

/// `name=value` assignment to a PARAMETER node, addressed by its name or id.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamOverride {
    pub target: String,
    pub value: f32,
}

impl FromStr for ParamOverride {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let (target, value) = raw
            .split_once('=')
            .ok_or_else(|| anyhow!("parameter override '{raw}' must look like name=value"))?;
        let target = target.trim();
        if target.is_empty() {
            bail!("parameter override '{raw}' has an empty name");
        }
        let value = value
            .trim()
            .parse::<f32>()
            .with_context(|| format!("parameter override '{raw}' has a non-numeric value"))?;
        if !value.is_finite() {
            bail!("parameter override '{raw}' must be finite");
        }
        Ok(Self {
            target: target.to_owned(),
            value,
        })
    }
}

/// One baked copy of a preset's graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Variation {
    pub value: f32,
    pub graph: Graph,
}

impl Preset {
    pub fn heightmap_config(&self, backend: BackendKind) -> HeightmapConfig {
        let defaults = HeightmapConfig::default();
        HeightmapConfig {
            resolution: self.resolution.unwrap_or(defaults.resolution),
            world_size: self.world_size.unwrap_or(defaults.world_size),
            use_world_pos: self.world_size.is_some(),
            backend,
        }
    }

    pub fn terrace_config(&self, resolution: u32) -> TerraceConfig {
        let defaults = TerraceConfig::default();
        TerraceConfig {
            resolution,
            cell_size: self.cell_size.unwrap_or(defaults.cell_size),
            layer_height: self.layer_height.unwrap_or(defaults.layer_height),
        }
    }

    /// Applies overrides in order, clamping each value into its parameter's range.
    pub fn apply_overrides(&mut self, overrides: &[ParamOverride]) -> Result<()> {
        for entry in overrides {
            let settings = find_parameter_mut(&mut self.graph, &entry.target)
                .ok_or_else(|| anyhow!("preset has no parameter named '{}'", entry.target))?;
            settings.value = settings.clamp_value(entry.value);
        }
        Ok(())
    }

    /// `count` copies of the graph with `parameter` baked at evenly spaced
    /// points of its `[min, max]` range. A single variation takes the midpoint.
    pub fn variations(&self, parameter: &str, count: usize) -> Result<Vec<Variation>> {
        if count == 0 {
            bail!("variation count must be positive");
        }
        let mut template = self.graph.clone();
        let settings = find_parameter_mut(&mut template, parameter)
            .ok_or_else(|| anyhow!("preset has no parameter named '{parameter}'"))?;
        let (min, max) = (settings.min, settings.max);

        let mut variations = Vec::with_capacity(count);
        for index in 0..count {
            let t = if count == 1 {
                0.5
            } else {
                index as f32 / (count - 1) as f32
            };
            let mut graph = template.clone();
            let value = match find_parameter_mut(&mut graph, parameter) {
                Some(settings) => {
                    settings.value = settings.clamp_value(min + (max - min) * t);
                    settings.value
                }
                None => bail!("parameter '{parameter}' disappeared while baking variations"),
            };
            variations.push(Variation { value, graph });
        }
        Ok(variations)
    }
}

/// PARAMETER node whose display name matches, else whose id matches.
fn find_parameter_mut<'g>(graph: &'g mut Graph, target: &str) -> Option<&'g mut ParameterSettings> {
    let index = graph
        .nodes
        .iter()
        .position(|node| matches!(&node.kind, NodeKind::Parameter(settings) if settings.name == target))
        .or_else(|| {
            graph.nodes.iter().position(|node| {
                node.id == target && matches!(node.kind, NodeKind::Parameter(_))
            })
        })?;
    match &mut graph.nodes[index].kind {
        NodeKind::Parameter(settings) => Some(settings),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{compile, CompileOptions};

    const RIDGES: &str = r##"
name: ridges
resolution: 16
layerHeight: 0.2
colorRamp:
  - { position: 0.6, color: "#ffffff" }
  - { position: 0.0, color: "#000000" }
nodes:
  - { id: amp, type: PARAMETER, data: { name: amplitude, value: 0.5, min: 0, max: 2 } }
  - { id: wave, type: WAVE_TEXTURE, data: { waveType: RINGS } }
  - { id: mul, type: MATH, data: { operation: MULTIPLY } }
  - { id: out, type: OUTPUT }
connections:
  - { fromNode: wave, fromSocket: value, toNode: mul, toSocket: a }
  - { fromNode: amp, fromSocket: value, toNode: mul, toSocket: b }
  - { fromNode: mul, fromSocket: value, toNode: out, toSocket: value }
"##;

    fn amplitude(graph: &Graph) -> f32 {
        graph
            .parameters()
            .find(|(_, settings)| settings.name == "amplitude")
            .map(|(_, settings)| settings.value)
            .unwrap()
    }

    #[test]
    fn yaml_preset_carries_settings_and_sorted_ramp() {
        let preset = parse_preset(RIDGES, PresetFormat::Yaml, "fallback").unwrap();
        assert_eq!(preset.name, "ridges");
        assert_eq!(preset.resolution, Some(16));
        assert_eq!(preset.terrace_config(16).layer_height, 0.2);
        assert_eq!(preset.color_ramp.stops()[0].position, 0.0);
        assert_eq!(preset.graph.nodes.len(), 4);
        assert!(preset.graph.diagnostics().is_empty());
    }

    #[test]
    fn yaml_errors_report_a_location() {
        let error = parse_preset("nodes: [\n  - {id: a", PresetFormat::Yaml, "broken")
            .unwrap_err()
            .to_string();
        assert!(error.contains("line"), "{error}");
    }

    #[test]
    fn json_presets_parse_by_format() {
        let json = r#"{"nodes":[{"id":"o","type":"OUTPUT"}],"connections":[],"resolutionOverride":8}"#;
        let preset = parse_preset(json, PresetFormat::Json, "from-file").unwrap();
        assert_eq!(preset.name, "from-file");
        assert_eq!(preset.resolution, Some(8));
        assert_eq!(PresetFormat::from_path(Path::new("a/b.JSON")), PresetFormat::Json);
        assert_eq!(PresetFormat::from_path(Path::new("a/b.yml")), PresetFormat::Yaml);
    }

    #[test]
    fn overrides_clamp_into_parameter_range() {
        let mut preset = parse_preset(RIDGES, PresetFormat::Yaml, "p").unwrap();
        preset
            .apply_overrides(&["amplitude=9".parse().unwrap()])
            .unwrap();
        assert_eq!(amplitude(&preset.graph), 2.0);
        preset.apply_overrides(&["amp = 0.25".parse().unwrap()]).unwrap();
        assert_eq!(amplitude(&preset.graph), 0.25);

        assert!(preset
            .apply_overrides(&["missing=1".parse().unwrap()])
            .is_err());
        assert!("novalue".parse::<ParamOverride>().is_err());
        assert!("x=abc".parse::<ParamOverride>().is_err());
    }

    #[test]
    fn variations_bake_values_before_compiling() {
        let preset = parse_preset(RIDGES, PresetFormat::Yaml, "p").unwrap();
        let variations = preset.variations("amplitude", 3).unwrap();
        let values = variations.iter().map(|v| v.value).collect::<Vec<_>>();
        assert_eq!(values, vec![0.0, 1.0, 2.0]);

        let sources = variations
            .iter()
            .map(|variation| compile(&variation.graph, &CompileOptions::default()).source)
            .collect::<Vec<_>>();
        assert_ne!(sources[0], sources[1]);
        assert!(sources[2].contains("let n_amp_value: f32 = 2.0;"));
        assert_eq!(amplitude(&preset.graph), 0.5);

        assert_eq!(preset.variations("amplitude", 1).unwrap()[0].value, 1.0);
        assert!(preset.variations("amplitude", 0).is_err());
    }
}
