//! Run configuration resolved from layered sources.
//!
//! Sources are read in order and merged recursively, later layers winning.
//! Missing files are empty layers. The resulting [`RunConfig`] is built once
//! per run and never mutated. Its fingerprint hashes the literal source text,
//! so any byte change in any layer invalidates cached docking results.
mod kv;

use crate::paths::ProjectPaths;
use crate::util::sha256_hex;
use anyhow::{Context, Result};
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_MEEKO_CMD: &str = "mk_prepare_ligand.py";
pub const DEFAULT_PYTHON_EXE: &str = "python";
pub const DEFAULT_CENTER: f64 = 0.0;
pub const DEFAULT_SIZE: f64 = 20.0;
pub const DEFAULT_EXHAUSTIVENESS: u32 = 8;
pub const DEFAULT_NUM_MODES: u32 = 9;
pub const DEFAULT_ENERGY_RANGE: u32 = 3;
pub const DEFAULT_GPU_THREAD: u32 = 10000;
pub const DEFAULT_SEARCH_DEPTH: u32 = 32;
/// Some Vina-GPU builds misbehave below this thread count.
pub const MIN_GPU_THREAD: u32 = 1000;

/// Hex characters kept from the configuration digest.
pub const FINGERPRINT_LEN: usize = 10;
const EMPTY_SOURCES_PLACEHOLDER: &str = "{}";
const SOURCE_SEPARATOR: &str = "||";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// Nested YAML mapping (`config/run.yml`, `config/machine.yml`, `--config`).
    Yaml,
    /// Flat `key = value` docking file (`VinaConfig.txt`, `VinaGPUConfig.txt`).
    KeyValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSource {
    pub path: PathBuf,
    pub format: SourceFormat,
}

/// Ordered list of configuration layers.
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    sources: Vec<ConfigSource>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolSettings {
    pub meeko_cmd: String,
    pub python_exe: String,
    pub vina_cmd: Option<String>,
    pub vina_gpu_cmd: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchBox {
    pub center: [f64; 3],
    pub size: [f64; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VinaParams {
    pub exhaustiveness: u32,
    pub num_modes: u32,
    pub energy_range: u32,
    pub seed: Option<i64>,
    pub cpu: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuParams {
    pub thread: u32,
    pub search_depth: u32,
}

/// Docking-specific locations, still unresolved against any base directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DockingLocations {
    pub receptor: Option<PathBuf>,
    pub ligand_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    /// Directory of the last key=value source; relative receptors resolve here.
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub tools: ToolSettings,
    pub skip_if_done: bool,
    pub search_box: SearchBox,
    pub vina: VinaParams,
    pub gpu: GpuParams,
    pub docking: DockingLocations,
    pub fingerprint: String,
    /// Sources that existed and contributed text to the fingerprint.
    pub sources: Vec<PathBuf>,
}

impl ConfigResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_yaml(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.push(ConfigSource {
            path: path.into(),
            format: SourceFormat::Yaml,
        });
        self
    }

    pub fn with_key_value(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.push(ConfigSource {
            path: path.into(),
            format: SourceFormat::KeyValue,
        });
        self
    }

    /// Standard project layering: `config/run.yml`, `config/machine.yml`, the
    /// docking key=value file when given, then each extra YAML file in order.
    pub fn for_project(paths: &ProjectPaths, docking: Option<&Path>, extras: &[PathBuf]) -> Self {
        let mut resolver = Self::new()
            .with_yaml(paths.run_config_path())
            .with_yaml(paths.machine_config_path());
        if let Some(path) = docking {
            resolver = resolver.with_key_value(path);
        }
        for extra in extras {
            resolver = resolver.with_yaml(extra);
        }
        resolver
    }

    #[cfg(test)]
    pub fn sources(&self) -> &[ConfigSource] {
        &self.sources
    }

    /// Read every layer, merge, and derive the run configuration.
    pub fn resolve(&self) -> Result<RunConfig> {
        let mut tree = Value::Mapping(Mapping::new());
        let mut texts = Vec::new();
        let mut used = Vec::new();
        let mut base_dir = None;
        for source in &self.sources {
            let Some(text) = read_optional(&source.path)? else {
                tracing::debug!(path = %source.path.display(), "config source absent");
                continue;
            };
            let layer = match source.format {
                SourceFormat::Yaml => parse_yaml_layer(&source.path, &text),
                SourceFormat::KeyValue => {
                    base_dir = source.path.parent().map(Path::to_path_buf);
                    kv::lift_into_tree(&kv::parse_key_values(&text))
                }
            };
            deep_merge(&mut tree, layer);
            texts.push(text);
            used.push(source.path.clone());
        }
        let fingerprint = fingerprint_texts(&texts);
        let mut config = build_run_config(&tree, fingerprint);
        config.docking.base_dir = base_dir;
        config.sources = used;
        Ok(config)
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("read config {}", path.display())),
    }
}

fn parse_yaml_layer(path: &Path, text: &str) -> Value {
    match serde_yaml::from_str::<Value>(text) {
        Ok(value @ Value::Mapping(_)) => value,
        Ok(Value::Null) => Value::Mapping(Mapping::new()),
        Ok(_) => {
            tracing::warn!(path = %path.display(), "config layer is not a mapping; ignored");
            Value::Mapping(Mapping::new())
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "config layer unparsable; ignored");
            Value::Mapping(Mapping::new())
        }
    }
}

/// Merge `src` into `dst`; nested mappings merge key by key, anything else replaces.
pub fn deep_merge(dst: &mut Value, src: Value) {
    match (dst, src) {
        (Value::Mapping(dst_map), Value::Mapping(src_map)) => {
            for (key, value) in src_map {
                let nested = value.is_mapping() && dst_map.get(&key).is_some_and(Value::is_mapping);
                if !nested {
                    dst_map.insert(key, value);
                } else if let Some(existing) = dst_map.get_mut(&key) {
                    deep_merge(existing, value);
                }
            }
        }
        (dst, src) => *dst = src,
    }
}

/// Short digest over the literal text of every configuration source.
pub fn fingerprint_texts(texts: &[String]) -> String {
    let joined = if texts.is_empty() {
        EMPTY_SOURCES_PLACEHOLDER.to_string()
    } else {
        texts.join(SOURCE_SEPARATOR)
    };
    let digest = sha256_hex(joined.as_bytes());
    digest[..FINGERPRINT_LEN].to_string()
}

fn build_run_config(tree: &Value, fingerprint: String) -> RunConfig {
    let tools = ToolSettings {
        meeko_cmd: string_at(tree, &["tools", "meeko_cmd"])
            .unwrap_or_else(|| DEFAULT_MEEKO_CMD.to_string()),
        python_exe: string_at(tree, &["tools", "python_exe"])
            .unwrap_or_else(|| DEFAULT_PYTHON_EXE.to_string()),
        vina_cmd: string_at(tree, &["tools", "vina_cmd"]),
        vina_gpu_cmd: string_at(tree, &["tools", "vina_gpu_cmd"]),
    };
    let search_box = SearchBox {
        center: [
            float_at(tree, &["box", "center_x"], DEFAULT_CENTER),
            float_at(tree, &["box", "center_y"], DEFAULT_CENTER),
            float_at(tree, &["box", "center_z"], DEFAULT_CENTER),
        ],
        size: [
            float_at(tree, &["box", "size_x"], DEFAULT_SIZE),
            float_at(tree, &["box", "size_y"], DEFAULT_SIZE),
            float_at(tree, &["box", "size_z"], DEFAULT_SIZE),
        ],
    };
    let vina = VinaParams {
        exhaustiveness: uint_at(tree, &["vina", "exhaustiveness"], DEFAULT_EXHAUSTIVENESS),
        num_modes: uint_at(tree, &["vina", "num_modes"], DEFAULT_NUM_MODES),
        energy_range: uint_at(tree, &["vina", "energy_range"], DEFAULT_ENERGY_RANGE),
        seed: lookup(tree, &["vina", "seed"]).and_then(as_i64),
        cpu: lookup(tree, &["vina", "cpu"])
            .and_then(as_i64)
            .and_then(|value| u32::try_from(value).ok()),
    };
    let gpu = GpuParams {
        thread: clamp_gpu_thread(
            lookup(tree, &["gpu", "thread"])
                .and_then(as_i64)
                .unwrap_or(i64::from(DEFAULT_GPU_THREAD)),
        ),
        search_depth: uint_at(tree, &["gpu", "search_depth"], DEFAULT_SEARCH_DEPTH),
    };
    let docking = DockingLocations {
        receptor: string_at(tree, &["docking", "receptor"]).map(PathBuf::from),
        ligand_dir: string_at(tree, &["docking", "ligand_directory"]).map(PathBuf::from),
        output_dir: string_at(tree, &["docking", "output_directory"]).map(PathBuf::from),
        base_dir: None,
    };
    RunConfig {
        tools,
        skip_if_done: bool_at(tree, &["policy", "skip_if_done"], true),
        search_box,
        vina,
        gpu,
        docking,
        fingerprint,
        sources: Vec::new(),
    }
}

/// Raise the GPU thread count to the minimum the Vina-GPU build accepts.
/// Negative values are clamped like any other too-small count.
fn clamp_gpu_thread(thread: i64) -> u32 {
    if thread < i64::from(MIN_GPU_THREAD) {
        tracing::warn!(
            configured = thread,
            applied = MIN_GPU_THREAD,
            "gpu.thread below Vina-GPU minimum; raised"
        );
        return MIN_GPU_THREAD;
    }
    u32::try_from(thread).unwrap_or(u32::MAX)
}

fn lookup<'a>(tree: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = tree;
    for key in path {
        current = current.get(*key)?;
    }
    Some(current)
}

fn string_at(tree: &Value, path: &[&str]) -> Option<String> {
    let value = lookup(tree, path)?;
    let text = match value {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn float_at(tree: &Value, path: &[&str], default: f64) -> f64 {
    lookup(tree, path)
        .and_then(as_f64)
        .filter(|value| value.is_finite())
        .unwrap_or(default)
}

fn uint_at(tree: &Value, path: &[&str], default: u32) -> u32 {
    lookup(tree, path)
        .and_then(as_i64)
        .and_then(|value| u32::try_from(value).ok())
        .unwrap_or(default)
}

fn bool_at(tree: &Value, path: &[&str], default: bool) -> bool {
    match lookup(tree, path) {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(text)) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => true,
            "false" | "no" | "off" | "0" => false,
            _ => default,
        },
        Some(Value::Number(number)) => number.as_i64().map_or(default, |value| value != 0),
        _ => default,
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
