//! Flat `key = value` docking configuration files.
//!
//! These files live beside the docking binary and use the binary's own option
//! names. Known keys are lifted into the nested YAML tree so they layer like
//! any other source.
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;

/// Parse `key = value` lines. `#` starts a comment; keys are lower-cased.
pub(super) fn parse_key_values(text: &str) -> BTreeMap<String, String> {
    let mut entries = BTreeMap::new();
    for raw in text.lines() {
        let line = raw.split_once('#').map_or(raw, |(before, _)| before).trim();
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        if key.is_empty() {
            continue;
        }
        entries.insert(key, value.trim().to_string());
    }
    entries
}

fn section_for(key: &str) -> Option<(&'static str, &'static str)> {
    let mapped = match key {
        "center_x" => ("box", "center_x"),
        "center_y" => ("box", "center_y"),
        "center_z" => ("box", "center_z"),
        "size_x" => ("box", "size_x"),
        "size_y" => ("box", "size_y"),
        "size_z" => ("box", "size_z"),
        "exhaustiveness" => ("vina", "exhaustiveness"),
        "num_modes" => ("vina", "num_modes"),
        "energy_range" => ("vina", "energy_range"),
        "seed" => ("vina", "seed"),
        "cpu" => ("vina", "cpu"),
        "thread" => ("gpu", "thread"),
        "search_depth" => ("gpu", "search_depth"),
        "receptor" | "receptor_file" => ("docking", "receptor"),
        "ligand_directory" => ("docking", "ligand_directory"),
        "output_directory" => ("docking", "output_directory"),
        _ => return None,
    };
    Some(mapped)
}

/// Build a YAML layer from parsed entries, dropping keys nothing reads.
pub(super) fn lift_into_tree(entries: &BTreeMap<String, String>) -> Value {
    let mut root = Mapping::new();
    // `receptor` wins over `receptor_file` when both are present.
    let mut ordered: Vec<(&String, &String)> = entries.iter().collect();
    ordered.sort_by_key(|(key, _)| key.as_str() == "receptor");
    for (key, value) in ordered {
        let Some((section, field)) = section_for(key) else {
            tracing::debug!(key = %key, "docking config key ignored");
            continue;
        };
        if value.is_empty() {
            continue;
        }
        let section_value = root
            .entry(Value::String(section.to_string()))
            .or_insert_with(|| Value::Mapping(Mapping::new()));
        if let Value::Mapping(section_map) = section_value {
            section_map.insert(
                Value::String(field.to_string()),
                Value::String(value.clone()),
            );
        }
    }
    Value::Mapping(root)
}
