use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::cycle_capacity::CycleBaseline;
use crate::error::BattdegError;
use crate::schema::{ColumnLayout, ARBIN, PL_SAMPLES};

/// Which header dialect to expect in the source files.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LayoutChoice {
    Fixed(ColumnLayout),
    Auto,
}

/// Validated settings for one cell's pipeline. Built from JSON in a single
/// pass; past this point no dynamic type checks remain.
#[derive(Clone, Debug)]
pub struct CellSettings {
    pub data_dir: String,
    pub file_name_format: String,
    pub ignore_file_indices: Vec<u32>,
    pub layout: LayoutChoice,
    pub baseline: CycleBaseline,
    pub output_path: String,
}

impl CellSettings {
    pub fn from_value(value: &Value) -> Result<Self, BattdegError> {
        let obj = value.as_object().ok_or_else(|| {
            BattdegError::InvalidArgument("cell settings must be a JSON object".to_string())
        })?;

        let mut missing = Vec::new();
        for key in ["data_dir", "file_name_format", "output_path"] {
            if !obj.contains_key(key) {
                missing.push(key);
            }
        }
        if !missing.is_empty() {
            return Err(BattdegError::schema(missing));
        }

        let string_field = |key: &str| -> Result<String, BattdegError> {
            obj[key].as_str().map(str::to_string).ok_or_else(|| {
                BattdegError::InvalidArgument(format!("'{key}' is not of type string"))
            })
        };

        let data_dir = string_field("data_dir")?;
        let file_name_format = string_field("file_name_format")?;
        let output_path = string_field("output_path")?;

        let mut ignore_file_indices = Vec::new();
        if let Some(v) = obj.get("ignore_file_indices") {
            let list = v.as_array().ok_or_else(|| {
                BattdegError::InvalidArgument("'ignore_file_indices' should be a list".to_string())
            })?;
            for item in list {
                let n = item.as_u64().ok_or_else(|| {
                    BattdegError::InvalidArgument(
                        "'ignore_file_indices' elements should be non-negative integers"
                            .to_string(),
                    )
                })?;
                ignore_file_indices.push(n as u32);
            }
        }

        let layout = match obj.get("column_layout").map(|v| v.as_str()) {
            None => LayoutChoice::Auto,
            Some(Some("auto")) => LayoutChoice::Auto,
            Some(Some("arbin")) => LayoutChoice::Fixed(ARBIN),
            Some(Some("pl_samples")) => LayoutChoice::Fixed(PL_SAMPLES),
            Some(other) => {
                return Err(BattdegError::InvalidArgument(format!(
                    "'column_layout' must be one of auto, arbin, pl_samples (got {other:?})"
                )))
            }
        };

        let baseline = match obj.get("cycle_baseline").map(|v| v.as_str()) {
            None => CycleBaseline::CarryOver,
            Some(Some("carry_over")) => CycleBaseline::CarryOver,
            Some(Some("zero_based")) => CycleBaseline::ZeroBased,
            Some(other) => {
                return Err(BattdegError::InvalidArgument(format!(
                    "'cycle_baseline' must be carry_over or zero_based (got {other:?})"
                )))
            }
        };

        Ok(CellSettings {
            data_dir,
            file_name_format,
            ignore_file_indices,
            layout,
            baseline,
            output_path,
        })
    }
}

/// Load the settings file. The top level is either one cell object or
/// `{"cells": [...]}` for a batch run.
pub fn load_settings(path: &Path) -> Result<Vec<CellSettings>, BattdegError> {
    if !path.exists() {
        return Err(BattdegError::NotFound(format!(
            "settings file {} does not exist",
            path.display()
        )));
    }
    let data = fs::read_to_string(path)?;
    let root: Value = serde_json::from_str(&data)?;

    match root.get("cells") {
        Some(cells) => {
            let list = cells.as_array().ok_or_else(|| {
                BattdegError::InvalidArgument("'cells' should be a list".to_string())
            })?;
            list.iter().map(CellSettings::from_value).collect()
        }
        None => Ok(vec![CellSettings::from_value(&root)?]),
    }
}
