//! Declarative record transform configured under `[input.extend-output]`

use crate::config::ExtendOutputConfig;
use crate::output::{OutputExtension, OutputResult};
use crate::ConfigError;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Omits, renames and adds fields, in that order
#[derive(Debug, Clone, Default)]
pub struct FieldMapExtension {
    omit: Vec<String>,
    rename: BTreeMap<String, String>,
    constants: Map<String, Value>,
}

impl FieldMapExtension {
    /// Builds the transform from configuration, rejecting invalid mappings
    pub fn from_config(config: &ExtendOutputConfig) -> Result<Self, ConfigError> {
        crate::config::validate_extend_output(config)?;

        let mut constants = Map::new();
        for (key, value) in &config.constants {
            let value = serde_json::to_value(value).map_err(|e| {
                ConfigError::InvalidExtension(format!("constant '{}': {}", key, e))
            })?;
            constants.insert(key.clone(), value);
        }

        Ok(Self {
            omit: config.omit.clone(),
            rename: config.rename.clone(),
            constants,
        })
    }
}

impl OutputExtension for FieldMapExtension {
    fn extend(&self, mut record: Map<String, Value>) -> OutputResult<Map<String, Value>> {
        for field in &self.omit {
            record.remove(field);
        }

        for (from, to) in &self.rename {
            if let Some(value) = record.remove(from) {
                record.insert(to.clone(), value);
            }
        }

        for (key, value) in &self.constants {
            record.insert(key.clone(), value.clone());
        }

        Ok(record)
    }
}
