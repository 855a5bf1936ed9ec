//! # Input Configuration Module
//!
//! Configuration parsing and validation for nc2cmor jobs. A job names a
//! CMOR-compliant template file, a data source to read the replacement array
//! from, an output destination and a list of scoped metadata overrides.
//!
//! ## Configuration Structure
//!
//! - **template_key**: Path to the CMOR-compliant template NetCDF file
//! - **data_key**: Path to the NetCDF file holding the replacement values
//! - **variable_name**: Variable to read from the data file (defaults to the
//!   template's `variable_id`)
//! - **output_key**: Path for the output NetCDF file
//! - **overrides**: Scoped attribute overrides applied after copying
//! - **update_history**: Whether to prepend a timestamped `history` entry
//!
//! ## Example Usage
//!
//! ```rust
//! use nc2cmor::input::JobConfig;
//!
//! let json = r#"
//! {
//!   "template_key": "tas_Amon_MPI-ESM1-2-LR_amip_r1i1p1f1_gr_197901-199812.nc",
//!   "data_key": "my_model_tas.nc",
//!   "output_key": "tas_Amon_MyModel_aimip_r1i1p1f1_gr_197901-199812.nc",
//!   "overrides": [
//!     { "scope": "global", "name": "source_id", "value": "MyModel" }
//!   ]
//! }"#;
//! let config = JobConfig::from_json(json)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::template::MetadataOverrides;
use netcdf::AttributeValue;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Main configuration structure for nc2cmor jobs.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct JobConfig {
    /// Path to the CMOR-compliant template NetCDF file
    pub template_key: String,
    /// Path to the NetCDF file providing the replacement data values
    pub data_key: String,
    /// Variable to read from the data file; defaults to the template's
    /// `variable_id` when omitted
    #[serde(default)]
    pub variable_name: Option<String>,
    /// Path for the output NetCDF file (overwritten if present)
    pub output_key: String,
    /// Scoped attribute overrides applied after template metadata is copied
    #[serde(default)]
    pub overrides: Vec<OverrideConfig>,
    /// Prepend a timestamped entry to the global `history` attribute
    #[serde(default)]
    pub update_history: bool,
}

/// Attribute scope an override applies to.
///
/// Scoping is explicit so an override name can never be ambiguous between
/// the file's global attributes and the primary variable's attributes.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttrScope {
    /// Global (file-level) attribute
    #[default]
    Global,
    /// Attribute on the primary data variable
    Variable,
}

impl std::fmt::Display for AttrScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttrScope::Global => write!(f, "global"),
            AttrScope::Variable => write!(f, "variable"),
        }
    }
}

/// A single attribute override.
///
/// # Examples
///
/// ```rust
/// use nc2cmor::input::{AttrScope, OverrideConfig, OverrideValue};
///
/// let ov = OverrideConfig {
///     scope: AttrScope::Global,
///     name: "source_id".to_string(),
///     value: OverrideValue::Text("MyNewModelFromArray".to_string()),
/// };
/// assert_eq!(ov.scope, AttrScope::Global);
/// ```
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct OverrideConfig {
    /// Where the attribute lives (defaults to global)
    #[serde(default)]
    pub scope: AttrScope,
    /// Attribute name
    pub name: String,
    /// Replacement value
    pub value: OverrideValue,
}

/// Replacement value for an overridden attribute.
///
/// Configuration files carry JSON/YAML scalars; these map onto NetCDF
/// attribute types as `NC_INT64`, `NC_DOUBLE` or `NC_STRING`.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum OverrideValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl OverrideValue {
    /// Parses a command-line value: integers and floats stay numeric,
    /// anything else is text.
    pub fn parse(raw: &str) -> Self {
        if let Ok(i) = raw.parse::<i64>() {
            OverrideValue::Integer(i)
        } else if let Ok(f) = raw.parse::<f64>() {
            OverrideValue::Float(f)
        } else {
            OverrideValue::Text(raw.to_string())
        }
    }
}

impl From<&OverrideValue> for AttributeValue {
    fn from(value: &OverrideValue) -> Self {
        match value {
            OverrideValue::Integer(i) => AttributeValue::Longlong(*i),
            OverrideValue::Float(f) => AttributeValue::Double(*f),
            OverrideValue::Text(s) => AttributeValue::Str(s.clone()),
        }
    }
}

impl JobConfig {
    /// Loads a job configuration from a JSON or YAML file, chosen by the
    /// file extension (`.yaml`/`.yml` for YAML, JSON otherwise).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        if is_yaml {
            Self::from_yaml(&content)
        } else {
            Self::from_json(&content)
        }
    }

    /// Loads a job configuration from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let config: JobConfig = serde_json::from_str(json_str)?;
        Ok(config)
    }

    /// Loads a job configuration from a YAML string.
    pub fn from_yaml(yaml_str: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let config: JobConfig = serde_yaml::from_str(yaml_str)?;
        Ok(config)
    }

    /// Collects the configured overrides into the form the CMORizer takes.
    pub fn to_overrides(&self) -> MetadataOverrides {
        let mut overrides = MetadataOverrides::new();
        for ov in &self.overrides {
            let value: AttributeValue = (&ov.value).into();
            match ov.scope {
                AttrScope::Global => overrides.set_global(ov.name.clone(), value),
                AttrScope::Variable => overrides.set_variable(ov.name.clone(), value),
            }
        }
        overrides
    }
}
