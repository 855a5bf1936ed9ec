//! # CLI Module
//!
//! This module provides the command-line interface for nc2cmor, including:
//! - Argument parsing with clap
//! - Configuration file loading (JSON/YAML)
//! - Environment variable support with the NC2CMOR_ prefix
//! - Multi-source configuration merging (CLI > environment > config file)
//! - Subcommands for different operations
//! - Override DSL parsing for command line and environment variables

use crate::input::{AttrScope, JobConfig, OverrideConfig, OverrideValue};
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::env;
use std::path::PathBuf;

/// Template-based CMORizer for AIMIP NetCDF output
#[derive(Parser, Debug)]
#[command(name = "nc2cmor")]
#[command(about = "Produce CMOR-compliant NetCDF files from a compliant template")]
#[command(version)]
#[command(long_about = "
nc2cmor produces CMOR-compliant NetCDF files for the AIMIP intercomparison by
reusing an existing compliant file as a metadata template: coordinates, bounds
and attributes are copied, the data values are substituted, and selected
attributes can be overridden.

FEATURES:
  • Template-based conversion: coordinates and metadata carried over verbatim
  • Scoped overrides: global (--set) and variable-level (--set-var) attributes
  • Pressure-level extraction: nearest-neighbour selection along plev
  • Configuration files: JSON and YAML with templates to start from
  • File inspection: dimensions, variables and attributes in several formats

EXAMPLES:
  # Basic conversion
  nc2cmor cmorize --template tas_Amon_ref.nc --data my_tas.nc out.nc \\
    --set source_id=MyNewModelFromArray

  # Using a config file
  nc2cmor cmorize --config job.yaml

  # Pressure-level extraction (levels in Pa)
  nc2cmor extract-levels zg_Amon.nc zg_500.nc --levels 50000

  # File inspection
  nc2cmor info tas_Amon_ref.nc --detailed

  # Generate a config template
  nc2cmor template basic --format yaml > job.yaml
")]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode - suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output format for structured data
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Configuration file path (JSON or YAML)
    #[arg(short, long, global = true, env = "NC2CMOR_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Produce a CMOR-compliant file from a template and a data file
    #[command(long_about = "
Produce a CMOR-compliant NetCDF file from a template and a data file.

The template's coordinate variables, bounds, dimensions and attributes are
copied verbatim; the primary variable's values are replaced with the values
read from the data file. Attribute overrides are explicitly scoped: --set
writes global attributes, --set-var writes attributes on the primary
variable.

EXAMPLES:
  # Basic conversion with overrides
  nc2cmor cmorize --template tas_Amon_ref.nc --data my_tas.nc out.nc \\
    --set source_id=MyModel --set institution_id=MOI \\
    --set-var comment='regridded to 1x1 degree'

  # Record the conversion in the history attribute
  nc2cmor cmorize --config job.json --update-history

  # Dry run for validation
  nc2cmor cmorize --config job.json --dry-run
")]
    Cmorize {
        /// Output NetCDF file path (overwritten if present)
        #[arg(value_name = "OUTPUT", env = "NC2CMOR_OUTPUT")]
        output: Option<String>,

        /// Template NetCDF file path
        #[arg(short, long, env = "NC2CMOR_TEMPLATE")]
        template: Option<String>,

        /// Data NetCDF file path providing the replacement values
        #[arg(short, long, env = "NC2CMOR_DATA")]
        data: Option<String>,

        /// Variable to read from the data file (defaults to the template's
        /// variable_id)
        #[arg(short = 'n', long, env = "NC2CMOR_VARIABLE")]
        variable: Option<String>,

        /// Override a global attribute: KEY=VALUE
        #[arg(long = "set", value_parser = parse_override)]
        set: Vec<OverrideArg>,

        /// Override an attribute on the primary variable: KEY=VALUE
        #[arg(long = "set-var", value_parser = parse_override)]
        set_var: Vec<OverrideArg>,

        /// Prepend a timestamped entry to the history attribute
        #[arg(long, env = "NC2CMOR_UPDATE_HISTORY")]
        update_history: bool,

        /// Dry run - validate configuration without processing
        #[arg(long, env = "NC2CMOR_DRY_RUN")]
        dry_run: bool,
    },

    /// Extract pressure levels from a NetCDF file
    #[command(long_about = "
Extract selected pressure levels from a CMOR-compliant NetCDF file.

Each requested level (in Pa) selects the nearest entry of the plev
coordinate; no vertical interpolation takes place. The output preserves the
input's metadata and stays template-eligible.

EXAMPLES:
  # 500 hPa geopotential height
  nc2cmor extract-levels zg_Amon.nc zg_500.nc --levels 50000

  # Several levels at once
  nc2cmor extract-levels zg_Amon.nc zg_subset.nc --levels 85000,50000,25000
")]
    ExtractLevels {
        /// Input NetCDF file path
        input: String,

        /// Output NetCDF file path (overwritten if present)
        output: String,

        /// Pressure levels to extract, in Pa
        #[arg(long, value_delimiter = ',', required = true)]
        levels: Vec<f64>,
    },

    /// Show information about a NetCDF file
    #[command(long_about = "
Inspect NetCDF files and display structure information.

EXAMPLES:
  # Basic file info
  nc2cmor info data.nc

  # Detailed information including global attributes
  nc2cmor info tas_Amon_ref.nc --detailed

  # JSON output for scripting
  nc2cmor info data.nc --format json
")]
    Info {
        /// NetCDF file path
        file: String,

        /// Show global attributes as well
        #[arg(long)]
        detailed: bool,

        /// Show only specific variable info
        #[arg(short = 'n', long)]
        variable: Option<String>,

        /// Output format for file information
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },

    /// Generate configuration templates
    #[command(long_about = "
Generate configuration file templates for common use cases.

Available templates:
• basic: minimal conversion job
• amon: monthly atmospheric variable with typical overrides
• plev: conversion of a pressure-level variable

EXAMPLES:
  nc2cmor template basic
  nc2cmor template amon --format yaml -o job.yaml
")]
    Template {
        /// Template type to generate
        #[arg(value_enum)]
        template_type: TemplateType,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Configuration format
        #[arg(long, value_enum, default_value_t = ConfigFormat::Json)]
        format: ConfigFormat,
    },

    /// Validate configuration file or arguments
    #[command(long_about = "
Validate configuration files without processing.

Checks configuration syntax and structure, override scoping, and the
existence of the referenced template and data files.

EXAMPLES:
  nc2cmor validate job.json
  nc2cmor validate job.yaml --detailed
")]
    Validate {
        /// Configuration file to validate
        config_file: Option<PathBuf>,

        /// Show detailed validation report
        #[arg(long)]
        detailed: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
#[clap(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON structured output
    Json,
    /// YAML structured output
    Yaml,
    /// CSV output (where applicable)
    Csv,
}

#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
pub enum TemplateType {
    /// Minimal conversion job
    Basic,
    /// Monthly atmospheric variable with typical overrides
    Amon,
    /// Pressure-level variable conversion
    Plev,
}

#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON configuration format
    Json,
    /// YAML configuration format
    Yaml,
}

/// Attribute override argument from the command line
#[derive(Clone, Debug, PartialEq)]
pub struct OverrideArg {
    pub name: String,
    pub value: OverrideValue,
}

impl OverrideArg {
    /// Attaches the scope the surrounding flag implies.
    pub fn into_config(self, scope: AttrScope) -> OverrideConfig {
        OverrideConfig {
            scope,
            name: self.name,
            value: self.value,
        }
    }
}

/// Parse an attribute override from a command line argument
/// Format: KEY=VALUE
fn parse_override(s: &str) -> Result<OverrideArg, String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| "Override must be in format 'KEY=VALUE'".to_string())?;

    let name = name.trim().to_string();
    if name.is_empty() {
        return Err("Override attribute name cannot be empty".to_string());
    }

    Ok(OverrideArg {
        name,
        value: OverrideValue::parse(value.trim()),
    })
}

/// Type alias for the override merge result
type OverrideResult = Result<(Vec<OverrideArg>, Vec<OverrideArg>), String>;

/// Parse overrides from environment variables
///
/// Environment variable format (semicolon-separated KEY=VALUE pairs):
/// - NC2CMOR_SET: "source_id=MyModel;institution_id=MOI"
/// - NC2CMOR_SET_VAR: "comment=regridded"
pub fn parse_overrides_from_env() -> OverrideResult {
    let mut set = Vec::new();
    let mut set_var = Vec::new();

    if let Ok(set_env) = env::var("NC2CMOR_SET")
        && !set_env.trim().is_empty()
    {
        for override_str in set_env.split(';') {
            let override_str = override_str.trim();
            if !override_str.is_empty() {
                set.push(
                    parse_override(override_str)
                        .map_err(|e| format!("Invalid override in NC2CMOR_SET: {}", e))?,
                );
            }
        }
    }

    if let Ok(set_var_env) = env::var("NC2CMOR_SET_VAR")
        && !set_var_env.trim().is_empty()
    {
        for override_str in set_var_env.split(';') {
            let override_str = override_str.trim();
            if !override_str.is_empty() {
                set_var.push(
                    parse_override(override_str)
                        .map_err(|e| format!("Invalid override in NC2CMOR_SET_VAR: {}", e))?,
                );
            }
        }
    }

    Ok((set, set_var))
}

/// Merge CLI overrides with environment variable overrides
/// Priority: CLI arguments > Environment variables
pub fn merge_overrides(cli_set: Vec<OverrideArg>, cli_set_var: Vec<OverrideArg>) -> OverrideResult {
    let (env_set, env_set_var) = parse_overrides_from_env()?;

    let merged_set = if cli_set.is_empty() { env_set } else { cli_set };
    let merged_set_var = if cli_set_var.is_empty() {
        env_set_var
    } else {
        cli_set_var
    };

    Ok((merged_set, merged_set_var))
}

/// Assembles the effective job configuration for the `cmorize` subcommand.
///
/// Starts from the configuration file when one is given, then lets CLI
/// arguments and environment variables take precedence. Overrides from the
/// CLI/environment are appended after the file's, so later (higher-priority)
/// values win when the CMORizer deduplicates them by name.
#[allow(clippy::too_many_arguments)]
pub fn build_job_config(
    config_path: Option<&PathBuf>,
    template: Option<String>,
    data: Option<String>,
    output: Option<String>,
    variable: Option<String>,
    cli_set: Vec<OverrideArg>,
    cli_set_var: Vec<OverrideArg>,
    update_history: bool,
) -> Result<JobConfig, Box<dyn std::error::Error>> {
    let mut config = match config_path {
        Some(path) => JobConfig::from_file(path)?,
        None => JobConfig {
            template_key: template
                .clone()
                .ok_or("Missing template path: pass --template or --config")?,
            data_key: data
                .clone()
                .ok_or("Missing data path: pass --data or --config")?,
            variable_name: None,
            output_key: output
                .clone()
                .ok_or("Missing output path: pass OUTPUT or --config")?,
            overrides: Vec::new(),
            update_history: false,
        },
    };

    // CLI arguments override config file values
    if let Some(template) = template {
        config.template_key = template;
    }
    if let Some(data) = data {
        config.data_key = data;
    }
    if let Some(output) = output {
        config.output_key = output;
    }
    if let Some(variable) = variable {
        config.variable_name = Some(variable);
    }
    if update_history {
        config.update_history = true;
    }

    let (set, set_var) = merge_overrides(cli_set, cli_set_var)?;
    config
        .overrides
        .extend(set.into_iter().map(|arg| arg.into_config(AttrScope::Global)));
    config.overrides.extend(
        set_var
            .into_iter()
            .map(|arg| arg.into_config(AttrScope::Variable)),
    );

    Ok(config)
}

/// Builds a starter configuration for the given template type.
pub fn generate_template(template_type: &TemplateType) -> JobConfig {
    match template_type {
        TemplateType::Basic => JobConfig {
            template_key: "template.nc".to_string(),
            data_key: "data.nc".to_string(),
            variable_name: None,
            output_key: "output.nc".to_string(),
            overrides: vec![OverrideConfig {
                scope: AttrScope::Global,
                name: "source_id".to_string(),
                value: OverrideValue::Text("MyModel".to_string()),
            }],
            update_history: false,
        },
        TemplateType::Amon => JobConfig {
            template_key: "tas_Amon_MPI-ESM1-2-LR_amip_r1i1p1f1_gr_197901-199812.nc".to_string(),
            data_key: "my_model_tas.nc".to_string(),
            variable_name: Some("tas".to_string()),
            output_key: "tas_Amon_MyModel_aimip_r1i1p1f1_gr_197901-199812.nc".to_string(),
            overrides: vec![
                OverrideConfig {
                    scope: AttrScope::Global,
                    name: "source_id".to_string(),
                    value: OverrideValue::Text("MyModel".to_string()),
                },
                OverrideConfig {
                    scope: AttrScope::Global,
                    name: "institution_id".to_string(),
                    value: OverrideValue::Text("MOI".to_string()),
                },
                OverrideConfig {
                    scope: AttrScope::Global,
                    name: "nominal_resolution".to_string(),
                    value: OverrideValue::Text("100 km".to_string()),
                },
                OverrideConfig {
                    scope: AttrScope::Global,
                    name: "grid_label".to_string(),
                    value: OverrideValue::Text("gr".to_string()),
                },
            ],
            update_history: true,
        },
        TemplateType::Plev => JobConfig {
            template_key: "zg_Amon_MPI-ESM1-2-LR_amip_r1i1p1f1_gn_199901-201412.nc".to_string(),
            data_key: "my_model_zg.nc".to_string(),
            variable_name: Some("zg".to_string()),
            output_key: "zg_Amon_MyModel_aimip_r1i1p1f1_gn_199901-201412.nc".to_string(),
            overrides: vec![OverrideConfig {
                scope: AttrScope::Global,
                name: "source_id".to_string(),
                value: OverrideValue::Text("MyModel".to_string()),
            }],
            update_history: true,
        },
    }
}

/// Renders a configuration in the requested format.
pub fn render_config(
    config: &JobConfig,
    format: &ConfigFormat,
) -> Result<String, Box<dyn std::error::Error>> {
    match format {
        ConfigFormat::Json => Ok(serde_json::to_string_pretty(config)?),
        ConfigFormat::Yaml => Ok(serde_yaml::to_string(config)?),
    }
}
