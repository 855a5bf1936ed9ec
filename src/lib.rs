//! # nc2cmor
//!
//! A Rust library for producing CMOR-compliant NetCDF files from model
//! output by reusing an existing compliant file as a metadata template.
//!
//! ## Features
//!
//! - **Template-based CMORization**: Copy a template's coordinates, bounds
//!   and attributes and substitute your own data values
//! - **Scoped metadata overrides**: Replace or add global and variable
//!   attributes deterministically
//! - **Pressure-level extraction**: Pull selected `plev` levels out of an
//!   archive file while keeping it template-eligible
//! - **File inspection**: Dimensions, variables and attributes in human,
//!   JSON, YAML or CSV form
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nc2cmor::{process_cmorize_job, input::JobConfig};
//!
//! // Load configuration from JSON file
//! let config = JobConfig::from_file("job.json").expect("Failed to load config");
//!
//! // CMORize the configured data against the template
//! process_cmorize_job(&config).expect("Failed to CMORize data");
//! ```
//!
//! ## Configuration Example
//!
//! ```json
//! {
//!   "template_key": "tas_Amon_MPI-ESM1-2-LR_amip_r1i1p1f1_gr_197901-199812.nc",
//!   "data_key": "my_model_output.nc",
//!   "output_key": "tas_Amon_MyModel_aimip_r1i1p1f1_gr_197901-199812.nc",
//!   "overrides": [
//!     { "scope": "global", "name": "source_id", "value": "MyModel" }
//!   ]
//! }
//! ```

pub mod cli;
pub mod info;
pub mod input;
pub mod levels;
pub mod log;
pub mod paths;
pub mod template;

#[cfg(test)]
mod tests;

use crate::input::JobConfig;
use crate::log::show_netcdf_file_info;
use crate::template::{cmorize_data_with_template, history_entry, primary_variable_name};
use ndarray::{ArrayD, IxDyn};
use netcdf::AttributeValue;
use std::path::Path;

/// CMORizes a data file according to the provided job configuration.
///
/// This function orchestrates the entire conversion pipeline:
/// 1. Opens the template and determines the primary variable
/// 2. Reads the replacement values from the data file into memory
/// 3. Assembles the scoped metadata overrides (plus an optional `history`
///    entry)
/// 4. Writes the CMOR-compliant output file
///
/// # Arguments
///
/// * `config` - The job configuration specifying template, data source,
///   overrides and output
///
/// # Returns
///
/// Returns `Ok(())` on successful conversion, or an error if any step fails.
///
/// # Errors
///
/// This function will return an error if:
/// - The template or data file cannot be opened
/// - The variable to convert is not found in the data file
/// - The data variable's shape differs from the template's
/// - The output file cannot be written
pub fn process_cmorize_job(config: &JobConfig) -> Result<(), Box<dyn std::error::Error>> {
    let template = netcdf::open(&config.template_key)?;
    let variable_name = match &config.variable_name {
        Some(name) => name.clone(),
        None => primary_variable_name(&template)?,
    };

    let data_file = netcdf::open(&config.data_key)?;
    show_netcdf_file_info(&data_file)?;
    let var = data_file.variable(&variable_name).ok_or(format!(
        "Variable '{}' not found in data file",
        variable_name
    ))?;
    let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
    let values: Vec<f64> = var.get_values::<f64, _>(..)?;
    let user_data = ArrayD::from_shape_vec(IxDyn(&shape), values)?;
    data_file.close()?;

    let mut overrides = config.to_overrides();
    if config.update_history && !overrides.has_global("history") {
        let previous = template
            .attributes()
            .find(|a| a.name() == "history")
            .and_then(|a| match a.value() {
                Ok(AttributeValue::Str(s)) => Some(s),
                _ => None,
            });
        overrides.set_global("history", history_entry(previous.as_deref()));
    }
    template.close()?;

    cmorize_data_with_template(
        &user_data,
        Path::new(&config.template_key),
        Path::new(&config.output_key),
        &overrides,
    )?;

    Ok(())
}
