//! # Template-based CMORization
//!
//! This module implements the core conversion contract: take an in-memory
//! numeric array and an existing CMOR-compliant NetCDF file, and produce a
//! new file that is structurally identical to the template except for the
//! primary variable's values and any explicitly overridden attributes.
//!
//! ## How it works
//!
//! 1. The primary variable is identified from the template's `variable_id`
//!    global attribute.
//! 2. Every dimension and every non-primary variable (coordinates, bounds,
//!    scalar coordinates such as `height`) is recreated verbatim, preserving
//!    the on-disk numeric type and all attributes.
//! 3. The primary variable is created with the template's type and the user
//!    array is written into it, converted to the on-disk type.
//! 4. Global and variable attributes are copied, then overrides are applied.
//!
//! ## Override scoping
//!
//! Overrides are explicitly scoped as global or variable-level via
//! [`MetadataOverrides`]; there is no name-based guessing about where an
//! attribute belongs.

use log::debug;
use ndarray::ArrayD;
use netcdf::AttributeValue;
use netcdf::types::{FloatType, IntType, NcVariableType};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during CMORization and level extraction
#[derive(Error, Debug)]
pub enum CmorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("NetCDF error: {0}")]
    NetCdf(#[from] netcdf::Error),

    #[error("template has no usable 'variable_id' global attribute")]
    MissingVariableId,

    #[error("variable '{0}' not found in file")]
    VariableNotFound(String),

    #[error("data shape {actual:?} does not match template variable shape {expected:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("unsupported NetCDF type {type_name} for variable '{var}'")]
    UnsupportedType { var: String, type_name: String },

    #[error("no data variable with a '{0}' dimension found")]
    NoLevelVariable(String),

    #[error("at least one pressure level must be requested")]
    NoLevelsRequested,
}

/// Result type for CMORization operations
pub type CmorResult<T> = Result<T, CmorError>;

/// Explicitly scoped metadata overrides applied after the template's
/// attributes have been copied.
///
/// Keys already present in the template are replaced; keys not present are
/// added. Insertion order is preserved so repeated runs are deterministic.
///
/// # Examples
///
/// ```rust
/// use nc2cmor::template::MetadataOverrides;
///
/// let mut overrides = MetadataOverrides::new();
/// overrides.set_global("source_id", "MyNewModelFromArray");
/// overrides.set_variable("comment", "regridded to 1x1 degree");
/// assert_eq!(overrides.global().len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MetadataOverrides {
    global: Vec<(String, AttributeValue)>,
    variable: Vec<(String, AttributeValue)>,
}

impl MetadataOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a global attribute override, replacing any previous value for
    /// the same name.
    pub fn set_global(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        let name = name.into();
        let value = value.into();
        if let Some(entry) = self.global.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = value;
        } else {
            self.global.push((name, value));
        }
    }

    /// Sets an override on the primary variable, replacing any previous
    /// value for the same name.
    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        let name = name.into();
        let value = value.into();
        if let Some(entry) = self.variable.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = value;
        } else {
            self.variable.push((name, value));
        }
    }

    pub fn global(&self) -> &[(String, AttributeValue)] {
        &self.global
    }

    pub fn variable(&self) -> &[(String, AttributeValue)] {
        &self.variable
    }

    pub fn has_global(&self, name: &str) -> bool {
        self.global.iter().any(|(n, _)| n == name)
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.variable.is_empty()
    }
}

/// Determines the primary data variable of a CMOR file from its
/// `variable_id` global attribute.
///
/// # Errors
///
/// Fails if the attribute is missing, is not a string, or does not name a
/// variable present in the file.
pub fn primary_variable_name(file: &netcdf::File) -> CmorResult<String> {
    let attr = file
        .attributes()
        .find(|a| a.name() == "variable_id")
        .ok_or(CmorError::MissingVariableId)?;
    let name = match attr.value()? {
        AttributeValue::Str(s) => s,
        _ => return Err(CmorError::MissingVariableId),
    };
    if file.variable(&name).is_none() {
        return Err(CmorError::VariableNotFound(name));
    }
    Ok(name)
}

/// Formats a `history` entry for a freshly CMORized file, prepended to the
/// template's previous history if one exists.
///
/// This is not applied automatically: injecting a wall-clock timestamp would
/// break output reproducibility, so callers opt in (the CLI exposes it as
/// `--update-history`).
pub fn history_entry(previous: Option<&str>) -> String {
    let stamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    match previous {
        Some(prev) if !prev.is_empty() => format!("{stamp}: CMORized with nc2cmor. ; {prev}"),
        _ => format!("{stamp}: CMORized with nc2cmor."),
    }
}

/// Produces a CMOR-compliant NetCDF file from a template and an in-memory
/// data array.
///
/// The output file at `output_path` is overwritten if it exists. Coordinate
/// variables, bounds, dimensions and attributes are carried over from the
/// template unchanged; `user_data` replaces the primary variable's values
/// and `overrides` replace or add the named attributes.
///
/// # Arguments
///
/// * `user_data` - the replacement values, shaped exactly like the
///   template's primary variable (e.g. `(time, lat, lon)` or
///   `(time, plev, lat, lon)`)
/// * `template_path` - path to an existing CMOR-compliant NetCDF file
/// * `output_path` - destination path, overwritten if present
/// * `overrides` - scoped attribute overrides, possibly empty
///
/// # Errors
///
/// This function will return an error if:
/// - The template cannot be opened or has no usable `variable_id`
/// - The user array's shape differs from the template variable's shape
///   (checked before any output file is created)
/// - The output path cannot be written
///
/// All errors propagate to the caller unmodified; there is no retry and no
/// internal recovery.
pub fn cmorize_data_with_template(
    user_data: &ArrayD<f64>,
    template_path: &Path,
    output_path: &Path,
    overrides: &MetadataOverrides,
) -> CmorResult<()> {
    let template = netcdf::open(template_path)?;
    let main_var_name = primary_variable_name(&template)?;
    debug!("identified main data variable '{}'", main_var_name);

    let main_var = template
        .variable(&main_var_name)
        .ok_or_else(|| CmorError::VariableNotFound(main_var_name.clone()))?;

    // The time axis length is the documented contract; checking the full
    // shape also catches spatial mismatches before anything is written.
    let expected: Vec<usize> = main_var.dimensions().iter().map(|d| d.len()).collect();
    if user_data.shape() != expected.as_slice() {
        return Err(CmorError::ShapeMismatch {
            expected,
            actual: user_data.shape().to_vec(),
        });
    }

    if output_path.exists() {
        fs::remove_file(output_path)?;
    }
    let mut output = netcdf::create(output_path)?;

    for dim in template.dimensions() {
        if dim.is_unlimited() {
            output.add_unlimited_dimension(&dim.name())?;
        } else {
            output.add_dimension(&dim.name(), dim.len())?;
        }
    }

    for var in template.variables() {
        if var.name() == main_var_name {
            continue;
        }
        debug!("copying variable '{}'", var.name());
        copy_variable(&var, &mut output)?;
    }

    write_primary_variable(&main_var, user_data, &mut output)?;

    for attr in template.attributes() {
        output.add_attribute(attr.name(), attr.value()?)?;
    }
    apply_overrides(&mut output, &main_var_name, overrides)?;

    drop(main_var);
    template.close()?;
    Ok(())
}

/// Recreates a variable in `output` with the source's type, dimensions,
/// attributes and values.
fn copy_variable(src: &netcdf::Variable, output: &mut netcdf::FileMut) -> CmorResult<()> {
    let dim_names: Vec<String> = src.dimensions().iter().map(|d| d.name()).collect();
    let dim_refs: Vec<&str> = dim_names.iter().map(|s| s.as_str()).collect();
    let extents: Vec<netcdf::Extent> = src
        .dimensions()
        .iter()
        .map(|d| (0..d.len()).into())
        .collect();

    macro_rules! copy_as {
        ($ty:ty) => {{
            let mut dst = output.add_variable::<$ty>(&src.name(), &dim_refs)?;
            copy_attributes(src, &mut dst)?;
            let vals: Vec<$ty> = src.get_values::<$ty, _>(..)?;
            dst.put_values(&vals, extents.as_slice())?;
        }};
    }

    match src.vartype() {
        NcVariableType::Float(FloatType::F32) => copy_as!(f32),
        NcVariableType::Float(FloatType::F64) => copy_as!(f64),
        NcVariableType::Int(IntType::I8) => copy_as!(i8),
        NcVariableType::Int(IntType::U8) => copy_as!(u8),
        NcVariableType::Int(IntType::I16) => copy_as!(i16),
        NcVariableType::Int(IntType::U16) => copy_as!(u16),
        NcVariableType::Int(IntType::I32) => copy_as!(i32),
        NcVariableType::Int(IntType::U32) => copy_as!(u32),
        NcVariableType::Int(IntType::I64) => copy_as!(i64),
        NcVariableType::Int(IntType::U64) => copy_as!(u64),
        other => {
            return Err(CmorError::UnsupportedType {
                var: src.name(),
                type_name: format!("{other:?}"),
            });
        }
    }
    Ok(())
}

/// Creates the primary variable with the template's on-disk type and writes
/// the user array into it.
fn write_primary_variable(
    src: &netcdf::Variable,
    data: &ArrayD<f64>,
    output: &mut netcdf::FileMut,
) -> CmorResult<()> {
    let dim_names: Vec<String> = src.dimensions().iter().map(|d| d.name()).collect();
    let dim_refs: Vec<&str> = dim_names.iter().map(|s| s.as_str()).collect();
    let extents: Vec<netcdf::Extent> = src
        .dimensions()
        .iter()
        .map(|d| (0..d.len()).into())
        .collect();

    match src.vartype() {
        NcVariableType::Float(FloatType::F32) => {
            let mut dst = output.add_variable::<f32>(&src.name(), &dim_refs)?;
            copy_attributes(src, &mut dst)?;
            let vals: Vec<f32> = data.iter().map(|&v| v as f32).collect();
            dst.put_values(&vals, extents.as_slice())?;
        }
        NcVariableType::Float(FloatType::F64) => {
            let mut dst = output.add_variable::<f64>(&src.name(), &dim_refs)?;
            copy_attributes(src, &mut dst)?;
            let vals: Vec<f64> = data.iter().copied().collect();
            dst.put_values(&vals, extents.as_slice())?;
        }
        other => {
            return Err(CmorError::UnsupportedType {
                var: src.name(),
                type_name: format!("{other:?}"),
            });
        }
    }
    Ok(())
}

/// Copies variable attributes, writing `_FillValue` first so fill semantics
/// are in place before any data lands.
fn copy_attributes(src: &netcdf::Variable, dst: &mut netcdf::VariableMut) -> CmorResult<()> {
    if let Some(attr) = src.attributes().find(|a| a.name() == "_FillValue") {
        dst.put_attribute("_FillValue", attr.value()?)?;
    }
    for attr in src.attributes() {
        if attr.name() == "_FillValue" {
            continue;
        }
        dst.put_attribute(attr.name(), attr.value()?)?;
    }
    Ok(())
}

fn apply_overrides(
    output: &mut netcdf::FileMut,
    main_var_name: &str,
    overrides: &MetadataOverrides,
) -> CmorResult<()> {
    for (name, value) in overrides.global() {
        debug!("setting global attribute '{}'", name);
        output.add_attribute(name, value.clone())?;
    }
    if !overrides.variable().is_empty() {
        let mut var = output
            .variable_mut(main_var_name)
            .ok_or_else(|| CmorError::VariableNotFound(main_var_name.to_string()))?;
        for (name, value) in overrides.variable() {
            debug!("setting attribute '{}' on '{}'", name, main_var_name);
            var.put_attribute(name, value.clone())?;
        }
    }
    Ok(())
}
