//! # Pressure-level extraction
//!
//! Pulls a subset of pressure levels out of a CMOR-compliant NetCDF file,
//! preserving metadata so the result is itself template-eligible. Levels are
//! matched by nearest neighbour along the `plev` coordinate; no vertical
//! interpolation takes place.
//!
//! Bounds variables lose any stray `coordinates` attribute in the output,
//! and the main variable keeps a `missing_value` attribute mirroring its
//! `_FillValue`, matching the conventions of upstream CMIP6 archives.

use crate::template::{CmorError, CmorResult};
use log::debug;
use netcdf::types::{FloatType, IntType, NcVariableType};
use std::fs;
use std::path::Path;

/// Name of the pressure coordinate in CMIP6 atmospheric files
pub const PLEV_DIMENSION: &str = "plev";

/// Extracts the given pressure levels (in Pa) from `input_path` into a new
/// file at `output_path`.
///
/// The main data variable is auto-detected as the first variable carrying a
/// `plev` dimension that is neither the coordinate itself nor a bounds
/// variable. Each requested level selects the nearest entry of the `plev`
/// coordinate; requested order is preserved and duplicates are kept.
///
/// # Errors
///
/// Fails if `levels_pa` is empty, the input cannot be opened, no variable
/// carries a `plev` dimension, or the output cannot be written.
pub fn extract_pressure_levels(
    input_path: &Path,
    output_path: &Path,
    levels_pa: &[f64],
) -> CmorResult<()> {
    if levels_pa.is_empty() {
        return Err(CmorError::NoLevelsRequested);
    }

    let input = netcdf::open(input_path)?;
    let main_var_name = detect_level_variable(&input)?;
    debug!("detected main data variable '{}'", main_var_name);

    let plev_var = input
        .variable(PLEV_DIMENSION)
        .ok_or_else(|| CmorError::VariableNotFound(PLEV_DIMENSION.to_string()))?;
    let plev_values: Vec<f64> = plev_var.get_values::<f64, _>(..)?;
    let selected: Vec<usize> = levels_pa
        .iter()
        .map(|&level| nearest_index(&plev_values, level))
        .collect();
    debug!(
        "selected plev indices {:?} for requested levels {:?}",
        selected, levels_pa
    );

    if output_path.exists() {
        fs::remove_file(output_path)?;
    }
    let mut output = netcdf::create(output_path)?;

    for dim in input.dimensions() {
        if dim.is_unlimited() {
            output.add_unlimited_dimension(&dim.name())?;
        } else if dim.name() == PLEV_DIMENSION {
            output.add_dimension(&dim.name(), selected.len())?;
        } else {
            output.add_dimension(&dim.name(), dim.len())?;
        }
    }

    for var in input.variables() {
        copy_variable_subset(&var, &mut output, &selected, &main_var_name)?;
    }

    for attr in input.attributes() {
        output.add_attribute(attr.name(), attr.value()?)?;
    }

    input.close()?;
    Ok(())
}

/// Finds the data variable carrying a `plev` dimension.
fn detect_level_variable(file: &netcdf::File) -> CmorResult<String> {
    for var in file.variables() {
        let name = var.name();
        if name == PLEV_DIMENSION || name.ends_with("_bnds") {
            continue;
        }
        if var.dimensions().iter().any(|d| d.name() == PLEV_DIMENSION) {
            return Ok(name);
        }
    }
    Err(CmorError::NoLevelVariable(PLEV_DIMENSION.to_string()))
}

/// Index of the coordinate value closest to `target`.
fn nearest_index(values: &[f64], target: f64) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, &v) in values.iter().enumerate() {
        let dist = (v - target).abs();
        if dist < best_dist {
            best = i;
            best_dist = dist;
        }
    }
    best
}

/// Copies one block of `inner` contiguous values per selected index along
/// `axis`, for every outer index combination.
fn subset_axis<T: Copy>(vals: &[T], shape: &[usize], axis: usize, selected: &[usize]) -> Vec<T> {
    let inner: usize = shape[axis + 1..].iter().product();
    let outer: usize = shape[..axis].iter().product();
    let axis_len = shape[axis];
    let mut out = Vec::with_capacity(outer * selected.len() * inner);
    for o in 0..outer {
        for &s in selected {
            let start = (o * axis_len + s) * inner;
            out.extend_from_slice(&vals[start..start + inner]);
        }
    }
    out
}

/// Recreates a variable in the output file, subsetting it along the `plev`
/// axis when it has one and copying it verbatim otherwise.
fn copy_variable_subset(
    src: &netcdf::Variable,
    output: &mut netcdf::FileMut,
    selected: &[usize],
    main_var_name: &str,
) -> CmorResult<()> {
    let dim_names: Vec<String> = src.dimensions().iter().map(|d| d.name()).collect();
    let dim_refs: Vec<&str> = dim_names.iter().map(|s| s.as_str()).collect();
    let shape: Vec<usize> = src.dimensions().iter().map(|d| d.len()).collect();
    let plev_axis = dim_names.iter().position(|n| n == PLEV_DIMENSION);

    let out_shape: Vec<usize> = shape
        .iter()
        .enumerate()
        .map(|(i, &len)| {
            if plev_axis == Some(i) {
                selected.len()
            } else {
                len
            }
        })
        .collect();
    let extents: Vec<netcdf::Extent> = out_shape.iter().map(|&n| (0..n).into()).collect();

    let name = src.name();
    let is_main = name == main_var_name;
    // xarray leaves a 'coordinates' attribute on bounds variables when
    // subsetting; upstream archives do not carry it, so neither do we.
    let skip_coordinates = name.ends_with("_bnds");

    macro_rules! copy_as {
        ($ty:ty) => {{
            let mut dst = output.add_variable::<$ty>(&name, &dim_refs)?;
            if let Some(attr) = src.attributes().find(|a| a.name() == "_FillValue") {
                dst.put_attribute("_FillValue", attr.value()?)?;
            }
            for attr in src.attributes() {
                if attr.name() == "_FillValue" {
                    continue;
                }
                if skip_coordinates && attr.name() == "coordinates" {
                    debug!("dropping 'coordinates' attribute from '{}'", name);
                    continue;
                }
                dst.put_attribute(attr.name(), attr.value()?)?;
            }
            if is_main {
                ensure_missing_value(src, &mut dst)?;
            }
            let vals: Vec<$ty> = src.get_values::<$ty, _>(..)?;
            let vals = match plev_axis {
                Some(axis) => subset_axis(&vals, &shape, axis, selected),
                None => vals,
            };
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
                var: name,
                type_name: format!("{other:?}"),
            });
        }
    }
    Ok(())
}

/// Mirrors `_FillValue` into `missing_value` on the main variable when the
/// source does not already carry one.
fn ensure_missing_value(src: &netcdf::Variable, dst: &mut netcdf::VariableMut) -> CmorResult<()> {
    if src.attributes().any(|a| a.name() == "missing_value") {
        return Ok(());
    }
    if let Some(attr) = src.attributes().find(|a| a.name() == "_FillValue") {
        dst.put_attribute("missing_value", attr.value()?)?;
    }
    Ok(())
}
