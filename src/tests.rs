use crate::input::*;
use crate::levels::extract_pressure_levels;
use crate::template::*;
use ndarray::ArrayD;
use std::path::Path;
use tempfile::tempdir;

/// Explicit write extents covering a full variable of the given shape.
fn full_extents(shape: &[usize]) -> Vec<netcdf::Extent> {
    shape.iter().map(|&n| (0..n).into()).collect()
}

/// Builds a small CMOR-like template file: `tas(time, lat, lon)` as f32 with
/// coordinates, bounds, a scalar `height` coordinate and the usual global
/// attributes.
fn create_template_file(path: &Path) {
    let mut file = netcdf::create(path).unwrap();

    file.add_unlimited_dimension("time").unwrap();
    file.add_dimension("bnds", 2).unwrap();
    file.add_dimension("lat", 3).unwrap();
    file.add_dimension("lon", 4).unwrap();

    let mut time = file.add_variable::<f64>("time", &["time"]).unwrap();
    time.put_attribute("units", "days since 1979-01-01").unwrap();
    time.put_attribute("calendar", "gregorian").unwrap();
    time.put_attribute("bounds", "time_bnds").unwrap();
    time.put_values(&[15.5, 45.0], full_extents(&[2]).as_slice())
        .unwrap();

    let mut time_bnds = file
        .add_variable::<f64>("time_bnds", &["time", "bnds"])
        .unwrap();
    time_bnds
        .put_values(
            &[0.0, 31.0, 31.0, 59.0],
            full_extents(&[2, 2]).as_slice(),
        )
        .unwrap();

    let mut lat = file.add_variable::<f64>("lat", &["lat"]).unwrap();
    lat.put_attribute("units", "degrees_north").unwrap();
    lat.put_attribute("bounds", "lat_bnds").unwrap();
    lat.put_values(&[-45.0, 0.0, 45.0], full_extents(&[3]).as_slice())
        .unwrap();

    let mut lat_bnds = file
        .add_variable::<f64>("lat_bnds", &["lat", "bnds"])
        .unwrap();
    lat_bnds
        .put_values(
            &[-67.5, -22.5, -22.5, 22.5, 22.5, 67.5],
            full_extents(&[3, 2]).as_slice(),
        )
        .unwrap();

    let mut lon = file.add_variable::<f64>("lon", &["lon"]).unwrap();
    lon.put_attribute("units", "degrees_east").unwrap();
    lon.put_values(&[0.0, 90.0, 180.0, 270.0], full_extents(&[4]).as_slice())
        .unwrap();

    let mut height = file.add_variable::<f64>("height", &[]).unwrap();
    height.put_attribute("units", "m").unwrap();
    height.put_values(&[2.0], ..).unwrap();

    let mut tas = file
        .add_variable::<f32>("tas", &["time", "lat", "lon"])
        .unwrap();
    tas.put_attribute("_FillValue", 1.0e20f32).unwrap();
    tas.put_attribute("standard_name", "air_temperature").unwrap();
    tas.put_attribute("units", "K").unwrap();
    tas.put_attribute("coordinates", "height").unwrap();
    let vals: Vec<f32> = (0..24).map(|i| 280.0 + i as f32).collect();
    tas.put_values(
        &vals,
        full_extents(&[2, 3, 4]).as_slice(),
    )
    .unwrap();

    file.add_attribute("variable_id", "tas").unwrap();
    file.add_attribute("source_id", "MPI-ESM1-2-LR").unwrap();
    file.add_attribute("frequency", "mon").unwrap();
    file.add_attribute("history", "original processing").unwrap();

    file.close().unwrap();
}

/// Builds a data file holding replacement `tas` values on the same grid.
fn create_data_file(path: &Path, offset: f32) {
    let mut file = netcdf::create(path).unwrap();
    file.add_dimension("time", 2).unwrap();
    file.add_dimension("lat", 3).unwrap();
    file.add_dimension("lon", 4).unwrap();
    let mut tas = file
        .add_variable::<f32>("tas", &["time", "lat", "lon"])
        .unwrap();
    let vals: Vec<f32> = (0..24).map(|i| offset + i as f32).collect();
    tas.put_values(
        &vals,
        full_extents(&[2, 3, 4]).as_slice(),
    )
    .unwrap();
    file.close().unwrap();
}

/// Builds a pressure-level file: `zg(time, plev, lat, lon)` with a plev
/// coordinate, bounds carrying a stray `coordinates` attribute, and a
/// `variable_id` of `zg`.
fn create_plev_file(path: &Path) {
    let mut file = netcdf::create(path).unwrap();

    file.add_unlimited_dimension("time").unwrap();
    file.add_dimension("bnds", 2).unwrap();
    file.add_dimension("plev", 3).unwrap();
    file.add_dimension("lat", 2).unwrap();
    file.add_dimension("lon", 2).unwrap();

    let mut time = file.add_variable::<f64>("time", &["time"]).unwrap();
    time.put_values(&[15.5], full_extents(&[1]).as_slice()).unwrap();

    let mut plev = file.add_variable::<f64>("plev", &["plev"]).unwrap();
    plev.put_attribute("units", "Pa").unwrap();
    plev.put_attribute("positive", "down").unwrap();
    plev.put_values(&[85000.0, 50000.0, 25000.0], full_extents(&[3]).as_slice())
        .unwrap();

    let mut plev_bnds = file
        .add_variable::<f64>("plev_bnds", &["plev", "bnds"])
        .unwrap();
    plev_bnds.put_attribute("coordinates", "plev").unwrap();
    plev_bnds
        .put_values(
            &[92500.0, 67500.0, 67500.0, 37500.0, 37500.0, 17500.0],
            full_extents(&[3, 2]).as_slice(),
        )
        .unwrap();

    let mut lat = file.add_variable::<f64>("lat", &["lat"]).unwrap();
    lat.put_values(&[-30.0, 30.0], full_extents(&[2]).as_slice())
        .unwrap();

    let mut lon = file.add_variable::<f64>("lon", &["lon"]).unwrap();
    lon.put_values(&[0.0, 180.0], full_extents(&[2]).as_slice())
        .unwrap();

    let mut zg = file
        .add_variable::<f32>("zg", &["time", "plev", "lat", "lon"])
        .unwrap();
    zg.put_attribute("_FillValue", 1.0e20f32).unwrap();
    zg.put_attribute("units", "m").unwrap();
    let vals: Vec<f32> = (0..12).map(|i| 1000.0 + i as f32).collect();
    zg.put_values(
        &vals,
        full_extents(&[1, 3, 2, 2]).as_slice(),
    )
    .unwrap();

    file.add_attribute("variable_id", "zg").unwrap();
    file.add_attribute("frequency", "mon").unwrap();

    file.close().unwrap();
}

fn global_str_attr(file: &netcdf::File, name: &str) -> Option<String> {
    file.attributes()
        .find(|a| a.name() == name)
        .and_then(|a| match a.value() {
            Ok(netcdf::AttributeValue::Str(s)) => Some(s),
            _ => None,
        })
}

fn variable_str_attr(file: &netcdf::File, var: &str, name: &str) -> Option<String> {
    file.variable(var)?
        .attributes()
        .find(|a| a.name() == name)
        .and_then(|a| match a.value() {
            Ok(netcdf::AttributeValue::Str(s)) => Some(s),
            _ => None,
        })
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn test_job_config_from_json() {
        let json = r#"
        {
            "template_key": "tas_Amon_ref.nc",
            "data_key": "my_tas.nc",
            "variable_name": "tas",
            "output_key": "out.nc",
            "overrides": [
                { "scope": "global", "name": "source_id", "value": "MyModel" },
                { "scope": "variable", "name": "comment", "value": "regridded" },
                { "name": "realization_index", "value": 1 }
            ],
            "update_history": true
        }"#;

        let config = JobConfig::from_json(json).unwrap();
        assert_eq!(config.template_key, "tas_Amon_ref.nc");
        assert_eq!(config.data_key, "my_tas.nc");
        assert_eq!(config.variable_name.as_deref(), Some("tas"));
        assert_eq!(config.output_key, "out.nc");
        assert!(config.update_history);
        assert_eq!(config.overrides.len(), 3);
        assert_eq!(config.overrides[0].scope, AttrScope::Global);
        assert_eq!(config.overrides[1].scope, AttrScope::Variable);
        // Scope defaults to global when omitted
        assert_eq!(config.overrides[2].scope, AttrScope::Global);
        assert_eq!(config.overrides[2].value, OverrideValue::Integer(1));
    }

    #[test]
    fn test_job_config_from_yaml() {
        let yaml = r#"
template_key: tas_Amon_ref.nc
data_key: my_tas.nc
output_key: out.nc
overrides:
  - scope: global
    name: source_id
    value: MyModel
  - scope: variable
    name: original_units
    value: degC
"#;

        let config = JobConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.template_key, "tas_Amon_ref.nc");
        assert!(config.variable_name.is_none());
        assert!(!config.update_history);
        assert_eq!(config.overrides.len(), 2);
        assert_eq!(
            config.overrides[1].value,
            OverrideValue::Text("degC".to_string())
        );
    }

    #[test]
    fn test_override_value_parse() {
        assert_eq!(OverrideValue::parse("42"), OverrideValue::Integer(42));
        assert_eq!(OverrideValue::parse("-3"), OverrideValue::Integer(-3));
        assert_eq!(OverrideValue::parse("2.5"), OverrideValue::Float(2.5));
        assert_eq!(
            OverrideValue::parse("MyModel"),
            OverrideValue::Text("MyModel".to_string())
        );
        assert_eq!(
            OverrideValue::parse("100 km"),
            OverrideValue::Text("100 km".to_string())
        );
    }

    #[test]
    fn test_to_overrides_scoping_and_dedup() {
        let config = JobConfig {
            template_key: "t.nc".to_string(),
            data_key: "d.nc".to_string(),
            variable_name: None,
            output_key: "o.nc".to_string(),
            overrides: vec![
                OverrideConfig {
                    scope: AttrScope::Global,
                    name: "source_id".to_string(),
                    value: OverrideValue::Text("First".to_string()),
                },
                OverrideConfig {
                    scope: AttrScope::Variable,
                    name: "comment".to_string(),
                    value: OverrideValue::Text("regridded".to_string()),
                },
                // Later entry for the same name wins
                OverrideConfig {
                    scope: AttrScope::Global,
                    name: "source_id".to_string(),
                    value: OverrideValue::Text("Second".to_string()),
                },
            ],
            update_history: false,
        };

        let overrides = config.to_overrides();
        assert_eq!(overrides.global().len(), 1);
        assert_eq!(overrides.variable().len(), 1);
        assert!(overrides.has_global("source_id"));
        assert_eq!(
            overrides.global()[0].1,
            netcdf::AttributeValue::Str("Second".to_string())
        );
    }
}

#[cfg(test)]
mod template_tests {
    use super::*;
    use ndarray::IxDyn;

    #[test]
    fn test_primary_variable_name() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("template.nc");
        create_template_file(&path);

        let file = netcdf::open(&path).unwrap();
        assert_eq!(primary_variable_name(&file).unwrap(), "tas");
    }

    #[test]
    fn test_primary_variable_name_missing_attribute() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plain.nc");
        let mut file = netcdf::create(&path).unwrap();
        file.add_dimension("x", 2).unwrap();
        file.close().unwrap();

        let file = netcdf::open(&path).unwrap();
        assert!(matches!(
            primary_variable_name(&file),
            Err(CmorError::MissingVariableId)
        ));
    }

    #[test]
    fn test_cmorize_substitutes_data_and_keeps_coordinates() {
        let dir = tempdir().unwrap();
        let template = dir.path().join("template.nc");
        let output = dir.path().join("out.nc");
        create_template_file(&template);

        let vals: Vec<f64> = (0..24).map(|i| 300.0 + i as f64).collect();
        let data = ArrayD::from_shape_vec(IxDyn(&[2, 3, 4]), vals).unwrap();

        cmorize_data_with_template(&data, &template, &output, &MetadataOverrides::new()).unwrap();

        let out = netcdf::open(&output).unwrap();

        // Data values replaced, converted to the template's f32
        let tas: Vec<f32> = out
            .variable("tas")
            .unwrap()
            .get_values::<f32, _>(..)
            .unwrap();
        let expected: Vec<f32> = (0..24).map(|i| 300.0 + i as f32).collect();
        assert_eq!(tas, expected);

        // Coordinates carried over verbatim
        let lat: Vec<f64> = out
            .variable("lat")
            .unwrap()
            .get_values::<f64, _>(..)
            .unwrap();
        assert_eq!(lat, vec![-45.0, 0.0, 45.0]);
        let bnds: Vec<f64> = out
            .variable("time_bnds")
            .unwrap()
            .get_values::<f64, _>(..)
            .unwrap();
        assert_eq!(bnds, vec![0.0, 31.0, 31.0, 59.0]);
        let height: Vec<f64> = out
            .variable("height")
            .unwrap()
            .get_values::<f64, _>(..)
            .unwrap();
        assert_eq!(height, vec![2.0]);

        // Time stays unlimited
        let time_dim = out.dimensions().find(|d| d.name() == "time").unwrap();
        assert!(time_dim.is_unlimited());
        assert_eq!(time_dim.len(), 2);

        // Metadata carried over untouched
        assert_eq!(
            global_str_attr(&out, "source_id").as_deref(),
            Some("MPI-ESM1-2-LR")
        );
        assert_eq!(global_str_attr(&out, "variable_id").as_deref(), Some("tas"));
        assert_eq!(
            variable_str_attr(&out, "tas", "units").as_deref(),
            Some("K")
        );
    }

    #[test]
    fn test_cmorize_shape_mismatch_creates_no_output() {
        let dir = tempdir().unwrap();
        let template = dir.path().join("template.nc");
        let output = dir.path().join("out.nc");
        create_template_file(&template);

        // Wrong time length: 3 instead of 2
        let data = ArrayD::from_shape_vec(IxDyn(&[3, 3, 4]), vec![0.0; 36]).unwrap();
        let result =
            cmorize_data_with_template(&data, &template, &output, &MetadataOverrides::new());

        assert!(matches!(
            result,
            Err(CmorError::ShapeMismatch { ref expected, ref actual })
                if expected == &vec![2, 3, 4] && actual == &vec![3, 3, 4]
        ));
        assert!(!output.exists());
    }

    #[test]
    fn test_cmorize_is_deterministic() {
        let dir = tempdir().unwrap();
        let template = dir.path().join("template.nc");
        let out_a = dir.path().join("a.nc");
        let out_b = dir.path().join("b.nc");
        create_template_file(&template);

        let data = ArrayD::from_shape_vec(IxDyn(&[2, 3, 4]), vec![285.0; 24]).unwrap();
        let mut overrides = MetadataOverrides::new();
        overrides.set_global("source_id", "MyModel");

        cmorize_data_with_template(&data, &template, &out_a, &overrides).unwrap();
        cmorize_data_with_template(&data, &template, &out_b, &overrides).unwrap();

        let bytes_a = std::fs::read(&out_a).unwrap();
        let bytes_b = std::fs::read(&out_b).unwrap();
        assert_eq!(bytes_a, bytes_b);
    }

    #[test]
    fn test_history_entry_prepends_previous() {
        let entry = history_entry(Some("original processing"));
        assert!(entry.contains("CMORized with nc2cmor"));
        assert!(entry.ends_with("; original processing"));

        let fresh = history_entry(None);
        assert!(fresh.contains("CMORized with nc2cmor"));
        assert!(!fresh.contains(';'));
    }
}

#[cfg(test)]
mod override_tests {
    use super::*;
    use ndarray::IxDyn;

    fn cmorize_with(overrides: &MetadataOverrides, dir: &Path) -> std::path::PathBuf {
        let template = dir.join("template.nc");
        let output = dir.join("out.nc");
        create_template_file(&template);
        let data = ArrayD::from_shape_vec(IxDyn(&[2, 3, 4]), vec![285.0; 24]).unwrap();
        cmorize_data_with_template(&data, &template, &output, overrides).unwrap();
        output
    }

    #[test]
    fn test_override_replaces_existing_global() {
        let dir = tempdir().unwrap();
        let mut overrides = MetadataOverrides::new();
        overrides.set_global("source_id", "MyNewModelFromArray");

        let output = cmorize_with(&overrides, dir.path());
        let out = netcdf::open(&output).unwrap();
        assert_eq!(
            global_str_attr(&out, "source_id").as_deref(),
            Some("MyNewModelFromArray")
        );
        // Untouched attributes survive
        assert_eq!(global_str_attr(&out, "frequency").as_deref(), Some("mon"));
        assert_eq!(
            global_str_attr(&out, "history").as_deref(),
            Some("original processing")
        );
    }

    #[test]
    fn test_override_adds_missing_global() {
        let dir = tempdir().unwrap();
        let mut overrides = MetadataOverrides::new();
        overrides.set_global("institution_id", "MOI");
        overrides.set_global("realization_index", 1i64);

        let output = cmorize_with(&overrides, dir.path());
        let out = netcdf::open(&output).unwrap();
        assert_eq!(
            global_str_attr(&out, "institution_id").as_deref(),
            Some("MOI")
        );
        let realization = out
            .attributes()
            .find(|a| a.name() == "realization_index")
            .unwrap();
        assert!(matches!(
            realization.value(),
            Ok(netcdf::AttributeValue::Longlong(1))
        ));
    }

    #[test]
    fn test_variable_scope_override() {
        let dir = tempdir().unwrap();
        let mut overrides = MetadataOverrides::new();
        overrides.set_variable("comment", "regridded to 1x1 degree");

        let output = cmorize_with(&overrides, dir.path());
        let out = netcdf::open(&output).unwrap();
        assert_eq!(
            variable_str_attr(&out, "tas", "comment").as_deref(),
            Some("regridded to 1x1 degree")
        );
        // A variable-scoped override must not leak into the globals
        assert!(global_str_attr(&out, "comment").is_none());
        assert_eq!(
            variable_str_attr(&out, "tas", "standard_name").as_deref(),
            Some("air_temperature")
        );
    }
}

#[cfg(test)]
mod levels_tests {
    use super::*;

    #[test]
    fn test_extract_single_level_nearest() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("zg.nc");
        let output = dir.path().join("zg_500.nc");
        create_plev_file(&input);

        // 49000 Pa is closest to the 50000 Pa entry
        extract_pressure_levels(&input, &output, &[49000.0]).unwrap();

        let out = netcdf::open(&output).unwrap();
        let plev: Vec<f64> = out
            .variable("plev")
            .unwrap()
            .get_values::<f64, _>(..)
            .unwrap();
        assert_eq!(plev, vec![50000.0]);

        // Middle slab of the (1, 3, 2, 2) cube
        let zg: Vec<f32> = out
            .variable("zg")
            .unwrap()
            .get_values::<f32, _>(..)
            .unwrap();
        assert_eq!(zg, vec![1004.0, 1005.0, 1006.0, 1007.0]);

        // Bounds subset alongside the coordinate
        let bnds: Vec<f64> = out
            .variable("plev_bnds")
            .unwrap()
            .get_values::<f64, _>(..)
            .unwrap();
        assert_eq!(bnds, vec![67500.0, 37500.0]);

        assert_eq!(global_str_attr(&out, "variable_id").as_deref(), Some("zg"));
    }

    #[test]
    fn test_extract_multiple_levels_in_request_order() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("zg.nc");
        let output = dir.path().join("zg_sub.nc");
        create_plev_file(&input);

        extract_pressure_levels(&input, &output, &[25000.0, 85000.0]).unwrap();

        let out = netcdf::open(&output).unwrap();
        let plev: Vec<f64> = out
            .variable("plev")
            .unwrap()
            .get_values::<f64, _>(..)
            .unwrap();
        assert_eq!(plev, vec![25000.0, 85000.0]);

        let zg: Vec<f32> = out
            .variable("zg")
            .unwrap()
            .get_values::<f32, _>(..)
            .unwrap();
        assert_eq!(
            zg,
            vec![1008.0, 1009.0, 1010.0, 1011.0, 1000.0, 1001.0, 1002.0, 1003.0]
        );
    }

    #[test]
    fn test_extract_drops_bounds_coordinates_attribute() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("zg.nc");
        let output = dir.path().join("zg_one.nc");
        create_plev_file(&input);

        extract_pressure_levels(&input, &output, &[85000.0]).unwrap();

        let out = netcdf::open(&output).unwrap();
        assert!(variable_str_attr(&out, "plev_bnds", "coordinates").is_none());

        // The main variable gains a missing_value mirroring its _FillValue
        let zg = out.variable("zg").unwrap();
        let missing = zg
            .attributes()
            .find(|a| a.name() == "missing_value")
            .unwrap();
        assert!(matches!(
            missing.value(),
            Ok(netcdf::AttributeValue::Float(v)) if v == 1.0e20f32
        ));
    }

    #[test]
    fn test_extract_requires_levels() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("zg.nc");
        let output = dir.path().join("zg_none.nc");
        create_plev_file(&input);

        let result = extract_pressure_levels(&input, &output, &[]);
        assert!(matches!(result, Err(CmorError::NoLevelsRequested)));
        assert!(!output.exists());
    }

    #[test]
    fn test_extract_without_level_variable() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("flat.nc");
        let output = dir.path().join("flat_out.nc");
        create_template_file(&input);

        let result = extract_pressure_levels(&input, &output, &[50000.0]);
        assert!(matches!(result, Err(CmorError::NoLevelVariable(_))));
    }
}

#[cfg(test)]
mod pipeline_tests {
    use super::*;
    use crate::process_cmorize_job;

    #[test]
    fn test_process_cmorize_job_end_to_end() {
        let dir = tempdir().unwrap();
        let template = dir.path().join("template.nc");
        let data = dir.path().join("data.nc");
        let output = dir.path().join("out.nc");
        create_template_file(&template);
        create_data_file(&data, 300.0);

        let config = JobConfig {
            template_key: template.to_string_lossy().to_string(),
            data_key: data.to_string_lossy().to_string(),
            variable_name: None,
            output_key: output.to_string_lossy().to_string(),
            overrides: vec![OverrideConfig {
                scope: AttrScope::Global,
                name: "source_id".to_string(),
                value: OverrideValue::Text("MyModel".to_string()),
            }],
            update_history: false,
        };

        process_cmorize_job(&config).unwrap();

        let out = netcdf::open(&output).unwrap();
        let tas: Vec<f32> = out
            .variable("tas")
            .unwrap()
            .get_values::<f32, _>(..)
            .unwrap();
        let expected: Vec<f32> = (0..24).map(|i| 300.0 + i as f32).collect();
        assert_eq!(tas, expected);
        assert_eq!(global_str_attr(&out, "source_id").as_deref(), Some("MyModel"));
        // Without --update-history the template's history is untouched
        assert_eq!(
            global_str_attr(&out, "history").as_deref(),
            Some("original processing")
        );
    }

    #[test]
    fn test_process_cmorize_job_updates_history() {
        let dir = tempdir().unwrap();
        let template = dir.path().join("template.nc");
        let data = dir.path().join("data.nc");
        let output = dir.path().join("out.nc");
        create_template_file(&template);
        create_data_file(&data, 290.0);

        let config = JobConfig {
            template_key: template.to_string_lossy().to_string(),
            data_key: data.to_string_lossy().to_string(),
            variable_name: Some("tas".to_string()),
            output_key: output.to_string_lossy().to_string(),
            overrides: vec![],
            update_history: true,
        };

        process_cmorize_job(&config).unwrap();

        let out = netcdf::open(&output).unwrap();
        let history = global_str_attr(&out, "history").unwrap();
        assert!(history.contains("CMORized with nc2cmor"));
        assert!(history.ends_with("; original processing"));
    }

    #[test]
    fn test_process_cmorize_job_missing_variable() {
        let dir = tempdir().unwrap();
        let template = dir.path().join("template.nc");
        let data = dir.path().join("data.nc");
        let output = dir.path().join("out.nc");
        create_template_file(&template);
        create_data_file(&data, 290.0);

        let config = JobConfig {
            template_key: template.to_string_lossy().to_string(),
            data_key: data.to_string_lossy().to_string(),
            variable_name: Some("does_not_exist".to_string()),
            output_key: output.to_string_lossy().to_string(),
            overrides: vec![],
            update_history: false,
        };

        assert!(process_cmorize_job(&config).is_err());
        assert!(!output.exists());
    }
}
