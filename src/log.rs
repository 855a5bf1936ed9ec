use crate::input::JobConfig;
use std::time::Duration;

/// Initializes env_logger honoring `RUST_LOG`, with the verbosity flags as
/// fallback defaults.
pub fn init_logging(verbose: bool, quiet: bool) {
    let default_level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

pub fn show_greeting(config_source: &str) {
    println!("=== nc2cmor: template-based CMORizer ===");
    println!("Job configuration: {}", config_source);
}

pub fn config_echo(config: &JobConfig) {
    println!("\nConfiguration:");
    println!("  Template NetCDF: {}", config.template_key);
    println!("  Data NetCDF: {}", config.data_key);
    if let Some(variable) = &config.variable_name {
        println!("  Variable: {}", variable);
    }
    println!("  Output NetCDF: {}", config.output_key);
    println!("  Update history: {}", config.update_history);
    println!("  Number of overrides: {}", config.overrides.len());

    for (i, ov) in config.overrides.iter().enumerate() {
        println!("    Override {}: [{}] {}", i + 1, ov.scope, ov.name);
    }
}

pub fn show_netcdf_file_info(file: &netcdf::File) -> Result<(), Box<dyn std::error::Error>> {
    println!("\nNetCDF File Info:");
    println!("Dimensions:");
    for dim in file.dimensions() {
        println!("  {}: {}", dim.name(), dim.len());
    }
    println!("Variables:");
    for var in file.variables() {
        let dims: Vec<String> = var.dimensions().iter().map(|d| d.name().to_string()).collect();
        println!("  {}: {:?}", var.name(), dims);
    }
    Ok(())
}

pub fn show_farewell_with_timing(elapsed: Duration) {
    println!(
        "\n=== CMORization completed successfully in {:.2}s! ===",
        elapsed.as_secs_f64()
    );
}
