use clap::{CommandFactory, Parser};
use clap_complete::generate;
use nc2cmor::cli::{
    Cli, Commands, OutputFormat, build_job_config, generate_template, render_config,
};
use nc2cmor::info::{
    get_netcdf_info, print_file_info_csv, print_file_info_human, print_file_info_json,
    print_file_info_yaml,
};
use nc2cmor::input::JobConfig;
use nc2cmor::levels::extract_pressure_levels;
use nc2cmor::log::{config_echo, init_logging, show_farewell_with_timing, show_greeting};
use nc2cmor::process_cmorize_job;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Cmorize {
            output,
            template,
            data,
            variable,
            set,
            set_var,
            update_history,
            dry_run,
        } => {
            let config = build_job_config(
                cli.config.as_ref(),
                template,
                data,
                output,
                variable,
                set,
                set_var,
                update_history,
            )?;

            let config_source = match &cli.config {
                Some(path) => path.display().to_string(),
                None => "command line arguments".to_string(),
            };

            if !cli.quiet {
                show_greeting(&config_source);
                config_echo(&config);
            }

            if dry_run {
                validate_job_config(&config, true)?;
                if !cli.quiet {
                    println!("\nDry run complete - no output written.");
                }
                return Ok(());
            }

            let start = Instant::now();
            process_cmorize_job(&config)?;
            if !cli.quiet {
                show_farewell_with_timing(start.elapsed());
            }
            Ok(())
        }

        Commands::ExtractLevels {
            input,
            output,
            levels,
        } => {
            if !cli.quiet {
                println!(
                    "Extracting {} pressure level(s) from {} into {}",
                    levels.len(),
                    input,
                    output
                );
            }
            let start = Instant::now();
            extract_pressure_levels(Path::new(&input), Path::new(&output), &levels)?;
            if !cli.quiet {
                println!(
                    "Extraction completed in {:.2}s",
                    start.elapsed().as_secs_f64()
                );
            }
            Ok(())
        }

        Commands::Info {
            file,
            detailed,
            variable,
            format,
        } => {
            let info = get_netcdf_info(&file, variable.as_deref(), detailed)?;
            let format = format.unwrap_or(cli.output_format);
            match format {
                OutputFormat::Human => print_file_info_human(&info),
                OutputFormat::Json => print_file_info_json(&info)?,
                OutputFormat::Yaml => print_file_info_yaml(&info)?,
                OutputFormat::Csv => print_file_info_csv(&info)?,
            }
            Ok(())
        }

        Commands::Template {
            template_type,
            output,
            format,
        } => {
            let config = generate_template(&template_type);
            let rendered = render_config(&config, &format)?;
            write_or_print(output, &rendered, cli.quiet, "Configuration template")
        }

        Commands::Validate {
            config_file,
            detailed,
        } => {
            let path = config_file
                .or(cli.config)
                .ok_or("No configuration file given: pass a path or set --config")?;
            let config = JobConfig::from_file(&path)?;
            println!(
                "✓ Configuration file parsed successfully: {}",
                path.display()
            );
            config_echo(&config);
            validate_job_config(&config, detailed)?;
            println!("\n✓ Validation passed");
            Ok(())
        }

        Commands::Completions { shell, output } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            match output {
                Some(path) => {
                    let mut file = fs::File::create(&path)?;
                    generate(shell, &mut cmd, name, &mut file);
                    if !cli.quiet {
                        println!("Completions written to: {}", path.display());
                    }
                }
                None => generate(shell, &mut cmd, name, &mut io::stdout()),
            }
            Ok(())
        }
    }
}

/// Checks the parts of a job that can be verified without writing output.
fn validate_job_config(
    config: &JobConfig,
    detailed: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if !Path::new(&config.template_key).exists() {
        return Err(format!("Template file not found: {}", config.template_key).into());
    }
    if !Path::new(&config.data_key).exists() {
        return Err(format!("Data file not found: {}", config.data_key).into());
    }

    if detailed {
        let template = netcdf::open(&config.template_key)?;
        let variable_name = match &config.variable_name {
            Some(name) => name.clone(),
            None => nc2cmor::template::primary_variable_name(&template)?,
        };
        println!("  Primary variable: {}", variable_name);
        template.close()?;

        let data_file = netcdf::open(&config.data_key)?;
        if data_file.variable(&variable_name).is_none() {
            return Err(format!(
                "Variable '{}' not found in data file {}",
                variable_name, config.data_key
            )
            .into());
        }
        data_file.close()?;
    }

    Ok(())
}

fn write_or_print(
    output: Option<PathBuf>,
    content: &str,
    quiet: bool,
    label: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    match output {
        Some(path) => {
            fs::write(&path, content)?;
            if !quiet {
                println!("{} written to: {}", label, path.display());
            }
        }
        None => println!("{}", content),
    }
    Ok(())
}
