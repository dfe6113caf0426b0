use clap::{Arg, ArgAction, Command};
use std::fs::File;
use std::path::{Path, PathBuf};

use libnxconvert::params::ConversionParams;
use libnxconvert::process::{convert_with_params, exit_code_for_error, EXIT_USAGE};

fn make_template_params(path: &Path) -> i32 {
    log::info!("Making a template params file at {}...", path.display());
    match ConversionParams::default().write_params_file(path) {
        Ok(()) => {
            log::info!("Done.");
            0
        }
        Err(e) => {
            log::error!("{e}");
            EXIT_USAGE
        }
    }
}

/// Terminal output only
fn init_term_logging(level: simplelog::LevelFilter) -> Result<(), log::SetLoggerError> {
    simplelog::TermLogger::init(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )
}

/// Terminal output plus a log file next to the output file
fn init_logging(level: simplelog::LevelFilter, log_path: &Path) {
    let mut loggers: Vec<Box<dyn simplelog::SharedLogger>> = vec![simplelog::TermLogger::new(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )];
    let file_error = match File::create(log_path) {
        Ok(file) => {
            loggers.push(simplelog::WriteLogger::new(
                simplelog::LevelFilter::Debug,
                simplelog::Config::default(),
                file,
            ));
            None
        }
        Err(e) => Some(e),
    };
    if let Err(e) = simplelog::CombinedLogger::init(loggers) {
        eprintln!("Could not create logging: {e}");
    }
    if let Some(e) = file_error {
        log::warn!("Could not create log file {}: {e}", log_path.display());
    }
}

fn main() {
    let matches = Command::new("nxconvert")
        .about("Convert experiment data into NeXus files")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template params yaml file"))
        .arg(
            Arg::new("params")
                .short('p')
                .long("params")
                .help("Path to the params file"),
        )
        .arg(
            Arg::new("files")
                .num_args(0..)
                .help("Input files, added to those named in the params file"),
        )
        .arg(Arg::new("reader").long("reader").help("Name of the reader"))
        .arg(
            Arg::new("nxdl")
                .long("nxdl")
                .help("Application definition, e.g. NXmpes"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .help("Path of the NeXus file to write"),
        )
        .arg(
            Arg::new("definitions")
                .long("definitions")
                .help("Root of the NeXus definitions"),
        )
        .arg(
            Arg::new("permissive")
                .long("permissive")
                .action(ArgAction::SetTrue)
                .help("Write the file even when validation fails"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Log debug messages to the terminal"),
        )
        .get_matches();

    let level = if matches.get_flag("verbose") {
        simplelog::LevelFilter::Debug
    } else {
        simplelog::LevelFilter::Info
    };
    let params_path = matches.get_one::<String>("params").map(PathBuf::from);

    if let Some(("new", _)) = matches.subcommand() {
        if let Err(e) = init_term_logging(level) {
            eprintln!("Could not create logging: {e}");
        }
        let path = params_path.unwrap_or_else(|| PathBuf::from("params.yaml"));
        std::process::exit(make_template_params(&path));
    }

    let params = match &params_path {
        Some(path) => match ConversionParams::read_params_file(path) {
            Ok(params) => params,
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(EXIT_USAGE);
            }
        },
        None => ConversionParams::default(),
    };
    let params = apply_overrides(params, &matches);

    init_logging(level, &params.output.with_extension("log"));
    if let Some(path) = &params_path {
        log::info!("Params loaded from {}", path.display());
    }
    log::info!("Reader: {}", params.reader);
    log::info!(
        "Definition: {}",
        params.nxdl.as_deref().unwrap_or("taken from the ELN")
    );
    log::info!("Definitions Path: {}", params.definitions_path.display());
    log::info!("Output Path: {}", params.output.display());
    log::info!("Permissive: {}", params.permissive);

    let code = match convert_with_params(&params) {
        Ok(outcome) => {
            if outcome.written {
                log::info!("Wrote {}", outcome.output.display());
            }
            log::info!("{}", outcome.report.summary());
            outcome.exit_code()
        }
        Err(e) => {
            log::error!("Conversion failed with error: {e}");
            exit_code_for_error(&e)
        }
    };
    log::info!("Done.");
    std::process::exit(code);
}

/// Command line values win over the params file
fn apply_overrides(mut params: ConversionParams, matches: &clap::ArgMatches) -> ConversionParams {
    if let Some(files) = matches.get_many::<String>("files") {
        params.input_files.extend(files.map(PathBuf::from));
    }
    if let Some(reader) = matches.get_one::<String>("reader") {
        params.reader = reader.clone();
    }
    if let Some(nxdl) = matches.get_one::<String>("nxdl") {
        params.nxdl = Some(nxdl.clone());
    }
    if let Some(output) = matches.get_one::<String>("output") {
        params.output = PathBuf::from(output);
    }
    if let Some(definitions) = matches.get_one::<String>("definitions") {
        params.definitions_path = PathBuf::from(definitions);
    }
    if matches.get_flag("permissive") {
        params.permissive = true;
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_logger_init_is_reported() {
        let _ = init_term_logging(simplelog::LevelFilter::Info);
        assert!(init_term_logging(simplelog::LevelFilter::Info).is_err());
    }
}
