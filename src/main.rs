use clap::Parser;
use log::{error, info};

use memcload::cli::Cli;
use memcload::config::LoaderConfig;
use memcload::config_file::ConfigFile;
use memcload::loader::Loader;
use memcload::logging::{init_log, run_level};
use memcload::payload;
use memcload::platform::{termination_exit_code, ExitCode, SignalHandler};

fn main() {
    let cli = process_args_with_config();

    if cli.test {
        match payload::self_test() {
            Ok(()) => {
                println!("Self test passed");
                ExitCode::Success.exit();
            }
            Err(e) => {
                eprintln!("memcload: Self test failed: {:#}", e);
                ExitCode::GeneralError.exit();
            }
        }
    }

    if let Err(e) = init_log(run_level(cli.dry), cli.log.as_deref()) {
        eprintln!("memcload: Error: {:#}", e);
        ExitCode::InvalidUsage.exit();
    }

    let config = match LoaderConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            eprintln!("memcload: Error: {:#}", e);
            ExitCode::InvalidUsage.exit();
        }
    };

    let _signal_handler = match SignalHandler::new() {
        Ok(handler) => handler,
        Err(e) => {
            eprintln!("Failed to initialize signal handling: {}", e);
            ExitCode::GeneralError.exit();
        }
    };

    info!(
        "Memc loader started: pattern={} workers={} dry={} shards={:?}",
        config.input.pattern,
        config.pool.num_workers,
        config.store.dry_run,
        config.shards.iter().collect::<Vec<_>>()
    );

    let loader = match Loader::with_memcache(config) {
        Ok(loader) => loader,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::InvalidUsage.exit();
        }
    };

    let stats = match loader.run() {
        Ok(stats) => stats,
        Err(e) => {
            error!("Unexpected error: {:#}", e);
            ExitCode::GeneralError.exit();
        }
    };

    let output = &loader.config().output;
    if output.stats {
        match stats.render(output.stats_format) {
            Ok(rendered) => println!("{}", rendered),
            Err(e) => error!("Failed to render stats: {:#}", e),
        }
    }

    if let Some(code) = termination_exit_code() {
        code.exit();
    }
    if stats.has_failures() {
        ExitCode::GeneralError.exit();
    }
    ExitCode::Success.exit();
}

/// Extract --config-file argument from raw args
fn extract_config_file_arg(args: &[String]) -> Option<String> {
    args.iter()
        .position(|arg| arg == "--config-file")
        .and_then(|i| args.get(i + 1).cloned())
        .or_else(|| {
            args.iter()
                .find_map(|arg| arg.strip_prefix("--config-file=").map(str::to_string))
        })
}

/// Parse the command line after prepending config file settings
fn process_args_with_config() -> Cli {
    let raw_args: Vec<String> = std::env::args().collect();
    let config_file_path = extract_config_file_arg(&raw_args);

    if raw_args.iter().any(|arg| arg == "--show-config") {
        ConfigFile::show_config();
        ExitCode::Success.exit();
    }

    let processed_args = if raw_args.iter().any(|arg| arg == "--ignore-config") {
        raw_args
    } else {
        match ConfigFile::load_with_custom_path(config_file_path.as_deref())
            .and_then(|config_file| config_file.process_args(raw_args))
        {
            Ok(processed) => processed,
            Err(e) => {
                eprintln!("memcload: Config file error: {:#}", e);
                ExitCode::InvalidUsage.exit();
            }
        }
    };

    let mut cli = Cli::parse_from(processed_args);
    cli.resolve_boolean_flags();
    cli
}
