use std::process;

use clap::Parser;

use pgit::commands::{handle_add, handle_init, handle_reset};
use pgit::errors::is_exclude_disabled;
use pgit::styling::{error_message, eprintln, println, success_message};

mod cli;

use cli::{Cli, Commands};

fn init_logger(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let working_dir = std::env::current_dir()?;

    match cli.command {
        Commands::Init => {
            handle_init(&working_dir)?;
            Ok(0)
        }
        Commands::Add { paths } => {
            let report = handle_add(&working_dir, &paths)?;
            println!(
                "{}",
                success_message(format!("Added {} path(s) to private tracking", report.added.len()))
            );
            Ok(0)
        }
        Commands::Reset { force, dry_run } => {
            let outcome = handle_reset(&working_dir, force, dry_run)?;
            if outcome.cancelled || outcome.dry_run {
                return Ok(outcome.exit_code());
            }
            println!(
                "{}",
                success_message(format!(
                    "Reset complete: {} restored, {} symlink(s) removed, {} backup(s) cleaned",
                    outcome.restored_files, outcome.removed_symlinks, outcome.cleaned_backups
                ))
            );
            for error in &outcome.errors {
                eprintln!("{}", error_message(error));
            }
            Ok(outcome.exit_code())
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    match run(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            // ExcludeDisabled is a hard stop by contract; everything else is
            // an ordinary classified failure. Both exit 1.
            if is_exclude_disabled(&e) {
                log::debug!("exclude integration disabled with fallback=error");
            }
            eprintln!("{}", error_message(format!("{e:#}")));
            process::exit(1);
        }
    }
}
