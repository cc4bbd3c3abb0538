mod adapters;
mod cli;
mod config;
mod core;
#[cfg(test)]
mod test_support;

use clap::Parser;

use cli::{Cli, Commands};
use crate::core::models::operation::Operation;

fn main() {
    let args = Cli::parse();
    init_logging(args.verbose, args.quiet);

    let config = args.config.as_deref();

    let result = match &args.command {
        Commands::Encrypt(transform) => {
            cli::commands::transform::execute(Operation::Encrypt, transform, config, args.quiet)
        }
        Commands::Decrypt(transform) => {
            cli::commands::transform::execute(Operation::Decrypt, transform, config, args.quiet)
        }
        Commands::Check(keys) => cli::commands::check::execute(keys, config).map(|()| true),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            cli::output::error(&format!("Error: {e}"));
            std::process::exit(1);
        }
    }
}

/// `RUST_LOG` wins over the verbosity flags.
fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}
