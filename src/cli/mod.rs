pub mod commands;
pub mod interrupt;
pub mod output;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::app_config::CredentialOverrides;

/// Encrypt, sign, decrypt and verify batches of items with OpenPGP.
#[derive(Parser, Debug)]
#[command(name = "pgpipe", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode: only show errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Path to alternative config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Encrypt every item for the configured public key, signing when a private key is set
    Encrypt(TransformArgs),

    /// Decrypt every item with the configured private key, verifying when a public key is set
    Decrypt(TransformArgs),

    /// Load the configured keys and report what is available
    Check(KeyArgs),
}

/// Key files given on the command line.
#[derive(Args, Debug, Default)]
pub struct KeyArgs {
    /// Armored public key file (recipient for encrypt, verifier for decrypt)
    #[arg(long, value_name = "FILE")]
    pub public_key: Option<PathBuf>,

    /// Armored private key file (signer for encrypt, decryption key for decrypt).
    /// The passphrase is read from PGPIPE_PASSPHRASE
    #[arg(long, value_name = "FILE")]
    pub private_key: Option<PathBuf>,
}

impl KeyArgs {
    pub fn overrides(&self) -> CredentialOverrides {
        CredentialOverrides {
            public_key_file: self.public_key.clone(),
            private_key_file: self.private_key.clone(),
        }
    }
}

#[derive(Args, Debug)]
pub struct TransformArgs {
    #[command(flatten)]
    pub keys: KeyArgs,

    /// Batch file to read, '-' for stdin
    #[arg(short, long, value_name = "FILE", default_value = "-")]
    pub input: PathBuf,

    /// Where to write the result batch, '-' for stdout
    #[arg(short, long, value_name = "FILE", default_value = "-")]
    pub output: PathBuf,

    /// Item payload type: 'file' (binary attachment) or 'string' (text field)
    #[arg(long = "type", value_name = "TYPE")]
    pub kind: Option<String>,

    /// Json field holding the text of 'string' items
    #[arg(long, value_name = "NAME")]
    pub text_field: Option<String>,

    /// Binary slot read by 'file' items
    #[arg(long, value_name = "NAME")]
    pub binary_property: Option<String>,

    /// Binary slot written by 'file' items
    #[arg(long, value_name = "NAME")]
    pub output_property: Option<String>,

    /// Directory holding stream-backed attachments
    #[arg(long, value_name = "DIR")]
    pub attachments_dir: Option<PathBuf>,

    /// Record failed items as error items instead of stopping the batch
    #[arg(long)]
    pub continue_on_fail: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_transform_flags() {
        let cli = Cli::parse_from([
            "pgpipe",
            "encrypt",
            "--input",
            "items.json",
            "--type",
            "string",
            "--public-key",
            "bob.asc",
            "--continue-on-fail",
            "-v",
        ]);

        assert!(cli.verbose);
        let Commands::Encrypt(args) = cli.command else {
            panic!("expected encrypt");
        };
        assert_eq!(args.input, PathBuf::from("items.json"));
        assert_eq!(args.output, PathBuf::from("-"));
        assert_eq!(args.kind.as_deref(), Some("string"));
        assert_eq!(args.keys.public_key, Some(PathBuf::from("bob.asc")));
        assert!(args.continue_on_fail);
    }
}
