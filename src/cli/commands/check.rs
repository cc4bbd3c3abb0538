use std::path::Path;

use crate::cli::KeyArgs;
use crate::cli::output;
use crate::config::app_config::AppConfig;
use crate::core::errors::Result;
use crate::core::models::key_material::fingerprint_hex;
use crate::core::services::key_loader::KeyLoader;

/// Execute the `pgpipe check` command.
///
/// Loads and unlocks the configured keys without touching any items,
/// then reports which operations they allow.
pub fn execute(args: &KeyArgs, config_path: Option<&Path>) -> Result<()> {
    let config = AppConfig::load(config_path)?;
    let credentials = config.credentials(args.overrides())?;
    let keys = KeyLoader::load(&credentials)?;

    output::header("🔍 pgpipe check");

    match &keys.public_key {
        Some(key) => {
            output::success("Public key loaded");
            output::detail("fingerprint", &fingerprint_hex(key));
        }
        None => output::warning("No public key: encrypt is unavailable, decrypt will not verify"),
    }

    match &keys.private_key {
        Some(key) => {
            output::success("Private key unlocked");
            output::detail("fingerprint", &key.fingerprint());
            if key.signing_key().is_none() {
                output::warning("Private key has no unlocked key that may sign: encrypt will fail");
            }
        }
        None => output::warning("No private key: decrypt is unavailable, encrypt will not sign"),
    }

    let mut ready = Vec::new();
    if keys.public_key.is_some() {
        ready.push("encrypt");
    }
    if keys.private_key.is_some() {
        ready.push("decrypt");
    }

    if ready.is_empty() {
        output::warning("No keys configured");
    } else {
        println!();
        output::detail("ready for", &ready.join(", "));
    }

    Ok(())
}
