use std::path::{Path, PathBuf};

use crate::adapters::attachments::fs_attachment_store::FsAttachmentStore;
use crate::adapters::batch::json_batch;
use crate::adapters::cipher::rpgp_backend::RpgpBackend;
use crate::cli::TransformArgs;
use crate::cli::{interrupt, output};
use crate::config::app_config::AppConfig;
use crate::core::errors::{PgpipeError, Result};
use crate::core::models::operation::{ContentKind, Operation};
use crate::core::services::batch_orchestrator::{BatchOrchestrator, BatchPolicy};
use crate::core::services::key_loader::KeyLoader;
use crate::core::services::payload_adapter::{BatchDefaults, CancelToken, PayloadAdapter};
use crate::core::services::transform_engine::TransformEngine;

/// Execute `pgpipe encrypt` or `pgpipe decrypt`.
///
/// Returns `Ok(true)` when the batch completed and `Ok(false)` when it
/// aborted; the outcomes emitted before an abort are written either way.
pub fn execute(
    operation: Operation,
    args: &TransformArgs,
    config_path: Option<&Path>,
    quiet: bool,
) -> Result<bool> {
    let cancel = CancelToken::new();
    if let Err(e) = interrupt::cancel_on_interrupt(cancel.clone()) {
        log::warn!("Ctrl-C will not cancel the batch: {e}");
    }

    let config = AppConfig::load(config_path)?;
    let credentials = config.credentials(args.keys.overrides())?;
    let keys = KeyLoader::load(&credentials)?;

    let defaults = batch_defaults(&config, args)?;
    let policy = BatchPolicy {
        continue_on_fail: args.continue_on_fail || config.batch.continue_on_fail,
    };

    let attachments_dir = args
        .attachments_dir
        .clone()
        .or_else(|| config.attachments_dir())
        .unwrap_or_else(|| PathBuf::from("."));
    let store = FsAttachmentStore::new(attachments_dir);
    log::debug!("Attachments directory: {}", store.root().display());

    let items = json_batch::read_items(&args.input)?;

    let engine = TransformEngine::new(RpgpBackend::new());
    let adapter = PayloadAdapter::new(operation, defaults);
    let orchestrator =
        BatchOrchestrator::new(&engine, &adapter, &store, policy).with_cancel_token(cancel);

    let bar = output::progress(items.len(), quiet);
    let run = orchestrator.run_with_progress(&items, &keys, |outcome| {
        output::tick(&bar, outcome)
    });
    bar.finish_and_clear();

    let (succeeded, failed) = (run.succeeded(), run.failed());
    let (outcomes, aborted) = run.into_parts();
    json_batch::write_outcomes(outcomes, &args.output)?;

    match aborted {
        None => {
            if !quiet {
                output::success(&format!(
                    "{operation}: {succeeded} item(s) succeeded, {failed} failed"
                ));
            }
            if failed > 0 && !quiet {
                output::warning("Failed items are reported as { \"error\": ... } entries");
            }
            Ok(true)
        }
        Some(err) if matches!(err.root(), PgpipeError::Cancelled) => {
            output::warning("Batch cancelled; unfinished outputs were discarded");
            Ok(false)
        }
        Some(err) => {
            output::error(&format!("Batch aborted: {err}"));
            Ok(false)
        }
    }
}

/// Config `[batch]` values with command-line flags on top.
fn batch_defaults(config: &AppConfig, args: &TransformArgs) -> Result<BatchDefaults> {
    let mut defaults = config.batch_defaults()?;

    if let Some(kind) = &args.kind {
        defaults.kind = kind.parse::<ContentKind>()?;
    }
    if let Some(field) = &args.text_field {
        defaults.text_field = field.clone();
    }
    if let Some(slot) = &args.binary_property {
        defaults.binary_property = slot.clone();
    }
    if let Some(slot) = &args.output_property {
        defaults.output_property = Some(slot.clone());
    }

    Ok(defaults)
}
