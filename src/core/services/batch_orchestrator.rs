use std::io;

use crate::core::errors::{PgpipeError, Result};
use crate::core::models::batch_item::{BatchItem, PayloadMode};
use crate::core::models::key_material::KeyMaterial;
use crate::core::models::outcome::{BatchRun, BatchState, ItemOutcome, ItemState, OutputItem};
use crate::core::models::work_item::{
    AttachmentRef, ItemContent, MessageInput, MessageOutput, WorkItem,
};
use crate::core::services::payload_adapter::{
    AttachmentContent, CancelToken, CancellableReader, PayloadAdapter,
};
use crate::core::services::transform_engine::{TransformEngine, TransformRequest};
use crate::core::traits::attachment_store::AttachmentStore;
use crate::core::traits::cipher::CipherBackend;

/// What to do when an item fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchPolicy {
    /// Record the failure as an error item and keep going.
    pub continue_on_fail: bool,
}

/// Drives one batch through the payload adapter and transform engine.
pub struct BatchOrchestrator<'a, C: CipherBackend> {
    engine: &'a TransformEngine<C>,
    adapter: &'a PayloadAdapter,
    store: &'a dyn AttachmentStore,
    policy: BatchPolicy,
    cancel: CancelToken,
}

impl<'a, C: CipherBackend> BatchOrchestrator<'a, C> {
    pub fn new(
        engine: &'a TransformEngine<C>,
        adapter: &'a PayloadAdapter,
        store: &'a dyn AttachmentStore,
        policy: BatchPolicy,
    ) -> Self {
        Self {
            engine,
            adapter,
            store,
            policy,
            cancel: CancelToken::new(),
        }
    }

    /// Use `token` to stop the batch from elsewhere.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn run(&self, items: &[BatchItem], keys: &KeyMaterial) -> BatchRun {
        self.run_with_progress(items, keys, |_| {})
    }

    /// Process every item in order, calling `on_outcome` after each one.
    pub fn run_with_progress(
        &self,
        items: &[BatchItem],
        keys: &KeyMaterial,
        mut on_outcome: impl FnMut(&ItemOutcome),
    ) -> BatchRun {
        let operation = self.adapter.operation();
        let mut outcomes = Vec::with_capacity(items.len());

        if let Err(err) = self.engine.check_keys(operation, keys) {
            log::error!("Batch precondition failed for {operation}");
            return BatchRun {
                outcomes,
                state: BatchState::Aborted(err),
            };
        }

        log::info!("{operation} batch of {} item(s)", items.len());

        for (index, item) in items.iter().enumerate() {
            if self.cancel.is_cancelled() {
                log::warn!("Batch cancelled before item {index}");
                return BatchRun {
                    outcomes,
                    state: BatchState::Aborted(PgpipeError::Cancelled),
                };
            }

            let state = step(index, ItemState::Pending, ItemState::Processing);
            let result = self.process(index, item, keys);

            match result {
                Ok(output) => {
                    step(index, state, ItemState::Succeeded);
                    let outcome = ItemOutcome::Success(output);
                    on_outcome(&outcome);
                    outcomes.push(outcome);
                }
                Err(err) => {
                    step(index, state, ItemState::Failed);
                    let err = if self.cancel.is_cancelled() {
                        PgpipeError::Cancelled
                    } else {
                        err
                    };

                    if self.policy.continue_on_fail && !err.is_batch_fatal() {
                        log::warn!("Item {index} failed: {err}");
                        let outcome = ItemOutcome::Failure {
                            index,
                            message: err.to_string(),
                        };
                        on_outcome(&outcome);
                        outcomes.push(outcome);
                        continue;
                    }

                    log::error!("Item {index} failed, aborting batch");
                    let err = match err {
                        PgpipeError::Cancelled => err,
                        other => PgpipeError::ItemFailed {
                            index,
                            source: Box::new(other),
                        },
                    };
                    return BatchRun {
                        outcomes,
                        state: BatchState::Aborted(err),
                    };
                }
            }
        }

        BatchRun {
            outcomes,
            state: BatchState::Completed,
        }
    }

    fn process(&self, index: usize, item: &BatchItem, keys: &KeyMaterial) -> Result<OutputItem> {
        let WorkItem { index, content } = self.adapter.resolve(index, item)?;

        match content {
            ItemContent::Text(text) => match self.transform(MessageInput::Text(text), keys)? {
                MessageOutput::Text(result) => Ok(self.adapter.text_output(index, item, result)),
                other => Err(mismatched("text", &other)),
            },
            ItemContent::Binary(attachment) => {
                log::debug!(
                    "Item {index}: {:?} attachment from '{}'",
                    attachment.mode,
                    attachment.slot
                );
                match attachment.mode {
                    PayloadMode::Buffered => self.process_buffered(index, item, &attachment, keys),
                    PayloadMode::Streamed => self.process_streamed(index, item, &attachment, keys),
                }
            }
        }
    }

    fn process_buffered(
        &self,
        index: usize,
        item: &BatchItem,
        attachment: &AttachmentRef<'_>,
        keys: &KeyMaterial,
    ) -> Result<OutputItem> {
        let bytes = PayloadAdapter::decode(attachment.descriptor)?;

        match self.transform(MessageInput::Buffer(&bytes), keys)? {
            MessageOutput::Buffer(result) => Ok(self.adapter.binary_output(
                index,
                item,
                attachment,
                AttachmentContent::Inline(result),
            )),
            other => Err(mismatched("buffer", &other)),
        }
    }

    /// The pending output is only committed after the transform succeeded,
    /// including signature verification; on any error it is dropped.
    fn process_streamed(
        &self,
        index: usize,
        item: &BatchItem,
        attachment: &AttachmentRef<'_>,
        keys: &KeyMaterial,
    ) -> Result<OutputItem> {
        let id = attachment
            .descriptor
            .id
            .as_deref()
            .ok_or_else(|| PgpipeError::InvalidItem {
                detail: "streamed attachment has no handle".into(),
            })?;

        let mut reader = CancellableReader::new(self.store.open(id)?, self.cancel.clone());
        let mut pending = self
            .store
            .create(&self.adapter.output_file_name(attachment.descriptor))?;

        let output = self.transform(
            MessageInput::Stream {
                reader: &mut reader,
                writer: &mut pending,
            },
            keys,
        )?;

        match output {
            MessageOutput::Streamed { bytes_written } => {
                let handle = pending.commit()?;
                log::debug!("Item {index}: wrote {bytes_written} bytes to {handle}");
                Ok(self.adapter.binary_output(
                    index,
                    item,
                    attachment,
                    AttachmentContent::Handle(handle),
                ))
            }
            other => Err(mismatched("stream", &other)),
        }
    }

    fn transform(&self, input: MessageInput<'_>, keys: &KeyMaterial) -> Result<MessageOutput> {
        self.engine.run(TransformRequest {
            operation: self.adapter.operation(),
            input,
            keys,
        })
    }
}

/// Advance an item's state, logging the transition.
fn step(index: usize, from: ItemState, to: ItemState) -> ItemState {
    match from.advance(to) {
        Some(next) if next.is_terminal() => {
            log::debug!("Item {index}: {next:?}");
            next
        }
        Some(next) => {
            log::trace!("Item {index}: {from:?} -> {next:?}");
            next
        }
        None => {
            log::warn!("Item {index}: ignored transition {from:?} -> {to:?}");
            from
        }
    }
}

/// The backend answered in a different representation than it was asked in.
fn mismatched(input: &str, output: &MessageOutput) -> PgpipeError {
    let kind = match output {
        MessageOutput::Text(_) => "text",
        MessageOutput::Buffer(_) => "buffer",
        MessageOutput::Streamed { .. } => "stream",
    };
    PgpipeError::Io(io::Error::other(format!(
        "backend returned {kind} output for {input} input"
    )))
}
