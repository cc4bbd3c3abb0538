use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::errors::PgpipeError;
use crate::core::models::batch_item::BinaryData;

/// Provenance of an output item: the index of its source item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairedItem {
    pub item: usize,
}

/// An item as written to the output batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputItem {
    pub json: Map<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub binary: BTreeMap<String, BinaryData>,
    #[serde(rename = "pairedItem")]
    pub paired_item: PairedItem,
}

/// What happened to one input item.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Success(OutputItem),
    Failure { index: usize, message: String },
}

impl ItemOutcome {
    /// Index of the source item.
    pub fn index(&self) -> usize {
        match self {
            ItemOutcome::Success(item) => item.paired_item.item,
            ItemOutcome::Failure { index, .. } => *index,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ItemOutcome::Success(_))
    }

    /// Host representation. Failures become `{ "error": message }` items.
    pub fn into_output_item(self) -> OutputItem {
        match self {
            ItemOutcome::Success(item) => item,
            ItemOutcome::Failure { index, message } => {
                let mut json = Map::new();
                json.insert("error".into(), Value::String(message));
                OutputItem {
                    json,
                    binary: BTreeMap::new(),
                    paired_item: PairedItem { item: index },
                }
            }
        }
    }
}

/// Lifecycle of a single item inside a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Pending,
    Processing,
    Succeeded,
    Failed,
}

impl ItemState {
    /// Move to `next`, refusing any transition that goes backwards
    /// or leaves a terminal state.
    pub fn advance(self, next: ItemState) -> Option<ItemState> {
        match (self, next) {
            (ItemState::Pending, ItemState::Processing)
            | (ItemState::Processing, ItemState::Succeeded)
            | (ItemState::Processing, ItemState::Failed) => Some(next),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ItemState::Succeeded | ItemState::Failed)
    }
}

/// Terminal state of a batch.
#[derive(Debug)]
pub enum BatchState {
    Completed,
    Aborted(PgpipeError),
}

/// Everything a batch produced, including outcomes emitted before an abort.
#[derive(Debug)]
pub struct BatchRun {
    pub outcomes: Vec<ItemOutcome>,
    pub state: BatchState,
}

impl BatchRun {
    #[cfg(test)]
    pub fn is_completed(&self) -> bool {
        matches!(self.state, BatchState::Completed)
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Split into the emitted outcomes and the abort error, if any.
    pub fn into_parts(self) -> (Vec<ItemOutcome>, Option<PgpipeError>) {
        match self.state {
            BatchState::Completed => (self.outcomes, None),
            BatchState::Aborted(err) => (self.outcomes, Some(err)),
        }
    }
}
