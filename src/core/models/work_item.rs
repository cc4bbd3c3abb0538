use std::io::{BufRead, Write};

use crate::core::models::batch_item::{BinaryData, PayloadMode};

/// A resolved, read-only view of one input item.
#[derive(Debug)]
pub struct WorkItem<'a> {
    pub index: usize,
    pub content: ItemContent<'a>,
}

/// The payload of a work item. Exactly one kind per item.
#[derive(Debug)]
pub enum ItemContent<'a> {
    Text(&'a str),
    Binary(AttachmentRef<'a>),
}

/// A binary attachment selected from an item's slots.
#[derive(Debug)]
pub struct AttachmentRef<'a> {
    /// Slot the attachment was read from.
    pub slot: &'a str,
    /// Slot the transformed attachment is written to.
    pub output_slot: String,
    pub descriptor: &'a BinaryData,
    pub mode: PayloadMode,
}

/// Message source handed to the cipher backend.
///
/// The representation of the output mirrors the input: text in, armored
/// text out; buffer in, buffer out; stream in, stream out.
pub enum MessageInput<'a> {
    Text(&'a str),
    Buffer(&'a [u8]),
    Stream {
        reader: &'a mut (dyn BufRead + Send),
        writer: &'a mut dyn Write,
    },
}

impl MessageInput<'_> {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            MessageInput::Text(_) => "text",
            MessageInput::Buffer(_) => "buffer",
            MessageInput::Stream { .. } => "stream",
        }
    }
}

/// Result of a successful transform.
#[derive(Debug, PartialEq)]
pub enum MessageOutput {
    Text(String),
    Buffer(Vec<u8>),
    /// Output went to the writer supplied with the input.
    Streamed { bytes_written: u64 },
}
