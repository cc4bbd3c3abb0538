use std::collections::BTreeMap;
use std::io::{self, BufRead, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;

use crate::core::errors::{PgpipeError, Result};
use crate::core::models::batch_item::{BatchItem, BinaryData};
use crate::core::models::operation::{ContentKind, Operation};
use crate::core::models::outcome::{OutputItem, PairedItem};
use crate::core::models::work_item::{AttachmentRef, ItemContent, WorkItem};

/// MIME type given to every encrypted attachment.
pub const PGP_MIME_TYPE: &str = "application/pgp-encrypted";

/// Extension appended to encrypted file names.
pub const PGP_EXTENSION: &str = "pgp";

/// Batch-wide item parameters. Each item may override them through `params`.
#[derive(Debug, Clone)]
pub struct BatchDefaults {
    pub kind: ContentKind,
    /// Json field holding the text of `string` items.
    pub text_field: String,
    /// Binary slot read by `file` items.
    pub binary_property: String,
    /// Binary slot written by `file` items. Defaults to the operation's name.
    pub output_property: Option<String>,
}

impl Default for BatchDefaults {
    fn default() -> Self {
        Self {
            kind: ContentKind::default(),
            text_field: "text".into(),
            binary_property: "data".into(),
            output_property: None,
        }
    }
}

/// Content of a transformed attachment.
#[derive(Debug)]
pub enum AttachmentContent {
    /// Bytes to be stored inline as base64.
    Inline(Vec<u8>),
    /// Handle of a committed stream output.
    Handle(String),
}

/// Converts host items to work items and engine results back to host items.
pub struct PayloadAdapter {
    operation: Operation,
    defaults: BatchDefaults,
}

impl PayloadAdapter {
    pub fn new(operation: Operation, defaults: BatchDefaults) -> Self {
        Self {
            operation,
            defaults,
        }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Resolve an item's parameters and select its payload.
    pub fn resolve<'a>(&self, index: usize, item: &'a BatchItem) -> Result<WorkItem<'a>> {
        let kind = item.params.kind.unwrap_or(self.defaults.kind);

        let content = match kind {
            ContentKind::Text => ItemContent::Text(self.select_text(item)?),
            ContentKind::Binary => ItemContent::Binary(self.select_attachment(item)?),
        };

        Ok(WorkItem { index, content })
    }

    fn select_text<'a>(&self, item: &'a BatchItem) -> Result<&'a str> {
        if let Some(text) = item.params.text.as_deref() {
            return Ok(text);
        }

        let field = &self.defaults.text_field;
        match item.json.get(field) {
            Some(Value::String(text)) => Ok(text),
            Some(_) => Err(PgpipeError::InvalidItem {
                detail: format!("field '{field}' is not a string"),
            }),
            None => Err(PgpipeError::InvalidItem {
                detail: format!("no text given and field '{field}' is missing"),
            }),
        }
    }

    fn select_attachment<'a>(&self, item: &'a BatchItem) -> Result<AttachmentRef<'a>> {
        let slot = item
            .params
            .binary_property_name
            .as_deref()
            .unwrap_or(&self.defaults.binary_property);

        let (slot, descriptor) =
            item.binary
                .get_key_value(slot)
                .ok_or_else(|| PgpipeError::InvalidItem {
                    detail: format!("no binary data in slot '{slot}'"),
                })?;

        let output_slot = item
            .params
            .output_binary_property_name
            .clone()
            .or_else(|| self.defaults.output_property.clone())
            .unwrap_or_else(|| self.operation.output_name().to_string());

        Ok(AttachmentRef {
            slot: slot.as_str(),
            output_slot,
            descriptor,
            mode: descriptor.mode()?,
        })
    }

    /// Decode the inline bytes of a buffered attachment.
    pub fn decode(descriptor: &BinaryData) -> Result<Vec<u8>> {
        let data = descriptor
            .data
            .as_deref()
            .ok_or_else(|| PgpipeError::InvalidItem {
                detail: "binary attachment has no inline data".into(),
            })?;

        STANDARD
            .decode(data.trim())
            .map_err(|e| PgpipeError::InvalidItem {
                detail: format!("attachment data is not valid base64: {e}"),
            })
    }

    /// Output file name for an attachment, before any store-side renaming.
    pub fn output_file_name(&self, descriptor: &BinaryData) -> String {
        let name = descriptor.file_name.as_deref().unwrap_or("");
        match self.operation {
            Operation::Encrypt => encrypted_name(name),
            Operation::Decrypt => decrypted_name(name).to_string(),
        }
    }

    /// Output item for a text result: the original json plus the result field.
    pub fn text_output(&self, index: usize, item: &BatchItem, text: String) -> OutputItem {
        let mut json = item.json.clone();
        json.insert(self.operation.output_name().into(), Value::String(text));

        OutputItem {
            json,
            binary: item.binary.clone(),
            paired_item: PairedItem { item: index },
        }
    }

    /// Output item for a binary result: the original slots plus the output slot.
    pub fn binary_output(
        &self,
        index: usize,
        item: &BatchItem,
        attachment: &AttachmentRef<'_>,
        content: AttachmentContent,
    ) -> OutputItem {
        let descriptor = self.output_descriptor(attachment.descriptor, content);

        let mut binary: BTreeMap<String, BinaryData> = item.binary.clone();
        binary.insert(attachment.output_slot.clone(), descriptor);

        OutputItem {
            json: item.json.clone(),
            binary,
            paired_item: PairedItem { item: index },
        }
    }

    fn output_descriptor(&self, input: &BinaryData, content: AttachmentContent) -> BinaryData {
        let (data, id) = match content {
            AttachmentContent::Inline(bytes) => (Some(STANDARD.encode(bytes)), None),
            AttachmentContent::Handle(handle) => (None, Some(handle)),
        };

        let file_name = Some(self.output_file_name(input));
        match self.operation {
            Operation::Encrypt => BinaryData {
                file_name,
                mime_type: Some(PGP_MIME_TYPE.into()),
                file_extension: Some(PGP_EXTENSION.into()),
                data,
                id,
            },
            // Mime type and extension of the plaintext are left to the host.
            Operation::Decrypt => BinaryData {
                file_name,
                mime_type: None,
                file_extension: None,
                data,
                id,
            },
        }
    }
}

/// `report.pdf` becomes `report.pdf.pgp`.
pub fn encrypted_name(name: &str) -> String {
    format!("{name}.{PGP_EXTENSION}")
}

/// Strip exactly one trailing `.pgp`, if present.
pub fn decrypted_name(name: &str) -> &str {
    name.strip_suffix(".pgp").unwrap_or(name)
}

/// Shared flag used to stop a running batch.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Reader that fails every read once its token is cancelled.
pub struct CancellableReader<R> {
    inner: R,
    token: CancelToken,
}

impl<R> CancellableReader<R> {
    pub fn new(inner: R, token: CancelToken) -> Self {
        Self { inner, token }
    }

    fn check(&self) -> io::Result<()> {
        if self.token.is_cancelled() {
            Err(io::Error::other("batch cancelled"))
        } else {
            Ok(())
        }
    }
}

impl<R: Read> Read for CancellableReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check()?;
        self.inner.read(buf)
    }
}

impl<R: BufRead> BufRead for CancellableReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.check()?;
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::batch_item::{ItemParams, PayloadMode};
    use serde_json::json;

    fn item(raw: serde_json::Value) -> BatchItem {
        serde_json::from_value(raw).unwrap()
    }

    fn adapter(operation: Operation) -> PayloadAdapter {
        PayloadAdapter::new(operation, BatchDefaults::default())
    }

    fn text_defaults() -> BatchDefaults {
        BatchDefaults {
            kind: ContentKind::Text,
            ..Default::default()
        }
    }

    #[test]
    fn naming_rules() {
        assert_eq!(encrypted_name("report.pdf"), "report.pdf.pgp");
        assert_eq!(encrypted_name(""), ".pgp");
        assert_eq!(decrypted_name("report.pdf.pgp"), "report.pdf");
        assert_eq!(decrypted_name("archive.pgp.pgp"), "archive.pgp");
        assert_eq!(decrypted_name("notes.txt"), "notes.txt");
        assert_eq!(decrypted_name(""), "");
    }

    #[test]
    fn text_comes_from_params_before_json() {
        let adapter = PayloadAdapter::new(Operation::Encrypt, text_defaults());
        let it = BatchItem {
            json: json!({ "text": "from json" }).as_object().unwrap().clone(),
            params: ItemParams {
                text: Some("from params".into()),
                ..Default::default()
            },
            ..Default::default()
        };

        let work = adapter.resolve(0, &it).unwrap();
        assert!(matches!(work.content, ItemContent::Text("from params")));
    }

    #[test]
    fn text_falls_back_to_configured_field() {
        let adapter = PayloadAdapter::new(
            Operation::Encrypt,
            BatchDefaults {
                text_field: "body".into(),
                ..text_defaults()
            },
        );
        let it = item(json!({ "json": { "body": "hello" } }));

        let work = adapter.resolve(4, &it).unwrap();
        assert_eq!(work.index, 4);
        assert!(matches!(work.content, ItemContent::Text("hello")));
    }

    #[test]
    fn missing_or_non_string_text_is_invalid() {
        let adapter = PayloadAdapter::new(Operation::Encrypt, text_defaults());

        let missing = item(json!({ "json": {} }));
        assert!(matches!(
            adapter.resolve(0, &missing),
            Err(PgpipeError::InvalidItem { .. })
        ));

        let number = item(json!({ "json": { "text": 42 } }));
        assert!(matches!(
            adapter.resolve(0, &number),
            Err(PgpipeError::InvalidItem { .. })
        ));
    }

    #[test]
    fn binary_slot_and_output_slot_resolution() {
        let it = item(json!({
            "binary": { "data": { "fileName": "a.txt", "data": "aGk=" } }
        }));

        let work = adapter(Operation::Encrypt).resolve(0, &it).unwrap();
        let ItemContent::Binary(att) = work.content else {
            panic!("expected binary content");
        };
        assert_eq!(att.slot, "data");
        assert_eq!(att.output_slot, "encrypted");
        assert_eq!(att.mode, PayloadMode::Buffered);

        let it = item(json!({
            "binary": { "upload": { "id": "a.txt.pgp" } },
            "params": { "binaryPropertyName": "upload", "outputBinaryPropertyName": "plain" }
        }));
        let work = adapter(Operation::Decrypt).resolve(0, &it).unwrap();
        let ItemContent::Binary(att) = work.content else {
            panic!("expected binary content");
        };
        assert_eq!(att.slot, "upload");
        assert_eq!(att.output_slot, "plain");
        assert_eq!(att.mode, PayloadMode::Streamed);
    }

    #[test]
    fn missing_slot_is_invalid() {
        let it = item(json!({ "binary": { "other": { "data": "aGk=" } } }));
        let err = adapter(Operation::Encrypt).resolve(0, &it).unwrap_err();
        assert!(err.to_string().contains("slot 'data'"));
    }

    #[test]
    fn decode_rejects_bad_base64() {
        let good = BinaryData {
            data: Some("aGVsbG8=".into()),
            ..Default::default()
        };
        assert_eq!(PayloadAdapter::decode(&good).unwrap(), b"hello");

        let bad = BinaryData {
            data: Some("***".into()),
            ..Default::default()
        };
        assert!(matches!(
            PayloadAdapter::decode(&bad),
            Err(PgpipeError::InvalidItem { .. })
        ));
    }

    #[test]
    fn encrypted_attachment_is_renamed_and_typed() {
        let it = item(json!({
            "json": { "customer": 7 },
            "binary": { "data": { "fileName": "report.pdf", "mimeType": "application/pdf", "data": "aGk=" } }
        }));
        let adapter = adapter(Operation::Encrypt);
        let work = adapter.resolve(2, &it).unwrap();
        let ItemContent::Binary(att) = work.content else {
            panic!("expected binary content");
        };

        let out = adapter.binary_output(2, &it, &att, AttachmentContent::Inline(b"sealed".to_vec()));

        assert_eq!(out.paired_item.item, 2);
        assert_eq!(out.json["customer"], 7);
        assert_eq!(out.binary["data"], it.binary["data"]);

        let sealed = &out.binary["encrypted"];
        assert_eq!(sealed.file_name.as_deref(), Some("report.pdf.pgp"));
        assert_eq!(sealed.file_extension.as_deref(), Some("pgp"));
        assert_eq!(sealed.mime_type.as_deref(), Some(PGP_MIME_TYPE));
        assert_eq!(sealed.data.as_deref(), Some(STANDARD.encode(b"sealed").as_str()));
        assert!(sealed.id.is_none());
    }

    #[test]
    fn decrypted_attachment_drops_pgp_metadata() {
        let it = item(json!({
            "binary": { "data": { "fileName": "report.pdf.pgp", "mimeType": PGP_MIME_TYPE, "id": "report.pdf.pgp" } }
        }));
        let adapter = adapter(Operation::Decrypt);
        let work = adapter.resolve(0, &it).unwrap();
        let ItemContent::Binary(att) = work.content else {
            panic!("expected binary content");
        };

        let out = adapter.binary_output(0, &it, &att, AttachmentContent::Handle("report.pdf".into()));
        let plain = &out.binary["decrypted"];

        assert_eq!(plain.file_name.as_deref(), Some("report.pdf"));
        assert!(plain.mime_type.is_none());
        assert!(plain.file_extension.is_none());
        assert_eq!(plain.id.as_deref(), Some("report.pdf"));
        assert!(plain.data.is_none());
    }

    #[test]
    fn unnamed_attachment_gets_bare_extension() {
        let descriptor = BinaryData::default();
        assert_eq!(adapter(Operation::Encrypt).output_file_name(&descriptor), ".pgp");
        assert_eq!(adapter(Operation::Decrypt).output_file_name(&descriptor), "");
    }

    #[test]
    fn text_output_merges_over_original_json() {
        let it = item(json!({ "json": { "id": 1, "text": "-----BEGIN PGP MESSAGE-----" } }));
        let out = adapter(Operation::Decrypt).text_output(1, &it, "plain".into());

        assert_eq!(out.json["id"], 1);
        assert_eq!(out.json["decrypted"], "plain");
        assert_eq!(out.paired_item.item, 1);
    }

    #[test]
    fn cancelled_reader_stops_reading() {
        let token = CancelToken::new();
        let mut reader = CancellableReader::new(&b"abcdef"[..], token.clone());

        let mut buf = [0u8; 3];
        assert_eq!(reader.read(&mut buf).unwrap(), 3);

        token.cancel();
        assert!(reader.read(&mut buf).is_err());
        assert!(reader.fill_buf().is_err());
    }
}
