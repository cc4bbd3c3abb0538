use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::core::errors::{PgpipeError, Result};
use crate::core::models::batch_item::BatchItem;
use crate::core::models::outcome::{ItemOutcome, OutputItem};

/// Path that stands for stdin or stdout.
pub const STDIO: &str = "-";

fn is_stdio(path: &Path) -> bool {
    path.as_os_str() == STDIO
}

/// Read a batch: a JSON array of items, or a single item object.
///
/// `-` reads from stdin.
pub fn read_items(path: &Path) -> Result<Vec<BatchItem>> {
    let (label, reader): (PathBuf, Box<dyn Read>) = if is_stdio(path) {
        (PathBuf::from("<stdin>"), Box::new(io::stdin().lock()))
    } else {
        let file = File::open(path).map_err(|e| PgpipeError::BatchFile {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        (path.to_path_buf(), Box::new(BufReader::new(file)))
    };

    parse_items(reader).map_err(|detail| PgpipeError::BatchFile {
        path: label,
        detail,
    })
}

fn parse_items(reader: impl Read) -> std::result::Result<Vec<BatchItem>, String> {
    let value: serde_json::Value =
        serde_json::from_reader(reader).map_err(|e| format!("invalid JSON: {e}"))?;

    let items = if value.is_array() {
        serde_json::from_value(value)
    } else {
        serde_json::from_value(value).map(|item| vec![item])
    };
    items.map_err(|e| format!("not a batch of items: {e}"))
}

/// Write outcomes as a JSON array of host items.
///
/// `-` writes to stdout.
pub fn write_outcomes(outcomes: Vec<ItemOutcome>, path: &Path) -> Result<()> {
    let items: Vec<OutputItem> = outcomes
        .into_iter()
        .map(ItemOutcome::into_output_item)
        .collect();

    if is_stdio(path) {
        let mut writer = io::stdout().lock();
        write_items(&items, &mut writer)?;
        writer.flush()?;
    } else {
        let mut writer = BufWriter::new(File::create(path)?);
        write_items(&items, &mut writer)?;
        writer.flush()?;
    }
    Ok(())
}

fn write_items(items: &[OutputItem], writer: &mut dyn Write) -> Result<()> {
    serde_json::to_writer_pretty(&mut *writer, items).map_err(io::Error::from)?;
    writeln!(writer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_array_and_single_item() {
        let items = parse_items(&br#"[{"json":{"text":"a"}},{"json":{"text":"b"}}]"#[..]).unwrap();
        assert_eq!(items.len(), 2);

        let items = parse_items(&br#"{"json":{"text":"only"}}"#[..]).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].json["text"], "only");
    }

    #[test]
    fn rejects_non_items() {
        assert!(parse_items(&b"not json"[..]).unwrap_err().contains("invalid JSON"));
        assert!(parse_items(&b"[1, 2]"[..]).unwrap_err().contains("not a batch"));
    }

    #[test]
    fn missing_file_is_batch_file_error() {
        let err = read_items(Path::new("/nonexistent/batch.json")).unwrap_err();
        assert!(matches!(err, PgpipeError::BatchFile { .. }));
        assert!(err.is_batch_fatal());
    }

    #[test]
    fn writes_host_shaped_items() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.json");
        let outcomes = vec![ItemOutcome::Failure {
            index: 0,
            message: "Malformed message: bad".into(),
        }];

        write_outcomes(outcomes, &out).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(written[0]["json"]["error"], "Malformed message: bad");
        assert_eq!(written[0]["pairedItem"]["item"], 0);
    }
}
