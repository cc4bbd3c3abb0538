use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use tempfile::NamedTempFile;

use crate::core::traits::attachment_store::{AttachmentStore, PendingAttachment};

/// Name used when an attachment carries no usable file name.
const FALLBACK_NAME: &str = "attachment";

/// Give up finding a free output name after this many tries.
const MAX_NAME_ATTEMPTS: usize = 1000;

/// Mode of committed outputs. Temp files start out owner-only.
#[cfg(unix)]
const OUTPUT_MODE: u32 = 0o644;

/// Attachment store backed by a directory.
///
/// Handles are file names relative to the root. Outputs are written to a
/// hidden temp file in the same directory and renamed into place on commit,
/// never overwriting an existing file.
pub struct FsAttachmentStore {
    root: PathBuf,
}

impl FsAttachmentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a handle to a path inside the root.
    fn resolve(&self, id: &str) -> io::Result<PathBuf> {
        let relative = Path::new(id);
        let inside = !id.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !inside {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("attachment handle '{id}' points outside the attachments directory"),
            ));
        }
        Ok(self.root.join(relative))
    }
}

impl AttachmentStore for FsAttachmentStore {
    fn open(&self, id: &str) -> io::Result<Box<dyn BufRead + Send>> {
        let path = self.resolve(id)?;
        let file = File::open(&path).map_err(|e| {
            io::Error::new(e.kind(), format!("cannot open attachment '{id}': {e}"))
        })?;
        log::debug!("Opened attachment {}", path.display());
        Ok(Box::new(BufReader::new(file)))
    }

    fn create(&self, file_name: &str) -> io::Result<Box<dyn PendingAttachment>> {
        let name = sanitize_file_name(file_name);
        let temp = tempfile::Builder::new()
            .prefix(".pgpipe-")
            .suffix(".part")
            .tempfile_in(&self.root)?;
        log::debug!("Pending output {} for '{name}'", temp.path().display());

        Ok(Box::new(PendingFile {
            writer: BufWriter::new(temp),
            root: self.root.clone(),
            name,
        }))
    }
}

/// Output file that is deleted on drop unless committed.
struct PendingFile {
    writer: BufWriter<NamedTempFile>,
    root: PathBuf,
    name: String,
}

impl Write for PendingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl PendingAttachment for PendingFile {
    fn commit(self: Box<Self>) -> io::Result<String> {
        let PendingFile { writer, root, name } = *self;
        let mut temp = writer.into_inner().map_err(|e| e.into_error())?;
        temp.as_file().sync_all()?;
        publish_permissions(&temp)?;

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let candidate = if attempt == 0 {
                name.clone()
            } else {
                format!("{attempt}-{name}")
            };
            match temp.persist_noclobber(root.join(&candidate)) {
                Ok(_) => {
                    log::debug!("Committed attachment {candidate}");
                    return Ok(candidate);
                }
                Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => temp = e.file,
                Err(e) => return Err(e.error),
            }
        }

        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free output name for '{name}'"),
        ))
    }
}

#[cfg(unix)]
fn publish_permissions(temp: &NamedTempFile) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(temp.path(), std::fs::Permissions::from_mode(OUTPUT_MODE))
}

#[cfg(not(unix))]
fn publish_permissions(_temp: &NamedTempFile) -> io::Result<()> {
    Ok(())
}

/// Keep only the final path component; fall back when nothing usable is left.
fn sanitize_file_name(file_name: &str) -> String {
    let base = Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    if base.trim_matches('.').is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        base.to_string()
    }
}
