use std::io::{self, BufRead, Write};

/// Port for stream-backed attachment storage.
///
/// Inputs are opened by handle; outputs are created as pending resources
/// that only become visible once committed. Dropping a pending output
/// without committing releases and discards it.
pub trait AttachmentStore: Send + Sync {
    /// Open a readable stream for an existing attachment handle.
    fn open(&self, id: &str) -> io::Result<Box<dyn BufRead + Send>>;

    /// Create a pending output stream. `file_name` is a naming hint only.
    fn create(&self, file_name: &str) -> io::Result<Box<dyn PendingAttachment>>;
}

/// A writable output attachment that has not been published yet.
pub trait PendingAttachment: Write + Send {
    /// Flush and publish the attachment, returning its new handle.
    fn commit(self: Box<Self>) -> io::Result<String>;
}
