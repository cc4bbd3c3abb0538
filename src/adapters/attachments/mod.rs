pub mod fs_attachment_store;
