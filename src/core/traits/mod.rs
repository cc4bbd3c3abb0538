pub mod attachment_store;
pub mod cipher;
