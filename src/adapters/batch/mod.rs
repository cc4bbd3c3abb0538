pub mod json_batch;
