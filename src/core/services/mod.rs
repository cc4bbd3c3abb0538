pub mod batch_orchestrator;
pub mod key_loader;
pub mod payload_adapter;
pub mod transform_engine;
