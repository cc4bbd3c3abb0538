pub mod batch_item;
pub mod key_material;
pub mod key_usage;
pub mod operation;
pub mod outcome;
pub mod work_item;
