pub mod check;
pub mod transform;
