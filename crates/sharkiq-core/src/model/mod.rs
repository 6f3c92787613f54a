// ── Domain model ──

pub mod device;

pub use device::{Device, ERROR_CODE_PROPERTY, mask_serial};
