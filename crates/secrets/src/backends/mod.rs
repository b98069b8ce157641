//! Secret store backends.

pub mod filesystem;
pub mod gcp;
