//! Small shared helpers used across the runtime.

pub mod value_ext;
