//! Crate-level tests driving the pipeline end to end with in-process fakes.

mod properties;
mod streaming;
pub(crate) mod support;
