//! Shared helpers

pub mod file_io;
