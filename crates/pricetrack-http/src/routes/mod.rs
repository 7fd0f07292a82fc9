//! HTTP API route handlers.

pub mod system;
pub mod track;
