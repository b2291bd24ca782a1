//! Read-side domain record access.

pub mod postgres;
