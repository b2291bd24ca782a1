//! Durable job store adapters.

pub mod postgres;
