//! Queue transport adapters.

pub mod redis;
