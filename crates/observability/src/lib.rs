//! `talentforge-observability` — process-wide telemetry wiring.

pub mod tracing;

pub use self::tracing::init;
