//! Observability for the schema/query engine.
//!
//! Structured JSON logging only: one line per event, synchronous, with
//! deterministic key ordering so log output is diffable in tests and
//! deployments alike. Observability is read-only; nothing in here affects
//! engine behavior.

mod logger;

pub use logger::{Logger, Severity};
