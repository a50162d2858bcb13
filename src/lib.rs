//! `ticket_migrate` mirrors locally stored tickets and their comments into a
//! GitHub-style issue tracker, recording every remote reference so imports can
//! be resumed safely.

/// Milestone and label lookups written through to the config file.
pub mod cache;
/// Wall-clock abstraction used for comment pacing.
pub mod clock;
/// Runtime configuration loading, validation, and write-back.
pub mod config;
/// Errors that abort an import run.
pub mod error;
/// Issue tracker REST client and request/response models.
pub mod github;
/// Tracing subscriber setup.
pub mod logging;
/// Runtime metrics counters.
pub mod metrics;
/// Ticket and comment record models.
pub mod model;
/// Markdown body and attribution rendering.
pub mod render;
/// SQLite-backed ticket record store.
pub mod store;
/// Per-project reconciliation engine.
pub mod sync;
/// Label derivation from free-form tag strings.
pub mod tags;

#[cfg(test)]
mod test_support;
