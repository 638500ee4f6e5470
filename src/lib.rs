//! Source-of-truth cutover coordinator.
//!
//! Moves live tables, one at a time, from a legacy store to a new store:
//! consistency validation, readiness checklists, freeze windows, background
//! reconciliation, and an orchestrated state machine with compensating
//! rollback. All coordinator state lives in a single SQLite database;
//! per-table transitions serialize on an optimistic version check rather
//! than any global lock.

pub mod api;
pub mod checklist;
pub mod cmd;
pub mod config;
pub mod errors;
pub mod freeze;
pub mod models;
pub mod orchestrator;
pub mod reconcile;
pub mod registry;
pub mod server;
pub mod store;
pub mod validator;
