//! Purpose: Shared library crate used by the `clientbook` CLI, server, and tests.
//! Exports: `core` (records, rules, storage, errors) and `api` (service, client, book).
//! Role: Library backing the binary; the server and console are thin shells over it.
//! Invariants: Validation rules are defined once in `core::rules` and used everywhere.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
pub mod store_paths;
