// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Durable, partitioned document store for sessions, plans, steps, and
//! agent messages.
//!
//! Documents are partitioned by `session_id` and scoped to a `user_id`; all
//! reads within one partition are read-your-writes.  Two backends implement
//! the [`Store`] trait: [`MemoryStore`] (default, per-process) and
//! [`SqliteStore`] (durable, single-file).

mod entities;
mod error;
mod memory;
mod sqlite;
mod store;

pub use entities::*;
pub use error::StoreError;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::Store;
