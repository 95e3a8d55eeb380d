//! mintboard: offline-first tracking of mints, to-dos and farming projects.
//!
//! Local writes land in SQLite first and are reconciled with a REST backend
//! by [`sync::SyncEngine`]. The same crate ships the reference backend in
//! [`server`].

pub mod client;
pub mod config;
pub mod db;
pub mod models;
pub mod server;
pub mod sync;
