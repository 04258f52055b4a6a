//! Community media server library.
//!
//! Path normalization, directory mirroring, database reference rewriting,
//! the migration ledger and the storage proxy shared by the server and the
//! `media-migrate` batch binary.

pub mod api;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod middleware;
pub mod migration;
pub mod models;
pub mod services;

#[cfg(test)]
mod testing;
