//! Media E2E test suite.
//!
//! Exercises the storage proxy, legacy redirects, mirroring and the
//! migration job through the public crate API with an in-memory object
//! store. The ledger tests marked `#[ignore]` need a running PostgreSQL
//! database.
//!
//! Run with: cargo test --test media_e2e
//! Ledger tests: cargo test --test media_e2e -- --ignored

mod test_helpers;

mod test_ledger_postgres;
mod test_legacy_redirect;
mod test_mirror_then_serve;
mod test_storage_proxy;
