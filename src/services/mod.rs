//! Media reconciliation services.

pub mod category;
pub mod ledger;
pub mod migration;
pub mod mirror;
pub mod normalizer;
pub mod resolver;
pub mod rewriter;
pub mod storage;

pub use category::{Category, CategoryRegistry};
pub use ledger::MigrationLedger;
pub use normalizer::{CanonicalPath, Normalizer, normalize};
pub use resolver::MediaResolver;
pub use storage::{ObjectStore, Storage};
