//! Numbering and lifecycle integrity for quotations and contracts.
//!
//! Approved documents get sequential numbers per financial year
//! (`EPPL/ATT/QTN/2024-25/12`, `PRE/2024-25/7`), revisable through a
//! `/R<n>` suffix. Deleting a quotation or contract removes every record it
//! owns.

pub mod cascade;
pub mod config;
pub mod counter;
pub mod document;
pub mod error;
pub mod fiscal;
pub mod number;
pub mod records;
pub mod revision;
pub mod service;
pub mod store;
pub mod utils;

pub use cascade::{DeleteFilter, DeletionPlan};
pub use config::Config;
pub use document::{Contract, DocType, Quotation, RootDocument};
pub use error::{LifecycleError, Result};
pub use service::DocumentService;
