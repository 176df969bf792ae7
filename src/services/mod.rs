//! Service layer: the change-request workflow, direct member administration,
//! search, and export.

mod export;
mod members;
mod query;
mod review;
mod submission;

pub use export::*;
pub use members::*;
pub use query::*;
pub use review::*;
pub use submission::*;

#[cfg(test)]
pub(crate) mod testutil;
