//! Model domain module.
//!
//! - `model`: Model types (`Model`, `HostedModel`, `CustomModel`,
//!   `AccessTier`, `ModelCategory`)
//! - `catalog`: Copy-on-write model table (`ModelCatalog`)

mod catalog;
#[allow(clippy::module_inception)]
mod model;

pub use catalog::ModelCatalog;
pub use model::{AccessTier, CustomModel, HostedModel, Model, ModelCategory};
