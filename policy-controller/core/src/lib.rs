//! Governance decisions for terraform configurations.
//!
//! Every decision here is computed synchronously over a snapshot of cluster
//! objects that the caller has already fetched:
//!
//! - [`resolve`] picks the single security policy applying to a
//!   configuration, ranking candidates with a [`WeightedSelector`];
//! - [`modules`] decides whether a module source is permitted;
//! - [`integrity`] finds the configurations that still depend on a context,
//!   namespace or policy that is about to be deleted;
//! - [`report`] records the outcome of a verification run and derives its
//!   pass/fail gate.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod error;
mod identity;
pub mod integrity;
mod matcher;
pub mod modules;
pub mod report;
pub mod resolve;
pub mod weighted;

pub use self::{
    error::Error,
    identity::Identity,
    matcher::Matcher,
    report::{ComplianceReport, Severity, Status},
    weighted::{InvalidWeight, WeightedSelector},
};
