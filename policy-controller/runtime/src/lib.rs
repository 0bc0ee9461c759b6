#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use terranetes_policy_controller_core as core;
pub use terranetes_policy_controller_k8s_api as k8s;

mod admission;
mod args;
mod guard;
mod lister;
mod metrics;
pub mod render;
pub mod verify;

pub use self::{
    admission::Admission,
    args::Args,
    guard::{PreconditionGuard, ReferentialIntegrityGuard},
    lister::Lister,
    metrics::AdmissionMetrics,
};
