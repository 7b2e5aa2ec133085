//! Request routing
//!
//! Decides whether a request is served by the stats session, based on the
//! configured path and client address allow-lists.

mod cidr;
mod gate;
mod policy;
mod query;

pub use cidr::{CidrError, CidrV4, CidrV6};
pub use gate::{evaluate, GateDecision, Intercept, PassReason, Request};
pub use policy::{AccessDecision, AccessPolicy};
pub use query::QueryFilter;
