//! Request gate
//!
//! Decides per request whether the stats subsystem takes it over. Runs
//! synchronously on the calling task and only reads the snapshot and the
//! request itself.

use std::net::IpAddr;
use tracing::debug;

use super::policy::{AccessDecision, AccessPolicy};
use super::query::QueryFilter;
use crate::snapshot::{ConfigSnapshot, RecordTypeMask};

/// The parts of a request the gate looks at
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    /// URL path without the leading slash
    pub path: &'a [u8],
    /// Raw query string, if any
    pub query: Option<&'a str>,
    /// Client address, if known
    pub client: Option<IpAddr>,
}

/// What an intercepted session should render
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intercept {
    pub filter: QueryFilter,
    pub record_types: RecordTypeMask,
}

/// Why a request was left to normal handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassReason {
    PathMismatch,
    AddressDenied,
}

/// Gate outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Serve the request from the stats session
    Intercept(Intercept),
    /// Leave the request alone
    PassThrough(PassReason),
}

impl GateDecision {
    pub fn is_intercept(&self) -> bool {
        matches!(self, Self::Intercept(_))
    }
}

/// Evaluate one request against `snapshot`
pub fn evaluate(request: &Request<'_>, snapshot: &ConfigSnapshot) -> GateDecision {
    if request.path != snapshot.stats_path().as_bytes() {
        return GateDecision::PassThrough(PassReason::PathMismatch);
    }

    if AccessPolicy::from_snapshot(snapshot).decide(request.client) == AccessDecision::Deny {
        debug!(client = ?request.client, "not right ip");
        return GateDecision::PassThrough(PassReason::AddressDenied);
    }

    let filter = request.query.map(QueryFilter::parse).unwrap_or_default();
    let record_types = filter.record_types().unwrap_or(snapshot.record_types());
    debug!(
        query = request.query.unwrap_or(""),
        record_types = %record_types,
        "Intercepting request"
    );

    GateDecision::Intercept(Intercept {
        filter,
        record_types,
    })
}
