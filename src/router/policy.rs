//! Client address policy
//!
//! Evaluates a client address against the allow-lists of a snapshot.

use std::net::IpAddr;
use tracing::debug;

use super::cidr::{CidrV4, CidrV6};
use crate::snapshot::ConfigSnapshot;

/// Access decision for a client address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    /// Address matched an entry, or could not be checked
    Allow,
    /// Address matched no entry of its family's list
    Deny,
}

/// Allow-lists borrowed from one snapshot
#[derive(Debug, Clone, Copy)]
pub struct AccessPolicy<'a> {
    allow_v4: &'a [CidrV4],
    allow_v6: &'a [CidrV6],
}

impl<'a> AccessPolicy<'a> {
    pub fn new(allow_v4: &'a [CidrV4], allow_v6: &'a [CidrV6]) -> Self {
        Self { allow_v4, allow_v6 }
    }

    pub fn from_snapshot(snapshot: &'a ConfigSnapshot) -> Self {
        Self::new(snapshot.allow_v4(), snapshot.allow_v6())
    }

    /// Decide whether `client` may read stats
    ///
    /// Unknown addresses are allowed, as is any family whose list is empty.
    /// Otherwise the first matching entry allows and no match denies.
    pub fn decide(&self, client: Option<IpAddr>) -> AccessDecision {
        let allowed = match client {
            None => true,
            Some(IpAddr::V4(ip)) => {
                self.allow_v4.is_empty() || self.allow_v4.iter().any(|cidr| cidr.matches(ip))
            }
            Some(IpAddr::V6(ip)) => {
                self.allow_v6.is_empty() || self.allow_v6.iter().any(|cidr| cidr.matches(ip))
            }
        };

        if allowed {
            debug!(client = ?client, "clientip --> ALLOW");
            AccessDecision::Allow
        } else {
            debug!(client = ?client, "clientip --> DENY");
            AccessDecision::Deny
        }
    }

    pub fn is_allowed(&self, client: Option<IpAddr>) -> bool {
        self.decide(client) == AccessDecision::Allow
    }
}
