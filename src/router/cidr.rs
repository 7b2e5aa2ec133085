//! CIDR parsing and matching
//!
//! Addresses are kept as network-order bytes so matching is a plain
//! byte-wise comparison of the leading `prefix` bits.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use thiserror::Error;

/// Errors produced while parsing `address[/prefix]`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CidrError {
    /// The address part is not valid for the family
    #[error("'{0}' is not a valid address")]
    InvalidAddress(String),
    /// The prefix part is not made of digits only
    #[error("'{0}' could not be parsed as a valid CIDR netmask")]
    InvalidPrefix(String),
    /// The prefix is wider than the address
    #[error("netmask found to be {prefix}, should be at most {max}")]
    PrefixTooLong { prefix: u32, max: u8 },
}

/// An IPv4 network, e.g. `127.0.0.1/32`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CidrV4 {
    addr: [u8; 4],
    prefix: u8,
}

/// An IPv6 network, e.g. `::1/128`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CidrV6 {
    addr: [u8; 16],
    prefix: u8,
}

impl CidrV4 {
    pub const WIDTH: u8 = 32;

    /// Build from an address and prefix length
    pub fn new(addr: Ipv4Addr, prefix: u8) -> Result<Self, CidrError> {
        if prefix > Self::WIDTH {
            return Err(CidrError::PrefixTooLong {
                prefix: prefix.into(),
                max: Self::WIDTH,
            });
        }
        Ok(Self {
            addr: addr.octets(),
            prefix,
        })
    }

    /// A single-host network
    pub const fn host(addr: Ipv4Addr) -> Self {
        Self {
            addr: addr.octets(),
            prefix: Self::WIDTH,
        }
    }

    /// Parse `a.b.c.d` or `a.b.c.d/n`
    pub fn parse(text: &str) -> Result<Self, CidrError> {
        let (addr, prefix) = split_prefix(text, Self::WIDTH)?;
        let addr = Ipv4Addr::from_str(addr)
            .map_err(|_| CidrError::InvalidAddress(addr.to_string()))?;
        Self::new(addr, prefix)
    }

    pub fn addr(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.addr)
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Check whether `candidate` falls inside this network
    #[inline]
    pub fn matches(&self, candidate: Ipv4Addr) -> bool {
        prefix_matches(&self.addr, &candidate.octets(), self.prefix)
    }
}

impl CidrV6 {
    pub const WIDTH: u8 = 128;

    /// Build from an address and prefix length
    pub fn new(addr: Ipv6Addr, prefix: u8) -> Result<Self, CidrError> {
        if prefix > Self::WIDTH {
            return Err(CidrError::PrefixTooLong {
                prefix: prefix.into(),
                max: Self::WIDTH,
            });
        }
        Ok(Self {
            addr: addr.octets(),
            prefix,
        })
    }

    /// A single-host network
    pub const fn host(addr: Ipv6Addr) -> Self {
        Self {
            addr: addr.octets(),
            prefix: Self::WIDTH,
        }
    }

    /// Parse `x:y::z` or `x:y::z/n`
    pub fn parse(text: &str) -> Result<Self, CidrError> {
        let (addr, prefix) = split_prefix(text, Self::WIDTH)?;
        let addr = Ipv6Addr::from_str(addr)
            .map_err(|_| CidrError::InvalidAddress(addr.to_string()))?;
        Self::new(addr, prefix)
    }

    pub fn addr(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.addr)
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Check whether `candidate` falls inside this network
    #[inline]
    pub fn matches(&self, candidate: Ipv6Addr) -> bool {
        prefix_matches(&self.addr, &candidate.octets(), self.prefix)
    }
}

impl FromStr for CidrV4 {
    type Err = CidrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl FromStr for CidrV6 {
    type Err = CidrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CidrV4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr(), self.prefix)
    }
}

impl fmt::Display for CidrV6 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr(), self.prefix)
    }
}

/// Split `addr/prefix`, defaulting the prefix to the full width
fn split_prefix(text: &str, width: u8) -> Result<(&str, u8), CidrError> {
    let Some((addr, prefix)) = text.split_once('/') else {
        return Ok((text, width));
    };

    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CidrError::InvalidPrefix(prefix.to_string()));
    }

    // Digits only, so the only failure left is overflow.
    let value: u32 = prefix.parse().unwrap_or(u32::MAX);
    if value > u32::from(width) {
        return Err(CidrError::PrefixTooLong {
            prefix: value,
            max: width,
        });
    }

    Ok((addr, value as u8))
}

/// Compare the leading `prefix` bits of two network-order addresses
fn prefix_matches(network: &[u8], candidate: &[u8], prefix: u8) -> bool {
    let full = usize::from(prefix / 8);
    let rem = prefix % 8;

    if network[..full] != candidate[..full] {
        return false;
    }
    if rem == 0 {
        return true;
    }

    // Boundary byte: keep the high `rem` bits only.
    let mask = 0xffu8 << (8 - rem);
    (network[full] & mask) == (candidate[full] & mask)
}
