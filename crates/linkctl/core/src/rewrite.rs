// linkctl
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Address rewrite table - translates destination addresses into the
//! address space reachable from the source cluster
//!
//! Each rule maps a prefix on the destination side (`from`) to a prefix the
//! source side can route to (`to`). A translated address keeps the host bits
//! of the original address, counted from the `from` prefix length, and takes
//! its network bits from `to`. Rules whose two sides differ in prefix length
//! or address family never translate anything.

use ipnetwork::IpNetwork;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RewriteTableError {
    #[error("Invalid CIDR {cidr:?}: {reason}")]
    InvalidCidr { cidr: String, reason: String },
    #[error("Overlapping rewrite prefixes: {first} and {second}")]
    Overlapping { first: IpNetwork, second: IpNetwork },
}

/// Why an address could not be translated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoMappingReason {
    NoMatchingRule,
    PrefixLengthMismatch { from: u8, to: u8 },
    AddressFamilyMismatch,
}

impl fmt::Display for NoMappingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoMappingReason::NoMatchingRule => write!(f, "no rewrite rule covers the address"),
            NoMappingReason::PrefixLengthMismatch { from, to } => write!(f, "rule prefix lengths differ (/{} -> /{})", from, to),
            NoMappingReason::AddressFamilyMismatch => write!(f, "rule maps between address families"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("No mapping found for {address}: {reason}")]
pub struct NoMappingFound {
    pub address: IpAddr,
    pub reason: NoMappingReason,
}

/// A single prefix-to-prefix rewrite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewriteRule {
    pub from: IpNetwork,
    pub to: IpNetwork,
}

impl RewriteRule {
    pub fn new(from: IpNetwork, to: IpNetwork) -> Self {
        Self {
            from: normalize(from),
            to: normalize(to),
        }
    }

    pub fn parse(from: &str, to: &str) -> Result<Self, RewriteTableError> {
        Ok(Self::new(parse_cidr(from)?, parse_cidr(to)?))
    }

    fn apply(&self, address: IpAddr) -> Result<IpAddr, NoMappingReason> {
        let prefix = self.from.prefix();
        if prefix != self.to.prefix() {
            return Err(NoMappingReason::PrefixLengthMismatch { from: prefix, to: self.to.prefix() });
        }

        match (address, self.to.network()) {
            (IpAddr::V4(addr), IpAddr::V4(net)) => {
                let host_mask = u32::MAX.checked_shr(u32::from(prefix)).unwrap_or(0);
                let bits = (u32::from(net) & !host_mask) | (u32::from(addr) & host_mask);
                Ok(IpAddr::V4(Ipv4Addr::from(bits)))
            }
            (IpAddr::V6(addr), IpAddr::V6(net)) => {
                let host_mask = u128::MAX.checked_shr(u32::from(prefix)).unwrap_or(0);
                let bits = (u128::from(net) & !host_mask) | (u128::from(addr) & host_mask);
                Ok(IpAddr::V6(Ipv6Addr::from(bits)))
            }
            _ => Err(NoMappingReason::AddressFamilyMismatch),
        }
    }
}

impl fmt::Display for RewriteRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// Immutable set of rewrite rules for one destination cluster
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressRewriteTable {
    rules: Vec<RewriteRule>,
}

impl AddressRewriteTable {
    /// Builds a table, rejecting rules whose `from` prefixes overlap
    pub fn new(rules: Vec<RewriteRule>) -> Result<Self, RewriteTableError> {
        ensure_disjoint(rules.iter().map(|r| r.from))?;
        Ok(Self { rules })
    }

    /// Builds a table from `(from CIDR, to CIDR)` string pairs
    pub fn from_cidr_pairs<I, K, V>(pairs: I) -> Result<Self, RewriteTableError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let rules = pairs
            .into_iter()
            .map(|(from, to)| RewriteRule::parse(from.as_ref(), to.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(rules)
    }

    /// Table translating in the opposite direction
    pub fn inverse(&self) -> Result<Self, RewriteTableError> {
        Self::new(self.rules.iter().map(|r| RewriteRule { from: r.to, to: r.from }).collect())
    }

    pub fn rules(&self) -> &[RewriteRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Mandatory translation: an address no rule covers is an error
    pub fn translate(&self, address: IpAddr) -> Result<IpAddr, NoMappingFound> {
        let rule = self.rules.iter().find(|r| r.from.contains(address)).ok_or(NoMappingFound {
            address,
            reason: NoMappingReason::NoMatchingRule,
        })?;

        rule.apply(address).map_err(|reason| NoMappingFound { address, reason })
    }
}

/// Translates `address` through `table` when one is supplied, otherwise
/// passes it through unchanged.
pub fn translate(address: IpAddr, table: Option<&AddressRewriteTable>) -> Result<IpAddr, NoMappingFound> {
    match table {
        Some(table) => table.translate(address),
        None => Ok(address),
    }
}

fn parse_cidr(cidr: &str) -> Result<IpNetwork, RewriteTableError> {
    IpNetwork::from_str(cidr.trim()).map_err(|e| RewriteTableError::InvalidCidr {
        cidr: cidr.to_string(),
        reason: e.to_string(),
    })
}

fn normalize(net: IpNetwork) -> IpNetwork {
    IpNetwork::new(net.network(), net.prefix()).unwrap_or(net)
}

fn ensure_disjoint(prefixes: impl Iterator<Item = IpNetwork>) -> Result<(), RewriteTableError> {
    let prefixes: Vec<IpNetwork> = prefixes.collect();
    for (i, first) in prefixes.iter().enumerate() {
        for second in &prefixes[i + 1..] {
            if first.contains(second.network()) || second.contains(first.network()) {
                return Err(RewriteTableError::Overlapping {
                    first: *first,
                    second: *second,
                });
            }
        }
    }
    Ok(())
}
