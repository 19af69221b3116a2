use std::fmt;
use std::net::IpAddr;

use serde::Serialize;

/// The protocol check that verifies a candidate.
///
/// Verdicts are cached per `(address, kind)`, so a DNS verdict never answers
/// an SNMP lookup for the same host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
    Dns,
    Snmp,
}

impl CheckKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::Dns => "dns",
            CheckKind::Snmp => "snmp",
        }
    }

    /// Human readable description of what an exposed verdict means.
    pub fn exposure_label(&self) -> &'static str {
        match self {
            CheckKind::Dns => "open DNS resolver",
            CheckKind::Snmp => "open SNMP agent",
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The discovery query that produced a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "signature", rename_all = "snake_case")]
pub enum Signature {
    /// Resolvers with recursion enabled inside one autonomous system.
    DnsRecursion { asn: String },
    /// SNMP agents advertising the default `public` community.
    SnmpDefaultCommunity,
}

impl Signature {
    pub fn kind(&self) -> CheckKind {
        match self {
            Signature::DnsRecursion { .. } => CheckKind::Dns,
            Signature::SnmpDefaultCommunity => CheckKind::Snmp,
        }
    }

    /// Search expression understood by the host intelligence index.
    pub fn search_query(&self) -> String {
        match self {
            Signature::DnsRecursion { asn } => format!("asn:{asn} port:53 'Recursion: enabled'"),
            Signature::SnmpDefaultCommunity => String::from("port:161 'public'"),
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signature::DnsRecursion { asn } => {
                write!(f, "open resolvers with recursion enabled in {asn}")
            }
            Signature::SnmpDefaultCommunity => f.write_str("open SNMP servers"),
        }
    }
}

/// A host returned by a discovery query, pending direct verification.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Candidate {
    pub address: IpAddr,
    pub signature: Signature,
}

impl Candidate {
    pub fn new(address: IpAddr, signature: Signature) -> Self {
        Self { address, signature }
    }

    pub fn kind(&self) -> CheckKind {
        self.signature.kind()
    }
}
