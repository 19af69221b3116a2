use std::net::IpAddr;

use serde::Serialize;

use super::CheckKind;

/// Boolean exposure determination for one host under one check kind.
///
/// There is no persisted "unknown" state: probe errors fold into `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub address: IpAddr,
    pub kind: CheckKind,
    pub is_exposed: bool,
    /// Unix epoch seconds of the live probe that produced this verdict.
    pub last_checked: i64,
}

/// Where a reported verdict came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Cached,
    Probed,
}

/// Emitted once per candidate when it reaches the reported state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerdictEvent {
    #[serde(flatten)]
    pub verdict: Verdict,
    pub origin: Origin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
