/// Result of one live probe attempt against a candidate.
///
/// Checks score these values instead of unwinding on failures, so a timeout
/// on one attempt never stops the remaining attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The attempt proved access. Carries protocol detail when there is some
    /// worth reporting (e.g. the agent's sysName).
    Success(Option<String>),
    /// The target answered or stayed silent without proving access.
    NonSuccess(String),
    /// The attempt could not be carried out (socket, codec).
    Error(String),
}
