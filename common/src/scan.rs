//! # Scan Model
//!
//! Types that flow through a scan: where a [`Candidate`] came from, which
//! check verifies it, and the [`Verdict`] that gets cached and reported.

mod candidate;
mod outcome;
mod verdict;

pub use candidate::{Candidate, CheckKind, Signature};
pub use outcome::ProbeOutcome;
pub use verdict::{Origin, Verdict, VerdictEvent};
