//! BaluDesk Conflict - change classification and resolution policy
//!
//! Provides:
//! - The three-way classifier that merges a local diff and a remote diff
//!   against the baseline into planned actions and conflicts
//! - Policy application for automatic conflict resolution
//! - Conflict-copy naming for keep-both resolutions
//!
//! Everything in this crate is pure: no I/O, no clocks, no stores. The
//! engine in `baludesk-sync` feeds it facts and acts on its verdicts,
//! which keeps the decision table exhaustively unit-testable.

pub mod classifier;
pub mod namer;
pub mod policy;

pub use classifier::{classify, LocalSide, PathFacts, RemoteSide, Verdict};
pub use namer::ConflictNamer;
pub use policy::{apply_policy, PolicyDecision};
