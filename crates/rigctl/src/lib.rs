//! rigctl - Development environment provisioning for rig.
//!
//! Turns a domain description into an ordered, recoverable set of tool
//! installations backed by the rig_common knowledge store.

pub mod engine;
pub mod oracle;
pub mod ui;

pub use engine::report::{RunReport, ToolOutcome, ToolReport};
pub use engine::ResolutionEngine;
pub use oracle::{
    CommandCandidate, OfflineOracle, OracleContext, RecommendationOracle, ScriptedOracle,
    StackProposal, ToolCandidate,
};
