//! Rig Common - Shared types, storage and execution for rig.
//!
//! The knowledge store, data model, configuration and command execution
//! layer used by rigctl. No orchestration logic lives here; the
//! resolution engine sits in the rigctl crate.

pub mod command_exec;
pub mod config;
pub mod error;
pub mod host;
pub mod knowledge;
pub mod types;

pub use command_exec::{CommandRunner, ExecutionStatus, Outcome, ScriptedRunner, ShellRunner};
pub use config::RigConfig;
pub use error::{Result, RigError};
pub use host::HostInfo;
pub use knowledge::KnowledgeStore;
pub use types::*;
