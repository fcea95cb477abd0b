//! Core domain types for the miniflow execution engine.
//!
//! This crate provides the strongly-typed identifiers shared by every other
//! crate in the workspace. Each entity gets its own newtype so an execution
//! id can never be handed to a function expecting a node id.

pub mod id;

pub use id::{
    CredentialId, CustomScriptId, DatabaseConnectionId, EdgeId, ExecutionId, ExecutionInputId,
    ExecutionOutputId, FileId, NodeId, ParseIdError, ScriptId, TriggerId, VariableId, WorkflowId,
    WorkspaceId,
};
