//! Strongly-typed ID types for domain entities.
//!
//! All IDs wrap a ULID (Universally Unique Lexicographically Sortable
//! Identifier) and render with a typed prefix, e.g. `EXE-01J6…` for an
//! execution. The prefix makes identifiers self-describing in logs and
//! database rows while the ULID keeps them sortable by creation time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Error returned when parsing an ID from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

/// Macro to generate a strongly-typed ID wrapper around ULID.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Ulid);

        impl $name {
            /// Creates a new ID with a randomly generated ULID.
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            /// Creates an ID from a ULID.
            #[must_use]
            pub const fn from_ulid(ulid: Ulid) -> Self {
                Self(ulid)
            }

            /// Returns the underlying ULID.
            #[must_use]
            pub const fn as_ulid(&self) -> Ulid {
                self.0
            }

            /// Returns the prefix used for display formatting.
            #[must_use]
            pub const fn prefix() -> &'static str {
                $prefix
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                // Try with prefix first, then as a raw ULID.
                let prefix_with_dash = concat!($prefix, "-");
                let ulid_str = s.strip_prefix(prefix_with_dash).unwrap_or(s);

                Ulid::from_str(ulid_str)
                    .map(Self)
                    .map_err(|e| ParseIdError {
                        id_type: stringify!($name),
                        reason: e.to_string(),
                    })
            }
        }

        impl From<Ulid> for $name {
            fn from(ulid: Ulid) -> Self {
                Self(ulid)
            }
        }

        impl From<$name> for Ulid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        // IDs serialize as their prefixed string form so database rows and
        // queue payloads stay self-describing.
        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

define_id!(
    /// Unique identifier for a workspace (tenant boundary).
    WorkspaceId,
    "WSP"
);

define_id!(
    /// Unique identifier for a workflow definition.
    WorkflowId,
    "WFL"
);

define_id!(
    /// Unique identifier for a node within a workflow.
    NodeId,
    "NOD"
);

define_id!(
    /// Unique identifier for an edge within a workflow.
    EdgeId,
    "EDG"
);

define_id!(
    /// Unique identifier for a trigger.
    TriggerId,
    "TRG"
);

define_id!(
    /// Unique identifier for a single execution of a workflow.
    ExecutionId,
    "EXE"
);

define_id!(
    /// Unique identifier for a node's pending work-item within an execution.
    ExecutionInputId,
    "EXI"
);

define_id!(
    /// Unique identifier for a node's completed work-item within an execution.
    ExecutionOutputId,
    "EXO"
);

define_id!(
    /// Unique identifier for a global script.
    ScriptId,
    "SCR"
);

define_id!(
    /// Unique identifier for a workspace-scoped custom script.
    CustomScriptId,
    "CSC"
);

define_id!(
    /// Unique identifier for a workspace variable.
    VariableId,
    "ENV"
);

define_id!(
    /// Unique identifier for a stored credential.
    CredentialId,
    "CRD"
);

define_id!(
    /// Unique identifier for a stored database connection.
    DatabaseConnectionId,
    "DBS"
);

define_id!(
    /// Unique identifier for a stored file.
    FileId,
    "FLE"
);
