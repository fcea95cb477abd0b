//! Workspace resource records consumed by the reference resolver.
//!
//! All four kinds are workspace-scoped; the resolver enforces that a
//! reference never crosses the execution's workspace boundary.

use miniflow_core::{CredentialId, DatabaseConnectionId, FileId, VariableId, WorkspaceId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A workspace variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    /// Unique identifier.
    pub id: VariableId,
    /// Owning workspace.
    pub workspace_id: WorkspaceId,
    /// The stored value; ciphertext when `is_secret`.
    pub value: String,
    /// Whether the value is stored encrypted.
    pub is_secret: bool,
}

/// A stored credential. The payload is an encrypted JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    /// Unique identifier.
    pub id: CredentialId,
    /// Owning workspace.
    pub workspace_id: WorkspaceId,
    /// Encrypted JSON payload.
    pub credential_data: String,
}

/// A stored database connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConnection {
    /// Unique identifier.
    pub id: DatabaseConnectionId,
    /// Owning workspace.
    pub workspace_id: WorkspaceId,
    /// Host name.
    pub host: Option<String>,
    /// Port number.
    pub port: Option<i32>,
    /// User name.
    pub username: Option<String>,
    /// Encrypted password.
    pub password: Option<String>,
    /// Database name.
    pub database_name: Option<String>,
    /// Full connection string.
    pub connection_string: Option<String>,
    /// Whether TLS is required.
    pub ssl_enabled: bool,
    /// Driver-specific extras.
    pub additional_params: Option<JsonValue>,
}

/// A stored file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFile {
    /// Unique identifier.
    pub id: FileId,
    /// Owning workspace.
    pub workspace_id: WorkspaceId,
    /// Display name.
    pub name: String,
    /// Name the file was uploaded as.
    pub original_filename: Option<String>,
    /// Where the bytes live on disk.
    pub file_path: String,
    /// Size in bytes.
    pub file_size: Option<i64>,
    /// MIME type.
    pub mime_type: Option<String>,
    /// File extension.
    pub file_extension: Option<String>,
    /// Free-form description.
    pub description: Option<String>,
    /// Tags.
    pub tags: Option<JsonValue>,
    /// Additional metadata.
    pub file_metadata: Option<JsonValue>,
}
