//! Repositories for the workspace resources the resolver reads:
//! variables, credentials, database connections and stored files.

use crate::parse_id;
use miniflow_core::{CredentialId, DatabaseConnectionId, FileId, VariableId};
use miniflow_workflow::resource::{Credential, DatabaseConnection, StoredFile, Variable};
use sqlx::{FromRow, PgConnection};

#[derive(FromRow)]
struct VariableRow {
    id: String,
    workspace_id: String,
    value: String,
    is_secret: bool,
}

/// Fetches a workspace variable by id.
pub async fn fetch_variable(
    conn: &mut PgConnection,
    id: VariableId,
) -> Result<Option<Variable>, sqlx::Error> {
    let row: Option<VariableRow> = sqlx::query_as(
        "SELECT id, workspace_id, value, is_secret \
         FROM variables WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(id.to_string())
    .fetch_optional(conn)
    .await?;

    row.map(|r| {
        Ok(Variable {
            id: parse_id("variable id", &r.id)?,
            workspace_id: parse_id("workspace id", &r.workspace_id)?,
            value: r.value,
            is_secret: r.is_secret,
        })
    })
    .transpose()
}

#[derive(FromRow)]
struct CredentialRow {
    id: String,
    workspace_id: String,
    credential_data: String,
}

/// Fetches a credential by id.
pub async fn fetch_credential(
    conn: &mut PgConnection,
    id: CredentialId,
) -> Result<Option<Credential>, sqlx::Error> {
    let row: Option<CredentialRow> = sqlx::query_as(
        "SELECT id, workspace_id, credential_data \
         FROM credentials WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(id.to_string())
    .fetch_optional(conn)
    .await?;

    row.map(|r| {
        Ok(Credential {
            id: parse_id("credential id", &r.id)?,
            workspace_id: parse_id("workspace id", &r.workspace_id)?,
            credential_data: r.credential_data,
        })
    })
    .transpose()
}

#[derive(FromRow)]
struct DatabaseConnectionRow {
    id: String,
    workspace_id: String,
    host: Option<String>,
    port: Option<i32>,
    username: Option<String>,
    password: Option<String>,
    database_name: Option<String>,
    connection_string: Option<String>,
    ssl_enabled: bool,
    additional_params: Option<serde_json::Value>,
}

/// Fetches a stored database connection by id.
pub async fn fetch_database_connection(
    conn: &mut PgConnection,
    id: DatabaseConnectionId,
) -> Result<Option<DatabaseConnection>, sqlx::Error> {
    let row: Option<DatabaseConnectionRow> = sqlx::query_as(
        "SELECT id, workspace_id, host, port, username, password, database_name, \
                connection_string, ssl_enabled, additional_params \
         FROM database_connections WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(id.to_string())
    .fetch_optional(conn)
    .await?;

    row.map(|r| {
        Ok(DatabaseConnection {
            id: parse_id("database connection id", &r.id)?,
            workspace_id: parse_id("workspace id", &r.workspace_id)?,
            host: r.host,
            port: r.port,
            username: r.username,
            password: r.password,
            database_name: r.database_name,
            connection_string: r.connection_string,
            ssl_enabled: r.ssl_enabled,
            additional_params: r.additional_params,
        })
    })
    .transpose()
}

#[derive(FromRow)]
struct StoredFileRow {
    id: String,
    workspace_id: String,
    name: String,
    original_filename: Option<String>,
    file_path: String,
    file_size: Option<i64>,
    mime_type: Option<String>,
    file_extension: Option<String>,
    description: Option<String>,
    tags: Option<serde_json::Value>,
    file_metadata: Option<serde_json::Value>,
}

/// Fetches a stored file record by id.
pub async fn fetch_file(
    conn: &mut PgConnection,
    id: FileId,
) -> Result<Option<StoredFile>, sqlx::Error> {
    let row: Option<StoredFileRow> = sqlx::query_as(
        "SELECT id, workspace_id, name, original_filename, file_path, file_size, \
                mime_type, file_extension, description, tags, file_metadata \
         FROM files WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(id.to_string())
    .fetch_optional(conn)
    .await?;

    row.map(|r| {
        Ok(StoredFile {
            id: parse_id("file id", &r.id)?,
            workspace_id: parse_id("workspace id", &r.workspace_id)?,
            name: r.name,
            original_filename: r.original_filename,
            file_path: r.file_path,
            file_size: r.file_size,
            mime_type: r.mime_type,
            file_extension: r.file_extension,
            description: r.description,
            tags: r.tags,
            file_metadata: r.file_metadata,
        })
    })
    .transpose()
}
