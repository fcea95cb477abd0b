//! Repositories for global and custom scripts.
//!
//! The launcher resolves every node's executable in two bulk queries, one
//! per kind.

use crate::parse_id;
use miniflow_core::{CustomScriptId, ScriptId};
use miniflow_workflow::script::{CustomScript, Script};
use sqlx::{FromRow, PgConnection};

#[derive(FromRow)]
struct ScriptRow {
    id: String,
    name: String,
    file_path: String,
    input_schema: Option<serde_json::Value>,
    output_schema: Option<serde_json::Value>,
}

impl ScriptRow {
    fn try_into_record(self) -> Result<Script, sqlx::Error> {
        Ok(Script {
            id: parse_id("script id", &self.id)?,
            name: self.name,
            file_path: self.file_path,
            input_schema: self.input_schema,
            output_schema: self.output_schema,
        })
    }
}

#[derive(FromRow)]
struct CustomScriptRow {
    id: String,
    workspace_id: String,
    name: String,
    file_path: String,
    input_schema: Option<serde_json::Value>,
    output_schema: Option<serde_json::Value>,
}

impl CustomScriptRow {
    fn try_into_record(self) -> Result<CustomScript, sqlx::Error> {
        Ok(CustomScript {
            id: parse_id("custom script id", &self.id)?,
            workspace_id: parse_id("workspace id", &self.workspace_id)?,
            name: self.name,
            file_path: self.file_path,
            input_schema: self.input_schema,
            output_schema: self.output_schema,
        })
    }
}

/// Bulk-fetches global scripts by id.
pub async fn fetch_by_ids(
    conn: &mut PgConnection,
    ids: &[ScriptId],
    include_deleted: bool,
) -> Result<Vec<Script>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let filter = if include_deleted {
        ""
    } else {
        " AND deleted_at IS NULL"
    };
    let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
    let rows: Vec<ScriptRow> = sqlx::query_as(&format!(
        "SELECT id, name, file_path, input_schema, output_schema \
         FROM scripts WHERE id = ANY($1){filter}"
    ))
    .bind(&ids)
    .fetch_all(conn)
    .await?;

    rows.into_iter().map(ScriptRow::try_into_record).collect()
}

/// Bulk-fetches custom scripts by id.
pub async fn fetch_custom_by_ids(
    conn: &mut PgConnection,
    ids: &[CustomScriptId],
    include_deleted: bool,
) -> Result<Vec<CustomScript>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let filter = if include_deleted {
        ""
    } else {
        " AND deleted_at IS NULL"
    };
    let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
    let rows: Vec<CustomScriptRow> = sqlx::query_as(&format!(
        "SELECT id, workspace_id, name, file_path, input_schema, output_schema \
         FROM custom_scripts WHERE id = ANY($1){filter}"
    ))
    .bind(&ids)
    .fetch_all(conn)
    .await?;

    rows.into_iter()
        .map(CustomScriptRow::try_into_record)
        .collect()
}
