//! Repository for triggers.

use crate::{decode_err, parse_id};
use miniflow_core::TriggerId;
use miniflow_workflow::trigger::{Trigger, TriggerField};
use sqlx::{FromRow, PgConnection};
use std::collections::BTreeMap;

#[derive(FromRow)]
struct TriggerRow {
    id: String,
    workflow_id: String,
    workspace_id: String,
    input_mapping: serde_json::Value,
}

impl TriggerRow {
    fn try_into_record(self) -> Result<Trigger, sqlx::Error> {
        let input_mapping: BTreeMap<String, TriggerField> =
            serde_json::from_value(self.input_mapping).map_err(|e| {
                decode_err(format!("trigger {}: invalid input_mapping: {e}", self.id))
            })?;

        Ok(Trigger {
            id: parse_id("trigger id", &self.id)?,
            workflow_id: parse_id("workflow id", &self.workflow_id)?,
            workspace_id: parse_id("workspace id", &self.workspace_id)?,
            input_mapping,
        })
    }
}

/// Fetches a trigger by id.
pub async fn fetch_by_id(
    conn: &mut PgConnection,
    id: TriggerId,
    include_deleted: bool,
) -> Result<Option<Trigger>, sqlx::Error> {
    let filter = if include_deleted {
        ""
    } else {
        " AND deleted_at IS NULL"
    };
    let row: Option<TriggerRow> = sqlx::query_as(&format!(
        "SELECT id, workflow_id, workspace_id, input_mapping \
         FROM triggers WHERE id = $1{filter}"
    ))
    .bind(id.to_string())
    .fetch_optional(conn)
    .await?;

    row.map(TriggerRow::try_into_record).transpose()
}
