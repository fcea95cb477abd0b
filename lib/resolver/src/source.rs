//! Effectful seams of the resolver: record fetches, decryption, file reads.
//!
//! [`ResolverSource`] abstracts every fetch the resolver performs, so
//! resolution logic can be tested against an in-memory implementation.
//! [`PgResolverSource`] is the production implementation over the store.

use async_trait::async_trait;
use miniflow_core::{CredentialId, DatabaseConnectionId, ExecutionId, FileId, NodeId, VariableId};
use miniflow_store::{execution_outputs, executions, resources};
use miniflow_workflow::error::EngineError;
use miniflow_workflow::resource::{Credential, DatabaseConnection, StoredFile, Variable};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use std::fmt;

/// Decrypts stored secrets. The encryption primitives themselves live
/// outside the engine; the resolver only consumes this seam.
pub trait SecretCipher: Send + Sync {
    /// Decrypts a ciphertext produced by the platform's encryption helper.
    ///
    /// # Errors
    ///
    /// Returns an error when the ciphertext is malformed or the key does
    /// not match.
    fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError>;
}

/// Error from a [`SecretCipher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherError {
    /// Why decryption failed.
    pub message: String,
}

impl fmt::Display for CipherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "decryption failed: {}", self.message)
    }
}

impl std::error::Error for CipherError {}

/// Cipher that stores values in the clear.
///
/// Stand-in for the platform's encryption helper (an external
/// collaborator) in local development and tests.
pub struct PassthroughCipher;

impl SecretCipher for PassthroughCipher {
    fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
        Ok(ciphertext.to_string())
    }
}

/// The record fetches the resolver performs.
#[async_trait]
pub trait ResolverSource: Send + Sync {
    /// Returns the trigger payload of an execution.
    async fn trigger_data(&self, execution_id: ExecutionId) -> Result<JsonValue, EngineError>;

    /// Returns the stored output of a node within an execution.
    async fn node_result_data(
        &self,
        execution_id: ExecutionId,
        node_id: NodeId,
    ) -> Result<JsonValue, EngineError>;

    /// Returns a workspace variable.
    async fn variable(&self, id: VariableId) -> Result<Variable, EngineError>;

    /// Returns a credential record (payload still encrypted).
    async fn credential(&self, id: CredentialId) -> Result<Credential, EngineError>;

    /// Returns a stored database connection (password still encrypted).
    async fn database_connection(
        &self,
        id: DatabaseConnectionId,
    ) -> Result<DatabaseConnection, EngineError>;

    /// Returns a stored file record.
    async fn file(&self, id: FileId) -> Result<StoredFile, EngineError>;

    /// Reads a stored file's content as UTF-8 text.
    async fn file_content(&self, file: &StoredFile) -> Result<String, EngineError>;
}

/// Production [`ResolverSource`] backed by the PostgreSQL store.
///
/// Every fetch runs on its own pooled connection; the resolver never holds
/// a transaction open across resolution.
pub struct PgResolverSource {
    pool: PgPool,
}

impl PgResolverSource {
    /// Creates a source over a connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn connection(&self) -> Result<sqlx::pool::PoolConnection<sqlx::Postgres>, EngineError> {
        self.pool.acquire().await.map_err(EngineError::database)
    }
}

#[async_trait]
impl ResolverSource for PgResolverSource {
    async fn trigger_data(&self, execution_id: ExecutionId) -> Result<JsonValue, EngineError> {
        let mut conn = self.connection().await?;
        let execution = executions::fetch_by_id(&mut conn, execution_id)
            .await
            .map_err(EngineError::database)?
            .ok_or_else(|| EngineError::not_found("execution", execution_id))?;
        Ok(execution.trigger_data)
    }

    async fn node_result_data(
        &self,
        execution_id: ExecutionId,
        node_id: NodeId,
    ) -> Result<JsonValue, EngineError> {
        let mut conn = self.connection().await?;
        let output = execution_outputs::fetch_by_execution_and_node(&mut conn, execution_id, node_id)
            .await
            .map_err(EngineError::database)?
            .ok_or_else(|| EngineError::not_found("execution_output", node_id))?;
        Ok(output.result_data)
    }

    async fn variable(&self, id: VariableId) -> Result<Variable, EngineError> {
        let mut conn = self.connection().await?;
        resources::fetch_variable(&mut conn, id)
            .await
            .map_err(EngineError::database)?
            .ok_or_else(|| EngineError::not_found("variable", id))
    }

    async fn credential(&self, id: CredentialId) -> Result<Credential, EngineError> {
        let mut conn = self.connection().await?;
        resources::fetch_credential(&mut conn, id)
            .await
            .map_err(EngineError::database)?
            .ok_or_else(|| EngineError::not_found("credential", id))
    }

    async fn database_connection(
        &self,
        id: DatabaseConnectionId,
    ) -> Result<DatabaseConnection, EngineError> {
        let mut conn = self.connection().await?;
        resources::fetch_database_connection(&mut conn, id)
            .await
            .map_err(EngineError::database)?
            .ok_or_else(|| EngineError::not_found("database", id))
    }

    async fn file(&self, id: FileId) -> Result<StoredFile, EngineError> {
        let mut conn = self.connection().await?;
        resources::fetch_file(&mut conn, id)
            .await
            .map_err(EngineError::database)?
            .ok_or_else(|| EngineError::not_found("file", id))
    }

    async fn file_content(&self, file: &StoredFile) -> Result<String, EngineError> {
        tracing::debug!(file_id = %file.id, path = %file.file_path, "reading file content");
        tokio::fs::read_to_string(&file.file_path)
            .await
            .map_err(|e| {
                EngineError::invalid(format!(
                    "failed to read file content of {}: {e}",
                    file.id
                ))
            })
    }
}
