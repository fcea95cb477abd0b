//! Parameter resolution: grouping, per-kind resolvers, workspace guard.
//!
//! Parameters are separated by reference kind first, then each kind is
//! resolved in a block. A parameter value that is not a reference-shaped
//! string counts as a static and only passes through coercion.

use crate::coerce::{self, TypeAliases};
use crate::path;
use crate::reference::{Reference, ReferenceKind};
use crate::source::{ResolverSource, SecretCipher};
use miniflow_core::{ExecutionId, WorkspaceId};
use miniflow_workflow::error::EngineError;
use miniflow_workflow::param::ParamEntry;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// The execution a resolution runs for. The workspace id is the boundary
/// the cross-workspace guard enforces.
#[derive(Debug, Clone, Copy)]
pub struct ResolutionScope {
    /// The execution whose trigger data and node outputs are visible.
    pub execution_id: ExecutionId,
    /// The workspace whose resources are visible.
    pub workspace_id: WorkspaceId,
}

/// A parameter queued for resolution.
#[derive(Debug, Clone)]
struct PendingParam {
    name: String,
    type_alias: String,
    value: PendingValue,
}

/// What a parameter resolves from: a literal carried as-is, or a parsed
/// reference.
#[derive(Debug, Clone)]
enum PendingValue {
    Literal(JsonValue),
    Reference(Reference),
}

impl PendingParam {
    fn kind(&self) -> ReferenceKind {
        match &self.value {
            PendingValue::Literal(_) => ReferenceKind::Static,
            PendingValue::Reference(reference) => reference.kind,
        }
    }
}

/// Resolves a node's parameters into the flat map the worker engine
/// receives.
pub struct ParameterResolver {
    aliases: TypeAliases,
}

impl ParameterResolver {
    /// Creates a resolver with the given type-alias configuration.
    #[must_use]
    pub fn new(aliases: TypeAliases) -> Self {
        Self { aliases }
    }

    /// Resolves and coerces every parameter.
    ///
    /// # Errors
    ///
    /// Fails on the first unresolvable parameter: unknown reference kind,
    /// bad path, missing record, cross-workspace reference or coercion
    /// failure. A failure aborts the whole node (the work-item stays queued
    /// and is retried later), so there is no partial result to return.
    pub async fn resolve_params(
        &self,
        source: &dyn ResolverSource,
        cipher: &dyn SecretCipher,
        scope: &ResolutionScope,
        params: &BTreeMap<String, ParamEntry>,
    ) -> Result<BTreeMap<String, JsonValue>, EngineError> {
        let groups = group_params(params)?;
        let mut resolved = BTreeMap::new();

        for kind in ReferenceKind::ALL {
            for pending in groups.get(&kind).map_or(&[][..], Vec::as_slice) {
                let value = self
                    .resolve_one(source, cipher, scope, pending)
                    .await?;
                resolved.insert(pending.name.clone(), value);
            }
        }

        Ok(resolved)
    }

    async fn resolve_one(
        &self,
        source: &dyn ResolverSource,
        cipher: &dyn SecretCipher,
        scope: &ResolutionScope,
        pending: &PendingParam,
    ) -> Result<JsonValue, EngineError> {
        let target = self.aliases.resolve(&pending.name, &pending.type_alias)?;
        let raw = match &pending.value {
            PendingValue::Literal(literal) => literal.clone(),
            PendingValue::Reference(reference) => match reference.kind {
                ReferenceKind::Static => JsonValue::String(
                    reference.target.clone().unwrap_or_default(),
                ),
                ReferenceKind::Trigger => {
                    self.trigger_value(source, scope, reference, &pending.name).await?
                }
                ReferenceKind::Node => {
                    self.node_value(source, scope, reference, &pending.name).await?
                }
                ReferenceKind::Value => {
                    self.variable_value(source, cipher, scope, reference, &pending.name)
                        .await?
                }
                ReferenceKind::Credential => {
                    self.credential_value(source, cipher, scope, reference, &pending.name)
                        .await?
                }
                ReferenceKind::Database => {
                    self.database_value(source, cipher, scope, reference, &pending.name)
                        .await?
                }
                ReferenceKind::File => {
                    self.file_value(source, scope, reference, &pending.name).await?
                }
            },
        };

        coerce::coerce_value(&pending.name, &raw, target)
    }

    async fn trigger_value(
        &self,
        source: &dyn ResolverSource,
        scope: &ResolutionScope,
        reference: &Reference,
        _param_name: &str,
    ) -> Result<JsonValue, EngineError> {
        let trigger_data = source.trigger_data(scope.execution_id).await?;
        extract(&trigger_data, reference)
    }

    async fn node_value(
        &self,
        source: &dyn ResolverSource,
        scope: &ResolutionScope,
        reference: &Reference,
        param_name: &str,
    ) -> Result<JsonValue, EngineError> {
        let node_id = reference
            .target
            .as_deref()
            .ok_or_else(|| {
                EngineError::invalid_input(param_name, "node reference requires a node id")
            })?
            .parse()
            .map_err(|e| {
                EngineError::invalid_input(param_name, format!("bad node reference: {e}"))
            })?;

        let result_data = source
            .node_result_data(scope.execution_id, node_id)
            .await?;
        extract(&result_data, reference)
    }

    async fn variable_value(
        &self,
        source: &dyn ResolverSource,
        cipher: &dyn SecretCipher,
        scope: &ResolutionScope,
        reference: &Reference,
        param_name: &str,
    ) -> Result<JsonValue, EngineError> {
        let id = parse_target(reference, param_name, "variable")?;
        let variable = source.variable(id).await?;

        if variable.workspace_id != scope.workspace_id {
            return Err(cross_workspace(param_name, "variable", &variable.id, scope));
        }

        let value = if variable.is_secret {
            cipher
                .decrypt(&variable.value)
                .map_err(|e| EngineError::invalid_input(param_name, e.to_string()))?
        } else {
            variable.value
        };

        Ok(JsonValue::String(value))
    }

    async fn credential_value(
        &self,
        source: &dyn ResolverSource,
        cipher: &dyn SecretCipher,
        scope: &ResolutionScope,
        reference: &Reference,
        param_name: &str,
    ) -> Result<JsonValue, EngineError> {
        let id = parse_target(reference, param_name, "credential")?;
        let credential = source.credential(id).await?;

        if credential.workspace_id != scope.workspace_id {
            return Err(cross_workspace(
                param_name,
                "credential",
                &credential.id,
                scope,
            ));
        }

        let plaintext = cipher
            .decrypt(&credential.credential_data)
            .map_err(|e| EngineError::invalid_input(param_name, e.to_string()))?;
        let payload: JsonValue = serde_json::from_str(&plaintext).map_err(|e| {
            EngineError::invalid_input(
                param_name,
                format!("credential payload is not valid JSON: {e}"),
            )
        })?;

        extract(&payload, reference)
    }

    async fn database_value(
        &self,
        source: &dyn ResolverSource,
        cipher: &dyn SecretCipher,
        scope: &ResolutionScope,
        reference: &Reference,
        param_name: &str,
    ) -> Result<JsonValue, EngineError> {
        let id = parse_target(reference, param_name, "database")?;
        let database = source.database_connection(id).await?;

        if database.workspace_id != scope.workspace_id {
            return Err(cross_workspace(param_name, "database", &database.id, scope));
        }

        // A stale key must not make the whole record unreadable: fall back
        // to the stored ciphertext and let the caller notice.
        let password = match &database.password {
            Some(ciphertext) => Some(match cipher.decrypt(ciphertext) {
                Ok(plaintext) => plaintext,
                Err(e) => {
                    tracing::warn!(
                        database_id = %database.id,
                        workspace_id = %scope.workspace_id,
                        error = %e,
                        "failed to decrypt database password, continuing with stored value"
                    );
                    ciphertext.clone()
                }
            }),
            None => None,
        };

        let record = serde_json::json!({
            "host": database.host,
            "port": database.port,
            "username": database.username,
            "password": password,
            "database_name": database.database_name,
            "connection_string": database.connection_string,
            "ssl_enabled": database.ssl_enabled,
            "additional_params": database.additional_params,
        });

        extract(&record, reference)
    }

    async fn file_value(
        &self,
        source: &dyn ResolverSource,
        scope: &ResolutionScope,
        reference: &Reference,
        param_name: &str,
    ) -> Result<JsonValue, EngineError> {
        let id = parse_target(reference, param_name, "file")?;
        let file = source.file(id).await?;

        if file.workspace_id != scope.workspace_id {
            return Err(cross_workspace(param_name, "file", &file.id, scope));
        }

        if reference.path.as_deref() == Some("content") {
            let content = source.file_content(&file).await?;
            return Ok(JsonValue::String(content));
        }

        let metadata = serde_json::json!({
            "name": file.name,
            "original_filename": file.original_filename,
            "file_size": file.file_size,
            "mime_type": file.mime_type,
            "file_extension": file.file_extension,
            "description": file.description,
            "tags": file.tags,
            "file_metadata": file.file_metadata,
        });

        extract(&metadata, reference)
    }
}

/// Walks a reference's path into fetched data.
fn extract(context: &JsonValue, reference: &Reference) -> Result<JsonValue, EngineError> {
    let segments = match reference.path.as_deref() {
        Some(path) => path::split_path(path)?,
        None => Vec::new(),
    };
    path::lookup(&segments, context).cloned()
}

fn parse_target<T>(reference: &Reference, param_name: &str, kind: &str) -> Result<T, EngineError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    reference
        .target
        .as_deref()
        .ok_or_else(|| {
            EngineError::invalid_input(param_name, format!("{kind} reference requires an id"))
        })?
        .parse()
        .map_err(|e| EngineError::invalid_input(param_name, format!("bad {kind} reference: {e}")))
}

fn cross_workspace(
    param_name: &str,
    kind: &str,
    id: &impl std::fmt::Display,
    scope: &ResolutionScope,
) -> EngineError {
    EngineError::invalid_input(
        param_name,
        format!(
            "{kind} '{id}' does not belong to workspace '{}'",
            scope.workspace_id
        ),
    )
}

/// Separates parameters by reference kind.
///
/// String values with the reference shape are parsed; everything else
/// (including non-string literals) lands in the static group.
fn group_params(
    params: &BTreeMap<String, ParamEntry>,
) -> Result<BTreeMap<ReferenceKind, Vec<PendingParam>>, EngineError> {
    let mut groups: BTreeMap<ReferenceKind, Vec<PendingParam>> = BTreeMap::new();

    for (name, entry) in params {
        let value = match &entry.value {
            JsonValue::String(text) if Reference::is_reference(text) => PendingValue::Reference(
                Reference::parse(text)
                    .map_err(|e| EngineError::invalid_input(name.clone(), e.to_string()))?,
            ),
            literal => PendingValue::Literal(literal.clone()),
        };
        let pending = PendingParam {
            name: name.clone(),
            type_alias: entry.param_type.clone(),
            value,
        };
        groups.entry(pending.kind()).or_default().push(pending);
    }

    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use miniflow_core::{CredentialId, DatabaseConnectionId, FileId, NodeId, VariableId};
    use miniflow_workflow::resource::{Credential, DatabaseConnection, StoredFile, Variable};
    use serde_json::json;
    use std::collections::HashMap;
    use std::io::Write;

    /// Cipher that strips an `enc:` prefix.
    struct PrefixCipher;

    impl SecretCipher for PrefixCipher {
        fn decrypt(&self, ciphertext: &str) -> Result<String, crate::source::CipherError> {
            ciphertext
                .strip_prefix("enc:")
                .map(ToString::to_string)
                .ok_or_else(|| crate::source::CipherError {
                    message: "missing enc: prefix".to_string(),
                })
        }
    }

    #[derive(Default)]
    struct InMemorySource {
        trigger_data: JsonValue,
        node_outputs: HashMap<NodeId, JsonValue>,
        variables: HashMap<VariableId, Variable>,
        credentials: HashMap<CredentialId, Credential>,
        databases: HashMap<DatabaseConnectionId, DatabaseConnection>,
        files: HashMap<FileId, StoredFile>,
    }

    #[async_trait]
    impl ResolverSource for InMemorySource {
        async fn trigger_data(&self, _execution_id: ExecutionId) -> Result<JsonValue, EngineError> {
            Ok(self.trigger_data.clone())
        }

        async fn node_result_data(
            &self,
            _execution_id: ExecutionId,
            node_id: NodeId,
        ) -> Result<JsonValue, EngineError> {
            self.node_outputs
                .get(&node_id)
                .cloned()
                .ok_or_else(|| EngineError::not_found("execution_output", node_id))
        }

        async fn variable(&self, id: VariableId) -> Result<Variable, EngineError> {
            self.variables
                .get(&id)
                .cloned()
                .ok_or_else(|| EngineError::not_found("variable", id))
        }

        async fn credential(&self, id: CredentialId) -> Result<Credential, EngineError> {
            self.credentials
                .get(&id)
                .cloned()
                .ok_or_else(|| EngineError::not_found("credential", id))
        }

        async fn database_connection(
            &self,
            id: DatabaseConnectionId,
        ) -> Result<DatabaseConnection, EngineError> {
            self.databases
                .get(&id)
                .cloned()
                .ok_or_else(|| EngineError::not_found("database", id))
        }

        async fn file(&self, id: FileId) -> Result<StoredFile, EngineError> {
            self.files
                .get(&id)
                .cloned()
                .ok_or_else(|| EngineError::not_found("file", id))
        }

        async fn file_content(&self, file: &StoredFile) -> Result<String, EngineError> {
            std::fs::read_to_string(&file.file_path)
                .map_err(|e| EngineError::invalid(format!("read failed: {e}")))
        }
    }

    fn scope() -> ResolutionScope {
        ResolutionScope {
            execution_id: ExecutionId::new(),
            workspace_id: WorkspaceId::new(),
        }
    }

    fn entry(param_type: &str, value: JsonValue) -> ParamEntry {
        ParamEntry {
            param_type: param_type.to_string(),
            value,
        }
    }

    fn resolver() -> ParameterResolver {
        ParameterResolver::new(TypeAliases::default())
    }

    #[tokio::test]
    async fn resolves_trigger_reference_with_coercion() {
        let source = InMemorySource {
            trigger_data: json!({"count": "7"}),
            ..Default::default()
        };
        let mut params = BTreeMap::new();
        params.insert(
            "n".to_string(),
            entry("int", json!("${trigger:count}")),
        );

        let resolved = resolver()
            .resolve_params(&source, &PrefixCipher, &scope(), &params)
            .await
            .expect("should resolve");
        assert_eq!(resolved["n"], json!(7));
    }

    #[tokio::test]
    async fn resolves_node_reference_path() {
        let node_id = NodeId::new();
        let mut node_outputs = HashMap::new();
        node_outputs.insert(node_id, json!({"k": "hello"}));
        let source = InMemorySource {
            node_outputs,
            ..Default::default()
        };

        let mut params = BTreeMap::new();
        params.insert(
            "p".to_string(),
            entry("str", json!(format!("${{node:{node_id}.k}}"))),
        );

        let resolved = resolver()
            .resolve_params(&source, &PrefixCipher, &scope(), &params)
            .await
            .expect("should resolve");
        assert_eq!(resolved["p"], json!("hello"));
    }

    #[tokio::test]
    async fn static_reference_coerces_to_bool() {
        let source = InMemorySource::default();
        let mut params = BTreeMap::new();
        params.insert(
            "flag".to_string(),
            entry("bool", json!("${static:YES}")),
        );

        let resolved = resolver()
            .resolve_params(&source, &PrefixCipher, &scope(), &params)
            .await
            .expect("should resolve");
        assert_eq!(resolved["flag"], json!(true));
    }

    #[tokio::test]
    async fn plain_literals_pass_through_coercion() {
        let source = InMemorySource::default();
        let mut params = BTreeMap::new();
        params.insert("a".to_string(), entry("string", json!("Hello")));
        params.insert("b".to_string(), entry("int", json!(5)));
        params.insert("c".to_string(), entry("list", json!("[1, 2]")));

        let resolved = resolver()
            .resolve_params(&source, &PrefixCipher, &scope(), &params)
            .await
            .expect("should resolve");
        assert_eq!(resolved["a"], json!("Hello"));
        assert_eq!(resolved["b"], json!(5));
        assert_eq!(resolved["c"], json!([1, 2]));
    }

    #[tokio::test]
    async fn secret_variable_is_decrypted() {
        let test_scope = scope();
        let variable_id = VariableId::new();
        let mut variables = HashMap::new();
        variables.insert(
            variable_id,
            Variable {
                id: variable_id,
                workspace_id: test_scope.workspace_id,
                value: "enc:s3cret".to_string(),
                is_secret: true,
            },
        );
        let source = InMemorySource {
            variables,
            ..Default::default()
        };

        let mut params = BTreeMap::new();
        params.insert(
            "v".to_string(),
            entry("str", json!(format!("${{value:{variable_id}}}"))),
        );

        let resolved = resolver()
            .resolve_params(&source, &PrefixCipher, &test_scope, &params)
            .await
            .expect("should resolve");
        assert_eq!(resolved["v"], json!("s3cret"));
    }

    #[tokio::test]
    async fn credential_path_into_decrypted_payload() {
        let test_scope = scope();
        let credential_id = CredentialId::new();
        let mut credentials = HashMap::new();
        credentials.insert(
            credential_id,
            Credential {
                id: credential_id,
                workspace_id: test_scope.workspace_id,
                credential_data: "enc:{\"api_key\": \"sk-123\"}".to_string(),
            },
        );
        let source = InMemorySource {
            credentials,
            ..Default::default()
        };

        let mut params = BTreeMap::new();
        params.insert(
            "key".to_string(),
            entry("str", json!(format!("${{credential:{credential_id}.api_key}}"))),
        );

        let resolved = resolver()
            .resolve_params(&source, &PrefixCipher, &test_scope, &params)
            .await
            .expect("should resolve");
        assert_eq!(resolved["key"], json!("sk-123"));
    }

    #[tokio::test]
    async fn cross_workspace_credential_is_rejected() {
        let test_scope = scope();
        let credential_id = CredentialId::new();
        let mut credentials = HashMap::new();
        credentials.insert(
            credential_id,
            Credential {
                id: credential_id,
                workspace_id: WorkspaceId::new(), // a different workspace
                credential_data: "enc:{}".to_string(),
            },
        );
        let source = InMemorySource {
            credentials,
            ..Default::default()
        };

        let mut params = BTreeMap::new();
        params.insert(
            "key".to_string(),
            entry("str", json!(format!("${{credential:{credential_id}.api_key}}"))),
        );

        let err = resolver()
            .resolve_params(&source, &PrefixCipher, &test_scope, &params)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput { .. }));
        assert!(err.to_string().contains("does not belong to workspace"));
    }

    #[tokio::test]
    async fn database_record_synthesis_and_password_fallback() {
        let test_scope = scope();
        let database_id = DatabaseConnectionId::new();
        let mut databases = HashMap::new();
        databases.insert(
            database_id,
            DatabaseConnection {
                id: database_id,
                workspace_id: test_scope.workspace_id,
                host: Some("db.example.com".to_string()),
                port: Some(5432),
                username: Some("admin".to_string()),
                // Not decryptable by PrefixCipher; resolution degrades to
                // the stored value instead of failing.
                password: Some("opaque-ciphertext".to_string()),
                database_name: Some("mydb".to_string()),
                connection_string: None,
                ssl_enabled: true,
                additional_params: None,
            },
        );
        let source = InMemorySource {
            databases,
            ..Default::default()
        };

        let mut params = BTreeMap::new();
        params.insert(
            "host".to_string(),
            entry("str", json!(format!("${{database:{database_id}.host}}"))),
        );
        params.insert(
            "pw".to_string(),
            entry("str", json!(format!("${{database:{database_id}.password}}"))),
        );

        let resolved = resolver()
            .resolve_params(&source, &PrefixCipher, &test_scope, &params)
            .await
            .expect("should resolve");
        assert_eq!(resolved["host"], json!("db.example.com"));
        assert_eq!(resolved["pw"], json!("opaque-ciphertext"));
    }

    #[tokio::test]
    async fn file_content_and_metadata() {
        let test_scope = scope();
        let mut tmp = tempfile::NamedTempFile::new().expect("temp file");
        write!(tmp, "File content here").expect("write");

        let file_id = FileId::new();
        let mut files = HashMap::new();
        files.insert(
            file_id,
            StoredFile {
                id: file_id,
                workspace_id: test_scope.workspace_id,
                name: "data.txt".to_string(),
                original_filename: Some("upload.txt".to_string()),
                file_path: tmp.path().to_string_lossy().into_owned(),
                file_size: Some(17),
                mime_type: Some("text/plain".to_string()),
                file_extension: Some("txt".to_string()),
                description: None,
                tags: None,
                file_metadata: None,
            },
        );
        let source = InMemorySource {
            files,
            ..Default::default()
        };

        let mut params = BTreeMap::new();
        params.insert(
            "content".to_string(),
            entry("str", json!(format!("${{file:{file_id}.content}}"))),
        );
        params.insert(
            "mime".to_string(),
            entry("str", json!(format!("${{file:{file_id}.mime_type}}"))),
        );

        let resolved = resolver()
            .resolve_params(&source, &PrefixCipher, &test_scope, &params)
            .await
            .expect("should resolve");
        assert_eq!(resolved["content"], json!("File content here"));
        assert_eq!(resolved["mime"], json!("text/plain"));
    }

    #[tokio::test]
    async fn missing_node_output_is_not_found() {
        let source = InMemorySource::default();
        let node_id = NodeId::new();
        let mut params = BTreeMap::new();
        params.insert(
            "p".to_string(),
            entry("str", json!(format!("${{node:{node_id}.k}}"))),
        );

        let err = resolver()
            .resolve_params(&source, &PrefixCipher, &scope(), &params)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ResourceNotFound { .. }));
    }

    #[tokio::test]
    async fn bad_path_names_the_problem() {
        let source = InMemorySource {
            trigger_data: json!({"items": [1]}),
            ..Default::default()
        };
        let mut params = BTreeMap::new();
        params.insert(
            "p".to_string(),
            entry("int", json!("${trigger:items[3]}")),
        );

        let err = resolver()
            .resolve_params(&source, &PrefixCipher, &scope(), &params)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }
}
