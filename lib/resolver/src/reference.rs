//! The `${kind:body}` reference token.
//!
//! This module is the only place that touches the textual form. Everything
//! downstream works with the parsed [`Reference`].

use miniflow_workflow::error::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The seven reference kinds. The derived ordering is the resolution
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// A literal carried verbatim.
    Static,
    /// A path into the execution's trigger payload.
    Trigger,
    /// A path into an upstream node's output.
    Node,
    /// A workspace variable's whole value.
    Value,
    /// A path into a decrypted credential payload.
    Credential,
    /// A path into a synthesized database-connection record.
    Database,
    /// File content or a path into file metadata.
    File,
}

impl ReferenceKind {
    /// All kinds, in resolution order.
    pub const ALL: [ReferenceKind; 7] = [
        Self::Static,
        Self::Trigger,
        Self::Node,
        Self::Value,
        Self::Credential,
        Self::Database,
        Self::File,
    ];

    /// The textual form used inside reference tokens.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Trigger => "trigger",
            Self::Node => "node",
            Self::Value => "value",
            Self::Credential => "credential",
            Self::Database => "database",
            Self::File => "file",
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReferenceKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "static" => Ok(Self::Static),
            "trigger" => Ok(Self::Trigger),
            "node" => Ok(Self::Node),
            "value" => Ok(Self::Value),
            "credential" => Ok(Self::Credential),
            "database" => Ok(Self::Database),
            "file" => Ok(Self::File),
            other => Err(EngineError::invalid(format!(
                "invalid reference type '{other}'. Valid types: static, trigger, node, value, \
                 credential, database, file"
            ))),
        }
    }
}

/// A parsed reference token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Which source the reference points at.
    pub kind: ReferenceKind,
    /// The referenced id — or, for `static`, the literal itself. Absent for
    /// `trigger`.
    pub target: Option<String>,
    /// Dotted path into the referenced data. Absent for `static` and for
    /// whole-value references.
    pub path: Option<String>,
}

impl Reference {
    /// Returns true if the value has the `${kind:body}` shape.
    ///
    /// This is a cheap shape test, not a validation: an unknown kind still
    /// passes here and fails in [`Reference::parse`].
    #[must_use]
    pub fn is_reference(value: &str) -> bool {
        value.starts_with("${") && value.ends_with('}') && value.contains(':')
    }

    /// Parses a reference token.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` when the token is not reference-shaped or
    /// names an unknown kind.
    pub fn parse(token: &str) -> Result<Self, EngineError> {
        if !Self::is_reference(token) {
            return Err(EngineError::invalid(format!(
                "not a reference token: '{token}'"
            )));
        }

        let content = &token[2..token.len() - 1];
        let (kind, body) = content
            .split_once(':')
            .ok_or_else(|| EngineError::invalid(format!("not a reference token: '{token}'")))?;

        let kind: ReferenceKind = kind.trim().parse()?;
        let body = body.trim();

        let (target, path) = match kind {
            ReferenceKind::Static => (Some(body.to_string()), None),
            ReferenceKind::Trigger => (None, Some(body.to_string())),
            _ => match body.split_once('.') {
                Some((id, rest)) => (Some(id.to_string()), Some(rest.to_string())),
                None => (Some(body.to_string()), None),
            },
        };

        Ok(Self { kind, target, path })
    }

    /// Renders the token back to its textual form.
    #[must_use]
    pub fn render(&self) -> String {
        let body = match self.kind {
            ReferenceKind::Static => self.target.clone().unwrap_or_default(),
            ReferenceKind::Trigger => self.path.clone().unwrap_or_default(),
            _ => match (&self.target, &self.path) {
                (Some(target), Some(path)) => format!("{target}.{path}"),
                (Some(target), None) => target.clone(),
                (None, Some(path)) => path.clone(),
                (None, None) => String::new(),
            },
        };
        format!("${{{}:{}}}", self.kind, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_test() {
        assert!(Reference::is_reference("${trigger:n}"));
        assert!(Reference::is_reference("${node:NOD-1.result}"));
        assert!(!Reference::is_reference("plain value"));
        assert!(!Reference::is_reference("${no_colon}"));
        assert!(!Reference::is_reference("${trigger:n"));
        assert!(!Reference::is_reference("prefix ${trigger:n}"));
    }

    #[test]
    fn parses_static() {
        let parsed = Reference::parse("${static:Hello World}").expect("should parse");
        assert_eq!(parsed.kind, ReferenceKind::Static);
        assert_eq!(parsed.target.as_deref(), Some("Hello World"));
        assert_eq!(parsed.path, None);
    }

    #[test]
    fn parses_trigger_path() {
        let parsed = Reference::parse("${trigger:data.user_id}").expect("should parse");
        assert_eq!(parsed.kind, ReferenceKind::Trigger);
        assert_eq!(parsed.target, None);
        assert_eq!(parsed.path.as_deref(), Some("data.user_id"));
    }

    #[test]
    fn parses_node_with_path() {
        let parsed = Reference::parse("${node:NOD-123.result.timeout}").expect("should parse");
        assert_eq!(parsed.kind, ReferenceKind::Node);
        assert_eq!(parsed.target.as_deref(), Some("NOD-123"));
        assert_eq!(parsed.path.as_deref(), Some("result.timeout"));
    }

    #[test]
    fn parses_whole_value_reference() {
        let parsed = Reference::parse("${value:ENV-555}").expect("should parse");
        assert_eq!(parsed.kind, ReferenceKind::Value);
        assert_eq!(parsed.target.as_deref(), Some("ENV-555"));
        assert_eq!(parsed.path, None);
    }

    #[test]
    fn static_body_keeps_colons_and_dots() {
        let parsed = Reference::parse("${static:a.b:c}").expect("should parse");
        assert_eq!(parsed.target.as_deref(), Some("a.b:c"));
    }

    #[test]
    fn rejects_unknown_kind() {
        let err = Reference::parse("${secret:CRD-1}").unwrap_err();
        assert!(err.to_string().contains("invalid reference type"));
    }

    #[test]
    fn render_parse_round_trip() {
        for token in [
            "${static:Hello}",
            "${trigger:data.items[0].name}",
            "${node:NOD-1.result.data}",
            "${value:ENV-9}",
            "${credential:CRD-2.api_key}",
            "${database:DBS-3.host}",
            "${file:FLE-4.content}",
        ] {
            let parsed = Reference::parse(token).expect("should parse");
            let rendered = parsed.render();
            let reparsed = Reference::parse(&rendered).expect("should reparse");
            assert_eq!(parsed, reparsed, "round trip failed for {token}");
        }
    }
}
