//! Reference resolution for the miniflow execution engine.
//!
//! A node parameter value is either a literal or a reference token of the
//! form `${kind:body}` pointing at data elsewhere in the system: the
//! trigger payload, an upstream node's output, a workspace variable,
//! credential, database connection or stored file. This crate turns a
//! node's declared parameters into the fully resolved, type-coerced map the
//! worker engine receives.
//!
//! Resolution is pure given the referenced records; the effectful parts
//! (database fetches, decryption, file reads) sit behind the
//! [`ResolverSource`] and [`SecretCipher`] seams.

pub mod coerce;
pub mod path;
pub mod reference;
pub mod resolve;
pub mod source;

pub use coerce::{TargetType, TypeAliases, coerce_value};
pub use reference::{Reference, ReferenceKind};
pub use resolve::{ParameterResolver, ResolutionScope};
pub use source::{PassthroughCipher, PgResolverSource, ResolverSource, SecretCipher};
