//! # vprov – vSphere discovery core
//!
//! Connection-format negotiation and inventory discovery against vCenter,
//! driven through the `govc` CLI with the vSphere REST API as a fallback
//! source for datastore-cluster membership.
//!
//! ## Modules
//!
//! - **types** — Shared data structures (connection details, candidates, inventory records)
//! - **error** — Crate-specific error types and stderr classification
//! - **executor** — `govc` process runner behind the [`executor::CommandRunner`] seam
//! - **candidates** — Ordered URL / username format candidates for one connection
//! - **probe** — Sequential first-success probe over the candidates
//! - **parser** — Line-oriented listing parser and batched `vm.info` template parser
//! - **derive** — Naming-convention heuristic grouping datastores into clusters
//! - **govc** — Inventory listings over one resolved `govc` environment
//! - **rest** — vSphere REST client with session auth and username-form probing
//! - **discovery** — Authoritative → detail → heuristic datastore-cluster chain

pub mod types;
pub mod error;
pub mod executor;
pub mod candidates;
pub mod probe;
pub mod parser;
pub mod derive;
pub mod govc;
pub mod rest;
pub mod discovery;

pub use error::{VsphereError, VsphereErrorKind, VsphereResult};
pub use types::*;
