//! RO-Crate Library
//!
//! This library creates, reads, mutates and serializes RO-Crate
//! packages: directory trees (optionally zipped) carrying a JSON-LD
//! metadata document (`ro-crate-metadata.json`) that describes a graph
//! of entities — files, directories, people, workflows, test suites —
//! alongside the actual bytes those entities reference.
//!
//! # Overview
//!
//! The center of the library is the entity graph and its JSON-LD
//! projection:
//!
//! 1. [`Entity`] is one node of the flattened `@graph`: an id, one or
//!    more types, and an ordered property map where references to other
//!    entities are stored as `{"@id": ...}` objects.
//! 2. [`RoCrate`] owns the graph: the root dataset and the metadata
//!    descriptor in dedicated slots, everything else in an
//!    insertion-ordered map keyed by canonical id. Canonical ids come
//!    from joining raw ids against a private per-graph base URI, so
//!    `"data"`, `"data/"` and `"./data/"` land on one key.
//! 3. Loading reverses the flattening: the metadata descriptor locates
//!    the root, the root's `hasPart` tree is walked depth-first to
//!    claim data entities, and the leftovers become contextual
//!    entities.
//! 4. Writing materializes the graph as a directory, a zip file, or a
//!    lazy zip byte stream, plus the regenerated metadata document.
//!
//! # Usage
//!
//! ## Build a crate from scratch
//!
//! ```ignore
//! use rocrate::{DataOptions, RoCrate};
//!
//! let mut cr = RoCrate::new();
//! cr.set_name("my experiment");
//! cr.add_file(Some("results/data.csv"), None, DataOptions::default(), None)?;
//! cr.add_workflow(
//!     Some("workflow/main.cwl"),
//!     None,
//!     &rocrate::WorkflowOptions { main: true, ..Default::default() },
//!     None,
//! )?;
//! cr.write("out/my-crate")?;
//! ```
//!
//! ## Open, inspect, repackage
//!
//! ```ignore
//! use rocrate::RoCrate;
//!
//! let mut cr = RoCrate::open("my-crate.zip")?;
//! for entity in cr.data_entities() {
//!     println!("{} {:?}", entity.id(), entity.types());
//! }
//! for chunk in cr.stream_zip(8192)? {
//!     upload(chunk?);
//! }
//! ```

pub mod entity;
pub mod error;
pub mod id;
pub mod loader;
pub mod rocrate;
pub mod vocab;
pub mod write;

// Re-export main types for convenience
pub use crate::entity::{DataOptions, Entity, EntityKind, EntitySource, PropertyValue};
pub use crate::error::RoCrateError;
pub use crate::rocrate::{
    make_workflow_crate, CrateOptions, Ref, Resolved, RoCrate, WorkflowConverter,
    WorkflowOptions,
};
pub use crate::write::{metadata_document, stream_entity, ZipStream};
