//! # Manifest Pipeline
//!
//! Render → parse → apply.
//!
//! - [`render_bundle`] expands a template bundle with a value tree into multi-document YAML
//! - [`parse_manifests`] splits that text into dynamic objects
//! - [`apply_all`] create-or-updates each object against the object store, in order

mod apply;
mod parse;
mod render;
mod values;

pub use apply::{apply_all, create_or_update, owner_reference, ApplyOperation};
pub use parse::{parse_manifests, ParseError};
pub use render::{render_bundle, RenderError};
pub use values::{
    to_value_tree, ApplicationValues, HpaValues, MainValues, PortalValues, ResourceLimits,
    ResourceValues, ServicePortValues, ServiceValues,
};
