//! # strata - layered deployment configuration
//!
//! `strata` turns layered configuration documents into ordered resource descriptors for a
//! declarative provisioning engine.
//!
//! ## Introduction for developers
//!
//! Read this to understand how `strata` works internally.
//!
//! ### Loading documents
//!
//! Documents (json, yaml or hcl) are parsed into a [value::Value] tree by [parse::parse]. Numbers
//! that are integral always become [value::Value::Integer]. Any nested mapping can be turned into
//! flat `key`/`value` settings with [flatten::flatten].
//!
//! A [namespace::Namespace] is one named top-level mapping: the *shared* namespace holding
//! platform wide values, the *local* namespace of a unit, or a namespace holding secrets. Stack
//! files that contain several namespaces (`<Namespace>:<Key>` entries below `config`) are
//! supported as well.
//!
//! ### Configuration snapshot
//!
//! see [config::DeploymentConfig::build] and [config::SharedConfig::build]
//!
//! - every field is read from the one namespace that owns it (see [config])
//! - all missing or malformed fields are collected into [config::ConfigErrors]
//! - secrets are bound with the unit's [secrets::SecretPolicy]
//! - derived values (image references, settings separator) are computed once
//!
//! The resulting snapshot is never mutated.
//!
//! ### Composition
//!
//! Each unit in [stacks] is a fixed sequence of build steps. A step declares a
//! [descriptor::ResourceDescriptor] on a [pipeline::StackBuilder] and gets a
//! [descriptor::ResourceHandle] back. Handles hand out [deferred::Deferred] values for properties
//! that only exist once the resource is materialized; descriptors holding such a value depend on
//! its resource. Referencing a resource that has not been declared yet is rejected, so the
//! declaration order is always a valid build order.
//!
//! ### Materialization
//!
//! Creating resources is the job of a [engine::ProvisioningEngine]. [engine::provision] walks a
//! stack in order; a failed descriptor only takes down the descriptors depending on it.
//! [engine::DryRunEngine] synthesizes exposed properties without creating anything.
pub mod config;
pub mod deferred;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod flatten;
pub mod namespace;
pub mod parse;
pub mod pipeline;
pub mod secrets;
pub mod settings;
pub mod stacks;
pub mod value;
