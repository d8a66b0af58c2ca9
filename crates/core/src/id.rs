//! Strongly-typed identifiers for the entities the execution core tracks.
//!
//! Each identifier wraps a UUID behind a distinct domain marker via
//! [`domain-key`](https://crates.io/crates/domain-key)'s `define_uuid!`, so
//! `NodeId` and `ExecutionId` are distinct types at compile time even though
//! both are 16-byte UUIDs underneath. All are `Copy` and support `v4()`,
//! `nil()`, `parse(&str)`, and full serde (de)serialization as UUID strings.

use domain_key::define_uuid;

pub use domain_key::UuidParseError;

define_uuid!(TenantIdDomain => TenantId);
define_uuid!(WorkflowIdDomain => WorkflowId);
define_uuid!(ExecutionIdDomain => ExecutionId);
define_uuid!(NodeIdDomain => NodeId);
