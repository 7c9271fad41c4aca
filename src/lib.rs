// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the HAL Net library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

//! # Client-side materialization of HAL+JSON resource graphs.
//!
//! HAL APIs return JSON documents with `_links`, `_embedded` and `page` sections. This crate
//! turns such documents into a graph of typed nodes ([ResourceNode], [ResourceCollection],
//! [PagedResourceCollection]) whose types are looked up in an explicit [TypeRegistry], and turns
//! caller-supplied bodies back into their wire form, collapsing every embedded resource to its
//! self link.
//!
//! The [HalClient] ties the pieces together. It resolves relation links (expanding RFC 6570
//! templates and filling in default pagination), hands requests to a [Transport], materializes
//! the responses, and keeps GET results in a time-bounded [ResourceCache] which is invalidated by
//! resource name whenever a mutation succeeds. [SurfTransport] is the default transport; it uses
//! the middleware in the `client` module to convert error responses into [HalError]s.
//!
//! Logging goes through `tracing`; the crate never installs a subscriber.

pub mod body;
pub mod cache;
pub mod classify;
pub mod client;
pub mod config;
pub mod error;
pub mod link;
pub mod materialize;
pub mod registry;
pub mod types;

pub use body::{resolve_values, Include, RequestBody};
pub use cache::{CacheKey, Clock, ManualClock, ResourceCache, SystemClock};
pub use classify::PayloadShape;
pub use client::{HalClient, SurfTransport, Transport, TransportRequest};
pub use config::HalConfig;
pub use error::*;
pub use materialize::{
    Linked, Materialized, Materializer, NodeValue, PageMetadata, PagedResourceCollection,
    ResourceCollection, ResourceNode,
};
pub use registry::{ResourceKind, ResourceType, TypeRegistry};
pub use types::*;
