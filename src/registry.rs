// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the HAL Net library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Mapping from resource and relation names to the concrete resource types materialized for them.
//!
//! The registry is an ordinary value. Applications build one during startup, register their
//! types, and hand it to the client, which lends it to the materializer for every response.
//! Re-registering a name replaces the previous entry without error.

use crate::error::{require, HalError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use tracing::{event, Level};

/// The closed set of shapes a materialized node can take.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Resource,
    EmbeddedResource,
    Collection,
    PagedCollection,
    Projection,
}

impl ResourceKind {
    fn generic_name(&self) -> &'static str {
        match self {
            Self::Resource => "Resource",
            Self::EmbeddedResource => "EmbeddedResource",
            Self::Collection => "ResourceCollection",
            Self::PagedCollection => "PagedResourceCollection",
            Self::Projection => "Projection",
        }
    }
}

/// Descriptor of a concrete resource type.
///
/// This plays the role of a constructor: every materialized node records the descriptor it was
/// built from, so callers can dispatch on [ResourceType::name].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ResourceType {
    name: String,
    kind: ResourceKind,
    resource_name: Option<String>,
    projection_name: Option<String>,
    generic: bool,
}

impl ResourceType {
    fn new(name: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            resource_name: None,
            projection_name: None,
            generic: false,
        }
    }

    pub fn resource(name: impl Into<String>) -> Self {
        Self::new(name, ResourceKind::Resource)
    }

    pub fn embedded(name: impl Into<String>) -> Self {
        Self::new(name, ResourceKind::EmbeddedResource)
    }

    pub fn projection(name: impl Into<String>) -> Self {
        Self::new(name, ResourceKind::Projection)
    }

    /// The fallback type used when nothing more specific is registered.
    pub fn generic(kind: ResourceKind) -> Self {
        Self {
            generic: true,
            ..Self::new(kind.generic_name(), kind)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// The resource name this type was registered under, if any.
    pub fn resource_name(&self) -> Option<&str> {
        self.resource_name.as_deref()
    }

    /// For projections, the value of the `projection` request parameter.
    pub fn projection_name(&self) -> Option<&str> {
        self.projection_name.as_deref()
    }

    pub fn is_generic(&self) -> bool {
        self.generic
    }
}

impl Display for ResourceType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(Clone, Debug, Default)]
pub struct TypeRegistry {
    resources: IndexMap<String, ResourceType>,
    embedded: IndexMap<String, ResourceType>,
    projections: IndexMap<String, ResourceType>,
    projection_relations: IndexMap<String, ResourceType>,
}

fn expect_kind(ty: &ResourceType, allowed: &[ResourceKind]) -> Result<(), HalError> {
    if allowed.contains(&ty.kind) {
        Ok(())
    } else {
        Err(HalError::Registration {
            message: format!(
                "type '{}' is a {:?}, expected one of {:?}",
                ty.name, ty.kind, allowed
            ),
        })
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the type materialized for resources named `resource_name`.
    ///
    /// The name is the path segment used in resource URLs, e.g. `products` for
    /// `http://host/api/v1/products/1`.
    pub fn register_resource_type(
        &mut self,
        resource_name: &str,
        mut ty: ResourceType,
    ) -> Result<ResourceType, HalError> {
        require("resourceName", resource_name)?;
        expect_kind(&ty, &[ResourceKind::Resource])?;
        ty.resource_name = Some(resource_name.to_string());
        if self
            .resources
            .insert(resource_name.to_string(), ty.clone())
            .is_some()
        {
            event!(Level::DEBUG, "resource type for '{}' replaced", resource_name);
        }
        Ok(ty)
    }

    /// Register the type materialized for embedded values held in any of `relation_names`.
    pub fn register_embedded_type(
        &mut self,
        relation_names: &[&str],
        ty: ResourceType,
    ) -> Result<(), HalError> {
        if relation_names.is_empty() {
            return Err(HalError::Validation {
                param: "relationNames".into(),
            });
        }
        expect_kind(&ty, &[ResourceKind::EmbeddedResource])?;
        for relation in relation_names {
            require("relationName", relation)?;
        }
        for relation in relation_names {
            self.embedded.insert(relation.to_string(), ty.clone());
        }
        Ok(())
    }

    /// Register `ty` as the projection `projection_name` of an already registered resource type.
    pub fn register_projection(
        &mut self,
        resource_type: &ResourceType,
        projection_name: &str,
        mut ty: ResourceType,
    ) -> Result<ResourceType, HalError> {
        require("projectionName", projection_name)?;
        expect_kind(&ty, &[ResourceKind::Projection])?;
        let resource_name = resource_type
            .resource_name()
            .ok_or_else(|| HalError::Registration {
                message: format!(
                    "projection '{}' refers to '{}', which is not a registered resource type",
                    ty.name, resource_type.name
                ),
            })?
            .to_string();
        ty.resource_name = Some(resource_name.clone());
        ty.projection_name = Some(projection_name.to_string());
        self.projections.insert(resource_name, ty.clone());
        Ok(ty)
    }

    /// Mark projection property `property_name` as a relation materialized with `relation_type`.
    pub fn register_projection_relation(
        &mut self,
        property_name: &str,
        relation_type: ResourceType,
    ) -> Result<(), HalError> {
        require("propertyName", property_name)?;
        expect_kind(
            &relation_type,
            &[ResourceKind::Resource, ResourceKind::EmbeddedResource],
        )?;
        self.projection_relations
            .insert(property_name.to_string(), relation_type);
        Ok(())
    }

    /// The registered type of `kind` for `name`, or the generic fallback for that kind.
    pub fn resolve(&self, kind: ResourceKind, name: Option<&str>) -> ResourceType {
        self.lookup(kind, name)
            .cloned()
            .unwrap_or_else(|| ResourceType::generic(kind))
    }

    pub fn is_registered(&self, kind: ResourceKind, name: &str) -> bool {
        self.lookup(kind, Some(name)).is_some()
    }

    pub fn resolve_projection(&self, resource_name: &str) -> Option<&ResourceType> {
        self.projections.get(resource_name)
    }

    pub fn projection_relation(&self, property_name: &str) -> Option<&ResourceType> {
        self.projection_relations.get(property_name)
    }

    fn lookup(&self, kind: ResourceKind, name: Option<&str>) -> Option<&ResourceType> {
        let name = name?;
        match kind {
            ResourceKind::Resource => self.resources.get(name),
            ResourceKind::EmbeddedResource => self.embedded.get(name),
            ResourceKind::Projection => self.projections.get(name),
            ResourceKind::Collection | ResourceKind::PagedCollection => None,
        }
    }
}
