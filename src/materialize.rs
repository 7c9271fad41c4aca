// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the HAL Net library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Rebuilding HAL payloads as graphs of typed resource nodes.
//!
//! A [Materializer] borrows the application's [TypeRegistry] and turns raw JSON into
//! [ResourceNode]s, [ResourceCollection]s and [PagedResourceCollection]s. Every node records the
//! [ResourceType] it was built from: the most specific registered type, or the generic fallback
//! for its kind.
//!
//! Malformed input never produces an error here. The `instantiate_*` entry points return `None`
//! when the payload does not have the required shape, and nested values that are not
//! resource-shaped are copied through as plain JSON.

use crate::classify::{self, PayloadShape};
use crate::error::{require, HalError};
use crate::link;
use crate::registry::{ResourceKind, ResourceType, TypeRegistry};
use crate::types::{fmt_as_json, relation_link, Link, PageParams};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt::{self, Display, Formatter};
use tracing::{event, Level};

/// Payload keys that are server-side persistence artifacts rather than resource data.
pub const RESERVED_KEYS: &[&str] = &["hibernateLazyInitializer"];

/// Anything carrying a HAL `_links` object, and so able to name its relations.
pub trait Linked {
    fn links(&self) -> &Map<String, Value>;

    fn self_href(&self) -> Option<String> {
        relation_link(self.links(), "self").map(|link| link.href)
    }

    fn has_relation(&self, relation: &str) -> bool {
        self.links().contains_key(relation)
    }

    /// The link for `relation`.
    ///
    /// # Errors
    ///
    /// [HalError::Validation] for an empty relation name, [HalError::RelationNotFound] when there
    /// is no well-formed link under that name.
    fn relation_link(&self, relation: &str) -> Result<Link, HalError> {
        require("relationName", relation)?;
        relation_link(self.links(), relation).ok_or_else(|| HalError::RelationNotFound {
            relation: relation.to_string(),
        })
    }
}

/// A materialized attribute value.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeValue {
    Plain(Value),
    Resource(Box<ResourceNode>),
    Collection(Box<ResourceCollection>),
    Page(Box<PagedResourceCollection>),
    Array(Vec<NodeValue>),
}

impl NodeValue {
    pub fn as_plain(&self) -> Option<&Value> {
        match self {
            Self::Plain(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_resource(&self) -> Option<&ResourceNode> {
        match self {
            Self::Resource(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[NodeValue]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Plain(value) => value.clone(),
            Self::Resource(node) => node.to_value(),
            Self::Collection(collection) => collection.to_value(),
            Self::Page(page) => page.to_value(),
            Self::Array(items) => Value::Array(items.iter().map(NodeValue::to_value).collect()),
        }
    }
}

/// One materialized resource: an attribute bag plus its `_links`.
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceNode {
    resource_type: ResourceType,
    links: Map<String, Value>,
    attributes: IndexMap<String, NodeValue>,
}

impl ResourceNode {
    pub fn resource_type(&self) -> &ResourceType {
        &self.resource_type
    }

    pub fn type_name(&self) -> &str {
        self.resource_type.name()
    }

    pub fn kind(&self) -> ResourceKind {
        self.resource_type.kind()
    }

    pub fn attributes(&self) -> &IndexMap<String, NodeValue> {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&NodeValue> {
        self.attributes.get(name)
    }

    /// A plain (non-resource) attribute value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attribute(name)?.as_plain()
    }

    /// A nested resource attribute.
    pub fn nested(&self, name: &str) -> Option<&ResourceNode> {
        self.attribute(name)?.as_resource()
    }

    /// The resources held in an array attribute, skipping non-resource elements.
    pub fn nested_all(&self, name: &str) -> Vec<&ResourceNode> {
        self.attribute(name)
            .and_then(NodeValue::as_array)
            .map(|items| items.iter().filter_map(NodeValue::as_resource).collect())
            .unwrap_or_default()
    }

    /// Back to plain JSON, `_links` included.
    pub fn to_value(&self) -> Value {
        let mut map: Map<String, Value> = self
            .attributes
            .iter()
            .map(|(name, value)| (name.clone(), value.to_value()))
            .collect();
        map.insert("_links".into(), Value::Object(self.links.clone()));
        Value::Object(map)
    }
}

impl Linked for ResourceNode {
    fn links(&self) -> &Map<String, Value> {
        &self.links
    }
}

impl Serialize for ResourceNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl Display for ResourceNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        fmt_as_json(self, f)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResourceCollection {
    resource_type: ResourceType,
    resources: Vec<ResourceNode>,
    links: Map<String, Value>,
    embedded_key: Option<String>,
}

impl ResourceCollection {
    pub fn resource_type(&self) -> &ResourceType {
        &self.resource_type
    }

    pub fn resources(&self) -> &[ResourceNode] {
        &self.resources
    }

    pub fn into_resources(self) -> Vec<ResourceNode> {
        self.resources
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn to_value(&self) -> Value {
        let key = self.embedded_key.clone().unwrap_or_else(|| "resources".into());
        let items = self.resources.iter().map(ResourceNode::to_value).collect();
        let mut embedded = Map::new();
        embedded.insert(key, Value::Array(items));
        let mut map = Map::new();
        map.insert("_embedded".into(), Value::Object(embedded));
        map.insert("_links".into(), Value::Object(self.links.clone()));
        Value::Object(map)
    }
}

impl Linked for ResourceCollection {
    fn links(&self) -> &Map<String, Value> {
        &self.links
    }
}

impl Serialize for ResourceCollection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    pub number: u64,
    pub size: u64,
    pub total_elements: u64,
    pub total_pages: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PagedResourceCollection {
    collection: ResourceCollection,
    page: PageMetadata,
}

impl PagedResourceCollection {
    pub fn resource_type(&self) -> &ResourceType {
        &self.collection.resource_type
    }

    pub fn resources(&self) -> &[ResourceNode] {
        self.collection.resources()
    }

    pub fn collection(&self) -> &ResourceCollection {
        &self.collection
    }

    pub fn page(&self) -> PageMetadata {
        self.page
    }

    pub fn page_number(&self) -> u64 {
        self.page.number
    }

    pub fn page_size(&self) -> u64 {
        self.page.size
    }

    pub fn total_elements(&self) -> u64 {
        self.page.total_elements
    }

    pub fn total_pages(&self) -> u64 {
        self.page.total_pages
    }

    // Navigation availability comes from the links, not the page numbers: servers omit
    // `prev`/`next` at the edges.
    pub fn has_first(&self) -> bool {
        self.has_relation("first")
    }

    pub fn has_last(&self) -> bool {
        self.has_relation("last")
    }

    pub fn has_next(&self) -> bool {
        self.has_relation("next")
    }

    pub fn has_prev(&self) -> bool {
        self.has_relation("prev")
    }

    pub fn to_value(&self) -> Value {
        let mut value = self.collection.to_value();
        if let Value::Object(map) = &mut value {
            map.insert(
                "page".into(),
                serde_json::to_value(self.page).unwrap_or(Value::Null),
            );
        }
        value
    }
}

impl Linked for PagedResourceCollection {
    fn links(&self) -> &Map<String, Value> {
        &self.collection.links
    }
}

impl Serialize for PagedResourceCollection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

/// The result of materializing a payload of unknown shape.
#[derive(Clone, Debug, PartialEq)]
pub enum Materialized {
    Resource(ResourceNode),
    Collection(ResourceCollection),
    Page(PagedResourceCollection),
    /// Data that is not resource-shaped, passed through unchanged.
    Plain(Value),
}

impl Materialized {
    pub fn shape(&self) -> Option<PayloadShape> {
        match self {
            Self::Resource(_) => Some(PayloadShape::Resource),
            Self::Collection(_) => Some(PayloadShape::Collection),
            Self::Page(_) => Some(PayloadShape::PagedCollection),
            Self::Plain(_) => None,
        }
    }

    pub fn into_resource(self) -> Result<ResourceNode, HalError> {
        match self {
            Self::Resource(node) => Ok(node),
            _ => Err(HalError::NotResourceShaped {
                expected: "resource".into(),
            }),
        }
    }

    pub fn into_collection(self) -> Result<ResourceCollection, HalError> {
        match self {
            Self::Collection(collection) => Ok(collection),
            _ => Err(HalError::NotResourceShaped {
                expected: "resource collection".into(),
            }),
        }
    }

    pub fn into_page(self) -> Result<PagedResourceCollection, HalError> {
        match self {
            Self::Page(page) => Ok(page),
            _ => Err(HalError::NotResourceShaped {
                expected: "paged resource collection".into(),
            }),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Self::Resource(node) => node.to_value(),
            Self::Collection(collection) => collection.to_value(),
            Self::Page(page) => page.to_value(),
            Self::Plain(value) => value,
        }
    }
}

#[derive(Clone, Copy)]
enum Hint<'a> {
    Top {
        projection: bool,
        name_hint: Option<&'a str>,
    },
    Nested {
        relation: &'a str,
    },
    Typed(&'a ResourceType),
}

pub struct Materializer<'r> {
    registry: &'r TypeRegistry,
    default_page: PageParams,
}

impl<'r> Materializer<'r> {
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self {
            registry,
            default_page: PageParams::default(),
        }
    }

    /// Page size reported for paged payloads without `page` metadata.
    pub fn with_default_page(mut self, default_page: PageParams) -> Self {
        self.default_page = default_page;
        self
    }

    pub fn instantiate_resource(&self, payload: &Value) -> Option<ResourceNode> {
        self.resource_node(
            payload,
            Hint::Top {
                projection: false,
                name_hint: None,
            },
        )
    }

    /// Like [instantiate_resource](Self::instantiate_resource), but prefer the projection
    /// registered for the resource name.
    pub fn instantiate_projection(&self, payload: &Value) -> Option<ResourceNode> {
        self.resource_node(
            payload,
            Hint::Top {
                projection: true,
                name_hint: None,
            },
        )
    }

    /// Materialize `payload` as `resource_type`, skipping name inference.
    pub fn instantiate_resource_as(
        &self,
        payload: &Value,
        resource_type: &ResourceType,
    ) -> Option<ResourceNode> {
        self.resource_node(payload, Hint::Typed(resource_type))
    }

    pub fn instantiate_resource_collection(&self, payload: &Value) -> Option<ResourceCollection> {
        self.collection(payload, false)
    }

    pub fn instantiate_paged_resource_collection(
        &self,
        payload: &Value,
    ) -> Option<PagedResourceCollection> {
        self.paged(payload, false)
    }

    /// Materialize `value` as whatever resource shape it has, or return it unchanged.
    pub fn init_resource(&self, value: &Value) -> NodeValue {
        self.shaped_value(
            value,
            Hint::Top {
                projection: false,
                name_hint: None,
            },
        )
        .unwrap_or_else(|| NodeValue::Plain(value.clone()))
    }

    /// Classify `payload` and materialize it accordingly; non-resource data passes through.
    pub fn materialize(&self, payload: Value, projection: bool) -> Materialized {
        let result = match classify::classify(&payload) {
            Some(PayloadShape::PagedCollection) => {
                self.paged(&payload, projection).map(Materialized::Page)
            }
            Some(PayloadShape::Collection) => self
                .collection(&payload, projection)
                .map(Materialized::Collection),
            Some(PayloadShape::Resource) => self
                .resource_node(
                    &payload,
                    Hint::Top {
                        projection,
                        name_hint: None,
                    },
                )
                .map(Materialized::Resource),
            None => None,
        };
        result.unwrap_or(Materialized::Plain(payload))
    }

    fn resource_node(&self, payload: &Value, hint: Hint<'_>) -> Option<ResourceNode> {
        let object = payload.as_object()?;
        let links = object.get("_links")?.as_object()?;
        let resource_type = self.select_type(payload, hint);
        Some(self.build_node(object, links.clone(), resource_type))
    }

    fn select_type(&self, payload: &Value, hint: Hint<'_>) -> ResourceType {
        let has_self = classify::self_href(payload).is_some();
        match hint {
            Hint::Typed(ty) => ty.clone(),
            Hint::Nested { relation } => {
                if has_self
                    && !self
                        .registry
                        .is_registered(ResourceKind::EmbeddedResource, relation)
                {
                    self.type_from_name(payload, None, false)
                } else {
                    self.registry
                        .resolve(ResourceKind::EmbeddedResource, Some(relation))
                }
            }
            Hint::Top { .. } if !has_self => ResourceType::generic(ResourceKind::EmbeddedResource),
            Hint::Top {
                projection,
                name_hint,
            } => self.type_from_name(payload, name_hint, projection),
        }
    }

    // Candidate names are the hint, then the last two segments of the self link (last first), so
    // both `.../cars` and `.../cars/1` resolve to `cars`.
    fn type_from_name(
        &self,
        payload: &Value,
        name_hint: Option<&str>,
        projection: bool,
    ) -> ResourceType {
        let mut candidates: Vec<String> = name_hint.map(String::from).into_iter().collect();
        if let Some(href) = classify::self_href(payload) {
            candidates.extend(link::path_segments(href).into_iter().rev().take(2));
        }
        if projection {
            if let Some(ty) = candidates
                .iter()
                .find_map(|name| self.registry.resolve_projection(name))
            {
                return ty.clone();
            }
        }
        let name = candidates
            .iter()
            .find(|name| self.registry.is_registered(ResourceKind::Resource, name));
        self.registry
            .resolve(ResourceKind::Resource, name.map(String::as_str))
    }

    fn build_node(
        &self,
        object: &Map<String, Value>,
        links: Map<String, Value>,
        resource_type: ResourceType,
    ) -> ResourceNode {
        let attributes = object
            .iter()
            .filter(|(key, _)| *key != "_links" && !RESERVED_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), self.node_value(&resource_type, key, value)))
            .collect();
        ResourceNode {
            resource_type,
            links,
            attributes,
        }
    }

    // Projection relations apply to projections and to any resource that has a projection.
    fn has_projection_relations(&self, owner: &ResourceType) -> bool {
        owner.kind() == ResourceKind::Projection
            || owner
                .resource_name()
                .map_or(false, |name| self.registry.resolve_projection(name).is_some())
    }

    fn node_value(&self, owner: &ResourceType, key: &str, value: &Value) -> NodeValue {
        if self.has_projection_relations(owner) {
            if let Some(relation_type) = self.registry.projection_relation(key) {
                return self.projection_relation_value(relation_type, value);
            }
        }
        match value {
            Value::Array(items) => NodeValue::Array(
                items
                    .iter()
                    .map(|item| self.node_value(owner, key, item))
                    .collect(),
            ),
            Value::Object(_) => self
                .shaped_value(value, Hint::Nested { relation: key })
                .unwrap_or_else(|| NodeValue::Plain(value.clone())),
            _ => NodeValue::Plain(value.clone()),
        }
    }

    fn shaped_value(&self, value: &Value, hint: Hint<'_>) -> Option<NodeValue> {
        match classify::classify(value)? {
            PayloadShape::PagedCollection => self
                .paged(value, false)
                .map(|page| NodeValue::Page(Box::new(page))),
            PayloadShape::Collection => self
                .collection(value, false)
                .map(|collection| NodeValue::Collection(Box::new(collection))),
            PayloadShape::Resource => self
                .resource_node(value, hint)
                .map(|node| NodeValue::Resource(Box::new(node))),
        }
    }

    // Projections inline their relations without `_links`, so the registered relation type is
    // applied to any object found under the property.
    fn projection_relation_value(&self, relation_type: &ResourceType, value: &Value) -> NodeValue {
        match value {
            Value::Array(items) => NodeValue::Array(
                items
                    .iter()
                    .map(|item| self.projection_relation_value(relation_type, item))
                    .collect(),
            ),
            Value::Object(object) => {
                let links = object
                    .get("_links")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                NodeValue::Resource(Box::new(self.build_node(
                    object,
                    links,
                    relation_type.clone(),
                )))
            }
            other => NodeValue::Plain(other.clone()),
        }
    }

    fn collection(&self, payload: &Value, projection: bool) -> Option<ResourceCollection> {
        let object = payload.as_object()?;
        let embedded = object.get("_embedded")?.as_object()?;
        let links = object.get("_links")?.as_object()?;

        let mut resources = Vec::new();
        for (key, value) in embedded {
            let items: Vec<&Value> = match value {
                Value::Array(items) => items.iter().collect(),
                other => vec![other],
            };
            for item in items {
                let hint = Hint::Top {
                    projection,
                    name_hint: Some(key),
                };
                match self.resource_node(item, hint) {
                    Some(node) => resources.push(node),
                    None => event!(
                        Level::DEBUG,
                        "INIT_RESOURCE skipping non-resource item under _embedded.{}",
                        key
                    ),
                }
            }
        }
        event!(
            Level::TRACE,
            "INIT_RESOURCE collection of {} resources",
            resources.len()
        );

        Some(ResourceCollection {
            resource_type: self.registry.resolve(ResourceKind::Collection, None),
            resources,
            links: links.clone(),
            embedded_key: embedded.keys().next().cloned(),
        })
    }

    fn paged(&self, payload: &Value, projection: bool) -> Option<PagedResourceCollection> {
        let mut collection = self.collection(payload, projection)?;
        collection.resource_type = self.registry.resolve(ResourceKind::PagedCollection, None);

        let page = payload.get("page").and_then(Value::as_object);
        let field = |name: &str| page.and_then(|page| page.get(name)).and_then(Value::as_u64);
        let page = PageMetadata {
            number: field("number").unwrap_or(0),
            size: field("size").unwrap_or(self.default_page.size),
            total_elements: field("totalElements").unwrap_or(0),
            total_pages: field("totalPages").unwrap_or(1),
        };
        Some(PagedResourceCollection { collection, page })
    }
}
