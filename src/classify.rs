// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the HAL Net library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Shape predicates over raw HAL payloads.

use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadShape {
    PagedCollection,
    Collection,
    Resource,
}

fn object_field<'a>(payload: &'a Value, key: &str) -> Option<&'a Map<String, Value>> {
    payload.as_object()?.get(key)?.as_object()
}

pub fn links(payload: &Value) -> Option<&Map<String, Value>> {
    object_field(payload, "_links")
}

pub fn is_paged_collection(payload: &Value) -> bool {
    object_field(payload, "_embedded").is_some()
        && links(payload).is_some()
        && payload
            .as_object()
            .map_or(false, |object| object.contains_key("page"))
}

pub fn is_collection(payload: &Value) -> bool {
    object_field(payload, "_embedded").is_some()
        && links(payload).is_some()
        && !is_paged_collection(payload)
}

pub fn is_resource(payload: &Value) -> bool {
    links(payload).is_some() && !is_paged_collection(payload) && !is_collection(payload)
}

/// Classify `payload`, checking the most specific shape first.
///
/// Returns `None` for null, non-objects, empty objects and anything without a `_links` object.
pub fn classify(payload: &Value) -> Option<PayloadShape> {
    if is_paged_collection(payload) {
        Some(PayloadShape::PagedCollection)
    } else if is_collection(payload) {
        Some(PayloadShape::Collection)
    } else if is_resource(payload) {
        Some(PayloadShape::Resource)
    } else {
        None
    }
}

/// `_links.self.href` of `payload`, if it has one.
pub fn self_href(payload: &Value) -> Option<&str> {
    match links(payload)?.get("self")? {
        Value::Array(items) => items.iter().find_map(|link| link.get("href")?.as_str()),
        link => link.get("href")?.as_str(),
    }
}
