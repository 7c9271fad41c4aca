// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the HAL Net library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

use crate::error::HalError;
use fmt::{Display, Formatter};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Free-form request parameters, in insertion order.
pub type Params = Map<String, Value>;

/// A single entry of a HAL `_links` object.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Link {
    pub href: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub templated: bool,
}

impl Link {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            templated: false,
        }
    }

    pub fn templated(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            templated: true,
        }
    }
}

impl Display for Link {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        fmt_as_json(self, f)
    }
}

/// Look up the link for `relation` in a raw `_links` object.
///
/// HAL allows a relation to hold either a single link or an array of links; for arrays the first
/// well-formed entry wins.
pub fn relation_link(links: &Map<String, Value>, relation: &str) -> Option<Link> {
    match links.get(relation)? {
        Value::Array(items) => items
            .iter()
            .find_map(|item| serde_json::from_value(item.clone()).ok()),
        value @ Value::Object(_) => serde_json::from_value(value.clone()).ok(),
        _ => None,
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(default)]
pub struct PageParams {
    pub size: u64,
    pub page: u64,
}

impl Default for PageParams {
    fn default() -> Self {
        Self { size: 20, page: 0 }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl Display for SortOrder {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asc => write!(f, "ASC"),
            Self::Desc => write!(f, "DESC"),
        }
    }
}

/// Sort properties in the order they should be applied.
pub type Sort = IndexMap<String, SortOrder>;

/// Options for requests that read resources.
///
/// `page` is only meaningful for paged requests; [crate::link::fill_default_page] supplies it
/// when absent.
#[derive(Clone, Debug, PartialEq)]
pub struct GetOption {
    pub params: Params,
    pub page: Option<PageParams>,
    pub sort: Sort,
    pub use_cache: bool,
}

impl Default for GetOption {
    fn default() -> Self {
        Self {
            params: Params::new(),
            page: None,
            sort: Sort::new(),
            use_cache: true,
        }
    }
}

impl GetOption {
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_page(mut self, page: PageParams) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_sort(mut self, property: impl Into<String>, order: SortOrder) -> Self {
        self.sort.insert(property.into(), order);
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    pub fn is_projection(&self) -> bool {
        self.params.contains_key("projection")
    }

    /// Flatten params, page and sort into a single parameter object.
    ///
    /// Page fields do not override explicitly supplied `page`/`size` params. Several sort
    /// properties become an array, which expands to repeated `sort` query parameters.
    pub fn to_params(&self) -> Params {
        let mut params = self.params.clone();
        if let Some(page) = self.page {
            params
                .entry("page")
                .or_insert_with(|| Value::from(page.page));
            params
                .entry("size")
                .or_insert_with(|| Value::from(page.size));
        }
        let mut sort: Vec<Value> = self
            .sort
            .iter()
            .map(|(property, order)| Value::from(format!("{},{}", property, order)))
            .collect();
        match sort.len() {
            0 => {}
            1 => {
                params.insert("sort".into(), sort.remove(0));
            }
            _ => {
                params.insert("sort".into(), Value::Array(sort));
            }
        }
        params
    }
}

/// Options for requests that write resources.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RequestOption {
    pub params: Params,
}

impl RequestOption {
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

impl From<RequestOption> for GetOption {
    fn from(options: RequestOption) -> Self {
        Self {
            params: options.params,
            ..Default::default()
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }
}

impl Display for HttpMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = HalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            _ => Err(HalError::UnsupportedMethod { method: s.into() }),
        }
    }
}

// Display implementation for types which serialize to JSON. Displays as a valid JSON object.
pub fn fmt_as_json<T: Serialize>(v: &T, f: &mut Formatter<'_>) -> fmt::Result {
    let string = serde_json::to_string(v).map_err(|_| fmt::Error)?;
    write!(f, "{}", string)
}
