// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the HAL Net library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Configuration consumed by the client.
//!
//! Loading and merging configuration is the application's business; this module only defines the
//! shape, the defaults, and a couple of JSON entry points. Every field is optional in the source
//! document.

use crate::error::HalError;
use crate::types::PageParams;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api/v1";
pub const DEFAULT_CACHE_LIFE_TIME_MS: u64 = 5 * 60 * 1000;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct HalConfig {
    pub base_url: String,
    pub cache: CacheConfig,
    pub pagination: PaginationConfig,
}

impl Default for HalConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            cache: CacheConfig::default(),
            pagination: PaginationConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    pub enabled: bool,
    pub life_time_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            life_time_ms: DEFAULT_CACHE_LIFE_TIME_MS,
        }
    }
}

impl CacheConfig {
    pub fn life_time(&self) -> Duration {
        Duration::from_millis(self.life_time_ms)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct PaginationConfig {
    pub default_page: PageParams,
}

impl HalConfig {
    pub fn from_json_str(json: &str) -> Result<Self, HalError> {
        let config: Self = serde_json::from_str(json).map_err(|err| HalError::Config {
            message: err.to_string(),
        })?;
        config.validated()
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, HalError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|err| HalError::Config {
            message: format!("unable to read {}: {}", path.display(), err),
        })?;
        Self::from_json_str(&json)
    }

    /// The API root with any trailing slash removed.
    pub fn api_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    fn validated(self) -> Result<Self, HalError> {
        if self.api_url().is_empty() {
            return Err(HalError::Config {
                message: "baseUrl can not be empty".into(),
            });
        }
        if self.pagination.default_page.size == 0 {
            return Err(HalError::Config {
                message: "pagination.defaultPage.size must be positive".into(),
            });
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = HalConfig::from_json_str("{}").unwrap();
        assert_eq!(config, HalConfig::default());
        assert_eq!(config.cache.life_time(), Duration::from_secs(300));
        assert_eq!(config.pagination.default_page, PageParams { size: 20, page: 0 });
    }

    #[test]
    fn partial_document_overrides_only_given_fields() {
        let config = HalConfig::from_json_str(
            r#"{"baseUrl": "https://shop.example/api/", "cache": {"enabled": false}}"#,
        )
        .unwrap();
        assert_eq!(config.api_url(), "https://shop.example/api");
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.life_time_ms, DEFAULT_CACHE_LIFE_TIME_MS);
    }

    #[test]
    fn invalid_documents_are_rejected() {
        assert!(matches!(
            HalConfig::from_json_str(r#"{"baseUrl": ""}"#),
            Err(HalError::Config { .. })
        ));
        assert!(matches!(
            HalConfig::from_json_str(r#"{"pagination": {"defaultPage": {"size": 0, "page": 0}}}"#),
            Err(HalError::Config { .. })
        ));
        assert!(matches!(
            HalConfig::from_json_str("not json"),
            Err(HalError::Config { .. })
        ));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        assert!(matches!(
            HalConfig::from_file("/definitely/not/here.json"),
            Err(HalError::Config { .. })
        ));
    }
}
