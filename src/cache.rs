// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the HAL Net library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Time-bounded cache of materialized GET responses.
//!
//! Entries are keyed by a [CacheKey] fingerprint of method, URL and sorted query parameters.
//! Whether caching is active at all is decided by the caller; the cache itself always caches.

use crate::error::{require, HalError};
use crate::materialize::Materialized;
use crate::types::HttpMethod;
use itertools::Itertools;
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{event, Level};
use url::form_urlencoded;

/// Source of the current time for expiry checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }
}

impl ManualClock {
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Fingerprint of a request. Equal requests produce equal keys.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    url: String,
    value: String,
}

impl CacheKey {
    /// Build the key for `method` on `url` with query `params`, in any order.
    ///
    /// # Errors
    ///
    /// [HalError::Validation] if `url` is empty.
    pub fn new(method: HttpMethod, url: &str, params: &[(String, String)]) -> Result<Self, HalError> {
        require("url", url)?;
        let params = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter().sorted())
            .finish();
        Ok(Self {
            url: url.to_string(),
            value: format!("url={}|method={}|params={}", url, method, params),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

#[derive(Clone, Debug)]
struct CachedEntry {
    url: String,
    value: Materialized,
    cached_at: Instant,
}

pub struct ResourceCache {
    entries: HashMap<String, CachedEntry>,
    base_url: String,
    life_time: Duration,
    clock: Arc<dyn Clock>,
}

impl ResourceCache {
    pub fn new(base_url: &str, life_time: Duration) -> Self {
        Self::with_clock(base_url, life_time, Arc::new(SystemClock))
    }

    pub fn with_clock(base_url: &str, life_time: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            life_time,
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// The cached value for `key`, unless it is missing or expired. Expired entries are removed.
    pub fn get_resource(&mut self, key: &CacheKey) -> Option<Materialized> {
        let cached_at = match self.entries.get(key.value()) {
            Some(entry) => entry.cached_at,
            None => {
                event!(Level::DEBUG, "CACHE_GET {} miss", key);
                return None;
            }
        };
        if self.clock.now() > cached_at + self.life_time {
            self.entries.remove(key.value());
            event!(Level::DEBUG, "CACHE_GET {} expired", key);
            return None;
        }
        event!(Level::DEBUG, "CACHE_GET {} hit", key);
        self.entries.get(key.value()).map(|entry| entry.value.clone())
    }

    /// Store `value` under `key`, replacing any previous entry.
    pub fn put_resource(&mut self, key: &CacheKey, value: Materialized) {
        let entry = CachedEntry {
            url: key.url().to_string(),
            value,
            cached_at: self.clock.now(),
        };
        self.entries.insert(key.value().to_string(), entry);
        event!(Level::DEBUG, "CACHE_PUT {}", key);
    }

    /// Evict every entry for the resource `key` belongs to, returning how many were removed.
    ///
    /// The resource name is the first path segment after the API root, so a mutation of
    /// `{base}/cars/1` evicts `{base}/cars`, `{base}/cars/1`, `{base}/cars/search/...` and so on,
    /// but not `{base}/carsales`. Keys outside the API root evict nothing.
    pub fn evict_resource(&mut self, key: &CacheKey) -> usize {
        let prefix = match self.resource_prefix(key.url()) {
            Some(prefix) => prefix,
            None => return 0,
        };
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !is_under(&entry.url, &prefix));
        let evicted = before - self.entries.len();
        if evicted > 0 {
            event!(Level::DEBUG, "CACHE_EVICT {} evicted {} entries", key, evicted);
        }
        evicted
    }

    fn resource_prefix(&self, url: &str) -> Option<String> {
        let rest = url.strip_prefix(&self.base_url)?.strip_prefix('/')?;
        let name = rest
            .split(|c| c == '/' || c == '?' || c == '#' || c == '{')
            .next()
            .filter(|name| !name.is_empty())?;
        Some(format!("{}/{}", self.base_url, name))
    }
}

fn is_under(url: &str, prefix: &str) -> bool {
    match url.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with(|c| c == '/' || c == '?' || c == '#'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BASE: &str = "http://localhost:8080/api/v1";

    fn key(url: &str) -> CacheKey {
        CacheKey::new(HttpMethod::Get, url, &[]).unwrap()
    }

    fn value(n: u64) -> Materialized {
        Materialized::Plain(json!({ "n": n }))
    }

    #[test]
    fn keys_ignore_parameter_order() {
        let a = CacheKey::new(
            HttpMethod::Get,
            "http://h/cars",
            &[("size".into(), "20".into()), ("page".into(), "0".into())],
        )
        .unwrap();
        let b = CacheKey::new(
            HttpMethod::Get,
            "http://h/cars",
            &[("page".into(), "0".into()), ("size".into(), "20".into())],
        )
        .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.value(), "url=http://h/cars|method=GET|params=page=0&size=20");
        assert_ne!(a, CacheKey::new(HttpMethod::Post, "http://h/cars", &[]).unwrap());
    }

    #[test]
    fn distinct_parameter_sets_give_distinct_keys() {
        let smuggled = CacheKey::new(
            HttpMethod::Get,
            "http://h/api/cars",
            &[("q".into(), "a&size=5".into())],
        )
        .unwrap();
        let separate = CacheKey::new(
            HttpMethod::Get,
            "http://h/api/cars",
            &[("q".into(), "a".into()), ("size".into(), "5".into())],
        )
        .unwrap();
        assert_ne!(smuggled, separate);
        assert_eq!(
            smuggled.value(),
            "url=http://h/api/cars|method=GET|params=q=a%26size%3D5"
        );
    }

    #[test]
    fn keys_require_a_url() {
        assert_eq!(
            CacheKey::new(HttpMethod::Get, "", &[]),
            Err(HalError::Validation { param: "url".into() })
        );
    }

    #[test]
    fn entries_expire_after_life_time() {
        let clock = Arc::new(ManualClock::default());
        let mut cache = ResourceCache::with_clock(BASE, Duration::from_secs(60), clock.clone());
        let k = key("http://localhost:8080/api/v1/cars/1");

        assert_eq!(cache.get_resource(&k), None);
        cache.put_resource(&k, value(1));
        clock.advance(Duration::from_secs(60));
        assert_eq!(cache.get_resource(&k), Some(value(1)));
        clock.advance(Duration::from_millis(1));
        assert_eq!(cache.get_resource(&k), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn put_replaces_and_restarts_the_clock() {
        let clock = Arc::new(ManualClock::default());
        let mut cache = ResourceCache::with_clock(BASE, Duration::from_secs(10), clock.clone());
        let k = key("http://localhost:8080/api/v1/cars/1");
        cache.put_resource(&k, value(1));
        clock.advance(Duration::from_secs(8));
        cache.put_resource(&k, value(2));
        clock.advance(Duration::from_secs(8));
        assert_eq!(cache.get_resource(&k), Some(value(2)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn eviction_covers_the_whole_resource_name() {
        let mut cache = ResourceCache::new(BASE, Duration::from_secs(300));
        let things_one = key("http://localhost:8080/api/v1/things/1");
        let things = CacheKey::new(
            HttpMethod::Get,
            "http://localhost:8080/api/v1/things",
            &[("page".into(), "0".into())],
        )
        .unwrap();
        let other = key("http://localhost:8080/api/v1/other/2");
        let similar = key("http://localhost:8080/api/v1/thingsOther/3");
        for (n, k) in [&things_one, &things, &other, &similar].iter().enumerate() {
            cache.put_resource(k, value(n as u64));
        }

        let evicted = cache.evict_resource(&key("http://localhost:8080/api/v1/things/7/owner"));
        assert_eq!(evicted, 2);
        assert_eq!(cache.get_resource(&things_one), None);
        assert_eq!(cache.get_resource(&things), None);
        assert!(cache.get_resource(&other).is_some());
        assert!(cache.get_resource(&similar).is_some());
    }

    #[test]
    fn eviction_outside_the_api_root_is_a_no_op() {
        let mut cache = ResourceCache::new(BASE, Duration::from_secs(300));
        let k = key("http://localhost:8080/api/v1/things/1");
        cache.put_resource(&k, value(1));
        assert_eq!(cache.evict_resource(&key("http://elsewhere/things/1")), 0);
        assert_eq!(cache.evict_resource(&key("http://localhost:8080/api/v1/")), 0);
        assert_eq!(cache.len(), 1);
    }
}
