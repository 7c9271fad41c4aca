// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the HAL Net library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

use futures::future::{self, BoxFuture};
use hal_net::*;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const API: &str = "http://localhost:8080/api/v1";

type Reply = Result<Option<Value>, HalError>;

/// Canned responses keyed by method and URL, recording every request it sees.
#[derive(Default)]
struct MockTransport {
    routes: Mutex<HashMap<(HttpMethod, String), Reply>>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl MockTransport {
    fn route(self, method: HttpMethod, url: &str, reply: Reply) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert((method, url.to_string()), reply);
        self
    }

    fn get(self, url: &str, body: Value) -> Self {
        self.route(HttpMethod::Get, url, Ok(Some(body)))
    }

    fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn count(&self, method: HttpMethod, url: &str) -> usize {
        self.requests()
            .iter()
            .filter(|req| req.method == method && req.url == url)
            .count()
    }
}

impl Transport for MockTransport {
    fn request(&self, request: TransportRequest) -> BoxFuture<'_, Reply> {
        let reply = self
            .routes
            .lock()
            .unwrap()
            .get(&(request.method, request.url.clone()))
            .cloned()
            .unwrap_or_else(|| {
                Err(HalError::Transport {
                    status: 404,
                    message: format!("no route for {} {}", request.method, request.url),
                })
            });
        self.requests.lock().unwrap().push(request);
        Box::pin(future::ready(reply))
    }
}

fn url(path: &str) -> String {
    format!("{}/{}", API, path)
}

fn car(id: u64, model: &str) -> Value {
    json!({
        "model": model,
        "_links": {
            "self": {"href": url(&format!("cars/{}", id))},
            "owner": {"href": url(&format!("cars/{}/owner{{?projection}}", id)), "templated": true},
            "drivers": {"href": url(&format!("cars/{}/drivers", id))}
        }
    })
}

fn registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    registry
        .register_resource_type("cars", ResourceType::resource("Car"))
        .unwrap();
    registry
        .register_resource_type("owners", ResourceType::resource("Owner"))
        .unwrap();
    registry
}

fn client(transport: MockTransport) -> HalClient<MockTransport> {
    HalClient::new(transport, registry(), HalConfig::default())
}

fn client_with_car() -> HalClient<MockTransport> {
    client(MockTransport::default().get(&url("cars/1"), car(1, "beetle")))
}

#[async_std::test]
async fn resources_are_materialized_with_their_registered_type() {
    let client = client(MockTransport::default().get(&url("cars/1"), car(1, "beetle")));
    let node = client.get_resource("cars", "1", None).await.unwrap();
    assert_eq!(node.type_name(), "Car");
    assert_eq!(node.get("model"), Some(&json!("beetle")));
    assert_eq!(node.self_href(), Some(url("cars/1")));
}

#[async_std::test]
async fn repeated_gets_are_served_from_the_cache() {
    let client = client(MockTransport::default().get(&url("cars/1"), car(1, "beetle")));
    let first = client.get_resource("cars", "1", None).await.unwrap();
    let second = client.get_resource("cars", "1", None).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(client.transport().count(HttpMethod::Get, &url("cars/1")), 1);
}

#[async_std::test]
async fn cached_entries_expire() {
    let clock = Arc::new(ManualClock::default());
    let client = HalClient::with_clock(
        MockTransport::default().get(&url("cars/1"), car(1, "beetle")),
        registry(),
        HalConfig::default(),
        clock.clone(),
    );
    client.get_resource("cars", "1", None).await.unwrap();
    clock.advance(Duration::from_secs(5 * 60));
    client.get_resource("cars", "1", None).await.unwrap();
    assert_eq!(client.transport().count(HttpMethod::Get, &url("cars/1")), 1);

    clock.advance(Duration::from_millis(1));
    client.get_resource("cars", "1", None).await.unwrap();
    assert_eq!(client.transport().count(HttpMethod::Get, &url("cars/1")), 2);
}

#[async_std::test]
async fn disabled_cache_is_bypassed() {
    let mut config = HalConfig::default();
    config.cache.enabled = false;
    let client = HalClient::new(
        MockTransport::default().get(&url("cars/1"), car(1, "beetle")),
        registry(),
        config,
    );
    client.get_resource("cars", "1", None).await.unwrap();
    client.get_resource("cars", "1", None).await.unwrap();
    assert_eq!(client.transport().count(HttpMethod::Get, &url("cars/1")), 2);

    let client = client_with_car();
    let options = GetOption::default().without_cache();
    client.get_resource("cars", "1", Some(&options)).await.unwrap();
    client.get_resource("cars", "1", Some(&options)).await.unwrap();
    assert_eq!(client.transport().count(HttpMethod::Get, &url("cars/1")), 2);
}

#[async_std::test]
async fn mutations_evict_the_resource_name() {
    let collection = json!({
        "_embedded": {"cars": [car(1, "beetle")]},
        "_links": {"self": {"href": url("cars")}}
    });
    let client = client(
        MockTransport::default()
            .get(&url("cars/1"), car(1, "beetle"))
            .get(&url("cars"), collection)
            .get(&url("owners/1"), json!({"_links": {"self": {"href": url("owners/1")}}}))
            .route(HttpMethod::Put, &url("cars/1"), Ok(Some(car(1, "golf")))),
    );
    let node = client.get_resource("cars", "1", None).await.unwrap();
    client.get_collection("cars", None).await.unwrap();
    client.get_resource("owners", "1", None).await.unwrap();

    let body = RequestBody::new(json!({"model": "golf"}));
    let updated = client.update_resource(&node, Some(&body)).await.unwrap();
    assert_eq!(
        updated.into_resource().unwrap().get("model"),
        Some(&json!("golf"))
    );

    client.get_resource("cars", "1", None).await.unwrap();
    client.get_collection("cars", None).await.unwrap();
    client.get_resource("owners", "1", None).await.unwrap();
    let transport = client.transport();
    assert_eq!(transport.count(HttpMethod::Get, &url("cars/1")), 2);
    assert_eq!(transport.count(HttpMethod::Get, &url("cars")), 2);
    assert_eq!(transport.count(HttpMethod::Get, &url("owners/1")), 1);
}

#[async_std::test]
async fn request_bodies_collapse_resources_to_links() {
    let client = client(
        MockTransport::default()
            .get(&url("owners/1"), json!({"name": "ann", "_links": {"self": {"href": url("owners/1")}}}))
            .route(HttpMethod::Post, &url("cars"), Ok(Some(car(2, "mini")))),
    );
    let owner = client.get_resource("owners", "1", None).await.unwrap();
    let body = RequestBody::new(json!({
        "model": "mini",
        "owner": owner.to_value(),
        "color": null
    }));
    let created = client.create_resource("cars", Some(&body)).await.unwrap();
    assert_eq!(created.shape(), Some(PayloadShape::Resource));

    let post = client
        .transport()
        .requests()
        .into_iter()
        .find(|req| req.method == HttpMethod::Post)
        .unwrap();
    assert_eq!(
        post.body,
        Some(json!({"model": "mini", "owner": url("owners/1")}))
    );
}

#[async_std::test]
async fn pages_get_default_pagination_and_navigate_by_links() {
    let first = json!({
        "_embedded": {"cars": [car(1, "beetle"), car(2, "mini")]},
        "_links": {
            "self": {"href": url("cars?page=0&size=20")},
            "next": {"href": url("cars?page=1&size=20")}
        },
        "page": {"size": 20, "totalElements": 21, "totalPages": 2, "number": 0}
    });
    let second = json!({
        "_embedded": {"cars": [car(3, "golf")]},
        "_links": {
            "self": {"href": url("cars?page=1&size=20")},
            "prev": {"href": url("cars?page=0&size=20")}
        },
        "page": {"size": 20, "totalElements": 21, "totalPages": 2, "number": 1}
    });
    let client = client(
        MockTransport::default()
            .get(&url("cars"), first)
            .get(&url("cars?page=1&size=20"), second),
    );

    let page = client.get_page("cars", None).await.unwrap();
    let request = &client.transport().requests()[0];
    assert_eq!(
        request.params,
        vec![
            ("page".to_string(), "0".to_string()),
            ("size".to_string(), "20".to_string())
        ]
    );
    assert_eq!(page.resources().len(), 2);
    assert_eq!(page.resources()[0].type_name(), "Car");
    assert!(page.has_next());
    assert!(!page.has_prev());

    let next = client.next_page(&page, None).await.unwrap();
    assert_eq!(next.page_number(), 1);
    assert_eq!(next.resources()[0].get("model"), Some(&json!("golf")));
    assert_eq!(
        client.prev_page(&next, None).await.unwrap_err(),
        HalError::Transport {
            status: 404,
            message: format!("no route for GET {}", url("cars?page=0&size=20")),
        }
    );
    assert_eq!(
        client.first_page(&next, None).await.unwrap_err(),
        HalError::RelationNotFound {
            relation: "first".into()
        }
    );
}

#[async_std::test]
async fn custom_page_replaces_the_page_query() {
    let page = json!({
        "_embedded": {"cars": [car(1, "beetle")]},
        "_links": {"self": {"href": url("cars?page=0&size=20")}},
        "page": {"size": 20, "totalElements": 60, "totalPages": 3, "number": 0}
    });
    let third = json!({
        "_embedded": {"cars": [car(9, "polo")]},
        "_links": {"self": {"href": url("cars?page=2&size=5")}},
        "page": {"size": 5, "totalElements": 60, "totalPages": 12, "number": 2}
    });
    let client = client(MockTransport::default().get(&url("cars"), third));
    let page = client
        .materializer()
        .instantiate_paged_resource_collection(&page)
        .unwrap();
    let sort: Sort = vec![("model".to_string(), SortOrder::Desc)]
        .into_iter()
        .collect();
    client
        .custom_page(&page, PageParams { size: 5, page: 2 }, Some(&sort))
        .await
        .unwrap();
    let request = client.transport().requests().pop().unwrap();
    assert_eq!(request.url, url("cars"));
    assert_eq!(
        request.params,
        vec![
            ("page".to_string(), "2".to_string()),
            ("size".to_string(), "5".to_string()),
            ("sort".to_string(), "model,DESC".to_string())
        ]
    );
}

#[async_std::test]
async fn relations_expand_templates_and_append_params() {
    let owner = json!({"name": "ann", "_links": {"self": {"href": url("owners/1")}}});
    let drivers = json!({
        "_embedded": {"owners": [owner.clone()]},
        "_links": {"self": {"href": url("cars/1/drivers")}},
        "page": {"size": 20, "totalElements": 1, "totalPages": 1, "number": 0}
    });
    let client = client(
        MockTransport::default()
            .get(&url("cars/1"), car(1, "beetle"))
            .get(&url("cars/1/owner?projection=ownerSummary"), owner)
            .get(&url("cars/1/drivers"), drivers),
    );
    let node = client.get_resource("cars", "1", None).await.unwrap();

    let options = GetOption::default().with_param("projection", "ownerSummary");
    let owner = client
        .get_relation(&node, "owner", Some(&options))
        .await
        .unwrap();
    assert_eq!(owner.type_name(), "Owner");

    let drivers = client.get_related_page(&node, "drivers", None).await.unwrap();
    assert_eq!(drivers.resources()[0].type_name(), "Owner");
    let request = client.transport().requests().pop().unwrap();
    assert_eq!(request.url, url("cars/1/drivers"));
    assert!(request.params.contains(&("size".to_string(), "20".to_string())));

    assert_eq!(
        client.get_relation(&node, "garage", None).await.unwrap_err(),
        HalError::RelationNotFound {
            relation: "garage".into()
        }
    );
}

#[async_std::test]
async fn relation_mutations_require_a_body() {
    let client = client(
        MockTransport::default()
            .get(&url("cars/1"), car(1, "beetle"))
            .route(HttpMethod::Patch, &url("cars/1/drivers"), Ok(None)),
    );
    let node = client.get_resource("cars", "1", None).await.unwrap();
    assert_eq!(
        client
            .patch_relation(&node, "drivers", None, None)
            .await
            .unwrap_err(),
        HalError::Validation {
            param: "requestBody".into()
        }
    );

    let body = RequestBody::new(json!([url("owners/1")]));
    let result = client
        .patch_relation(&node, "drivers", Some(&body), None)
        .await
        .unwrap();
    assert_eq!(result, Materialized::Plain(Value::Null));
}

#[async_std::test]
async fn wrong_shapes_are_rejected_and_not_cached() {
    let client = client(MockTransport::default().get(&url("cars"), car(1, "beetle")));
    for _ in 0..2 {
        assert_eq!(
            client.get_collection("cars", None).await.unwrap_err(),
            HalError::NotResourceShaped {
                expected: "resource collection".into()
            }
        );
    }
    assert_eq!(client.transport().count(HttpMethod::Get, &url("cars")), 2);
}

#[async_std::test]
async fn custom_queries_pass_plain_data_through() {
    let client = client(
        MockTransport::default().get(&url("cars/search/countByModel"), json!({"count": 3})),
    );
    for _ in 0..2 {
        let result = client
            .custom_query("cars", HttpMethod::Get, "search/countByModel", None, None)
            .await
            .unwrap();
        assert_eq!(result, Materialized::Plain(json!({"count": 3})));
    }
    assert_eq!(
        client
            .transport()
            .count(HttpMethod::Get, &url("cars/search/countByModel")),
        2
    );
}

#[async_std::test]
async fn custom_mutations_honour_the_projection_param() {
    let mut registry = registry();
    let cars = registry.resolve(ResourceKind::Resource, Some("cars"));
    registry
        .register_projection(&cars, "carSummary", ResourceType::projection("CarSummary"))
        .unwrap();
    let client = HalClient::new(
        MockTransport::default().route(
            HttpMethod::Post,
            &url("cars/1/repaint"),
            Ok(Some(car(1, "beetle"))),
        ),
        registry,
        HalConfig::default(),
    );
    let body = RequestBody::new(json!({"color": "red"}));

    let options = GetOption::default().with_param("projection", "carSummary");
    let projected = client
        .custom_query("cars", HttpMethod::Post, "1/repaint", Some(&body), Some(&options))
        .await
        .unwrap()
        .into_resource()
        .unwrap();
    assert_eq!(projected.type_name(), "CarSummary");
    let request = client.transport().requests().pop().unwrap();
    assert_eq!(
        request.params,
        vec![("projection".to_string(), "carSummary".to_string())]
    );

    let plain = client
        .custom_query("cars", HttpMethod::Post, "1/repaint", Some(&body), None)
        .await
        .unwrap()
        .into_resource()
        .unwrap();
    assert_eq!(plain.type_name(), "Car");
}

#[async_std::test]
async fn custom_queries_reject_other_methods() {
    let client = client(MockTransport::default());
    for method in &[HttpMethod::Delete, HttpMethod::Head, HttpMethod::Options] {
        assert_eq!(
            client
                .custom_query("cars", *method, "cleanup", None, None)
                .await
                .unwrap_err(),
            HalError::UnsupportedMethod {
                method: method.to_string()
            }
        );
    }
    assert!(client.transport().requests().is_empty());
}

#[async_std::test]
async fn missing_inputs_fail_before_any_request() {
    let client = client(MockTransport::default());
    assert_eq!(
        client.get_resource("", "1", None).await.unwrap_err(),
        HalError::Validation {
            param: "resourceName".into()
        }
    );
    assert_eq!(
        client.get_resource("cars", " ", None).await.unwrap_err(),
        HalError::Validation { param: "id".into() }
    );
    assert_eq!(
        client.create_resource("cars", None).await.unwrap_err(),
        HalError::Validation {
            param: "requestBody".into()
        }
    );
    assert!(client.transport().requests().is_empty());
}

#[async_std::test]
async fn transport_failures_propagate_and_keep_the_cache_intact() {
    let failure = HalError::Transport {
        status: 503,
        message: "maintenance".into(),
    };
    let client = client(
        MockTransport::default()
            .get(&url("cars/1"), car(1, "beetle"))
            .route(HttpMethod::Delete, &url("cars/1"), Err(failure.clone())),
    );
    let node = client.get_resource("cars", "1", None).await.unwrap();
    assert_eq!(client.delete_resource(&node).await.unwrap_err(), failure);
    client.get_resource("cars", "1", None).await.unwrap();
    assert_eq!(client.transport().count(HttpMethod::Get, &url("cars/1")), 1);
}
