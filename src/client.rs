// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the HAL Net library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

use crate::body::{resolve_values, RequestBody};
use crate::cache::{CacheKey, Clock, ResourceCache, SystemClock};
use crate::classify::PayloadShape;
use crate::config::HalConfig;
use crate::error::{require, require_some, ClientError, Error, HalError};
use crate::link;
use crate::materialize::{
    Linked, Materialized, Materializer, PagedResourceCollection, ResourceCollection, ResourceNode,
};
use crate::registry::TypeRegistry;
use crate::types::{GetOption, HttpMethod, Link, PageParams, RequestOption, Sort};
use futures::future::BoxFuture;
use futures::prelude::*;
use serde::de::DeserializeOwned;
use serde_json::Value;
use snafu::ResultExt;
use std::sync::{Arc, Mutex, MutexGuard};
use surf::{middleware::Next, Client, Request, Response, StatusCode};
use tracing::{event, Level};

/// Deserialize the body of a response.
///
/// The Content-Type header is used to determine the serialization format. An empty body (for
/// instance a `204 No Content`) deserializes to `None`.
///
/// This function combined with the [parse_error_body] middleware defines the client-side
/// protocol for decoding HAL documents from HTTP responses.
pub async fn response_body<T: DeserializeOwned>(
    res: &mut Response,
) -> Result<Option<T>, surf::Error> {
    let bytes = res.body_bytes().await?;
    if bytes.is_empty() {
        return Ok(None);
    }
    if let Some(content_type) = res.content_type() {
        match content_type.essence() {
            "application/json" | "application/hal+json" | "application/prs.hal-forms+json" => {
                serde_json::from_slice(&bytes).map(Some).map_err(|err| {
                    surf::Error::from_str(
                        StatusCode::InternalServerError,
                        format!("response body fails to deserialize: {}", err),
                    )
                })
            }
            other => Err(surf::Error::from_str(
                StatusCode::UnsupportedMediaType,
                format!("unsupported content type {}", other),
            )),
        }
    } else {
        Err(surf::Error::from_str(
            StatusCode::UnsupportedMediaType,
            "unspecified content type in response",
        ))
    }
}

pub async fn response_to_result<E: Error>(mut res: Response) -> surf::Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    match response_body::<E>(&mut res).await {
        Ok(Some(err)) => Err(surf::Error::new(err.status(), err)),
        _ => Err(surf::Error::from_str(
            status,
            format!("request failed with status {}", status),
        )),
    }
}

/// Client middleware which turns responses with non-success statuses into errors.
///
/// If the status code of the response is in the 2xx range, the response is passed through
/// unchanged. Otherwise, the body of the response is treated as an [Error] which is lifted into
/// a [surf::Error]; bodies that are not an [Error] produce a [surf::Error] carrying just the
/// status. This can then be converted into a module-specific error type using
/// [Error::from_client_error].
///
/// If the request fails without producing a response at all, the [surf::Error] from the failed
/// request is passed through.
pub fn parse_error_body<E: Error>(
    req: Request,
    client: Client,
    next: Next<'_>,
) -> BoxFuture<surf::Result<Response>> {
    Box::pin(
        next.run(req, client)
            .and_then(|res| async { response_to_result::<E>(res).await }),
    )
}

/// Client middleware which logs requests and responses.
pub fn trace(req: Request, client: Client, next: Next<'_>) -> BoxFuture<surf::Result<Response>> {
    Box::pin(async move {
        event!(
            Level::INFO,
            "--> sending request {{method: {}, url: {}}}",
            req.method(),
            req.url(),
        );
        let res = next.run(req, client).await;
        match &res {
            Ok(res) => event!(
                Level::INFO,
                "<-- received response {{status: {}, content-type: {:?}}}",
                res.status(),
                res.content_type(),
            ),
            Err(err) => event!(Level::WARN, "<-- request failed: {}", err),
        }
        res
    })
}

/// A request handed to the [Transport].
#[derive(Clone, Debug, PartialEq)]
pub struct TransportRequest {
    pub method: HttpMethod,
    pub url: String,
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl TransportRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            params: Vec::new(),
            body: None,
        }
    }

    pub fn with_params(mut self, params: Vec<(String, String)>) -> Self {
        self.params = params;
        self
    }

    pub fn with_body(mut self, body: Option<Value>) -> Self {
        self.body = body;
        self
    }
}

/// The network side of the client.
///
/// A transport performs one HTTP exchange and returns the parsed JSON body of a successful
/// response (`None` when the body is empty). Status interpretation, retries and timeouts all
/// belong here; the rest of the crate only looks at the body.
pub trait Transport: Send + Sync {
    fn request(&self, request: TransportRequest) -> BoxFuture<'_, Result<Option<Value>, HalError>>;
}

/// [Transport] backed by a [surf::Client] with the [trace] and [parse_error_body] middleware.
#[derive(Clone, Debug)]
pub struct SurfTransport {
    client: Client,
}

impl Default for SurfTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SurfTransport {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client: client.with(trace).with(parse_error_body::<HalError>),
        }
    }
}

fn surf_method(method: HttpMethod) -> surf::http::Method {
    use surf::http::Method;
    match method {
        HttpMethod::Get => Method::Get,
        HttpMethod::Post => Method::Post,
        HttpMethod::Put => Method::Put,
        HttpMethod::Patch => Method::Patch,
        HttpMethod::Delete => Method::Delete,
        HttpMethod::Head => Method::Head,
        HttpMethod::Options => Method::Options,
    }
}

impl Transport for SurfTransport {
    fn request(&self, request: TransportRequest) -> BoxFuture<'_, Result<Option<Value>, HalError>> {
        Box::pin(async move {
            let mut url = surf::Url::parse(&request.url).map_err(|err| HalError::Validation {
                param: format!("url ({}: {})", request.url, err),
            })?;
            if !request.params.is_empty() {
                url.query_pairs_mut().extend_pairs(&request.params);
            }
            let mut builder = surf::RequestBuilder::new(surf_method(request.method), url)
                .header("Accept", "application/hal+json, application/json");
            if let Some(body) = &request.body {
                builder = builder.body_json(body).context(ClientError)?;
            }
            let mut res = self.client.send(builder).await.context(ClientError)?;
            response_body(&mut res).await.context(ClientError)
        })
    }
}

/// Entry point for reading and writing HAL resources.
///
/// The client owns the [TypeRegistry], the [ResourceCache] and the transport. GET responses are
/// cached by request fingerprint when caching is enabled in the [HalConfig]; every successful
/// mutation evicts the cached data of the resource it touched.
pub struct HalClient<T> {
    transport: T,
    registry: TypeRegistry,
    config: HalConfig,
    cache: Mutex<ResourceCache>,
}

impl<T: Transport> HalClient<T> {
    pub fn new(transport: T, registry: TypeRegistry, config: HalConfig) -> Self {
        Self::with_clock(transport, registry, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        transport: T,
        registry: TypeRegistry,
        config: HalConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = ResourceCache::with_clock(config.api_url(), config.cache.life_time(), clock);
        Self {
            transport,
            registry,
            config,
            cache: Mutex::new(cache),
        }
    }

    pub fn config(&self) -> &HalConfig {
        &self.config
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn materializer(&self) -> Materializer<'_> {
        Materializer::new(&self.registry).with_default_page(self.config.pagination.default_page)
    }

    pub fn clear_cache(&self) {
        self.cache().clear();
    }

    fn cache(&self) -> MutexGuard<'_, ResourceCache> {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn resource_url(&self, resource_name: &str, query: Option<&str>) -> Result<String, HalError> {
        require("resourceName", resource_name)?;
        let url = link::generate_resource_url(self.config.api_url(), resource_name, query);
        event!(Level::DEBUG, "PREPARE_URL {}", url);
        Ok(url)
    }

    async fn send(&self, request: TransportRequest) -> Result<Option<Value>, HalError> {
        event!(
            Level::DEBUG,
            "HTTP_REQUEST {} {} params: {:?}",
            request.method,
            request.url,
            request.params
        );
        let method = request.method;
        let url = request.url.clone();
        let result = self.transport.request(request).await;
        if let Err(err) = &result {
            event!(Level::WARN, "HTTP_REQUEST {} {} failed: {}", method, url, err);
        }
        result
    }

    // GET `url`, serving from and filling the cache. A payload that does not have the `expect`ed
    // shape fails the request and is never cached.
    async fn fetch(
        &self,
        url: String,
        options: &GetOption,
        params: Vec<(String, String)>,
        expect: Option<PayloadShape>,
    ) -> Result<Materialized, HalError> {
        let key = CacheKey::new(HttpMethod::Get, &url, &params)?;
        let caching = self.config.cache.enabled && options.use_cache;
        if caching {
            let cached = self.cache().get_resource(&key);
            if let Some(hit) = cached {
                if expect.is_none() || hit.shape() == expect {
                    return Ok(hit);
                }
            }
        }

        let request = TransportRequest::new(HttpMethod::Get, url).with_params(params);
        let payload = self.send(request).await?.unwrap_or(Value::Null);
        let result = self.materializer().materialize(payload, options.is_projection());
        if let Some(expected) = expect {
            if result.shape() != Some(expected) {
                event!(
                    Level::WARN,
                    "INIT_RESOURCE expected {:?}, got {:?}",
                    expected,
                    result.shape()
                );
                return Err(HalError::NotResourceShaped {
                    expected: shape_name(expected).into(),
                });
            }
        }
        if caching && result.shape().is_some() {
            self.cache().put_resource(&key, result.clone());
        }
        Ok(result)
    }

    async fn mutate(
        &self,
        method: HttpMethod,
        url: String,
        params: Vec<(String, String)>,
        body: Option<Value>,
        projection: bool,
    ) -> Result<Materialized, HalError> {
        let key = CacheKey::new(method, &url, &params)?;
        let request = TransportRequest::new(method, url)
            .with_params(params)
            .with_body(body);
        let payload = self.send(request).await?.unwrap_or(Value::Null);
        if self.config.cache.enabled {
            self.cache().evict_resource(&key);
        }
        Ok(self.materializer().materialize(payload, projection))
    }

    async fn fetch_link(
        &self,
        link: &Link,
        options: &GetOption,
        expect: PayloadShape,
    ) -> Result<Materialized, HalError> {
        let (url, params) = link::resolve(link, &options.to_params());
        self.fetch(url, options, params, Some(expect)).await
    }

    async fn mutate_link(
        &self,
        method: HttpMethod,
        link: &Link,
        body: Option<&RequestBody>,
        options: Option<&RequestOption>,
    ) -> Result<Materialized, HalError> {
        let body = require_some("requestBody", body)?;
        let params = options.map(|o| o.params.clone()).unwrap_or_default();
        let projection = params.contains_key("projection");
        let (url, params) = link::resolve(link, &params);
        self.mutate(method, url, params, resolve_values(Some(body)), projection)
            .await
    }

    /// GET `{base}/{resource_name}/{id}`.
    pub async fn get_resource(
        &self,
        resource_name: &str,
        id: &str,
        options: Option<&GetOption>,
    ) -> Result<ResourceNode, HalError> {
        require("id", id)?;
        let url = self.resource_url(resource_name, Some(id))?;
        let options = options.cloned().unwrap_or_default();
        let params = link::query_pairs(&options.to_params());
        self.fetch(url, &options, params, Some(PayloadShape::Resource))
            .await?
            .into_resource()
    }

    /// GET `{base}/{resource_name}` as an unpaged collection.
    pub async fn get_collection(
        &self,
        resource_name: &str,
        options: Option<&GetOption>,
    ) -> Result<ResourceCollection, HalError> {
        let url = self.resource_url(resource_name, None)?;
        let options = options.cloned().unwrap_or_default();
        let params = link::query_pairs(&options.to_params());
        self.fetch(url, &options, params, Some(PayloadShape::Collection))
            .await?
            .into_collection()
    }

    /// GET `{base}/{resource_name}` as a page, with the default page when none is given.
    pub async fn get_page(
        &self,
        resource_name: &str,
        options: Option<&GetOption>,
    ) -> Result<PagedResourceCollection, HalError> {
        let url = self.resource_url(resource_name, None)?;
        let options = link::fill_default_page(options, self.config.pagination.default_page);
        let params = link::query_pairs(&options.to_params());
        self.fetch(url, &options, params, Some(PayloadShape::PagedCollection))
            .await?
            .into_page()
    }

    /// GET `{base}/{resource_name}/search/{query}` as an unpaged collection.
    pub async fn search_collection(
        &self,
        resource_name: &str,
        query: &str,
        options: Option<&GetOption>,
    ) -> Result<ResourceCollection, HalError> {
        require("searchQuery", query)?;
        let url = self.resource_url(resource_name, Some(&format!("search/{}", query)))?;
        let options = options.cloned().unwrap_or_default();
        let params = link::query_pairs(&options.to_params());
        self.fetch(url, &options, params, Some(PayloadShape::Collection))
            .await?
            .into_collection()
    }

    /// GET `{base}/{resource_name}/search/{query}` as a page.
    pub async fn search_page(
        &self,
        resource_name: &str,
        query: &str,
        options: Option<&GetOption>,
    ) -> Result<PagedResourceCollection, HalError> {
        require("searchQuery", query)?;
        let url = self.resource_url(resource_name, Some(&format!("search/{}", query)))?;
        let options = link::fill_default_page(options, self.config.pagination.default_page);
        let params = link::query_pairs(&options.to_params());
        self.fetch(url, &options, params, Some(PayloadShape::PagedCollection))
            .await?
            .into_page()
    }

    /// POST a new resource to `{base}/{resource_name}`.
    pub async fn create_resource(
        &self,
        resource_name: &str,
        body: Option<&RequestBody>,
    ) -> Result<Materialized, HalError> {
        let url = self.resource_url(resource_name, None)?;
        let body = require_some("requestBody", body)?;
        self.mutate(
            HttpMethod::Post,
            url,
            Vec::new(),
            resolve_values(Some(body)),
            false,
        )
        .await
    }

    /// PUT the full state of `resource` to its self link.
    pub async fn update_resource(
        &self,
        resource: &impl Linked,
        body: Option<&RequestBody>,
    ) -> Result<Materialized, HalError> {
        let link = self_link(resource)?;
        self.mutate_link(HttpMethod::Put, &link, body, None).await
    }

    /// PATCH `resource` at its self link.
    pub async fn patch_resource(
        &self,
        resource: &impl Linked,
        body: Option<&RequestBody>,
    ) -> Result<Materialized, HalError> {
        let link = self_link(resource)?;
        self.mutate_link(HttpMethod::Patch, &link, body, None).await
    }

    /// DELETE `resource` at its self link.
    pub async fn delete_resource(&self, resource: &impl Linked) -> Result<Materialized, HalError> {
        let link = self_link(resource)?;
        let (url, params) = link::resolve(&link, &Default::default());
        self.mutate(HttpMethod::Delete, url, params, None, false)
            .await
    }

    /// Perform an arbitrary request under `{base}/{resource_name}`.
    ///
    /// The response is materialized according to its shape; anything that is not resource-shaped
    /// is returned as [Materialized::Plain]. Custom GETs bypass the cache.
    ///
    /// # Errors
    ///
    /// [HalError::UnsupportedMethod] for anything but GET, POST, PUT and PATCH.
    pub async fn custom_query(
        &self,
        resource_name: &str,
        method: HttpMethod,
        query: &str,
        body: Option<&RequestBody>,
        options: Option<&GetOption>,
    ) -> Result<Materialized, HalError> {
        require("query", query)?;
        let url = self.resource_url(resource_name, Some(query))?;
        let options = options.cloned().unwrap_or_default();
        let params = link::query_pairs(&options.to_params());
        match method {
            HttpMethod::Get => {
                let request = TransportRequest::new(method, url).with_params(params);
                let payload = self.send(request).await?.unwrap_or(Value::Null);
                Ok(self
                    .materializer()
                    .materialize(payload, options.is_projection()))
            }
            HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch => {
                self.mutate(
                    method,
                    url,
                    params,
                    resolve_values(body),
                    options.is_projection(),
                )
                .await
            }
            other => {
                let err = HalError::UnsupportedMethod {
                    method: other.to_string(),
                };
                event!(Level::ERROR, "HTTP_REQUEST {}", err);
                Err(err)
            }
        }
    }

    /// GET the single resource behind `relation`.
    pub async fn get_relation(
        &self,
        resource: &impl Linked,
        relation: &str,
        options: Option<&GetOption>,
    ) -> Result<ResourceNode, HalError> {
        let link = resource.relation_link(relation)?;
        let options = options.cloned().unwrap_or_default();
        self.fetch_link(&link, &options, PayloadShape::Resource)
            .await?
            .into_resource()
    }

    /// GET the collection behind `relation`.
    pub async fn get_related_collection(
        &self,
        resource: &impl Linked,
        relation: &str,
        options: Option<&GetOption>,
    ) -> Result<ResourceCollection, HalError> {
        let link = resource.relation_link(relation)?;
        let options = options.cloned().unwrap_or_default();
        self.fetch_link(&link, &options, PayloadShape::Collection)
            .await?
            .into_collection()
    }

    /// GET the page behind `relation`, with the default page when none is given.
    pub async fn get_related_page(
        &self,
        resource: &impl Linked,
        relation: &str,
        options: Option<&GetOption>,
    ) -> Result<PagedResourceCollection, HalError> {
        let link = resource.relation_link(relation)?;
        let options = link::fill_default_page(options, self.config.pagination.default_page);
        self.fetch_link(&link, &options, PayloadShape::PagedCollection)
            .await?
            .into_page()
    }

    pub async fn post_relation(
        &self,
        resource: &impl Linked,
        relation: &str,
        body: Option<&RequestBody>,
        options: Option<&RequestOption>,
    ) -> Result<Materialized, HalError> {
        let link = resource.relation_link(relation)?;
        self.mutate_link(HttpMethod::Post, &link, body, options)
            .await
    }

    pub async fn put_relation(
        &self,
        resource: &impl Linked,
        relation: &str,
        body: Option<&RequestBody>,
        options: Option<&RequestOption>,
    ) -> Result<Materialized, HalError> {
        let link = resource.relation_link(relation)?;
        self.mutate_link(HttpMethod::Put, &link, body, options)
            .await
    }

    pub async fn patch_relation(
        &self,
        resource: &impl Linked,
        relation: &str,
        body: Option<&RequestBody>,
        options: Option<&RequestOption>,
    ) -> Result<Materialized, HalError> {
        let link = resource.relation_link(relation)?;
        self.mutate_link(HttpMethod::Patch, &link, body, options)
            .await
    }

    pub async fn first_page(
        &self,
        page: &PagedResourceCollection,
        options: Option<&GetOption>,
    ) -> Result<PagedResourceCollection, HalError> {
        self.follow_page(page, "first", options).await
    }

    pub async fn prev_page(
        &self,
        page: &PagedResourceCollection,
        options: Option<&GetOption>,
    ) -> Result<PagedResourceCollection, HalError> {
        self.follow_page(page, "prev", options).await
    }

    pub async fn next_page(
        &self,
        page: &PagedResourceCollection,
        options: Option<&GetOption>,
    ) -> Result<PagedResourceCollection, HalError> {
        self.follow_page(page, "next", options).await
    }

    pub async fn last_page(
        &self,
        page: &PagedResourceCollection,
        options: Option<&GetOption>,
    ) -> Result<PagedResourceCollection, HalError> {
        self.follow_page(page, "last", options).await
    }

    /// Fetch an arbitrary page of the collection `page` belongs to.
    pub async fn custom_page(
        &self,
        page: &PagedResourceCollection,
        params: PageParams,
        sort: Option<&Sort>,
    ) -> Result<PagedResourceCollection, HalError> {
        let mut link = page.relation_link("self")?;
        if !link.templated {
            // The self link of a page carries the current page in its query.
            link.href = link.href.split('?').next().unwrap_or_default().to_string();
        }
        let mut options = GetOption::default().with_page(params);
        if let Some(sort) = sort {
            options.sort = sort.clone();
        }
        self.fetch_link(&link, &options, PayloadShape::PagedCollection)
            .await?
            .into_page()
    }

    async fn follow_page(
        &self,
        page: &PagedResourceCollection,
        relation: &str,
        options: Option<&GetOption>,
    ) -> Result<PagedResourceCollection, HalError> {
        let link = page.relation_link(relation)?;
        let options = options.cloned().unwrap_or_default();
        self.fetch_link(&link, &options, PayloadShape::PagedCollection)
            .await?
            .into_page()
    }
}

fn self_link(resource: &impl Linked) -> Result<Link, HalError> {
    resource.relation_link("self")
}

fn shape_name(shape: PayloadShape) -> &'static str {
    match shape {
        PayloadShape::Resource => "resource",
        PayloadShape::Collection => "resource collection",
        PayloadShape::PagedCollection => "paged resource collection",
    }
}
