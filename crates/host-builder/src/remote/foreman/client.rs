//! Foreman API client implementation.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

use super::models::{ApiError, CreateHostBody, HostResource, ResourceId, SearchResponse};
use crate::config::ClientConfig;
use crate::job::{HostPayload, ReferenceKind};
use crate::remote::traits::{HostRecord, RemoteClient, RemoteError};

/// Cached reference lookups, misses included.
type ResolveCache = RwLock<HashMap<(ReferenceKind, String), Option<u64>>>;

/// Foreman management API client.
pub struct ForemanClient {
    /// HTTP client.
    client: Client,
    /// `<server>/api` with no trailing slash.
    base_url: Url,
    /// Basic auth user.
    username: String,
    /// Basic auth password.
    password: String,
    /// Value for the `Accept` header.
    accept: String,
    /// Request timeout applied to POST requests.
    timeout_post: Duration,
    /// Reference lookups, present when caching is enabled.
    cache: Option<ResolveCache>,
}

impl ForemanClient {
    /// Create a new Foreman client.
    ///
    /// # Errors
    /// Returns error if the server URL is invalid or the HTTP client cannot
    /// be created.
    pub fn new(config: &ClientConfig) -> Result<Self, RemoteError> {
        let mut base_url = Url::parse(&config.server)
            .map_err(|e| RemoteError::Config(format!("invalid server URL {}: {e}", config.server)))?;
        base_url
            .path_segments_mut()
            .map_err(|()| RemoteError::Config(format!("server URL {} cannot be a base", config.server)))?
            .pop_if_empty()
            .push("api");

        let client = Client::builder()
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .danger_accept_invalid_certs(!config.verify)
            .build()?;

        Ok(Self {
            client,
            base_url,
            username: config.username.clone(),
            password: config.password.clone(),
            accept: format!("version={},application/json", config.api_version),
            timeout_post: config.timeout_post,
            cache: config.use_cache.then(ResolveCache::default),
        })
    }

    /// Build an endpoint URL below `/api`.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| RemoteError::Config(format!("invalid base URL {}", self.base_url)))?
            .extend(segments);
        Ok(url)
    }

    /// Attach auth and content negotiation headers.
    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", &self.accept)
    }

    /// Make an authenticated GET request.
    async fn get<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, RemoteError> {
        debug!(url = %url, "GET request");

        let response = self.authed(self.client.get(url)).send().await?;
        Self::handle_response(response).await
    }

    /// Make an authenticated POST request.
    async fn post<T, B>(&self, url: Url, body: &B) -> Result<T, RemoteError>
    where
        T: serde::de::DeserializeOwned,
        B: serde::Serialize,
    {
        debug!(url = %url, "POST request");

        let response = self
            .authed(self.client.post(url))
            .timeout(self.timeout_post)
            .json(body)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Handle API response, parsing JSON or error.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, RemoteError> {
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            serde_json::from_str(&text).map_err(|e| {
                warn!(error = %e, body = %text, "Failed to parse response");
                RemoteError::Decode(e)
            })
        } else {
            let message = serde_json::from_str::<ApiError>(&text)
                .ok()
                .and_then(|e| e.summary())
                .unwrap_or(text);
            Err(RemoteError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }

    /// Look up a reference on the API, bypassing the cache.
    ///
    /// Nested host group titles (`base/web`) are searched by title: an
    /// encoded `/` in a path segment is answered with 404 by proxies that
    /// refuse encoded slashes, which would read as "no match".
    async fn show(&self, kind: ReferenceKind, identifier: &str) -> Result<Option<u64>, RemoteError> {
        if kind == ReferenceKind::Hostgroup && identifier.contains('/') {
            return self.find_hostgroup_by_title(identifier).await;
        }

        let url = self.endpoint(&[collection(kind), identifier])?;
        match self.get::<ResourceId>(url).await {
            Ok(resource) => Ok(resource.id),
            Err(RemoteError::Api { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Search host groups by full title.
    async fn find_hostgroup_by_title(&self, title: &str) -> Result<Option<u64>, RemoteError> {
        let mut url = self.endpoint(&[collection(ReferenceKind::Hostgroup)])?;
        url.query_pairs_mut()
            .append_pair("search", &format!("title = \"{title}\""));

        let response: SearchResponse<ResourceId> = self.get(url).await?;
        debug!(title, matches = ?response.subtotal, "Host group search finished");
        Ok(response.results.into_iter().find_map(|r| r.id))
    }
}

/// API collection holding resources of `kind`.
const fn collection(kind: ReferenceKind) -> &'static str {
    match kind {
        ReferenceKind::Hostgroup => "hostgroups",
        ReferenceKind::Subnet => "subnets",
        ReferenceKind::ComputeProfile => "compute_profiles",
    }
}

#[async_trait]
impl RemoteClient for ForemanClient {
    async fn find_host_by_name_prefix(&self, name: &str) -> Result<Vec<HostRecord>, RemoteError> {
        let mut url = self.endpoint(&["hosts"])?;
        url.query_pairs_mut()
            .append_pair("search", &format!("name ~ {name}.%"));

        let response: SearchResponse<HostResource> = self.get(url).await?;
        debug!(host = %name, matches = ?response.subtotal, "Host search finished");

        Ok(response
            .results
            .into_iter()
            .map(|h| HostRecord {
                id: h.id,
                name: h.name,
            })
            .collect())
    }

    async fn resolve(
        &self,
        kind: ReferenceKind,
        identifier: &str,
    ) -> Result<Option<u64>, RemoteError> {
        let key = (kind, identifier.to_string());

        if let Some(cache) = &self.cache {
            if let Some(id) = cache.read().await.get(&key) {
                debug!(kind = %kind, identifier, "Reference served from cache");
                return Ok(*id);
            }
        }

        let id = self.show(kind, identifier).await?;

        if let Some(cache) = &self.cache {
            cache.write().await.insert(key, id);
        }

        Ok(id)
    }

    async fn create_host(&self, payload: HostPayload) -> Result<HostRecord, RemoteError> {
        let url = self.endpoint(&["hosts"])?;
        let body = CreateHostBody { host: &payload };

        let host: HostResource = self.post(url, &body).await?;
        Ok(HostRecord {
            id: host.id,
            name: host.name,
        })
    }
}
