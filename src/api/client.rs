use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use super::error::ApiError;
use super::transport::{ApiRequest, Transport};
use crate::models::{Item, Subscription};

/// Keys per version-manifest page.
pub const VERSIONS_PAGE_LIMIT: usize = 5000;

/// Response payloads the pagination contract can count.
pub trait PageData: DeserializeOwned + Default {
    fn len(&self) -> usize;
}

impl PageData for BTreeMap<String, i64> {
    fn len(&self) -> usize {
        BTreeMap::len(self)
    }
}

impl PageData for Vec<Item> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }
}

/// One page of a structured API response.
#[derive(Debug)]
pub struct Paged<T> {
    /// Library version the server reported with this page.
    pub version: i64,
    /// True when the server short-circuited with 304 Not Modified; `version`
    /// and `data` are meaningless in that case.
    pub unmodified: bool,
    pub data: T,
    request: ApiRequest,
    start: usize,
    returned: usize,
    total: usize,
}

impl<T> Paged<T> {
    /// More than one page exists for this response.
    pub fn multi(&self) -> bool {
        self.start > 0 || self.total > self.returned
    }

    /// No further page remains to fetch.
    pub fn done(&self) -> bool {
        self.start + self.returned >= self.total
    }
}

/// Client for the remote library API.
///
/// Interprets the version and pagination headers; everything else in the
/// response body passes through untouched.
pub struct ApiClient {
    transport: Arc<dyn Transport>,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Fetches the version manifest (key -> version, no payloads) for the
    /// subscription's collection, conditional on its last synchronized
    /// version.
    pub async fn versions(
        &self,
        subscription: &Subscription,
    ) -> Result<Paged<BTreeMap<String, i64>>, ApiError> {
        let mut request = self.request_for(subscription, subscription.items_path());
        request
            .params
            .push(("format".to_string(), "versions".to_string()));
        request
            .params
            .push(("limit".to_string(), VERSIONS_PAGE_LIMIT.to_string()));
        request.if_modified_since_version = Some(subscription.version);
        self.fetch(request, 0).await
    }

    /// Downloads full payloads for an explicit batch of item keys.
    pub async fn items(
        &self,
        subscription: &Subscription,
        keys: &[String],
    ) -> Result<Paged<Vec<Item>>, ApiError> {
        let mut request = self.request_for(subscription, subscription.items_path());
        request
            .params
            .push(("format".to_string(), "json".to_string()));
        request
            .params
            .push(("itemKey".to_string(), keys.join(",")));
        self.fetch(request, 0).await
    }

    /// Fetches the child collection of an item.
    pub async fn children(
        &self,
        subscription: &Subscription,
        key: &str,
    ) -> Result<Paged<Vec<Item>>, ApiError> {
        let path = format!("{}/items/{}/children", subscription.library, key);
        let mut request = self.request_for(subscription, path);
        request
            .params
            .push(("format".to_string(), "json".to_string()));
        self.fetch(request, 0).await
    }

    /// Fetches the page following `page`.
    pub async fn next_page<T: PageData>(&self, page: &Paged<T>) -> Result<Paged<T>, ApiError> {
        let start = page.start + page.returned;
        let mut request = page.request.clone();
        request.params.retain(|(name, _)| name != "start");
        request.params.push(("start".to_string(), start.to_string()));
        request.if_modified_since_version = None;
        self.fetch(request, start).await
    }

    /// Downloads the binary file content attached to an item.
    pub async fn file(
        &self,
        subscription: &Subscription,
        key: &str,
    ) -> Result<Vec<u8>, ApiError> {
        let path = format!("{}/items/{}/file", subscription.library, key);
        let request = self.request_for(subscription, path);
        let response = self.transport.get(&request).await?;
        if !(200..300).contains(&response.status) {
            return Err(ApiError::Status(response.status));
        }
        Ok(response.body)
    }

    fn request_for(&self, subscription: &Subscription, path: String) -> ApiRequest {
        let params = subscription
            .params
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        let mut headers: Vec<(String, String)> = subscription
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        if let Some(key) = &subscription.key {
            headers.push(("Authorization".to_string(), format!("Bearer {}", key)));
        }
        ApiRequest {
            path,
            params,
            headers,
            if_modified_since_version: None,
        }
    }

    async fn fetch<T: PageData>(
        &self,
        request: ApiRequest,
        start: usize,
    ) -> Result<Paged<T>, ApiError> {
        let response = self.transport.get(&request).await?;

        if response.status == 304 {
            return Ok(Paged {
                version: 0,
                unmodified: true,
                data: T::default(),
                request,
                start,
                returned: 0,
                total: 0,
            });
        }
        if !(200..300).contains(&response.status) {
            return Err(ApiError::Status(response.status));
        }
        // Never trust the body of a response that is not structured data.
        match response.content_type.as_deref() {
            Some("application/json") => {}
            other => {
                return Err(ApiError::UnexpectedContentType {
                    path: request.path,
                    found: other.map(str::to_string),
                })
            }
        }
        let version = response
            .last_modified_version
            .ok_or_else(|| ApiError::MissingVersion(request.path.clone()))?;

        let data: T = serde_json::from_slice(&response.body)?;
        let returned = data.len();
        let total = response.total_results.unwrap_or(start + returned);

        Ok(Paged {
            version,
            unmodified: false,
            data,
            request,
            start,
            returned,
            total,
        })
    }
}
