//! HTTP object store client.
//!
//! ### Protocol
//!
//! - `GET/PUT/DELETE/HEAD {base}/{key}`; key segments are percent-encoded
//! - `PUT` with `If-None-Match: *` is create-only; `412` means the key exists
//! - `404` on get/head/delete is an absent key, not an error
//! - `GET {base}?prefix=P` returns `{"keys": [...]}`
//! - Optional `Authorization: Bearer` on every request

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{StatusCode, header};
use serde::Deserialize;
use tidemark_core::Error;
use tidemark_core::store::{ObjectMeta, ObjectStore, PutMode, PutOptions, PutOutcome, StoredObject};
use url::Url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    keys: Vec<String>,
}

/// [`ObjectStore`] backed by a remote HTTP object service.
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    http: reqwest::Client,
    base: Url,
    token: Option<String>,
}

fn store_err(op: &str, key: &str, detail: impl std::fmt::Display) -> Error {
    Error::Store(format!("{op} {key}: {detail}"))
}

fn parse_last_modified(headers: &header::HeaderMap) -> DateTime<Utc> {
    headers
        .get(header::LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

fn meta_from_headers(key: &str, headers: &header::HeaderMap, body_len: Option<usize>) -> ObjectMeta {
    let size = body_len.map(|n| n as u64).or_else(|| {
        headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    });

    ObjectMeta {
        key: key.to_string(),
        size: size.unwrap_or_default(),
        content_type: headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        last_modified: parse_last_modified(headers),
    }
}

impl HttpObjectStore {
    pub fn new(base_url: &str, token: Option<String>, user_agent: &str) -> Result<Self, Error> {
        let mut base = Url::parse(base_url).map_err(|e| Error::InvalidUrl(format!("{base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(Error::InvalidUrl(format!("{base_url}: not a base URL")));
        }
        let trimmed = base.path().trim_end_matches('/').to_string();
        base.set_path(&trimmed);

        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(DEFAULT_TIMEOUT)
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::Store(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, base, token })
    }

    pub fn from_app(config: &tidemark_core::AppConfig) -> Result<Self, Error> {
        let url = config
            .store_url
            .as_deref()
            .ok_or_else(|| Error::InvalidInput("store_url is required for the http store backend".into()))?;
        Self::new(url, config.store_token.clone(), &config.user_agent)
    }

    /// URL for an object key.
    pub fn object_url(&self, key: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(key.split('/'));
        }
        url
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn get(&self, key: &str) -> Result<Option<StoredObject>, Error> {
        let response = self
            .request(reqwest::Method::GET, self.object_url(key))
            .send()
            .await
            .map_err(|e| store_err("get", key, e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let headers = response.headers().clone();
                let body = response.bytes().await.map_err(|e| store_err("get", key, e))?;
                let meta = meta_from_headers(key, &headers, Some(body.len()));
                Ok(Some(StoredObject { meta, body: body.to_vec() }))
            }
            status => Err(store_err("get", key, status)),
        }
    }

    async fn put(&self, key: &str, body: Vec<u8>, options: PutOptions) -> Result<PutOutcome, Error> {
        let mut request = self.request(reqwest::Method::PUT, self.object_url(key));
        if let Some(content_type) = &options.content_type {
            request = request.header(header::CONTENT_TYPE, content_type);
        }
        if options.mode == PutMode::CreateOnly {
            request = request.header(header::IF_NONE_MATCH, "*");
        }

        let response = request.body(body).send().await.map_err(|e| store_err("put", key, e))?;
        match response.status() {
            StatusCode::PRECONDITION_FAILED if options.mode == PutMode::CreateOnly => Ok(PutOutcome::AlreadyExists),
            status if status.is_success() => Ok(PutOutcome::Written),
            status => Err(store_err("put", key, status)),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, Error> {
        let response = self
            .request(reqwest::Method::DELETE, self.object_url(key))
            .send()
            .await
            .map_err(|e| store_err("delete", key, e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(store_err("delete", key, status)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, Error> {
        let response = self
            .request(reqwest::Method::GET, self.base.clone())
            .query(&[("prefix", prefix)])
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| store_err("list", prefix, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(store_err("list", prefix, status));
        }

        let bytes = response.bytes().await.map_err(|e| store_err("list", prefix, e))?;
        let parsed: ListResponse = serde_json::from_slice(&bytes).map_err(|e| store_err("list", prefix, e))?;

        let mut keys: Vec<String> = parsed.keys.into_iter().filter(|k| k.starts_with(prefix)).collect();
        keys.sort();
        Ok(keys)
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, Error> {
        let response = self
            .request(reqwest::Method::HEAD, self.object_url(key))
            .send()
            .await
            .map_err(|e| store_err("head", key, e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(meta_from_headers(key, response.headers(), None))),
            status => Err(store_err("head", key, status)),
        }
    }
}
