//! A [`Producer`] that fetches a JSON document over HTTP.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::BoxFuture;
use refetch::{CacheKey, CancellationToken, Producer};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use smol_str::SmolStr;
use tracing::{debug, trace};

use crate::error::HttpError;

const DEFAULT_PREFIX: &str = "http";

struct Inner {
    client: Client,
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<serde_json::Value>,
    prefix: SmolStr,
}

impl Inner {
    fn request(&self) -> RequestBuilder {
        let request = self
            .client
            .request(self.method.clone(), self.url.clone())
            .headers(self.headers.clone());
        match &self.body {
            Some(body) => request
                .header(
                    reqwest::header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                )
                .body(body.to_string()),
            None => request,
        }
    }
}

/// Sends one HTTP request per attempt and decodes the JSON response as `T`.
///
/// The producer is cheap to clone and can be handed to the cache repeatedly.
pub struct JsonProducer<T> {
    inner: Arc<Inner>,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Clone for JsonProducer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _payload: PhantomData,
        }
    }
}

impl<T> fmt::Debug for JsonProducer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonProducer")
            .field("method", &self.inner.method)
            .field("url", &self.inner.url.as_str())
            .finish()
    }
}

impl<T> JsonProducer<T> {
    /// Creates a builder for a request with the given method and URL.
    pub fn builder(client: Client, method: Method, url: Url) -> JsonProducerBuilder<T> {
        JsonProducerBuilder {
            client,
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            prefix: SmolStr::new_static(DEFAULT_PREFIX),
            _payload: PhantomData,
        }
    }

    /// A plain `GET` of `url`.
    pub fn get(client: Client, url: Url) -> Self {
        Self::builder(client, Method::GET, url).build()
    }

    /// The URL requested, query included.
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    /// A cache key identifying this request.
    ///
    /// The key is built from the method, the path, every query pair in order
    /// and the JSON body. Headers and the host are not part of it.
    pub fn cache_key(&self) -> CacheKey {
        let inner = &self.inner;
        let mut builder = CacheKey::builder(inner.prefix.clone())
            .part("method", &inner.method)
            .part("path", inner.url.path());
        for (name, value) in inner.url.query_pairs() {
            builder = builder.part(name, value);
        }
        builder
            .optional("body", inner.body.as_ref())
            .build()
    }
}

impl<T> Producer for JsonProducer<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    type Output = T;
    type Error = HttpError;
    type Future = BoxFuture<'static, Result<T, HttpError>>;

    fn produce(&self, signal: CancellationToken) -> Self::Future {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            let request = inner.request();
            tokio::select! {
                biased;
                _ = signal.cancelled() => {
                    trace!(url = %inner.url, "request cancelled");
                    Err(HttpError::Cancelled)
                }
                result = send::<T>(request) => {
                    if let Err(error) = &result {
                        debug!(method = %inner.method, url = %inner.url, %error, "request failed");
                    }
                    result
                }
            }
        })
    }
}

async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, HttpError> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(HttpError::Status { status, body });
    }
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Builder for [`JsonProducer`].
pub struct JsonProducerBuilder<T> {
    client: Client,
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<serde_json::Value>,
    prefix: SmolStr,
    _payload: PhantomData<fn() -> T>,
}

impl<T> JsonProducerBuilder<T> {
    /// Appends a query parameter.
    pub fn query(mut self, name: &str, value: impl fmt::Display) -> Self {
        self.url
            .query_pairs_mut()
            .append_pair(name, &value.to_string());
        self
    }

    /// Adds a request header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Sends `body` as JSON.
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Sets the prefix of the keys returned by
    /// [`JsonProducer::cache_key`]. Defaults to `"http"`.
    pub fn prefix(mut self, prefix: impl Into<SmolStr>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Builds the producer.
    pub fn build(self) -> JsonProducer<T> {
        JsonProducer {
            inner: Arc::new(Inner {
                client: self.client,
                method: self.method,
                url: self.url,
                headers: self.headers,
                body: self.body,
                prefix: self.prefix,
            }),
            _payload: PhantomData,
        }
    }
}
