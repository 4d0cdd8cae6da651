//! Cookie-authenticated HTTP client with retry and credential refresh

use crate::download::retry::{RetryConfig, RetryExecutor};
use crate::error::VidlError;
use crate::platform::credentials::{Credential, CredentialSource, CredentialStore, PromptSource};
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use reqwest::{Client, ClientBuilder, Method, Response, StatusCode};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36";

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout
    pub timeout: Duration,
    /// User agent string
    pub user_agent: Option<String>,
    /// Proxy URL
    pub proxy_url: Option<String>,
    /// Retry policy for transient failures
    pub retry: RetryConfig,
    /// Maximum credential refreshes per authenticated request
    pub max_auth_refreshes: u32,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: None,
            proxy_url: None,
            retry: RetryConfig::default(),
            max_auth_refreshes: 5,
        }
    }
}

/// Owns the HTTP session and the current credential.
///
/// The credential sits behind a mutex that is only held to snapshot or
/// replace it, never across an await point. Every request carries the
/// cookie header snapshotted when it was built, so a refresh never
/// changes a request already in flight.
pub struct ClientContext {
    client: Client,
    config: HttpClientConfig,
    retry: RetryExecutor,
    credential: Mutex<Credential>,
    store: CredentialStore,
    source: Arc<dyn CredentialSource>,
}

impl ClientContext {
    /// Build a context, loading the stored credential
    pub fn new(
        config: HttpClientConfig,
        store: CredentialStore,
        source: Arc<dyn CredentialSource>,
    ) -> Result<Self, VidlError> {
        let mut builder = ClientBuilder::new()
            .timeout(config.timeout)
            .gzip(true)
            .brotli(true)
            .user_agent(
                config
                    .user_agent
                    .clone()
                    .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            );

        if let Some(proxy_url) = &config.proxy_url {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
        }

        let raw = store.load()?;
        debug!("Loaded credential from {}", store.path().display());

        Ok(Self {
            client: builder.build()?,
            retry: RetryExecutor::with_config(config.retry.clone()),
            config,
            credential: Mutex::new(Credential::new(raw)),
            store,
            source,
        })
    }

    /// Context backed by `~/.vidl/cookie` that prompts on the terminal
    pub fn interactive(config: HttpClientConfig) -> Result<Self, VidlError> {
        Self::new(
            config,
            CredentialStore::default_location()?,
            Arc::new(PromptSource),
        )
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Snapshot of the current credential
    pub fn credential(&self) -> Credential {
        self.lock_credential().clone()
    }

    /// Replace the in-memory credential. It is persisted only after a
    /// request succeeds with it.
    pub fn replace_credential(&self, raw: &str) {
        *self.lock_credential() = Credential::new(raw);
        info!("Credential replaced in memory");
    }

    /// Ask the credential source for a new cookie right away
    pub async fn force_refresh(&self) -> Result<(), VidlError> {
        match self.source.refresh().await? {
            Some(raw) => {
                self.replace_credential(&raw);
                Ok(())
            }
            None => Err(VidlError::AuthRefreshExhausted {
                attempts: 0,
                url: String::new(),
            }),
        }
    }

    fn lock_credential(&self) -> MutexGuard<'_, Credential> {
        // A panic while holding the guard cannot leave a half-written credential.
        self.credential
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn cookie_header(&self) -> Result<Option<HeaderValue>, VidlError> {
        let header = self.lock_credential().cookies().to_header();
        if header.is_empty() {
            return Ok(None);
        }
        Ok(Some(HeaderValue::from_str(&header)?))
    }

    /// Issue a request under the retry policy.
    ///
    /// 404 fails with `NotFound` straight away. Network failures and any
    /// other non-2xx status are `Transient` and retried; exhaustion returns
    /// the last `Transient`.
    pub async fn execute(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
    ) -> Result<Response, VidlError> {
        let label = format!("{} {}", method, url);
        self.retry
            .execute(&label, || self.send_once(method.clone(), url, headers.clone()))
            .await
    }

    async fn send_once(
        &self,
        method: Method,
        url: &str,
        mut headers: HeaderMap,
    ) -> Result<Response, VidlError> {
        if let Some(cookie) = self.cookie_header()? {
            headers.insert(COOKIE, cookie);
        }

        debug!("{} {}", method, url);
        let response = self
            .client
            .request(method, url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| VidlError::Transient(format!("{}: {}", url, e)))?;

        classify(url, response)
    }

    /// GET a page body as text
    pub async fn get_text(&self, url: &str) -> Result<String, VidlError> {
        let response = self.execute(Method::GET, url, HeaderMap::new()).await?;
        Ok(response.text().await?)
    }

    /// Issue a JSON request that must yield a non-empty value at
    /// `success_path` (dotted, e.g. `list.videos`).
    ///
    /// An empty value with an `ERROR` field fails with `PermissionDenied`.
    /// An empty value without one means the cookie expired: a replacement
    /// is requested from the credential source and the request replayed,
    /// up to `max_auth_refreshes` times. The cookie is persisted the first
    /// time it is seen to work.
    pub async fn request_authenticated(
        &self,
        method: Method,
        url: &str,
        success_path: &str,
    ) -> Result<Value, VidlError> {
        let mut refreshes = 0;

        loop {
            let sent = self.credential();
            let response = self.execute(method.clone(), url, HeaderMap::new()).await?;
            let data: Value = response.json().await?;

            if lookup_path(&data, success_path).is_some_and(is_truthy) {
                self.persist_if_new(sent)?;
                return Ok(data);
            }

            if let Some(error) = data.get("ERROR").filter(|e| is_truthy(e)) {
                let message = match error {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                return Err(VidlError::PermissionDenied(format!("{} {}", message, url)));
            }

            if refreshes >= self.config.max_auth_refreshes {
                return Err(VidlError::AuthRefreshExhausted {
                    attempts: refreshes,
                    url: url.to_string(),
                });
            }

            warn!("Cookie rejected by {} (no '{}' in response)", url, success_path);
            let raw = self.source.refresh().await?.ok_or_else(|| {
                VidlError::AuthRefreshExhausted {
                    attempts: refreshes,
                    url: url.to_string(),
                }
            })?;
            self.replace_credential(&raw);
            refreshes += 1;
        }
    }

    fn persist_if_new(&self, sent: Credential) -> Result<(), VidlError> {
        if sent.is_validated() {
            return Ok(());
        }
        self.store.save(sent.raw())?;

        let mut current = self.lock_credential();
        if current.raw() == sent.raw() {
            current.mark_validated();
        }
        info!("Credential validated and saved to {}", self.store.path().display());
        Ok(())
    }
}

fn classify(url: &str, response: Response) -> Result<Response, VidlError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(VidlError::NotFound(url.to_string()));
    }
    Err(VidlError::Transient(format!("{} returned {}", url, status)))
}

/// Walk a dotted key path through nested JSON objects
pub fn lookup_path<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(data, |value, key| value.as_object()?.get(key))
}

/// Whether a JSON value counts as present and non-empty
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
