//! Cookie credentials: parsing, durable storage and refresh sources

use crate::error::VidlError;
use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Cookie returned when no credential has been stored yet
pub const PLACEHOLDER_COOKIE: &str = "foo=bar";

const APP_DIR: &str = ".vidl";
const COOKIE_FILE: &str = "cookie";

/// Ordered cookie name/value pairs parsed from a raw cookie header string.
///
/// Pairs are delimited by `"; "` exactly. A pair without `=` makes the
/// whole string unparseable, which yields an empty map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieMap {
    pairs: Vec<(String, String)>,
}

impl CookieMap {
    pub fn parse(raw: &str) -> Self {
        let mut map = CookieMap::default();
        for pair in raw.split("; ") {
            let mut parts = pair.split('=');
            let key = parts.next().unwrap_or_default();
            let Some(value) = parts.next() else {
                return CookieMap::default();
            };
            map.insert(key, value);
        }
        map
    }

    /// Insert or replace a cookie, keeping first-seen order
    pub fn insert(&mut self, key: &str, value: &str) {
        match self.pairs.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value.to_string(),
            None => self.pairs.push((key.to_string(), value.to_string())),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Serialize back to `k=v; k=v` header form
    pub fn to_header(&self) -> String {
        self.pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// A raw cookie string plus whether it has been seen to work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    raw: String,
    cookies: CookieMap,
    validated: bool,
}

impl Credential {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        // Hand-edited cookie files usually end with a newline
        let cookies = CookieMap::parse(raw.trim());
        Self {
            raw,
            cookies,
            validated: false,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn cookies(&self) -> &CookieMap {
        &self.cookies
    }

    pub fn is_validated(&self) -> bool {
        self.validated
    }

    pub(crate) fn mark_validated(&mut self) {
        self.validated = true;
    }
}

/// Durable home of the raw cookie string
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `~/.vidl/cookie`
    pub fn default_location() -> Result<Self, VidlError> {
        let home = home::home_dir().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "home directory not found")
        })?;
        Ok(Self::new(home.join(APP_DIR).join(COOKIE_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored cookie, or the placeholder when nothing is stored
    pub fn load(&self) -> Result<String, VidlError> {
        if !self.path.is_file() {
            debug!("No stored cookie at {}", self.path.display());
            return Ok(PLACEHOLDER_COOKIE.to_string());
        }
        Ok(std::fs::read_to_string(&self.path)?)
    }

    /// Overwrite the stored cookie wholesale
    pub fn save(&self, raw: &str) -> Result<(), VidlError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, raw)?;
        debug!("Saved cookie to {}", self.path.display());
        Ok(())
    }
}

/// Out-of-band supplier of a replacement cookie when the current one expired
#[async_trait::async_trait]
pub trait CredentialSource: Send + Sync {
    /// Return a replacement raw cookie string, or `None` to give up
    async fn refresh(&self) -> Result<Option<String>, VidlError>;
}

/// Prompts on the terminal and reads one line from stdin
pub struct PromptSource;

#[async_trait::async_trait]
impl CredentialSource for PromptSource {
    async fn refresh(&self) -> Result<Option<String>, VidlError> {
        let line = tokio::task::spawn_blocking(|| -> std::io::Result<String> {
            let mut stderr = std::io::stderr();
            writeln!(stderr, "The cookie has expired, please enter a new one:")?;
            stderr.flush()?;
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            Ok(line)
        })
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))??;

        let line = line.trim();
        Ok((!line.is_empty()).then(|| line.to_string()))
    }
}

/// Reads the cookie from an environment variable on each refresh
pub struct EnvSource {
    var: String,
}

impl EnvSource {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

#[async_trait::async_trait]
impl CredentialSource for EnvSource {
    async fn refresh(&self) -> Result<Option<String>, VidlError> {
        Ok(std::env::var(&self.var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty()))
    }
}

/// Hands out a fixed sequence of cookies, then gives up
#[derive(Default)]
pub struct QueuedSource {
    queue: Mutex<VecDeque<String>>,
}

impl QueuedSource {
    pub fn new<I, S>(cookies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queue: Mutex::new(cookies.into_iter().map(Into::into).collect()),
        }
    }
}

#[async_trait::async_trait]
impl CredentialSource for QueuedSource {
    async fn refresh(&self) -> Result<Option<String>, VidlError> {
        Ok(self
            .queue
            .lock()
            .map_err(|_| VidlError::Transient("credential queue poisoned".to_string()))?
            .pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> CookieMap {
        let mut map = CookieMap::default();
        for (k, v) in pairs {
            map.insert(k, v);
        }
        map
    }

    #[test]
    fn test_parse_cookies() {
        assert_eq!(CookieMap::parse(""), CookieMap::default());
        assert_eq!(CookieMap::parse("foo=bar"), map(&[("foo", "bar")]));
        assert_eq!(
            CookieMap::parse("foo=bar; hello=world"),
            map(&[("foo", "bar"), ("hello", "world")])
        );
        // Without the space the second pair is swallowed into the first value
        assert_eq!(
            CookieMap::parse("foo=bar;hello=world"),
            map(&[("foo", "bar;hello")])
        );
    }

    #[test]
    fn test_parse_cookie_without_equals_is_empty() {
        assert!(CookieMap::parse("foo=bar; orphan").is_empty());
        assert!(CookieMap::parse("orphan").is_empty());
    }

    #[test]
    fn test_parse_keeps_encoded_values() {
        let raw = "X-Backend=11|YE3XA|YE3W+; last_views=%5B%2237177493-1615713518%22%5D; session_ath=light";
        let cookies = CookieMap::parse(raw);
        assert_eq!(cookies.len(), 3);
        assert_eq!(cookies.get("X-Backend"), Some("11|YE3XA|YE3W+"));
        assert_eq!(cookies.get("session_ath"), Some("light"));
    }

    #[test]
    fn test_round_trip() {
        for raw in [
            "foo=bar",
            "foo=bar; hello=world",
            "a=1; b=2; c=%7B%22SQ%22%3Afalse%7D",
        ] {
            assert_eq!(CookieMap::parse(raw).to_header(), raw);
        }
    }

    #[test]
    fn test_credential_starts_unvalidated() {
        let mut credential = Credential::new("foo=bar");
        assert!(!credential.is_validated());
        credential.mark_validated();
        assert!(credential.is_validated());
        assert_eq!(credential.cookies().get("foo"), Some("bar"));
    }

    #[test]
    fn test_credential_trims_line_ending_but_keeps_raw() {
        let credential = Credential::new("session=abc\n");
        assert_eq!(credential.raw(), "session=abc\n");
        assert_eq!(credential.cookies().to_header(), "session=abc");
    }

    #[test]
    fn test_store_missing_file_yields_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("nested").join("cookie"));
        assert_eq!(store.load().unwrap(), PLACEHOLDER_COOKIE);
    }

    #[test]
    fn test_store_save_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join(".vidl").join("cookie"));

        let blob = "session_token=".to_string() + &"A1b2%3D".repeat(1200);
        for raw in ["", "foo=bar", "foo=bar;hello=world", blob.as_str()] {
            store.save(raw).unwrap();
            assert_eq!(store.load().unwrap(), raw);
        }
    }

    #[tokio::test]
    async fn test_queued_source_drains() {
        let source = QueuedSource::new(["a=1", "b=2"]);
        assert_eq!(source.refresh().await.unwrap().as_deref(), Some("a=1"));
        assert_eq!(source.refresh().await.unwrap().as_deref(), Some("b=2"));
        assert_eq!(source.refresh().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_env_source_ignores_blank() {
        std::env::set_var("VIDL_TEST_COOKIE_BLANK", "   ");
        let source = EnvSource::new("VIDL_TEST_COOKIE_BLANK");
        assert_eq!(source.refresh().await.unwrap(), None);

        std::env::set_var("VIDL_TEST_COOKIE_SET", "k=v\n");
        let source = EnvSource::new("VIDL_TEST_COOKIE_SET");
        assert_eq!(source.refresh().await.unwrap().as_deref(), Some("k=v"));
    }
}
