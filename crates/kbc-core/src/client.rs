//! Blocking HTTP client shared by every API wrapper.
//!
//! One request per call, no retries. Non-2xx responses become
//! [`KbcError::Api`] with the decoded error body; 2xx responses whose body is
//! not JSON become [`KbcError::Decode`] carrying the raw text.

use crate::error::{KbcError, Result};
use crate::region::{Region, Service};
use reqwest::blocking::{multipart::Form, Client, RequestBuilder, Response};
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::io::Write;
use std::time::Duration;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Management-scoped token (`X-KBC-ManageApiToken`).
    Manage(String),
    /// Data-plane token (`X-StorageApi-Token`).
    Storage(String),
    /// Raw `Authorization` header value (developer portal sessions).
    Authorization(String),
    Anonymous,
}

impl Credential {
    fn header(&self) -> Option<(&'static str, &str)> {
        match self {
            Credential::Manage(t) => Some(("X-KBC-ManageApiToken", t)),
            Credential::Storage(t) => Some(("X-StorageApi-Token", t)),
            Credential::Authorization(t) => Some(("Authorization", t)),
            Credential::Anonymous => None,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Credential::Manage(_) => "Manage",
            Credential::Storage(_) => "Storage",
            Credential::Authorization(_) => "Authorization",
            Credential::Anonymous => "Anonymous",
        };
        write!(f, "Credential::{kind}(<redacted>)")
    }
}

// ---------------------------------------------------------------------------
// ApiClient
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base: Url,
    credential: Credential,
}

impl ApiClient {
    pub fn new(base_url: &str, credential: Credential) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| KbcError::invalid(format!("base URL '{base_url}': {e}")))?;
        if base.cannot_be_a_base() {
            return Err(KbcError::invalid(format!(
                "base URL '{base_url}' cannot carry a path"
            )));
        }
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| KbcError::invalid(format!("http client: {e}")))?;
        Ok(Self {
            http,
            base,
            credential,
        })
    }

    pub fn for_region(region: &Region, service: Service, credential: Credential) -> Result<Self> {
        Self::new(&region.url(service), credential)
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Build a URL below the base from path segments; each segment is
    /// percent-encoded on its own, so ids may contain `/` or spaces.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        {
            let mut path = url.path_segments_mut().map_err(|()| {
                KbcError::invalid(format!("base URL '{}' cannot carry a path", self.base))
            })?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    pub fn get(&self, segments: &[&str]) -> Result<Value> {
        let url = self.endpoint(segments)?;
        self.call(Method::GET, url, |rb| rb)
    }

    pub fn get_with_query<Q: Serialize + ?Sized>(
        &self,
        segments: &[&str],
        query: &Q,
    ) -> Result<Value> {
        let url = self.endpoint(segments)?;
        self.call(Method::GET, url, |rb| rb.query(query))
    }

    /// GET an absolute URL returned by the API (job status links).
    pub fn get_url(&self, url: &str) -> Result<Value> {
        let url = Url::parse(url).map_err(|e| KbcError::invalid(format!("url '{url}': {e}")))?;
        self.call(Method::GET, url, |rb| rb)
    }

    pub fn post_json<B: Serialize + ?Sized>(&self, segments: &[&str], body: &B) -> Result<Value> {
        let url = self.endpoint(segments)?;
        self.call(Method::POST, url, |rb| rb.json(body))
    }

    pub fn put_json<B: Serialize + ?Sized>(&self, segments: &[&str], body: &B) -> Result<Value> {
        let url = self.endpoint(segments)?;
        self.call(Method::PUT, url, |rb| rb.json(body))
    }

    pub fn patch_json<B: Serialize + ?Sized>(&self, segments: &[&str], body: &B) -> Result<Value> {
        let url = self.endpoint(segments)?;
        self.call(Method::PATCH, url, |rb| rb.json(body))
    }

    pub fn post_empty(&self, segments: &[&str]) -> Result<Value> {
        let url = self.endpoint(segments)?;
        self.call(Method::POST, url, |rb| rb)
    }

    pub fn post_form(&self, segments: &[&str], form: &[(&str, String)]) -> Result<Value> {
        let url = self.endpoint(segments)?;
        self.call(Method::POST, url, |rb| rb.form(form))
    }

    pub fn put_form(&self, segments: &[&str], form: &[(&str, String)]) -> Result<Value> {
        let url = self.endpoint(segments)?;
        self.call(Method::PUT, url, |rb| rb.form(form))
    }

    pub fn post_multipart(&self, segments: &[&str], form: Form) -> Result<Value> {
        let url = self.endpoint(segments)?;
        self.call(Method::POST, url, |rb| rb.multipart(form))
    }

    pub fn delete(&self, segments: &[&str]) -> Result<Value> {
        let url = self.endpoint(segments)?;
        self.call(Method::DELETE, url, |rb| rb)
    }

    pub fn delete_json<B: Serialize + ?Sized>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<Value> {
        let url = self.endpoint(segments)?;
        self.call(Method::DELETE, url, |rb| rb.json(body))
    }

    /// POST a plain-text body and return the plain-text response.
    pub fn post_text<Q: Serialize + ?Sized>(
        &self,
        segments: &[&str],
        query: &Q,
        text: &str,
    ) -> Result<String> {
        let url = self.endpoint(segments)?;
        let method = Method::POST;
        let body = text.to_string();
        let resp = self.send(method.clone(), url.clone(), |rb| {
            rb.query(query)
                .header("Content-Type", "text/plain")
                .header("Accept", "text/plain")
                .body(body)
        })?;
        let status = resp.status();
        let raw = resp.text().map_err(|source| transport(&method, &url, source))?;
        if !status.is_success() {
            return Err(api_error(&method, &url, status.as_u16(), raw));
        }
        Ok(raw)
    }

    /// Stream a (pre-signed) file URL into `dest`. No credential is sent.
    pub fn download(&self, url: &str, dest: &mut dyn Write) -> Result<u64> {
        let url = Url::parse(url).map_err(|e| KbcError::invalid(format!("url '{url}': {e}")))?;
        tracing::debug!(%url, "download");
        let mut resp = self
            .http
            .get(url.clone())
            .send()
            .map_err(|source| transport(&Method::GET, &url, source))?;
        let status = resp.status();
        if !status.is_success() {
            let raw = resp.text().unwrap_or_default();
            return Err(api_error(&Method::GET, &url, status.as_u16(), raw));
        }
        resp.copy_to(dest)
            .map_err(|source| transport(&Method::GET, &url, source))
    }

    fn send(
        &self,
        method: Method,
        url: Url,
        build: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> Result<Response> {
        tracing::debug!(%method, %url, "request");
        let mut rb = self.http.request(method.clone(), url.clone());
        if let Some((name, value)) = self.credential.header() {
            rb = rb.header(name, value);
        }
        build(rb)
            .send()
            .map_err(|source| transport(&method, &url, source))
    }

    fn call(
        &self,
        method: Method,
        url: Url,
        build: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> Result<Value> {
        let resp = self.send(method.clone(), url.clone(), build)?;
        let status = resp.status();
        let raw = resp.text().map_err(|source| transport(&method, &url, source))?;
        if !status.is_success() {
            return Err(api_error(&method, &url, status.as_u16(), raw));
        }
        if raw.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&raw).map_err(|_| KbcError::Decode {
            method: method.to_string(),
            url: url.to_string(),
            raw,
        })
    }
}

fn transport(method: &Method, url: &Url, source: reqwest::Error) -> KbcError {
    KbcError::Transport {
        method: method.to_string(),
        url: url.to_string(),
        source,
    }
}

fn api_error(method: &Method, url: &Url, status: u16, raw: String) -> KbcError {
    let body = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
    KbcError::Api {
        method: method.to_string(),
        url: url.to_string(),
        status,
        body,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
