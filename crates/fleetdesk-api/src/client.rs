// Directory API HTTP client
//
// Wraps `reqwest::Client` with directory-specific URL construction and
// error-body parsing. The endpoint groups (devices, users, org units) are
// implemented as inherent methods in sibling modules so this file only
// deals with transport mechanics.

use secrecy::SecretString;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;
use crate::types::ErrorEnvelope;

/// Customer alias that resolves to the account owning the token.
pub const DEFAULT_CUSTOMER: &str = "my_customer";

/// Async client for the directory API.
///
/// Every path is rooted at `{base}/admin/directory/v1/`. Methods return
/// decoded payloads; non-2xx responses become typed [`Error`] values.
pub struct DirectoryClient {
    http: reqwest::Client,
    base_url: Url,
    customer: String,
}

impl DirectoryClient {
    // ── Constructors ─────────────────────────────────────────────────

    /// Build from a bearer token and transport config.
    pub fn new(
        base_url: &str,
        customer: impl Into<String>,
        token: &SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client(token)?;
        Self::from_reqwest(base_url, customer, http)
    }

    /// Wrap an existing `reqwest::Client` (caller manages auth headers).
    pub fn from_reqwest(
        base_url: &str,
        customer: impl Into<String>,
        http: reqwest::Client,
    ) -> Result<Self, Error> {
        let mut url = Url::parse(base_url)?;
        if url.cannot_be_a_base() {
            return Err(Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase));
        }
        let path = url.path().trim_end_matches('/').to_owned();
        url.set_path(&format!("{path}/"));

        Ok(Self {
            http,
            base_url: url,
            customer: customer.into(),
        })
    }

    /// The customer identifier used in customer-scoped paths.
    pub fn customer(&self) -> &str {
        &self.customer
    }

    /// The directory base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// `{base}/admin/directory/v1/{segments...}`, each segment percent-encoded.
    pub(crate) fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .extend(["admin", "directory", "v1"])
                .extend(segments);
        }
        url
    }

    /// `{base}/admin/directory/v1/customer/{customer}/{segments...}`
    pub(crate) fn customer_url(&self, segments: &[&str]) -> Url {
        let mut all = vec!["customer", self.customer.as_str()];
        all.extend_from_slice(segments);
        self.url(&all)
    }

    // ── HTTP verbs ───────────────────────────────────────────────────

    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        url: Url,
        params: &[(&str, String)],
    ) -> Result<T, Error> {
        debug!("GET {url} params={params:?}");

        let resp = self.http.get(url).query(params).send().await?;
        self.handle_response(resp).await
    }

    pub(crate) async fn post<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        url: Url,
        params: &[(&str, String)],
        body: &B,
    ) -> Result<T, Error> {
        debug!("POST {url}");

        let resp = self.http.post(url).query(params).json(body).send().await?;
        self.handle_response(resp).await
    }

    pub(crate) async fn post_no_response<B: Serialize + Sync>(
        &self,
        url: Url,
        params: &[(&str, String)],
        body: &B,
    ) -> Result<(), Error> {
        debug!("POST {url} params={params:?}");

        let resp = self.http.post(url).query(params).json(body).send().await?;
        self.handle_empty(resp).await
    }

    pub(crate) async fn put<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<T, Error> {
        debug!("PUT {url}");

        let resp = self.http.put(url).json(body).send().await?;
        self.handle_response(resp).await
    }

    // ── Response handling ────────────────────────────────────────────

    async fn handle_response<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, Error> {
        let status = resp.status();
        if status.is_success() {
            let body = resp.text().await?;
            serde_json::from_str(&body).map_err(|e| {
                let preview: String = body.chars().take(200).collect();
                Error::Deserialization {
                    message: format!("{e} (body preview: {preview:?})"),
                    body,
                }
            })
        } else {
            Err(self.parse_error(resp).await)
        }
    }

    async fn handle_empty(&self, resp: reqwest::Response) -> Result<(), Error> {
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(self.parse_error(resp).await)
        }
    }

    async fn parse_error(&self, resp: reqwest::Response) -> Error {
        let status = resp.status();
        let resource = resp.url().path().to_owned();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(1);
            return Error::RateLimited { retry_after_secs };
        }

        let raw = resp.text().await.unwrap_or_default();
        let (message, reason) = match serde_json::from_str::<ErrorEnvelope>(&raw) {
            Ok(envelope) => (
                envelope.error.message.unwrap_or_else(|| status.to_string()),
                envelope.error.errors.into_iter().find_map(|d| d.reason),
            ),
            Err(_) if raw.is_empty() => (status.to_string(), None),
            Err(_) => (raw, None),
        };

        match status {
            reqwest::StatusCode::UNAUTHORIZED => Error::Unauthorized { message },
            reqwest::StatusCode::FORBIDDEN => Error::Forbidden { message },
            reqwest::StatusCode::NOT_FOUND => Error::NotFound { resource },
            _ => Error::Api {
                status: status.as_u16(),
                message,
                reason,
            },
        }
    }
}
