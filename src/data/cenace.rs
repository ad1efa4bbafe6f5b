//! CENACE demand web service client.
//!
//! The service is undocumented and has changed shape more than once, so this
//! module only knows how to *address* it (URL or JSON body per batch) and how
//! to move bytes. Interpreting the payload is `io::normalize`'s job.

use chrono::{Datelike, NaiveDateTime};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde_json::json;

use crate::domain::{Batch, Endpoint, RequestStyle};
use crate::error::{AppError, FetchError};

pub const DEFAULT_BASE_URL: &str = "https://ws01.cenace.gob.mx:8082/SWEDREZC/SIM";

/// The service rejects requests without a browser-like user agent.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0";

/// How much of an error body is kept for diagnostics.
pub const SNIPPET_LEN: usize = 300;

/// One fully-addressed request for a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Get { url: String },
    Post { url: String, body: serde_json::Value },
}

impl Request {
    pub fn for_batch(endpoint: &Endpoint, batch: &Batch) -> Self {
        let base = endpoint.base_url.trim_end_matches('/');
        let system = batch.system.code();
        let zone = batch.system.zone();
        match endpoint.style {
            RequestStyle::Path => Request::Get {
                url: format!(
                    "{base}/{system}/{zone}/{}/{}/JSON",
                    path_date(batch.range_start),
                    path_date(batch.range_end),
                ),
            },
            RequestStyle::JsonBody => Request::Post {
                url: base.to_string(),
                body: json!({
                    "sistema": system,
                    "zonaCarga": zone,
                    "fechaInicial": batch.range_start.format("%d/%m/%Y").to_string(),
                    "fechaFinal": batch.range_end.format("%d/%m/%Y").to_string(),
                }),
            },
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Request::Get { url } | Request::Post { url, .. } => url,
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            Request::Get { .. } => "GET",
            Request::Post { .. } => "POST",
        }
    }
}

fn path_date(ts: NaiveDateTime) -> String {
    format!("{:04}/{:02}/{:02}", ts.year(), ts.month(), ts.day())
}

/// Certificate verification mode for a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    Strict,
    /// Accept invalid certificates. Only used for the single retry after a
    /// transport failure.
    Relaxed,
}

/// Raw HTTP outcome: status plus body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn snippet(&self) -> String {
        snippet(&self.body)
    }
}

pub fn snippet(body: &str) -> String {
    body.chars().take(SNIPPET_LEN).collect()
}

/// Moves one request over the wire.
///
/// `CenaceClient` is the real implementation; tests substitute fakes that
/// count calls.
pub trait Transport {
    fn send(&self, request: &Request, tls: TlsMode) -> Result<RawResponse, FetchError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &Request, tls: TlsMode) -> Result<RawResponse, FetchError> {
        (**self).send(request, tls)
    }
}

/// Blocking HTTP client with a bounded per-request timeout.
pub struct CenaceClient {
    strict: Client,
    relaxed: Client,
}

impl CenaceClient {
    pub fn new(timeout: std::time::Duration) -> Result<Self, AppError> {
        let strict = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::new(4, format!("Failed to build HTTP client: {e}")))?;
        let relaxed = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| AppError::new(4, format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { strict, relaxed })
    }

    fn client(&self, tls: TlsMode) -> &Client {
        match tls {
            TlsMode::Strict => &self.strict,
            TlsMode::Relaxed => &self.relaxed,
        }
    }
}

impl Transport for CenaceClient {
    fn send(&self, request: &Request, tls: TlsMode) -> Result<RawResponse, FetchError> {
        let client = self.client(tls);
        let builder = match request {
            Request::Get { url } => client.get(url),
            Request::Post { url, body } => client.post(url).json(body),
        };

        let resp = builder
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .header(ACCEPT, "application/json")
            .send()
            .map_err(|e| FetchError::Transport {
                url: request.url().to_string(),
                message: e.to_string(),
            })?;

        let status = resp.status().as_u16();
        let body = resp.text().map_err(|e| FetchError::Transport {
            url: request.url().to_string(),
            message: format!("failed to read body: {e}"),
        })?;

        Ok(RawResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DEFAULT_TIMEOUT, System};
    use chrono::NaiveDate;

    fn batch() -> Batch {
        Batch {
            system: System::Bca,
            range_start: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
            range_end: NaiveDate::from_ymd_opt(2025, 1, 8).unwrap().and_hms_opt(0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn path_style_encodes_dates_as_segments() {
        let endpoint = Endpoint {
            base_url: format!("{DEFAULT_BASE_URL}/"),
            style: RequestStyle::Path,
            timeout: DEFAULT_TIMEOUT,
        };
        let req = Request::for_batch(&endpoint, &batch());
        assert_eq!(req.method(), "GET");
        assert_eq!(
            req.url(),
            "https://ws01.cenace.gob.mx:8082/SWEDREZC/SIM/BCA/BCA/2025/01/01/2025/01/08/JSON"
        );
    }

    #[test]
    fn json_body_style_uses_day_first_dates() {
        let endpoint = Endpoint {
            base_url: "https://example.invalid/Demanda.aspx/Obtener".to_string(),
            style: RequestStyle::JsonBody,
            timeout: DEFAULT_TIMEOUT,
        };
        let req = Request::for_batch(&endpoint, &batch());
        let Request::Post { url, body } = req else {
            panic!("expected POST");
        };
        assert_eq!(url, "https://example.invalid/Demanda.aspx/Obtener");
        assert_eq!(body["sistema"], "BCA");
        assert_eq!(body["fechaInicial"], "01/01/2025");
        assert_eq!(body["fechaFinal"], "08/01/2025");
    }

    #[test]
    fn snippet_is_bounded() {
        let body = "x".repeat(1000);
        assert_eq!(snippet(&body).len(), SNIPPET_LEN);
        assert_eq!(snippet("short"), "short");
    }
}
