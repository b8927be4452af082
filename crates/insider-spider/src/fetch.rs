use crate::error::FetchError;
use crate::http::*;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::trace;

/// Fallback when `USER_AGENT` is not set; openinsider & Yahoo both reject
/// the default reqwest agent.
const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Transport contract: GET a url and return the body text.
pub trait Fetch: Send + Sync {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, FetchError>> + Send + 'a>>;
}

/// reqwest-backed transport.
#[derive(Clone, Debug)]
pub struct ReqwestFetcher {
    client: HttpClient,
}

impl ReqwestFetcher {
    /// Build a client with a per-request `timeout`; the user agent is read from
    /// the `USER_AGENT` env var.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let user_agent = var("USER_AGENT").unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string());
        let client = reqwest::ClientBuilder::new()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl Fetch for ReqwestFetcher {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, FetchError>> + Send + 'a>> {
        Box::pin(async move {
            trace!("GET {url}");
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|err| classify(url, err))?;

            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::HttpStatus {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            response.text().await.map_err(|err| classify(url, err))
        })
    }
}

fn classify(url: &str, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else if let Some(status) = err.status() {
        FetchError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        }
    } else {
        FetchError::Connection {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }
}
