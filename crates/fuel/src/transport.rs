use anyhow::{anyhow, Result};
use async_trait::async_trait;
use fuel_tools_core::protocol::{RestRequest, RestResponse};
use std::str::FromStr;
use surf::http::headers::HeaderName;

/// The network boundary. Implementations issue one request and report the
/// status and body; an `Err` means no response was obtained at all.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, request: RestRequest) -> Result<RestResponse>;
}

/// Production transport over surf, following up to `max_redirects`
/// redirects (archive downloads are usually served from a CDN).
pub struct SurfTransport {
    client: surf::Client,
}

impl SurfTransport {
    pub fn new() -> Self {
        Self::with_max_redirects(5)
    }

    pub fn with_max_redirects(max_redirects: u8) -> Self {
        Self {
            client: surf::Client::new().with(RedirectMiddleware::new(max_redirects)),
        }
    }
}

impl Default for SurfTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for SurfTransport {
    async fn request(&self, request: RestRequest) -> Result<RestResponse> {
        let url = surf::Url::parse(&request.url())
            .map_err(|e| anyhow!("Invalid request URL {}: {}", request.url(), e))?;

        let mut builder = surf::RequestBuilder::new(surf::http::Method::Get, url);
        for (name, value) in &request.headers {
            let name = HeaderName::from_str(name)
                .map_err(|e| anyhow!("Invalid header name {}: {}", name, e))?;
            builder = builder.header(name, value.as_str());
        }

        let mut response = self
            .client
            .send(builder.build())
            .await
            .map_err(|e| anyhow!("Surf request failed: {}", e))?;

        let status = response.status() as u16;
        let data = response
            .body_bytes()
            .await
            .map_err(|e| anyhow!("Reading response body failed: {}", e))?;

        Ok(RestResponse { status, data })
    }
}

/// Follows `3xx` responses, up to `max_hops` of them per request.
struct RedirectMiddleware {
    max_hops: u8,
}

impl RedirectMiddleware {
    fn new(max_hops: u8) -> Self {
        Self { max_hops }
    }
}

#[surf::utils::async_trait]
impl surf::middleware::Middleware for RedirectMiddleware {
    async fn handle(
        &self,
        req: surf::Request,
        client: surf::Client,
        next: surf::middleware::Next<'_>,
    ) -> surf::Result<surf::Response> {
        let mut req = req;
        for _ in 0..=self.max_hops {
            let response = next.run(req.clone(), client.clone()).await?;
            if !response.status().is_redirection() {
                return Ok(response);
            }
            let location = response
                .header("Location")
                .map(|values| values.last().as_str().to_string());
            let Some(location) = location else {
                return Ok(response);
            };
            req = follow_redirect(&req, &location)?;
            log::debug!("Following redirect to {}", req.url());
        }

        Err(surf::Error::from_str(
            surf::StatusCode::LoopDetected,
            format!("More than {} redirects", self.max_hops),
        ))
    }
}

/// The request to send after a redirect to `location`, which may be
/// relative to the previous URL. Headers such as `Accept` carry over.
fn follow_redirect(previous: &surf::Request, location: &str) -> surf::Result<surf::Request> {
    let url = surf::Url::parse(location)
        .or_else(|_| previous.url().join(location))
        .map_err(|_| {
            surf::Error::from_str(
                surf::StatusCode::BadGateway,
                format!("Invalid redirect location {}", location),
            )
        })?;

    let mut next = surf::Request::new(previous.method(), url);
    for (name, values) in previous.iter() {
        next.insert_header(name.clone(), values);
    }
    Ok(next)
}
