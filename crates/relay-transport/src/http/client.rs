//! HTTP gateway capability implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use relay_core::{
    CommandRequest, CommandResponse, EndpointConfig, GatewayCapability, GatewayError,
    GatewayReply, GatewayResult, LinkRequest, LinkResponse, Quote,
};

/// Header carrying the pre-shared endpoint key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Path of the random-quote lookup below the quote endpoint.
pub const QUOTE_PATH: &str = "rexpl/";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Backend gateway over HTTP POST with JSON bodies.
///
/// One endpoint serves commands, another serves link titles. Each request
/// carries the endpoint's key in the `x-api-key` header. An optional quote
/// service is read with GET and a `Token` authorization header.
pub struct HttpGateway {
    client: Client,
    command: EndpointConfig,
    link: EndpointConfig,
    quote: Option<EndpointConfig>,
}

impl HttpGateway {
    /// Creates a gateway with the given request timeout.
    pub fn new(
        command: EndpointConfig,
        link: EndpointConfig,
        timeout: Duration,
    ) -> GatewayResult<Self> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        info!(command = %command.url, link = %link.url, "HTTP gateway ready");
        Ok(Self {
            client,
            command,
            link,
            quote: None,
        })
    }

    /// Enables the quote service.
    pub fn with_quote_endpoint(mut self, quote: EndpointConfig) -> Self {
        info!(quote = %quote.url, "Quote service enabled");
        self.quote = Some(quote);
        self
    }

    /// Creates a gateway with [`DEFAULT_TIMEOUT`].
    pub fn with_default_timeout(
        command: EndpointConfig,
        link: EndpointConfig,
    ) -> GatewayResult<Self> {
        Self::new(command, link, DEFAULT_TIMEOUT)
    }

    async fn post_json<Req, Resp>(
        &self,
        endpoint: &EndpointConfig,
        body: &Req,
    ) -> GatewayResult<String>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned + GatewayReply,
    {
        let payload =
            serde_json::to_vec(body).map_err(|e| GatewayError::Serialization(e.to_string()))?;

        let resp = self
            .client
            .post(&endpoint.url)
            .header(API_KEY_HEADER, &endpoint.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        debug!(url = %endpoint.url, status = status.as_u16(), len = text.len(), "Gateway responded");

        // A backend may report errorMessage alongside a failure status.
        match serde_json::from_str::<Resp>(&text) {
            Ok(reply) => reply.into_result(),
            Err(_) if !status.is_success() => Err(GatewayError::Status {
                status: status.as_u16(),
                body: text,
            }),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl GatewayCapability for HttpGateway {
    async fn run_command(&self, request: &CommandRequest) -> GatewayResult<String> {
        self.post_json::<_, CommandResponse>(&self.command, request)
            .await
    }

    async fn fetch_title(&self, request: &LinkRequest) -> GatewayResult<String> {
        self.post_json::<_, LinkResponse>(&self.link, request).await
    }

    async fn fetch_quote(&self, topic: &str) -> GatewayResult<Option<Quote>> {
        let Some(endpoint) = &self.quote else {
            return Ok(None);
        };
        let base = format!("{}/{QUOTE_PATH}", endpoint.url.trim_end_matches('/'));
        let url = if topic.is_empty() {
            reqwest::Url::parse(&base)
        } else {
            reqwest::Url::parse_with_params(&base, &[("q", topic)])
        }
        .map_err(|e| GatewayError::Transport(format!("invalid quote URL {base}: {e}")))?;

        let request = self.client.get(url.clone()).header(
            reqwest::header::AUTHORIZATION,
            format!("Token {}", endpoint.api_key),
        );

        let resp = request
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        debug!(url = %url, status = status.as_u16(), len = text.len(), "Quote service responded");

        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(Some(serde_json::from_str(&text)?))
    }
}
