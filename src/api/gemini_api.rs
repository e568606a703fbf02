use crate::config::Config;
use crate::error::{GeminiError, NexusError};
use crate::types::gemini::{GeminiResponse, GenerateContentRequest};
use eventsource_stream::Eventsource;
use futures::FutureExt;
use futures::future::BoxFuture;
use futures::stream::{BoxStream, StreamExt};
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

/// Incremental `streamGenerateContent` responses, one per SSE event.
pub type GeminiStream = BoxStream<'static, Result<GeminiResponse, NexusError>>;

/// The two Gemini RPCs the gateway needs.
pub trait GeminiTransport: Send + Sync {
    fn generate<'a>(
        &'a self,
        model: &'a str,
        body: &'a GenerateContentRequest,
    ) -> BoxFuture<'a, Result<GeminiResponse, NexusError>>;

    /// Resolves once response headers arrive; chunks are pulled lazily after that.
    fn stream_generate<'a>(
        &'a self,
        model: &'a str,
        body: &'a GenerateContentRequest,
    ) -> BoxFuture<'a, Result<GeminiStream, NexusError>>;
}

/// Gemini REST client authenticated with an API key.
///
/// No request timeout and no retries are applied to model calls.
pub struct GeminiApi {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl GeminiApi {
    pub fn new(cfg: &Config, api_key: impl Into<String>) -> Result<Self, NexusError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("aisuite-nexus/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10));
        if let Some(proxy_url) = cfg.proxy.as_ref() {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url.as_str())?);
        }
        Ok(Self {
            client: builder.build()?,
            base_url: cfg.gemini_base_url.clone(),
            api_key: api_key.into(),
        })
    }

    fn endpoint(&self, model: &str, rpc: &str) -> Result<Url, NexusError> {
        Ok(self.base_url.join(&format!("models/{model}:{rpc}"))?)
    }

    async fn post(
        &self,
        url: Url,
        body: &GenerateContentRequest,
    ) -> Result<reqwest::Response, NexusError> {
        let resp = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let bytes = resp.bytes().await?;
        match serde_json::from_slice::<GeminiError>(&bytes) {
            Ok(gemini_err) => {
                error!(
                    status = %status,
                    upstream = %gemini_err.error.status,
                    message = %gemini_err.error.message,
                    "Gemini API returned an error"
                );
                Err(NexusError::GeminiServerError(gemini_err))
            }
            Err(_) => {
                error!(status = %status, "Gemini API returned a non-JSON error body");
                Err(NexusError::UpstreamStatus(status))
            }
        }
    }
}

impl GeminiTransport for GeminiApi {
    fn generate<'a>(
        &'a self,
        model: &'a str,
        body: &'a GenerateContentRequest,
    ) -> BoxFuture<'a, Result<GeminiResponse, NexusError>> {
        async move {
            let url = self.endpoint(model, "generateContent")?;
            let resp = self.post(url, body).await?;
            Ok::<_, NexusError>(resp.json::<GeminiResponse>().await?)
        }
        .boxed()
    }

    fn stream_generate<'a>(
        &'a self,
        model: &'a str,
        body: &'a GenerateContentRequest,
    ) -> BoxFuture<'a, Result<GeminiStream, NexusError>> {
        async move {
            let mut url = self.endpoint(model, "streamGenerateContent")?;
            url.query_pairs_mut().append_pair("alt", "sse");
            let resp = self.post(url, body).await?;
            debug!(model, "Gemini stream opened");

            let events = resp
                .bytes_stream()
                .eventsource()
                .filter(|event| {
                    let keep = !matches!(event, Ok(ev) if ev.data.trim().is_empty());
                    futures::future::ready(keep)
                })
                .map(|event| -> Result<GeminiResponse, NexusError> {
                    let event = event.map_err(|e| NexusError::EventStream(e.to_string()))?;
                    Ok(serde_json::from_str::<GeminiResponse>(&event.data)?)
                })
                .boxed();
            Ok::<GeminiStream, NexusError>(events)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_are_resolved_under_models() {
        let cfg = Config::default();
        let api = GeminiApi::new(&cfg, "key").unwrap();
        let url = api.endpoint("gemini-2.5-flash", "generateContent").unwrap();
        assert_eq!(
            url.as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }
}
