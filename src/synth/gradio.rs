//! Client for a Gradio-hosted QR art model
//!
//! Uses the Gradio call API: a POST submits the job and returns an event id,
//! a GET on that id streams server-sent events until the job completes or
//! fails, and the completed event references the output image file.

use super::{Scannability, SynthesisRequest, SynthesisResult, Synthesizer};
use crate::artifact::RasterAsset;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::{Duration, Instant};

const API_NAME: &str = "inference";

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    event_id: String,
}

/// Synthesizer backed by a remote Gradio app
#[derive(Clone)]
pub struct GradioSynthesizer {
    client: Client,
    endpoint: String,
    api_prefix: String,
    token: Option<String>,
}

impl std::fmt::Debug for GradioSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GradioSynthesizer")
            .field("endpoint", &self.endpoint)
            .field("api_prefix", &self.api_prefix)
            .finish_non_exhaustive()
    }
}

impl GradioSynthesizer {
    /// Create a client for the app at `endpoint`.
    ///
    /// `timeout` bounds each HTTP exchange, including the wait for the
    /// result stream.
    pub fn new(
        endpoint: &str,
        api_prefix: &str,
        token: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to build synthesis client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_prefix: api_prefix.trim_matches('/').to_string(),
            token,
        })
    }

    fn api_url(&self, tail: &str) -> String {
        if self.api_prefix.is_empty() {
            format!("{}/{}", self.endpoint, tail)
        } else {
            format!("{}/{}/{}", self.endpoint, self.api_prefix, tail)
        }
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn submit(&self, request: &SynthesisRequest) -> Result<String> {
        let response = self
            .authorized(self.client.post(self.api_url(&format!("call/{API_NAME}"))))
            .json(&json!({ "data": call_arguments(request) }))
            .send()
            .await
            .map_err(|e| Error::Synthesis(format!("Submit failed: {e}")))?;

        let submitted: SubmitResponse = checked(response, "submit")
            .await?
            .json()
            .await
            .map_err(|e| Error::Synthesis(format!("Malformed submit response: {e}")))?;
        Ok(submitted.event_id)
    }

    async fn await_result(&self, event_id: &str) -> Result<Value> {
        let response = self
            .authorized(
                self.client
                    .get(self.api_url(&format!("call/{API_NAME}/{event_id}"))),
            )
            .send()
            .await
            .map_err(|e| Error::Synthesis(format!("Result stream failed: {e}")))?;

        let body = checked(response, "result stream")
            .await?
            .text()
            .await
            .map_err(|e| Error::Synthesis(format!("Result stream interrupted: {e}")))?;

        parse_event_stream(&body)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .authorized(self.client.get(url))
            .send()
            .await
            .map_err(|e| Error::Synthesis(format!("Image download failed: {e}")))?;

        let bytes = checked(response, "image download")
            .await?
            .bytes()
            .await
            .map_err(|e| Error::Synthesis(format!("Image download interrupted: {e}")))?;
        Ok(bytes.to_vec())
    }

    /// Resolve the output file of a completed event to a downloadable URL.
    fn file_url(&self, data: &Value) -> Result<String> {
        let file = data
            .as_array()
            .and_then(|items| items.first())
            .ok_or_else(|| Error::Synthesis("Completed event carried no output".to_string()))?;

        if let Some(url) = file.get("url").and_then(Value::as_str) {
            return Ok(url.to_string());
        }

        let path = file
            .get("path")
            .and_then(Value::as_str)
            .or_else(|| file.as_str())
            .ok_or_else(|| Error::Synthesis(format!("Unrecognised output reference: {file}")))?;
        Ok(self.api_url(&format!("file={path}")))
    }
}

#[async_trait]
impl Synthesizer for GradioSynthesizer {
    async fn synthesize(&self, url: &str, prompt: &str) -> Result<SynthesisResult> {
        let request = SynthesisRequest::new(url, prompt);
        let started = Instant::now();
        tracing::info!(seed = request.seed, "Submitting synthesis job");

        let event_id = self.submit(&request).await?;
        let data = self.await_result(&event_id).await?;
        let bytes = self.download(&self.file_url(&data)?).await?;

        let image = image::load_from_memory(&bytes)
            .map_err(|e| Error::Synthesis(format!("Output is not a readable image: {e}")))?;

        tracing::info!(
            event_id = %event_id,
            seed = request.seed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            width = image.width(),
            height = image.height(),
            "Synthesis completed"
        );

        Ok(SynthesisResult {
            raster: RasterAsset::png(image),
            seed: request.seed,
            scannable: Scannability::Unknown,
        })
    }
}

async fn checked(response: Response, stage: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = response.text().await.unwrap_or_default();
    Err(Error::Synthesis(format!(
        "{stage} rejected with {status}: {}",
        detail.trim()
    )))
}

/// Positional arguments of the `inference` endpoint.
fn call_arguments(request: &SynthesisRequest) -> Value {
    json!([
        request.url,
        request.prompt,
        request.negative_prompt,
        request.guidance_scale,
        request.controlnet_scale,
        request.strength,
        request.seed,
        Value::Null, // init image
        Value::Null, // QR image override
        true,        // use the QR code as init image
        request.sampler,
    ])
}

/// Extract the payload of the `complete` event from a server-sent event body.
fn parse_event_stream(body: &str) -> Result<Value> {
    let mut event = "";
    for line in body.lines() {
        if let Some(name) = line.strip_prefix("event:") {
            event = name.trim();
        } else if let Some(data) = line.strip_prefix("data:") {
            let data = data.trim();
            match event {
                "complete" => {
                    return serde_json::from_str(data).map_err(|e| {
                        Error::Synthesis(format!("Malformed completion payload: {e}"))
                    });
                }
                "error" => {
                    let message = if data.is_empty() || data == "null" {
                        "remote model reported an error"
                    } else {
                        data
                    };
                    return Err(Error::Synthesis(message.to_string()));
                }
                _ => {}
            }
        }
    }
    Err(Error::Synthesis(
        "Result stream ended without completion".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthesizer() -> GradioSynthesizer {
        GradioSynthesizer::new("https://space.hf.space/", "/gradio_api/", None, None).unwrap()
    }

    #[test]
    fn arguments_follow_endpoint_order() {
        let request = SynthesisRequest::with_seed("https://example.com", "sunset", 7);
        let args = call_arguments(&request);
        let args = args.as_array().unwrap();

        assert_eq!(args.len(), 11);
        assert_eq!(args[0], "https://example.com");
        assert_eq!(args[3], 7.5);
        assert_eq!(args[6], 7);
        assert!(args[7].is_null());
        assert_eq!(args[9], true);
        assert_eq!(args[10], "DPM++ Karras SDE");
    }

    #[test]
    fn completed_stream_yields_payload() {
        let body = "event: generating\ndata: null\n\nevent: complete\ndata: [{\"path\": \"/tmp/out.png\", \"url\": \"https://space.hf.space/file=/tmp/out.png\"}]\n\n";
        let data = parse_event_stream(body).unwrap();
        assert_eq!(
            synthesizer().file_url(&data).unwrap(),
            "https://space.hf.space/file=/tmp/out.png"
        );
    }

    #[test]
    fn path_only_outputs_resolve_against_endpoint() {
        let data = json!([{ "path": "/tmp/gradio/abc.png" }]);
        assert_eq!(
            synthesizer().file_url(&data).unwrap(),
            "https://space.hf.space/gradio_api/file=/tmp/gradio/abc.png"
        );
    }

    #[test]
    fn error_events_become_synthesis_errors() {
        let body = "event: error\ndata: \"GPU quota exceeded\"\n\n";
        assert!(matches!(
            parse_event_stream(body),
            Err(Error::Synthesis(msg)) if msg.contains("quota")
        ));
        assert!(matches!(
            parse_event_stream("event: heartbeat\ndata: null\n"),
            Err(Error::Synthesis(_))
        ));
    }
}
