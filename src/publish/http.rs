//! HTTP transport
//!
//! The submitter and poller talk to the backend through `HttpTransport`,
//! which keeps them runtime- and client-agnostic. `ReqwestTransport` is the
//! production implementation.

use crate::config::PipelineConfig;
use crate::utils::error::{CaptureError, CaptureResult};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// One part of a multipart form
#[derive(Debug, Clone)]
pub enum FormPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        mime_type: String,
        data: Arc<[u8]>,
    },
}

impl FormPart {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        FormPart::Text {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            FormPart::Text { name, .. } | FormPart::File { name, .. } => name,
        }
    }
}

/// A buffered HTTP response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status_code: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status_code: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status_code,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Runtime-agnostic HTTP client used by the publish pipeline.
///
/// Errors mean the request never produced a response; any response,
/// including non-2xx, is returned as `Ok`.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn post_multipart(&self, url: &str, parts: Vec<FormPart>) -> Result<HttpResponse>;

    async fn get(&self, url: &str) -> Result<HttpResponse>;
}

/// `reqwest`-backed transport
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Client with the configured request timeout
    pub fn from_config(config: &PipelineConfig) -> CaptureResult<Self> {
        Self::new(config.request_timeout())
            .map_err(|e| CaptureError::Config(format!("cannot build HTTP client: {:#}", e)))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn read(response: reqwest::Response) -> Result<HttpResponse> {
        let status_code = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        Ok(HttpResponse { status_code, body })
    }
}

/// Content type for a file part. Codec parameters such as
/// `codecs=vp9,opus` are not valid header tokens, so only the container
/// type is sent.
fn part_content_type(mime_type: &str) -> &str {
    mime_type.split(';').next().unwrap_or(mime_type).trim()
}

fn build_form(parts: Vec<FormPart>) -> Result<reqwest::multipart::Form> {
    let mut form = reqwest::multipart::Form::new();
    for part in parts {
        form = match part {
            FormPart::Text { name, value } => form.text(name, value),
            FormPart::File {
                name,
                file_name,
                mime_type,
                data,
            } => {
                let file = reqwest::multipart::Part::bytes(data.to_vec())
                    .file_name(file_name)
                    .mime_str(part_content_type(&mime_type))?;
                form.part(name, file)
            }
        };
    }
    Ok(form)
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_multipart(&self, url: &str, parts: Vec<FormPart>) -> Result<HttpResponse> {
        let form = build_form(parts)?;
        let response = self.client.post(url).multipart(form).send().await?;
        Self::read(response).await
    }

    async fn get(&self, url: &str) -> Result<HttpResponse> {
        let response = self.client.get(url).send().await?;
        Self::read(response).await
    }
}
