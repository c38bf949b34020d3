use std::time::Duration;

use log::trace;
use reqwest::{Client, header::CONTENT_TYPE};

use super::{HttpBackend, Request, Response, TransportFailure};

/// [HttpBackend] over reqwest
pub struct ReqwestBackend {
    client: Client,
    base_url: String,
}

impl ReqwestBackend {
    pub fn new(base_url: &str) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().build()?,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        })
    }
}

fn failure(e: reqwest::Error) -> TransportFailure {
    if e.is_timeout() {
        TransportFailure::Timeout
    } else {
        TransportFailure::Network(e.to_string())
    }
}

#[async_trait::async_trait]
impl HttpBackend for ReqwestBackend {
    async fn send(
        &self,
        request: &Request,
        token: Option<&str>,
        timeout: Duration,
    ) -> Result<Response, TransportFailure> {
        let url = format!("{}{}", self.base_url, request.path);

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .timeout(timeout)
            .header(CONTENT_TYPE, "application/json");

        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(failure)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(failure)?.to_vec();

        trace!("{} {} - {} ({} bytes)", request.method, url, status, body.len());
        Ok(Response { status, body })
    }
}
