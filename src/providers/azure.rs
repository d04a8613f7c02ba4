//! Azure OpenAI adaptor.
//!
//! Same wire dialect as OpenAI, but deployment-based URLs and `api-key`
//! header auth. The deployment name is the upstream model name.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;

use crate::error::RelayError;
use crate::providers::openai;
use crate::relay::adaptor::{Adaptor, RelayOutcome, unsupported_mode};
use crate::relay::context::RelayContext;
use crate::relay::mode::RelayMode;
use crate::relay::provider::ProviderKind;
use crate::types::CanonicalRequest;

const API_VERSION: &str = "2024-06-01";

pub struct AzureAdaptor {
    http: reqwest::Client,
}

impl AzureAdaptor {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn headers(ctx: &RelayContext) -> Result<HeaderMap, RelayError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "api-key",
            HeaderValue::from_str(ctx.api_key.expose_secret())
                .map_err(|e| RelayError::InvalidRequest(format!("invalid api key: {e}")))?,
        );
        Ok(headers)
    }
}

#[async_trait]
impl Adaptor for AzureAdaptor {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Azure
    }

    fn init(&self, ctx: &RelayContext) -> Result<(), RelayError> {
        if !matches!(
            ctx.mode,
            RelayMode::ChatCompletions | RelayMode::Embeddings | RelayMode::ImagesGenerations
        ) {
            return Err(unsupported_mode(ctx));
        }
        if ctx.base_url.is_empty() {
            return Err(RelayError::InvalidRequest(
                "azure requires a resource endpoint".into(),
            ));
        }
        if ctx.model.is_empty() {
            return Err(RelayError::InvalidRequest("missing deployment name".into()));
        }
        Ok(())
    }

    fn build_request_url(&self, ctx: &RelayContext) -> Result<String, RelayError> {
        Ok(format!(
            "{}/openai/deployments/{}{}?api-version={}",
            ctx.endpoint_root(),
            ctx.model,
            openai::dialect_route(ctx.mode),
            API_VERSION
        ))
    }

    async fn do_request(
        &self,
        ctx: &RelayContext,
        request: &CanonicalRequest,
    ) -> Result<reqwest::Response, RelayError> {
        let url = self.build_request_url(ctx)?;
        let body = openai::build_json_body(ctx, request, true)?;
        let builder = self
            .http
            .post(url)
            .headers(Self::headers(ctx)?)
            .json(&body);
        openai::apply_deadline(builder, ctx)
            .send()
            .await
            .map_err(RelayError::from)
    }

    async fn do_response(
        &self,
        response: reqwest::Response,
        ctx: &RelayContext,
    ) -> Result<RelayOutcome, RelayError> {
        openai::dialect_do_response(response, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deployment_url_shape() {
        let adaptor = AzureAdaptor::new(reqwest::Client::new());
        let ctx = RelayContext::builder(ProviderKind::Azure, RelayMode::ChatCompletions)
            .base_url("https://my-resource.openai.azure.com")
            .api_key("key")
            .model("gpt-4o-deployment")
            .build();
        assert_eq!(
            adaptor.build_request_url(&ctx).unwrap(),
            format!(
                "https://my-resource.openai.azure.com/openai/deployments/gpt-4o-deployment/chat/completions?api-version={API_VERSION}"
            )
        );
    }

    #[test]
    fn missing_endpoint_fails_init() {
        let adaptor = AzureAdaptor::new(reqwest::Client::new());
        let ctx = RelayContext::builder(ProviderKind::Azure, RelayMode::ChatCompletions)
            .api_key("key")
            .model("dep")
            .build();
        assert!(adaptor.init(&ctx).is_err());
    }
}
