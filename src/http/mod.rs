use crate::catalog::{ApiHeaders, Transport};
use crate::error::CatalogError;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, instrument};

const HOST_HEADER: &str = "X-RapidAPI-Host";
const KEY_HEADER: &str = "X-RapidAPI-Key";

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Result<Self, CatalogError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("catalog-roulette/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    #[instrument(skip(self, headers), fields(url = %url))]
    pub async fn get(&self, url: &str, headers: &ApiHeaders) -> Result<Response, CatalogError> {
        debug!("Making GET request");
        let response = self
            .client
            .get(url)
            .header(HOST_HEADER, &headers.host)
            .header(KEY_HEADER, &headers.key)
            .send()
            .await?;

        if !response.status().is_success() {
            error!("HTTP request failed with status: {}", response.status());
            return Err(CatalogError::NetworkFailure(format!(
                "HTTP request failed: {}",
                response.status()
            )));
        }

        Ok(response)
    }

    #[instrument(skip(self, headers), fields(url = %url))]
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: &ApiHeaders,
    ) -> Result<T, CatalogError> {
        let response = self.get(url, headers).await?;
        response.json::<T>().await.map_err(|e| {
            if e.is_decode() {
                CatalogError::MalformedResponse(format!("response body is not valid JSON: {}", e))
            } else {
                e.into()
            }
        })
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn fetch(&self, url: &str, headers: &ApiHeaders) -> Result<Value, CatalogError> {
        self.get_json(url, headers).await
    }
}
