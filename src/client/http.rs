use crate::{
    client::{
        types::{
            CollectionSchema, CreateIndexRequest, Entities, IndexParams, QueryRequest,
            SearchRequest, SearchResult,
        },
        validate_collection_name, VectorClient,
    },
    error::{ClientError, ClientResult},
};
use ::http::{StatusCode, Uri};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};

type ResponseTime = f64;

#[derive(Deserialize)]
pub struct ApiSuccessResponse<T> {
    pub result: T,
    #[allow(dead_code)]
    pub time: ResponseTime,
}

#[derive(Deserialize)]
pub struct ApiErrorResponse {
    pub error: String,
    #[allow(dead_code)]
    pub time: ResponseTime,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub enum ApiResponse<T> {
    Success(ApiSuccessResponse<T>),
    Error(ApiErrorResponse),
}

/// Client for the JSON REST API of a vector database node.
pub struct HttpClient {
    base_url: String,
    client: reqwest::Client,
    connected: AtomicBool,
}

impl HttpClient {
    /// Builds a client without touching the network. Call [`VectorClient::connect`] before use.
    pub fn new(uri: &Uri) -> Self {
        HttpClient {
            base_url: uri.to_string().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            connected: AtomicBool::new(false),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn ensure_connected(&self) -> ClientResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(ClientError::Disconnected)
        }
    }

    /// Validates the name and checks the connection before any request is sent.
    fn collection_url(&self, name: &str) -> ClientResult<String> {
        validate_collection_name(name)?;
        self.ensure_connected()?;
        Ok(format!("{}/collections/{name}", self.base_url))
    }

    async fn read_envelope<T: DeserializeOwned>(res: reqwest::Response) -> ClientResult<T> {
        let status = res.status();
        let text = res.text().await?;

        if status == StatusCode::NOT_FOUND {
            let message = match serde_json::from_str::<ApiErrorResponse>(&text) {
                Ok(body) => body.error,
                Err(_) => text,
            };
            return Err(ClientError::NotFound(message));
        }

        let body: ApiResponse<T> = serde_json::from_str(&text)?;

        match body {
            ApiResponse::Success(body) => Ok(body.result),
            ApiResponse::Error(res) if status.is_client_error() => {
                Err(ClientError::BadInput(res.error))
            }
            ApiResponse::Error(res) => Err(ClientError::Server(res.error)),
        }
    }
}

#[async_trait]
impl VectorClient for HttpClient {
    async fn connect(&self) -> ClientResult<()> {
        let res = self
            .client
            .get(format!("{}/", self.base_url))
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(ClientError::Server(format!(
                "Health check at {} returned {}",
                self.base_url,
                res.status()
            )));
        }

        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn has_collection(&self, name: &str) -> ClientResult<bool> {
        let url = self.collection_url(name)?;
        let res = self.client.get(url).send().await?;

        match Self::read_envelope::<Value>(res).await {
            Ok(_) => Ok(true),
            Err(ClientError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create_collection(&self, name: &str, schema: &CollectionSchema) -> ClientResult<()> {
        let url = self.collection_url(name)?;
        let res = self.client.put(url).json(schema).send().await?;
        Self::read_envelope::<Value>(res).await.map(|_| ())
    }

    async fn drop_collection(&self, name: &str) -> ClientResult<()> {
        let url = self.collection_url(name)?;
        let res = self.client.delete(url).send().await?;
        Self::read_envelope::<Value>(res).await.map(|_| ())
    }

    async fn load_collection(&self, name: &str) -> ClientResult<()> {
        let url = self.collection_url(name)?;
        let res = self.client.post(format!("{url}/load")).send().await?;
        Self::read_envelope::<Value>(res).await.map(|_| ())
    }

    async fn insert(&self, name: &str, entities: &Entities) -> ClientResult<u64> {
        let url = self.collection_url(name)?;
        let res = self
            .client
            .put(format!("{url}/points"))
            .json(&json!({ "entities": entities }))
            .send()
            .await?;
        Self::read_envelope(res).await
    }

    async fn num_entities(&self, name: &str) -> ClientResult<u64> {
        let url = self.collection_url(name)?;
        let res = self.client.post(format!("{url}/flush")).send().await?;
        Self::read_envelope(res).await
    }

    async fn search(&self, name: &str, request: &SearchRequest) -> ClientResult<SearchResult> {
        let url = self.collection_url(name)?;
        let res = self
            .client
            .post(format!("{url}/points/search"))
            .json(request)
            .send()
            .await?;
        Self::read_envelope(res).await
    }

    async fn query(&self, name: &str, expr: &str) -> ClientResult<Vec<Value>> {
        let url = self.collection_url(name)?;
        let res = self
            .client
            .post(format!("{url}/points/query"))
            .json(&QueryRequest {
                expr: expr.to_string(),
            })
            .send()
            .await?;
        Self::read_envelope(res).await
    }

    async fn create_index(
        &self,
        name: &str,
        field_name: &str,
        params: &IndexParams,
        index_name: &str,
    ) -> ClientResult<()> {
        let url = self.collection_url(name)?;
        let res = self
            .client
            .put(format!("{url}/index"))
            .json(&CreateIndexRequest {
                field_name: field_name.to_string(),
                index_name: index_name.to_string(),
                params: params.clone(),
            })
            .send()
            .await?;
        Self::read_envelope::<Value>(res).await.map(|_| ())
    }

    async fn drop_index(&self, name: &str) -> ClientResult<()> {
        let url = self.collection_url(name)?;
        let res = self.client.delete(format!("{url}/index")).send().await?;
        Self::read_envelope::<Value>(res).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[tokio::test]
    async fn test_rejects_before_any_request() {
        // Nothing listens on this port; every call must fail locally.
        let client = HttpClient::new(&Uri::from_str("http://127.0.0.1:1").unwrap());

        assert!(matches!(
            client.has_collection("").await,
            Err(ClientError::InvalidName(_))
        ));
        assert!(matches!(
            client.has_collection("c1").await,
            Err(ClientError::Disconnected)
        ));
    }

    #[test]
    fn test_base_url_has_no_trailing_slash() {
        let client = HttpClient::new(&Uri::from_str("http://localhost:9001").unwrap());
        assert_eq!(client.base_url(), "http://localhost:9001");
    }
}
