pub mod http;
pub mod memory;
pub mod types;

use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use serde_json::Value;
use std::{future::Future, sync::Arc, time::Duration};
use tokio::time::Instant;
use types::{CollectionSchema, Entities, IndexParams, SearchRequest, SearchResult, Timed};

pub const MAX_COLLECTION_NAME_LEN: usize = 255;

/// Operations the harness needs from a vector database.
///
/// Implementations reject malformed collection names before doing any I/O and
/// fail every call with [`ClientError::Disconnected`] once disconnected.
#[async_trait]
pub trait VectorClient: Send + Sync {
    async fn connect(&self) -> ClientResult<()>;
    fn disconnect(&self);
    fn is_connected(&self) -> bool;

    async fn has_collection(&self, name: &str) -> ClientResult<bool>;
    async fn create_collection(&self, name: &str, schema: &CollectionSchema) -> ClientResult<()>;
    async fn drop_collection(&self, name: &str) -> ClientResult<()>;
    async fn load_collection(&self, name: &str) -> ClientResult<()>;

    /// Returns the number of inserted rows.
    async fn insert(&self, name: &str, entities: &Entities) -> ClientResult<u64>;
    /// Flushes pending inserts and returns the persisted row count.
    async fn num_entities(&self, name: &str) -> ClientResult<u64>;
    async fn search(&self, name: &str, request: &SearchRequest) -> ClientResult<SearchResult>;
    async fn query(&self, name: &str, expr: &str) -> ClientResult<Vec<Value>>;

    async fn create_index(
        &self,
        name: &str,
        field_name: &str,
        params: &IndexParams,
        index_name: &str,
    ) -> ClientResult<()>;
    async fn drop_index(&self, name: &str) -> ClientResult<()>;
}

pub fn validate_collection_name(name: &str) -> ClientResult<()> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(ClientError::InvalidName(
            "collection name should not be empty".to_string(),
        ));
    };

    if name.chars().count() > MAX_COLLECTION_NAME_LEN {
        return Err(ClientError::InvalidName(format!(
            "the length of a collection name must be less than {MAX_COLLECTION_NAME_LEN} characters"
        )));
    }

    if first != '_' && !first.is_ascii_alphabetic() {
        return Err(ClientError::InvalidName(format!(
            "the first character of collection name '{name}' must be an underscore or a letter"
        )));
    }

    if chars.any(|c| c != '_' && !c.is_ascii_alphanumeric()) {
        return Err(ClientError::InvalidName(format!(
            "collection name '{name}' can only contain numbers, letters and underscores"
        )));
    }

    Ok(())
}

/// Entry point for callers holding an optional name, e.g. from user input.
pub fn parse_collection_name(raw: Option<&str>) -> ClientResult<&str> {
    let name = raw.ok_or_else(|| {
        ClientError::InvalidName("collection name should not be None".to_string())
    })?;
    validate_collection_name(name)?;
    Ok(name)
}

/// Runs a client call under `timeout` and records how long it took.
pub async fn timed<Fut, T>(timeout: Duration, future: Fut) -> ClientResult<Timed<T>>
where
    Fut: Future<Output = ClientResult<T>>,
{
    let instant = Instant::now();
    let result = tokio::time::timeout(timeout, future)
        .await
        .map_err(|_| ClientError::Timeout(timeout))??;

    Ok(Timed {
        result,
        time: instant.elapsed().as_secs_f64(),
    })
}

/// A collection bound to a client and a per-call timeout.
#[derive(Clone)]
pub struct CollectionWrapper {
    client: Arc<dyn VectorClient>,
    name: String,
    timeout: Duration,
}

impl CollectionWrapper {
    /// Creates the collection and returns a handle to it.
    pub async fn init_collection(
        client: Arc<dyn VectorClient>,
        name: String,
        schema: &CollectionSchema,
        timeout: Duration,
    ) -> ClientResult<(Self, Timed<()>)> {
        let created = timed(timeout, client.create_collection(&name, schema)).await?;
        let wrapper = CollectionWrapper {
            client,
            name,
            timeout,
        };
        Ok((wrapper, created))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn client(&self) -> &Arc<dyn VectorClient> {
        &self.client
    }

    pub async fn drop(&self) -> ClientResult<Timed<()>> {
        timed(self.timeout, self.client.drop_collection(&self.name)).await
    }

    pub async fn load(&self) -> ClientResult<Timed<()>> {
        timed(self.timeout, self.client.load_collection(&self.name)).await
    }

    pub async fn insert(&self, entities: &Entities) -> ClientResult<Timed<u64>> {
        timed(self.timeout, self.client.insert(&self.name, entities)).await
    }

    pub async fn num_entities(&self) -> ClientResult<Timed<u64>> {
        timed(self.timeout, self.client.num_entities(&self.name)).await
    }

    pub async fn search(&self, request: &SearchRequest) -> ClientResult<Timed<SearchResult>> {
        timed(self.timeout, self.client.search(&self.name, request)).await
    }

    pub async fn query(&self, expr: &str) -> ClientResult<Timed<Vec<Value>>> {
        timed(self.timeout, self.client.query(&self.name, expr)).await
    }

    pub async fn create_index(
        &self,
        field_name: &str,
        params: &IndexParams,
        index_name: &str,
    ) -> ClientResult<Timed<()>> {
        timed(
            self.timeout,
            self.client
                .create_index(&self.name, field_name, params, index_name),
        )
        .await
    }

    pub async fn drop_index(&self) -> ClientResult<Timed<()>> {
        timed(self.timeout, self.client.drop_index(&self.name)).await
    }
}
