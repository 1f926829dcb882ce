//! In-process stand-in for a vector database node.
//!
//! Keeps collections in memory, answers searches by brute force and can be told
//! to misbehave through a [`FaultPlan`]. It exists so checkers and functional
//! cases can run without a live cluster.

use crate::{
    client::{
        types::{CollectionSchema, DataType, Entities, Hit, IndexParams, SearchRequest, SearchResult},
        validate_collection_name, VectorClient,
    },
    error::{ClientError, ClientResult},
};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::RwLock;

/// Failure behaviour applied to every call made through an [`InMemoryClient`].
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct FaultPlan {
    /// Every call fails while set.
    pub unavailable: bool,
    /// Probability in `[0, 1]` that a call fails.
    pub error_rate: f64,
    /// Added to every call before it is served.
    pub latency_ms: u64,
}

impl FaultPlan {
    pub fn healthy() -> Self {
        FaultPlan::default()
    }

    pub fn unavailable() -> Self {
        FaultPlan {
            unavailable: true,
            ..Default::default()
        }
    }

    pub fn is_healthy(&self) -> bool {
        !self.unavailable && self.error_rate <= 0.0 && self.latency_ms == 0
    }
}

/// Something that can switch the failure behaviour of a target.
pub trait FaultInjector: Send + Sync {
    fn inject(&self, plan: FaultPlan);
    fn clear(&self) {
        self.inject(FaultPlan::healthy());
    }
}

struct StoredIndex {
    name: String,
    field_name: String,
    #[allow(dead_code)]
    params: IndexParams,
}

struct StoredCollection {
    schema: CollectionSchema,
    entities: Entities,
    flushed: usize,
    loaded: bool,
    index: Option<StoredIndex>,
}

impl StoredCollection {
    fn new(schema: CollectionSchema) -> Self {
        StoredCollection {
            schema,
            entities: Entities::default(),
            flushed: 0,
            loaded: false,
            index: None,
        }
    }

    fn vector_dim(&self, field_name: &str) -> ClientResult<usize> {
        let field = self.schema.field(field_name).ok_or_else(|| {
            ClientError::BadInput(format!("Field '{field_name}' does not exist"))
        })?;

        match (field.dtype, field.dim) {
            (DataType::FloatVector, Some(dim)) => Ok(dim),
            _ => Err(ClientError::BadInput(format!(
                "Field '{field_name}' is not a float vector field"
            ))),
        }
    }
}

#[derive(Default)]
struct Store {
    collections: RwLock<HashMap<String, StoredCollection>>,
    faults: std::sync::RwLock<FaultPlan>,
}

/// Cloning yields another handle on the same session; see [`InMemoryClient::session`]
/// for an independently connectable one.
#[derive(Clone)]
pub struct InMemoryClient {
    store: Arc<Store>,
    connected: Arc<AtomicBool>,
}

impl Default for InMemoryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryClient {
    /// A connected client on a fresh, empty store.
    pub fn new() -> Self {
        InMemoryClient {
            store: Arc::new(Store::default()),
            connected: Arc::new(AtomicBool::new(true)),
        }
    }

    /// A new connected session sharing this client's store and faults.
    pub fn session(&self) -> Self {
        InMemoryClient {
            store: self.store.clone(),
            connected: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn fault_plan(&self) -> FaultPlan {
        match self.store.faults.read() {
            Ok(plan) => plan.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub async fn collection_names(&self) -> Vec<String> {
        let mut names = self
            .store
            .collections
            .read()
            .await
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    pub async fn index_name(&self, collection_name: &str) -> Option<String> {
        self.store
            .collections
            .read()
            .await
            .get(collection_name)
            .and_then(|c| c.index.as_ref().map(|index| index.name.clone()))
    }

    /// Validates the request and applies the active fault plan.
    async fn admit(&self, name: &str) -> ClientResult<()> {
        validate_collection_name(name)?;

        if !self.is_connected() {
            return Err(ClientError::Disconnected);
        }

        let plan = self.fault_plan();

        if plan.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(plan.latency_ms)).await;
        }

        if plan.unavailable {
            return Err(ClientError::Injected("service unavailable".to_string()));
        }

        if plan.error_rate > 0.0 && rand::rng().random_bool(plan.error_rate.min(1.0)) {
            return Err(ClientError::Injected("random failure".to_string()));
        }

        Ok(())
    }
}

impl FaultInjector for InMemoryClient {
    fn inject(&self, plan: FaultPlan) {
        match self.store.faults.write() {
            Ok(mut faults) => *faults = plan,
            Err(poisoned) => *poisoned.into_inner() = plan,
        }
    }
}

fn not_found(name: &str) -> ClientError {
    ClientError::NotFound(format!("Collection '{name}' does not exist"))
}

fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Parses `<field> in [v1, v2, ...]`.
fn parse_term_expr(expr: &str) -> ClientResult<(String, HashSet<i64>)> {
    let invalid = || ClientError::BadInput(format!("Invalid expression: {expr}"));

    let (field, values) = expr.split_once(" in ").ok_or_else(invalid)?;
    let values = values
        .trim()
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .ok_or_else(invalid)?;

    let values = values
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| v.parse::<i64>().map_err(|_| invalid()))
        .collect::<ClientResult<HashSet<_>>>()?;

    Ok((field.trim().to_string(), values))
}

#[async_trait]
impl VectorClient for InMemoryClient {
    async fn connect(&self) -> ClientResult<()> {
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
        self.admit(name).await?;
        Ok(self.store.collections.read().await.contains_key(name))
    }

    async fn create_collection(&self, name: &str, schema: &CollectionSchema) -> ClientResult<()> {
        self.admit(name).await?;

        if schema.primary_field().is_none() {
            return Err(ClientError::BadInput(
                "Schema must have a primary field".to_string(),
            ));
        }

        let mut collections = self.store.collections.write().await;
        if collections.contains_key(name) {
            return Err(ClientError::BadInput(format!(
                "Collection with name '{name}' already exists"
            )));
        }
        collections.insert(name.to_string(), StoredCollection::new(schema.clone()));
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> ClientResult<()> {
        self.admit(name).await?;
        self.store
            .collections
            .write()
            .await
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found(name))
    }

    async fn load_collection(&self, name: &str) -> ClientResult<()> {
        self.admit(name).await?;
        let mut collections = self.store.collections.write().await;
        let collection = collections.get_mut(name).ok_or_else(|| not_found(name))?;
        collection.loaded = true;
        Ok(())
    }

    async fn insert(&self, name: &str, entities: &Entities) -> ClientResult<u64> {
        self.admit(name).await?;

        if !entities.is_aligned() {
            return Err(ClientError::BadInput(
                "All columns must have the same number of rows".to_string(),
            ));
        }

        let mut collections = self.store.collections.write().await;
        let collection = collections.get_mut(name).ok_or_else(|| not_found(name))?;

        let vector_field = collection
            .schema
            .fields
            .iter()
            .find(|f| f.dtype == DataType::FloatVector)
            .map(|f| f.name.clone())
            .ok_or_else(|| ClientError::BadInput("Schema has no vector field".to_string()))?;
        let dim = collection.vector_dim(&vector_field)?;

        if let Some(bad) = entities.float_vector.iter().find(|v| v.len() != dim) {
            return Err(ClientError::BadInput(format!(
                "Vector dimension {} does not match collection dimension {dim}",
                bad.len()
            )));
        }

        let stored = &mut collection.entities;
        stored.int64.extend_from_slice(&entities.int64);
        stored.float.extend_from_slice(&entities.float);
        stored
            .float_vector
            .extend(entities.float_vector.iter().cloned());

        Ok(entities.len() as u64)
    }

    async fn num_entities(&self, name: &str) -> ClientResult<u64> {
        self.admit(name).await?;
        let mut collections = self.store.collections.write().await;
        let collection = collections.get_mut(name).ok_or_else(|| not_found(name))?;
        collection.flushed = collection.entities.len();
        Ok(collection.flushed as u64)
    }

    async fn search(&self, name: &str, request: &SearchRequest) -> ClientResult<SearchResult> {
        self.admit(name).await?;
        let collections = self.store.collections.read().await;
        let collection = collections.get(name).ok_or_else(|| not_found(name))?;

        if !collection.loaded {
            return Err(ClientError::BadInput(format!(
                "Collection '{name}' is not loaded"
            )));
        }

        let dim = collection.vector_dim(&request.anns_field)?;
        let stored = &collection.entities;

        request
            .data
            .iter()
            .map(|query| {
                if query.len() != dim {
                    return Err(ClientError::BadInput(format!(
                        "Query dimension {} does not match collection dimension {dim}",
                        query.len()
                    )));
                }

                let mut hits = stored
                    .int64
                    .iter()
                    .zip(&stored.float_vector)
                    .map(|(id, vector)| Hit {
                        id: *id,
                        distance: l2_distance(query, vector),
                    })
                    .collect::<Vec<_>>();
                hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
                hits.truncate(request.limit);
                Ok(hits)
            })
            .collect()
    }

    async fn query(&self, name: &str, expr: &str) -> ClientResult<Vec<Value>> {
        self.admit(name).await?;
        let collections = self.store.collections.read().await;
        let collection = collections.get(name).ok_or_else(|| not_found(name))?;

        if !collection.loaded {
            return Err(ClientError::BadInput(format!(
                "Collection '{name}' is not loaded"
            )));
        }

        let (field, values) = parse_term_expr(expr)?;
        let primary = collection
            .schema
            .primary_field()
            .map(|f| f.name.as_str())
            .unwrap_or_default();
        if field != primary {
            return Err(ClientError::BadInput(format!(
                "Term expression is only supported on the primary field '{primary}'"
            )));
        }

        let stored = &collection.entities;
        let rows = stored
            .int64
            .iter()
            .zip(&stored.float)
            .filter(|(id, _)| values.contains(*id))
            .map(|(id, float)| json!({ primary: id, "float": float }))
            .collect();

        Ok(rows)
    }

    async fn create_index(
        &self,
        name: &str,
        field_name: &str,
        params: &IndexParams,
        index_name: &str,
    ) -> ClientResult<()> {
        self.admit(name).await?;
        let mut collections = self.store.collections.write().await;
        let collection = collections.get_mut(name).ok_or_else(|| not_found(name))?;
        collection.vector_dim(field_name)?;

        if let Some(existing) = &collection.index {
            if existing.field_name == field_name {
                return Err(ClientError::BadInput(format!(
                    "Index '{}' already exists on field '{field_name}'",
                    existing.name
                )));
            }
        }

        collection.index = Some(StoredIndex {
            name: index_name.to_string(),
            field_name: field_name.to_string(),
            params: params.clone(),
        });
        Ok(())
    }

    async fn drop_index(&self, name: &str) -> ClientResult<()> {
        self.admit(name).await?;
        let mut collections = self.store.collections.write().await;
        let collection = collections.get_mut(name).ok_or_else(|| not_found(name))?;
        collection.index = None;
        Ok(())
    }
}
