use crate::{
    client::{parse_collection_name, VectorClient},
    datagen::{gen_default_collection_schema, gen_invalid_strs, gen_unique_str, DEFAULT_DIM},
    error::ChaosError,
    suites::{ensure, CaseLabel, Fixtures},
};
use futures::future::join_all;
use std::{sync::Arc, time::Duration};

const UID: &str = "has_collection";
const THREADS_NUM: usize = 4;
const THREAD_SPAWN_GAP: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HasCollectionCase {
    /// A created collection exists.
    Exists,
    /// A disconnected client errors instead of answering.
    WithoutConnection,
    /// A dropped collection no longer exists.
    NotExisted,
    /// Concurrent callers all see the collection.
    Multithread,
    /// Malformed names are refused.
    InvalidCollectionName,
    EmptyCollectionName,
    NoneCollectionName,
}

/// Creates a uniquely named collection on `client` and drops it on [`TempCollection::cleanup`].
struct TempCollection {
    client: Arc<dyn VectorClient>,
    name: String,
}

impl TempCollection {
    async fn create(client: Arc<dyn VectorClient>) -> Result<Self, ChaosError> {
        let name = gen_unique_str(UID);
        client
            .create_collection(&name, &gen_default_collection_schema(DEFAULT_DIM))
            .await?;
        Ok(TempCollection { client, name })
    }

    async fn cleanup(self) {
        // Already dropped by the case itself in some scenarios.
        let _ = self.client.drop_collection(&self.name).await;
    }
}

impl HasCollectionCase {
    pub const ALL: [HasCollectionCase; 7] = [
        HasCollectionCase::Exists,
        HasCollectionCase::WithoutConnection,
        HasCollectionCase::NotExisted,
        HasCollectionCase::Multithread,
        HasCollectionCase::InvalidCollectionName,
        HasCollectionCase::EmptyCollectionName,
        HasCollectionCase::NoneCollectionName,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            HasCollectionCase::Exists => "test_has_collection",
            HasCollectionCase::WithoutConnection => "test_has_collection_without_connection",
            HasCollectionCase::NotExisted => "test_has_collection_not_existed",
            HasCollectionCase::Multithread => "test_has_collection_multithread",
            HasCollectionCase::InvalidCollectionName => {
                "test_has_collection_with_invalid_collection_name"
            }
            HasCollectionCase::EmptyCollectionName => {
                "test_has_collection_with_empty_collection_name"
            }
            HasCollectionCase::NoneCollectionName => "test_has_collection_with_none_collection_name",
        }
    }

    pub fn label(&self) -> CaseLabel {
        match self {
            HasCollectionCase::Exists | HasCollectionCase::NotExisted => CaseLabel::Smoke,
            _ => CaseLabel::L2,
        }
    }

    pub async fn run(&self, fixtures: &Fixtures) -> Result<(), ChaosError> {
        match self {
            HasCollectionCase::Exists => self.exists(fixtures).await,
            HasCollectionCase::WithoutConnection => self.without_connection(fixtures).await,
            HasCollectionCase::NotExisted => self.not_existed(fixtures).await,
            HasCollectionCase::Multithread => self.multithread(fixtures).await,
            HasCollectionCase::InvalidCollectionName => self.invalid_names(fixtures).await,
            HasCollectionCase::EmptyCollectionName => self.empty_name(fixtures).await,
            HasCollectionCase::NoneCollectionName => self.none_name(fixtures).await,
        }
    }

    async fn exists(&self, fixtures: &Fixtures) -> Result<(), ChaosError> {
        let collection = TempCollection::create(fixtures.connect.clone()).await?;
        let exists = fixtures.connect.has_collection(&collection.name).await;
        collection.cleanup().await;

        ensure(self.name(), exists?, "created collection is reported as missing")
    }

    async fn without_connection(&self, fixtures: &Fixtures) -> Result<(), ChaosError> {
        let collection = TempCollection::create(fixtures.connect.clone()).await?;
        let result = fixtures.dis_connect.has_collection(&collection.name).await;
        collection.cleanup().await;

        ensure(
            self.name(),
            result.is_err(),
            "disconnected client answered has_collection",
        )
    }

    async fn not_existed(&self, fixtures: &Fixtures) -> Result<(), ChaosError> {
        let client = &fixtures.connect;
        let collection_name = gen_unique_str(UID);

        client
            .create_collection(&collection_name, &gen_default_collection_schema(DEFAULT_DIM))
            .await?;
        ensure(
            self.name(),
            client.has_collection(&collection_name).await?,
            "created collection is reported as missing",
        )?;

        client.drop_collection(&collection_name).await?;
        ensure(
            self.name(),
            !client.has_collection(&collection_name).await?,
            "dropped collection is still reported",
        )
    }

    async fn multithread(&self, fixtures: &Fixtures) -> Result<(), ChaosError> {
        let collection = TempCollection::create(fixtures.connect.clone()).await?;

        let mut handles = Vec::with_capacity(THREADS_NUM);
        for _ in 0..THREADS_NUM {
            let client = fixtures.connect.clone();
            let name = collection.name.clone();
            handles.push(tokio::spawn(async move { client.has_collection(&name).await }));
            tokio::time::sleep(THREAD_SPAWN_GAP).await;
        }

        let results = join_all(handles).await;
        collection.cleanup().await;

        for result in results {
            let exists = result.map_err(|e| ChaosError::Case {
                case: self.name().to_string(),
                reason: format!("worker panicked: {e}"),
            })??;
            ensure(self.name(), exists, "a concurrent caller did not see the collection")?;
        }

        Ok(())
    }

    async fn invalid_names(&self, fixtures: &Fixtures) -> Result<(), ChaosError> {
        for collection_name in gen_invalid_strs() {
            let result = fixtures.connect.has_collection(&collection_name).await;
            ensure(
                self.name(),
                result.is_err(),
                format!("invalid name {collection_name:?} was accepted"),
            )?;
        }
        Ok(())
    }

    async fn empty_name(&self, fixtures: &Fixtures) -> Result<(), ChaosError> {
        let result = fixtures.connect.has_collection("").await;
        ensure(self.name(), result.is_err(), "empty name was accepted")
    }

    async fn none_name(&self, fixtures: &Fixtures) -> Result<(), ChaosError> {
        // Exercises the `Option` entry point; a `None` name never reaches the server.
        let collection_name: Option<&str> = None;
        let result = match parse_collection_name(collection_name) {
            Ok(name) => fixtures.connect.has_collection(name).await,
            Err(e) => Err(e),
        };
        ensure(self.name(), result.is_err(), "missing name was accepted")
    }
}
