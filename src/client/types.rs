use serde::{Deserialize, Serialize};
use serde_json::Value;

type ResponseTime = f64;

/// Result of a single client call together with the time it took, in seconds.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Timed<T> {
    pub result: T,
    pub time: ResponseTime,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Int64,
    Float,
    FloatVector,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FieldSchema {
    pub name: String,
    pub dtype: DataType,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dim: Option<usize>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CollectionSchema {
    pub fields: Vec<FieldSchema>,
    #[serde(default)]
    pub description: String,
}

impl CollectionSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn primary_field(&self) -> Option<&FieldSchema> {
        self.fields.iter().find(|field| field.is_primary)
    }
}

/// Column oriented rows matching the default schema.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Entities {
    pub int64: Vec<i64>,
    pub float: Vec<f32>,
    pub float_vector: Vec<Vec<f32>>,
}

impl Entities {
    pub fn len(&self) -> usize {
        self.int64.len()
    }

    pub fn is_empty(&self) -> bool {
        self.int64.is_empty()
    }

    /// All columns must carry the same number of rows.
    pub fn is_aligned(&self) -> bool {
        self.int64.len() == self.float.len() && self.int64.len() == self.float_vector.len()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SearchRequest {
    pub data: Vec<Vec<f32>>,
    pub anns_field: String,
    pub param: Value,
    pub limit: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub id: i64,
    pub distance: f32,
}

/// One list of hits per query vector.
pub type SearchResult = Vec<Vec<Hit>>;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct IndexParams {
    pub index_type: String,
    pub metric_type: String,
    pub params: Value,
}

impl Default for IndexParams {
    fn default() -> Self {
        IndexParams {
            index_type: "IVF_SQ8".to_string(),
            metric_type: "L2".to_string(),
            params: serde_json::json!({ "nlist": 64 }),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateIndexRequest {
    pub field_name: String,
    pub index_name: String,
    pub params: IndexParams,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct QueryRequest {
    pub expr: String,
}
