use crate::client::types::{CollectionSchema, DataType, Entities, FieldSchema};
use rand::{distr::Alphanumeric, Rng};

pub const DEFAULT_DIM: usize = 128;
pub const DEFAULT_INT64_FIELD: &str = "int64";
pub const DEFAULT_FLOAT_FIELD: &str = "float";
pub const DEFAULT_FLOAT_VEC_FIELD: &str = "float_vector";

const UNIQUE_SUFFIX_LEN: usize = 8;

/// `prefix` followed by a random alphanumeric suffix.
pub fn gen_unique_str(prefix: &str) -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(UNIQUE_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{prefix}{suffix}")
}

/// `nb` random unit vectors of dimension `dim`.
pub fn gen_vectors(nb: usize, dim: usize) -> Vec<Vec<f32>> {
    let mut rng = rand::rng();
    (0..nb)
        .map(|_| {
            let vector: Vec<f32> = (0..dim).map(|_| rng.random::<f32>()).collect();
            let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                vector.into_iter().map(|x| x / norm).collect()
            } else {
                vector
            }
        })
        .collect()
}

pub fn gen_default_collection_schema(dim: usize) -> CollectionSchema {
    CollectionSchema {
        fields: vec![
            FieldSchema {
                name: DEFAULT_INT64_FIELD.to_string(),
                dtype: DataType::Int64,
                is_primary: true,
                dim: None,
            },
            FieldSchema {
                name: DEFAULT_FLOAT_FIELD.to_string(),
                dtype: DataType::Float,
                is_primary: false,
                dim: None,
            },
            FieldSchema {
                name: DEFAULT_FLOAT_VEC_FIELD.to_string(),
                dtype: DataType::FloatVector,
                is_primary: false,
                dim: Some(dim),
            },
        ],
        description: "default collection".to_string(),
    }
}

/// `nb` rows with primary keys `0..nb`.
pub fn gen_default_list_data(nb: usize, dim: usize) -> Entities {
    Entities {
        int64: (0..nb as i64).collect(),
        float: (0..nb).map(|i| i as f32).collect(),
        float_vector: gen_vectors(nb, dim),
    }
}

/// Collection names a server must refuse.
pub fn gen_invalid_strs() -> Vec<String> {
    vec![
        " ".to_string(),
        "\t".to_string(),
        "12-s".to_string(),
        "12 s".to_string(),
        "(mn)".to_string(),
        "中文".to_string(),
        "%$#".to_string(),
        "a".repeat(256),
    ]
}

/// `field in [v1, v2, ...]`
pub fn gen_term_expr(field: &str, values: &[i64]) -> String {
    let values = values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!("{field} in [{values}]")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::validate_collection_name;

    #[test]
    fn test_unique_str() {
        let a = gen_unique_str("Checker_");
        let b = gen_unique_str("Checker_");
        assert!(a.starts_with("Checker_"));
        assert_eq!(a.len(), "Checker_".len() + UNIQUE_SUFFIX_LEN);
        assert_ne!(a, b);
        assert!(validate_collection_name(&a).is_ok());
    }

    #[test]
    fn test_vectors_are_normalized() {
        let vectors = gen_vectors(5, DEFAULT_DIM);
        assert_eq!(vectors.len(), 5);
        for v in vectors {
            assert_eq!(v.len(), DEFAULT_DIM);
            let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_default_data_matches_schema() {
        let data = gen_default_list_data(10, 8);
        assert!(data.is_aligned());
        assert_eq!(data.int64, (0..10).collect::<Vec<_>>());
        assert!(data.float_vector.iter().all(|v| v.len() == 8));

        let schema = gen_default_collection_schema(8);
        assert_eq!(schema.primary_field().unwrap().name, DEFAULT_INT64_FIELD);
        assert_eq!(schema.field(DEFAULT_FLOAT_VEC_FIELD).unwrap().dim, Some(8));
    }

    #[test]
    fn test_invalid_strs_are_rejected() {
        for name in gen_invalid_strs() {
            assert!(validate_collection_name(&name).is_err(), "{name:?}");
        }
    }

    #[test]
    fn test_term_expr() {
        assert_eq!(gen_term_expr("int64", &[1, 2, 3]), "int64 in [1, 2, 3]");
    }
}
