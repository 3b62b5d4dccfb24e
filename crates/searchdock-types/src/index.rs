use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Code, ErrorCode};

/// The named scalar or collection type of a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    String,
    Int32,
    Int64,
    Double,
    Boolean,
    DateTimeOffset,
    GeographyPoint,
    Complex,
    /// Only valid inside `Collection(…)`; a bare `Edm.Single` field is rejected.
    Single,
    Collection(Box<DataType>),
}

impl DataType {
    /// A `Collection(Edm.Single)` field holds a float vector owned by the
    /// vector store rather than the inverted index.
    pub fn is_vector(&self) -> bool {
        matches!(self, DataType::Collection(inner) if **inner == DataType::Single)
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, DataType::Collection(_))
    }

    pub fn is_complex(&self) -> bool {
        match self {
            DataType::Complex => true,
            DataType::Collection(inner) => **inner == DataType::Complex,
            _ => false,
        }
    }

    /// The element type for collections, the type itself otherwise.
    pub fn element(&self) -> &DataType {
        match self {
            DataType::Collection(inner) => inner,
            other => other,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::String => f.write_str("Edm.String"),
            DataType::Int32 => f.write_str("Edm.Int32"),
            DataType::Int64 => f.write_str("Edm.Int64"),
            DataType::Double => f.write_str("Edm.Double"),
            DataType::Boolean => f.write_str("Edm.Boolean"),
            DataType::DateTimeOffset => f.write_str("Edm.DateTimeOffset"),
            DataType::GeographyPoint => f.write_str("Edm.GeographyPoint"),
            DataType::Complex => f.write_str("Edm.ComplexType"),
            DataType::Single => f.write_str("Edm.Single"),
            DataType::Collection(inner) => write!(f, "Collection({inner})"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown field data type `{0}`.")]
pub struct ParseDataTypeError(String);

impl ErrorCode for ParseDataTypeError {
    fn error_code(&self) -> Code {
        Code::InvalidArgument
    }
}

impl FromStr for DataType {
    type Err = ParseDataTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(inner) = s.strip_prefix("Collection(").and_then(|s| s.strip_suffix(')')) {
            return Ok(DataType::Collection(Box::new(inner.parse()?)));
        }
        match s {
            "Edm.String" => Ok(DataType::String),
            "Edm.Int32" => Ok(DataType::Int32),
            "Edm.Int64" => Ok(DataType::Int64),
            "Edm.Double" => Ok(DataType::Double),
            "Edm.Boolean" => Ok(DataType::Boolean),
            "Edm.DateTimeOffset" => Ok(DataType::DateTimeOffset),
            "Edm.GeographyPoint" => Ok(DataType::GeographyPoint),
            "Edm.ComplexType" => Ok(DataType::Complex),
            "Edm.Single" => Ok(DataType::Single),
            other => Err(ParseDataTypeError(other.to_string())),
        }
    }
}

impl Serialize for DataType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DataType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

fn default_true() -> bool {
    true
}

fn is_true(b: &bool) -> bool {
    *b
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// A field of an index schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "is_false")]
    pub key: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub searchable: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub filterable: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub sortable: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub facetable: bool,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub retrievable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalizer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_search_profile: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub synonym_maps: Vec<String>,
    /// Sub-fields, for complex types only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Field>,
}

impl Field {
    pub fn is_vector(&self) -> bool {
        self.data_type.is_vector()
    }
}

/// Vector search configuration: named algorithms referenced by named profiles.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VectorSearch {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub algorithms: Vec<VectorAlgorithm>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub profiles: Vec<VectorProfile>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VectorAlgorithm {
    pub name: String,
    pub kind: VectorAlgorithmKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hnsw_parameters: Option<HnswParameters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exhaustive_knn_parameters: Option<ExhaustiveKnnParameters>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VectorAlgorithmKind {
    Hnsw,
    ExhaustiveKnn,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VectorMetric {
    #[default]
    Cosine,
    DotProduct,
    Euclidean,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HnswParameters {
    #[serde(default = "HnswParameters::default_m")]
    pub m: usize,
    #[serde(default = "HnswParameters::default_ef_construction")]
    pub ef_construction: usize,
    #[serde(default = "HnswParameters::default_ef_search")]
    pub ef_search: usize,
    #[serde(default)]
    pub metric: VectorMetric,
}

impl HnswParameters {
    pub fn default_m() -> usize {
        16
    }

    pub fn default_ef_construction() -> usize {
        200
    }

    pub fn default_ef_search() -> usize {
        64
    }
}

impl Default for HnswParameters {
    fn default() -> Self {
        Self {
            m: Self::default_m(),
            ef_construction: Self::default_ef_construction(),
            ef_search: Self::default_ef_search(),
            metric: VectorMetric::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExhaustiveKnnParameters {
    #[serde(default)]
    pub metric: VectorMetric,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VectorProfile {
    pub name: String,
    pub algorithm: String,
}

/// An index-side prefix completion structure over chosen source fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Suggester {
    pub name: String,
    #[serde(default)]
    pub search_mode: SuggesterSearchMode,
    pub source_fields: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuggesterSearchMode {
    #[default]
    #[serde(rename = "analyzingInfixMatching")]
    AnalyzingInfixMatching,
}

/// A custom normalizer composed of char filters and token filters, resolved
/// by name for filter/facet/sort equality on analyzed fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CustomNormalizer {
    pub name: String,
    #[serde(rename = "@odata.type", default = "CustomNormalizer::odata_type")]
    pub odata_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub char_filters: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub token_filters: Vec<String>,
}

impl CustomNormalizer {
    fn odata_type() -> String {
        "#Microsoft.Azure.Search.CustomNormalizer".to_string()
    }
}

/// A named index schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IndexDefinition {
    pub name: String,
    pub fields: Vec<Field>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_search: Option<VectorSearch>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggesters: Vec<Suggester>,
    /// Carried and echoed back; they do not affect ranking.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scoring_profiles: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_scoring_profile: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub analyzers: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub normalizers: Vec<CustomNormalizer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub char_filters: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub token_filters: Vec<serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum IndexValidationError {
    #[error("Index name `{0}` is invalid. Index names must match `[a-z][a-z0-9-]{{0,127}}`.")]
    InvalidName(String),
    #[error("Field name `{0}` is invalid. Field names must start with a letter and contain only letters, digits and underscores.")]
    InvalidFieldName(String),
    #[error("Duplicate field name `{0}`.")]
    DuplicateField(String),
    #[error("An index must declare exactly one key field; found {0}.")]
    KeyCount(usize),
    #[error("The key field `{0}` must be of type Edm.String.")]
    NonStringKey(String),
    #[error("Field `{0}`: complex fields cannot be the key.")]
    ComplexKey(String),
    #[error("Field `{0}`: type Edm.Single is only valid inside Collection(Edm.Single).")]
    BareSingle(String),
    #[error("Vector field `{0}` must declare `dimensions` and a `vectorSearchProfile`.")]
    VectorMissingConfig(String),
    #[error("Vector field `{0}` cannot be filterable, sortable or facetable.")]
    VectorBadFlags(String),
    #[error("Vector field `{0}` references unknown vector search profile `{1}`.")]
    UnknownVectorProfile(String, String),
    #[error("Vector search profile `{0}` references unknown algorithm `{1}`.")]
    UnknownVectorAlgorithm(String, String),
    #[error("Field `{0}`: collection fields cannot be sortable.")]
    SortableCollection(String),
    #[error("Field `{0}`: complex fields cannot be sortable or facetable.")]
    ComplexBadFlags(String),
    #[error("Suggester `{0}` references unknown or non-searchable field `{1}`.")]
    BadSuggesterField(String, String),
    #[error("An index cannot declare more than {0} fields.")]
    TooManyFields(usize),
}

impl ErrorCode for IndexValidationError {
    fn error_code(&self) -> Code {
        Code::InvalidArgument
    }
}

pub fn is_valid_resource_name(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_ok = chars.next().is_some_and(|c| c.is_ascii_lowercase());
    starts_ok
        && name.len() <= 128
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn is_valid_field_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl IndexDefinition {
    pub fn key_field(&self) -> &Field {
        // validated at creation: exactly one key
        self.fields.iter().find(|f| f.key).expect("validated index has a key field")
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn vector_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.is_vector())
    }

    /// Resolve a vector field to the parameters of the algorithm behind its
    /// profile.
    pub fn vector_algorithm_for(&self, field: &Field) -> Option<&VectorAlgorithm> {
        let profile_name = field.vector_search_profile.as_deref()?;
        let vector_search = self.vector_search.as_ref()?;
        let profile = vector_search.profiles.iter().find(|p| p.name == profile_name)?;
        vector_search.algorithms.iter().find(|a| a.name == profile.algorithm)
    }

    pub fn validate(&self, max_fields: usize) -> Result<(), IndexValidationError> {
        if !is_valid_resource_name(&self.name) {
            return Err(IndexValidationError::InvalidName(self.name.clone()));
        }
        if self.fields.len() > max_fields {
            return Err(IndexValidationError::TooManyFields(max_fields));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            self.validate_field(field, &mut seen)?;
        }

        let keys: Vec<_> = self.fields.iter().filter(|f| f.key).collect();
        if keys.len() != 1 {
            return Err(IndexValidationError::KeyCount(keys.len()));
        }
        let key = keys[0];
        if key.data_type != DataType::String {
            if key.data_type.is_complex() {
                return Err(IndexValidationError::ComplexKey(key.name.clone()));
            }
            return Err(IndexValidationError::NonStringKey(key.name.clone()));
        }

        for suggester in &self.suggesters {
            for source in &suggester.source_fields {
                let ok = self.field(source).is_some_and(|f| f.searchable);
                if !ok {
                    return Err(IndexValidationError::BadSuggesterField(
                        suggester.name.clone(),
                        source.clone(),
                    ));
                }
            }
        }

        Ok(())
    }

    fn validate_field(
        &self,
        field: &Field,
        seen: &mut HashSet<String>,
    ) -> Result<(), IndexValidationError> {
        if !is_valid_field_name(&field.name) {
            return Err(IndexValidationError::InvalidFieldName(field.name.clone()));
        }
        if !seen.insert(field.name.clone()) {
            return Err(IndexValidationError::DuplicateField(field.name.clone()));
        }

        if field.data_type == DataType::Single {
            return Err(IndexValidationError::BareSingle(field.name.clone()));
        }

        if field.is_vector() {
            if field.dimensions.is_none() || field.vector_search_profile.is_none() {
                return Err(IndexValidationError::VectorMissingConfig(field.name.clone()));
            }
            if field.filterable || field.sortable || field.facetable {
                return Err(IndexValidationError::VectorBadFlags(field.name.clone()));
            }
            let profile = field.vector_search_profile.as_deref().unwrap();
            let vector_search = self.vector_search.clone().unwrap_or_default();
            let Some(profile) = vector_search.profiles.iter().find(|p| p.name == profile) else {
                return Err(IndexValidationError::UnknownVectorProfile(
                    field.name.clone(),
                    profile.to_string(),
                ));
            };
            if !vector_search.algorithms.iter().any(|a| a.name == profile.algorithm) {
                return Err(IndexValidationError::UnknownVectorAlgorithm(
                    profile.name.clone(),
                    profile.algorithm.clone(),
                ));
            }
        } else if field.data_type.is_complex() {
            if field.key {
                return Err(IndexValidationError::ComplexKey(field.name.clone()));
            }
            if field.sortable || field.facetable {
                return Err(IndexValidationError::ComplexBadFlags(field.name.clone()));
            }
            // sub-field names live in their own namespace, addressed as parent/child
            let mut sub_seen = HashSet::new();
            for sub in &field.fields {
                self.validate_field(sub, &mut sub_seen)?;
            }
        } else if field.data_type.is_collection() && field.sortable {
            return Err(IndexValidationError::SortableCollection(field.name.clone()));
        }

        Ok(())
    }

    /// The key field is always retrievable; normalize that here so the rest
    /// of the code never has to special-case it.
    pub fn normalize(&mut self) {
        for field in &mut self.fields {
            if field.key {
                field.retrievable = true;
            }
        }
    }
}
