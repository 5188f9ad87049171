//! Qdrant-backed [`VectorStore`](memory_core::vector_store::VectorStore)
//! implementation, built on `dashflow-qdrant`'s thin builder-pattern
//! wrapper over `qdrant-client` (see DESIGN.md for the full grounding).

use async_trait::async_trait;
use qdrant_client::qdrant::{
    self, condition::ConditionOneOf, point_id::PointIdOptions, r#match::MatchValue,
    vectors_config::Config as VectorsConfigInner, Condition, CountPointsBuilder,
    CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, DatetimeRange,
    DeletePointsBuilder, Distance, FieldCondition, FieldType, Filter as QdrantFilter,
    GetCollectionInfoResponse, Match, PointId, PointStruct, PointsIdsList, Range,
    ScalarQuantizationBuilder, ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder,
    Value as QdrantValue, VectorParamsBuilder, VectorsConfig,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

use memory_core::error::{Error, Result};
use memory_core::model::MemoryPoint;
use memory_core::vector_store::{CollectionInfo, Filter, FilterTerm, ScoredPoint, VectorStore};

/// A thin wrapper over a `qdrant-client` connection. Collections, payload
/// indexes, and filter/point conversion all live here; the rest of the
/// pipeline only ever sees the [`VectorStore`] trait.
pub struct QdrantVectorStore {
    client: Qdrant,
}

impl QdrantVectorStore {
    /// Connect to `url` (e.g. `http://localhost:6334`), optionally with an
    /// API key.
    pub fn connect(url: &str, api_key: Option<String>) -> Result<Self> {
        let mut builder = Qdrant::from_url(url);
        if let Some(key) = api_key {
            builder = builder.api_key(key);
        }
        let client = builder
            .build()
            .map_err(|e| Error::TransportUnavailable(format!("failed to build qdrant client: {e}")))?;
        Ok(Self { client })
    }

    /// Wrap an already-configured client, for callers that need custom
    /// transport settings (TLS, timeouts) beyond [`Self::connect`].
    #[must_use]
    pub fn from_client(client: Qdrant) -> Self {
        Self { client }
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn ensure_collection(&self, name: &str, dim: usize, payload_indexes: &[&str]) -> Result<()> {
        let exists = self
            .client
            .collection_exists(name)
            .await
            .map_err(|e| Error::TransportUnavailable(format!("collection_exists({name}): {e}")))?;

        if !exists {
            let vector_params = VectorParamsBuilder::new(dim as u64, Distance::Cosine).build();
            let vectors_config = VectorsConfig {
                config: Some(VectorsConfigInner::Params(vector_params)),
            };
            let create = CreateCollectionBuilder::new(name)
                .vectors_config(vectors_config)
                .quantization_config(ScalarQuantizationBuilder::default());
            self.client
                .create_collection(create)
                .await
                .map_err(|e| Error::TransportUnavailable(format!("create_collection({name}): {e}")))?;
        }

        for field in payload_indexes {
            let field_type = match *field {
                "is_current" => FieldType::Bool,
                _ => FieldType::Keyword,
            };
            // Idempotent: Qdrant accepts re-creating an existing index.
            let request = CreateFieldIndexCollectionBuilder::new(name, *field, field_type);
            self.client
                .create_field_index(request)
                .await
                .map_err(|e| Error::TransportUnavailable(format!("create_field_index({name}.{field}): {e}")))?;
        }

        Ok(())
    }

    async fn upsert(&self, name: &str, points: Vec<MemoryPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let structs = points
            .into_iter()
            .map(point_to_struct)
            .collect::<Result<Vec<_>>>()?;
        let request = UpsertPointsBuilder::new(name, structs).wait(true);
        self.client
            .upsert_points(request)
            .await
            .map_err(|e| Error::TransportUnavailable(format!("upsert({name}): {e}")))?;
        Ok(())
    }

    async fn scroll(&self, name: &str, filter: &Filter, limit: usize, offset: usize) -> Result<Vec<MemoryPoint>> {
        require_group_id(filter)?;
        let qdrant_filter = filter_to_qdrant(filter);
        // qdrant-client paginates by point-id cursor, not a numeric offset;
        // fetch limit+offset and slice client-side since per-tenant
        // collections here stay small.
        let fetch = (limit + offset) as u32;
        let request = ScrollPointsBuilder::new(name)
            .filter(qdrant_filter)
            .limit(fetch)
            .with_payload(true)
            .with_vectors(true);
        let response = self
            .client
            .scroll(request)
            .await
            .map_err(|e| Error::TransportUnavailable(format!("scroll({name}): {e}")))?;
        response
            .result
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(retrieved_to_point)
            .collect()
    }

    async fn search(&self, name: &str, vector: &[f32], filter: &Filter, limit: usize) -> Result<Vec<ScoredPoint>> {
        require_group_id(filter)?;
        let qdrant_filter = filter_to_qdrant(filter);
        let request = SearchPointsBuilder::new(name, vector.to_vec(), limit as u64)
            .filter(qdrant_filter)
            .with_payload(true)
            .with_vectors(true);
        let response = self
            .client
            .search_points(request)
            .await
            .map_err(|e| Error::TransportUnavailable(format!("search({name}): {e}")))?;
        response
            .result
            .into_iter()
            .map(|scored| {
                let score = scored.score;
                let point = retrieved_to_point(scored)?;
                Ok(ScoredPoint { point, score })
            })
            .collect()
    }

    async fn delete(&self, name: &str, ids: &[Uuid]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let point_ids: Vec<PointId> = ids.iter().map(|id| PointId::from(id.to_string())).collect();
        let request = DeletePointsBuilder::new(name)
            .points(PointsIdsList { ids: point_ids })
            .wait(true);
        self.client
            .delete_points(request)
            .await
            .map_err(|e| Error::TransportUnavailable(format!("delete({name}): {e}")))?;
        Ok(())
    }

    async fn count(&self, name: &str, filter: &Filter) -> Result<u64> {
        require_group_id(filter)?;
        let qdrant_filter = filter_to_qdrant(filter);
        let request = CountPointsBuilder::new(name).filter(qdrant_filter).exact(true);
        let response = self
            .client
            .count(request)
            .await
            .map_err(|e| Error::TransportUnavailable(format!("count({name}): {e}")))?;
        Ok(response.result.map_or(0, |r| r.count))
    }

    async fn get_collection_info(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let exists = self
            .client
            .collection_exists(name)
            .await
            .map_err(|e| Error::TransportUnavailable(format!("collection_exists({name}): {e}")))?;
        if !exists {
            return Ok(None);
        }
        let response: GetCollectionInfoResponse = self
            .client
            .collection_info(name)
            .await
            .map_err(|e| Error::TransportUnavailable(format!("collection_info({name}): {e}")))?;
        let Some(info) = response.result else {
            return Ok(None);
        };
        let dimension = info
            .config
            .as_ref()
            .and_then(|c| c.params.as_ref())
            .and_then(|p| p.vectors_config.as_ref())
            .and_then(|v| v.config.as_ref())
            .and_then(|c| match c {
                VectorsConfigInner::Params(params) => Some(params.size as usize),
                VectorsConfigInner::ParamsMap(map) => map.map.values().next().map(|p| p.size as usize),
            })
            .unwrap_or(0);
        Ok(Some(CollectionInfo {
            dimension,
            points_count: info.points_count.unwrap_or(0),
        }))
    }

    async fn is_healthy(&self) -> bool {
        self.client.health_check().await.is_ok()
    }
}

fn require_group_id(filter: &Filter) -> Result<()> {
    if filter.has_group_id() {
        Ok(())
    } else {
        Err(Error::InvalidInput(
            "query filter is missing a mandatory group_id term".to_string(),
        ))
    }
}

fn point_to_struct(point: MemoryPoint) -> Result<PointStruct> {
    let id = PointId::from(point.id.to_string());
    let vector = point.vector.clone();
    let payload = point_to_payload(&point)?;
    Ok(PointStruct::new(id, vector, payload))
}

fn point_to_payload(point: &MemoryPoint) -> Result<Payload> {
    let value = serde_json::to_value(point)?;
    let Value::Object(mut map) = value else {
        return Err(Error::InvalidInput("memory point did not serialize to an object".to_string()));
    };
    // id and vector travel as dedicated Qdrant fields, not payload.
    map.remove("id");
    map.remove("vector");
    Ok(Payload::from(Value::Object(map)))
}

fn qdrant_value_to_json(value: QdrantValue) -> Value {
    value.into()
}

fn retrieved_to_point<P: RetrievedPoint>(retrieved: P) -> Result<MemoryPoint> {
    let mut payload: Map<String, Value> = retrieved
        .payload()
        .into_iter()
        .map(|(k, v)| (k, qdrant_value_to_json(v)))
        .collect();

    let id = retrieved
        .id()
        .and_then(|id| id.point_id_options)
        .and_then(|opts| match opts {
            PointIdOptions::Uuid(s) => Uuid::parse_str(&s).ok(),
            PointIdOptions::Num(n) => Some(Uuid::from_u128(u128::from(n))),
        })
        .ok_or_else(|| Error::InvalidInput("qdrant point had no parseable id".to_string()))?;
    payload.insert("id".to_string(), Value::String(id.to_string()));
    payload.insert(
        "vector".to_string(),
        Value::Array(retrieved.vector().into_iter().map(|f| Value::from(f64::from(f))).collect()),
    );

    serde_json::from_value(Value::Object(payload)).map_err(Error::from)
}

/// Narrow trait over the two Qdrant response point shapes
/// (`RetrievedPoint` from scroll/get, `ScoredPoint` from search), so
/// [`retrieved_to_point`] doesn't need two near-identical copies.
trait RetrievedPoint {
    fn id(self) -> Option<PointId>;
    fn payload(self) -> HashMap<String, QdrantValue>;
    fn vector(self) -> Vec<f32>;
}

impl RetrievedPoint for qdrant::RetrievedPoint {
    fn id(self) -> Option<PointId> {
        self.id
    }

    fn payload(self) -> HashMap<String, QdrantValue> {
        self.payload
    }

    fn vector(self) -> Vec<f32> {
        self.vectors
            .and_then(|v| v.vectors_options)
            .and_then(|opts| match opts {
                qdrant::vectors_output::VectorsOptions::Vector(v) => Some(v.data),
                qdrant::vectors_output::VectorsOptions::Vectors(_) => None,
            })
            .unwrap_or_default()
    }
}

impl RetrievedPoint for qdrant::ScoredPoint {
    fn id(self) -> Option<PointId> {
        self.id
    }

    fn payload(self) -> HashMap<String, QdrantValue> {
        self.payload
    }

    fn vector(self) -> Vec<f32> {
        self.vectors
            .and_then(|v| v.vectors_options)
            .and_then(|opts| match opts {
                qdrant::vectors_output::VectorsOptions::Vector(v) => Some(v.data),
                qdrant::vectors_output::VectorsOptions::Vectors(_) => None,
            })
            .unwrap_or_default()
    }
}

fn filter_to_qdrant(filter: &Filter) -> QdrantFilter {
    let must = filter.terms().iter().map(term_to_condition).collect();
    QdrantFilter {
        must,
        ..Default::default()
    }
}

fn term_to_condition(term: &FilterTerm) -> Condition {
    match term {
        FilterTerm::Eq(field, value) => Condition {
            condition_one_of: Some(ConditionOneOf::Field(FieldCondition {
                key: field.clone(),
                r#match: Some(Match {
                    match_value: Some(eq_match_value(value)),
                }),
                ..Default::default()
            })),
        },
        FilterTerm::Lte(field, value) => range_condition(field, None, Some(value)),
        FilterTerm::Gte(field, value) => range_condition(field, Some(value), None),
    }
}

fn eq_match_value(value: &Value) -> MatchValue {
    match value {
        Value::String(s) => MatchValue::Keyword(s.clone()),
        Value::Bool(b) => MatchValue::Boolean(*b),
        Value::Number(n) => n.as_i64().map_or_else(
            || MatchValue::Integer(n.as_f64().unwrap_or_default() as i64),
            MatchValue::Integer,
        ),
        _ => MatchValue::Keyword(value.to_string()),
    }
}

/// `stored_at`-style range terms are compared as RFC 3339 strings; numeric
/// fields fall back to a plain numeric range.
fn range_condition(field: &str, gte: Option<&Value>, lte: Option<&Value>) -> Condition {
    let as_rfc3339 = gte.and_then(Value::as_str).or_else(|| lte.and_then(Value::as_str));
    if as_rfc3339.is_some() {
        return Condition {
            condition_one_of: Some(ConditionOneOf::Field(FieldCondition {
                key: field.to_string(),
                datetime_range: Some(DatetimeRange {
                    gte: gte.and_then(Value::as_str).and_then(parse_rfc3339),
                    lte: lte.and_then(Value::as_str).and_then(parse_rfc3339),
                    ..Default::default()
                }),
                ..Default::default()
            })),
        };
    }
    Condition {
        condition_one_of: Some(ConditionOneOf::Field(FieldCondition {
            key: field.to_string(),
            range: Some(Range {
                gte: gte.and_then(Value::as_f64),
                lte: lte.and_then(Value::as_f64),
                ..Default::default()
            }),
            ..Default::default()
        })),
    }
}

fn parse_rfc3339(s: &str) -> Option<qdrant_client::prost_types::Timestamp> {
    chrono::DateTime::parse_from_rfc3339(s).ok().map(|dt| {
        let utc = dt.with_timezone(&chrono::Utc);
        qdrant_client::prost_types::Timestamp {
            seconds: utc.timestamp(),
            nanos: utc.timestamp_subsec_nanos() as i32,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory_core::model::{EmbeddingStatus, GroupId, MemoryType};
    use std::collections::BTreeMap;

    fn sample_point() -> MemoryPoint {
        MemoryPoint {
            id: Uuid::new_v4(),
            vector: vec![0.1, 0.2, 0.3],
            content: "fn main() {}".into(),
            content_hash: "abc123".into(),
            memory_type: MemoryType::Implementation,
            group_id: GroupId("proj-a".into()),
            stored_at: chrono::Utc::now(),
            is_current: true,
            source_hook: "post_tool_use".into(),
            file_path: Some("src/main.rs".into()),
            embedding_status: EmbeddingStatus::Ready,
            logical_identity: Some("src/main.rs".into()),
            chunk_index: Some(0),
            total_chunks: Some(1),
            document_id: Some(Uuid::new_v4()),
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn point_payload_excludes_id_and_vector() {
        let payload = point_to_payload(&sample_point()).unwrap();
        let map: HashMap<String, QdrantValue> = payload.into();
        assert!(!map.contains_key("id"));
        assert!(!map.contains_key("vector"));
        assert!(map.contains_key("content_hash"));
        assert!(map.contains_key("group_id"));
    }

    #[test]
    fn scroll_without_group_id_is_rejected() {
        let filter = Filter::default();
        assert!(require_group_id(&filter).is_err());
    }

    #[test]
    fn scroll_with_group_id_passes() {
        let filter = Filter::for_group("proj-a");
        assert!(require_group_id(&filter).is_ok());
    }

    #[test]
    fn eq_term_builds_keyword_match() {
        let filter = Filter::for_group("proj-a").eq("type", "rule");
        let qdrant_filter = filter_to_qdrant(&filter);
        assert_eq!(qdrant_filter.must.len(), 2);
        let Some(ConditionOneOf::Field(fc)) = &qdrant_filter.must[1].condition_one_of else {
            panic!("expected a field condition");
        };
        assert_eq!(fc.key, "type");
        assert!(matches!(
            fc.r#match.as_ref().and_then(|m| m.match_value.as_ref()),
            Some(MatchValue::Keyword(s)) if s == "rule"
        ));
    }

    #[test]
    fn lte_term_on_a_timestamp_builds_datetime_range() {
        let filter = Filter::for_group("proj-a").lte("stored_at", "2026-01-01T00:00:00Z");
        let qdrant_filter = filter_to_qdrant(&filter);
        let Some(ConditionOneOf::Field(fc)) = &qdrant_filter.must[1].condition_one_of else {
            panic!("expected a field condition");
        };
        assert!(fc.datetime_range.is_some());
    }
}
