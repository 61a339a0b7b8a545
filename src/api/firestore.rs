use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use crate::api::{DocumentStore, RawDoc, SnapshotCallback, Subscription};
use crate::config::FirebaseConfig;
use crate::error::{LmsError, LmsResult};

const API_BASE: &str = "https://firestore.googleapis.com/v1";
const PAGE_SIZE: u32 = 300;

// ============================================================================
// Firestore REST models
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FirestoreDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
    create_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<FirestoreDocument>,
    next_page_token: Option<String>,
}

impl FirestoreDocument {
    fn into_raw(self) -> RawDoc {
        // name is ".../documents/{collection}/{id}"
        let id = self
            .name
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();

        let fields = self
            .fields
            .iter()
            .filter_map(|(key, value)| decode_value(value).map(|v| (key.clone(), v)))
            .collect();

        RawDoc {
            id,
            created_at: self.create_time.unwrap_or_else(Utc::now),
            fields,
        }
    }
}

// ============================================================================
// Typed value codec
// ============================================================================

fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            // int64 travels as a decimal string
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64().unwrap_or_default() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

fn encode_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), encode_value(value)))
        .collect()
}

fn decode_value(value: &Value) -> Option<Value> {
    let (kind, inner) = value.as_object()?.iter().next()?;
    match kind.as_str() {
        "nullValue" => Some(Value::Null),
        "booleanValue" => inner.as_bool().map(Value::Bool),
        "integerValue" => inner
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .or_else(|| inner.as_i64())
            .map(Value::from),
        "doubleValue" => inner.as_f64().map(Value::from),
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => {
            inner.as_str().map(Value::from)
        }
        "arrayValue" => {
            let values: Vec<Value> = inner
                .get("values")
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(decode_value).collect())
                .unwrap_or_default();
            Some(Value::Array(values))
        }
        "mapValue" => {
            let fields: Map<String, Value> = inner
                .get("fields")
                .and_then(Value::as_object)
                .map(|map| {
                    map.iter()
                        .filter_map(|(k, v)| decode_value(v).map(|v| (k.clone(), v)))
                        .collect()
                })
                .unwrap_or_default();
            Some(Value::Object(fields))
        }
        other => {
            log::trace!("Firestore: ignoring unsupported value type {}", other);
            None
        }
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(String::from))
        .unwrap_or_else(|| body.chars().take(500).collect())
}

fn status_error(status: StatusCode, body: &str, collection: &str, id: Option<&str>) -> LmsError {
    match status.as_u16() {
        404 => LmsError::not_found(collection, id.unwrap_or_default()),
        400 | 403 | 409 | 412 => {
            LmsError::ValidationRejected(format!("{}: {}", status, error_message(body)))
        }
        _ => LmsError::BackendUnavailable(format!("{}: {}", status, error_message(body))),
    }
}

// ============================================================================
// Client
// ============================================================================

/// Cloud Firestore over its REST API.
#[derive(Clone)]
pub struct FirestoreClient {
    client: reqwest::Client,
    documents_url: String,
    api_key: String,
    id_token: Option<String>,
    poll_interval: Duration,
}

impl FirestoreClient {
    pub fn new(config: &FirebaseConfig, poll_interval: Duration) -> LmsResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            documents_url: format!(
                "{}/projects/{}/databases/(default)/documents",
                API_BASE, config.project_id
            ),
            api_key: config.api_key.clone(),
            id_token: None,
            poll_interval,
        })
    }

    /// Act as the signed-in user so security rules apply to them.
    pub fn with_id_token(mut self, id_token: impl Into<String>) -> Self {
        self.id_token = Some(id_token.into());
        self
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .query(&[("key", self.api_key.as_str())]);
        match &self.id_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        collection: &str,
        id: Option<&str>,
    ) -> LmsResult<reqwest::Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &body, collection, id))
    }

    async fn document(response: reqwest::Response) -> LmsResult<RawDoc> {
        let doc: FirestoreDocument = response.json().await.map_err(|e| {
            LmsError::BackendUnavailable(format!("Failed to parse Firestore document: {}", e))
        })?;
        Ok(doc.into_raw())
    }

    async fn list_page(
        &self,
        collection: &str,
        page_token: Option<&str>,
    ) -> LmsResult<ListDocumentsResponse> {
        let url = format!("{}/{}", self.documents_url, collection);
        let mut request = self
            .request(reqwest::Method::GET, &url)
            .query(&[("pageSize", PAGE_SIZE.to_string())]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = self.send(request, collection, None).await?;
        response.json().await.map_err(|e| {
            LmsError::BackendUnavailable(format!("Failed to parse {} listing: {}", collection, e))
        })
    }
}

#[async_trait]
impl DocumentStore for FirestoreClient {
    async fn create(&self, collection: &str, fields: Map<String, Value>) -> LmsResult<RawDoc> {
        let url = format!("{}/{}", self.documents_url, collection);
        log::trace!("Firestore: POST {}", url);
        let request = self
            .request(reqwest::Method::POST, &url)
            .json(&json!({ "fields": encode_fields(&fields) }));
        let response = self.send(request, collection, None).await?;
        Self::document(response).await
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> LmsResult<RawDoc> {
        let url = format!("{}/{}/{}", self.documents_url, collection, id);
        log::trace!("Firestore: PATCH {}", url);
        // Without an update mask every field is replaced; the precondition
        // keeps a stale edit from resurrecting a deleted document.
        let request = self
            .request(reqwest::Method::PATCH, &url)
            .query(&[("currentDocument.exists", "true")])
            .json(&json!({ "fields": encode_fields(&fields) }));
        let response = self.send(request, collection, Some(id)).await?;
        Self::document(response).await
    }

    async fn delete(&self, collection: &str, id: &str) -> LmsResult<()> {
        let url = format!("{}/{}/{}", self.documents_url, collection, id);
        log::trace!("Firestore: DELETE {}", url);
        let request = self.request(reqwest::Method::DELETE, &url);
        match self.send(request, collection, Some(id)).await {
            Ok(_) | Err(LmsError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn list(&self, collection: &str) -> LmsResult<Vec<RawDoc>> {
        let mut docs = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self.list_page(collection, page_token.as_deref()).await?;
            docs.extend(page.documents.into_iter().map(FirestoreDocument::into_raw));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        log::trace!("Firestore: listed {} documents from {}", docs.len(), collection);
        Ok(docs)
    }

    /// The REST surface has no push channel, so the feed re-lists on a timer
    /// and only reports snapshots that differ from the last one delivered.
    async fn subscribe(
        &self,
        collection: &str,
        on_change: SnapshotCallback,
    ) -> LmsResult<Subscription> {
        let mut last = self.list(collection).await?;
        on_change(last.clone());

        let client = self.clone();
        let collection = collection.to_string();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(client.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match client.list(&collection).await {
                    Ok(snapshot) if snapshot != last => {
                        last = snapshot.clone();
                        on_change(snapshot);
                    }
                    Ok(_) => {}
                    Err(e) => log::warn!("Firestore: poll of {} failed: {}", collection, e),
                }
            }
        });

        Ok(Subscription::from_task(task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_student_fields() {
        let mut fields = Map::new();
        fields.insert("name".to_string(), json!("Asha"));
        fields.insert("marks".to_string(), json!(87));
        fields.insert("ratio".to_string(), json!(0.5));
        fields.insert("archived".to_string(), json!(false));

        let encoded = encode_fields(&fields);
        assert_eq!(encoded["name"], json!({ "stringValue": "Asha" }));
        assert_eq!(encoded["marks"], json!({ "integerValue": "87" }));
        assert_eq!(encoded["ratio"], json!({ "doubleValue": 0.5 }));
        assert_eq!(encoded["archived"], json!({ "booleanValue": false }));
    }

    #[test]
    fn test_decode_document_from_listing() {
        let body = r#"{
          "documents": [{
            "name": "projects/lms/databases/(default)/documents/results/abc123",
            "fields": {
              "studentName": { "stringValue": "Asha" },
              "marks": { "integerValue": "91" },
              "tags": { "arrayValue": { "values": [{ "stringValue": "final" }] } },
              "meta": { "mapValue": { "fields": { "late": { "booleanValue": true } } } },
              "where": { "geoPointValue": { "latitude": 1.0, "longitude": 2.0 } }
            },
            "createTime": "2025-03-01T10:15:30.123456Z",
            "updateTime": "2025-03-01T10:15:30.123456Z"
          }],
          "nextPageToken": "next"
        }"#;

        let listing: ListDocumentsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(listing.next_page_token.as_deref(), Some("next"));

        let doc = listing.documents.into_iter().next().unwrap().into_raw();
        assert_eq!(doc.id, "abc123");
        assert_eq!(doc.fields["studentName"], json!("Asha"));
        assert_eq!(doc.fields["marks"], json!(91));
        assert_eq!(doc.fields["tags"], json!(["final"]));
        assert_eq!(doc.fields["meta"], json!({ "late": true }));
        assert!(doc.fields.get("where").is_none());
        assert_eq!(doc.created_at.to_rfc3339(), "2025-03-01T10:15:30.123456+00:00");
    }

    #[test]
    fn test_empty_collection_listing() {
        let listing: ListDocumentsResponse = serde_json::from_str("{}").unwrap();
        assert!(listing.documents.is_empty());
        assert!(listing.next_page_token.is_none());
    }

    #[test]
    fn test_status_mapping() {
        let body = r#"{"error":{"code":404,"message":"No document to update","status":"NOT_FOUND"}}"#;
        assert_eq!(
            status_error(StatusCode::NOT_FOUND, body, "students", Some("s1")),
            LmsError::not_found("students", "s1")
        );

        let err = status_error(StatusCode::FORBIDDEN, r#"{"error":{"message":"Missing or insufficient permissions."}}"#, "students", None);
        assert_eq!(
            err,
            LmsError::ValidationRejected("403 Forbidden: Missing or insufficient permissions.".into())
        );

        let err = status_error(StatusCode::SERVICE_UNAVAILABLE, "upstream down", "students", None);
        assert!(err.is_transient());
    }
}
