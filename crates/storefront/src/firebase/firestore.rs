//! Firestore REST client.
//!
//! Only the three calls the storefront needs: fetch one document, patch
//! fields of one document under a precondition, and run a single-field
//! equality query.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tracing::{debug, instrument};

use super::value::{encode_value, from_fields, to_fields};
use super::{ErrorEnvelope, FirebaseError, preview};
use crate::config::FirebaseConfig;

const PRODUCTION_HOST: &str = "https://firestore.googleapis.com";

/// A decoded document together with its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T> {
    /// Last path segment of the document name.
    pub id: String,
    /// Server update time, verbatim (nanosecond precision matters for
    /// preconditions, so it is not round-tripped through `chrono`).
    pub update_time: String,
    /// Document body.
    pub data: T,
}

/// Write precondition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// The document must not have changed since this update time.
    UpdateTime(String),
}

impl Precondition {
    fn query_pair(&self) -> (&'static str, String) {
        match self {
            Self::UpdateTime(ts) => ("currentDocument.updateTime", ts.clone()),
        }
    }
}

/// Raw document as returned by the REST API.
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
    #[serde(default)]
    update_time: String,
}

impl RawDocument {
    fn into_snapshot<T: DeserializeOwned>(self) -> Result<Snapshot<T>, FirebaseError> {
        let id = self
            .name
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        Ok(Snapshot {
            id,
            update_time: self.update_time,
            data: from_fields(&self.fields)?,
        })
    }
}

/// One element of a `runQuery` response stream.
#[derive(Debug, serde::Deserialize)]
struct RunQueryRow {
    document: Option<RawDocument>,
}

// =============================================================================
// FirestoreClient
// =============================================================================

/// Client for the Firestore REST API.
#[derive(Clone)]
pub struct FirestoreClient {
    inner: Arc<FirestoreClientInner>,
}

struct FirestoreClientInner {
    client: reqwest::Client,
    /// `.../projects/{p}/databases/{d}/documents`
    documents_url: String,
}

impl FirestoreClient {
    /// Create a new Firestore client.
    #[must_use]
    pub fn new(config: &FirebaseConfig) -> Self {
        let host = config
            .firestore_emulator_host
            .as_ref()
            .map_or_else(|| PRODUCTION_HOST.to_string(), |h| format!("http://{h}"));

        let documents_url = format!(
            "{host}/v1/projects/{}/databases/{}/documents",
            config.project_id, config.database_id
        );

        Self {
            inner: Arc::new(FirestoreClientInner {
                client: reqwest::Client::new(),
                documents_url,
            }),
        }
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!(
            "{}/{}/{}",
            self.inner.documents_url,
            urlencoding::encode(collection),
            urlencoding::encode(id)
        )
    }

    /// Send a request and return the body of a successful response.
    async fn send(
        &self,
        method: Method,
        url: &str,
        id_token: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<String, FirebaseError> {
        let mut request = self
            .inner
            .client
            .request(method, url)
            .bearer_auth(id_token)
            .query(query);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(FirebaseError::RateLimited(retry_after));
        }

        let text = response.text().await?;
        if status.is_success() {
            return Ok(text);
        }

        Err(map_error(status, &text))
    }

    /// Fetch a document.
    ///
    /// Returns `Ok(None)` if the document does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body does not decode as `T`.
    #[instrument(skip(self, id_token), fields(collection = %collection, id = %id))]
    pub async fn get_document<T: DeserializeOwned>(
        &self,
        id_token: &str,
        collection: &str,
        id: &str,
    ) -> Result<Option<Snapshot<T>>, FirebaseError> {
        let url = self.document_url(collection, id);
        match self.send(Method::GET, &url, id_token, &[], None).await {
            Ok(body) => {
                let raw: RawDocument = serde_json::from_str(&body)?;
                raw.into_snapshot().map(Some)
            }
            Err(FirebaseError::NotFound(_)) => {
                debug!("Document does not exist");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Overwrite the top-level fields present in `fields`, leaving the rest
    /// of the document untouched.
    ///
    /// # Errors
    ///
    /// Returns [`FirebaseError::Conflict`] if the precondition fails,
    /// [`FirebaseError::NotFound`] if the document is missing, or any
    /// transport/API error.
    #[instrument(skip(self, id_token, fields), fields(collection = %collection, id = %id))]
    pub async fn update_fields<T>(
        &self,
        id_token: &str,
        collection: &str,
        id: &str,
        fields: &T,
        precondition: &Precondition,
    ) -> Result<Snapshot<T>, FirebaseError>
    where
        T: Serialize + DeserializeOwned,
    {
        let encoded = to_fields(fields)?;
        let mut query: Vec<(&str, String)> = encoded
            .keys()
            .map(|key| ("updateMask.fieldPaths", key.clone()))
            .collect();
        query.push(precondition.query_pair());

        let url = self.document_url(collection, id);
        let body = json!({ "fields": encoded });
        let text = self
            .send(Method::PATCH, &url, id_token, &query, Some(&body))
            .await?;

        let raw: RawDocument = serde_json::from_str(&text)?;
        raw.into_snapshot()
    }

    /// Return every document in `collection` whose `field` equals `value`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a document does not decode as `T`.
    #[instrument(skip(self, id_token, value), fields(collection = %collection, field = %field))]
    pub async fn query_equal<T: DeserializeOwned>(
        &self,
        id_token: &str,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Snapshot<T>>, FirebaseError> {
        let url = format!("{}:runQuery", self.inner.documents_url);
        let body = json!({
            "structuredQuery": {
                "from": [{ "collectionId": collection }],
                "where": {
                    "fieldFilter": {
                        "field": { "fieldPath": field },
                        "op": "EQUAL",
                        "value": encode_value(value),
                    }
                }
            }
        });

        let text = self
            .send(Method::POST, &url, id_token, &[], Some(&body))
            .await?;
        let rows: Vec<RunQueryRow> = serde_json::from_str(&text)?;

        let snapshots = rows
            .into_iter()
            .filter_map(|row| row.document)
            .map(RawDocument::into_snapshot)
            .collect::<Result<Vec<_>, _>>()?;

        debug!(count = snapshots.len(), "Query returned documents");
        Ok(snapshots)
    }
}

/// Map a non-success Firestore response to an error.
fn map_error(status: StatusCode, body: &str) -> FirebaseError {
    let (rpc_status, message) = serde_json::from_str::<ErrorEnvelope>(body).map_or_else(
        |_| (None, preview(body)),
        |env| (env.error.status, env.error.message),
    );

    match rpc_status.as_deref() {
        Some("UNAUTHENTICATED") => return FirebaseError::Unauthenticated,
        Some("PERMISSION_DENIED") => return FirebaseError::PermissionDenied(message),
        Some("NOT_FOUND") => return FirebaseError::NotFound(message),
        Some("FAILED_PRECONDITION" | "ABORTED") => return FirebaseError::Conflict,
        _ => {}
    }

    match status {
        StatusCode::UNAUTHORIZED => FirebaseError::Unauthenticated,
        StatusCode::FORBIDDEN => FirebaseError::PermissionDenied(message),
        StatusCode::NOT_FOUND => FirebaseError::NotFound(message),
        StatusCode::CONFLICT => FirebaseError::Conflict,
        _ => {
            tracing::error!(
                status = %status,
                body = %preview(body),
                "Firestore returned non-success status"
            );
            FirebaseError::Api {
                status: rpc_status.unwrap_or_else(|| status.as_u16().to_string()),
                message,
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use yss_core::Cart;

    fn client_with_emulator(host: Option<&str>) -> FirestoreClient {
        let mut config = crate::config::test_config().firebase;
        config.firestore_emulator_host = host.map(String::from);
        FirestoreClient::new(&config)
    }

    #[test]
    fn test_production_document_url() {
        let client = client_with_emulator(None);
        assert_eq!(
            client.document_url("carts", "uid 1"),
            "https://firestore.googleapis.com/v1/projects/yss-test/databases/(default)/documents/carts/uid%201"
        );
    }

    #[test]
    fn test_emulator_document_url() {
        let client = client_with_emulator(Some("localhost:8080"));
        assert!(
            client
                .document_url("orders", "o1")
                .starts_with("http://localhost:8080/v1/projects/yss-test/")
        );
    }

    #[test]
    fn test_raw_document_into_snapshot() {
        let raw: RawDocument = serde_json::from_value(json!({
            "name": "projects/yss-test/databases/(default)/documents/carts/uid-1",
            "fields": {
                "items": {"arrayValue": {}}
            },
            "createTime": "2024-12-01T00:00:00.000001Z",
            "updateTime": "2024-12-02T03:04:05.123456Z"
        }))
        .unwrap();

        let snapshot: Snapshot<Cart> = raw.into_snapshot().unwrap();
        assert_eq!(snapshot.id, "uid-1");
        assert_eq!(snapshot.update_time, "2024-12-02T03:04:05.123456Z");
        assert!(snapshot.data.is_empty());
    }

    #[test]
    fn test_document_without_fields_decodes_defaults() {
        let raw: RawDocument = serde_json::from_value(json!({
            "name": "projects/p/databases/(default)/documents/carts/u"
        }))
        .unwrap();
        let snapshot: Snapshot<Cart> = raw.into_snapshot().unwrap();
        assert!(snapshot.data.items.is_empty());
    }

    #[test]
    fn test_precondition_query_pairs() {
        assert_eq!(
            Precondition::UpdateTime("t".to_string()).query_pair(),
            ("currentDocument.updateTime", "t".to_string())
        );
    }

    #[test]
    fn test_map_error_uses_rpc_status() {
        let body = r#"{"error":{"code":400,"message":"update time mismatch","status":"FAILED_PRECONDITION"}}"#;
        assert!(matches!(
            map_error(StatusCode::BAD_REQUEST, body),
            FirebaseError::Conflict
        ));

        let body = r#"{"error":{"code":403,"message":"Missing or insufficient permissions.","status":"PERMISSION_DENIED"}}"#;
        assert!(matches!(
            map_error(StatusCode::FORBIDDEN, body),
            FirebaseError::PermissionDenied(m) if m.contains("insufficient")
        ));
    }

    #[test]
    fn test_map_error_falls_back_to_http_status() {
        assert!(matches!(
            map_error(StatusCode::NOT_FOUND, "<html>nope</html>"),
            FirebaseError::NotFound(_)
        ));
        assert!(matches!(
            map_error(StatusCode::UNAUTHORIZED, ""),
            FirebaseError::Unauthenticated
        ));
        assert!(matches!(
            map_error(StatusCode::BAD_GATEWAY, "upstream"),
            FirebaseError::Api { status, .. } if status == "502"
        ));
    }
}
