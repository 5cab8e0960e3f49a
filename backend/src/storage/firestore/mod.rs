//! # Firestore Document Store
//!
//! `DocumentStore` implementation over the Firestore REST API (v1). Requests
//! carry the project API key and, when a user is signed in, the user's id
//! token so that the project's security rules apply. A request rejected with
//! 401 is sent once more with a renewed token.

pub mod codec;

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, error, warn};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::storage::traits::{Collection, Document, DocumentStore, StoreError};

pub const DEFAULT_FIRESTORE_URL: &str = "https://firestore.googleapis.com/v1";
const PAGE_SIZE: &str = "300";

/// Supplies the bearer token attached to store requests
#[async_trait]
pub trait IdTokenSource: Send + Sync {
    async fn id_token(&self) -> Option<String>;

    /// A replacement for `rejected`, or `None` when the session is over
    async fn renew(&self, rejected: &str) -> Option<String>;
}

pub struct FirestoreStore {
    http: reqwest::Client,
    documents_url: String,
    api_key: String,
    tokens: Arc<dyn IdTokenSource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<FirestoreDocument>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FirestoreDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

impl FirestoreDocument {
    fn into_document(self) -> Result<Document, StoreError> {
        let id = self
            .name
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        Ok(Document {
            id,
            data: codec::decode_fields(&self.fields)?,
        })
    }
}

impl FirestoreStore {
    pub fn new(
        base_url: &str,
        project_id: &str,
        api_key: &str,
        tokens: Arc<dyn IdTokenSource>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        let documents_url = format!(
            "{}/projects/{}/databases/(default)/documents",
            base_url.trim_end_matches('/'),
            project_id
        );
        Ok(Self {
            http,
            documents_url,
            api_key: api_key.to_string(),
            tokens,
        })
    }

    async fn dispatch(
        &self,
        builder: reqwest::RequestBuilder,
        token: Option<&str>,
    ) -> Result<reqwest::Response, StoreError> {
        let builder = builder.query(&[("key", self.api_key.as_str())]);
        let builder = match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        };
        builder.send().await.map_err(|e| StoreError::Transport(e.to_string()))
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        collection: Collection,
        id: Option<&str>,
    ) -> Result<reqwest::Response, StoreError> {
        let retry = builder.try_clone();
        let token = self.tokens.id_token().await;
        let mut response = self.dispatch(builder, token.as_deref()).await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            let (Some(rejected), Some(retry)) = (token, retry) else {
                return Err(StoreError::Unauthorized);
            };
            warn!("Firestore rejected the id token for {}; renewing", collection);
            let Some(fresh) = self.tokens.renew(&rejected).await else {
                return Err(StoreError::Unauthorized);
            };
            response = self.dispatch(retry, Some(&fresh)).await?;
        }

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(StoreError::Unauthorized);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            if let Some(id) = id {
                return Err(StoreError::NotFound { collection, id: id.to_string() });
            }
        }
        let message = response.text().await.unwrap_or_default();
        error!("Firestore {} request failed: {} {}", collection, status, message);
        Err(StoreError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn list(&self, collection: Collection) -> Result<Vec<Document>> {
        let url = format!("{}/{}", self.documents_url, collection.name());
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.http.get(&url).query(&[("pageSize", PAGE_SIZE)]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let page: ListResponse = self
                .send(request, collection, None)
                .await?
                .json()
                .await
                .map_err(|e| StoreError::Codec(e.to_string()))?;

            for doc in page.documents {
                documents.push(doc.into_document()?);
            }
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!("Firestore: listed {} {} documents", documents.len(), collection);
        Ok(documents)
    }

    async fn create(&self, collection: Collection, data: Map<String, Value>) -> Result<String> {
        let url = format!("{}/{}", self.documents_url, collection.name());
        let body = json!({ "fields": codec::encode_fields(&data) });
        let created: FirestoreDocument = self
            .send(self.http.post(&url).json(&body), collection, None)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Codec(e.to_string()))?;
        Ok(created.into_document()?.id)
    }

    async fn update(&self, collection: Collection, id: &str, data: Map<String, Value>) -> Result<()> {
        let url = format!("{}/{}/{}", self.documents_url, collection.name(), id);
        let mut query: Vec<(&str, String)> = data
            .keys()
            .map(|k| ("updateMask.fieldPaths", codec::field_path(k)))
            .collect();
        query.push(("currentDocument.exists", "true".to_string()));

        let body = json!({ "fields": codec::encode_fields(&data) });
        self.send(self.http.patch(&url).query(&query).json(&body), collection, Some(id))
            .await?;
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        let url = format!("{}/{}/{}", self.documents_url, collection.name(), id);
        self.send(self.http.delete(&url), collection, Some(id)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FixedToken(Option<&'static str>);

    #[async_trait]
    impl IdTokenSource for FixedToken {
        async fn id_token(&self) -> Option<String> {
            self.0.map(str::to_string)
        }

        async fn renew(&self, _rejected: &str) -> Option<String> {
            None
        }
    }

    /// Starts with "old" and renews to "fresh" once
    #[derive(Default)]
    struct RotatingToken {
        renewed: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl IdTokenSource for RotatingToken {
        async fn id_token(&self) -> Option<String> {
            Some("old".into())
        }

        async fn renew(&self, rejected: &str) -> Option<String> {
            self.renewed.lock().unwrap().push(rejected.to_string());
            Some("fresh".into())
        }
    }

    const DOCS: &str = "/projects/demo/databases/(default)/documents";

    fn store(server: &MockServer, token: Option<&'static str>) -> FirestoreStore {
        FirestoreStore::new(&server.uri(), "demo", "api-key", Arc::new(FixedToken(token))).unwrap()
    }

    #[tokio::test]
    async fn test_list_follows_page_tokens() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("{}/todos", DOCS)))
            .and(query_param("pageToken", "next"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "documents": [{
                    "name": "projects/demo/databases/(default)/documents/todos/t2",
                    "fields": { "title": { "stringValue": "second" } }
                }]
            })))
            .with_priority(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("{}/todos", DOCS)))
            .and(query_param("key", "api-key"))
            .and(header("authorization", "Bearer id-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "documents": [{
                    "name": "projects/demo/databases/(default)/documents/todos/t1",
                    "fields": { "title": { "stringValue": "first" } }
                }],
                "nextPageToken": "next"
            })))
            .mount(&server)
            .await;

        let docs = store(&server, Some("id-token")).list(Collection::Todos).await.unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2"]);
        assert_eq!(docs[1].data["title"], json!("second"));
    }

    #[tokio::test]
    async fn test_create_returns_generated_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{}/expenses", DOCS)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/demo/databases/(default)/documents/expenses/abc123",
                "fields": {}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut data = Map::new();
        data.insert("amount".into(), json!(12.5));
        let id = store(&server, None).create(Collection::Expenses, data).await.unwrap();
        assert_eq!(id, "abc123");
    }

    #[tokio::test]
    async fn test_update_sends_field_mask() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path(format!("{}/expenses/abc123", DOCS)))
            .and(query_param("updateMask.fieldPaths", "expenseId"))
            .and(query_param("currentDocument.exists", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/demo/databases/(default)/documents/expenses/abc123"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut data = Map::new();
        data.insert("expenseId".into(), json!("abc123"));
        store(&server, None)
            .update(Collection::Expenses, "abc123", data)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_missing_document_maps_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(404).set_body_string("NOT_FOUND"))
            .mount(&server)
            .await;

        let err = store(&server, None)
            .update(Collection::Savings, "gone", Map::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_permission_denied_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("PERMISSION_DENIED"))
            .mount(&server)
            .await;

        let err = store(&server, None).list(Collection::Finances).await.unwrap_err();
        match err.downcast_ref::<StoreError>() {
            Some(StoreError::Api { status, message }) => {
                assert_eq!(*status, 403);
                assert!(message.contains("PERMISSION_DENIED"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rejected_token_is_renewed_and_request_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{}/todos", DOCS)))
            .and(header("authorization", "Bearer old"))
            .respond_with(ResponseTemplate::new(401).set_body_string("UNAUTHENTICATED"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{}/todos", DOCS)))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "documents": [] })))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = Arc::new(RotatingToken::default());
        let store = FirestoreStore::new(&server.uri(), "demo", "api-key", tokens.clone()).unwrap();
        let docs = store.list(Collection::Todos).await.unwrap();
        assert!(docs.is_empty());
        assert_eq!(*tokens.renewed.lock().unwrap(), vec!["old".to_string()]);
    }

    #[tokio::test]
    async fn test_unrenewable_session_is_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(401).set_body_string("UNAUTHENTICATED"))
            .expect(1)
            .mount(&server)
            .await;

        let err = store(&server, Some("old"))
            .delete(Collection::Savings, "s1")
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<StoreError>(), Some(StoreError::Unauthorized)));
    }
}
