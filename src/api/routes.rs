use crate::api::api_error::APIError;
use crate::api::model::{
    CreateRecordRequest, CreateRecordResult, DeleteRecordResult, StoredRecordResult,
};
use crate::api::server::AppState;
use crate::error::Error;
use crate::keys::derive_key;
use crate::record::{Kind, ResourceRecord};
use crate::record_store::StoredRecord;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use axum_extra::extract::WithRejection;
use serde_json::json;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

const DNS_MESSAGE_CONTENT_TYPE: &str = "application/dns-message";

pub(super) fn new(state: AppState) -> Router {
    Router::new()
        .route("/healthcheck", get(health_check))
        .route("/records", post(create_record))
        .route("/records/:type/:domain", delete(delete_record))
        .route("/dns-query", post(dns_query))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(state.config.api_timeout))
        .with_state(state)
}

#[allow(clippy::unused_async)]
async fn health_check() -> impl IntoResponse {
    Json(json!({"ok":"healthy"}))
}

async fn create_record(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<CreateRecordRequest>, APIError>,
) -> Result<Json<CreateRecordResult>, APIError> {
    let kind: Kind = payload.record_type.parse()?;
    let data = kind.parse_value(&payload.value, payload.preference)?;
    let rr = ResourceRecord::new(&payload.domain, payload.ttl, data)?;

    let ptr = match (payload.ptr, rr.reverse_pointer()) {
        (false, _) => None,
        (true, Some(ptr)) => Some(ptr),
        (true, None) => {
            return Err(Error::InvalidValue {
                rtype: kind.to_string(),
                value: "ptr is only supported for A and AAAA records".to_string(),
            }
            .into())
        }
    };

    let record = store_record(&state, &rr, payload.expires).await?;
    let ptr = match ptr {
        Some(ptr) => Some(store_record(&state, &ptr, payload.expires).await?),
        None => None,
    };
    Ok(Json(CreateRecordResult { record, ptr }))
}

async fn store_record(
    state: &AppState,
    rr: &ResourceRecord,
    expires: i64,
) -> Result<StoredRecordResult, Error> {
    let key = rr.key()?;
    state.store.put(&key, StoredRecord::new(rr, expires)).await?;
    tracing::info!("stored {rr} under {key}");
    Ok(StoredRecordResult {
        key,
        rr: rr.to_string(),
        expires,
    })
}

async fn delete_record(
    State(state): State<AppState>,
    Path((record_type, domain)): Path<(String, String)>,
) -> Result<Json<DeleteRecordResult>, APIError> {
    let kind: Kind = record_type.parse()?;
    let key = derive_key(&domain, kind.record_type())?;
    let stored = state.store.get(&key).await?;
    state.store.delete(&key).await?;
    tracing::info!("deleted {domain} {kind} ({key})");

    let ptr = match stored.record(&key) {
        Ok(rr) => delete_reverse_pointer(&state, &rr).await?,
        Err(err) => {
            tracing::warn!("not looking for a reverse pointer: {err}");
            None
        }
    };
    Ok(Json(DeleteRecordResult { key, ptr }))
}

/// Delete the PTR record of an address record, if it still points back at `rr`'s owner.
async fn delete_reverse_pointer(
    state: &AppState,
    rr: &ResourceRecord,
) -> Result<Option<String>, Error> {
    let Some(ptr) = rr.reverse_pointer() else {
        return Ok(None);
    };
    let key = ptr.key()?;
    let stored = match state.store.get(&key).await {
        Ok(stored) => stored,
        Err(err) if err.is_not_found() => return Ok(None),
        Err(err) => return Err(err),
    };
    if !matches!(stored.record(&key), Ok(existing) if existing.data == ptr.data) {
        tracing::debug!("{key} points elsewhere, keeping it");
        return Ok(None);
    }
    match state.store.delete(&key).await {
        Ok(()) => {
            tracing::info!("deleted reverse pointer {key}");
            Ok(Some(key))
        }
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}

async fn dns_query(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, APIError> {
    let response = state.bridge.query(&body).await?;
    Ok(([(header::CONTENT_TYPE, DNS_MESSAGE_CONTENT_TYPE)], response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::dns::{Bridge, Handler};
    use crate::record_store::{DynRecordStore, InMemoryRecordStore};
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use serde_json::Value;
    use std::str::FromStr;
    use std::sync::Arc;
    use tower::ServiceExt;
    use trust_dns_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
    use trust_dns_proto::rr::{Name, RecordType};

    fn app() -> (Router, DynRecordStore) {
        let config = Arc::new(Config::default());
        let store: DynRecordStore = Arc::new(InMemoryRecordStore::new());
        let bridge = Bridge::new(Handler::new(config.clone(), store.clone()).unwrap());
        let state = AppState {
            config,
            store: store.clone(),
            bridge,
        };
        (new(state), store)
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Bytes) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        (status, body)
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn json_body(body: &Bytes) -> Value {
        serde_json::from_slice(body).unwrap()
    }

    #[tokio::test]
    async fn healthcheck() {
        let (app, _) = app();
        let request = Request::get("/healthcheck").body(Body::empty()).unwrap();
        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body), json!({"ok": "healthy"}));
    }

    #[tokio::test]
    async fn create_record_with_reverse_pointer() {
        let (app, store) = app();
        let request = post_json(
            "/records",
            &json!({
                "domain": "host.example.com",
                "type": "a",
                "ttl": 120,
                "value": "192.0.2.10",
                "ptr": true
            }),
        );
        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
        let body = json_body(&body);
        assert_eq!(body["key"], "com.example.host_1");
        assert_eq!(body["rr"], "host.example.com. 120 IN A 192.0.2.10");
        assert_eq!(body["expires"], 0);
        assert_eq!(body["ptr"]["key"], "arpa.in-addr.192.0.2.10_12");

        let ptr = store.get("arpa.in-addr.192.0.2.10_12").await.unwrap();
        assert_eq!(
            ptr.rr,
            "10.2.0.192.in-addr.arpa. 120 IN PTR host.example.com."
        );
        assert!(store.get("com.example.host_1").await.is_ok());
    }

    #[tokio::test]
    async fn create_mx_record() {
        let (app, store) = app();
        let request = post_json(
            "/records",
            &json!({
                "domain": "example.com.",
                "type": "MX",
                "value": "mail.example.com",
                "preference": 10,
                "expires": 1_900_000_000
            }),
        );
        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json_body(&body).get("ptr").is_none());

        let stored = store.get("com.example_15").await.unwrap();
        assert_eq!(stored.rr, "example.com. 300 IN MX 10 mail.example.com.");
        assert_eq!(stored.expires, 1_900_000_000);
    }

    #[tokio::test]
    async fn create_record_validation() {
        for (payload, expected) in [
            (
                json!({"domain": "host.example.com", "type": "A", "value": "not-an-ip"}),
                StatusCode::BAD_REQUEST,
            ),
            (
                json!({"domain": "host.example.com", "type": "AAAA", "value": "10.0.0.1"}),
                StatusCode::BAD_REQUEST,
            ),
            (
                json!({"domain": "host.example.com", "type": "TXT", "value": "hello"}),
                StatusCode::BAD_REQUEST,
            ),
            (
                json!({"domain": "bad..name", "type": "A", "value": "10.0.0.1"}),
                StatusCode::BAD_REQUEST,
            ),
            (
                json!({"domain": "alias.example.com", "type": "CNAME",
                       "value": "host.example.com", "ptr": true}),
                StatusCode::BAD_REQUEST,
            ),
            (
                json!({"domain": "host.example.com", "type": "A"}),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
        ] {
            let (app, _) = app();
            let (status, body) = send(app, post_json("/records", &payload)).await;
            assert_eq!(status, expected, "{payload}");
            assert!(json_body(&body)["error"].is_string());
        }
    }

    #[tokio::test]
    async fn create_record_requires_json() {
        let (app, _) = app();
        let request = Request::post("/records")
            .body(Body::from("domain=host.example.com"))
            .unwrap();
        let (status, _) = send(app, request).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn delete_record() {
        let (app, store) = app();
        let create = post_json(
            "/records",
            &json!({"domain": "host.example.com", "type": "AAAA", "value": "2001:db8::1"}),
        );
        let (status, _) = send(app.clone(), create).await;
        assert_eq!(status, StatusCode::OK);

        let delete = || {
            Request::delete("/records/aaaa/host.example.com")
                .body(Body::empty())
                .unwrap()
        };
        let (status, body) = send(app.clone(), delete()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["key"], "com.example.host_28");
        assert!(store.get("com.example.host_28").await.is_err());

        let (status, _) = send(app, delete()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_removes_own_reverse_pointer_only() {
        let (app, store) = app();
        let create = |domain: &str| {
            post_json(
                "/records",
                &json!({"domain": domain, "type": "A", "value": "192.0.2.10", "ptr": true}),
            )
        };
        send(app.clone(), create("host.example.com")).await;

        let request = Request::delete("/records/A/host.example.com")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app.clone(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["ptr"], "arpa.in-addr.192.0.2.10_12");
        assert!(store
            .get("arpa.in-addr.192.0.2.10_12")
            .await
            .unwrap_err()
            .is_not_found());

        // The address moved to another host, whose PTR must survive.
        send(app.clone(), create("other.example.com")).await;
        send(
            app.clone(),
            post_json(
                "/records",
                &json!({"domain": "host.example.com", "type": "A", "value": "192.0.2.10"}),
            ),
        )
        .await;
        let request = Request::delete("/records/A/host.example.com")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json_body(&body).get("ptr").is_none());
        let ptr = store.get("arpa.in-addr.192.0.2.10_12").await.unwrap();
        assert_eq!(
            ptr.rr,
            "10.2.0.192.in-addr.arpa. 300 IN PTR other.example.com."
        );
    }

    #[tokio::test]
    async fn create_record_rejects_broken_json() {
        let (app, _) = app();
        let request = Request::post("/records")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"domain\": "))
            .unwrap();
        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json_body(&body)["error"].is_string());
    }

    #[tokio::test]
    async fn dns_query_bridge() {
        let (app, _) = app();
        let create = post_json(
            "/records",
            &json!({"domain": "host.example.com", "type": "A", "value": "10.0.0.1"}),
        );
        send(app.clone(), create).await;

        let mut query = Message::new();
        query
            .set_id(31)
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .add_query(Query::query(
                Name::from_str("host.example.com.").unwrap(),
                RecordType::A,
            ));
        let request = Request::post("/dns-query")
            .header(header::CONTENT_TYPE, DNS_MESSAGE_CONTENT_TYPE)
            .body(Body::from(query.to_vec().unwrap()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            DNS_MESSAGE_CONTENT_TYPE
        );
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let answer = Message::from_vec(&body).unwrap();
        assert_eq!(answer.id(), 31);
        assert_eq!(answer.response_code(), ResponseCode::NoError);
        assert_eq!(answer.answers().len(), 1);

        let garbage = Request::post("/dns-query")
            .body(Body::from("nope"))
            .unwrap();
        let (status, _) = send(app, garbage).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
