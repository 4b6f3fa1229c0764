//! HTTP surface of the registry.
//!
//! ```text
//! POST   /services                 register      201 | 400
//! GET    /services[?service=name]  list          200
//! GET    /services/{id}            fetch one     200 | 404
//! PUT    /services/{id}/heartbeat  renew lease   200 | 404
//! PUT    /services/{id}/status     set status    200 | 400 | 404
//! DELETE /services/{id}            deregister    200 | 404
//! ```

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::registry::instance::{RegistrationRequest, ServiceInstance, StatusUpdate};
use crate::registry::store::ServiceRegistry;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub service: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Deregistered {
    pub id: String,
    pub deregistered: bool,
}

pub fn registry_router(registry: Arc<ServiceRegistry>) -> Router {
    Router::new()
        .route("/services", get(list_instances).post(register))
        .route("/services/{id}", get(get_instance).delete(deregister))
        .route("/services/{id}/heartbeat", put(heartbeat))
        .route("/services/{id}/status", put(update_status))
        .with_state(registry)
}

fn invalid_body(rejection: JsonRejection) -> GatewayError {
    GatewayError::Validation(rejection.body_text())
}

async fn register(
    State(registry): State<Arc<ServiceRegistry>>,
    payload: Result<Json<RegistrationRequest>, JsonRejection>,
) -> Result<impl IntoResponse, GatewayError> {
    let Json(request) = payload.map_err(invalid_body)?;
    let instance = registry.register(request)?;
    Ok((StatusCode::CREATED, Json(instance)))
}

async fn list_instances(
    State(registry): State<Arc<ServiceRegistry>>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<ServiceInstance>> {
    let mut instances = match query.service {
        Some(name) => registry.instances_by_service(&name),
        None => registry.all_instances(),
    };
    instances.sort_by(|a, b| a.service_name.cmp(&b.service_name).then(a.id.cmp(&b.id)));
    Json(instances)
}

async fn get_instance(
    State(registry): State<Arc<ServiceRegistry>>,
    Path(id): Path<String>,
) -> Result<Json<ServiceInstance>, GatewayError> {
    registry
        .get_instance(&id)
        .map(Json)
        .ok_or(GatewayError::InstanceNotFound(id))
}

async fn heartbeat(
    State(registry): State<Arc<ServiceRegistry>>,
    Path(id): Path<String>,
) -> Result<Json<ServiceInstance>, GatewayError> {
    registry.heartbeat(&id).map(Json)
}

async fn update_status(
    State(registry): State<Arc<ServiceRegistry>>,
    Path(id): Path<String>,
    payload: Result<Json<StatusUpdate>, JsonRejection>,
) -> Result<Json<ServiceInstance>, GatewayError> {
    let Json(update) = payload.map_err(invalid_body)?;
    registry.update_status(&id, update.status).map(Json)
}

async fn deregister(
    State(registry): State<Arc<ServiceRegistry>>,
    Path(id): Path<String>,
) -> Result<Json<Deregistered>, GatewayError> {
    if registry.deregister(&id) {
        Ok(Json(Deregistered { id, deregistered: true }))
    } else {
        Err(GatewayError::InstanceNotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use axum::response::Response;
    use tower::ServiceExt;

    fn json_request(method: Method, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: Method, uri: &str) -> Request<Body> {
        Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
    }

    async fn json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_register_and_fetch() {
        let registry = Arc::new(ServiceRegistry::new());
        let app = registry_router(registry.clone());

        let response = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/services",
                serde_json::json!({"id": "x", "serviceName": "svc", "host": "127.0.0.1", "port": 8080}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = json(response).await;
        assert_eq!(created["status"], "UP");

        let response = app.oneshot(empty_request(Method::GET, "/services/x")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let fetched = json(response).await;
        assert_eq!(fetched["serviceName"], "svc");
        assert_eq!(fetched["port"], 8080);
    }

    #[tokio::test]
    async fn test_invalid_registration_is_400() {
        let app = registry_router(Arc::new(ServiceRegistry::new()));

        let response = app
            .clone()
            .oneshot(json_request(Method::POST, "/services", serde_json::json!({"serviceName": "svc"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["error"], "ValidationError");

        let response = app
            .oneshot(json_request(
                Method::POST,
                "/services",
                serde_json::json!({"serviceName": "svc", "host": "localhost", "port": 0}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unaddressable_id_is_rejected() {
        let registry = Arc::new(ServiceRegistry::new());
        let app = registry_router(registry.clone());

        let response = app
            .oneshot(json_request(
                Method::POST,
                "/services",
                serde_json::json!({"id": "a/b", "serviceName": "svc", "host": "127.0.0.1", "port": 8080}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["error"], "ValidationError");
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_ids_are_404() {
        let app = registry_router(Arc::new(ServiceRegistry::new()));
        for (method, uri) in [
            (Method::GET, "/services/missing"),
            (Method::PUT, "/services/missing/heartbeat"),
            (Method::DELETE, "/services/missing"),
        ] {
            let response = app.clone().oneshot(empty_request(method, uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
        }

        let response = app
            .oneshot(json_request(
                Method::PUT,
                "/services/missing/status",
                serde_json::json!({"status": "DOWN"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_status_heartbeat_list_and_delete() {
        let registry = Arc::new(ServiceRegistry::new());
        registry
            .register(RegistrationRequest::new("a", "localhost", 1).with_id("a1"))
            .unwrap();
        registry
            .register(RegistrationRequest::new("b", "localhost", 2).with_id("b1"))
            .unwrap();
        let app = registry_router(registry.clone());

        let response = app
            .clone()
            .oneshot(json_request(
                Method::PUT,
                "/services/a1/status",
                serde_json::json!({"status": "OUT_OF_SERVICE"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["status"], "OUT_OF_SERVICE");

        let response = app
            .clone()
            .oneshot(json_request(
                Method::PUT,
                "/services/a1/status",
                serde_json::json!({"status": "SLEEPING"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(empty_request(Method::PUT, "/services/a1/heartbeat"))
            .await
            .unwrap();
        assert_eq!(json(response).await["status"], "UP");

        let response = app
            .clone()
            .oneshot(empty_request(Method::GET, "/services?service=b"))
            .await
            .unwrap();
        let listed = json(response).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert_eq!(listed[0]["id"], "b1");

        let response = app
            .clone()
            .oneshot(empty_request(Method::DELETE, "/services/b1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(empty_request(Method::GET, "/services")).await.unwrap();
        assert_eq!(json(response).await.as_array().unwrap().len(), 1);
        assert!(registry.get_instance("b1").is_none());
    }
}
