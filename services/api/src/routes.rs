use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use loan_officer::workflows::mortgage::{
    conversation_router, CompletionService, DocumentRetriever, TurnEngine,
};
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_conversation_routes<C, R>(engine: Arc<TurnEngine<C, R>>) -> axum::Router
where
    C: CompletionService + 'static,
    R: DocumentRetriever + 'static,
{
    conversation_router(engine)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use loan_officer::workflows::mortgage::{
        CompletionPurpose, CompletionRequest, EmptyRetriever, RateRule, RateTable, ServiceError,
    };
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::AtomicBool;
    use tower::ServiceExt;

    struct ApplyingModel;

    impl CompletionService for ApplyingModel {
        fn complete(&self, request: &CompletionRequest) -> Result<String, ServiceError> {
            Ok(match request.purpose {
                CompletionPurpose::IntentRouting => "application".to_string(),
                _ => "yes".to_string(),
            })
        }
    }

    fn test_router(ready: bool) -> axum::Router {
        let rates = RateTable::new(vec![RateRule {
            min_credit_score: 700,
            max_loan_to_value: 80.0,
            max_debt_to_income: 43.0,
            loan_term: 30,
            rate: 6.75,
        }]);
        let engine = TurnEngine::new(
            Arc::new(ApplyingModel),
            Arc::new(EmptyRetriever),
            Arc::new(rates),
        );
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        with_conversation_routes(Arc::new(engine)).layer(Extension(state))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json payload")
    }

    #[tokio::test]
    async fn healthcheck_reports_ok() {
        let Json(body) = healthcheck().await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn readiness_reflects_flag() {
        let response = test_router(false)
            .oneshot(Request::get("/ready").body(Body::empty()).expect("request"))
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = test_router(true)
            .oneshot(Request::get("/ready").body(Body::empty()).expect("request"))
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ready");
    }

    #[tokio::test]
    async fn conversation_routes_are_mounted() {
        let response = test_router(true)
            .oneshot(
                Request::post("/api/v1/conversation/turn")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"utterance":"I'd like to apply for a loan"}"#))
                    .expect("request"),
            )
            .await
            .expect("route executes");

        assert_eq!(response.status(), StatusCode::OK);
        let payload = body_json(response).await;
        assert_eq!(payload["state"]["application_step"], "credit_score");
    }

    #[tokio::test]
    async fn rate_tool_is_mounted() {
        let response = test_router(true)
            .oneshot(
                Request::post("/api/v1/rates/tool")
                    .body(Body::from("720,75,40,30"))
                    .expect("request"),
            )
            .await
            .expect("route executes");

        let bytes = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .expect("read body");
        assert_eq!(&bytes[..], b"The estimated interest rate is 6.750%");
    }
}
