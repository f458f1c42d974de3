use super::handlers::{collector, health, inputs, queue, services};
use super::middleware::cors::add_cors;
use crate::inputs::InputResolver;
use crate::services::{CatalogService, CollectorService, QueueService};
use axum::{
    Router,
    routing::{get, post},
};

#[derive(Clone)]
pub struct AppState {
    pub queue: QueueService,
    pub collector: CollectorService,
    pub catalog: CatalogService,
    pub resolver: InputResolver,
}

pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Dashboard and capture collector
        .route("/api/data/", get(collector::dashboard_data))
        .route("/api/record-execution/", post(collector::record_execution))
        .route("/api/execution/{id}/", get(collector::get_execution))
        // Service catalog
        .route("/api/services/", get(services::list_services))
        .route("/api/sync/", post(services::sync_services))
        // Execution queue
        .route("/api/execute/{service_name}/", post(queue::execute_service))
        .route("/api/queue/status/", get(queue::queue_status))
        .route("/api/queue/{id}/", get(queue::get_queue_item))
        .route("/api/queue/{id}/cancel/", post(queue::cancel_queue_item))
        // Inputs
        .route("/api/load-input-file/", post(inputs::load_input_file))
        .with_state(state);

    add_cors(api_routes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::dto::queue::ExecuteResponse;
    use crate::executor::ToreroExecutor;
    use crate::models::ServiceInfo;
    use crate::repository::{DbPool, ExecutionRepository, QueueRepository, ServiceRepository};
    use crate::services::QueueSettings;
    use crate::test_support::{GatedExecutor, eventually, test_pool};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct TestApp {
        dir: TempDir,
        router: Router,
        executor: GatedExecutor,
        pool: DbPool,
    }

    async fn test_app() -> TestApp {
        let (dir, pool) = test_pool().await;
        let resolver = InputResolver::new(dir.path().to_path_buf());
        let executor = GatedExecutor::new();

        let services = ServiceRepository::new(pool.clone());
        for (name, service_type) in [
            ("hello", "python-script"),
            ("site", "ansible-playbook"),
            ("vpc", "opentofu-plan"),
            ("odd", "bash-script"),
        ] {
            let now = Utc::now();
            services
                .upsert(&ServiceInfo {
                    name: name.into(),
                    service_type: service_type.into(),
                    description: String::new(),
                    tags: Vec::new(),
                    repository: String::new(),
                    config_data: Value::Null,
                    last_execution: None,
                    total_executions: 0,
                    success_count: 0,
                    failure_count: 0,
                    created_at: now,
                    updated_at: now,
                })
                .await
                .unwrap();
        }

        let collector = CollectorService::new(ExecutionRepository::new(pool.clone()), services.clone());
        let queue = QueueService::start(
            QueueRepository::new(pool.clone()),
            ExecutionRepository::new(pool.clone()),
            executor.clone(),
            None,
            QueueSettings {
                execution_timeout: Duration::from_secs(30),
                history_limit: 20,
            },
        )
        .await
        .unwrap();
        let catalog = CatalogService::new(
            services,
            ToreroExecutor::new(
                "/nonexistent/torero".into(),
                resolver.clone(),
                Duration::from_secs(1),
            ),
        );

        let router = create_router(AppState {
            queue,
            collector,
            catalog,
            resolver,
        });
        TestApp {
            dir,
            router,
            executor,
            pool,
        }
    }

    async fn body_json<T: serde::de::DeserializeOwned>(body: Body) -> T {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn post_empty(uri: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = test_app().await;
        let response = app.router.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = body_json(response.into_body()).await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_execute_with_empty_body_starts_first_job() {
        let app = test_app().await;

        let response = app
            .router
            .clone()
            .oneshot(post_empty("/api/execute/hello/"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let first: ExecuteResponse = body_json(response.into_body()).await;
        assert!(first.status == "started" || first.status == "queued");

        // Wait for the dispatcher so the second request is deterministically queued.
        let router = app.router.clone();
        eventually(|| {
            let router = router.clone();
            async move {
                let response = router.oneshot(get("/api/queue/status/")).await.unwrap();
                let body: Value = body_json(response.into_body()).await;
                body["running_count"] == 1
            }
        })
        .await;

        let response = app
            .router
            .clone()
            .oneshot(post_json(
                "/api/execute/vpc/",
                json!({"operation": "destroy", "inputs": {"variables": {"region": "eu-west-1"}}}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let second: ExecuteResponse = body_json(response.into_body()).await;
        assert_eq!(second.status, "queued");
        assert_eq!(second.position, Some(1));

        let response = app
            .router
            .clone()
            .oneshot(get(&format!("/api/queue/{}/", second.queue_id)))
            .await
            .unwrap();
        let item: Value = body_json(response.into_body()).await;
        assert_eq!(item["operation"], "destroy");
        assert_eq!(item["service_type"], "opentofu-plan");
        assert_eq!(item["inputs"]["variables"]["region"], "eu-west-1");
        assert_eq!(item["position"], 1);
        assert_eq!(item["progress_percent"], 0);

        app.executor.release("hello");
        app.executor.release("vpc");
    }

    #[tokio::test]
    async fn test_execute_rejects_bad_requests() {
        let app = test_app().await;

        let cases = [
            (post_json("/api/execute/missing/", json!({})), StatusCode::NOT_FOUND),
            (
                post_json("/api/execute/hello/", json!({"operation": "destroy"})),
                StatusCode::BAD_REQUEST,
            ),
            (
                post_json("/api/execute/vpc/", json!({"operation": "plan"})),
                StatusCode::BAD_REQUEST,
            ),
            (post_json("/api/execute/odd/", json!({})), StatusCode::BAD_REQUEST),
            (
                Request::builder()
                    .method("POST")
                    .uri("/api/execute/hello/")
                    .body(Body::from("{not json"))
                    .unwrap(),
                StatusCode::BAD_REQUEST,
            ),
        ];

        for (request, expected) in cases {
            let uri = request.uri().to_string();
            let response = app.router.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), expected, "{uri}");
            let body: Value = body_json(response.into_body()).await;
            assert_eq!(body["status"], "error");
        }

        let response = app.router.oneshot(get("/api/queue/status/")).await.unwrap();
        let body: Value = body_json(response.into_body()).await;
        assert_eq!(body["queued_count"], 0);
        assert_eq!(body["running_count"], 0);
    }

    #[tokio::test]
    async fn test_cancel_queued_and_reject_running() {
        let app = test_app().await;

        let response = app
            .router
            .clone()
            .oneshot(post_empty("/api/execute/hello/"))
            .await
            .unwrap();
        let running: ExecuteResponse = body_json(response.into_body()).await;
        let response = app
            .router
            .clone()
            .oneshot(post_empty("/api/execute/site/"))
            .await
            .unwrap();
        let queued: ExecuteResponse = body_json(response.into_body()).await;

        let router = app.router.clone();
        let running_id = running.queue_id;
        eventually(|| {
            let router = router.clone();
            async move {
                let response = router
                    .oneshot(get(&format!("/api/queue/{running_id}/")))
                    .await
                    .unwrap();
                let body: Value = body_json(response.into_body()).await;
                body["status"] == "running"
            }
        })
        .await;

        let response = app
            .router
            .clone()
            .oneshot(post_empty(&format!("/api/queue/{}/cancel/", running.queue_id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = body_json(response.into_body()).await;
        assert!(body["error"].as_str().unwrap().contains("cannot be cancelled"));

        let response = app
            .router
            .clone()
            .oneshot(post_empty(&format!("/api/queue/{}/cancel/", queued.queue_id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = body_json(response.into_body()).await;
        assert_eq!(body["status"], "cancelled");

        let response = app
            .router
            .clone()
            .oneshot(get("/api/queue/status/"))
            .await
            .unwrap();
        let body: Value = body_json(response.into_body()).await;
        assert_eq!(body["queued_count"], 0);
        assert_eq!(body["completed"][0]["status"], "cancelled");

        let response = app
            .router
            .oneshot(post_empty("/api/queue/424242/cancel/"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        app.executor.release("hello");
    }

    #[tokio::test]
    async fn test_record_execution_feeds_dashboard() {
        let app = test_app().await;

        let report = json!({
            "service_name": "captured",
            "service_type": "python-script",
            "execution_data": {
                "return_code": 0,
                "stdout": "hi\n",
                "stderr": "",
                "start_time": "2025-03-01T12:00:00.000000Z",
                "end_time": "2025-03-01T12:00:02.500000Z",
                "elapsed_time": 2.5
            }
        });
        let response = app
            .router
            .clone()
            .oneshot(post_json("/api/record-execution/", report))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = body_json(response.into_body()).await;
        assert_eq!(body["status"], "success");
        let id = body["execution_id"].as_i64().unwrap();

        let response = app
            .router
            .clone()
            .oneshot(get(&format!("/api/execution/{id}/")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let execution: Value = body_json(response.into_body()).await;
        assert_eq!(execution["status"], "success");
        assert_eq!(execution["duration_seconds"], 2.5);

        let response = app.router.clone().oneshot(get("/api/data/")).await.unwrap();
        let data: Value = body_json(response.into_body()).await;
        assert_eq!(data["stats"]["total_executions"], 1);
        assert_eq!(data["stats"]["total_services"], 5);
        assert_eq!(data["recent_executions"][0]["service_name"], "captured");

        let services = ServiceRepository::new(app.pool.clone());
        assert_eq!(services.get("captured").await.unwrap().success_count, 1);

        let response = app
            .router
            .oneshot(get(&format!("/api/execution/{}/", id + 1)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_services_and_failed_sync() {
        let app = test_app().await;

        let response = app.router.clone().oneshot(get("/api/services/")).await.unwrap();
        let body: Value = body_json(response.into_body()).await;
        let names: Vec<&str> = body["services"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["hello", "odd", "site", "vpc"]);

        // The CLI binary does not exist in tests.
        let response = app.router.oneshot(post_empty("/api/sync/")).await.unwrap();
        assert!(response.status().is_server_error());
    }

    #[tokio::test]
    async fn test_load_input_file() {
        let app = test_app().await;
        let inputs_dir = app.dir.path().join("inputs");
        std::fs::create_dir_all(&inputs_dir).unwrap();
        std::fs::write(
            inputs_dir.join("hello.yaml"),
            "variables:\n  name: world\nsecrets:\n  - api_token\n",
        )
        .unwrap();

        let response = app
            .router
            .clone()
            .oneshot(post_json(
                "/api/load-input-file/",
                json!({"file_path": "@inputs/hello.yaml"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = body_json(response.into_body()).await;
        assert_eq!(body["inputs"]["variables"]["name"], "world");
        assert_eq!(body["inputs"]["secrets"][0], "api_token");

        let response = app
            .router
            .oneshot(post_json(
                "/api/load-input-file/",
                json!({"file_path": "@inputs/absent.yaml"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
