use axum::Router;
use tower_http::cors::{Any, CorsLayer};

/// The dashboard and the capture wrapper may call from any origin.
pub fn add_cors(router: Router) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    router.layer(cors)
}
