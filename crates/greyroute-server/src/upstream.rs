//! Stand-in business server that gateway traffic is forwarded to

use axum::{Router, extract::State, http::Uri, routing::any};

#[derive(Clone, Copy)]
struct UpstreamState {
    port: u16,
}

/// Router answering every business call with the URI it saw and its own port
pub fn router(port: u16) -> Router {
    Router::new()
        .route("/api/{version}/business/{identify}", any(respond))
        .with_state(UpstreamState { port })
}

async fn respond(State(state): State<UpstreamState>, uri: Uri) -> String {
    format!("response {} by server(port: {})", uri, state.port)
}
