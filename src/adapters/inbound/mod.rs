mod api_routes;
mod health_routes;
mod http_server;
mod middleware;

pub use http_server::{
    build_app, build_router, App, AppState, HttpServer, BODY_LIMIT_BYTES, METRICS_CONTENT_TYPE,
};
pub use middleware::{CLIENT_CLOSED_REQUEST, UNMATCHED_ROUTE};
