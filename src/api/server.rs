use crate::geo;
use crate::gtfs::ShapeIndex;
use crate::tracker::Reconciler;
use axum::{
    extract::Query,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

#[derive(Debug, Deserialize)]
struct NearestQuery {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Serialize)]
struct NearestRouteEntry {
    route_id: i64,
    shape_id: i64,
    color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    headsign: Option<String>,
    distance_m: f64,
}

#[derive(Debug, Serialize)]
struct NearestRoutesResponse {
    routes: Vec<NearestRouteEntry>,
}

#[derive(Debug, Serialize)]
struct VehicleEntry {
    route_id: i64,
    latitude: f64,
    longitude: f64,
    bearing: f64,
}

#[derive(Debug, Serialize)]
struct VehiclesResponse {
    vehicles: Vec<VehicleEntry>,
}

pub async fn run_server(
    shapes: Arc<ShapeIndex>,
    reconciler: Arc<RwLock<Reconciler>>,
    closest_limit: usize,
    port: u16,
) {
    let app = Router::new()
        .route(
            "/nearest-routes",
            get({
                let shapes = shapes.clone();
                move |query: Query<NearestQuery>| nearest_routes(query, shapes.clone(), closest_limit)
            }),
        )
        .route(
            "/vehicles",
            get({
                let shapes = shapes.clone();
                let reconciler = reconciler.clone();
                move || vehicles(shapes, reconciler)
            }),
        )
        .route("/health", get(health_check));

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(%addr, "starting HTTP server");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "failed to bind HTTP server");
            return;
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "HTTP server exited");
    }
}

/// One-shot nearest-routes lookup for a rider position.
async fn nearest_routes(
    Query(query): Query<NearestQuery>,
    shapes: Arc<ShapeIndex>,
    limit: usize,
) -> impl IntoResponse {
    let ranked = geo::rank_closest_routes(query.latitude, query.longitude, &shapes, limit);

    let routes = ranked
        .into_iter()
        .map(|r| NearestRouteEntry {
            route_id: r.route_id,
            shape_id: r.shape_id,
            color: r.color,
            headsign: shapes.headsign_for_route(r.route_id).map(str::to_string),
            distance_m: r.distance,
        })
        .collect();

    Json(NearestRoutesResponse { routes })
}

/// The render-facing read: current interpolated vehicle positions with
/// geometry-derived headings.
async fn vehicles(
    shapes: Arc<ShapeIndex>,
    reconciler: Arc<RwLock<Reconciler>>,
) -> impl IntoResponse {
    let now = Instant::now();
    let reconciler = reconciler.read().await;

    let vehicles = reconciler
        .positions(now)
        .into_iter()
        .map(|(route_id, position)| VehicleEntry {
            route_id,
            latitude: position.lat,
            longitude: position.lon,
            bearing: reconciler.heading(route_id, &shapes, now).unwrap_or(0.0),
        })
        .collect();

    Json(VehiclesResponse { vehicles })
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
