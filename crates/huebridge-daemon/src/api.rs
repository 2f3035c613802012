//! Hue v1 API handlers
//!
//! Hue clients expect `200 OK` even for unknown lights, so misses are
//! answered with an empty body rather than an error status.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use huebridge_core::StateRequest;
use huebridge_discovery::setup_xml;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::state::AppState;

/// `GET /api/{user_id}`
pub async fn list_lights(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    let lights = state.worker.lights().await;
    debug!(user = %user_id, lights = lights.lights.len(), "Listing lights");
    Json(lights)
}

/// `GET /api/{user_id}/lights/{light_id}`
pub async fn get_light(
    State(state): State<Arc<AppState>>,
    Path((_user_id, light_id)): Path<(String, String)>,
) -> Response {
    match state.worker.light(&light_id).await {
        Some(light) => Json(light).into_response(),
        None => {
            warn!(light_id = %light_id, "Unknown light requested");
            StatusCode::OK.into_response()
        }
    }
}

/// `PUT /api/{user_id}/lights/{light_id}/state`
///
/// The body is parsed by hand: clients do not always send a JSON content
/// type.
pub async fn set_light_state(
    State(state): State<Arc<AppState>>,
    Path((_user_id, light_id)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let request: StateRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            error!(light_id = %light_id, error = %e, "Invalid light state request");
            return StatusCode::OK.into_response();
        }
    };

    match state.worker.set_state(&light_id, &request).await {
        Some(envelope) => Json(envelope).into_response(),
        None => {
            warn!(light_id = %light_id, "State change for unknown light");
            StatusCode::OK.into_response()
        }
    }
}

/// `GET /upnp/setup.xml`
pub async fn upnp_setup(State(state): State<Arc<AppState>>) -> Response {
    match setup_xml(&state.profile) {
        Ok(xml) => ([(header::CONTENT_TYPE, "application/xml")], xml).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to render UPnP descriptor");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
