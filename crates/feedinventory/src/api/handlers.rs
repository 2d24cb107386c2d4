use std::sync::Arc;

use api_types::ReplicaRequirements;
use poem::handler;
use poem::http::StatusCode;
use poem::web::Data;
use poem::Body;
use poem::IntoResponse;
use tracing::info;
use tracing::warn;

use crate::domain::predictor::CapacityPredictor;

/// Maximum replicas the cluster accepts for the posted requirements.
///
/// The body is a JSON `ReplicaRequirements`. Unreadable or malformed bodies
/// are logged and estimated as empty requirements, so the endpoint always
/// answers with a decimal integer.
#[handler]
pub async fn max_acceptable_replicas(
    body: Body,
    predictor: Data<&Arc<CapacityPredictor>>,
) -> String {
    let requirements = match body.into_vec().await {
        Ok(bytes) => serde_json::from_slice::<ReplicaRequirements>(&bytes).unwrap_or_else(|e| {
            warn!("Failed to decode replica requirements: {e}");
            ReplicaRequirements::default()
        }),
        Err(e) => {
            warn!("Failed to read request body: {e}");
            ReplicaRequirements::default()
        }
    };

    let replicas = predictor.estimate(&requirements);
    info!(replicas, "Estimated acceptable replicas");
    replicas.to_string()
}

/// Reserved for reporting unschedulable replicas; always answers empty.
#[handler]
pub async fn unschedulable_replicas() -> StatusCode {
    StatusCode::OK
}

/// `ok` once the node cache has synced, 503 before.
#[handler]
pub async fn healthz(predictor: Data<&Arc<CapacityPredictor>>) -> impl IntoResponse {
    if predictor.is_ready() {
        "ok".with_status(StatusCode::OK)
    } else {
        "node cache not synced".with_status(StatusCode::SERVICE_UNAVAILABLE)
    }
}
