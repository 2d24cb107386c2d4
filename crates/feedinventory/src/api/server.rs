use std::sync::Arc;
use std::time::Duration;

use error_stack::Report;
use poem::listener::TcpListener;
use poem::middleware::Tracing;
use poem::Endpoint;
use poem::EndpointExt;
use poem::Route;
use poem::Server;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;

use super::errors::ApiError;
use super::handlers::healthz;
use super::handlers::max_acceptable_replicas;
use super::handlers::unschedulable_replicas;
use crate::domain::predictor::CapacityPredictor;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// HTTP server answering replica capacity queries
pub struct PredictorServer {
    predictor: Arc<CapacityPredictor>,
    listen_addr: String,
}

impl PredictorServer {
    pub fn new(predictor: Arc<CapacityPredictor>, listen_addr: String) -> Self {
        Self {
            predictor,
            listen_addr,
        }
    }

    pub fn routes(&self) -> impl Endpoint {
        routes(self.predictor.clone())
    }

    /// Serves until `token` is cancelled, then lets in-flight requests finish.
    ///
    /// # Errors
    ///
    /// - [`ApiError::ServerError`] if the server fails to bind or serve
    pub async fn run(self, token: CancellationToken) -> Result<(), Report<ApiError>> {
        info!("Starting predictor HTTP server on {}", self.listen_addr);

        let app = self.routes();
        let server = Server::new(TcpListener::bind(&self.listen_addr));
        let result = server
            .run_with_graceful_shutdown(
                app,
                async move { token.cancelled().await },
                Some(SHUTDOWN_GRACE),
            )
            .await;

        match result {
            Ok(()) => {
                info!("Predictor HTTP server stopped");
                Ok(())
            }
            Err(e) => {
                error!("Predictor HTTP server failed: {e}");
                Err(Report::new(ApiError::ServerError {
                    message: format!("Server failed on {}: {e}", self.listen_addr),
                }))
            }
        }
    }
}

pub fn routes(predictor: Arc<CapacityPredictor>) -> impl Endpoint {
    Route::new()
        .at("/accept", max_acceptable_replicas)
        .at("/unschedul", unschedulable_replicas)
        .at("/healthz", healthz)
        .data(predictor)
        .with(Tracing)
}
