use crate::config::Config;
use crate::server::{HttpServer, SharedState};
use crate::telemetry::Metrics;
use crate::upload::UploadStore;

use std::{error::Error, sync::Arc};
use tokio::{signal, sync::broadcast};
use tomato_diagnosis::DiagnosisService;

pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    let diagnosis = {
        let model = config.model.clone();
        let admission = config.admission.clone();
        tokio::task::spawn_blocking(move || DiagnosisService::from_config(&model, &admission))
            .await?
    };
    if !diagnosis.is_model_available() {
        tracing::error!("Model not available, predictions will be refused until restart");
    }

    let uploads = match UploadStore::new(&config.uploads.dir).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to prepare upload directory: {:?}", e);
            return Err(Box::new(e));
        }
    };

    let metrics = Metrics::new()?;

    let state = SharedState {
        diagnosis: Arc::new(diagnosis),
        uploads: Arc::new(uploads),
        metrics: Arc::new(metrics),
    };

    let server = HttpServer::new(state, &config).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_shutdown_rx = shutdown_tx.subscribe();

    let server_handle = server.run(server_shutdown_rx).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    let _ = server_handle.await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
