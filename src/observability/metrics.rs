//! Prometheus export of the `metrics` facade.
//!
//! The adapter records `db_operations_total`, `db_operation_duration_ms`,
//! `db_retries_total` and `db_connections_in_use` through the facade; this
//! module installs the recorder and, when asked, an HTTP scrape listener.

use crate::{Error, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use std::net::SocketAddr;
use std::thread;

/// Installs the Prometheus recorder with a scrape listener on `listen_addr`.
///
/// Outside a tokio runtime the listener gets its own single-threaded runtime
/// on a dedicated thread.
///
/// # Errors
///
/// Returns an error if a recorder is already installed or the listener
/// cannot be built.
pub fn install_prometheus(listen_addr: SocketAddr) -> Result<PrometheusHandle> {
    let builder = PrometheusBuilder::new().with_http_listener(listen_addr);
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        return install_with_runtime(builder, &handle);
    }
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::OperationFailed {
            operation: "metrics_runtime_init".to_string(),
            cause: e.to_string(),
        })?;
    let handle = runtime.handle().clone();
    let prometheus = install_with_runtime(builder, &handle)?;
    thread::Builder::new()
        .name("metrics-exporter-prometheus-http".to_string())
        .spawn(move || runtime.block_on(async { std::future::pending::<()>().await }))
        .map_err(|e| Error::OperationFailed {
            operation: "metrics_runtime_thread".to_string(),
            cause: e.to_string(),
        })?;
    tracing::info!(%listen_addr, "Prometheus exporter listening");
    Ok(prometheus)
}

/// Installs the recorder without a listener; render through the handle.
///
/// # Errors
///
/// Returns an error if a recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle> {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    set_global_recorder(recorder)?;
    Ok(handle)
}

fn install_with_runtime(
    builder: PrometheusBuilder,
    runtime_handle: &tokio::runtime::Handle,
) -> Result<PrometheusHandle> {
    let (recorder, exporter) = {
        let _guard = runtime_handle.enter();
        builder.build().map_err(|e| Error::OperationFailed {
            operation: "metrics_exporter_build".to_string(),
            cause: e.to_string(),
        })?
    };
    let handle = recorder.handle();
    set_global_recorder(recorder)?;
    runtime_handle.spawn(exporter);
    Ok(handle)
}

fn set_global_recorder(recorder: PrometheusRecorder) -> Result<()> {
    metrics::set_global_recorder(recorder).map_err(|e| Error::OperationFailed {
        operation: "metrics_recorder_install".to_string(),
        cause: e.to_string(),
    })
}
