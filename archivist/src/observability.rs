use crate::config::{CommonConfig, MetricsConfig};
use metrics_exporter_statsd::StatsdBuilder;
use sentry::types::{Dsn, ParseDsnError};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(thiserror::Error, Debug)]
pub enum ObservabilityError {
    #[error("invalid sentry DSN: {0}")]
    InvalidDsn(#[from] ParseDsnError),
    #[error("could not create statsd exporter: {0}")]
    Statsd(#[from] metrics_exporter_statsd::StatsdError),
    #[error("a metrics recorder is already installed")]
    RecorderInstalled,
}

/// Keeps error reporting alive until the process exits.
pub struct Guard {
    _sentry: Option<sentry::ClientInitGuard>,
}

/// Installs logging, error reporting and metrics as configured. Logs go to
/// stderr so command output on stdout stays machine readable.
pub fn init(config: &CommonConfig) -> Result<Guard, ObservabilityError> {
    let dsn = config
        .logging
        .as_ref()
        .and_then(|logging| logging.sentry_dsn.as_deref());

    let sentry = match dsn {
        Some(dsn) => {
            let dsn: Dsn = dsn.parse()?;
            Some(sentry::init(sentry::ClientOptions {
                dsn: Some(dsn),
                release: sentry::release_name!(),
                ..Default::default()
            }))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry.is_some().then(sentry::integrations::tracing::layer))
        .init();

    if let Some(metrics) = &config.metrics {
        init_metrics(metrics)?;
    }

    Ok(Guard { _sentry: sentry })
}

fn init_metrics(config: &MetricsConfig) -> Result<(), ObservabilityError> {
    let recorder = StatsdBuilder::from(config.statsd_host.as_str(), config.statsd_port)
        .build(Some(config.prefix.as_str()))?;
    metrics::set_global_recorder(recorder).map_err(|_| ObservabilityError::RecorderInstalled)?;
    catalog::metrics_defs::describe_all();

    tracing::debug!(
        host = %config.statsd_host,
        port = config.statsd_port,
        metrics = catalog::metrics_defs::ALL_METRICS.len(),
        "Installed statsd exporter"
    );
    Ok(())
}
