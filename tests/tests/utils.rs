use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use tracing::error;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

static PROMETHEUS: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install logging and a metrics recorder for the test binary. Safe to call from every test.
#[allow(unused)]
pub fn init() -> &'static PrometheusHandle {
    PROMETHEUS.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
        }));

        let _ = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("barrage=debug,mock_service=debug")),
            )
            .with_test_writer()
            .try_init();

        PrometheusBuilder::new().install_recorder().unwrap()
    })
}
