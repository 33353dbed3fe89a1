use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::Config;
use crate::router;
use crate::sinks::file::FileSink;
use crate::sinks::print::PrintSink;
use crate::sinks::{LogSink, LogStore};

type Sinks = (
    Arc<dyn LogSink + Send + Sync>,
    Option<Arc<dyn LogStore + Send + Sync>>,
);

fn create_sinks(config: &Config) -> anyhow::Result<Sinks> {
    if config.print_sink {
        tracing::info!("logging device requests to stdout, log viewing routes disabled");
        let sink: Arc<dyn LogSink + Send + Sync> = Arc::new(PrintSink {});
        Ok((sink, None))
    } else {
        let file = Arc::new(FileSink::new(&config.log_file, &config.log_dir)?);
        tracing::info!(
            log_file = %config.log_file,
            log_dir = %config.log_dir,
            "logging device requests to files"
        );
        let sink: Arc<dyn LogSink + Send + Sync> = file.clone();
        let store: Arc<dyn LogStore + Send + Sync> = file;
        Ok((sink, Some(store)))
    }
}

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let (sink, logs) = create_sinks(&config).expect("failed to create log sink");

    let app = router::router(
        crate::time::SystemTime {},
        sink,
        logs,
        config.export_prometheus,
    );

    tracing::info!("listening on {:?}", listener.local_addr().unwrap());

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .unwrap()
}
