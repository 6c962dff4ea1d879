use std::sync::Arc;

use tracing::info;

use embednet::{terminate_signal, BrokerConfig, ByteFrequencyEmbeddings, EmbedService};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = BrokerConfig::from_env();
    info!(
        pool_size = config.pool_size,
        max_pending = config.max_pending,
        "starting embednet"
    );

    let service = EmbedService::open(config, Arc::new(ByteFrequencyEmbeddings::new(256)));
    let mut control = service.server_control();

    service.run_until(terminate_signal()).await;

    control.stopped().await;
    service.close().await;
    info!("embednet stopped");
}
