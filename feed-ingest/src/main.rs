//! Publish news articles to the raw log at a fixed pace.
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use common_metrics::{serve, setup_metrics_routes};
use common_redis::Client;
use envconfig::Envconfig;
use feed_common::stage::router;
use feed_ingest::config::Config;
use feed_ingest::ingest::Ingester;
use health::HealthRegistry;
use tracing::level_filters::LevelFilter;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

fn millis_since_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_layer = tracing_subscriber::fmt::layer().with_filter(
        EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .from_env_lossy(),
    );
    tracing_subscriber::registry().with(log_layer).init();

    let config = Config::init_from_env().context("failed to load configuration from env")?;
    let source = config.source().context("failed to open document source")?;

    let liveness = HealthRegistry::new("liveness");

    let client: Arc<dyn Client + Send + Sync> = Arc::new(
        config
            .redis
            .connect(config.retry_policy.policy())
            .await
            .context("failed to connect to redis")?,
    );

    let first_id = config.first_id.unwrap_or_else(millis_since_epoch);
    let ingester = Ingester::new(client, source, config.rate, first_id)
        .context("failed to create ingester")?;

    let ingest_liveness = liveness
        .register("ingest".to_string(), config.liveness_deadline.0)
        .await;

    let app = setup_metrics_routes(router(liveness, "feed ingest"))
        .context("failed to install metrics recorder")?;
    let bind = config.bind();

    let ingest_loop = tokio::spawn(ingester.run(ingest_liveness));
    let http_server = tokio::spawn(async move { serve(app, &bind).await });

    tokio::select! {
        res = ingest_loop => {
            info!("ingest loop exited");
            if let Ok(Err(e)) = res {
                error!("ingest failed with: {}", e);
                return Err(e.into());
            }
        }
        res = http_server => {
            error!("http server exited");
            if let Ok(Err(e)) = res {
                error!("server failed with: {}", e);
                return Err(e.into());
            }
        }
    }

    info!("exiting");
    Ok(())
}
