//! Count processed documents per topic and sentiment in fixed time windows.
use std::sync::Arc;

use anyhow::{Context, Result};
use common_metrics::{serve, setup_metrics_routes};
use common_redis::Client;
use envconfig::Envconfig;
use feed_aggregator::aggregator::{unix_now, Aggregator};
use feed_aggregator::config::Config;
use feed_common::stage::router;
use health::HealthRegistry;
use tracing::level_filters::LevelFilter;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[tokio::main]
async fn main() -> Result<()> {
    let log_layer = tracing_subscriber::fmt::layer().with_filter(
        EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .from_env_lossy(),
    );
    tracing_subscriber::registry().with(log_layer).init();

    let config = Config::init_from_env().context("failed to load configuration from env")?;
    config.validate().context("invalid configuration")?;

    let liveness = HealthRegistry::new("liveness");

    let client: Arc<dyn Client + Send + Sync> = Arc::new(
        config
            .redis
            .connect(config.retry_policy.policy())
            .await
            .context("failed to connect to redis")?,
    );

    let aggregator = Aggregator::new(client, config.settings(), unix_now())
        .await
        .context("failed to create aggregator")?;

    let aggregator_liveness = liveness
        .register("aggregator".to_string(), config.liveness_deadline.0)
        .await;

    let app = setup_metrics_routes(router(liveness, "feed aggregator"))
        .context("failed to install metrics recorder")?;
    let bind = config.bind();

    let aggregator_loop = tokio::spawn(aggregator.run(aggregator_liveness));
    let http_server = tokio::spawn(async move { serve(app, &bind).await });

    tokio::select! {
        res = aggregator_loop => {
            error!("aggregator loop exited");
            if let Ok(Err(e)) = res {
                error!("aggregator failed with: {}", e);
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
