//! Deliver topic documents into the feeds of their subscribers.
use std::sync::Arc;

use anyhow::{Context, Result};
use common_metrics::{serve, setup_metrics_routes};
use common_redis::Client;
use envconfig::Envconfig;
use feed_common::stage::router;
use feed_fanout::config::Config;
use feed_fanout::fanout::Fanout;
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

    let fanout = Fanout::new(client, config.settings())
        .await
        .context("failed to create fanout")?;

    let fanout_liveness = liveness
        .register("fanout".to_string(), config.liveness_deadline.0)
        .await;

    let app = setup_metrics_routes(router(liveness, "feed fanout"))
        .context("failed to install metrics recorder")?;
    let bind = config.bind();

    let fanout_loop = tokio::spawn(fanout.run(fanout_liveness));
    let http_server = tokio::spawn(async move { serve(app, &bind).await });

    tokio::select! {
        res = fanout_loop => {
            error!("fanout loop exited");
            if let Ok(Err(e)) = res {
                error!("fanout failed with: {}", e);
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
