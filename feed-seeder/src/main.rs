//! Register synthetic subscribers and their topic interests.
use std::sync::Arc;

use anyhow::{Context, Result};
use common_metrics::{serve, setup_metrics_routes};
use common_redis::Client;
use envconfig::Envconfig;
use feed_common::stage::router;
use feed_seeder::config::Config;
use feed_seeder::seeder::Seeder;
use health::HealthRegistry;
use rand::rngs::StdRng;
use rand::SeedableRng;
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

    let liveness = HealthRegistry::new("liveness");

    let client: Arc<dyn Client + Send + Sync> = Arc::new(
        config
            .redis
            .connect(config.retry_policy.policy())
            .await
            .context("failed to connect to redis")?,
    );

    let seeder = Seeder::new(client, StdRng::from_entropy(), config.rate, config.limit)
        .context("failed to create seeder")?;

    let seeder_liveness = liveness
        .register("seeder".to_string(), config.liveness_deadline.0)
        .await;

    let app = setup_metrics_routes(router(liveness, "feed seeder"))
        .context("failed to install metrics recorder")?;
    let bind = config.bind();

    let seeder_loop = tokio::spawn(seeder.run(seeder_liveness));
    let http_server = tokio::spawn(async move { serve(app, &bind).await });

    tokio::select! {
        res = seeder_loop => {
            info!("seeder loop exited");
            if let Ok(Err(e)) = res {
                error!("seeder failed with: {}", e);
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
