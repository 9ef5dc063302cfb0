//! Consume enriched documents, attach a sentiment and republish them for aggregation.
use std::sync::Arc;

use anyhow::{Context, Result};
use common_metrics::{serve, setup_metrics_routes};
use common_redis::Client;
use envconfig::Envconfig;
use feed_common::document::{Sentiment, TopicDocument};
use feed_common::scorer::{HttpScorer, LexiconSentiment, Scorer};
use feed_common::stage::router;
use feed_sentiment::config::Config;
use feed_sentiment::sentiment::SentimentStage;
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
    let retry_policy = config.retry_policy.policy();

    let client: Arc<dyn Client + Send + Sync> = Arc::new(
        config
            .redis
            .connect(retry_policy.clone())
            .await
            .context("failed to connect to redis")?,
    );

    let scorer: Arc<dyn Scorer<TopicDocument, Sentiment>> = match &config.scorer.scorer_url {
        Some(url) => {
            info!(url = url.as_str(), "scoring sentiment with remote scorer");
            Arc::new(
                HttpScorer::new(url.as_str().to_string(), config.scorer.scorer_timeout.0)
                    .context("failed to build scorer client")?,
            )
        }
        None => Arc::new(LexiconSentiment),
    };

    let stage = SentimentStage::new(client, scorer, retry_policy, config.settings())
        .await
        .context("failed to create sentiment stage")?;

    let stage_liveness = liveness
        .register("sentiment".to_string(), config.liveness_deadline.0)
        .await;

    let app = setup_metrics_routes(router(liveness, "feed sentiment"))
        .context("failed to install metrics recorder")?;
    let bind = config.bind();

    let stage_loop = tokio::spawn(stage.run(stage_liveness));
    let http_server = tokio::spawn(async move { serve(app, &bind).await });

    tokio::select! {
        res = stage_loop => {
            error!("sentiment loop exited");
            if let Ok(Err(e)) = res {
                error!("sentiment stage failed with: {}", e);
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
