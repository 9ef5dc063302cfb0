use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use common_redis::MockRedisClient;
use feed_common::document::{LogDocument, RawDocument};
use feed_common::keys::RAW_LOG;
use feed_ingest::ingest::Ingester;
use feed_ingest::source::CsvSource;
use health::HealthRegistry;

#[tokio::test]
async fn replay_file_is_published_in_order_then_stops() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "id,title,text").unwrap();
    writeln!(file, "a1,Senate passes budget,Lawmakers voted late").unwrap();
    writeln!(file, "a2,\"Storm, then floods\",Rivers rose overnight").unwrap();
    writeln!(file, "a3,,missing title").unwrap();
    writeln!(file, "a4,Telescope launch,Scientists cheer").unwrap();
    file.flush().unwrap();

    let client = MockRedisClient::new();
    let ingester = Ingester::new(
        Arc::new(client.clone()),
        Box::new(CsvSource::open(file.path(), false).unwrap()),
        1000.0,
        100,
    )
    .unwrap();

    let liveness = HealthRegistry::new("liveness");
    let handle = liveness
        .register("ingest".to_string(), Duration::from_secs(30))
        .await;
    ingester.run(handle).await.unwrap();

    let docs: Vec<RawDocument> = client
        .log_entries(RAW_LOG)
        .iter()
        .filter_map(|e| RawDocument::from_entry(e).into_inner())
        .collect();
    let published: Vec<(&str, &str)> = docs
        .iter()
        .map(|d| (d.id.as_str(), d.title.as_str()))
        .collect();
    assert_eq!(
        published,
        vec![
            ("100", "Senate passes budget"),
            ("101", "Storm, then floods"),
            ("102", "Telescope launch"),
        ]
    );
    assert_eq!(docs[1].body, "Rivers rose overnight");
}
