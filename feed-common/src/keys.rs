//! Names of every log, group and index the pipeline shares.

use crate::topic::Topic;

pub const RAW_LOG: &str = "news_raw";
pub const ENRICH_GROUP: &str = "cg_enrich";

pub const ENRICHED_LOG: &str = "news_cls";
pub const SENTIMENT_GROUP: &str = "cg_sent";

pub const PROCESSED_LOG: &str = "news_proc";
pub const AGGREGATOR_GROUP: &str = "cg_agg";

pub const STATS_LOG: &str = "stats";
pub const STATS_BUCKET_FIELD: &str = "bucket";

/// Highest subscriber id handed out so far.
pub const LATEST_UID: &str = "latest_uid";
/// Counter the seeder allocates subscriber ids from.
pub const UID_SEQUENCE: &str = "uid_seq";

pub const SEEN_PREFIX: &str = "feed_seen:";

pub fn topic_log(topic: Topic) -> String {
    format!("topic:{topic}")
}

pub fn topic_group(topic: Topic) -> String {
    format!("cg_{topic}")
}

pub fn subscribers_index(topic: Topic) -> String {
    format!("user:topic:{topic}")
}

pub fn user_profile(uid: u64) -> String {
    format!("user:{uid}")
}

pub fn feed(uid: u64) -> String {
    format!("feed:{uid}")
}

pub fn feed_tail(uid: u64) -> String {
    format!("feed_stream:{uid}")
}

pub fn bucket(window_start: u64) -> String {
    format!("bucket:{window_start}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(topic_log(Topic::Science), "topic:science");
        assert_eq!(topic_group(Topic::Science), "cg_science");
        assert_eq!(subscribers_index(Topic::Finance), "user:topic:finance");
        assert_eq!(user_profile(3), "user:3");
        assert_eq!(feed(3), "feed:3");
        assert_eq!(feed_tail(3), "feed_stream:3");
        assert_eq!(bucket(1_700_000_040), "bucket:1700000040");
    }
}
