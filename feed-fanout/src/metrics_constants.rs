pub const DOCUMENTS_IN: &str = "fan_in_total";
pub const DELIVERIES_OUT: &str = "fan_out_total";
pub const DUPLICATES_SKIPPED: &str = "fanout_duplicates_skipped_total";
pub const FEED_PUSHES: &str = "feed_push_total";

pub const TOPIC_LOG_LENGTH: &str = "topic_stream_len";
pub const TOPIC_SUBSCRIBERS: &str = "topic_subscribers";
pub const TOPIC_TRIM_OPS: &str = "topic_stream_trim_ops_total";
pub const TOPIC_TRIMMED_ENTRIES: &str = "topic_stream_trimmed_entries_total";

pub const ROUND_TIME: &str = "fanout_round_ms";
