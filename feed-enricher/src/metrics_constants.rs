pub const DOCUMENTS_IN: &str = "enrich_in_total";
pub const DOCUMENTS_OUT: &str = "enrich_out_total";
pub const FALLBACK_DOCUMENTS: &str = "enrich_fallback_documents_total";
pub const EMPTY_ENTRIES: &str = "enrich_empty_entries_total";

pub const SCORER_TIME: &str = "enrich_classifier_latency_ms";
pub const BATCHES_SKIPPED: &str = "enrich_batches_skipped_total";

pub const RAW_LOG_LENGTH: &str = "news_raw_len";
pub const RAW_TRIM_OPS: &str = "news_raw_trim_ops_total";
pub const RAW_TRIMMED_ENTRIES: &str = "news_raw_trimmed_entries_total";
