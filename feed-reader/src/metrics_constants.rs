pub const POPS: &str = "reader_pops_total";
pub const EMPTY_POPS: &str = "reader_empty_pops_total";
pub const POP_TIME: &str = "reader_pop_latency_ms";

pub const FEED_LENGTH: &str = "feed_len";
pub const FEED_BACKLOG: &str = "feed_backlog";
pub const TARGET_RATE: &str = "reader_target_rps";
pub const POPULATION: &str = "reader_population";
