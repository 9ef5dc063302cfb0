pub const SUBSCRIBERS_SEEDED: &str = "seed_users_total";
pub const INTERESTS_SEEDED: &str = "seed_interests_total";
