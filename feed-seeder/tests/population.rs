use std::sync::Arc;
use std::time::Duration;

use assert_json_diff::assert_json_eq;
use common_redis::{Client, MockRedisClient};
use feed_common::keys::{subscribers_index, user_profile, LATEST_UID};
use feed_common::topic::Topic;
use feed_seeder::seeder::{Profile, Seeder};
use health::HealthRegistry;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;

#[tokio::test]
async fn seeded_profiles_match_the_subscriber_index() {
    let client = MockRedisClient::new();
    let seeder = Seeder::new(
        Arc::new(client.clone()),
        StdRng::seed_from_u64(11),
        1000.0,
        Some(6),
    )
    .unwrap();

    let handle = HealthRegistry::new("liveness")
        .register("seeder".to_string(), Duration::from_secs(30))
        .await;
    seeder.run(handle).await.unwrap();

    assert_eq!(client.scalar(LATEST_UID), Some("5".to_string()));

    for uid in 0..6u64 {
        let stored = client.scalar(&user_profile(uid)).expect("profile stored");
        let profile: Profile = serde_json::from_str(&stored).unwrap();
        assert_eq!(profile.uid, uid);

        for topic in Topic::ALL {
            let indexed = client
                .zrange(subscribers_index(topic))
                .await
                .unwrap()
                .contains(&uid.to_string());
            assert_eq!(indexed, profile.interests.contains(&topic), "uid {uid} {topic}");
        }
    }
}

#[test]
fn profile_layout() {
    let profile = Profile {
        uid: 3,
        interests: vec![Topic::Science, Topic::Finance],
    };
    assert_json_eq!(
        serde_json::to_value(&profile).unwrap(),
        json!({"uid": 3, "interests": ["science", "finance"]})
    );
}
