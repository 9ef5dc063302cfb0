use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The fixed set of topics documents are routed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Politics,
    Business,
    Technology,
    Sports,
    Health,
    Climate,
    Science,
    Education,
    Entertainment,
    Finance,
}

impl Topic {
    pub const ALL: [Topic; 10] = [
        Topic::Politics,
        Topic::Business,
        Topic::Technology,
        Topic::Sports,
        Topic::Health,
        Topic::Climate,
        Topic::Science,
        Topic::Education,
        Topic::Entertainment,
        Topic::Finance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Politics => "politics",
            Topic::Business => "business",
            Topic::Technology => "technology",
            Topic::Sports => "sports",
            Topic::Health => "health",
            Topic::Climate => "climate",
            Topic::Science => "science",
            Topic::Education => "education",
            Topic::Entertainment => "entertainment",
            Topic::Finance => "finance",
        }
    }

    /// Lower-case words that vote for this topic.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Topic::Politics => &[
                "election", "senate", "parliament", "minister", "president", "vote", "policy",
                "government", "campaign", "congress",
            ],
            Topic::Business => &[
                "company", "merger", "startup", "ceo", "revenue", "retail", "industry",
                "acquisition", "earnings", "corporate",
            ],
            Topic::Technology => &[
                "software", "ai", "chip", "app", "internet", "robot", "cyber", "computer",
                "smartphone", "cloud",
            ],
            Topic::Sports => &[
                "match", "league", "goal", "tournament", "coach", "championship", "player",
                "season", "olympic", "team",
            ],
            Topic::Health => &[
                "hospital", "vaccine", "disease", "doctor", "patients", "medical", "virus",
                "treatment", "nutrition", "mental",
            ],
            Topic::Climate => &[
                "climate", "emissions", "carbon", "warming", "renewable", "drought", "flood",
                "wildfire", "solar", "glacier",
            ],
            Topic::Science => &[
                "research", "scientists", "study", "space", "nasa", "physics", "telescope",
                "experiment", "discovery", "species",
            ],
            Topic::Education => &[
                "school", "university", "students", "teachers", "exam", "curriculum", "campus",
                "tuition", "classroom", "degree",
            ],
            Topic::Entertainment => &[
                "film", "movie", "music", "celebrity", "album", "festival", "actor", "series",
                "concert", "award",
            ],
            Topic::Finance => &[
                "stocks", "market", "bank", "inflation", "interest", "investors", "bond",
                "currency", "shares", "fund",
            ],
        }
    }

    /// Keyword vote over the text. Ties go to the topic listed first. Text without any keyword
    /// gets a topic picked from a byte checksum, so unmatched documents still spread out.
    pub fn classify(text: &str) -> Topic {
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();

        let mut best = None;
        let mut best_hits = 0;
        for topic in Topic::ALL {
            let hits = words
                .iter()
                .filter(|w| topic.keywords().contains(&w.as_str()))
                .count();
            if hits > best_hits {
                best = Some(topic);
                best_hits = hits;
            }
        }

        best.unwrap_or_else(|| {
            let spread = text.bytes().fold(0usize, |acc, b| acc.wrapping_add(b as usize));
            Topic::ALL[spread % Topic::ALL.len()]
        })
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct UnknownTopicError(pub String);

impl fmt::Display for UnknownTopicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown topic: {}", self.0)
    }
}

impl FromStr for Topic {
    type Err = UnknownTopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Topic::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| UnknownTopicError(s.to_string()))
    }
}
