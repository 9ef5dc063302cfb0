//! Where ingested articles come from: a replayed CSV file or a synthetic corpus.

use std::fs::File;
use std::path::{Path, PathBuf};

use common_metrics::inc;
use feed_common::topic::Topic;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::IngestError;
use crate::metrics_constants::{ROWS_SKIPPED, SOURCE_RESTARTS};

/// An article before it gets an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub title: String,
    pub body: String,
}

pub trait DocumentSource: Send {
    /// The next article, or `None` once the source is exhausted.
    fn next_article(&mut self) -> Option<Article>;
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    title: String,
    #[serde(default, alias = "body")]
    text: String,
}

/// Replays the rows of a CSV file with a `title` and a `text` (or `body`) column, in order.
///
/// Other columns are ignored. Rows that fail to parse, or have an empty title, are skipped.
pub struct CsvSource {
    path: PathBuf,
    looping: bool,
    rows: csv::DeserializeRecordsIntoIter<File, CsvRow>,
}

impl CsvSource {
    pub fn open(path: impl Into<PathBuf>, looping: bool) -> Result<Self, IngestError> {
        let path = path.into();
        let rows = Self::rows(&path)?;
        info!(path = %path.display(), looping, "replaying articles from file");
        Ok(Self {
            path,
            looping,
            rows,
        })
    }

    fn rows(path: &Path) -> Result<csv::DeserializeRecordsIntoIter<File, CsvRow>, IngestError> {
        let reader = csv::Reader::from_path(path).map_err(|source| IngestError::ReplayFile {
            path: path.display().to_string(),
            source,
        })?;
        Ok(reader.into_deserialize())
    }

    /// Next valid row of the current pass over the file.
    fn next_in_pass(&mut self) -> Option<Article> {
        for row in self.rows.by_ref() {
            match row {
                Ok(row) if !row.title.trim().is_empty() => {
                    return Some(Article {
                        title: row.title,
                        body: row.text,
                    })
                }
                Ok(_) => {
                    warn!("skipping row without a title");
                    inc(ROWS_SKIPPED, &[], 1);
                }
                Err(e) => {
                    warn!(error = %e, "skipping malformed row");
                    inc(ROWS_SKIPPED, &[], 1);
                }
            }
        }
        None
    }
}

impl DocumentSource for CsvSource {
    fn next_article(&mut self) -> Option<Article> {
        if let Some(article) = self.next_in_pass() {
            return Some(article);
        }
        if !self.looping {
            return None;
        }

        self.rows = match Self::rows(&self.path) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "could not reopen replay file, stopping");
                return None;
            }
        };
        inc(SOURCE_RESTARTS, &[], 1);
        // A file with no valid row at all ends the replay instead of spinning
        self.next_in_pass()
    }
}

/// A fixed set of generated articles, cycled forever. Each one leans clearly towards a topic.
pub struct SyntheticSource {
    corpus: Vec<Article>,
    cursor: usize,
}

impl SyntheticSource {
    pub fn new(size: usize) -> Result<Self, IngestError> {
        if size == 0 {
            return Err(IngestError::InvalidConfiguration(
                "synthetic corpus must hold at least one article".to_string(),
            ));
        }
        Ok(Self {
            corpus: (0..size).map(synthetic_article).collect(),
            cursor: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.corpus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corpus.is_empty()
    }
}

impl DocumentSource for SyntheticSource {
    fn next_article(&mut self) -> Option<Article> {
        let article = self.corpus.get(self.cursor).cloned();
        self.cursor = (self.cursor + 1) % self.corpus.len();
        article
    }
}

const MOODS: [&str; 3] = ["record growth and strong", "no change in", "crisis and decline in"];

fn synthetic_article(n: usize) -> Article {
    let topic = Topic::ALL[n % Topic::ALL.len()];
    let keywords = topic.keywords();
    let first = keywords[n % keywords.len()];
    let second = keywords[(n / Topic::ALL.len() + 1) % keywords.len()];
    let mood = MOODS[n % MOODS.len()];

    Article {
        title: format!("{mood} {first} news #{n}"),
        body: format!("Reporters follow the {first} and {second} story as it develops."),
    }
}
