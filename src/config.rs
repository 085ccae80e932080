// src/config.rs

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

/// The three candidate extractions. Only one is active per run; the others
/// stay selectable through `SODUMP_QUERY`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryKind {
    Questions,
    AcceptedAnswers,
    Answers,
}

impl QueryKind {
    pub fn as_str(&self) -> &str {
        match self {
            QueryKind::Questions => "questions",
            QueryKind::AcceptedAnswers => "accepted-answers",
            QueryKind::Answers => "answers",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "questions" => Some(QueryKind::Questions),
            "accepted-answers" | "accepted_answers" => Some(QueryKind::AcceptedAnswers),
            "answers" => Some(QueryKind::Answers),
            _ => None,
        }
    }

    /// The warehouse table holding this extraction's post details.
    pub fn table(&self) -> &'static str {
        match self {
            QueryKind::Questions => "SO_GH_PYTHON_QUES_DETAILS",
            QueryKind::AcceptedAnswers => "SO_GH_PYTHON_ACC_ANS_DETAILS",
            QueryKind::Answers => "SO_GH_PYTHON_ANS_DETAILS",
        }
    }

    /// Output filename used when `SODUMP_OUT` is not set.
    pub fn default_out(&self) -> &'static str {
        match self {
            QueryKind::Questions => "SO_GH_PY_QUES_DETAILS.txt",
            QueryKind::AcceptedAnswers => "SO_GH_PY_ACC_ANS_DETAILS.txt",
            QueryKind::Answers => "SO_GH_PYTHON_ANS_DETAILS.txt",
        }
    }
}

/// Everything a run needs, resolved once at startup from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_id: String,
    pub credentials_path: PathBuf,
    pub dataset: String,
    pub query: QueryKind,
    pub location: String,
    pub out_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let project_id =
            env::var("GOOGLE_CLOUD_PROJECT").context("Please set env var GOOGLE_CLOUD_PROJECT")?;
        let credentials_path: PathBuf = env::var("GOOGLE_APPLICATION_CREDENTIALS")
            .context("Please set env var GOOGLE_APPLICATION_CREDENTIALS")?
            .into();
        let dataset = env::var("SODUMP_DATASET").unwrap_or_else(|_| "LOL".to_string());
        let query = match env::var("SODUMP_QUERY") {
            Ok(raw) => QueryKind::from_str(&raw).ok_or_else(|| {
                anyhow::anyhow!(
                    "unknown SODUMP_QUERY `{}` (expected questions, accepted-answers or answers)",
                    raw
                )
            })?,
            Err(_) => QueryKind::Answers,
        };
        let location = env::var("SODUMP_LOCATION").unwrap_or_else(|_| "US".to_string());
        let out_path = env::var("SODUMP_OUT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(query.default_out()));

        Ok(Config {
            project_id,
            credentials_path,
            dataset,
            query,
            location,
            out_path,
        })
    }

    /// The SQL submitted for this run.
    pub fn sql(&self) -> String {
        format!("SELECT * FROM `{}.{}`", self.dataset, self.query.table())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_kind_round_trips() {
        for kind in [
            QueryKind::Questions,
            QueryKind::AcceptedAnswers,
            QueryKind::Answers,
        ] {
            assert_eq!(QueryKind::from_str(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn query_kind_accepts_loose_spelling() {
        assert_eq!(
            QueryKind::from_str(" Accepted_Answers "),
            Some(QueryKind::AcceptedAnswers)
        );
        assert_eq!(QueryKind::from_str("ANSWERS"), Some(QueryKind::Answers));
        assert_eq!(QueryKind::from_str("posts"), None);
    }

    #[test]
    fn sql_targets_the_selected_table() {
        let config = Config {
            project_id: "proj".into(),
            credentials_path: "key.json".into(),
            dataset: "LOL".into(),
            query: QueryKind::Answers,
            location: "US".into(),
            out_path: "out.txt".into(),
        };
        assert_eq!(config.sql(), "SELECT * FROM `LOL.SO_GH_PYTHON_ANS_DETAILS`");
    }
}
