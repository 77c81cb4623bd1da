//! Rule engine for custom channels.
//!
//! Evaluation short-circuits in a fixed order: quality, content type,
//! excludes, includes. Empty rules match everything.

use serde::{Deserialize, Serialize};

use crate::article::Article;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Rules {
    /// Match if the article has at least one; empty means unrestricted.
    #[serde(default)]
    pub include_topics: Vec<String>,
    /// No article with any of these matches.
    #[serde(default)]
    pub exclude_topics: Vec<String>,
    #[serde(default)]
    pub min_quality_score: Option<f64>,
    /// Article content type must be in this set; empty means unrestricted.
    #[serde(default)]
    pub content_types: Vec<String>,
}

impl Rules {
    pub fn matches(&self, article: &Article) -> bool {
        if let Some(min) = self.min_quality_score {
            if article.quality_score < min {
                return false;
            }
        }

        if !self.content_types.is_empty()
            && !self.content_types.iter().any(|t| t == &article.content_type)
        {
            return false;
        }

        if self
            .exclude_topics
            .iter()
            .any(|t| article.topics.contains(t))
        {
            return false;
        }

        if !self.include_topics.is_empty()
            && !self.include_topics.iter().any(|t| article.topics.contains(t))
        {
            return false;
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn article(quality: f64, content_type: &str, topics: &[&str]) -> Article {
        Article {
            id: "a1".into(),
            index: "x_classified_content".into(),
            classified_at: Utc::now(),
            quality_score: quality,
            topics: topics.iter().map(|s| s.to_string()).collect(),
            content_type: content_type.into(),
            crime: None,
            location: None,
            mining: None,
            entertainment: None,
            anishinaabe: None,
            coforge: None,
            payload: json!({}),
        }
    }

    #[test]
    fn empty_rules_match_everything() {
        let rules = Rules::default();
        assert!(rules.matches(&article(0.0, "", &[])));
        assert!(rules.matches(&article(99.0, "opinion", &["anything"])));
    }

    #[test]
    fn quality_gate() {
        let rules = Rules {
            min_quality_score: Some(60.0),
            ..Default::default()
        };
        assert!(rules.matches(&article(60.0, "news", &[])));
        assert!(!rules.matches(&article(59.9, "news", &[])));
    }

    #[test]
    fn content_type_gate() {
        let rules = Rules {
            content_types: vec!["news".into(), "analysis".into()],
            ..Default::default()
        };
        assert!(rules.matches(&article(50.0, "analysis", &[])));
        assert!(!rules.matches(&article(50.0, "opinion", &[])));
    }

    #[test]
    fn excludes_beat_includes() {
        let rules = Rules {
            include_topics: vec!["mining".into()],
            exclude_topics: vec!["opinion".into()],
            ..Default::default()
        };
        assert!(rules.matches(&article(50.0, "news", &["mining"])));
        assert!(!rules.matches(&article(50.0, "news", &["mining", "opinion"])));
    }

    #[test]
    fn include_requires_at_least_one() {
        let rules = Rules {
            include_topics: vec!["crime".into(), "courts".into()],
            ..Default::default()
        };
        assert!(rules.matches(&article(50.0, "news", &["courts", "local"])));
        assert!(!rules.matches(&article(50.0, "news", &["local"])));
    }

    #[test]
    fn rules_deserialize_from_partial_json() {
        let rules: Rules = serde_json::from_value(json!({
            "min_quality_score": 70,
        }))
        .unwrap();
        assert_eq!(rules.min_quality_score, Some(70.0));
        assert!(rules.include_topics.is_empty());
        assert!(rules.matches(&article(75.0, "news", &[])));
    }
}
