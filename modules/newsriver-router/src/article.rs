//! Flat article projection over classified documents.
//!
//! Classifier output lives in per-source `{source}_classified_content`
//! indexes; the router projects each hit into an [`Article`] before
//! routing. Unknown or missing optional fields degrade gracefully; only
//! `classified_at` is load-bearing (it drives the cursor).

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use docstore_client::SearchHit;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CrimeMeta {
    #[serde(default)]
    pub homepage_eligible: bool,
    #[serde(default)]
    pub category_pages: Vec<String>,
    #[serde(default)]
    pub peripheral: bool,
    /// For peripheral crime: `courts` or `context`.
    #[serde(default)]
    pub sub_label: Option<String>,
}

impl CrimeMeta {
    /// Empty crime metadata routes nowhere.
    pub fn is_empty(&self) -> bool {
        !self.homepage_eligible
            && self.category_pages.is_empty()
            && !self.peripheral
            && self.sub_label.is_none()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocationMeta {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub province: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

impl LocationMeta {
    /// Enough specificity for per-place channels.
    pub fn is_specific(&self) -> bool {
        self.city.is_some() || self.province.is_some()
    }

    pub fn is_canada(&self) -> bool {
        matches!(
            self.country.as_deref().map(str::to_lowercase).as_deref(),
            Some("canada") | Some("ca")
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MiningMeta {
    #[serde(default)]
    pub relevance: Option<String>,
    #[serde(default)]
    pub commodities: Vec<String>,
    #[serde(default)]
    pub stage: Option<String>,
    /// Mining keeps its own geography, outside the location domain.
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntertainmentMeta {
    #[serde(default)]
    pub homepage_eligible: bool,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub peripheral: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnishinaabeMeta {
    #[serde(default)]
    pub categories: Vec<String>,
}

/// Product-specific classification (the coforge domain). No catch-all:
/// routing requires an explicit core/peripheral call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CoforgeMeta {
    /// `core` or `peripheral`.
    #[serde(default)]
    pub classification: Option<String>,
    #[serde(default)]
    pub audiences: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub industries: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Article {
    /// Document id in the classified index.
    pub id: String,
    pub index: String,
    pub classified_at: DateTime<Utc>,
    pub quality_score: f64,
    pub topics: Vec<String>,
    pub content_type: String,
    pub crime: Option<CrimeMeta>,
    pub location: Option<LocationMeta>,
    pub mining: Option<MiningMeta>,
    pub entertainment: Option<EntertainmentMeta>,
    pub anishinaabe: Option<AnishinaabeMeta>,
    pub coforge: Option<CoforgeMeta>,
    /// Full classified document, republished verbatim on the bus.
    pub payload: Value,
}

impl Article {
    /// Project a search hit. `None` when the document has no usable
    /// `classified_at`. Such a document can't be cursored past safely.
    pub fn project(hit: &SearchHit) -> Option<Article> {
        let source = &hit.source;
        let classified_at = source
            .get("classified_at")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))?;

        Some(Article {
            id: hit.id.clone(),
            index: hit.index.clone(),
            classified_at,
            quality_score: source
                .get("quality_score")
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
            topics: source
                .get("topics")
                .and_then(Value::as_array)
                .map(|arr| {
                    arr.iter()
                        .filter_map(Value::as_str)
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            content_type: source
                .get("content_type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            crime: nested(source, "crime"),
            location: nested(source, "location"),
            mining: nested(source, "mining"),
            entertainment: nested(source, "entertainment"),
            anishinaabe: nested(source, "anishinaabe"),
            coforge: nested(source, "coforge"),
            payload: source.clone(),
        })
    }
}

fn nested<T: for<'de> Deserialize<'de>>(source: &Value, key: &str) -> Option<T> {
    let value = source.get(key)?;
    if value.is_null() {
        return None;
    }
    serde_json::from_value(value.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hit(source: Value) -> SearchHit {
        serde_json::from_value(json!({
            "_id": "doc-1",
            "_index": "gazette_classified_content",
            "_source": source,
            "sort": [],
        }))
        .unwrap()
    }

    #[test]
    fn projects_core_fields() {
        let article = Article::project(&hit(json!({
            "classified_at": "2024-06-01T10:00:00Z",
            "quality_score": 72.5,
            "topics": ["crime", "local"],
            "content_type": "news",
        })))
        .unwrap();
        assert_eq!(article.id, "doc-1");
        assert_eq!(article.quality_score, 72.5);
        assert_eq!(article.topics, vec!["crime", "local"]);
        assert_eq!(article.content_type, "news");
        assert!(article.crime.is_none());
    }

    #[test]
    fn missing_classified_at_is_rejected() {
        assert!(Article::project(&hit(json!({"topics": []}))).is_none());
        assert!(Article::project(&hit(json!({"classified_at": "yesterday"}))).is_none());
    }

    #[test]
    fn nested_metadata_is_projected() {
        let article = Article::project(&hit(json!({
            "classified_at": "2024-06-01T10:00:00Z",
            "crime": {"homepage_eligible": true, "category_pages": ["violent_crime"]},
            "location": {"country": "Canada", "city": "Thunder Bay"},
        })))
        .unwrap();
        let crime = article.crime.unwrap();
        assert!(crime.homepage_eligible);
        assert!(!crime.is_empty());
        let location = article.location.unwrap();
        assert!(location.is_canada());
        assert!(location.is_specific());
    }

    #[test]
    fn null_nested_objects_are_absent() {
        let article = Article::project(&hit(json!({
            "classified_at": "2024-06-01T10:00:00Z",
            "mining": null,
        })))
        .unwrap();
        assert!(article.mining.is_none());
    }

    #[test]
    fn country_variants() {
        let ca = LocationMeta {
            country: Some("CA".into()),
            ..Default::default()
        };
        assert!(ca.is_canada());
        let us = LocationMeta {
            country: Some("United States".into()),
            ..Default::default()
        };
        assert!(!us.is_canada());
    }
}
