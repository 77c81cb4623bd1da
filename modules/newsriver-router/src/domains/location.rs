use super::{channel_slug, ChannelRoute, RoutingDomain};
use crate::article::Article;

/// Geographic channels for the domain classifiers that share the generic
/// location model (crime and entertainment). Canadian articles with
/// enough specificity get per-city, per-province, and national channels;
/// everything else abroad collapses to `{prefix}:international`. Mining
/// carries its own geography and is excluded here.
pub struct LocationDomain;

impl LocationDomain {
    fn active_prefixes(article: &Article) -> Vec<&'static str> {
        let mut prefixes = Vec::new();
        if article.crime.as_ref().is_some_and(|c| !c.is_empty()) {
            prefixes.push("crime");
        }
        if article.entertainment.is_some() {
            prefixes.push("entertainment");
        }
        prefixes
    }
}

impl RoutingDomain for LocationDomain {
    fn name(&self) -> &'static str {
        "location"
    }

    fn routes(&self, article: &Article) -> Vec<ChannelRoute> {
        let Some(location) = &article.location else {
            return Vec::new();
        };
        if location.country.is_none() {
            return Vec::new();
        }
        let prefixes = Self::active_prefixes(article);
        if prefixes.is_empty() {
            return Vec::new();
        }

        let mut routes = Vec::new();
        if location.is_canada() {
            if !location.is_specific() {
                return Vec::new();
            }
            for prefix in prefixes {
                if let Some(city) = &location.city {
                    routes.push(ChannelRoute::plain(format!(
                        "{prefix}:city:{}",
                        channel_slug(city)
                    )));
                }
                if let Some(province) = &location.province {
                    routes.push(ChannelRoute::plain(format!(
                        "{prefix}:province:{}",
                        channel_slug(province)
                    )));
                }
                routes.push(ChannelRoute::plain(format!("{prefix}:canada")));
            }
        } else {
            for prefix in prefixes {
                routes.push(ChannelRoute::plain(format!("{prefix}:international")));
            }
        }
        routes
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::{bare_article, names};
    use super::*;
    use crate::article::{CrimeMeta, EntertainmentMeta, LocationMeta, MiningMeta};

    fn crime_article() -> Article {
        let mut article = bare_article();
        article.crime = Some(CrimeMeta {
            homepage_eligible: true,
            ..Default::default()
        });
        article
    }

    #[test]
    fn canadian_city_gets_full_ladder() {
        let mut article = crime_article();
        article.location = Some(LocationMeta {
            country: Some("Canada".into()),
            province: Some("Ontario".into()),
            city: Some("Thunder Bay".into()),
        });
        assert_eq!(
            names(&LocationDomain.routes(&article)),
            vec![
                "crime:city:thunder-bay",
                "crime:province:ontario",
                "crime:canada",
            ]
        );
    }

    #[test]
    fn non_canada_collapses_to_international() {
        let mut article = crime_article();
        article.entertainment = Some(EntertainmentMeta::default());
        article.location = Some(LocationMeta {
            country: Some("France".into()),
            province: None,
            city: None,
        });
        assert_eq!(
            names(&LocationDomain.routes(&article)),
            vec!["crime:international", "entertainment:international"]
        );
    }

    #[test]
    fn canada_without_specificity_routes_nowhere() {
        let mut article = crime_article();
        article.location = Some(LocationMeta {
            country: Some("Canada".into()),
            province: None,
            city: None,
        });
        assert!(LocationDomain.routes(&article).is_empty());
    }

    #[test]
    fn unknown_country_routes_nowhere() {
        let mut article = crime_article();
        article.location = Some(LocationMeta::default());
        assert!(LocationDomain.routes(&article).is_empty());
    }

    #[test]
    fn mining_alone_does_not_activate_location() {
        let mut article = bare_article();
        article.mining = Some(MiningMeta {
            relevance: Some("core".into()),
            ..Default::default()
        });
        article.location = Some(LocationMeta {
            country: Some("Canada".into()),
            province: Some("Ontario".into()),
            city: None,
        });
        assert!(LocationDomain.routes(&article).is_empty());
    }

    #[test]
    fn no_location_metadata_routes_nowhere() {
        assert!(LocationDomain.routes(&crime_article()).is_empty());
    }
}
