use super::{channel_slug, ChannelRoute, RoutingDomain};
use crate::article::Article;

/// Crime-classified articles: homepage, per-category pages, and the two
/// peripheral sub-channels.
pub struct CrimeDomain;

impl RoutingDomain for CrimeDomain {
    fn name(&self) -> &'static str {
        "crime"
    }

    fn routes(&self, article: &Article) -> Vec<ChannelRoute> {
        let Some(crime) = &article.crime else {
            return Vec::new();
        };
        if crime.is_empty() {
            return Vec::new();
        }

        let mut routes = Vec::new();
        if crime.homepage_eligible {
            routes.push(ChannelRoute::plain("crime:homepage"));
        }
        for page in &crime.category_pages {
            routes.push(ChannelRoute::plain(format!(
                "crime:category:{}",
                channel_slug(page)
            )));
        }
        if crime.peripheral {
            match crime.sub_label.as_deref() {
                Some("courts") => routes.push(ChannelRoute::plain("crime:courts")),
                Some("context") => routes.push(ChannelRoute::plain("crime:context")),
                _ => {}
            }
        }
        routes
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::{bare_article, names};
    use super::*;
    use crate::article::CrimeMeta;

    #[test]
    fn homepage_and_categories() {
        let mut article = bare_article();
        article.crime = Some(CrimeMeta {
            homepage_eligible: true,
            category_pages: vec!["violent_crime".into(), "property".into()],
            peripheral: false,
            sub_label: None,
        });
        assert_eq!(
            names(&CrimeDomain.routes(&article)),
            vec![
                "crime:homepage",
                "crime:category:violent-crime",
                "crime:category:property",
            ]
        );
    }

    #[test]
    fn peripheral_courts_and_context() {
        let mut article = bare_article();
        article.crime = Some(CrimeMeta {
            peripheral: true,
            sub_label: Some("courts".into()),
            ..Default::default()
        });
        assert_eq!(names(&CrimeDomain.routes(&article)), vec!["crime:courts"]);

        article.crime = Some(CrimeMeta {
            peripheral: true,
            sub_label: Some("context".into()),
            ..Default::default()
        });
        assert_eq!(names(&CrimeDomain.routes(&article)), vec!["crime:context"]);
    }

    #[test]
    fn peripheral_without_known_sub_label_routes_nowhere() {
        let mut article = bare_article();
        article.crime = Some(CrimeMeta {
            peripheral: true,
            sub_label: Some("weather".into()),
            ..Default::default()
        });
        assert!(CrimeDomain.routes(&article).is_empty());
    }

    #[test]
    fn empty_or_absent_metadata_routes_nowhere() {
        let mut article = bare_article();
        assert!(CrimeDomain.routes(&article).is_empty());
        article.crime = Some(CrimeMeta::default());
        assert!(CrimeDomain.routes(&article).is_empty());
    }
}
