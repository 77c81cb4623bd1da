use super::{channel_slug, ChannelRoute, RoutingDomain};
use crate::article::Article;

/// Entertainment-classified articles: optional homepage, category
/// channels, peripheral channel.
pub struct EntertainmentDomain;

impl RoutingDomain for EntertainmentDomain {
    fn name(&self) -> &'static str {
        "entertainment"
    }

    fn routes(&self, article: &Article) -> Vec<ChannelRoute> {
        let Some(ent) = &article.entertainment else {
            return Vec::new();
        };

        let mut routes = Vec::new();
        if ent.homepage_eligible {
            routes.push(ChannelRoute::plain("entertainment:homepage"));
        }
        for category in &ent.categories {
            routes.push(ChannelRoute::plain(format!(
                "entertainment:category:{}",
                channel_slug(category)
            )));
        }
        if ent.peripheral {
            routes.push(ChannelRoute::plain("entertainment:peripheral"));
        }
        routes
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::{bare_article, names};
    use super::*;
    use crate::article::EntertainmentMeta;

    #[test]
    fn homepage_categories_and_peripheral() {
        let mut article = bare_article();
        article.entertainment = Some(EntertainmentMeta {
            homepage_eligible: true,
            categories: vec!["live_music".into()],
            peripheral: true,
        });
        assert_eq!(
            names(&EntertainmentDomain.routes(&article)),
            vec![
                "entertainment:homepage",
                "entertainment:category:live-music",
                "entertainment:peripheral",
            ]
        );
    }

    #[test]
    fn absent_metadata_routes_nowhere() {
        assert!(EntertainmentDomain.routes(&bare_article()).is_empty());
    }
}
