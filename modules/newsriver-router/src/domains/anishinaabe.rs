use super::{channel_slug, ChannelRoute, RoutingDomain};
use crate::article::Article;

/// Anishinaabe-classified articles: the main channel plus categories.
pub struct AnishinaabeDomain;

impl RoutingDomain for AnishinaabeDomain {
    fn name(&self) -> &'static str {
        "anishinaabe"
    }

    fn routes(&self, article: &Article) -> Vec<ChannelRoute> {
        let Some(meta) = &article.anishinaabe else {
            return Vec::new();
        };

        let mut routes = vec![ChannelRoute::plain("articles:anishinaabe")];
        for category in &meta.categories {
            routes.push(ChannelRoute::plain(format!(
                "anishinaabe:category:{}",
                channel_slug(category)
            )));
        }
        routes
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::{bare_article, names};
    use super::*;
    use crate::article::AnishinaabeMeta;

    #[test]
    fn main_channel_plus_categories() {
        let mut article = bare_article();
        article.anishinaabe = Some(AnishinaabeMeta {
            categories: vec!["language".into(), "treaty_rights".into()],
        });
        assert_eq!(
            names(&AnishinaabeDomain.routes(&article)),
            vec![
                "articles:anishinaabe",
                "anishinaabe:category:language",
                "anishinaabe:category:treaty-rights",
            ]
        );
    }

    #[test]
    fn absent_metadata_routes_nowhere() {
        assert!(AnishinaabeDomain.routes(&bare_article()).is_empty());
    }
}
