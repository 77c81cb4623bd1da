use super::{channel_slug, ChannelRoute, RoutingDomain};
use crate::article::Article;

/// Mining-classified articles: the firehose channel plus relevance,
/// commodity, stage, and mining-geography channels.
pub struct MiningDomain;

impl RoutingDomain for MiningDomain {
    fn name(&self) -> &'static str {
        "mining"
    }

    fn routes(&self, article: &Article) -> Vec<ChannelRoute> {
        let Some(mining) = &article.mining else {
            return Vec::new();
        };

        let mut routes = vec![ChannelRoute::plain("articles:mining")];
        if let Some(relevance) = &mining.relevance {
            routes.push(ChannelRoute::plain(format!(
                "mining:relevance:{}",
                channel_slug(relevance)
            )));
        }
        for commodity in &mining.commodities {
            routes.push(ChannelRoute::plain(format!(
                "mining:commodity:{}",
                channel_slug(commodity)
            )));
        }
        if let Some(stage) = &mining.stage {
            routes.push(ChannelRoute::plain(format!(
                "mining:stage:{}",
                channel_slug(stage)
            )));
        }
        if let Some(location) = &mining.location {
            routes.push(ChannelRoute::plain(format!(
                "mining:location:{}",
                channel_slug(location)
            )));
        }
        routes
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::{bare_article, names};
    use super::*;
    use crate::article::MiningMeta;

    #[test]
    fn full_mining_metadata() {
        let mut article = bare_article();
        article.mining = Some(MiningMeta {
            relevance: Some("core".into()),
            commodities: vec!["gold".into(), "iron_ore".into()],
            stage: Some("exploration".into()),
            location: Some("Ring of Fire".into()),
        });
        assert_eq!(
            names(&MiningDomain.routes(&article)),
            vec![
                "articles:mining",
                "mining:relevance:core",
                "mining:commodity:gold",
                "mining:commodity:iron-ore",
                "mining:stage:exploration",
                "mining:location:ring-of-fire",
            ]
        );
    }

    #[test]
    fn bare_mining_metadata_still_hits_firehose() {
        let mut article = bare_article();
        article.mining = Some(MiningMeta::default());
        assert_eq!(names(&MiningDomain.routes(&article)), vec!["articles:mining"]);
    }

    #[test]
    fn absent_metadata_routes_nowhere() {
        assert!(MiningDomain.routes(&bare_article()).is_empty());
    }
}
