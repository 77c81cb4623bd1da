use super::{channel_slug, ChannelRoute, RoutingDomain};
use crate::article::Article;

/// Product-specific routing. Deliberately no catch-all: an article routes
/// only on an explicit core/peripheral classification, plus audience,
/// topic, and industry sub-channels.
pub struct CoforgeDomain;

impl RoutingDomain for CoforgeDomain {
    fn name(&self) -> &'static str {
        "coforge"
    }

    fn routes(&self, article: &Article) -> Vec<ChannelRoute> {
        let Some(meta) = &article.coforge else {
            return Vec::new();
        };

        let mut routes = Vec::new();
        match meta.classification.as_deref() {
            Some("core") => routes.push(ChannelRoute::plain("coforge:core")),
            Some("peripheral") => routes.push(ChannelRoute::plain("coforge:peripheral")),
            _ => {}
        }
        for audience in &meta.audiences {
            routes.push(ChannelRoute::plain(format!(
                "coforge:audience:{}",
                channel_slug(audience)
            )));
        }
        for topic in &meta.topics {
            routes.push(ChannelRoute::plain(format!(
                "coforge:topic:{}",
                channel_slug(topic)
            )));
        }
        for industry in &meta.industries {
            routes.push(ChannelRoute::plain(format!(
                "coforge:industry:{}",
                channel_slug(industry)
            )));
        }
        routes
    }
}
