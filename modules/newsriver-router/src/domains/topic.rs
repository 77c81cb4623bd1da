use super::{channel_slug, ChannelRoute, RoutingDomain};
use crate::article::Article;

/// Topics owned by later, richer domains; the generic topic channel would
/// just duplicate them.
const RESERVED_TOPICS: &[&str] = &["crime", "mining", "anishinaabe", "entertainment", "coforge"];

/// `articles:{topic}` for every topic tag outside the reserved set.
pub struct TopicDomain;

impl RoutingDomain for TopicDomain {
    fn name(&self) -> &'static str {
        "topic"
    }

    fn routes(&self, article: &Article) -> Vec<ChannelRoute> {
        article
            .topics
            .iter()
            .filter(|topic| !RESERVED_TOPICS.contains(&topic.to_lowercase().as_str()))
            .map(|topic| ChannelRoute::plain(format!("articles:{}", channel_slug(topic))))
            .collect()
    }
}
