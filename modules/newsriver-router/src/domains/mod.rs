//! The routing pipeline: a fixed, ordered table of domains, each a pure
//! function from article to channel routes. The pipeline concatenates
//! whatever the domains return.

mod anishinaabe;
mod coforge;
mod crime;
mod custom;
mod entertainment;
mod location;
mod mining;
mod topic;

pub use anishinaabe::AnishinaabeDomain;
pub use coforge::CoforgeDomain;
pub use crime::CrimeDomain;
pub use custom::CustomChannelDomain;
pub use entertainment::EntertainmentDomain;
pub use location::LocationDomain;
pub use mining::MiningDomain;
pub use topic::TopicDomain;

use crate::article::Article;
use crate::store::Channel;

/// One channel an article routes to. Only the custom-channel domain
/// attaches a channel id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRoute {
    pub channel: String,
    pub channel_id: Option<i64>,
}

impl ChannelRoute {
    pub fn plain(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            channel_id: None,
        }
    }

    pub fn with_id(channel: impl Into<String>, id: i64) -> Self {
        Self {
            channel: channel.into(),
            channel_id: Some(id),
        }
    }
}

pub trait RoutingDomain: Send + Sync {
    fn name(&self) -> &'static str;
    fn routes(&self, article: &Article) -> Vec<ChannelRoute>;
}

/// ASCII-slug-safe channel token: underscores in source tokens become
/// hyphens in channel slugs.
pub fn channel_slug(token: &str) -> String {
    newsriver_common::slugify(token)
}

/// Run the full pipeline. `channels` is the per-cycle snapshot of enabled
/// custom channels.
pub fn route_article(article: &Article, channels: &[Channel]) -> Vec<ChannelRoute> {
    let custom = CustomChannelDomain::new(channels);
    let table: [&dyn RoutingDomain; 8] = [
        &TopicDomain,
        &custom,
        &CrimeDomain,
        &LocationDomain,
        &MiningDomain,
        &EntertainmentDomain,
        &AnishinaabeDomain,
        &CoforgeDomain,
    ];

    table.iter().flat_map(|d| d.routes(article)).collect()
}


#[cfg(test)]
mod tests {
    use super::testutil::{bare_article, names};
    use super::*;
    use crate::article::{CrimeMeta, MiningMeta};

    #[test]
    fn pipeline_concatenates_domains_in_order() {
        let mut article = bare_article();
        article.topics = vec!["local".into()];
        article.crime = Some(CrimeMeta {
            homepage_eligible: true,
            ..Default::default()
        });
        article.mining = Some(MiningMeta::default());

        let routes = names(&route_article(&article, &[]));
        let topic_pos = routes.iter().position(|r| r == "articles:local").unwrap();
        let crime_pos = routes.iter().position(|r| r == "crime:homepage").unwrap();
        let mining_pos = routes.iter().position(|r| r == "articles:mining").unwrap();
        assert!(topic_pos < crime_pos && crime_pos < mining_pos);
    }

    #[test]
    fn bare_article_routes_nowhere() {
        assert!(route_article(&bare_article(), &[]).is_empty());
    }

    #[test]
    fn slug_turns_underscores_into_hyphens() {
        assert_eq!(channel_slug("violent_crime"), "violent-crime");
        assert_eq!(channel_slug("Thunder Bay"), "thunder-bay");
    }
}
