use super::{ChannelRoute, RoutingDomain};
use crate::article::Article;
use crate::store::Channel;

/// Consumer-declared channels, matched by their Rules objects. The only
/// domain that attaches the channel's database id to the route.
pub struct CustomChannelDomain<'a> {
    channels: &'a [Channel],
}

impl<'a> CustomChannelDomain<'a> {
    pub fn new(channels: &'a [Channel]) -> Self {
        Self { channels }
    }
}

impl RoutingDomain for CustomChannelDomain<'_> {
    fn name(&self) -> &'static str {
        "custom"
    }

    fn routes(&self, article: &Article) -> Vec<ChannelRoute> {
        self.channels
            .iter()
            .filter(|c| c.enabled && c.rules.matches(article))
            .map(|c| ChannelRoute::with_id(c.redis_channel.clone(), c.id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::bare_article;
    use super::*;
    use crate::rules::Rules;

    fn channel(id: i64, redis_channel: &str, rules: Rules, enabled: bool) -> Channel {
        Channel {
            id,
            name: format!("channel-{id}"),
            redis_channel: redis_channel.to_string(),
            rules,
            enabled,
        }
    }

    #[test]
    fn matching_channel_routes_with_id() {
        let channels = vec![channel(
            7,
            "custom:quality-news",
            Rules {
                min_quality_score: Some(40.0),
                ..Default::default()
            },
            true,
        )];
        let domain = CustomChannelDomain::new(&channels);
        let routes = domain.routes(&bare_article());
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].channel, "custom:quality-news");
        assert_eq!(routes[0].channel_id, Some(7));
    }

    #[test]
    fn disabled_channel_never_matches() {
        let channels = vec![channel(1, "custom:x", Rules::default(), false)];
        let domain = CustomChannelDomain::new(&channels);
        assert!(domain.routes(&bare_article()).is_empty());
    }

    #[test]
    fn non_matching_rules_are_skipped() {
        let channels = vec![
            channel(
                1,
                "custom:high-bar",
                Rules {
                    min_quality_score: Some(90.0),
                    ..Default::default()
                },
                true,
            ),
            channel(2, "custom:everything", Rules::default(), true),
        ];
        let domain = CustomChannelDomain::new(&channels);
        let routes = domain.routes(&bare_article());
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].channel, "custom:everything");
    }

    #[test]
    fn channel_order_does_not_affect_membership() {
        let a = channel(1, "custom:a", Rules::default(), true);
        let b = channel(2, "custom:b", Rules::default(), true);

        let forward = vec![a.clone(), b.clone()];
        let backward = vec![b, a];
        let article = bare_article();

        let mut names_fwd: Vec<String> = CustomChannelDomain::new(&forward)
            .routes(&article)
            .into_iter()
            .map(|r| r.channel)
            .collect();
        let mut names_bwd: Vec<String> = CustomChannelDomain::new(&backward)
            .routes(&article)
            .into_iter()
            .map(|r| r.channel)
            .collect();
        names_fwd.sort();
        names_bwd.sort();
        assert_eq!(names_fwd, names_bwd);
    }
}
