//! Per-host robots.txt policy.
//!
//! The first worker to need a host's rules fetches `/robots.txt`, caches
//! the body in host state, and derives the host's crawl delay from any
//! `Crawl-delay` directive. A 404 or transport failure is "allow all" for
//! the TTL. Allow decisions are computed per request against the cached
//! body.

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use robotstxt::DefaultMatcher;
use tracing::{debug, warn};

use newsriver_frontier::HostStore;

pub struct RobotsPolicy {
    hosts: HostStore,
    client: reqwest::Client,
    user_agent: String,
    ttl_hours: i64,
}

impl RobotsPolicy {
    pub fn new(hosts: HostStore, user_agent: &str, ttl_hours: i64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()
            .expect("Failed to build robots HTTP client");

        Self {
            hosts,
            client,
            user_agent: user_agent.to_string(),
            ttl_hours,
        }
    }

    /// Whether this URL may be fetched. Refreshes the cached robots body
    /// on demand when missing or stale.
    pub async fn allows(&self, url: &str, host: &str) -> Result<bool> {
        let state = self.hosts.get(host).await?;
        let fresh = state
            .as_ref()
            .map(|s| s.robots_fresh(self.ttl_hours, Utc::now()))
            .unwrap_or(false);

        let body = if fresh {
            state.and_then(|s| s.robots_body)
        } else {
            self.refresh(host).await?
        };

        Ok(match body {
            Some(rules) => {
                let mut matcher = DefaultMatcher::default();
                matcher.one_agent_allowed_by_robots(&rules, &self.user_agent, url)
            }
            // No rules cached (robots missing or unreachable): allow all.
            None => true,
        })
    }

    /// Fetch and cache `/robots.txt`. Returns the body, or `None` when the
    /// host has no usable robots file.
    async fn refresh(&self, host: &str) -> Result<Option<String>> {
        let robots_url = format!("https://{host}/robots.txt");
        let result = self.client.get(&robots_url).send().await;

        // Fetching robots contacts the host; the politeness clock ticks.
        self.hosts.record_fetch(host).await?;

        let body = match result {
            Ok(resp) if resp.status().is_success() => match resp.text().await {
                Ok(text) => Some(text),
                Err(e) => {
                    warn!(host, error = %e, "Failed to read robots.txt body");
                    None
                }
            },
            Ok(resp) => {
                debug!(host, status = %resp.status(), "No robots.txt, allowing all");
                None
            }
            Err(e) => {
                warn!(host, error = %e, "robots.txt fetch failed, allowing all");
                None
            }
        };

        let crawl_delay_ms = body.as_deref().and_then(|b| crawl_delay_ms(b, &self.user_agent));
        self.hosts
            .put_robots(host, body.as_deref(), crawl_delay_ms)
            .await?;

        Ok(body)
    }
}

/// Extract a `Crawl-delay` (seconds, possibly fractional) for the given
/// agent, falling back to the wildcard group. Directive order follows the
/// usual robots.txt group structure: a `User-agent` line opens a group and
/// `Crawl-delay` lines apply to the group they appear in.
pub fn crawl_delay_ms(robots: &str, user_agent: &str) -> Option<i64> {
    let agent_token = user_agent
        .split('/')
        .next()
        .unwrap_or(user_agent)
        .to_lowercase();

    let mut group_matches = false;
    let mut wildcard_delay: Option<f64> = None;
    let mut agent_delay: Option<f64> = None;
    let mut group_is_wildcard = false;

    for line in robots.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();

        match key.as_str() {
            "user-agent" => {
                let agent = value.to_lowercase();
                group_is_wildcard = agent == "*";
                group_matches = group_is_wildcard || agent_token.contains(&agent);
            }
            "crawl-delay" if group_matches => {
                if let Ok(secs) = value.parse::<f64>() {
                    if group_is_wildcard {
                        wildcard_delay = Some(secs);
                    } else {
                        agent_delay = Some(secs);
                    }
                }
            }
            _ => {}
        }
    }

    agent_delay
        .or(wildcard_delay)
        .map(|secs| (secs * 1000.0) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_crawl_delay() {
        let robots = "User-agent: *\nCrawl-delay: 2\nDisallow: /private";
        assert_eq!(crawl_delay_ms(robots, "newsriver-fetcher/0.1"), Some(2000));
    }

    #[test]
    fn agent_specific_delay_wins() {
        let robots = concat!(
            "User-agent: *\n",
            "Crawl-delay: 10\n",
            "\n",
            "User-agent: newsriver-fetcher\n",
            "Crawl-delay: 1.5\n",
        );
        assert_eq!(crawl_delay_ms(robots, "newsriver-fetcher/0.1"), Some(1500));
    }

    #[test]
    fn no_delay_directive() {
        let robots = "User-agent: *\nDisallow: /admin";
        assert_eq!(crawl_delay_ms(robots, "newsriver-fetcher/0.1"), None);
    }

    #[test]
    fn delay_in_unmatched_group_is_ignored() {
        let robots = "User-agent: otherbot\nCrawl-delay: 30\n";
        assert_eq!(crawl_delay_ms(robots, "newsriver-fetcher/0.1"), None);
    }

    #[test]
    fn comments_and_garbage_lines_are_skipped() {
        let robots = concat!(
            "# robots for example.com\n",
            "User-agent: * # everyone\n",
            "Crawl-delay: 3 # be gentle\n",
            "not a directive\n",
        );
        assert_eq!(crawl_delay_ms(robots, "anybot/1.0"), Some(3000));
    }
}
