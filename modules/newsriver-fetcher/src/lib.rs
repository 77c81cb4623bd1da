pub mod extract;
pub mod feed_poller;
pub mod robots;
pub mod sitemap;
pub mod worker;

pub use extract::{BasicExtractor, Extracted, Extractor};
pub use feed_poller::FeedPoller;
pub use robots::RobotsPolicy;
pub use sitemap::{parse_sitemap, Sitemap, SitemapDiscoverer, SitemapEntry};
pub use worker::{spawn_pool, FetchContext, SpiderSeen};
