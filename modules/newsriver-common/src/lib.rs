pub mod catalog;
pub mod config;
pub mod error;
pub mod types;
pub mod urlnorm;

pub use catalog::SourceCatalog;
pub use config::Config;
pub use error::NewsriverError;
pub use types::*;
pub use urlnorm::{normalize, NormalizedUrl};

/// Normalize a token into a channel-safe slug: lowercase, strip
/// non-alphanumeric (keeping spaces), collapse whitespace, replace spaces
/// with hyphens. Underscores in source tokens come out as hyphens.
///
/// ```
/// assert_eq!(newsriver_common::slugify("Thunder Bay"), "thunder-bay");
/// assert_eq!(newsriver_common::slugify("violent_crime"), "violent-crime");
/// assert_eq!(newsriver_common::slugify("  Multiple   Spaces  "), "multiple-spaces");
/// ```
pub fn slugify(token: &str) -> String {
    let lowered = token.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == ' ' {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<&str>>().join("-")
}
