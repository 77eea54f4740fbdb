//! Reference [`ListingParser`](crate::traits::parser::ListingParser)
//! implementations, selected by [`SourceFormat`].

pub mod json_feed;
pub mod linkedin;

pub use json_feed::JsonFeedParser;
pub use linkedin::LinkedInGuestParser;

use std::sync::Arc;

use crate::error::ConfigError;
use crate::traits::parser::ListingParser;
use crate::types::config::{ScrapeConfig, SourceFormat};

/// Build the parser for a configuration's source format.
pub fn build_parser(config: &ScrapeConfig) -> Result<Arc<dyn ListingParser>, ConfigError> {
    match config.source_format {
        SourceFormat::LinkedinGuest => Ok(Arc::new(match &config.base_url {
            Some(base) => LinkedInGuestParser::new(base.as_str()),
            None => LinkedInGuestParser::default(),
        })),
        SourceFormat::JsonFeed => {
            let base = config
                .base_url
                .as_deref()
                .ok_or(ConfigError::MissingBaseUrl { format: "json-feed" })?;
            Ok(Arc::new(JsonFeedParser::new(base, config.page_size)))
        }
    }
}
