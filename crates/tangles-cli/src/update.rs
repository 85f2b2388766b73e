//! Update checks against a JSON Feed
//!
//! Releases are published as a [JSON Feed](https://jsonfeed.org/version/1)
//! whose items carry an `_impractical_updates` extension naming the release
//! version and whether it has been deprecated. Items are newest first and the
//! feed may be paginated through `next_url`.

use crate::error::Result;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("Failed to fetch updates feed '{url}': {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Release metadata attached to each feed item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub deprecated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_published: Option<DateTime<Utc>>,
    #[serde(rename = "_impractical_updates", default)]
    pub release: ReleaseInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    pub version: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_page_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_url: Option<String>,
    #[serde(default)]
    pub expired: bool,
    #[serde(default)]
    pub items: Vec<Item>,
}

pub struct FeedClient {
    client: Client,
}

impl FeedClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tanglesd/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    pub async fn fetch(&self, url: &str) -> std::result::Result<Feed, UpdateError> {
        let fetch_error = |source| UpdateError::Fetch {
            url: url.to_string(),
            source,
        };

        self.client
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(fetch_error)?
            .json::<Feed>()
            .await
            .map_err(fetch_error)
    }

    /// Items published since `current`, newest first.
    ///
    /// Walks `next_url` pages until one contains `current`, which is included
    /// as the last item. If `current` never appears every item is returned.
    #[instrument(skip(self))]
    pub async fn versions_since(
        &self,
        current: &str,
        url: &str,
    ) -> std::result::Result<Vec<Item>, UpdateError> {
        let mut items = Vec::new();
        let mut visited = HashSet::new();
        let mut next = Some(url.to_string());

        while let Some(page_url) = next.take() {
            if !visited.insert(page_url.clone()) {
                warn!(url = %page_url, "Updates feed pages loop, stopping");
                break;
            }

            let feed = self.fetch(&page_url).await?;
            debug!(url = %page_url, items = feed.items.len(), "Fetched updates page");

            let position = feed.items.iter().position(|item| item.release.version == current);
            match position {
                Some(found) => {
                    items.extend(feed.items.into_iter().take(found + 1));
                    break;
                },
                None => items.extend(feed.items),
            }

            next = feed.next_url.filter(|u| !u.is_empty());
        }

        Ok(items)
    }
}

/// What to tell the user about available updates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateNotice {
    pub current: String,
    pub latest: String,
    pub url: Option<String>,
    pub current_deprecated: bool,
}

impl UpdateNotice {
    /// `None` when there is nothing newer than `current`
    pub fn from_items(current: &str, items: &[Item]) -> Option<Self> {
        let newest = items.first()?;
        if newest.release.version == current {
            return None;
        }

        let current_deprecated = items
            .last()
            .is_some_and(|item| item.release.version == current && item.release.deprecated);

        Some(Self {
            current: current.to_string(),
            latest: newest.release.version.clone(),
            url: newest.url.clone(),
            current_deprecated,
        })
    }

    pub fn render(&self) -> String {
        let mut message = String::new();
        if self.current_deprecated {
            message.push_str(&format!(
                "[!] Your current version of tanglesd, {}, is deprecated. ",
                self.current
            ));
        }
        message.push_str(&format!(
            "A newer version of tanglesd, {}, is available for download now.",
            self.latest
        ));
        if self.current_deprecated {
            message.push_str(" It is *highly* recommended that you update as soon as possible.");
        }
        if let Some(url) = &self.url {
            message.push_str(&format!(" To get it, head to {url}."));
        }
        message
    }
}
