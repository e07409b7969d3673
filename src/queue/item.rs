// src/queue/item.rs
// =============================================================================
// The unit of crawl work stored in the frontier.
//
// An Item is immutable once created. It is encoded into the item log when
// enqueued and decoded fresh every time it is dequeued.
// =============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// How an item was discovered. Sent to crawl HQ as the discovery-type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    /// A starting point, or anything handed to us by crawl HQ
    Seed,
    /// A link found in a fetched page
    Outlink,
    /// An embedded resource (image, script, stylesheet)
    Asset,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Seed => "seed",
            ItemType::Outlink => "outlink",
            ItemType::Asset => "asset",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub url: Url,
    /// Page this URL was found on; absent for seeds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_url: Option<Url>,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    /// Distance from the seed in discovery steps
    pub hop: u8,
    /// Identifier assigned by crawl HQ, absent for locally discovered items
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Item {
    pub fn new(url: Url, parent_url: Option<Url>, item_type: ItemType, hop: u8, id: Option<String>) -> Self {
        Self {
            url,
            parent_url,
            item_type,
            hop,
            id,
        }
    }

    /// A seed with no provenance and no HQ identifier.
    pub fn seed(url: Url) -> Self {
        Self::new(url, None, ItemType::Seed, 0, None)
    }

    /// An outlink found on `self`, one hop further from the seed.
    pub fn outlink(&self, url: Url) -> Self {
        Self::new(
            url,
            Some(self.url.clone()),
            ItemType::Outlink,
            self.hop.saturating_add(1),
            None,
        )
    }

    /// The fairness grouping key: `host[:port]`.
    ///
    /// Returns None for URLs without an authority (`data:`, `mailto:`).
    pub fn host(&self) -> Option<String> {
        let host = self.url.host_str()?;
        Some(match self.url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        })
    }
}
