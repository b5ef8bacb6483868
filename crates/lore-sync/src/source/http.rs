//! A source that pages through an HTTP export endpoint.
//!
//! `GET {base_url}/records/{kind}?page_size=N[&cursor=C]` returns
//! `{ "results": [SourceRecord], "next_cursor": "..." | null }`. Pages are
//! followed until `next_cursor` is null.

use std::{collections::HashSet, time::Duration};

use lore_core::{
  entity::EntityKind,
  source::{Source, SourceRecord},
};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::SourceError;

pub const DEFAULT_PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
struct Page {
  results:     Vec<SourceRecord>,
  #[serde(default)]
  next_cursor: Option<String>,
}

/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct HttpSource {
  client:    Client,
  base_url:  String,
  token:     Option<String>,
  page_size: u32,
}

impl HttpSource {
  pub fn new(
    base_url: impl Into<String>,
    token: Option<String>,
    page_size: Option<u32>,
  ) -> Result<Self, SourceError> {
    let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
    Ok(Self {
      client,
      base_url: base_url.into(),
      token,
      page_size: page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1),
    })
  }

  fn url(&self, kind: EntityKind) -> String {
    format!("{}/records/{kind}", self.base_url.trim_end_matches('/'))
  }

  async fn page(&self, kind: EntityKind, cursor: Option<&str>) -> Result<Page, SourceError> {
    let url = self.url(kind);
    let mut req = self
      .client
      .get(&url)
      .query(&[("page_size", self.page_size.to_string())]);
    if let Some(cursor) = cursor {
      req = req.query(&[("cursor", cursor)]);
    }
    if let Some(token) = &self.token {
      req = req.bearer_auth(token);
    }

    let resp = req.send().await?;
    if !resp.status().is_success() {
      return Err(SourceError::Status { url, status: resp.status() });
    }
    Ok(resp.json().await?)
  }
}

impl Source for HttpSource {
  type Error = SourceError;

  async fn list(&self, kind: EntityKind) -> Result<Vec<SourceRecord>, SourceError> {
    let mut records = vec![];
    let mut seen = HashSet::new();
    let mut cursor: Option<String> = None;
    loop {
      let page = self.page(kind, cursor.as_deref()).await?;
      debug!(%kind, count = page.results.len(), "fetched page");
      records.extend(page.results);

      match page.next_cursor {
        Some(next) if !seen.insert(next.clone()) => {
          return Err(SourceError::Unavailable(format!(
            "{kind} listing revisited cursor {next:?}"
          )));
        }
        Some(next) => cursor = Some(next),
        None => return Ok(records),
      }
    }
  }
}
