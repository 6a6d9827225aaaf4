//! Pagination over CF v3 list responses.
//!
//! List endpoints return
//! `{"pagination":{"total_results":..,"total_pages":..,"next":{"href":..}},"resources":[..]}`.
//! [`PageIterator`] follows the `next` links lazily.

use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::marker::PhantomData;

use crate::error::{CfError, CfResult, ProtocolError};

/// A link in the pagination block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
}

/// Pagination block of a list response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub total_results: u64,
    #[serde(default)]
    pub total_pages: u64,
    #[serde(default)]
    pub first: Option<Link>,
    #[serde(default)]
    pub last: Option<Link>,
    #[serde(default)]
    pub next: Option<Link>,
    #[serde(default)]
    pub previous: Option<Link>,
}

/// One page of resources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub pagination: Pagination,
    #[serde(default = "Vec::new")]
    pub resources: Vec<T>,
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        self.pagination.next.is_some()
    }

    pub fn next_href(&self) -> Option<&str> {
        self.pagination.next.as_ref().map(|l| l.href.as_str())
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// Split a `next` link into path and query parameters.
pub fn parse_page_link(href: &str) -> CfResult<(String, BTreeMap<String, String>)> {
    let url = url::Url::parse(href).map_err(|e| ProtocolError::InvalidResponse {
        message: format!("invalid pagination link {}: {}", href, e),
    })?;
    let params = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    Ok((url.path().to_string(), params))
}

/// Lazily fetches pages. The fetch function receives `None` for the first
/// page and the `next` link afterwards.
pub struct PageIterator<T, F, Fut>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = CfResult<Page<T>>>,
{
    fetch_fn: F,
    next_href: Option<String>,
    done: bool,
    pages_fetched: usize,
    _marker: PhantomData<T>,
}

impl<T, F, Fut> PageIterator<T, F, Fut>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = CfResult<Page<T>>>,
{
    pub fn new(fetch_fn: F) -> Self {
        Self {
            fetch_fn,
            next_href: None,
            done: false,
            pages_fetched: 0,
            _marker: PhantomData,
        }
    }

    /// Fetch the next page, or `None` once the last page was returned.
    pub async fn next_page(&mut self) -> CfResult<Option<Page<T>>> {
        if self.done {
            return Ok(None);
        }

        let page = (self.fetch_fn)(self.next_href.take()).await?;
        self.pages_fetched += 1;

        match page.next_href() {
            Some(href) => self.next_href = Some(href.to_string()),
            None => self.done = true,
        }

        Ok(Some(page))
    }

    /// Collect the resources of all remaining pages.
    pub async fn collect_all(&mut self) -> CfResult<Vec<T>> {
        let mut resources = Vec::new();
        while let Some(page) = self.next_page().await? {
            resources.extend(page.resources);
        }
        Ok(resources)
    }

    pub fn has_next(&self) -> bool {
        !self.done
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Stream of pages.
    pub fn into_stream(self) -> impl Stream<Item = CfResult<Page<T>>> {
        futures::stream::try_unfold(self, |mut iterator| async move {
            let page = iterator.next_page().await?;
            Ok::<_, CfError>(page.map(|page| (page, iterator)))
        })
    }
}
