use async_trait::async_trait;
use tracing;

use crate::error::FetchError;

/// A remote list endpoint that serves fixed-size pages at an offset.
#[async_trait]
pub trait PageSource {
    type Item: Send;

    async fn fetch_page(&self, offset: u32, limit: u32) -> Result<Vec<Self::Item>, FetchError>;
}

/// Pull every page from a source, advancing the offset by `page_size`,
/// until a page comes back short (end of data) or the safety ceiling is
/// hit. A failed page aborts the loop; items from earlier pages are lost
/// with it, the caller decides what to keep.
pub async fn fetch_all<S>(
    source: &S,
    page_size: u32,
    max_pages: u32,
) -> Result<Vec<S::Item>, FetchError>
where
    S: PageSource + Sync,
{
    let mut items = Vec::new();
    let mut page = 0u32;

    loop {
        let offset = page * page_size;
        let batch = source.fetch_page(offset, page_size).await?;
        let batch_len = batch.len() as u32;
        items.extend(batch);

        // A short page is the end of the data; no trailing empty call.
        if batch_len < page_size {
            break;
        }

        page += 1;
        if page >= max_pages {
            tracing::warn!(
                "Pagination stopped at safety ceiling ({} pages, {} items)",
                max_pages,
                items.len()
            );
            break;
        }
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serves predefined page sizes and records every requested offset.
    struct StubSource {
        pages: Vec<u32>,
        calls: Mutex<Vec<u32>>,
        fail_on_page: Option<(usize, bool)>, // (page index, expired?)
    }

    impl StubSource {
        fn new(pages: Vec<u32>) -> Self {
            Self {
                pages,
                calls: Mutex::new(Vec::new()),
                fail_on_page: None,
            }
        }
    }

    #[async_trait]
    impl PageSource for StubSource {
        type Item = u32;

        async fn fetch_page(&self, offset: u32, limit: u32) -> Result<Vec<u32>, FetchError> {
            let mut calls = self.calls.lock().unwrap();
            let page_index = calls.len();
            calls.push(offset);

            if let Some((fail_at, expired)) = self.fail_on_page {
                if page_index == fail_at {
                    return if expired {
                        Err(FetchError::Expired)
                    } else {
                        Err(FetchError::Api {
                            status: 500,
                            body: "boom".to_string(),
                        })
                    };
                }
            }

            let count = self.pages.get(page_index).copied().unwrap_or(0).min(limit);
            Ok((0..count).collect())
        }
    }

    #[tokio::test]
    async fn test_stops_on_short_page_without_trailing_call() {
        let source = StubSource::new(vec![100, 100, 43]);
        let items = fetch_all(&source, 100, 50).await.unwrap();
        assert_eq!(items.len(), 243);
        assert_eq!(*source.calls.lock().unwrap(), vec![0, 100, 200]);
    }

    #[tokio::test]
    async fn test_single_short_page() {
        let source = StubSource::new(vec![7]);
        let items = fetch_all(&source, 100, 50).await.unwrap();
        assert_eq!(items.len(), 7);
        assert_eq!(source.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_exact_multiple_needs_one_empty_page() {
        // 100 then 0: the full first page cannot prove the end of data
        let source = StubSource::new(vec![100, 0]);
        let items = fetch_all(&source, 100, 50).await.unwrap();
        assert_eq!(items.len(), 100);
        assert_eq!(source.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_safety_ceiling() {
        let source = StubSource::new(vec![100; 10]);
        let items = fetch_all(&source, 100, 3).await.unwrap();
        assert_eq!(items.len(), 300);
        assert_eq!(source.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_expired_propagates() {
        let mut source = StubSource::new(vec![100, 100]);
        source.fail_on_page = Some((1, true));
        let err = fetch_all(&source, 100, 50).await.unwrap_err();
        assert!(err.is_expired());
    }

    #[tokio::test]
    async fn test_generic_error_propagates() {
        let mut source = StubSource::new(vec![100, 100]);
        source.fail_on_page = Some((0, false));
        let err = fetch_all(&source, 100, 50).await.unwrap_err();
        assert!(!err.is_expired());
    }
}
