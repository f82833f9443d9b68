use std::future::Future;

use habitkit_core::ApiError;

/// Result of draining a paged endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Paginated<T> {
    /// Items from every page that succeeded, in page order.
    pub items: Vec<T>,
    /// Set when a page failed; `items` then holds what came before it.
    pub error: Option<ApiError>,
    /// Number of `fetch_page` calls made.
    pub pages_fetched: u32,
}

impl<T> Paginated<T> {
    /// Every page up to the empty one was fetched.
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// All items, or the error if any page failed.
    pub fn into_result(self) -> Result<Vec<T>, ApiError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.items),
        }
    }
}

/// Calls `fetch_page(0)`, `fetch_page(1)`, ... until a page comes back
/// empty or fails.
pub async fn paginate<T, F, Fut>(mut fetch_page: F) -> Paginated<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Vec<T>, ApiError>>,
{
    let mut items = Vec::new();
    let mut page = 0u32;
    loop {
        let result = fetch_page(page).await;
        page += 1;
        match result {
            Ok(batch) if batch.is_empty() => {
                return Paginated {
                    items,
                    error: None,
                    pages_fetched: page,
                }
            }
            Ok(batch) => items.extend(batch),
            Err(e) => {
                tracing::debug!(page = page - 1, kept = items.len(), error = %e, "pagination stopped");
                return Paginated {
                    items,
                    error: Some(e),
                    pages_fetched: page,
                };
            }
        }
    }
}
