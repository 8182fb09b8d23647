//! Cursor pagination
//!
//! The cursor for the next page is the ID of the last item of the most
//! recently fetched page. A page with zero items ends the sequence.

use std::future::Future;

use futures::stream::{self, Stream};

use crate::error::AppError;

/// Entities addressable by ID
pub trait Identified {
    fn id(&self) -> &str;
}

/// Pages fetched so far for one paginated query
#[derive(Debug, Clone, PartialEq)]
pub struct Pages<T> {
    pages: Vec<Vec<T>>,
    has_next_page: bool,
}

impl<T: Identified + Clone> Pages<T> {
    pub fn first(page: Vec<T>) -> Self {
        let has_next_page = !page.is_empty();
        Self {
            pages: vec![page],
            has_next_page,
        }
    }

    /// Copy of these pages with `page` appended
    pub fn with_page(&self, page: Vec<T>) -> Self {
        let has_next_page = !page.is_empty();
        let mut pages = self.pages.clone();
        pages.push(page);
        Self {
            pages,
            has_next_page,
        }
    }

    pub fn pages(&self) -> &[Vec<T>] {
        &self.pages
    }

    pub fn has_next_page(&self) -> bool {
        self.has_next_page
    }

    /// Cursor for the next page, `None` once the sequence has ended
    pub fn next_cursor(&self) -> Option<&str> {
        if !self.has_next_page {
            return None;
        }
        self.pages
            .last()
            .and_then(|page| page.last())
            .map(Identified::id)
    }

    /// All items in page order
    pub fn items(&self) -> impl Iterator<Item = &T> {
        self.pages.iter().flatten()
    }
}

struct StreamState<F> {
    fetch_page: F,
    cursor: Option<String>,
    done: bool,
}

/// Lazy sequence of pages
///
/// Each poll fetches one page; the stream ends after yielding the first
/// empty page or the first error. Calling this again restarts from the
/// first page.
pub fn page_stream<T, F, Fut>(fetch_page: F) -> impl Stream<Item = Result<Vec<T>, AppError>>
where
    T: Identified,
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Vec<T>, AppError>>,
{
    let state = StreamState {
        fetch_page,
        cursor: None,
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        if state.done {
            return None;
        }

        let result = (state.fetch_page)(state.cursor.take()).await;
        match &result {
            Ok(page) => match page.last() {
                Some(last) => state.cursor = Some(last.id().to_string()),
                None => state.done = true,
            },
            Err(_) => state.done = true,
        }

        Some((result, state))
    })
}
