//! Exhaustive paginated retrieval of a remote collection.
//!
//! Page numbers start at 1 and increase by 1 per successful fetch. The
//! traversal terminates when the just-fetched page's cursor reports
//! `page >= page_count`, never before issuing that page's request. A failed
//! page request fails the whole traversal; no partial result escapes.
//!
//! Retry policy, if any, belongs to the transport and is out of scope here.

use crate::error::Result;
use crate::record::Record;
use crate::store::{CollectionSpec, Page, RemoteStore};
use crate::PageNumber;

/// Lazy, finite, non-restartable traversal of a collection's pages.
///
/// Yields each page in order and fuses after the last page or the first
/// error.
pub struct Pages<'a, S: RemoteStore + ?Sized> {
    store: &'a S,
    spec: &'a CollectionSpec,
    page_size: u32,
    next_page: PageNumber,
    done: bool,
}

impl<'a, S: RemoteStore + ?Sized> Pages<'a, S> {
    /// Start a traversal at page 1.
    pub fn new(store: &'a S, spec: &'a CollectionSpec, page_size: u32) -> Self {
        Self {
            store,
            spec,
            page_size,
            next_page: 1,
            done: false,
        }
    }
}

impl<S: RemoteStore + ?Sized> Iterator for Pages<'_, S> {
    type Item = Result<Page>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.store.get_page(self.spec, self.next_page, self.page_size) {
            Ok(page) => {
                if page.cursor.is_last() {
                    self.done = true;
                }
                self.next_page += 1;
                Some(Ok(page))
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Fetch every record of a collection, in page order.
///
/// Issues exactly `page_count` page requests (one when the remote reports a
/// page count of 0 or 1) and returns the concatenation of all pages.
pub fn fetch_all<S: RemoteStore + ?Sized>(
    store: &S,
    spec: &CollectionSpec,
    page_size: u32,
) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    for page in Pages::new(store, spec, page_size) {
        records.extend(page?.records);
    }
    Ok(records)
}
