use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct PageLinks {
    pub next: Option<String>,
    pub previous: Option<String>,
}

/// Page-number envelope: `{links: {next, previous}, total_objects, results}`.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub links: PageLinks,
    pub total_objects: i64,
    pub results: Vec<T>,
}

/// Build the envelope for one page. `page` is 1-based; the first page's link
/// carries no `page` query parameter, matching the list endpoint's canonical
/// URL.
pub fn paginate<T>(path: &str, page: i64, page_size: i64, total: i64, results: Vec<T>) -> Page<T> {
    let page = page.max(1);
    // Pages beyond the data (including values that would overflow the
    // multiplication) are just empty last pages with no next link.
    let has_next = page
        .checked_mul(page_size)
        .map_or(false, |seen| seen < total);
    let next = if has_next {
        Some(format!("{path}?page={}", page + 1))
    } else {
        None
    };
    let previous = if page > 1 {
        if page == 2 {
            Some(path.to_string())
        } else {
            Some(format!("{path}?page={}", page - 1))
        }
    } else {
        None
    };
    Page {
        links: PageLinks { next, previous },
        total_objects: total,
        results,
    }
}

pub fn offset(page: i64, page_size: i64) -> i64 {
    (page.max(1) - 1).saturating_mul(page_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_items_at_page_size_two() {
        // page 1: two results and a next link
        let page1 = paginate("/post/", 1, 2, 3, vec!["a", "b"]);
        assert_eq!(page1.results.len(), 2);
        assert_eq!(page1.total_objects, 3);
        assert_eq!(page1.links.next.as_deref(), Some("/post/?page=2"));
        assert!(page1.links.previous.is_none());

        // page 2: one result, no next, previous points at page 1
        let page2 = paginate("/post/", 2, 2, 3, vec!["c"]);
        assert_eq!(page2.results.len(), 1);
        assert!(page2.links.next.is_none());
        assert_eq!(page2.links.previous.as_deref(), Some("/post/"));
    }

    #[test]
    fn middle_page_links_both_ways() {
        let page = paginate("/post/", 3, 2, 10, vec!["e", "f"]);
        assert_eq!(page.links.next.as_deref(), Some("/post/?page=4"));
        assert_eq!(page.links.previous.as_deref(), Some("/post/?page=2"));
    }

    #[test]
    fn exact_multiple_has_no_next_on_last_page() {
        let page = paginate("/post/", 2, 2, 4, vec!["c", "d"]);
        assert!(page.links.next.is_none());
    }

    #[test]
    fn offsets_are_zero_based_pages() {
        assert_eq!(offset(1, 2), 0);
        assert_eq!(offset(2, 2), 2);
        assert_eq!(offset(0, 2), 0); // clamped
    }

    #[test]
    fn huge_page_numbers_do_not_overflow() {
        let page = i64::MAX / 2 + 2;
        // offset saturates instead of wrapping negative
        assert_eq!(offset(page, 2), i64::MAX);
        let envelope = paginate("/post/", page, 2, 3, Vec::<&str>::new());
        assert!(envelope.links.next.is_none());
        assert_eq!(envelope.total_objects, 3);
    }

    #[test]
    fn empty_set_has_no_links() {
        let page = paginate("/post/", 1, 2, 0, Vec::<&str>::new());
        assert!(page.links.next.is_none());
        assert!(page.links.previous.is_none());
        assert_eq!(page.total_objects, 0);
    }
}
