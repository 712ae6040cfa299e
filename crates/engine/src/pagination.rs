/// One window over a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page<'a, T> {
    pub items: &'a [T],
    /// Zero-based index of `items[0]` in the full list.
    pub offset: usize,
    pub total_pages: usize,
}

/// Number of pages needed for `count` items.
pub fn total_pages(count: usize, page_size: usize) -> usize {
    count.div_ceil(page_size)
}

/// Clamp a requested one-based page number into `1..=total_pages` (or 1 for an empty list).
pub fn clamp_page(requested: usize, total_pages: usize) -> usize {
    requested.clamp(1, total_pages.max(1))
}

/// Window `[(page_number - 1) * page_size, min(page_number * page_size, len))` of `items`.
///
/// `page_number` is one-based and must already be clamped by the caller; `page_size` must
/// be positive.
pub fn page<T>(items: &[T], page_number: usize, page_size: usize) -> Page<'_, T> {
    let start = (page_number.saturating_sub(1) * page_size).min(items.len());
    let end = (page_number * page_size).min(items.len());
    Page {
        items: &items[start..end],
        offset: start,
        total_pages: total_pages(items.len(), page_size),
    }
}
