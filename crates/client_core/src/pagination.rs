use tracing::debug;

/// Called with the new current page after a successful transition.
pub type PageCallback = Box<dyn FnMut(u32) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageDirection {
    Prev,
    Next,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTransition {
    pub from: u32,
    pub to: u32,
    pub direction: PageDirection,
}

/// Header block shown above a paginated list, e.g. `Garage (12)` / `Page #2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDetails {
    pub title: String,
    pub total_items: usize,
    pub current_page: u32,
    pub total_pages: u32,
}

/// Page navigation state for one list view.
///
/// `total_items` is refreshed from the backend; `current_page` only moves
/// through [`Pagination::request_page`]. Shrinking the total never moves the
/// current page, see [`Pagination::is_beyond_last_page`].
pub struct Pagination {
    title: String,
    current_page: u32,
    items_on_page: u32,
    total_items: usize,
    prev_enabled: bool,
    next_enabled: bool,
    on_prev: Option<PageCallback>,
    on_next: Option<PageCallback>,
}

impl Pagination {
    pub fn new(title: impl Into<String>, items_on_page: u32) -> Self {
        Self {
            title: title.into(),
            current_page: 1,
            items_on_page: items_on_page.max(1),
            total_items: 0,
            prev_enabled: false,
            next_enabled: false,
            on_prev: None,
            on_next: None,
        }
    }

    pub fn on_prev(&mut self, callback: impl FnMut(u32) + Send + 'static) {
        self.on_prev = Some(Box::new(callback));
    }

    pub fn on_next(&mut self, callback: impl FnMut(u32) + Send + 'static) {
        self.on_next = Some(Box::new(callback));
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn items_on_page(&self) -> u32 {
        self.items_on_page
    }

    pub fn total_items(&self) -> usize {
        self.total_items
    }

    /// `ceil(total_items / items_on_page)`; an empty list has zero pages.
    pub fn total_pages(&self) -> u32 {
        let pages = self.total_items.div_ceil(self.items_on_page as usize);
        u32::try_from(pages).unwrap_or(u32::MAX)
    }

    pub fn prev_enabled(&self) -> bool {
        self.prev_enabled
    }

    pub fn next_enabled(&self) -> bool {
        self.next_enabled
    }

    pub fn update_total_items(&mut self, total_items: usize) {
        self.total_items = total_items;
        self.refresh_controls();
        if self.is_beyond_last_page() {
            debug!(
                title = %self.title,
                current_page = self.current_page,
                total_pages = self.total_pages(),
                "pagination: current page is past the last page"
            );
        }
    }

    /// True when items exist but none of them fall on the current page.
    pub fn is_beyond_last_page(&self) -> bool {
        self.current_page > self.total_pages().max(1)
    }

    /// Moves by `delta` pages. Targets outside `[1, total_pages]` and the
    /// current page itself are ignored.
    pub fn request_page(&mut self, delta: i64) -> Option<PageTransition> {
        let target = i64::from(self.current_page).checked_add(delta)?;
        if target < 1 || target > i64::from(self.total_pages()) {
            return None;
        }
        let target = u32::try_from(target).ok()?;
        if target == self.current_page {
            return None;
        }

        let from = self.current_page;
        self.current_page = target;
        self.refresh_controls();

        let direction = if target < from {
            PageDirection::Prev
        } else {
            PageDirection::Next
        };
        let callback = match direction {
            PageDirection::Prev => self.on_prev.as_mut(),
            PageDirection::Next => self.on_next.as_mut(),
        };
        if let Some(callback) = callback {
            callback(target);
        }

        Some(PageTransition {
            from,
            to: target,
            direction,
        })
    }

    pub fn prev(&mut self) -> Option<PageTransition> {
        self.request_page(-1)
    }

    pub fn next(&mut self) -> Option<PageTransition> {
        self.request_page(1)
    }

    pub fn details(&self) -> PageDetails {
        PageDetails {
            title: self.title.clone(),
            total_items: self.total_items,
            current_page: self.current_page,
            total_pages: self.total_pages(),
        }
    }

    fn refresh_controls(&mut self) {
        self.prev_enabled = self.current_page > 1;
        self.next_enabled = self.current_page < self.total_pages();
    }
}

#[cfg(test)]
#[path = "tests/pagination_tests.rs"]
mod tests;
