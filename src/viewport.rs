use regex::{Regex, RegexBuilder};
use std::borrow::Cow;

/// Text a row exposes to search and text filters.
pub trait Searchable {
    fn search_text(&self) -> Cow<'_, str>;
}

impl Searchable for String {
    fn search_text(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub pattern: String,
    pub ignore_case: bool,
    pub regex: bool,
}

impl Query {
    pub fn new(pattern: impl Into<String>, ignore_case: bool, regex: bool) -> Self {
        Self {
            pattern: pattern.into(),
            ignore_case,
            regex,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Matcher {
    Substring { needle: String, ignore_case: bool },
    Regex(Regex),
    Nothing,
}

impl Matcher {
    /// An invalid regex matches nothing instead of failing.
    pub fn new(query: &Query) -> Self {
        if query.pattern.is_empty() {
            return Self::Nothing;
        }
        if query.regex {
            return match RegexBuilder::new(&query.pattern)
                .case_insensitive(query.ignore_case)
                .build()
            {
                Ok(regex) => Self::Regex(regex),
                Err(_) => Self::Nothing,
            };
        }
        let needle = if query.ignore_case {
            query.pattern.to_lowercase()
        } else {
            query.pattern.clone()
        };
        Self::Substring {
            needle,
            ignore_case: query.ignore_case,
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        match self {
            Self::Substring {
                needle,
                ignore_case: true,
            } => text.to_lowercase().contains(needle.as_str()),
            Self::Substring { needle, .. } => text.contains(needle.as_str()),
            Self::Regex(regex) => regex.is_match(text),
            Self::Nothing => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchState {
    query: Query,
    matcher: Matcher,
    matches: Vec<usize>,
    current: Option<usize>,
}

impl SearchState {
    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn matches(&self) -> &[usize] {
        &self.matches
    }

    /// Position inside `matches`, not a row index.
    pub fn current(&self) -> Option<usize> {
        self.current
    }
}

type Predicate<T> = Box<dyn Fn(&T) -> bool>;

pub struct FilterState<T> {
    label: String,
    predicate: Predicate<T>,
    indices: Vec<usize>,
    enabled: bool,
}

impl<T> FilterState<T> {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Backing-sequence index of every row that passes the predicate, in order.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Scroll/cursor window over an ordered row sequence.
///
/// `cursor`, `start` and `end` index the visible sequence, which is the
/// filtered subsequence while a filter is enabled and the backing rows
/// otherwise. Whenever the visible sequence is non-empty
/// `start <= cursor < end <= len` and `end - start <= height` hold.
pub struct Viewport<T> {
    rows: Vec<T>,
    height: usize,
    start: usize,
    end: usize,
    cursor: usize,
    search: Option<SearchState>,
    filter: Option<FilterState<T>>,
}

impl<T: Searchable> Default for Viewport<T> {
    fn default() -> Self {
        Self::new(1)
    }
}

impl<T: Searchable> Viewport<T> {
    pub fn new(height: usize) -> Self {
        Self {
            rows: Vec::new(),
            height: height.max(1),
            start: 0,
            end: 0,
            cursor: 0,
            search: None,
            filter: None,
        }
    }

    pub fn rows(&self) -> &[T] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        match self.active_filter() {
            Some(filter) => filter.indices.len(),
            None => self.rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn window(&self) -> (usize, usize) {
        (self.start, self.end)
    }

    pub fn search_state(&self) -> Option<&SearchState> {
        self.search.as_ref()
    }

    pub fn filter_state(&self) -> Option<&FilterState<T>> {
        self.filter.as_ref()
    }

    pub fn original_index(&self, visible: usize) -> Option<usize> {
        match self.active_filter() {
            Some(filter) => filter.indices.get(visible).copied(),
            None => (visible < self.rows.len()).then_some(visible),
        }
    }

    pub fn get(&self, visible: usize) -> Option<&T> {
        self.original_index(visible)
            .and_then(|index| self.rows.get(index))
    }

    pub fn selected(&self) -> Option<&T> {
        self.get(self.cursor)
    }

    /// Rows inside `[start, end)` paired with their visible index.
    pub fn window_rows(&self) -> impl Iterator<Item = (usize, &T)> + '_ {
        (self.start..self.end).filter_map(move |index| self.get(index).map(|row| (index, row)))
    }

    pub fn is_match(&self, visible: usize) -> bool {
        self.search
            .as_ref()
            .is_some_and(|search| search.matches.binary_search(&visible).is_ok())
    }

    pub fn is_current_match(&self, visible: usize) -> bool {
        self.search.as_ref().is_some_and(|search| {
            search
                .current
                .and_then(|current| search.matches.get(current))
                .is_some_and(|line| *line == visible)
        })
    }

    /// Replaces the backing rows. A cursor that falls out of bounds resets to 0;
    /// the window is recentered on the cursor if the height changed or the
    /// cursor is no longer inside the old window.
    pub fn set_rows(&mut self, rows: Vec<T>, height: usize) {
        let height = height.max(1);
        let size_changed = height != self.height;
        self.height = height;
        self.rows = rows;
        self.rederive_filter();
        self.refit(size_changed);
        self.rederive_search();
    }

    pub fn set_height(&mut self, height: usize) {
        let height = height.max(1);
        if height == self.height {
            return;
        }
        self.height = height;
        self.refit(true);
    }

    /// Appends rows, extending filter and search incrementally.
    pub fn push_rows(&mut self, new_rows: impl IntoIterator<Item = T>) {
        let base = self.rows.len();
        let visible_before = self.len();
        self.rows.extend(new_rows);

        let rows = &self.rows;
        if let Some(filter) = self.filter.as_mut() {
            for (offset, row) in rows[base..].iter().enumerate() {
                if (filter.predicate)(row) {
                    filter.indices.push(base + offset);
                }
            }
        }

        let len = self.len();
        if len == 0 {
            return;
        }
        if self.end == 0 {
            self.refit(false);
        } else {
            self.end = (self.start + self.height).min(len);
        }

        if let Some(mut search) = self.search.take() {
            let appended = self.collect_matches(&search.matcher, visible_before);
            search.matches.extend(appended);
            if search.current.is_none() && !search.matches.is_empty() {
                search.current = Some(0);
            }
            self.search = Some(search);
        }
    }

    pub fn clear(&mut self) {
        let height = self.height;
        self.set_rows(Vec::new(), height);
    }

    pub fn move_cursor(&mut self, delta: isize) {
        let len = self.len();
        if len == 0 {
            return;
        }
        let max_index = len.saturating_sub(1) as isize;
        let target = (self.cursor as isize).saturating_add(delta).clamp(0, max_index);
        self.move_to(target as usize);
    }

    /// Moves the cursor, sliding the window by the minimal amount that keeps
    /// it visible.
    pub fn move_to(&mut self, index: usize) {
        let len = self.len();
        if len == 0 {
            return;
        }
        self.cursor = index.min(len - 1);
        if self.cursor < self.start {
            self.start = self.cursor;
            self.end = (self.start + self.height).min(len);
        } else if self.cursor >= self.end {
            self.end = self.cursor + 1;
            self.start = self.start.max(self.end.saturating_sub(self.height));
        }
    }

    pub fn move_to_last(&mut self) {
        let len = self.len();
        if len > 0 {
            self.move_to(len - 1);
        }
    }

    pub fn center_on(&mut self, index: usize) {
        let len = self.len();
        if len == 0 {
            return;
        }
        self.cursor = index.min(len - 1);
        self.center_window();
    }

    /// Runs a search over the visible rows and centers the first match.
    /// An empty pattern clears the search.
    pub fn search(&mut self, query: Query) -> &[usize] {
        if query.pattern.is_empty() {
            self.search = None;
            return &[];
        }
        let matcher = Matcher::new(&query);
        let matches = self.collect_matches(&matcher, 0);
        if let Some(first) = matches.first().copied() {
            self.center_on(first);
        }
        let current = (!matches.is_empty()).then_some(0);
        let search = self.search.insert(SearchState {
            query,
            matcher,
            matches,
            current,
        });
        &search.matches
    }

    pub fn clear_search(&mut self) {
        self.search = None;
    }

    pub fn next_match(&mut self) -> Option<usize> {
        let search = self.search.as_mut()?;
        let count = search.matches.len();
        if count == 0 {
            return None;
        }
        let next = match search.current {
            Some(current) => (current + 1) % count,
            None => 0,
        };
        search.current = Some(next);
        let line = search.matches[next];
        self.center_on(line);
        Some(line)
    }

    pub fn prev_match(&mut self) -> Option<usize> {
        let search = self.search.as_mut()?;
        let count = search.matches.len();
        if count == 0 {
            return None;
        }
        let prev = match search.current {
            Some(current) => (current + count - 1) % count,
            None => count - 1,
        };
        search.current = Some(prev);
        let line = search.matches[prev];
        self.center_on(line);
        Some(line)
    }

    /// Overlays a filter. The backing rows are left untouched; the returned
    /// slice maps each visible row back to its backing index.
    pub fn filter<F>(&mut self, label: impl Into<String>, predicate: F) -> &[usize]
    where
        F: Fn(&T) -> bool + 'static,
    {
        let anchor = self.original_index(self.cursor);
        let indices = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| predicate(row))
            .map(|(index, _)| index)
            .collect();
        self.filter = Some(FilterState {
            label: label.into(),
            predicate: Box::new(predicate),
            indices,
            enabled: true,
        });
        self.restore_anchor(anchor);
        self.filter
            .as_ref()
            .map(|filter| filter.indices.as_slice())
            .unwrap_or_default()
    }

    /// Flips the current filter on or off without recomputing it. Returns the
    /// new state, or `None` when no filter has been applied.
    pub fn toggle_filter(&mut self) -> Option<bool> {
        let anchor = self.original_index(self.cursor);
        let filter = self.filter.as_mut()?;
        filter.enabled = !filter.enabled;
        let enabled = filter.enabled;
        self.restore_anchor(anchor);
        Some(enabled)
    }

    pub fn clear_filter(&mut self) {
        if self.filter.is_none() {
            return;
        }
        let anchor = self.original_index(self.cursor);
        self.filter = None;
        self.restore_anchor(anchor);
    }

    fn active_filter(&self) -> Option<&FilterState<T>> {
        self.filter.as_ref().filter(|filter| filter.enabled)
    }

    fn restore_anchor(&mut self, anchor: Option<usize>) {
        self.cursor = match (anchor, self.active_filter()) {
            (None, _) => 0,
            (Some(original), Some(filter)) => match filter.indices.binary_search(&original) {
                Ok(position) | Err(position) => position,
            },
            (Some(original), None) => original,
        };
        let len = self.len();
        if len > 0 && self.cursor >= len {
            self.cursor = len - 1;
        }
        self.refit(true);
        self.rederive_search();
    }

    fn refit(&mut self, force_center: bool) {
        let len = self.len();
        if len == 0 {
            self.cursor = 0;
            self.start = 0;
            self.end = 0;
            return;
        }
        if self.cursor >= len {
            self.cursor = 0;
        }
        if force_center || self.cursor < self.start || self.cursor >= self.end {
            self.center_window();
        } else {
            self.end = (self.start + self.height).min(len);
        }
    }

    fn center_window(&mut self) {
        let len = self.len();
        self.start = self.cursor.saturating_sub(self.height / 2);
        self.end = (self.start + self.height).min(len);
    }

    fn rederive_filter(&mut self) {
        let rows = &self.rows;
        if let Some(filter) = self.filter.as_mut() {
            filter.indices = rows
                .iter()
                .enumerate()
                .filter(|(_, row)| (filter.predicate)(row))
                .map(|(index, _)| index)
                .collect();
        }
    }

    fn rederive_search(&mut self) {
        let Some(mut search) = self.search.take() else {
            return;
        };
        search.matches = self.collect_matches(&search.matcher, 0);
        search.current = match (search.current, search.matches.len()) {
            (_, 0) => None,
            (Some(current), count) => Some(current.min(count - 1)),
            (None, _) => Some(0),
        };
        self.search = Some(search);
    }

    fn collect_matches(&self, matcher: &Matcher, from: usize) -> Vec<usize> {
        (from..self.len())
            .filter(|index| {
                self.get(*index)
                    .is_some_and(|row| matcher.is_match(&row.search_text()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{Query, Viewport};
    use proptest::prelude::*;

    fn lines(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    fn numbered(count: usize) -> Vec<String> {
        (0..count).map(|index| format!("row {index}")).collect()
    }

    fn assert_window_invariant(viewport: &Viewport<String>) {
        let (start, end) = viewport.window();
        let len = viewport.len();
        if len == 0 {
            assert_eq!((start, end, viewport.cursor()), (0, 0, 0));
            return;
        }
        assert!(start <= viewport.cursor(), "start {start} > cursor");
        assert!(viewport.cursor() < end, "cursor >= end {end}");
        assert!(end <= len, "end {end} > len {len}");
        assert!(end - start <= viewport.height());
    }

    #[test]
    fn moving_down_slides_window_minimally() {
        let mut viewport = Viewport::new(5);
        viewport.set_rows(numbered(10), 5);
        assert_eq!(viewport.window(), (0, 5));

        for _ in 0..8 {
            viewport.move_cursor(1);
        }

        assert_eq!(viewport.cursor(), 8);
        assert_eq!(viewport.window(), (4, 9));
        assert_window_invariant(&viewport);
    }

    #[test]
    fn moving_past_edges_clamps() {
        let mut viewport = Viewport::new(3);
        viewport.set_rows(numbered(4), 3);
        viewport.move_cursor(-5);
        assert_eq!(viewport.cursor(), 0);
        viewport.move_cursor(100);
        assert_eq!(viewport.cursor(), 3);
        assert_eq!(viewport.window(), (1, 4));
    }

    #[test]
    fn empty_viewport_clamps_to_zero() {
        let mut viewport: Viewport<String> = Viewport::new(4);
        viewport.move_cursor(3);
        viewport.move_to_last();
        assert_eq!(viewport.cursor(), 0);
        assert_eq!(viewport.window(), (0, 0));
        assert!(viewport.selected().is_none());
    }

    #[test]
    fn set_rows_resets_out_of_bounds_cursor() {
        let mut viewport = Viewport::new(5);
        viewport.set_rows(numbered(20), 5);
        viewport.move_to(15);
        viewport.set_rows(numbered(6), 5);
        assert_eq!(viewport.cursor(), 0);
        assert_eq!(viewport.window(), (0, 5));
    }

    #[test]
    fn set_rows_keeps_start_when_cursor_still_visible() {
        let mut viewport = Viewport::new(5);
        viewport.set_rows(numbered(20), 5);
        viewport.move_to(7);
        let (start, _) = viewport.window();
        viewport.set_rows(numbered(9), 5);
        assert_eq!(viewport.cursor(), 7);
        assert_eq!(viewport.window(), (start, 8.min(start + 5)));
        assert_window_invariant(&viewport);
    }

    #[test]
    fn resizing_recenters_on_cursor() {
        let mut viewport = Viewport::new(4);
        viewport.set_rows(numbered(30), 4);
        viewport.move_to(20);
        viewport.set_height(10);
        assert_eq!(viewport.window(), (15, 25));
        assert_eq!(viewport.cursor(), 20);
    }

    #[test]
    fn case_insensitive_search_cycles_through_matches() {
        let mut viewport = Viewport::new(10);
        viewport.set_rows(lines(&["a", "error b", "c", "ERROR d"]), 10);

        let matches = viewport.search(Query::new("error", true, false)).to_vec();
        assert_eq!(matches, vec![1, 3]);
        assert_eq!(viewport.cursor(), 1);

        assert_eq!(viewport.next_match(), Some(3));
        assert_eq!(viewport.cursor(), 3);
        assert_eq!(viewport.next_match(), Some(1));
        assert_eq!(viewport.prev_match(), Some(3));
    }

    #[test]
    fn case_sensitive_search_respects_case() {
        let mut viewport = Viewport::new(10);
        viewport.set_rows(lines(&["a", "error b", "c", "ERROR d"]), 10);
        assert_eq!(viewport.search(Query::new("ERROR", false, false)), &[3]);
    }

    #[test]
    fn regex_search_applies_ignore_case_flag() {
        let mut viewport = Viewport::new(10);
        viewport.set_rows(lines(&["GET /a 200", "get /b 500", "POST /c 503"]), 10);
        assert_eq!(viewport.search(Query::new(r"^get .* 5\d\d$", true, true)), &[1]);
        assert_eq!(viewport.search(Query::new(r"5\d\d$", false, true)), &[1, 2]);
    }

    #[test]
    fn invalid_regex_yields_no_matches() {
        let mut viewport = Viewport::new(10);
        viewport.set_rows(lines(&["(", "a"]), 10);
        assert!(viewport.search(Query::new("(", false, true)).is_empty());
        assert_eq!(viewport.next_match(), None);
    }

    #[test]
    fn filter_is_idempotent_and_keeps_backing_rows() {
        let mut viewport = Viewport::new(10);
        viewport.set_rows(lines(&["web", "db", "web-2", "cache"]), 10);

        let first = viewport.filter("web", |row: &String| row.contains("web")).to_vec();
        let second = viewport.filter("web", |row: &String| row.contains("web")).to_vec();

        assert_eq!(first, vec![0, 2]);
        assert_eq!(first, second);
        assert_eq!(viewport.len(), 2);
        assert_eq!(viewport.rows().len(), 4);
        assert_eq!(viewport.get(1).map(String::as_str), Some("web-2"));
    }

    #[test]
    fn toggling_filter_restores_full_sequence() {
        let mut viewport = Viewport::new(10);
        viewport.set_rows(lines(&["web", "db", "web-2", "cache"]), 10);
        viewport.filter("web", |row: &String| row.contains("web"));
        viewport.move_to(1);

        assert_eq!(viewport.toggle_filter(), Some(false));
        assert_eq!(viewport.len(), 4);
        assert_eq!(viewport.selected().map(String::as_str), Some("web-2"));

        assert_eq!(viewport.toggle_filter(), Some(true));
        assert_eq!(viewport.len(), 2);
        assert_eq!(viewport.selected().map(String::as_str), Some("web-2"));
        assert_eq!(viewport.filter_state().map(|f| f.indices().to_vec()), Some(vec![0, 2]));
    }

    #[test]
    fn search_indexes_filtered_sequence() {
        let mut viewport = Viewport::new(10);
        viewport.set_rows(lines(&["web ok", "db error", "web error", "web ok"]), 10);
        viewport.filter("web", |row: &String| row.starts_with("web"));
        assert_eq!(viewport.search(Query::new("error", true, false)), &[1]);
        viewport.clear_filter();
        assert_eq!(
            viewport.search_state().map(|search| search.matches().to_vec()),
            Some(vec![1, 2])
        );
    }

    #[test]
    fn push_rows_extends_filter_and_search() {
        let mut viewport = Viewport::new(3);
        viewport.set_rows(lines(&["info start"]), 3);
        viewport.filter("warn+", |row: &String| !row.starts_with("debug"));
        viewport.search(Query::new("warn", true, false));

        viewport.push_rows(lines(&["debug x", "WARN disk", "info y", "warn net"]));

        assert_eq!(viewport.filter_state().map(|f| f.indices().to_vec()), Some(vec![0, 2, 3, 4]));
        assert_eq!(
            viewport.search_state().map(|search| search.matches().to_vec()),
            Some(vec![1, 3])
        );
        assert_eq!(viewport.window(), (0, 3));
        viewport.move_to_last();
        assert_eq!(viewport.window(), (1, 4));
    }

    #[derive(Debug, Clone)]
    enum Op {
        SetRows(usize, usize),
        Move(isize),
        MoveTo(usize),
        Push(usize),
        Resize(usize),
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..40, 1usize..12).prop_map(|(len, height)| Op::SetRows(len, height)),
            (-15isize..15).prop_map(Op::Move),
            (0usize..50).prop_map(Op::MoveTo),
            (0usize..6).prop_map(Op::Push),
            (1usize..12).prop_map(Op::Resize),
        ]
    }

    proptest! {
        #[test]
        fn window_invariant_holds_for_any_sequence(ops in prop::collection::vec(arb_op(), 1..60)) {
            let mut viewport = Viewport::new(5);
            for op in ops {
                match op {
                    Op::SetRows(len, height) => viewport.set_rows(numbered(len), height),
                    Op::Move(delta) => viewport.move_cursor(delta),
                    Op::MoveTo(index) => viewport.move_to(index),
                    Op::Push(count) => viewport.push_rows(numbered(count)),
                    Op::Resize(height) => viewport.set_height(height),
                }
                assert_window_invariant(&viewport);
            }
        }

        #[test]
        fn next_match_is_cyclic_and_prev_is_inverse(
            flags in prop::collection::vec(any::<bool>(), 1..40),
            steps in 0usize..10,
        ) {
            let rows = flags
                .iter()
                .enumerate()
                .map(|(index, hit)| if *hit { format!("hit {index}") } else { format!("miss {index}") })
                .collect::<Vec<_>>();
            let mut viewport = Viewport::new(7);
            viewport.set_rows(rows, 7);
            let matches = viewport.search(Query::new("hit", false, false)).to_vec();
            prop_assume!(!matches.is_empty());

            for _ in 0..matches.len() {
                viewport.next_match();
            }
            prop_assert_eq!(viewport.search_state().and_then(|s| s.current()), Some(0));

            let mut visited = Vec::new();
            for _ in 0..steps {
                visited.push(viewport.next_match());
            }
            for expected in visited.iter().rev().skip(1) {
                prop_assert_eq!(viewport.prev_match(), *expected);
            }
            if steps > 0 {
                prop_assert_eq!(viewport.prev_match(), Some(matches[0]));
            }
        }
    }
}
