//! The set of pages the user wants in the final archive.
//!
//! Membership is independent of render status: a page can be selected long
//! before (or without ever) being rendered. The export pipeline reads the
//! selection only when it hands artifacts to the archive writer.
//!
//! ## Range mini-language
//!
//! ```text
//! spec  := token ("," token)*
//! token := int | int "-" int        (either order, 1-based, inclusive)
//! ```
//!
//! Whitespace around tokens is ignored. Range tokens are intersected with
//! `[1, total]` (an endpoint too large for `usize` counts as infinity),
//! single integers outside it are dropped, and tokens that do not parse are
//! skipped. If nothing survives, [`SelectionSet::apply_range`]
//! leaves the current selection untouched.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use tracing::debug;

static SINGLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").expect("valid regex"));
static RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)\s*-\s*(\d+)$").expect("valid regex"));

/// Parse a range specification against a document of `total_pages` pages.
///
/// Returns the resolved pages in ascending order; may be empty.
pub fn parse_range(spec: &str, total_pages: usize) -> BTreeSet<usize> {
    let mut pages = BTreeSet::new();
    if total_pages == 0 {
        return pages;
    }

    for token in spec.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if SINGLE.is_match(token) {
            match token.parse::<usize>() {
                Ok(p) if (1..=total_pages).contains(&p) => {
                    pages.insert(p);
                }
                _ => debug!("Skipping out-of-range page token '{}'", token),
            }
        } else if let Some(caps) = RANGE.captures(token) {
            let (a, b) = (saturating_page(&caps[1]), saturating_page(&caps[2]));
            let lo = a.min(b).max(1);
            let hi = a.max(b).min(total_pages);
            pages.extend(lo..=hi);
        } else {
            debug!("Skipping unparseable page token '{}'", token);
        }
    }
    pages
}

/// Digits-only input; values past `usize::MAX` saturate so spans still clamp.
fn saturating_page(digits: &str) -> usize {
    digits.parse().unwrap_or(usize::MAX)
}

/// Pages selected for export, bounded by the document's page count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionSet {
    pages: HashSet<usize>,
    total_pages: usize,
}

impl SelectionSet {
    /// Empty selection for a document of `total_pages` pages.
    pub fn new(total_pages: usize) -> Self {
        Self {
            pages: HashSet::new(),
            total_pages,
        }
    }

    /// Every page selected.
    pub fn all(total_pages: usize) -> Self {
        let mut s = Self::new(total_pages);
        s.select_all();
        s
    }

    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn contains(&self, page_num: usize) -> bool {
        self.pages.contains(&page_num)
    }

    /// Flip membership of `page_num`. Out-of-range pages are ignored.
    pub fn toggle(&mut self, page_num: usize) {
        if !self.in_range(page_num) {
            debug!("Ignoring toggle of page {} (total={})", page_num, self.total_pages);
            return;
        }
        if !self.pages.remove(&page_num) {
            self.pages.insert(page_num);
        }
    }

    /// Add `page_num`; returns whether it was newly added.
    pub fn insert(&mut self, page_num: usize) -> bool {
        self.in_range(page_num) && self.pages.insert(page_num)
    }

    /// Remove `page_num`; returns whether it was present.
    pub fn remove(&mut self, page_num: usize) -> bool {
        self.pages.remove(&page_num)
    }

    pub fn select_all(&mut self) {
        self.pages = (1..=self.total_pages).collect();
    }

    pub fn select_none(&mut self) {
        self.pages.clear();
    }

    /// Replace the selection with the pages named by `spec`.
    ///
    /// Returns `false` (and changes nothing) when `spec` resolves to no pages.
    pub fn apply_range(&mut self, spec: &str) -> bool {
        let parsed = parse_range(spec, self.total_pages);
        if parsed.is_empty() {
            debug!("Range '{}' selected nothing; keeping current selection", spec);
            return false;
        }
        self.pages = parsed.into_iter().collect();
        true
    }

    /// Selected pages in ascending order.
    pub fn sorted(&self) -> Vec<usize> {
        let mut v: Vec<usize> = self.pages.iter().copied().collect();
        v.sort_unstable();
        v
    }

    fn in_range(&self, page_num: usize) -> bool {
        (1..=self.total_pages).contains(&page_num)
    }
}

/// "M of N selected".
impl fmt::Display for SelectionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} selected", self.len(), self.total_pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(pages: &[usize]) -> BTreeSet<usize> {
        pages.iter().copied().collect()
    }

    #[test]
    fn parses_singles_and_ranges() {
        assert_eq!(parse_range("1-3, 5", 10), set(&[1, 2, 3, 5]));
        assert_eq!(parse_range(" 7 ,2 ", 10), set(&[2, 7]));
    }

    #[test]
    fn range_is_order_independent() {
        assert_eq!(parse_range("5-2", 10), parse_range("2-5", 10));
    }

    #[test]
    fn clamps_ranges_to_document() {
        assert_eq!(parse_range("8-20", 10), set(&[8, 9, 10]));
        assert_eq!(parse_range("0-2", 10), set(&[1, 2]));
        assert!(parse_range("25-30", 10).is_empty());
    }

    #[test]
    fn skips_bad_tokens() {
        assert_eq!(parse_range("abc, 2", 10), set(&[2]));
        assert_eq!(parse_range("0, 11, 3", 10), set(&[3]));
        assert_eq!(parse_range("-3, 1-, 4", 10), set(&[4]));
        assert_eq!(parse_range("99999999999999999999999, 1", 10), set(&[1]));
    }

    #[test]
    fn huge_range_is_bounded_by_document() {
        assert_eq!(parse_range("1-18446744073709551615", 3), set(&[1, 2, 3]));
    }

    #[test]
    fn overflowing_range_end_is_clamped() {
        assert_eq!(
            parse_range("5-99999999999999999999999", 7),
            set(&[5, 6, 7])
        );
        assert_eq!(
            parse_range("99999999999999999999999-6", 7),
            set(&[6, 7])
        );
        assert!(parse_range("99999999999999999999999-99999999999999999999998", 7).is_empty());
    }

    #[test]
    fn invalid_spec_keeps_previous_selection() {
        let mut s = SelectionSet::new(10);
        s.toggle(4);
        assert!(!s.apply_range("abc"));
        assert_eq!(s.sorted(), vec![4]);
        assert!(!s.apply_range(""));
        assert_eq!(s.sorted(), vec![4]);
    }

    #[test]
    fn apply_range_replaces_selection() {
        let mut s = SelectionSet::all(10);
        assert!(s.apply_range("1-3, 5"));
        assert_eq!(s.sorted(), vec![1, 2, 3, 5]);
    }

    #[test]
    fn toggle_flips_and_respects_bounds() {
        let mut s = SelectionSet::new(3);
        s.toggle(2);
        assert!(s.contains(2));
        s.toggle(2);
        assert!(!s.contains(2));
        s.toggle(0);
        s.toggle(4);
        assert!(s.is_empty());
    }

    #[test]
    fn select_all_and_none() {
        let mut s = SelectionSet::new(4);
        s.select_all();
        assert_eq!(s.sorted(), vec![1, 2, 3, 4]);
        s.select_none();
        assert!(s.is_empty());
        assert_eq!(s.total_pages(), 4);
    }

    #[test]
    fn display_reports_m_of_n() {
        let mut s = SelectionSet::new(12);
        s.apply_range("1-3");
        assert_eq!(s.to_string(), "3 of 12 selected");
    }

    #[test]
    fn insert_rejects_out_of_range() {
        let mut s = SelectionSet::new(2);
        assert!(s.insert(2));
        assert!(!s.insert(2));
        assert!(!s.insert(3));
    }
}
