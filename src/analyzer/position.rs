//! Where on its page a heading lands.
//!
//! Flow layout alone does not reveal exact page-break positions, so the
//! available height is estimated in tiers from the amount of content above
//! the heading. Each tier leans towards a larger estimate so that figures
//! are not shrunk more than necessary.

use crate::model::PagePosition;
use crate::policy::LayoutPolicy;

/// Estimated real available height for a heading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageEstimate {
    pub available: f64,
    pub pages_above: u32,
    pub remainder: f64,
    pub position: PagePosition,
}

/// Estimate the height left on the page a heading lands on.
///
/// `content_above` is the flow height between the last explicit break and
/// the heading; `effective_height` is the usable height of one page.
pub fn estimate_available_height(
    content_above: f64,
    effective_height: f64,
    policy: &LayoutPolicy,
) -> PageEstimate {
    let content_above = content_above.max(0.0);
    let pages_above = if effective_height > 0.0 {
        (content_above / effective_height).floor() as u32
    } else {
        0
    };
    let remainder = content_above - pages_above as f64 * effective_height;

    let generous = policy
        .generous_min_available
        .max(effective_height - remainder.min(policy.small_remainder_px));

    let (available, position) = if pages_above >= 2 {
        (
            effective_height - policy.page_top_buffer,
            PagePosition::TopOfLaterPage,
        )
    } else if pages_above == 1 {
        if remainder < policy.small_remainder_px {
            (
                effective_height - policy.page_top_buffer.max(remainder),
                PagePosition::AfterPageTight,
            )
        } else {
            (generous, PagePosition::AfterPageFlowed)
        }
    } else if content_above < policy.near_top_px {
        (
            effective_height - policy.page_top_buffer,
            PagePosition::NearTop,
        )
    } else if content_above < effective_height * policy.same_page_fraction {
        (effective_height - content_above, PagePosition::SamePage)
    } else {
        (generous, PagePosition::SamePageFlowed)
    };

    PageEstimate {
        available,
        pages_above,
        remainder,
        position,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EFFECTIVE: f64 = 894.0;

    fn estimate(content_above: f64) -> PageEstimate {
        estimate_available_height(content_above, EFFECTIVE, &LayoutPolicy::default())
    }

    #[test]
    fn test_two_pages_above_ignores_remainder() {
        let e = estimate(1850.0);
        assert_eq!(e.pages_above, 2);
        assert_eq!(e.available, 844.0);
        assert_eq!(e.position, PagePosition::TopOfLaterPage);

        let e = estimate(2650.0);
        assert_eq!(e.available, 844.0);
    }

    #[test]
    fn test_one_page_above_tight_remainder() {
        // remainder 30 -> buffer of 50 wins
        let e = estimate(924.0);
        assert_eq!(e.pages_above, 1);
        assert_eq!(e.available, 844.0);
        assert_eq!(e.position, PagePosition::AfterPageTight);

        // remainder 150 -> remainder wins
        let e = estimate(1044.0);
        assert_eq!(e.available, 744.0);
    }

    #[test]
    fn test_one_page_above_large_remainder_is_generous() {
        let e = estimate(894.0 + 600.0);
        assert_eq!(e.position, PagePosition::AfterPageFlowed);
        assert_eq!(e.available, 694.0);
    }

    #[test]
    fn test_near_top() {
        let e = estimate(60.0);
        assert_eq!(e.available, 844.0);
        assert_eq!(e.position, PagePosition::NearTop);
    }

    #[test]
    fn test_same_page_literal() {
        let e = estimate(300.0);
        assert_eq!(e.available, 594.0);
        assert_eq!(e.position, PagePosition::SamePage);
    }

    #[test]
    fn test_same_page_far_down_is_generous() {
        let e = estimate(700.0);
        assert_eq!(e.position, PagePosition::SamePageFlowed);
        assert_eq!(e.available, 694.0);
    }

    #[test]
    fn test_generous_estimate_has_floor() {
        let policy = LayoutPolicy::default();
        let e = estimate_available_height(450.0, 600.0, &policy);
        assert_eq!(e.position, PagePosition::SamePageFlowed);
        assert_eq!(e.available, 500.0);
    }
}
