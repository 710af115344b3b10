//! Bounded pagination traversal.
//!
//! [`Paginator`] yields the rows of the currently displayed page, advances
//! through a fallback chain of "next" controls, and hard-stops at a
//! configured page count so a looping portal can never hold a run hostage.

pub mod errors;
pub mod pager;

pub use errors::PagerError;
pub use pager::{
    default_next_candidates, PageVisitor, Paginator, PagerConfig, TraverseSummary,
};
