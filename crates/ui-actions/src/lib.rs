//! UI action execution.
//!
//! [`ActionExecutor`] performs resolve-then-act operations with the
//! native-to-script click fallback the portals require; [`OverlayGuard`]
//! clears blocking overlays and modal dialogs around them.

pub mod errors;
pub mod executor;
pub mod guard;
pub mod textmatch;

pub use errors::ActionError;
pub use executor::{ActionConfig, ActionExecutor, ClickOptions};
pub use guard::{OverlayConfig, OverlayGuard};
pub use textmatch::{contains_folded, fold_pt};
