//! Bundle data model for the overlay engine.
//!
//! A bundle is one persisted layer of edits (a "mod package"). It lives in its
//! own directory:
//!
//! ```text
//! my_bundle/
//!   bundle.json                  # Name, listing, entity edits, enum labels
//!   data/items/icons.json        # Local copies of listed files
//! ```
//!
//! Bundles are plain data: the overlay engine decides how they are layered and
//! is the only component that rewrites them (through its recompute-and-save
//! path).

pub mod bundle;
pub mod error;
pub mod listing;

pub use bundle::{Bundle, EntityEdit, BUNDLE_FILE_NAME};
pub use error::{Error, Result};
pub use listing::{FileDiffState, ListingEntry};
