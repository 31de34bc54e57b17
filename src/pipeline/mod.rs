//! Pipeline phases for turning an SVG series into a document.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! fetch ──▶ convert ──▶ assemble ──▶ retention
//! (HTTP)    (resvg)     (lopdf)      (cleanup)
//! ```
//!
//! 1. [`fetch`]    walk `{base_url}1, 2, …` one request at a time until the
//!    first absent index, writing each SVG to disk
//! 2. [`convert`]  rasterise every SVG to PNG on a bounded [`pool`] of
//!    blocking workers; failures drop only their own page
//! 3. [`assemble`] place the PNGs, in index order, one per page of a PDF
//! 4. [`retention`] delete whichever intermediates the chosen mode discards
//!
//! [`render`] holds the SVG → PNG rasteriser used by `convert`.

pub mod assemble;
pub mod convert;
pub mod fetch;
pub mod pool;
pub mod render;
pub mod retention;
