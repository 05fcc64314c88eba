#![doc = svgbobdoc::transform!(
//! A small, deterministic static site builder.
//!
//! # Overview
//!
//! `sitebuilder` turns a tree of source content and a set of templates into a
//! tree of output files ready to be served. Its pipeline looks like this:
//!
//! ```svgbob
//!  +-----------------+        +-----------------+
//!  | templates root  |        |   source root   |
//!  +--------+--------+        +--------+--------+
//!           |                          |
//!           v                          v
//!  +-----------------+        +-----------------+
//!  |    Registry     |        | Content Loader  |
//!  +--------+--------+        +--------+--------+
//!           |                          |
//!           +------------+-------------+
//!                        |
//!                        v
//!               +-----------------+     +----------+
//!               |   SiteBuilder   |<--->| Manifest |
//!               +--------+--------+     +----------+
//!                        |
//!            +-----------+-----------+
//!            |                       |
//!            v                       v
//!     +------------+          +------------+
//!     |  Renderer  |          | byte copy  |
//!     +------+-----+          +------+-----+
//!            |                       |
//!            +-----------+-----------+
//!                        |
//!                        v
//!            +-----------------------+
//!            | staging -> build root |
//!            +-----------------------+
//! ```
//!
//! In words:
//!
//!   * The [`templating::Registry`] reads every template, expands includes
//!     and resolves each template's inheritance chain, root layout first.
//!     Cycles and other structural problems are fatal.
//!
//!   * The [`content`] loader walks the source root. Files with a renderable
//!     extension are split into front matter ([`value::Dict`]) and a body;
//!     everything else is an _asset_ that is copied byte for byte. Two files
//!     that would produce the same output are fatal.
//!
//!   * The [`render()`](render::render) function composes one item through
//!     its template chain, leaf first. It performs no I/O.
//!
//!   * The [`SiteBuilder`] runs the whole thing on a worker pool, writes
//!     every output to a staging directory before moving it into place, and
//!     maintains a [`manifest::BuildManifest`] so that unchanged items are
//!     skipped on the next build.
//!
//! ## Errors
//!
//! A fatal [`error::Error`] means nothing in the build root was touched. All
//! other problems are scoped to a single item and reported as
//! [`error::ItemError`]s in the [`BuildReport`], while the rest of the site is
//! built as usual.
)]

#[macro_use]
pub mod error;
pub mod util;
pub mod fstree;
pub mod value;
pub mod templating;
pub mod content;
pub mod markdown;
pub mod render;
pub mod manifest;
pub mod config;
pub mod builder;

pub use config::Config;
pub use content::ContentItem;
pub use builder::{BuildReport, BuildStage, CancelToken, SiteBuilder};

pub use rayon;
