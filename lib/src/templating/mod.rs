//! The template engine: marker parsing and the template registry.
//!
//! Templates are plain text with four kinds of markers:
//!
//! | marker                  | meaning                                        |
//! |-------------------------|------------------------------------------------|
//! | `{{ name }}`            | placeholder, filled from metadata or `content` |
//! | `{% extends "base" %}`  | this template wraps itself in `base`           |
//! | `{% include "part" %}`  | inline the body of `part` at load time         |
//! | `{# comment #}`         | dropped                                        |

mod template;
mod registry;

pub use template::*;
pub use registry::*;

/// The placeholder filled with the inner template's output, or with the
/// content body for the leaf-most template of a chain.
pub const CONTENT: &str = "content";
