mod fs;
mod macros;
mod path_ext;

pub use fs::*;
pub use path_ext::*;
pub use macros::*;

/// Returns `true` if `input` is likely to contain a template marker.
///
/// ```rust
/// use sitebuilder::util::has_markers;
///
/// assert!(has_markers("<p>{{ title }}</p>"));
/// assert!(has_markers("{% extends \"base\" %}"));
/// assert!(has_markers("{# note #}"));
/// assert!(!has_markers("a { b } c"));
/// assert!(!has_markers("trailing {"));
/// ```
pub fn has_markers(input: &str) -> bool {
    let mut slice = input.as_bytes();
    while let Some(i) = memchr::memchr(b'{', slice) {
        match slice.get(i + 1) {
            Some(b'{') | Some(b'%') | Some(b'#') => return true,
            Some(_) => slice = &slice[(i + 1)..],
            None => return false,
        }
    }

    false
}
