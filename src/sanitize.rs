//! HTML sanitizing for stored message bodies.
//!
//! The parser never sanitizes on its own; callers that store or display
//! `formatted_text` run it through a [`Sanitizer`] first.

/// Cleans untrusted text before storage or display.
pub trait Sanitizer: Send + Sync {
    fn sanitize(&self, text: &str) -> String;
}

/// Policy for user-generated HTML: ammonia's safe element and attribute
/// whitelist, with every link marked `nofollow noopener noreferrer`.
///
/// Build it once at startup and pass it by reference.
pub struct HtmlSanitizer {
    builder: ammonia::Builder<'static>,
}

impl HtmlSanitizer {
    pub fn new() -> Self {
        let mut builder = ammonia::Builder::default();
        builder.link_rel(Some("nofollow noopener noreferrer"));
        Self { builder }
    }
}

impl Default for HtmlSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Sanitizer for HtmlSanitizer {
    fn sanitize(&self, text: &str) -> String {
        self.builder.clean(text).to_string()
    }
}
