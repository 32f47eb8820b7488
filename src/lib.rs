use scraper::Html;

pub mod blog;
pub mod comments;
pub mod config;
pub mod database;
pub mod error;
pub mod health;
#[cfg(any(test, feature = "mock"))]
pub mod memory;
pub mod messages;
pub mod order;
pub mod pager;
pub mod posts;
pub mod schema;
pub mod slug;
pub mod store;
pub mod tags;

pub use blog::Blog;
pub use error::{BlogError, Result};
pub use order::resolve_order;
pub use pager::Pager;

/// Reduces an HTML fragment to its text, whitespace collapsed.
pub fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let text = fragment.root_element().text().collect::<Vec<_>>().join(" ");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The first `max_chars` characters of `text`, with an ellipsis when cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", text[..cut].trim_end()),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_is_extracted_from_markup() {
        assert_eq!(html_to_text("<p>Hello <b>world</b></p>\n<p>again</p>"), "Hello world again");
        assert_eq!(html_to_text("plain"), "plain");
        assert_eq!(html_to_text(""), "");
    }

    #[test]
    fn excerpt_cuts_on_char_boundary() {
        assert_eq!(excerpt("short", 50), "short");
        assert_eq!(excerpt("héllo wörld", 6), "héllo...");
    }
}
