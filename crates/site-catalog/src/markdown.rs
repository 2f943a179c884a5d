//! Rendering of dataset descriptions.

use pulldown_cmark::{Options, Parser, html};

/// Render a markdown document into HTML markup.
pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(markdown, options);
    let mut rendered = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut rendered, parser);
    rendered
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn renders_emphasis() {
        assert_eq!(markdown_to_html("**x**"), "<p><strong>x</strong></p>\n");
    }

    #[test]
    fn renders_links_and_lists() {
        let html = markdown_to_html("* [EU](https://eu.example)\n* two");
        assert!(html.contains(r#"<a href="https://eu.example">EU</a>"#), "{html}");
        assert!(html.starts_with("<ul>"), "{html}");
    }

    #[test]
    fn empty_input_renders_nothing() {
        assert_eq!(markdown_to_html(""), "");
    }
}
