//! Text bodies returned to the crawler.

use crate::session::{PageResult, RenderedPage};
use crate::Result;

pub const MARKUP_BEGINS: &str = "===== PAGE MARKUP BEGINS =====";
pub const MARKUP_ENDS: &str = "===== PAGE MARKUP ENDS =====";
pub const STYLES_BEGINS: &str = "===== COMPUTED STYLES BEGINS =====";
pub const STYLES_ENDS: &str = "===== COMPUTED STYLES ENDS =====";
pub const ERROR_BEGINS: &str = "===== PAGE ERROR BEGINS =====";
pub const ERROR_ENDS: &str = "===== PAGE ERROR ENDS =====";

/// Closing line of every markup section, so consumers can tell rendered
/// markup from raw source.
pub const GENERATOR_COMMENT: &str = "<!-- Page markup generated by pms/Headless Chrome -->";

pub const CONTENT_TYPE: &str = "text/plain; charset=UTF-8";

/// Body for any result. Skipped fetches have an empty body.
pub fn render_body(result: &PageResult) -> Result<String> {
    Ok(match result {
        PageResult::Success(page) => render_page(page)?,
        PageResult::NotFound { url } => not_found_body(url),
        PageResult::Skipped { .. } => String::new(),
        PageResult::ServerError { url, message } => error_body(url, message),
    })
}

pub fn render_page(page: &RenderedPage) -> Result<String> {
    let mut body = String::with_capacity(page.markup.len() + 128);
    body.push_str(MARKUP_BEGINS);
    body.push('\n');
    body.push_str(&page.markup);
    body.push('\n');
    body.push_str(GENERATOR_COMMENT);
    body.push('\n');
    body.push_str(MARKUP_ENDS);
    body.push('\n');

    if let Some(styles) = &page.styles {
        body.push_str(STYLES_BEGINS);
        body.push('\n');
        body.push_str(&styles.to_pretty_json()?);
        body.push('\n');
        body.push_str(STYLES_ENDS);
        body.push('\n');
    }
    Ok(body)
}

pub fn not_found_body(url: &str) -> String {
    format!(
        "<html><head><title>404 Not Found</title></head>\
         <body><p>URL not found {url}</p></body></html>\n"
    )
}

pub fn error_body(url: &str, message: &str) -> String {
    format!("{ERROR_BEGINS}\n{url}\n{message}\n{ERROR_ENDS}\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{ComputedStyles, ElementStyle};
    use crate::render::FireReason;
    use crate::session::SkipReason;
    use std::time::Duration;

    fn page(styles: Option<ComputedStyles>) -> RenderedPage {
        RenderedPage {
            url: "http://example.test/ok".into(),
            markup: "<html><body>ok</body></html>".into(),
            screenshot: None,
            styles,
            fired_by: FireReason::Quiet,
            render_wait: Duration::from_millis(600),
            elapsed: Duration::from_millis(640),
            script_errors: Vec::new(),
        }
    }

    #[test]
    fn markup_is_framed() {
        let body = render_body(&PageResult::Success(page(None))).unwrap();
        assert_eq!(
            body,
            concat!(
                "===== PAGE MARKUP BEGINS =====\n",
                "<html><body>ok</body></html>\n",
                "<!-- Page markup generated by pms/Headless Chrome -->\n",
                "===== PAGE MARKUP ENDS =====\n",
            )
        );
    }

    #[test]
    fn styles_follow_markup() {
        let styles = ComputedStyles {
            url: "http://example.test/ok".into(),
            elements: vec![ElementStyle {
                id: "x".into(),
                class_name: String::new(),
                tag_name: "P".into(),
                child_nodes: 1,
                inner_html: "ok".into(),
                element_text: "ok".into(),
                offset_height: 18.0,
                offset_width: 100.0,
                offset_top: 0.0,
                offset_left: 0.0,
                computed_style: serde_json::Map::new(),
                parent_tag_name: Some("BODY".into()),
            }],
        };
        let body = render_body(&PageResult::Success(page(Some(styles)))).unwrap();
        let markup_end = body.find(MARKUP_ENDS).unwrap();
        let styles_begin = body.find(STYLES_BEGINS).unwrap();
        assert!(markup_end < styles_begin);
        assert!(body.ends_with("===== COMPUTED STYLES ENDS =====\n"));
        assert!(body.contains("    \"elements\": ["));
    }

    #[test]
    fn not_found_mentions_url() {
        let body = render_body(&PageResult::NotFound {
            url: "http://example.test/404".into(),
        })
        .unwrap();
        assert!(body.contains("404 Not Found"));
        assert!(body.contains("http://example.test/404"));
    }

    #[test]
    fn skipped_is_empty() {
        let body = render_body(&PageResult::Skipped {
            url: "http://example.test/a.png".into(),
            reason: SkipReason::BinaryUrl("png"),
        })
        .unwrap();
        assert!(body.is_empty());
    }

    #[test]
    fn server_error_is_framed() {
        let body = render_body(&PageResult::ServerError {
            url: "http://example.test/".into(),
            message: "Browser error: browser connection failed: ws closed".into(),
        })
        .unwrap();
        assert_eq!(
            body,
            concat!(
                "===== PAGE ERROR BEGINS =====\n",
                "http://example.test/\n",
                "Browser error: browser connection failed: ws closed\n",
                "===== PAGE ERROR ENDS =====\n",
            )
        );
    }
}
