//! Markdown editor with an edit/preview toggle.
//!
//! The preview is a snapshot of the input at the moment of toggling; it is
//! never updated live and never involves the network.

use pulldown_cmark::{html, Event, Options, Parser};

/// Renders markdown source to HTML.
pub trait MarkdownRenderer {
    fn render(&self, source: &str) -> String;
}

/// CommonMark renderer with tables, strikethrough and task lists. Raw HTML
/// in the source is escaped rather than passed through.
#[derive(Debug, Clone, Copy, Default)]
pub struct CmarkRenderer;

impl MarkdownRenderer for CmarkRenderer {
    fn render(&self, source: &str) -> String {
        let mut opts = Options::empty();
        opts.insert(Options::ENABLE_TABLES);
        opts.insert(Options::ENABLE_STRIKETHROUGH);
        opts.insert(Options::ENABLE_TASKLISTS);

        let events = Parser::new_ext(source, opts).map(|event| match event {
            Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
            other => other,
        });
        let mut out = String::with_capacity(source.len() * 3 / 2);
        html::push_html(&mut out, events);
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorMode {
    Edit,
    Preview,
}

#[derive(Debug, Clone)]
pub struct MarkdownEditor {
    input: String,
    mode: EditorMode,
    preview_html: String,
}

impl Default for MarkdownEditor {
    fn default() -> Self {
        Self::new("")
    }
}

impl MarkdownEditor {
    pub fn new(input: impl Into<String>) -> Self {
        Self { input: input.into(), mode: EditorMode::Edit, preview_html: String::new() }
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, input: impl Into<String>) {
        self.input = input.into();
    }

    pub fn mode(&self) -> EditorMode {
        self.mode
    }

    /// HTML shown on the preview surface; empty until the first toggle.
    pub fn preview_html(&self) -> &str {
        &self.preview_html
    }

    /// Flip between edit and preview. Entering preview re-renders from the
    /// current input.
    pub fn toggle_preview(&mut self, renderer: &dyn MarkdownRenderer) -> EditorMode {
        self.mode = match self.mode {
            EditorMode::Edit => {
                self.preview_html = renderer.render(&self.input);
                EditorMode::Preview
            }
            EditorMode::Preview => EditorMode::Edit,
        };
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_reflects_latest_input() {
        let mut ed = MarkdownEditor::new("**one**");
        assert_eq!(ed.toggle_preview(&CmarkRenderer), EditorMode::Preview);
        assert!(ed.preview_html().contains("<strong>one</strong>"));

        assert_eq!(ed.toggle_preview(&CmarkRenderer), EditorMode::Edit);
        assert_eq!(ed.input(), "**one**");

        ed.set_input("*two*");
        ed.toggle_preview(&CmarkRenderer);
        assert!(ed.preview_html().contains("<em>two</em>"));
        assert!(!ed.preview_html().contains("one"));
    }

    #[test]
    fn raw_html_is_escaped() {
        let html = CmarkRenderer.render("hi <script>alert(1)</script>");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn tables_are_enabled() {
        let html = CmarkRenderer.render("| a | b |\n|---|---|\n| 1 | 2 |\n");
        assert!(html.contains("<table>"));
    }
}
