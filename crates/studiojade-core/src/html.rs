//! Minimal auto-escaping HTML builder.
//!
//! Markup is assembled from `&'static str` literals (trusted, appended as-is)
//! and runtime values, which always go through [`escape`]. There is no way to
//! append an owned or borrowed runtime string without escaping it, except
//! through [`Markup::raw_json`] which produces a script-safe JSON literal.

use std::fmt::{self, Write as _};

/// Escape text for use in element content and quoted attribute values.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    push_escaped(&mut out, s);
    out
}

fn push_escaped(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
}

/// Growable HTML document.
#[derive(Debug, Default, Clone)]
pub struct Markup {
    buf: String,
}

impl Markup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: String::with_capacity(capacity),
        }
    }

    /// Append trusted markup. Only literals are accepted.
    pub fn raw(&mut self, markup: &'static str) -> &mut Self {
        self.buf.push_str(markup);
        self
    }

    /// Append escaped text.
    pub fn text(&mut self, text: &str) -> &mut Self {
        push_escaped(&mut self.buf, text);
        self
    }

    /// Append a value via its `Display` impl, escaped.
    pub fn display(&mut self, value: impl fmt::Display) -> &mut Self {
        let mut tmp = String::new();
        // Writing into a String cannot fail.
        let _ = write!(tmp, "{value}");
        push_escaped(&mut self.buf, &tmp);
        self
    }

    /// Append ` name="value"` with the value escaped.
    pub fn attr(&mut self, name: &'static str, value: &str) -> &mut Self {
        self.buf.push(' ');
        self.buf.push_str(name);
        self.buf.push_str("=\"");
        push_escaped(&mut self.buf, value);
        self.buf.push('"');
        self
    }

    /// Append a JSON string literal safe to embed inside a `<script>` element.
    pub fn raw_json(&mut self, value: &str) -> &mut Self {
        let json = serde_json::Value::String(value.to_string()).to_string();
        self.buf.push_str(&json.replace("</", "<\\/"));
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn into_string(self) -> String {
        self.buf
    }
}

impl fmt::Display for Markup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.buf)
    }
}
