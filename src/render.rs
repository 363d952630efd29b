use std::fmt::Write;

use crate::error::Result;
use crate::listing::Listing;

/// Renders a listing as an HTML index page.
///
/// Output is a pure function of the title and the ordered entry names.
#[derive(Debug, Clone)]
pub struct IndexRenderer {
    title: String,
}

impl IndexRenderer {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }

    /// Render `listing` to a complete HTML document.
    ///
    /// Entries whose name is not valid UTF-8 are skipped; one bad name never
    /// breaks the page. Writing into a `String` does not fail today, so
    /// `Encode` only surfaces if the output target changes.
    pub fn render(&self, listing: &Listing) -> Result<String> {
        let title = escape_html(&self.title);
        let mut html = String::new();

        writeln!(html, "<!doctype html>")?;
        writeln!(html, "<html>")?;
        writeln!(html, "    <head>")?;
        writeln!(html, "        <meta charset=\"utf-8\">")?;
        writeln!(html, "        <title>{title}</title>")?;
        writeln!(html, "        <style>:root {{ font-family: system-ui; }}</style>")?;
        writeln!(html, "    </head>")?;
        writeln!(html, "    <body>")?;
        writeln!(html, "        <h1>{title}</h1>")?;
        writeln!(html, "        <ul>")?;
        for entry in listing.entries() {
            let Some(name) = entry.as_str() else {
                tracing::debug!("skipping non-UTF-8 entry {:?}", entry.name());
                continue;
            };
            writeln!(
                html,
                "            <li><a href=\"{}\">{}</a></li>",
                urlencoding::encode(name),
                escape_html(name)
            )?;
        }
        writeln!(html, "        </ul>")?;
        writeln!(html, "    </body>")?;
        writeln!(html, "</html>")?;

        Ok(html)
    }
}

impl Default for IndexRenderer {
    fn default() -> Self {
        Self::new("Directory index")
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
