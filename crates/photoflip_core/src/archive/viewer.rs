//! Static HTML page bundled with exports.

use super::export::ArchiveEntry;
use std::collections::BTreeMap;
use std::fmt::Write;

fn escape(text: &str) -> String {
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

/// Render the offline viewer: one section per folder, main gallery first.
pub(crate) fn render(entries: &[ArchiveEntry]) -> String {
    let mut unfiled = Vec::new();
    let mut by_folder: BTreeMap<&str, Vec<&ArchiveEntry>> = BTreeMap::new();
    for entry in entries {
        if entry.record.folder.is_empty() {
            unfiled.push(entry);
        } else {
            by_folder
                .entry(entry.record.folder.as_str())
                .or_default()
                .push(entry);
        }
    }

    let mut html = String::from(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>PhotoFlip export</title>\n\
<style>body{font-family:sans-serif;margin:2rem}figure{display:inline-block;width:220px;margin:8px;vertical-align:top}\
img{max-width:100%;border-radius:6px}figcaption{white-space:pre-wrap;font-size:.9rem}</style>\n</head>\n<body>\n\
<h1>PhotoFlip export</h1>\n",
    );

    let sections = std::iter::once(("Main gallery", unfiled))
        .chain(by_folder.into_iter())
        .filter(|(_, entries)| !entries.is_empty());
    for (title, entries) in sections {
        let _ = writeln!(html, "<section>\n<h2>{}</h2>", escape(title));
        for entry in entries {
            let _ = writeln!(
                html,
                "<figure><a href=\"{path}\"><img src=\"{path}\" alt=\"{alt}\"></a><figcaption>{notes}</figcaption></figure>",
                path = escape(&entry.path),
                alt = escape(entry.record.display_name()),
                notes = escape(&entry.record.notes),
            );
        }
        html.push_str("</section>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}
