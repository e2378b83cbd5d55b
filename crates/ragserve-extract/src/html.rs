//! HTML text extraction.
//!
//! Markup is stripped with a small state machine rather than a DOM parse:
//! tags are dropped, `<script>`/`<style>` bodies are skipped entirely, a few
//! common entities are decoded, and whitespace is collapsed.

/// Strip tags from HTML and collapse whitespace.
pub fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len() / 2);
    let mut chars = html.char_indices();

    let mut skip_until: Option<&'static str> = None;

    while let Some((i, c)) = chars.next() {
        if let Some(closer) = skip_until {
            if starts_ignore_case(&html[i..], closer) {
                for _ in 0..closer.len() - 1 {
                    chars.next();
                }
                skip_until = None;
            }
            continue;
        }

        if c == '<' {
            if starts_ignore_case(&html[i..], "<script") {
                skip_until = Some("</script>");
                continue;
            }
            if starts_ignore_case(&html[i..], "<style") {
                skip_until = Some("</style>");
                continue;
            }
            // Block-level closers get a separating space so words from
            // adjacent elements do not fuse.
            for (_, tc) in chars.by_ref() {
                if tc == '>' {
                    break;
                }
            }
            out.push(' ');
            continue;
        }

        if c == '&' {
            let rest = &html[i..];
            let mut replaced = false;
            for (entity, replacement) in ENTITIES {
                if rest.starts_with(entity) {
                    out.push_str(replacement);
                    for _ in 0..entity.len() - 1 {
                        chars.next();
                    }
                    replaced = true;
                    break;
                }
            }
            if replaced {
                continue;
            }
        }

        out.push(c);
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn starts_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len() && s.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

const ENTITIES: &[(&str, &str)] = &[
    ("&amp;", "&"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&apos;", "'"),
    ("&nbsp;", " "),
];
