//! Lightweight formatting for comment bodies.
//!
//! Comments support `**bold**`, `*italic*`, `__underline__`, `` `code` ``,
//! fenced code blocks, `>` quotes, `[label](url)` links, `![alt](url)`
//! images, bare URLs, `@mentions` and `#hashtags`. Everything a user typed
//! ends up HTML-escaped, whatever the grammar made of it.

use html_escape::{encode_double_quoted_attribute, encode_text};
use pest::{iterators::Pairs, Parser};

#[derive(pest_derive::Parser)]
#[grammar = "markup.pest"]
struct MarkupParser;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Open {
    Nothing,
    Paragraph,
    Quote,
}

impl Open {
    fn opening(&self) -> &'static str {
        match self {
            Open::Nothing => "",
            Open::Paragraph => "<p>",
            Open::Quote => "<blockquote>",
        }
    }

    fn closing(&self) -> &'static str {
        match self {
            Open::Nothing => "",
            Open::Paragraph => "</p>",
            Open::Quote => "</blockquote>",
        }
    }
}

/// Format a comment body as HTML
pub fn to_html(content: &str) -> String {
    match MarkupParser::parse(Rule::document, content) {
        Ok(mut pairs) => match pairs.next() {
            Some(document) => render_blocks(document.into_inner()),
            None => fallback_html(content),
        },
        Err(e) => {
            tracing::debug!(error = %e, "comment did not parse as markup, escaping it as-is");
            fallback_html(content)
        }
    }
}

fn fallback_html(content: &str) -> String {
    let mut res = String::from("<p>");
    res.push_str(&encode_text(content).replace('\n', "<br>"));
    res.push_str("</p>");
    res
}

fn render_blocks(blocks: Pairs<'_, Rule>) -> String {
    let mut out = String::new();
    let mut open = Open::Nothing;
    for block in blocks {
        let want = match block.as_rule() {
            Rule::paragraph => Open::Paragraph,
            Rule::quote => Open::Quote,
            Rule::code_block | Rule::blank_line | Rule::EOI => Open::Nothing,
            r => unreachable!("markup: unexpected block {:?}", r),
        };
        if want != Open::Nothing && want == open {
            out.push_str("<br>");
        } else {
            out.push_str(open.closing());
            out.push_str(want.opening());
        }
        open = want;
        match block.as_rule() {
            Rule::paragraph | Rule::quote => render_inlines(&mut out, block.into_inner()),
            Rule::code_block => render_code_block(&mut out, block.into_inner()),
            _ => (),
        }
    }
    out.push_str(open.closing());
    out
}

fn render_code_block(out: &mut String, parts: Pairs<'_, Rule>) {
    let mut lang = None;
    let mut code = "";
    for p in parts {
        match p.as_rule() {
            Rule::lang => lang = Some(p.as_str()),
            Rule::code_text => code = p.as_str(),
            r => unreachable!("markup: unexpected code block part {:?}", r),
        }
    }
    let code = code.strip_suffix('\n').unwrap_or(code);
    let code = code.strip_suffix('\r').unwrap_or(code);
    match lang {
        Some(lang) => {
            out.push_str("<pre><code class=\"language-");
            out.push_str(&encode_double_quoted_attribute(lang));
            out.push_str("\">");
        }
        None => out.push_str("<pre><code>"),
    }
    out.push_str(&encode_text(code));
    out.push_str("</code></pre>");
}

/// Links and images may only point to the web or to this site
fn is_safe_target(target: &str) -> bool {
    let lower = target.to_ascii_lowercase();
    lower.starts_with("https://")
        || lower.starts_with("http://")
        || (lower.starts_with('/') && !lower.starts_with("//"))
}

fn label_and_target<'i>(mut parts: Pairs<'i, Rule>) -> (&'i str, &'i str) {
    let label = parts.next().map(|p| p.as_str()).unwrap_or("");
    let target = parts.next().map(|p| p.as_str()).unwrap_or("");
    (label, target)
}

fn inner_str<'i>(mut parts: Pairs<'i, Rule>) -> &'i str {
    parts.next().map(|p| p.as_str()).unwrap_or("")
}

fn push_wrapped(out: &mut String, tag: &str, text: &str) {
    out.push('<');
    out.push_str(tag);
    out.push('>');
    out.push_str(&encode_text(text));
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

fn push_anchor(out: &mut String, href: &str, label: &str) {
    out.push_str("<a href=\"");
    out.push_str(&encode_double_quoted_attribute(href));
    out.push_str("\" target=\"_blank\" rel=\"noopener noreferrer\">");
    out.push_str(&encode_text(label));
    out.push_str("</a>");
}

fn render_inlines(out: &mut String, inlines: Pairs<'_, Rule>) {
    for p in inlines {
        match p.as_rule() {
            Rule::text | Rule::symbol => out.push_str(&encode_text(p.as_str())),
            Rule::bold => push_wrapped(out, "strong", inner_str(p.into_inner())),
            Rule::italic => push_wrapped(out, "em", inner_str(p.into_inner())),
            Rule::underline => push_wrapped(out, "u", inner_str(p.into_inner())),
            Rule::inline_code => push_wrapped(out, "code", inner_str(p.into_inner())),
            Rule::url => push_anchor(out, p.as_str(), p.as_str()),
            Rule::mention => {
                out.push_str("<span class=\"mention\">");
                out.push_str(&encode_text(p.as_str()));
                out.push_str("</span>");
            }
            Rule::hashtag => {
                out.push_str("<span class=\"hashtag\">");
                out.push_str(&encode_text(p.as_str()));
                out.push_str("</span>");
            }
            Rule::link => {
                let whole = p.as_str();
                let (label, target) = label_and_target(p.into_inner());
                if is_safe_target(target) {
                    push_anchor(out, target, if label.is_empty() { target } else { label });
                } else {
                    out.push_str(&encode_text(whole));
                }
            }
            Rule::image => {
                let whole = p.as_str();
                let (alt, src) = label_and_target(p.into_inner());
                if is_safe_target(src) {
                    out.push_str("<img src=\"");
                    out.push_str(&encode_double_quoted_attribute(src));
                    out.push_str("\" alt=\"");
                    out.push_str(&encode_double_quoted_attribute(alt));
                    out.push_str("\" loading=\"lazy\">");
                } else {
                    out.push_str(&encode_text(whole));
                }
            }
            r => unreachable!("markup: unexpected inline {:?}", r),
        }
    }
}

/// Text of a comment without any formatting, HTML tags or repeated whitespace
pub fn plain_text(content: &str) -> String {
    let mut flat = String::with_capacity(content.len());
    match MarkupParser::parse(Rule::document, content) {
        Ok(pairs) => {
            for p in pairs.flatten() {
                match p.as_rule() {
                    Rule::text
                    | Rule::symbol
                    | Rule::bold_text
                    | Rule::italic_text
                    | Rule::underline_text
                    | Rule::code_span
                    | Rule::code_text
                    | Rule::url
                    | Rule::mention
                    | Rule::hashtag
                    | Rule::label => flat.push_str(p.as_str()),
                    Rule::paragraph | Rule::quote | Rule::code_block | Rule::blank_line => {
                        flat.push(' ')
                    }
                    _ => (),
                }
            }
        }
        Err(_) => flat.push_str(content),
    }
    collapse_whitespace(&strip_tags(&flat, ""))
}

/// Readable text of HTML produced by `to_html`, for terminals
pub fn html_to_text(html: &str) -> String {
    let text = strip_tags(html, " ");
    collapse_whitespace(&html_escape::decode_html_entities(&text))
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_tags(s: &str, replacement: &str) -> String {
    let mut res = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find('<') {
        res.push_str(&rest[..start]);
        res.push_str(replacement);
        match rest[start..].find('>') {
            Some(end) => rest = &rest[start + end + 1..],
            None => {
                rest = &rest[start..];
                break;
            }
        }
    }
    res.push_str(rest);
    res
}
