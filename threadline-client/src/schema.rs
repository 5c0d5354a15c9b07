//! schema.org structured data describing the discussion below an article

use chrono::SecondsFormat;
use serde_json::{json, Value};

use crate::{
    api::{Comment, Time},
    markup, Thread,
};

/// Comments embedded in the structured data, newest first
pub const MAX_SCHEMA_COMMENTS: usize = 10;

/// Longest comment text embedded, in characters
pub const MAX_SCHEMA_TEXT_LEN: usize = 500;

/// The page a discussion belongs to
#[derive(Clone, Copy, Debug)]
pub struct ArticlePage<'a> {
    pub site_url: &'a str,
    pub site_name: &'a str,
    pub article_url: &'a str,
    pub article_title: &'a str,
}

fn iso(t: &Time) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Comment body as plain text, cut down to `MAX_SCHEMA_TEXT_LEN` characters
pub fn schema_text(content: &str) -> String {
    let text = markup::plain_text(content);
    if text.chars().count() <= MAX_SCHEMA_TEXT_LEN {
        return text;
    }
    let mut res = text
        .chars()
        .take(MAX_SCHEMA_TEXT_LEN - 3)
        .collect::<String>();
    res.push_str("...");
    res
}

fn comment_schema(page: &ArticlePage<'_>, discussion_id: &str, c: &Comment) -> Value {
    let id = format!("{}#comment-{}", page.article_url, c.id.0);
    let parent = match c.parent_comment_id {
        Some(p) => format!("{}#comment-{}", page.article_url, p.0),
        None => discussion_id.to_string(),
    };
    let author = match c.author_name.trim() {
        "" => "Anoniem",
        name => name,
    };
    let mut res = json!({
        "@type": "Comment",
        "@id": id,
        "url": id,
        "dateCreated": iso(&c.created_at),
        "text": schema_text(&c.content),
        "author": {
            "@type": "Person",
            "name": author,
        },
        "parentItem": parent,
    });
    let likes = c.count_likes();
    if likes > 0 {
        res["interactionStatistic"] = json!({
            "@type": "InteractionCounter",
            "interactionType": "https://schema.org/UpvoteAction",
            "userInteractionCount": likes,
        });
    }
    res
}

/// Build the `DiscussionForumPosting` JSON-LD for `thread`.
///
/// `now` stands in for the publication dates of a discussion without comments.
pub fn discussion_schema(page: &ArticlePage<'_>, thread: &Thread, now: Time) -> Value {
    let discussion_id = format!("{}#discussion", page.article_url);

    let mut comments = thread.walk().map(|(_, n)| n.comment()).collect::<Vec<_>>();
    comments.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
    let published = comments.last().map(|c| c.created_at).unwrap_or(now);
    let modified = comments.first().map(|c| c.created_at).unwrap_or(now);
    let total = thread.len();

    let embedded = comments
        .iter()
        .take(MAX_SCHEMA_COMMENTS)
        .map(|c| comment_schema(page, &discussion_id, c))
        .collect::<Vec<_>>();

    json!({
        "@context": "https://schema.org",
        "@type": "DiscussionForumPosting",
        "@id": discussion_id,
        "url": format!("{}#reacties", page.article_url),
        "headline": format!("Discussie: {}", page.article_title),
        "inLanguage": "nl-NL",
        "about": { "@id": format!("{}#article", page.article_url) },
        "isPartOf": { "@id": format!("{}/#website", page.site_url) },
        "mainEntityOfPage": page.article_url,
        "author": {
            "@type": "Organization",
            "name": page.site_name,
            "url": page.site_url,
        },
        "datePublished": iso(&published),
        "dateModified": iso(&modified),
        "commentCount": total,
        "interactionStatistic": [{
            "@type": "InteractionCounter",
            "interactionType": "https://schema.org/CommentAction",
            "userInteractionCount": total,
        }],
        "comment": embedded,
    })
}
