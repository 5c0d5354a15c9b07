use chrono::Datelike;

use crate::{
    api::{CommentId, Time, UserId},
    markup, Session, Thread, ThreadNode,
};

/// Replies nested deeper than this are drawn at this depth
pub const DEFAULT_MAX_DISPLAY_DEPTH: usize = 6;

const MAX_AVATAR_SIZE: u32 = 48;
const MIN_AVATAR_SIZE: u32 = 32;
const AVATAR_STEP: u32 = 4;

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Presentation {
    /// Top-level comment
    Full,
    /// Reply, drawn indented below its parent
    Nested,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CommentAction {
    Reply { parent_comment_id: CommentId },
    /// `liked` is the state before the toggle the action triggers
    Like { comment_id: CommentId, liked: bool },
}

/// One comment, ready to be displayed
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize)]
pub struct RenderedComment {
    pub id: CommentId,
    pub depth: usize,
    pub display_depth: usize,
    pub presentation: Presentation,
    pub avatar_size: u32,
    pub author_id: UserId,
    pub author_name: String,
    pub author_photo_url: Option<String>,
    pub created_at: Time,
    pub age: String,
    pub content_html: String,
    pub likes: u64,
    pub liked_by_viewer: bool,
    pub reply_count: usize,
    pub actions: Vec<CommentAction>,
}

/// Turns a thread into the list of comments to display, parents right before their replies.
///
/// Output only depends on the thread, the viewer and the reference time.
#[derive(Clone, Debug)]
pub struct Renderer<'a> {
    viewer: Option<&'a Session>,
    now: Time,
    max_display_depth: usize,
}

impl<'a> Renderer<'a> {
    pub fn new(viewer: Option<&'a Session>, now: Time) -> Renderer<'a> {
        Renderer {
            viewer,
            now,
            max_display_depth: DEFAULT_MAX_DISPLAY_DEPTH,
        }
    }

    pub fn with_max_display_depth(mut self, max_display_depth: usize) -> Renderer<'a> {
        self.max_display_depth = max_display_depth;
        self
    }

    pub fn render(&self, thread: &Thread) -> Vec<RenderedComment> {
        let mut res = Vec::with_capacity(thread.len());
        res.extend(thread.walk().map(|(depth, node)| self.render_one(node, depth)));
        res
    }

    fn render_one(&self, node: &ThreadNode, depth: usize) -> RenderedComment {
        let c = node.comment();
        let display_depth = depth.min(self.max_display_depth);
        let liked_by_viewer = self
            .viewer
            .map(|s| c.is_liked_by(&s.user_id()))
            .unwrap_or(false);
        RenderedComment {
            id: c.id,
            depth,
            display_depth,
            presentation: if depth == 0 {
                Presentation::Full
            } else {
                Presentation::Nested
            },
            avatar_size: avatar_size(display_depth),
            author_id: c.author_id,
            author_name: c.author_name.clone(),
            author_photo_url: c.author_photo_url.clone(),
            created_at: c.created_at,
            age: relative_time(self.now, c.created_at),
            content_html: markup::to_html(&c.content),
            likes: c.count_likes(),
            liked_by_viewer,
            reply_count: node.replies().len(),
            actions: vec![
                CommentAction::Reply {
                    parent_comment_id: c.id,
                },
                CommentAction::Like {
                    comment_id: c.id,
                    liked: liked_by_viewer,
                },
            ],
        }
    }
}

pub fn avatar_size(display_depth: usize) -> u32 {
    let shrink = u32::try_from(display_depth)
        .unwrap_or(u32::MAX)
        .saturating_mul(AVATAR_STEP);
    MAX_AVATAR_SIZE.saturating_sub(shrink).max(MIN_AVATAR_SIZE)
}

const MONTHS: [&str; 12] = [
    "jan.", "feb.", "mrt.", "apr.", "mei", "jun.", "jul.", "aug.", "sep.", "okt.", "nov.", "dec.",
];

/// Human age of a comment, in Dutch like the rest of the forum
pub fn relative_time(now: Time, t: Time) -> String {
    let diff = (now - t).num_milliseconds();
    if diff < 60_000 {
        return String::from("Zojuist");
    }
    if diff < 3_600_000 {
        let minutes = diff / 60_000;
        return format!("{minutes} {} geleden", if minutes == 1 { "minuut" } else { "minuten" });
    }
    if diff < 86_400_000 {
        return format!("{} uur geleden", diff / 3_600_000);
    }
    if diff < 604_800_000 {
        let days = diff / 86_400_000;
        return format!("{days} {} geleden", if days == 1 { "dag" } else { "dagen" });
    }
    format!("{} {} {}", t.day(), MONTHS[t.month0() as usize], t.year())
}

/// Terminal rendering, one indented block per comment
pub fn render_text(comments: &[RenderedComment]) -> String {
    let mut res = String::new();
    for c in comments {
        let indent = "  ".repeat(c.display_depth);
        let likes = match c.likes {
            1 => String::from("1 like"),
            n => format!("{n} likes"),
        };
        let liked = if c.liked_by_viewer { ", including you" } else { "" };
        res.push_str(&format!(
            "{indent}{} · {} · {likes}{liked} [{}]\n",
            c.author_name, c.age, c.id.0
        ));
        let text = markup::html_to_text(&c.content_html);
        res.push_str(&format!("{indent}  {text}\n"));
    }
    res
}
