//! Per-author activity derived from a thread: scores, levels and badges

use std::collections::HashMap;

use crate::api::{Comment, UserId};

/// Authors shown on a leaderboard
pub const LEADERBOARD_SIZE: usize = 10;

const POINTS_PER_COMMENT: u64 = 10;
const POINTS_PER_LIKE: u64 = 5;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Level {
    pub level: u8,
    pub name: &'static str,
    pub min_score: u64,
}

pub const LEVELS: [Level; 6] = [
    Level { level: 1, name: "Rookie", min_score: 0 },
    Level { level: 2, name: "Member", min_score: 100 },
    Level { level: 3, name: "Contributor", min_score: 500 },
    Level { level: 4, name: "Expert", min_score: 1500 },
    Level { level: 5, name: "Master", min_score: 4000 },
    Level { level: 6, name: "Legend", min_score: 10000 },
];

pub fn level_for(score: u64) -> Level {
    LEVELS
        .iter()
        .rev()
        .find(|l| score >= l.min_score)
        .copied()
        .unwrap_or(LEVELS[0])
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Badge {
    FirstPost,
    Conversationalist,
    Popular,
    Expert,
    Veteran,
    Legend,
    Helper,
    OnFire,
}

impl Badge {
    pub const ALL: [Badge; 8] = [
        Badge::FirstPost,
        Badge::Conversationalist,
        Badge::Popular,
        Badge::Expert,
        Badge::Veteran,
        Badge::Legend,
        Badge::Helper,
        Badge::OnFire,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Badge::FirstPost => "first_post",
            Badge::Conversationalist => "conversationalist",
            Badge::Popular => "popular",
            Badge::Expert => "expert",
            Badge::Veteran => "veteran",
            Badge::Legend => "legend",
            Badge::Helper => "helper",
            Badge::OnFire => "on_fire",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Badge::FirstPost => "Eerste Reactie",
            Badge::Conversationalist => "Gesprekspartner",
            Badge::Popular => "Populair",
            Badge::Expert => "Expert",
            Badge::Veteran => "Veteraan",
            Badge::Legend => "Legende",
            Badge::Helper => "Helper",
            Badge::OnFire => "On Fire",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Badge::FirstPost => "💬",
            Badge::Conversationalist => "🗣️",
            Badge::Popular => "⭐",
            Badge::Expert => "🎓",
            Badge::Veteran => "🛡️",
            Badge::Legend => "👑",
            Badge::Helper => "🤝",
            Badge::OnFire => "🔥",
        }
    }

    fn earned_by(&self, comments: u64, likes: u64, level: &Level) -> bool {
        match self {
            Badge::FirstPost => comments >= 1,
            Badge::Conversationalist => comments >= 10,
            Badge::Popular => likes >= 50,
            Badge::Expert => level.level >= 4,
            Badge::Veteran => comments >= 50,
            Badge::Legend => level.level >= 6,
            Badge::Helper => comments >= 5,
            Badge::OnFire => likes >= 100,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AuthorStats {
    pub author_id: UserId,
    pub display_name: String,
    pub photo_url: Option<String>,
    pub comment_count: u64,
    /// Likes received over all of the author's comments
    pub total_likes: u64,
    pub score: u64,
    pub level: Level,
    pub badges: Vec<Badge>,
}

/// Stats of every author of `comments`, in order of their first comment in the list
///
/// Name and photo are taken from that first comment.
pub fn author_stats(comments: &[Comment]) -> Vec<AuthorStats> {
    let mut index = HashMap::new();
    let mut res: Vec<AuthorStats> = Vec::new();
    for c in comments {
        let i = *index.entry(c.author_id).or_insert_with(|| {
            let display_name = match c.author_name.trim() {
                "" => String::from("Anoniem"),
                name => name.to_string(),
            };
            res.push(AuthorStats {
                author_id: c.author_id,
                display_name,
                photo_url: c.author_photo_url.clone(),
                comment_count: 0,
                total_likes: 0,
                score: 0,
                level: LEVELS[0],
                badges: Vec::new(),
            });
            res.len() - 1
        });
        res[i].comment_count += 1;
        res[i].total_likes += c.count_likes();
    }
    for s in res.iter_mut() {
        s.score = s.comment_count * POINTS_PER_COMMENT + s.total_likes * POINTS_PER_LIKE;
        s.level = level_for(s.score);
        s.badges = Badge::ALL
            .into_iter()
            .filter(|b| b.earned_by(s.comment_count, s.total_likes, &s.level))
            .collect();
    }
    res
}

/// The `LEADERBOARD_SIZE` best-scoring authors, best first
///
/// Equal scores keep the order of the authors' first comments.
pub fn leaderboard(comments: &[Comment]) -> Vec<AuthorStats> {
    let mut stats = author_stats(comments);
    stats.sort_by(|a, b| b.score.cmp(&a.score));
    stats.truncate(LEADERBOARD_SIZE);
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ArticleSlug, CommentId, Uuid};
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn comment(n: u128, author: u128, likes: u128) -> Comment {
        Comment {
            id: CommentId(Uuid::from_u128(n)),
            article_slug: ArticleSlug::stub(),
            author_id: UserId(Uuid::from_u128(author)),
            author_name: format!("lezer {author}"),
            author_photo_url: None,
            content: String::from("hoi"),
            created_at: chrono::Utc.timestamp_millis_opt(n as i64).unwrap(),
            likes: likes as u64,
            liked_by: (0..likes)
                .map(|l| (UserId(Uuid::from_u128(1_000 + l)), true))
                .collect::<BTreeMap<_, _>>(),
            parent_comment_id: None,
        }
    }

    #[test]
    fn levels() {
        assert_eq!(level_for(0).level, 1);
        assert_eq!(level_for(99).level, 1);
        assert_eq!(level_for(100).name, "Member");
        assert_eq!(level_for(1499).level, 3);
        assert_eq!(level_for(1500).level, 4);
        assert_eq!(level_for(9999).level, 5);
        assert_eq!(level_for(u64::MAX).name, "Legend");
    }

    #[test]
    fn scores_and_badges() {
        let mut comments = vec![comment(1, 1, 3), comment(2, 2, 0), comment(3, 1, 0)];
        comments[2].author_name = String::from("andere naam");
        let stats = author_stats(&comments);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].display_name, "lezer 1");
        assert_eq!(stats[0].comment_count, 2);
        assert_eq!(stats[0].total_likes, 3);
        assert_eq!(stats[0].score, 35);
        assert_eq!(stats[0].badges, vec![Badge::FirstPost]);
        assert_eq!(stats[1].score, 10);

        let busy = (0..10).map(|n| comment(n, 9, 10)).collect::<Vec<_>>();
        let stats = author_stats(&busy);
        assert_eq!(stats[0].score, 600);
        assert_eq!(stats[0].level.name, "Contributor");
        assert_eq!(
            stats[0].badges,
            vec![
                Badge::FirstPost,
                Badge::Conversationalist,
                Badge::Popular,
                Badge::Helper,
                Badge::OnFire
            ]
        );
    }

    #[test]
    fn nameless_authors() {
        let mut c = comment(1, 1, 0);
        c.author_name = String::from("  ");
        assert_eq!(author_stats(&[c])[0].display_name, "Anoniem");
    }

    #[test]
    fn leaderboard_keeps_the_best_ten() {
        let comments = (0..15u128)
            .map(|author| comment(author, author, author))
            .collect::<Vec<_>>();
        let board = leaderboard(&comments);
        assert_eq!(board.len(), LEADERBOARD_SIZE);
        assert_eq!(board[0].author_id, UserId(Uuid::from_u128(14)));
        assert_eq!(board[9].author_id, UserId(Uuid::from_u128(5)));

        let tied = vec![comment(1, 2, 0), comment(2, 1, 0)];
        let board = leaderboard(&tied);
        assert_eq!(board[0].author_id, UserId(Uuid::from_u128(2)));
        assert!(leaderboard(&[]).is_empty());
    }
}
