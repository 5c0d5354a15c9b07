use std::{cmp::Reverse, str::FromStr};

use crate::api::Comment;

/// How comments are ordered at every level of a thread
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
    #[default]
    Oldest,
    Newest,
    Popular,
}

impl SortOrder {
    /// Sort the flat list before it is handed to `build_tree`
    pub fn sort(&self, comments: &mut [Comment]) {
        match self {
            SortOrder::Oldest => comments.sort_by_key(|c| (c.created_at, c.id)),
            SortOrder::Newest => comments.sort_by_key(|c| (Reverse(c.created_at), c.id)),
            SortOrder::Popular => {
                comments.sort_by_key(|c| (Reverse(c.count_likes()), c.created_at, c.id))
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Oldest => "oldest",
            SortOrder::Newest => "newest",
            SortOrder::Popular => "popular",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("unknown sort order {0:?}, expected one of oldest, newest or popular")]
pub struct UnknownSortOrder(pub String);

impl FromStr for SortOrder {
    type Err = UnknownSortOrder;

    fn from_str(s: &str) -> Result<SortOrder, Self::Err> {
        match s {
            "oldest" => Ok(SortOrder::Oldest),
            "newest" => Ok(SortOrder::Newest),
            "popular" => Ok(SortOrder::Popular),
            _ => Err(UnknownSortOrder(s.to_string())),
        }
    }
}
