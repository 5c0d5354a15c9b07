//! Thread export, for moderators keeping archives of a discussion

use std::str::FromStr;

use chrono::SecondsFormat;

use crate::api::{ArticleSlug, Comment, Time};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExportFormat {
    Json,
    Csv,
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("unknown export format {0:?}, expected json or csv")]
pub struct UnknownExportFormat(pub String);

impl FromStr for ExportFormat {
    type Err = UnknownExportFormat;

    fn from_str(s: &str) -> Result<ExportFormat, Self::Err> {
        match s {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            _ => Err(UnknownExportFormat(s.to_string())),
        }
    }
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    pub fn export(&self, comments: &[Comment]) -> Result<String, serde_json::Error> {
        match self {
            ExportFormat::Json => to_json(comments),
            ExportFormat::Csv => Ok(to_csv(comments)),
        }
    }
}

/// The flat records, in their wire format
pub fn to_json(comments: &[Comment]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(comments)
}

const CSV_HEADER: [&str; 6] = ["ID", "Author", "Content", "Likes", "Created At", "Parent ID"];

fn csv_cell(cell: &str) -> String {
    format!("\"{}\"", cell.replace('"', "\"\""))
}

/// One line per comment with every cell quoted; content keeps its line breaks
pub fn to_csv(comments: &[Comment]) -> String {
    let mut lines = Vec::with_capacity(comments.len() + 1);
    lines.push(CSV_HEADER.join(","));
    for c in comments {
        let cells = [
            c.id.0.to_string(),
            c.author_name.clone(),
            c.content.clone(),
            c.count_likes().to_string(),
            c.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            c.parent_comment_id
                .map(|p| p.0.to_string())
                .unwrap_or_default(),
        ];
        lines.push(cells.iter().map(|c| csv_cell(c)).collect::<Vec<_>>().join(","));
    }
    lines.join("\n")
}

/// Name of the exported file, `comments-<slug>-<epoch ms>.<ext>`
pub fn file_name(article: &ArticleSlug, at: Time, format: ExportFormat) -> String {
    format!(
        "comments-{article}-{}.{}",
        at.timestamp_millis(),
        format.extension()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{CommentId, UserId, Uuid};
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn comment(n: u128, content: &str, parent: Option<u128>) -> Comment {
        Comment {
            id: CommentId(Uuid::from_u128(n)),
            article_slug: ArticleSlug::stub(),
            author_id: UserId(Uuid::from_u128(100 + n)),
            author_name: String::from("Anna \"de Vries\""),
            author_photo_url: None,
            content: content.to_string(),
            created_at: chrono::Utc.timestamp_millis_opt(1_700_000_000_123).unwrap(),
            likes: 1,
            liked_by: BTreeMap::from([(UserId(Uuid::from_u128(7)), true)]),
            parent_comment_id: parent.map(|p| CommentId(Uuid::from_u128(p))),
        }
    }

    #[test]
    fn csv_quotes_every_cell() {
        let csv = to_csv(&[
            comment(1, "Eens, \"helemaal\"", None),
            comment(2, "twee\nregels", Some(1)),
        ]);
        let mut lines = csv.split('\n');
        assert_eq!(
            lines.next(),
            Some("ID,Author,Content,Likes,Created At,Parent ID")
        );
        assert_eq!(
            lines.next(),
            Some(
                "\"00000000-0000-0000-0000-000000000001\",\"Anna \"\"de Vries\"\"\",\
                 \"Eens, \"\"helemaal\"\"\",\"1\",\"2023-11-14T22:13:20.123Z\",\"\""
            )
        );
        assert_eq!(lines.next(), Some("\"00000000-0000-0000-0000-000000000002\",\"Anna \"\"de Vries\"\"\",\"twee"));
        assert_eq!(
            lines.next(),
            Some("regels\",\"1\",\"2023-11-14T22:13:20.123Z\",\"00000000-0000-0000-0000-000000000001\"")
        );
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn empty_threads_export_the_header_only() {
        assert_eq!(to_csv(&[]), "ID,Author,Content,Likes,Created At,Parent ID");
        assert_eq!(to_json(&[]).unwrap(), "[]");
    }

    #[test]
    fn json_keeps_the_wire_format() {
        let exported = ExportFormat::Json
            .export(&[comment(1, "hoi", None)])
            .unwrap();
        let back: Vec<Comment> = serde_json::from_str(&exported).unwrap();
        assert_eq!(back, vec![comment(1, "hoi", None)]);
        assert!(exported.contains("\"createdAt\": 1700000000123"));
    }

    #[test]
    fn formats_and_file_names() {
        assert_eq!("csv".parse(), Ok(ExportFormat::Csv));
        assert_eq!(
            "xml".parse::<ExportFormat>(),
            Err(UnknownExportFormat(String::from("xml")))
        );
        let at = chrono::Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(
            file_name(&ArticleSlug::stub(), at, ExportFormat::Json),
            format!("comments-{}-1700000000123.json", ArticleSlug::stub())
        );
    }
}
