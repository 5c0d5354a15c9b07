use std::fmt;

use crate::Error;

/// URL-friendly identifier of the article a discussion hangs off
#[derive(
    Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
#[serde(transparent)]
pub struct ArticleSlug(pub String);

impl ArticleSlug {
    pub fn new(slug: impl Into<String>) -> Result<ArticleSlug, Error> {
        let res = ArticleSlug(slug.into());
        res.validate()?;
        Ok(res)
    }

    pub fn stub() -> ArticleSlug {
        ArticleSlug(String::from("stub"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Slugs are lowercase ascii alphanumerics separated by single dashes
    pub fn validate(&self) -> Result<(), Error> {
        let s = &self.0;
        let valid_chars = s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if s.is_empty()
            || s.len() > 200
            || !valid_chars
            || s.starts_with('-')
            || s.ends_with('-')
            || s.contains("--")
        {
            return Err(Error::InvalidSlug(s.clone()));
        }
        Ok(())
    }
}

impl fmt::Display for ArticleSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_usual_slugs() {
        for s in ["a", "politie-zoekt-getuigen", "2024-jaaroverzicht", "x1-y2"] {
            assert!(ArticleSlug::new(s).is_ok(), "rejected {s:?}");
        }
    }

    #[test]
    fn rejects_odd_slugs() {
        for s in ["", "-a", "a-", "a--b", "Caps", "with space", "slash/y", "é"] {
            assert_eq!(
                ArticleSlug::new(s),
                Err(Error::InvalidSlug(s.to_string())),
                "accepted {s:?}"
            );
        }
    }
}
