use crate::api::{
    ArticleSlug, Author, AuthToken, CommentId, CommentTarget, NewComment, User, UserId,
};

/// A signed-in reader.
///
/// Everything that needs to know who is acting gets one of these passed
/// explicitly; `None` stands for an anonymous visitor.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Session {
    user: User,
    token: AuthToken,
}

impl Session {
    pub fn new(user: User, token: AuthToken) -> Session {
        Session { user, token }
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn user_id(&self) -> UserId {
        self.user.id
    }

    pub fn token(&self) -> AuthToken {
        self.token
    }

    pub fn author(&self) -> Author {
        Author::from(self.user.clone())
    }

    /// Prepare a submission written by this user
    pub fn new_comment(
        &self,
        article: ArticleSlug,
        content: &str,
        target: CommentTarget,
    ) -> NewComment {
        NewComment::new(article, self.author(), content, target)
    }

    pub fn reply(&self, article: ArticleSlug, parent: CommentId, content: &str) -> NewComment {
        self.new_comment(article, content, CommentTarget::ReplyTo(parent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submissions_carry_the_session_identity() {
        let session = Session::new(
            User {
                id: UserId::stub(),
                name: String::from("Fatima"),
                photo_url: Some(String::from("https://example.com/f.png")),
            },
            AuthToken::stub(),
        );
        let c = session.reply(ArticleSlug::stub(), CommentId::stub(), " eens ");
        assert_eq!(c.author.id, UserId::stub());
        assert_eq!(c.author.name, "Fatima");
        assert_eq!(c.author.photo_url.as_deref(), Some("https://example.com/f.png"));
        assert_eq!(c.content, "eens");
        assert_eq!(c.target, CommentTarget::ReplyTo(CommentId::stub()));
        assert_eq!(c.validate(), Ok(()));
    }
}
