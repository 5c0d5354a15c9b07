use chrono::Utc;

pub use uuid::{uuid, Uuid};
pub type Time = chrono::DateTime<Utc>;

mod article;
pub use article::ArticleSlug;

mod auth;
pub use auth::{AuthToken, NewUser};

mod comment;
pub use comment::{Author, Comment, CommentId, CommentTarget, LikeOutcome, NewComment};

mod error;
pub use error::Error;

mod feed;
pub use feed::FeedMessage;

mod notification;
pub use notification::{Notification, NotificationId, NotificationKind};

mod store;
pub use store::{CommentStore, Subscription};

mod user;
pub use user::{User, UserId};

pub const STUB_UUID: Uuid = uuid!("ffffffff-ffff-ffff-ffff-ffffffffffff");

/// Longest accepted comment body, in characters
pub const MAX_CONTENT_LEN: usize = 10_000;

/// Longest accepted user name, in characters
pub const MAX_NAME_LEN: usize = 100;

// Strings end up in postgres TEXT columns, which refuse null bytes: reject them
// here so that all stores agree on what is storable
pub fn validate_string(s: &str) -> Result<(), Error> {
    if s.contains('\0') {
        return Err(Error::NullByteInString(s.to_string()));
    }
    Ok(())
}

// Postgres timestamps cannot represent the whole of chrono's range
pub fn validate_time(t: &Time) -> Result<(), Error> {
    let min = chrono::NaiveDate::from_ymd_opt(-4713, 12, 1).map(|d| d.and_hms_opt(0, 0, 0));
    let max = chrono::NaiveDate::from_ymd_opt(262142, 12, 31).map(|d| d.and_hms_opt(0, 0, 0));
    match (min.flatten(), max.flatten()) {
        (Some(min), Some(max)) if t.naive_utc() >= min && t.naive_utc() < max => Ok(()),
        _ => Err(Error::InvalidTime(*t)),
    }
}

/// Current time, truncated to the millisecond precision comments travel with
pub fn now() -> Time {
    use chrono::TimeZone;
    let now = Utc::now();
    Utc.timestamp_millis_opt(now.timestamp_millis())
        .single()
        .unwrap_or(now)
}
