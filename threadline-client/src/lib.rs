pub mod export;
pub use export::{ExportFormat, UnknownExportFormat};

mod live;
pub use live::{load_thread, LiveThread};

pub mod markup;

mod order;
pub use order::{SortOrder, UnknownSortOrder};

mod reaction;
pub use reaction::ReactionCoordinator;

mod render;
pub use render::{
    avatar_size, relative_time, render_text, CommentAction, Presentation, RenderedComment,
    Renderer, DEFAULT_MAX_DISPLAY_DEPTH,
};

pub mod schema;

pub mod stats;
pub use stats::{author_stats, leaderboard, AuthorStats, Badge, Level};

mod session;
pub use session::Session;

mod thread;
pub use thread::{build_tree, MalformedReference, Thread, ThreadNode, Walk};

pub mod api {
    pub use threadline_api::*;
}
