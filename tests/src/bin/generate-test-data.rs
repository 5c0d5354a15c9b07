use chrono::Duration;
use rand::{seq::SliceRandom, Rng};
use threadline_api::{ArticleSlug, Uuid};

const NUM_USERS: usize = 8;
const NUM_ARTICLES: usize = 4;

const NUM_COMMENTS: usize = 300;
const REPLY_PERCENT: u32 = 60;
const COMMENT_MAX_WORDS: usize = 60;

const NUM_LIKES: usize = 500;

// Imported discussions hold replies to missing comments and replies to themselves
const ORPHAN_PERCENT: u32 = 2;
const SELF_REFERENCE_PERCENT: u32 = 1;

fn gen_n_items(table: &str, n: usize, mut f: impl FnMut(usize) -> String) {
    println!("INSERT INTO {} VALUES", table);
    for i in 0..n {
        if i != 0 {
            println!(",");
        }
        print!("    {}", f(i));
    }
    println!();
    println!("ON CONFLICT DO NOTHING;");
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

struct GenComment {
    id: Uuid,
    article: usize,
}

fn main() {
    let mut rng = rand::thread_rng();

    let articles = (0..NUM_ARTICLES)
        .map(|_| {
            let title = lipsum::lipsum_words(3).to_lowercase();
            let slug = title
                .split(|c: char| !c.is_ascii_alphanumeric())
                .filter(|w| !w.is_empty())
                .collect::<Vec<_>>()
                .join("-");
            ArticleSlug::new(slug).unwrap_or_else(|_| ArticleSlug::stub())
        })
        .collect::<Vec<_>>();

    // Generate users
    let mut users = Vec::new();
    gen_n_items("users", NUM_USERS, |i| {
        let id = Uuid::new_v4();
        let name = format!("lezer{i}");
        users.push((id, name.clone()));
        let photo = match i % 3 {
            0 => String::from("NULL"),
            _ => quote(&format!("https://avatars.example/{id}.png")),
        };
        format!("({}, {}, {})", quote(&id.to_string()), quote(&name), photo)
    });

    // Generate comments, parents always before their replies
    let start = threadline_api::now() - Duration::days(30);
    let mut comments: Vec<GenComment> = Vec::new();
    gen_n_items("comments", NUM_COMMENTS, |i| {
        let id = Uuid::new_v4();
        let (author, name) = users.choose(&mut rng).cloned().unwrap();
        let created_at = start + Duration::minutes((i * 90) as i64 + rng.gen_range(0..60));
        let article = i % NUM_ARTICLES;
        let same_article_parent = comments
            .iter()
            .filter(|c| c.article == article)
            .collect::<Vec<_>>()
            .choose(&mut rng)
            .map(|c| c.id);
        let roll = rng.gen_range(0..100);
        let parent = if roll < ORPHAN_PERCENT {
            Some(Uuid::new_v4())
        } else if roll < ORPHAN_PERCENT + SELF_REFERENCE_PERCENT {
            Some(id)
        } else if roll < REPLY_PERCENT {
            same_article_parent
        } else {
            None
        };
        comments.push(GenComment { id, article });
        let words = rng.gen_range(1..=COMMENT_MAX_WORDS);
        format!(
            "({}, {}, {}, {}, NULL, {}, {}, {})",
            quote(&id.to_string()),
            quote(articles[article].as_str()),
            quote(&author.to_string()),
            quote(&name),
            quote(&lipsum::lipsum_words(words)),
            quote(&created_at.to_rfc3339()),
            match parent {
                Some(p) => quote(&p.to_string()),
                None => String::from("NULL"),
            },
        )
    });

    // Generate likes, duplicates are dropped by the primary key
    gen_n_items("comment_likes", NUM_LIKES, |_| {
        let comment = comments.choose(&mut rng).unwrap().id;
        let (user, _) = users.choose(&mut rng).unwrap();
        format!(
            "({}, {})",
            quote(&comment.to_string()),
            quote(&user.to_string())
        )
    });
}
