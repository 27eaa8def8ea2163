use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const REDDIT_BASE_URL: &str = "https://www.reddit.com";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    pub created_utc: DateTime<Utc>,
    pub link_karma: i64,
    pub comment_karma: i64,
    pub is_gold: bool,
    pub is_mod: bool,
    pub has_verified_email: bool,
}

impl UserProfile {
    pub fn total_karma(&self) -> i64 {
        self.link_karma + self.comment_karma
    }

    pub fn account_age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.created_utc)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityKind {
    Post,
    Comment,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Post => "post",
            ActivityKind::Comment => "comment",
        }
    }
}

impl std::fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityItem {
    pub id: String,
    pub kind: ActivityKind,
    /// Only posts carry a title.
    pub title: Option<String>,
    pub body: String,
    pub subreddit: String,
    pub created_utc: DateTime<Utc>,
    pub score: i64,
    pub permalink: String,
}

impl ActivityItem {
    /// Title and body joined, skipping whichever is empty.
    pub fn text(&self) -> String {
        match self.title.as_deref().filter(|t| !t.is_empty()) {
            Some(title) if !self.body.is_empty() => format!("{}\n{}", title, self.body),
            Some(title) => title.to_string(),
            None => self.body.clone(),
        }
    }

    /// Single-line excerpt of at most `max_chars` characters.
    pub fn snippet(&self, max_chars: usize) -> String {
        let flat = self.text().split_whitespace().collect::<Vec<_>>().join(" ");
        if flat.chars().count() <= max_chars {
            return flat;
        }
        let mut cut: String = flat.chars().take(max_chars.saturating_sub(3)).collect();
        cut.push_str("...");
        cut
    }

    pub fn url(&self) -> String {
        if self.permalink.starts_with("http") {
            self.permalink.clone()
        } else {
            format!("{}{}", REDDIT_BASE_URL, self.permalink)
        }
    }

    /// Tag used in prompts so the model can refer back to this item.
    pub fn tag(&self) -> String {
        format!("[{}:{}]", self.kind, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchLimits {
    pub max_posts: usize,
    pub max_comments: usize,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            max_posts: 50,
            max_comments: 100,
        }
    }
}

/// Posts followed by comments, never larger than the limits it was built with.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActivityBatch {
    posts: Vec<ActivityItem>,
    comments: Vec<ActivityItem>,
}

impl ActivityBatch {
    pub fn new(
        mut posts: Vec<ActivityItem>,
        mut comments: Vec<ActivityItem>,
        limits: FetchLimits,
    ) -> Self {
        posts.truncate(limits.max_posts);
        comments.truncate(limits.max_comments);
        Self { posts, comments }
    }

    pub fn posts(&self) -> &[ActivityItem] {
        &self.posts
    }

    pub fn comments(&self) -> &[ActivityItem] {
        &self.comments
    }

    pub fn post_count(&self) -> usize {
        self.posts.len()
    }

    pub fn comment_count(&self) -> usize {
        self.comments.len()
    }

    pub fn len(&self) -> usize {
        self.posts.len() + self.comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty() && self.comments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActivityItem> {
        self.posts.iter().chain(self.comments.iter())
    }

    pub fn get(&self, id: &str) -> Option<&ActivityItem> {
        self.iter().find(|item| item.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }
}
