use persona_analysis::ActivityStats;
use persona_core::{ActivityBatch, ActivityItem, UserProfile};
use tracing::{debug, warn};

pub const DEFAULT_SNIPPET_CHARS: usize = 200;

const PERSONA_FORMAT: &str = r#"Based on the Reddit user data below, write a detailed user persona in this format:

USERNAME: <Reddit username>
AGE: <inferred or blank>
OCCUPATION: <inferred or blank>
STATUS: <inferred or blank>
LOCATION: <inferred or blank>
TIER: <inferred or blank>
ARCHETYPE: <inferred or blank>

[Trait] [Trait] [Trait] [Trait]   (traits inferred from posts and comments)

"<A short first-person quote summarizing the user's main motivation or pain point>"

MOTIVATIONS (rate each 1-5)
Convenience: <1-5> <citation>
Wellness: <1-5> <citation>
Speed: <1-5> <citation>
Preferences: <1-5> <citation>
Comfort: <1-5> <citation>
Dietary Needs: <1-5> <citation>

PERSONALITY (rate each 1-5)
Introvert(1) - Extrovert(5): <1-5> <citation>
Intuition(1) - Sensing(5): <1-5> <citation>
Feeling(1) - Thinking(5): <1-5> <citation>
Perceiving(1) - Judging(5): <1-5> <citation>

BEHAVIOUR & HABITS
- <observation> <citation>

FRUSTRATIONS
- <observation> <citation>

GOALS & NEEDS
- <observation> <citation>

Leave a field blank when the data does not support it. A citation is the id tag
of the post or comment it comes from, exactly as shown below, e.g. [post:abc123]
or [comment:xyz789].
"#;

const CLOSING: &str = "\nFormat the response exactly as above, with the section headers in capitals, 1-5 scales, and an id tag citation for every characteristic.\n";

/// A prompt ready to send, with a record of what made it in.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub text: String,
    /// Ids of the activity items embedded in `text`, in batch order.
    pub included_ids: Vec<String>,
    /// Items left out to stay within the budget.
    pub dropped: usize,
}

impl Prompt {
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// Serializes a user's activity into a prompt no longer than `budget_chars`.
/// When everything does not fit, the lowest-scoring items are dropped first.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_chars: usize,
    snippet_chars: usize,
}

impl PromptBuilder {
    pub fn new(budget_chars: usize) -> Self {
        Self {
            budget_chars,
            snippet_chars: DEFAULT_SNIPPET_CHARS,
        }
    }

    pub fn with_snippet_chars(mut self, snippet_chars: usize) -> Self {
        self.snippet_chars = snippet_chars;
        self
    }

    pub fn budget_chars(&self) -> usize {
        self.budget_chars
    }

    pub fn build(
        &self,
        profile: &UserProfile,
        batch: &ActivityBatch,
        stats: &ActivityStats,
    ) -> Prompt {
        let (head, middle) = self.fixed_parts(profile, stats);
        let fixed_chars = head.chars().count() + middle.chars().count() + CLOSING.chars().count();

        let items: Vec<&ActivityItem> = batch.iter().collect();
        let lines: Vec<String> = items.iter().map(|item| self.item_line(item)).collect();
        let line_chars: Vec<usize> = lines.iter().map(|l| l.chars().count()).collect();

        if fixed_chars > self.budget_chars {
            warn!(
                "Prompt template alone needs {} chars, over the {} budget; truncating",
                fixed_chars, self.budget_chars
            );
            let text = format!("{}{}{}", head, middle, CLOSING)
                .chars()
                .take(self.budget_chars)
                .collect();
            return Prompt {
                text,
                included_ids: Vec::new(),
                dropped: items.len(),
            };
        }

        let keep = self.select_items(&items, &line_chars, self.budget_chars - fixed_chars);

        let mut text = head;
        for (i, item) in items.iter().enumerate() {
            if keep[i] && item.kind == persona_core::ActivityKind::Post {
                text.push_str(&lines[i]);
            }
        }
        text.push_str(&middle);
        for (i, item) in items.iter().enumerate() {
            if keep[i] && item.kind == persona_core::ActivityKind::Comment {
                text.push_str(&lines[i]);
            }
        }
        text.push_str(CLOSING);

        let included_ids: Vec<String> = items
            .iter()
            .zip(&keep)
            .filter(|(_, kept)| **kept)
            .map(|(item, _)| item.id.clone())
            .collect();
        let dropped = items.len() - included_ids.len();

        debug!(
            "Built prompt: {} chars, {} items included, {} dropped",
            text.chars().count(),
            included_ids.len(),
            dropped
        );

        Prompt {
            text,
            included_ids,
            dropped,
        }
    }

    /// Marks which items fit in `room` characters, dropping the lowest
    /// scores first. Among equal scores the later item goes first.
    fn select_items(&self, items: &[&ActivityItem], line_chars: &[usize], room: usize) -> Vec<bool> {
        let mut keep = vec![true; items.len()];
        let mut used: usize = line_chars.iter().sum();
        if used <= room {
            return keep;
        }

        let mut drop_order: Vec<usize> = (0..items.len()).collect();
        drop_order.sort_by(|&a, &b| items[a].score.cmp(&items[b].score).then_with(|| b.cmp(&a)));

        for index in drop_order {
            if used <= room {
                break;
            }
            keep[index] = false;
            used -= line_chars[index];
        }
        keep
    }

    /// Everything but the item lines: the text before the post lines and the
    /// text between posts and comments.
    fn fixed_parts(&self, profile: &UserProfile, stats: &ActivityStats) -> (String, String) {
        let subreddits = stats
            .top_subreddits(5)
            .iter()
            .map(|(name, _)| format!("r/{}", name))
            .collect::<Vec<_>>()
            .join(", ");
        let keywords = stats
            .top_keywords(10)
            .iter()
            .map(|(word, _)| word.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        let head = format!(
            "{format}\nUser Info:\n- Username: {username}\n- Account Created: {created}\n- Karma: {comment_karma} comment, {link_karma} post\n\nActivity Analysis:\n- Posts: {posts}\n- Comments: {comments}\n- Top Subreddits: {subreddits}\n- Top Interests: {keywords}\n\nSample Posts:\n",
            format = PERSONA_FORMAT,
            username = profile.username,
            created = profile.created_utc.format("%Y-%m-%d"),
            comment_karma = profile.comment_karma,
            link_karma = profile.link_karma,
            posts = stats.post_count,
            comments = stats.comment_count,
            subreddits = subreddits,
            keywords = keywords,
        );
        let middle = "\nSample Comments:\n".to_string();
        (head, middle)
    }

    fn item_line(&self, item: &ActivityItem) -> String {
        format!(
            "- {} r/{} (score {}): {}\n",
            item.tag(),
            item.subreddit,
            item.score,
            item.snippet(self.snippet_chars)
        )
    }
}
