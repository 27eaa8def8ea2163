use crate::keywords::{keyword_set, words};
use persona_core::{ActivityBatch, ActivityItem, ActivityKind, PersonaResult, SectionKind};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;
use tracing::debug;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(post|comment):([A-Za-z0-9_]+)\]").expect("tag pattern is valid")
});

// reddit.com/r/<sub>/comments/<post id>/<slug>/<comment id>
static PERMALINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/comments/([a-z0-9]+)(?:/[^/\s)\]]*/([a-z0-9]+))?").expect("permalink pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CitedItem {
    pub id: String,
    pub kind: ActivityKind,
    pub subreddit: String,
    pub snippet: String,
    pub url: String,
    /// Overlap score; 1.0 for items the persona text cites by id.
    pub score: f64,
    pub explicit: bool,
}

impl CitedItem {
    fn new(item: &ActivityItem, score: f64, explicit: bool, snippet_chars: usize) -> Self {
        Self {
            id: item.id.clone(),
            kind: item.kind,
            subreddit: item.subreddit.clone(),
            snippet: item.snippet(snippet_chars),
            url: item.url(),
            score,
            explicit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    pub section: SectionKind,
    pub label: String,
    pub items: Vec<CitedItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Highlight {
    pub id: String,
    pub kind: ActivityKind,
    pub snippet: String,
    pub url: String,
    pub score: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CitationMap {
    pub citations: Vec<Citation>,
    pub highlighted_posts: Vec<Highlight>,
    pub highlighted_comments: Vec<Highlight>,
}

impl CitationMap {
    /// Every activity id referenced anywhere in the map.
    pub fn cited_ids(&self) -> impl Iterator<Item = &str> {
        self.citations
            .iter()
            .flat_map(|c| c.items.iter().map(|i| i.id.as_str()))
            .chain(self.highlighted_posts.iter().map(|h| h.id.as_str()))
            .chain(self.highlighted_comments.iter().map(|h| h.id.as_str()))
    }
}

/// Links persona sections back to the posts and comments that support them,
/// using keyword overlap plus any ids the model quoted.
#[derive(Debug, Clone)]
pub struct CitationMapper {
    pub max_items_per_section: usize,
    pub snippet_chars: usize,
    pub subreddit_bonus: f64,
    pub post_highlight_threshold: i64,
    pub comment_highlight_threshold: i64,
    pub max_highlights: usize,
}

impl Default for CitationMapper {
    fn default() -> Self {
        Self {
            max_items_per_section: 3,
            snippet_chars: 200,
            subreddit_bonus: 0.25,
            post_highlight_threshold: 10,
            comment_highlight_threshold: 5,
            max_highlights: 5,
        }
    }
}

impl CitationMapper {
    pub fn map(&self, persona: &PersonaResult, batch: &ActivityBatch) -> CitationMap {
        let indexed: Vec<(&ActivityItem, BTreeSet<String>)> = batch
            .iter()
            .map(|item| (item, keyword_set(&item.text())))
            .collect();

        let citations = persona
            .sections
            .iter()
            .map(|section| Citation {
                section: section.kind.clone(),
                label: section.label.clone(),
                items: self.cite_section(&section.body, batch, &indexed),
            })
            .collect::<Vec<_>>();

        let cited = citations.iter().filter(|c| !c.items.is_empty()).count();
        debug!("{} of {} persona sections have citations", cited, citations.len());

        CitationMap {
            citations,
            highlighted_posts: self.highlights(batch.posts(), self.post_highlight_threshold),
            highlighted_comments: self
                .highlights(batch.comments(), self.comment_highlight_threshold),
        }
    }

    fn cite_section(
        &self,
        text: &str,
        batch: &ActivityBatch,
        indexed: &[(&ActivityItem, BTreeSet<String>)],
    ) -> Vec<CitedItem> {
        let explicit = explicit_ids(text, batch);
        let section_keywords = keyword_set(text);
        let section_words: HashSet<String> = words(text).collect();

        // (explicit, score, batch position)
        let mut scored: Vec<(bool, f64, usize)> = Vec::new();
        for (position, (item, item_keywords)) in indexed.iter().enumerate() {
            if explicit.contains(item.id.as_str()) {
                scored.push((true, 1.0, position));
                continue;
            }
            if section_keywords.is_empty() {
                continue;
            }
            let shared = section_keywords.intersection(item_keywords).count();
            if shared == 0 {
                continue;
            }
            let mut score = shared as f64 / section_keywords.len() as f64;
            if mentions_subreddit(&section_words, text, &item.subreddit) {
                score += self.subreddit_bonus;
            }
            scored.push((false, score, position));
        }

        scored.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| b.1.total_cmp(&a.1))
                .then_with(|| a.2.cmp(&b.2))
        });
        scored.truncate(self.max_items_per_section);

        scored
            .into_iter()
            .map(|(is_explicit, score, position)| {
                CitedItem::new(indexed[position].0, score, is_explicit, self.snippet_chars)
            })
            .collect()
    }

    fn highlights(&self, items: &[ActivityItem], threshold: i64) -> Vec<Highlight> {
        items
            .iter()
            .filter(|item| item.score > threshold)
            .take(self.max_highlights)
            .map(|item| Highlight {
                id: item.id.clone(),
                kind: item.kind,
                snippet: item.snippet(self.snippet_chars),
                url: item.url(),
                score: item.score,
            })
            .collect()
    }
}

/// Ids the text names directly, either as `[post:id]` tags or as Reddit
/// permalinks. Ids missing from the batch are ignored.
fn explicit_ids<'a>(text: &str, batch: &'a ActivityBatch) -> HashSet<&'a str> {
    let mut ids = HashSet::new();

    for caps in TAG_RE.captures_iter(text) {
        let kind = match &caps[1] {
            "post" => ActivityKind::Post,
            _ => ActivityKind::Comment,
        };
        if let Some(item) = batch.get(&caps[2]).filter(|i| i.kind == kind) {
            ids.insert(item.id.as_str());
        }
    }

    for caps in PERMALINK_RE.captures_iter(text) {
        let target = caps.get(2).or_else(|| caps.get(1));
        if let Some(item) = target.and_then(|m| batch.get(m.as_str())) {
            ids.insert(item.id.as_str());
        }
    }

    ids
}

fn mentions_subreddit(section_words: &HashSet<String>, text: &str, subreddit: &str) -> bool {
    if subreddit.is_empty() {
        return false;
    }
    let lower = subreddit.to_lowercase();
    section_words.contains(&lower) || text.to_lowercase().contains(&format!("r/{}", lower))
}
