//! Word-level text features shared by the statistics and citation code.

use std::collections::{BTreeSet, HashMap};

/// Words shorter than this carry too little signal to count as keywords.
pub const MIN_KEYWORD_CHARS: usize = 4;

pub const STOPWORDS: &[&str] = &[
    "about", "above", "after", "again", "against", "also", "been", "before", "being", "below",
    "between", "both", "cant", "could", "couldn", "didn", "does", "doesn", "doing", "dont",
    "down", "during", "each", "even", "every", "from", "further", "hadn", "hasn", "have",
    "haven", "having", "here", "hers", "herself", "himself", "into", "isn", "itself", "just",
    "like", "many", "mightn", "more", "most", "much", "mustn", "myself", "needn", "only",
    "other", "ours", "ourselves", "over", "really", "same", "shan", "should", "shouldn", "some",
    "such", "than", "that", "thats", "their", "theirs", "them", "themselves", "then", "there",
    "these", "they", "thing", "things", "think", "this", "those", "through", "under", "until",
    "very", "wasn", "were", "weren", "what", "when", "where", "which", "while", "whom", "will",
    "with", "won", "would", "wouldn", "your", "yours", "yourself", "yourselves", "because",
    "going", "want", "know", "make", "still", "well", "something", "anything", "though",
];

pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

/// Lower-cased words, split on anything that is not a letter or digit.
pub fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
}

/// Words long enough to be meaningful and not on the stopword list.
pub fn tokenize(text: &str) -> Vec<String> {
    words(text)
        .filter(|w| w.chars().count() >= MIN_KEYWORD_CHARS && !is_stopword(w))
        .collect()
}

pub fn keyword_set(text: &str) -> BTreeSet<String> {
    tokenize(text).into_iter().collect()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WordFrequencies {
    counts: HashMap<String, usize>,
    total: usize,
}

impl WordFrequencies {
    pub fn add_text(&mut self, text: &str) {
        for word in tokenize(text) {
            *self.counts.entry(word).or_insert(0) += 1;
            self.total += 1;
        }
    }

    pub fn total_words(&self) -> usize {
        self.total
    }

    pub fn unique_words(&self) -> usize {
        self.counts.len()
    }

    /// Most frequent words first; ties broken alphabetically so output is stable.
    pub fn top(&self, n: usize) -> Vec<(String, usize)> {
        let mut sorted: Vec<(String, usize)> =
            self.counts.iter().map(|(w, c)| (w.clone(), *c)).collect();
        sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        sorted.truncate(n);
        sorted
    }
}
