use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

// A heading is a whole line: optional markdown markers, a label, an optional
// parenthetical note and an optional trailing colon.
static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?P<hashes>#{1,6}\s*)?(?P<bold>\*\*)?\s*(?P<label>[A-Za-z][A-Za-z &/'-]*?)\s*(?:\([^)]*\))?\s*:?\s*(?:\*\*)?\s*:?\s*$",
    )
    .expect("heading pattern is valid")
});

static RULE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[=\-_*]{3,}\s*$").expect("rule pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SectionKind {
    Demographics,
    Traits,
    Motivations,
    Personality,
    Behaviour,
    Frustrations,
    Goals,
    Interests,
    Communication,
    /// A heading that matched none of the known kinds.
    Unclassified(String),
}

impl SectionKind {
    pub fn classify(label: &str) -> Self {
        let lower = label.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

        if has(&["motivation"]) {
            SectionKind::Motivations
        } else if has(&["personality"]) {
            SectionKind::Personality
        } else if has(&["behavio", "habit"]) {
            SectionKind::Behaviour
        } else if has(&["frustration", "pain point"]) {
            SectionKind::Frustrations
        } else if has(&["goal", "need"]) {
            SectionKind::Goals
        } else if has(&["interest", "hobb"]) {
            SectionKind::Interests
        } else if has(&["communicat", "writing style", "tone"]) {
            SectionKind::Communication
        } else if has(&["trait", "characteristic"]) {
            SectionKind::Traits
        } else if has(&[
            "demographic",
            "username",
            "occupation",
            "location",
            "background",
            "profile",
            "user info",
        ]) || lower == "age"
            || lower == "status"
        {
            SectionKind::Demographics
        } else {
            SectionKind::Unclassified(label.trim().to_string())
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SectionKind::Demographics => "Demographics",
            SectionKind::Traits => "Traits",
            SectionKind::Motivations => "Motivations",
            SectionKind::Personality => "Personality",
            SectionKind::Behaviour => "Behaviour",
            SectionKind::Frustrations => "Frustrations",
            SectionKind::Goals => "Goals",
            SectionKind::Interests => "Interests",
            SectionKind::Communication => "Communication",
            SectionKind::Unclassified(label) => label,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaSection {
    pub kind: SectionKind,
    /// Heading as written by the model.
    pub label: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaResult {
    pub raw: String,
    pub sections: Vec<PersonaSection>,
}

impl PersonaResult {
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let sections = parse_sections(&raw);
        Self { raw, sections }
    }

    pub fn section(&self, kind: &SectionKind) -> Option<&PersonaSection> {
        self.sections.iter().find(|s| &s.kind == kind)
    }
}

fn heading_label(line: &str) -> Option<String> {
    let caps = HEADING_RE.captures(line)?;
    let label = caps.name("label")?.as_str().trim();
    let marked = caps.name("hashes").is_some() || caps.name("bold").is_some();
    let shouted = label.chars().any(|c| c.is_ascii_alphabetic())
        && !label.chars().any(|c| c.is_lowercase());

    // Plain lines only count as headings when written in capitals
    if marked || (shouted && label.len() > 2) {
        Some(label.to_string())
    } else {
        None
    }
}

fn parse_sections(raw: &str) -> Vec<PersonaSection> {
    let mut sections = Vec::new();
    let mut current_label: Option<String> = None;
    let mut body: Vec<&str> = Vec::new();

    let mut flush = |label: Option<String>, body: &mut Vec<&str>| {
        let text = body.join("\n").trim().to_string();
        body.clear();
        if text.is_empty() {
            return;
        }
        let (kind, label) = match label {
            Some(label) => (SectionKind::classify(&label), label),
            // Text before the first heading holds the name/age/occupation block
            None => (SectionKind::Demographics, "Profile".to_string()),
        };
        sections.push(PersonaSection { kind, label, body: text });
    };

    for line in raw.lines() {
        if RULE_RE.is_match(line) {
            continue;
        }
        match heading_label(line) {
            Some(label) => {
                flush(current_label.take(), &mut body);
                current_label = Some(label);
            }
            None => body.push(line),
        }
    }
    flush(current_label, &mut body);

    sections
}
