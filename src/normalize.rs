use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use rayon::prelude::*;
use regex::Regex;
use serde::Serialize;

use crate::records::RawRecord;

const EXCERPT_LEN: usize = 200;
const THEME_NAME_MAX: usize = 100;
const THEME_NAME_FALLBACK_LEN: usize = 50;

static MARKUP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static CONNECTIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:through|by|via|with|for)\b").unwrap());

// ── Canonical entities ──

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: String,
    pub title: String,
    pub text: String,
    pub transcript: String,
    pub excerpt: String,
    pub video: Option<String>,
    pub has_video: bool,
    pub featured: bool,
    pub storyteller_ids: Vec<String>,
    pub media_ids: Vec<String>,
    pub theme_ids: BTreeSet<String>,
    pub location: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Storyteller {
    pub id: String,
    pub name: String,
    pub role: Role,
    pub location: String,
    pub theme_ids: BTreeSet<String>,
    pub quotes: Vec<String>,
    pub story_ids: Vec<String>,
    pub profile_image: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Theme {
    pub id: String,
    pub name: String,
    pub category: String,
    pub description: String,
    pub parent_id: Option<String>,
    pub story_count: usize,
    pub media_count: usize,
    pub storyteller_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    pub id: String,
    pub file_name: String,
    pub media_type: String,
    pub summary: String,
    pub quotes: Vec<String>,
    pub theme_ids: BTreeSet<String>,
    pub location: String,
    pub storyteller_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Role {
    #[serde(rename = "volunteer")]
    Volunteer,
    #[serde(rename = "friend")]
    Friend,
    #[serde(rename = "service-provider")]
    ServiceProvider,
    #[serde(rename = "other")]
    Other,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Volunteer => "volunteer",
            Role::Friend => "friend",
            Role::ServiceProvider => "service-provider",
            Role::Other => "other",
        }
    }
}

// ── Fallback chains ──

/// Ordered field-fallback chain: try each source field in turn, cleaning the
/// text; the first non-empty result wins, else the sentinel default. The
/// chain order is data, not control flow, so it can be asserted in tests.
pub struct FieldChain {
    pub try_fields: &'static [&'static str],
    pub default: &'static str,
}

impl FieldChain {
    pub fn resolve(&self, rec: &RawRecord) -> String {
        for field in self.try_fields {
            if let Some(raw) = rec.str_field(field) {
                let cleaned = clean_text(raw);
                if !cleaned.is_empty() {
                    return cleaned;
                }
            }
        }
        self.default.to_string()
    }
}

pub const STORY_TITLE: FieldChain = FieldChain {
    try_fields: &["Title"],
    default: "Untitled",
};
pub const STORY_TEXT: FieldChain = FieldChain {
    try_fields: &["Text", "Story Text"],
    default: "",
};
pub const STORYTELLER_NAME: FieldChain = FieldChain {
    try_fields: &["Name"],
    default: "Anonymous",
};
pub const MEDIA_FILE_NAME: FieldChain = FieldChain {
    try_fields: &["File Name", "Name"],
    default: "Unknown",
};
pub const MEDIA_SUMMARY: FieldChain = FieldChain {
    try_fields: &["Summary", "Transcript"],
    default: "",
};
pub const QUOTE_TEXT: FieldChain = FieldChain {
    try_fields: &["Text", "Quote Text"],
    default: "",
};

// ── Text policies ──

/// Strip markup, collapse whitespace, trim.
pub fn clean_text(raw: &str) -> String {
    let no_markup = MARKUP_RE.replace_all(raw, " ");
    WHITESPACE_RE.replace_all(&no_markup, " ").trim().to_string()
}

/// Character-count excerpt: at most 200 chars, with a `...` marker appended
/// only when the source text was actually cut.
pub fn excerpt(text: &str) -> String {
    if text.chars().count() <= EXCERPT_LEN {
        text.to_string()
    } else {
        let head: String = text.chars().take(EXCERPT_LEN).collect();
        format!("{}...", head)
    }
}

/// Location fallback: Location → City → Location Rollup → first token of the
/// Shift label → "Unknown".
pub fn extract_location(rec: &RawRecord) -> String {
    if let Some(loc) = rec.str_field("Location") {
        return clean_text(loc);
    }
    if let Some(city) = rec.str_field("City") {
        return clean_text(city);
    }
    if let Some(rollup) = rec
        .str_field("Location Rollup")
        .or_else(|| rec.first_of_list("Location Rollup"))
    {
        return clean_text(rollup);
    }
    if let Some(shift) = rec.str_field("Shift") {
        if let Some(token) = shift.split_whitespace().next() {
            return token.to_string();
        }
    }
    "Unknown".to_string()
}

/// Derive a theme display name from its description when no explicit name
/// exists. Three tiers, evaluated in order:
/// 1. text up to the first sentence terminator, if non-empty and < 100 chars;
/// 2. text preceding the first connective word (through/by/via/with/for);
/// 3. the first 50 chars plus an ellipsis.
pub fn derive_theme_name(description: &str) -> String {
    let text = clean_text(description);

    let first_sentence = match text.find(['.', '!', '?']) {
        Some(pos) => text[..pos].trim(),
        None => text.as_str(),
    };
    if !first_sentence.is_empty() && first_sentence.chars().count() < THEME_NAME_MAX {
        return first_sentence.to_string();
    }

    if let Some(m) = CONNECTIVE_RE.find(&text) {
        let before = text[..m.start()].trim();
        if !before.is_empty() {
            return before.to_string();
        }
    }

    let head: String = text.chars().take(THEME_NAME_FALLBACK_LEN).collect();
    format!("{}...", head.trim_end())
}

/// Ordered category table: the first category with any keyword present in
/// the description wins; ties break by table order, never alphabetically.
pub const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("Connection", &["connection", "friendship", "relationship", "belonging"]),
    ("Growth", &["growth", "learning", "journey", "change"]),
    ("Community", &["community", "neighbourhood", "neighborhood", "local"]),
    ("Resilience", &["resilience", "overcoming", "strength", "recovery"]),
    ("Service", &["service", "volunteering", "giving", "support"]),
];

pub fn assign_category(description: &str) -> String {
    let lower = description.to_lowercase();
    for (category, keywords) in CATEGORY_KEYWORDS {
        if keywords.iter().any(|k| lower.contains(k)) {
            return category.to_string();
        }
    }
    "Other".to_string()
}

/// Substring classification with fixed priority: volunteer, then friend,
/// then service provider; anything else is Other.
pub fn classify_role(raw: Option<&str>) -> Role {
    let lower = raw.unwrap_or_default().to_lowercase();
    if lower.contains("volunteer") {
        Role::Volunteer
    } else if lower.contains("friend") {
        Role::Friend
    } else if lower.contains("service provider") {
        Role::ServiceProvider
    } else {
        Role::Other
    }
}

// ── Per-kind normalizers ──

pub fn normalize_stories(records: &[RawRecord]) -> Vec<Story> {
    records.par_iter().map(normalize_story).collect()
}

fn normalize_story(rec: &RawRecord) -> Story {
    let text = STORY_TEXT.resolve(rec);
    let transcript = rec.str_field("Transcript").map(clean_text).unwrap_or_default();
    let excerpt_source = if text.is_empty() { &transcript } else { &text };
    let video = rec
        .str_field("Video")
        .or_else(|| rec.str_field("Video File"))
        .map(|s| s.to_string());

    Story {
        id: rec.id.clone(),
        title: STORY_TITLE.resolve(rec),
        excerpt: excerpt(excerpt_source),
        text,
        transcript,
        has_video: video.is_some(),
        video,
        featured: rec.bool_field("Featured"),
        storyteller_ids: rec.id_list("Storytellers"),
        media_ids: rec.id_list("Media"),
        // Derived by the resolver; explicit Story-level tags are legacy and
        // intentionally not read.
        theme_ids: BTreeSet::new(),
        location: extract_location(rec),
        created_at: rec.created_time.clone(),
    }
}

pub fn normalize_storytellers(records: &[RawRecord]) -> Vec<Storyteller> {
    records.par_iter().map(normalize_storyteller).collect()
}

fn normalize_storyteller(rec: &RawRecord) -> Storyteller {
    Storyteller {
        id: rec.id.clone(),
        name: STORYTELLER_NAME.resolve(rec),
        role: classify_role(rec.str_field("Role")),
        location: extract_location(rec),
        theme_ids: BTreeSet::new(),
        quotes: Vec::new(),
        story_ids: Vec::new(),
        profile_image: rec
            .str_field("Profile Image")
            .or_else(|| rec.str_field("File Profile Image"))
            .map(|s| s.to_string()),
    }
}

pub fn normalize_themes(records: &[RawRecord]) -> Vec<Theme> {
    records.par_iter().map(normalize_theme).collect()
}

fn normalize_theme(rec: &RawRecord) -> Theme {
    let description = rec.str_field("Description").map(clean_text).unwrap_or_default();
    let name = rec
        .str_field("Name")
        .or_else(|| rec.str_field("Theme Name"))
        .map(clean_text)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| derive_theme_name(&description));
    let parent_id = rec
        .str_field("Parent Theme")
        .map(|s| s.to_string())
        .or_else(|| rec.id_list("Parent Theme").into_iter().next());

    Theme {
        id: rec.id.clone(),
        category: assign_category(&description),
        name,
        description,
        parent_id,
        story_count: 0,
        media_count: 0,
        storyteller_count: 0,
    }
}

/// Media normalization resolves quote ids against the Quotes collection when
/// one exists; with no Quotes collection the listed values are taken as
/// literal quote texts.
pub fn normalize_media(records: &[RawRecord], quotes: &HashMap<&str, &RawRecord>) -> Vec<Media> {
    records.iter().map(|rec| normalize_media_record(rec, quotes)).collect()
}

fn normalize_media_record(rec: &RawRecord, quotes: &HashMap<&str, &RawRecord>) -> Media {
    let quote_texts = rec
        .id_list("Quotes")
        .iter()
        .filter_map(|entry| {
            if quotes.is_empty() {
                Some(clean_text(entry))
            } else {
                quotes.get(entry.as_str()).map(|q| QUOTE_TEXT.resolve(q))
            }
        })
        .filter(|q| !q.is_empty())
        .collect();

    Media {
        id: rec.id.clone(),
        file_name: MEDIA_FILE_NAME.resolve(rec),
        media_type: rec
            .str_field("Type")
            .map(|s| s.to_lowercase())
            .unwrap_or_else(|| "unknown".to_string()),
        summary: MEDIA_SUMMARY.resolve(rec),
        quotes: quote_texts,
        theme_ids: rec.id_list("Themes").into_iter().collect(),
        location: extract_location(rec),
        storyteller_ids: rec.id_list("Storytellers"),
    }
}

// ── Tests ──
