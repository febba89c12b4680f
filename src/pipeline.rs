use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::info;

use crate::analytics::{self, Analytics};
use crate::index::{self, Indexes};
use crate::normalize::{self, Media, Story, Storyteller, Theme};
use crate::records::Collections;
use crate::resolve::{self, PrimaryMode};
use crate::search::{self, SearchRow};
use crate::views;

/// Everything one run materializes, before persistence.
pub struct Materialized {
    pub stories: Vec<Story>,
    pub storytellers: Vec<Storyteller>,
    pub themes: Vec<Theme>,
    pub media: Vec<Media>,
    pub indexes: Indexes,
    pub analytics: Analytics,
    pub search: Vec<SearchRow>,
}

/// Four-pass pipeline: raw collections → normalized entities → resolved
/// relationships → indices/analytics/search. Pure: identical input gives
/// identical output.
pub fn run(collections: &Collections, mode: PrimaryMode) -> Materialized {
    let lookup = collections.lookup();

    let mut stories = normalize::normalize_stories(&collections.stories);
    let mut storytellers = normalize::normalize_storytellers(&collections.storytellers);
    let mut themes = normalize::normalize_themes(&collections.themes);
    let mut media = normalize::normalize_media(&collections.media, &lookup.quotes);
    info!(
        "Normalized {} stories, {} storytellers, {} themes, {} media",
        stories.len(),
        storytellers.len(),
        themes.len(),
        media.len()
    );

    resolve::resolve(&mut stories, &mut storytellers, &mut themes, &mut media, mode);

    let indexes = index::build(&stories, &storytellers, &themes);
    index::recount_themes(&mut themes, &indexes, &media, &storytellers);

    let analytics = analytics::aggregate(&stories, &storytellers, &themes, &media, &indexes);
    let search = search::build(&stories, &storytellers, &themes);

    Materialized {
        stories,
        storytellers,
        themes,
        media,
        indexes,
        analytics,
        search,
    }
}

/// Run the pipeline and assemble the full view map ready for persistence.
pub fn materialize(
    collections: &Collections,
    mode: PrimaryMode,
    generated_at: DateTime<Utc>,
) -> Result<BTreeMap<String, Value>> {
    let m = run(collections, mode);
    views::build(
        &m.stories,
        &m.storytellers,
        &m.themes,
        &m.media,
        &m.indexes,
        &m.analytics,
        &m.search,
        generated_at,
    )
}

// ── Tests ──
