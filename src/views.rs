use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::analytics::{self, Analytics};
use crate::index::Indexes;
use crate::normalize::{Media, Story, Storyteller, Theme};
use crate::search::SearchRow;

/// Assemble every output view as `{relative path → JSON value}`. The core
/// never touches a filesystem; the persister owns materialization.
pub fn build(
    stories: &[Story],
    storytellers: &[Storyteller],
    themes: &[Theme],
    media: &[Media],
    idx: &Indexes,
    analytics: &Analytics,
    search: &[SearchRow],
    generated_at: DateTime<Utc>,
) -> Result<BTreeMap<String, Value>> {
    let mut views: BTreeMap<String, Value> = BTreeMap::new();

    // Full collections.
    views.insert("stories.json".into(), to_value(&stories)?);
    views.insert("storytellers.json".into(), to_value(&storytellers)?);
    views.insert("themes.json".into(), to_value(&themes)?);
    views.insert("media.json".into(), to_value(&media)?);

    // Per-entity files for lazy loading.
    for story in stories {
        views.insert(format!("stories/full/{}.json", story.id), to_value(story)?);
    }
    for st in storytellers {
        views.insert(format!("storytellers/full/{}.json", st.id), to_value(st)?);
    }

    // Indices.
    views.insert("indexes/stories-by-theme.json".into(), to_value(&idx.stories_by_theme)?);
    views.insert(
        "indexes/stories-by-storyteller.json".into(),
        to_value(&idx.stories_by_storyteller)?,
    );
    views.insert(
        "indexes/stories-by-location.json".into(),
        to_value(&idx.stories_by_location)?,
    );
    views.insert("indexes/stories-by-date.json".into(), to_value(&idx.stories_by_date)?);
    views.insert("indexes/theme-hierarchy.json".into(), to_value(&idx.theme_hierarchy)?);

    // Analytics: the combined document plus per-facet slices.
    views.insert("analytics.json".into(), to_value(analytics)?);
    views.insert("analytics/overview.json".into(), to_value(&analytics.overview)?);
    views.insert(
        "analytics/themes.json".into(),
        to_value(&analytics::rank_themes(
            themes,
            stories.len(),
            analytics::TOP_THEMES_WIDGET,
        ))?,
    );
    views.insert(
        "analytics/locations.json".into(),
        json!({
            "counts": analytics.locations,
            "ranked": analytics.locations_ranked,
        }),
    );
    views.insert(
        "analytics/time-series.json".into(),
        to_value(&analytics.stories_per_month)?,
    );

    // Search corpus.
    views.insert("search/index.json".into(), to_value(&search)?);

    // Metadata for downstream cache-busting.
    views.insert(
        "metadata.json".into(),
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "generatedAt": generated_at.to_rfc3339(),
            "counts": {
                "stories": stories.len(),
                "storytellers": storytellers.len(),
                "themes": themes.len(),
                "media": media.len(),
            },
        }),
    );

    Ok(views)
}

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

// ── Tests ──
