use std::collections::BTreeMap;

use chrono::DateTime;
use serde::Serialize;

use crate::normalize::{Media, Story, Storyteller, Theme};

/// Sparse secondary indices: key → ordered id list. Buckets that would be
/// empty are never created, and value order is the order in which owning
/// entities were processed, so building twice gives identical output.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Indexes {
    pub stories_by_theme: BTreeMap<String, Vec<String>>,
    pub stories_by_storyteller: BTreeMap<String, Vec<String>>,
    pub stories_by_location: BTreeMap<String, Vec<String>>,
    pub stories_by_date: BTreeMap<String, Vec<String>>,
    pub storytellers_by_location: BTreeMap<String, Vec<String>>,
    pub storytellers_by_role: BTreeMap<String, Vec<String>>,
    pub theme_hierarchy: BTreeMap<String, Vec<String>>,
}

pub fn build(stories: &[Story], storytellers: &[Storyteller], themes: &[Theme]) -> Indexes {
    let mut idx = Indexes::default();

    for story in stories {
        for theme_id in &story.theme_ids {
            push(&mut idx.stories_by_theme, theme_id, &story.id);
        }
        for sid in &story.storyteller_ids {
            push(&mut idx.stories_by_storyteller, sid, &story.id);
        }
        push(&mut idx.stories_by_location, &story.location, &story.id);
        if let Some(bucket) = month_bucket(&story.created_at) {
            push(&mut idx.stories_by_date, &bucket, &story.id);
        }
    }

    for st in storytellers {
        push(&mut idx.storytellers_by_location, &st.location, &st.id);
        push(&mut idx.storytellers_by_role, st.role.as_str(), &st.id);
    }

    for theme in themes {
        if let Some(parent) = &theme.parent_id {
            push(&mut idx.theme_hierarchy, parent, &theme.id);
        }
    }

    idx
}

/// Recompute theme counters from the finished index and entity sets. The
/// counters are never incremented during traversal, so
/// `theme.story_count == |stories_by_theme[theme.id]|` holds by
/// construction.
pub fn recount_themes(
    themes: &mut [Theme],
    idx: &Indexes,
    media: &[Media],
    storytellers: &[Storyteller],
) {
    for theme in themes.iter_mut() {
        theme.story_count = idx
            .stories_by_theme
            .get(&theme.id)
            .map_or(0, |ids| ids.len());
        theme.media_count = media.iter().filter(|m| m.theme_ids.contains(&theme.id)).count();
        theme.storyteller_count = storytellers
            .iter()
            .filter(|s| s.theme_ids.contains(&theme.id))
            .count();
    }
}

/// Year-month bucket ("YYYY-MM") from an RFC 3339 timestamp; unparseable
/// stamps contribute no bucket.
pub fn month_bucket(timestamp: &str) -> Option<String> {
    DateTime::parse_from_rfc3339(timestamp)
        .ok()
        .map(|dt| dt.format("%Y-%m").to_string())
}

fn push(map: &mut BTreeMap<String, Vec<String>>, key: &str, id: &str) {
    map.entry(key.to_string()).or_default().push(id.to_string());
}

// ── Tests ──
