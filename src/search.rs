use std::collections::HashMap;

use serde::Serialize;

use crate::normalize::{Story, Storyteller, Theme};

/// One flat search row. `text` is the lower-cased space-joined blob an
/// external consumer substring-matches against; no tokenization or ranking
/// happens here.
#[derive(Debug, Clone, Serialize)]
pub struct SearchRow {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: String,
    pub title: String,
    pub text: String,
}

pub fn build(stories: &[Story], storytellers: &[Storyteller], themes: &[Theme]) -> Vec<SearchRow> {
    let storyteller_names: HashMap<&str, &str> = storytellers
        .iter()
        .map(|s| (s.id.as_str(), s.name.as_str()))
        .collect();
    let theme_names: HashMap<&str, &str> =
        themes.iter().map(|t| (t.id.as_str(), t.name.as_str())).collect();

    let mut rows = Vec::with_capacity(stories.len() + storytellers.len());

    for story in stories {
        let mut parts = vec![story.title.as_str(), story.excerpt.as_str()];
        parts.extend(
            story
                .storyteller_ids
                .iter()
                .filter_map(|id| storyteller_names.get(id.as_str()).copied()),
        );
        rows.push(SearchRow {
            kind: "story",
            id: story.id.clone(),
            title: story.title.clone(),
            text: blob(&parts),
        });
    }

    for st in storytellers {
        let mut parts = vec![st.name.as_str()];
        parts.extend(
            st.theme_ids
                .iter()
                .filter_map(|id| theme_names.get(id.as_str()).copied()),
        );
        rows.push(SearchRow {
            kind: "storyteller",
            id: st.id.clone(),
            title: st.name.clone(),
            text: blob(&parts),
        });
    }

    rows
}

fn blob(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .map(|p| p.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Tests ──
