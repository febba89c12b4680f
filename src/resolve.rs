use std::collections::{BTreeSet, HashMap, HashSet};

use clap::ValueEnum;
use tracing::debug;

use crate::normalize::{Media, Story, Storyteller, Theme};

/// Which entity anchors derived theme propagation. Media-primary is the
/// canonical rule (story themes come only from linked media);
/// storyteller-primary additionally folds in the theme sets of the
/// storytellers linked to each story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum PrimaryMode {
    #[default]
    Media,
    Storyteller,
}

impl std::fmt::Display for PrimaryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            PrimaryMode::Media => "media",
            PrimaryMode::Storyteller => "storyteller",
        })
    }
}

/// Resolve direct and derived relationships in place.
///
/// Order matters: Media first (themes are primary data there), then
/// Storytellers (union over their linked Media), then Stories (union over
/// linked Media, plus linked Storytellers' sets in storyteller-primary
/// mode), then a single back-fill pass attributing each Story's id and
/// theme set to its Storytellers. Unresolvable ids are dropped, never left
/// dangling.
pub fn resolve(
    stories: &mut [Story],
    storytellers: &mut [Storyteller],
    themes: &mut [Theme],
    media: &mut [Media],
    mode: PrimaryMode,
) {
    let theme_ids: HashSet<String> = themes.iter().map(|t| t.id.clone()).collect();
    let storyteller_ids: HashSet<String> =
        storytellers.iter().map(|s| s.id.clone()).collect();
    let mut dropped = 0usize;

    // Theme parents: drop unresolvable or self-referential parents.
    for theme in themes.iter_mut() {
        if let Some(parent) = &theme.parent_id {
            if !theme_ids.contains(parent) || parent == &theme.id {
                theme.parent_id = None;
                dropped += 1;
            }
        }
    }

    // Media: keep only known theme and storyteller references.
    for m in media.iter_mut() {
        dropped += retain_set(&mut m.theme_ids, &theme_ids);
        dropped += retain_list(&mut m.storyteller_ids, &storyteller_ids);
    }
    let media_themes: HashMap<&str, &BTreeSet<String>> =
        media.iter().map(|m| (m.id.as_str(), &m.theme_ids)).collect();
    let media_ids: HashSet<String> = media.iter().map(|m| m.id.clone()).collect();

    // Storytellers: themes and quotes accumulate from the media that list
    // them, in media collection order.
    let mut media_by_storyteller: HashMap<&str, Vec<&Media>> = HashMap::new();
    for m in media.iter() {
        for sid in &m.storyteller_ids {
            media_by_storyteller.entry(sid.as_str()).or_default().push(m);
        }
    }
    for st in storytellers.iter_mut() {
        if let Some(linked) = media_by_storyteller.get(st.id.as_str()) {
            for m in linked {
                st.theme_ids.extend(m.theme_ids.iter().cloned());
                st.quotes.extend(m.quotes.iter().cloned());
            }
        }
    }
    let storyteller_themes: HashMap<String, BTreeSet<String>> = storytellers
        .iter()
        .map(|s| (s.id.clone(), s.theme_ids.clone()))
        .collect();

    // Stories: direct links filtered, theme set derived as a union.
    for story in stories.iter_mut() {
        dropped += retain_list(&mut story.storyteller_ids, &storyteller_ids);
        dropped += retain_list(&mut story.media_ids, &media_ids);

        let mut derived: BTreeSet<String> = BTreeSet::new();
        for mid in &story.media_ids {
            if let Some(set) = media_themes.get(mid.as_str()) {
                derived.extend(set.iter().cloned());
            }
        }
        if mode == PrimaryMode::Storyteller {
            for sid in &story.storyteller_ids {
                if let Some(set) = storyteller_themes.get(sid) {
                    derived.extend(set.iter().cloned());
                }
            }
        }
        story.theme_ids = derived;
    }

    // Back-fill: attribute each story and its themes to its storytellers.
    let mut st_index: HashMap<&str, usize> = HashMap::new();
    for (i, st) in storytellers.iter().enumerate() {
        st_index.insert(st.id.as_str(), i);
    }
    let contributions: Vec<(usize, String, BTreeSet<String>)> = stories
        .iter()
        .flat_map(|story| {
            story.storyteller_ids.iter().filter_map(|sid| {
                st_index
                    .get(sid.as_str())
                    .map(|&i| (i, story.id.clone(), story.theme_ids.clone()))
            })
        })
        .collect();
    for (i, story_id, story_themes) in contributions {
        storytellers[i].story_ids.push(story_id);
        storytellers[i].theme_ids.extend(story_themes);
    }

    if dropped > 0 {
        debug!("Dropped {} unresolvable references", dropped);
    }
}

fn retain_set(set: &mut BTreeSet<String>, known: &HashSet<String>) -> usize {
    let before = set.len();
    set.retain(|id| known.contains(id));
    before - set.len()
}

fn retain_list(list: &mut Vec<String>, known: &HashSet<String>) -> usize {
    let before = list.len();
    list.retain(|id| known.contains(id));
    before - list.len()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::Role;

    fn story(id: &str, storyteller_ids: &[&str], media_ids: &[&str]) -> Story {
        Story {
            id: id.to_string(),
            title: id.to_string(),
            text: String::new(),
            transcript: String::new(),
            excerpt: String::new(),
            video: None,
            has_video: false,
            featured: false,
            storyteller_ids: storyteller_ids.iter().map(|s| s.to_string()).collect(),
            media_ids: media_ids.iter().map(|s| s.to_string()).collect(),
            theme_ids: BTreeSet::new(),
            location: "Unknown".to_string(),
            created_at: "2024-03-01T12:00:00.000Z".to_string(),
        }
    }

    fn storyteller(id: &str) -> Storyteller {
        Storyteller {
            id: id.to_string(),
            name: id.to_string(),
            role: Role::Volunteer,
            location: "Unknown".to_string(),
            theme_ids: BTreeSet::new(),
            quotes: Vec::new(),
            story_ids: Vec::new(),
            profile_image: None,
        }
    }

    fn theme(id: &str) -> Theme {
        Theme {
            id: id.to_string(),
            name: id.to_string(),
            category: "Other".to_string(),
            description: String::new(),
            parent_id: None,
            story_count: 0,
            media_count: 0,
            storyteller_count: 0,
        }
    }

    fn media_item(id: &str, theme_ids: &[&str], storyteller_ids: &[&str]) -> Media {
        Media {
            id: id.to_string(),
            file_name: id.to_string(),
            media_type: "audio".to_string(),
            summary: String::new(),
            quotes: Vec::new(),
            theme_ids: theme_ids.iter().map(|s| s.to_string()).collect(),
            location: "Unknown".to_string(),
            storyteller_ids: storyteller_ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn single_link_scenario() {
        let mut stories = vec![story("s1", &["p1"], &["m1"])];
        let mut storytellers = vec![storyteller("p1")];
        let mut themes = vec![theme("t1")];
        let mut media = vec![media_item("m1", &["t1"], &["p1"])];

        resolve(
            &mut stories,
            &mut storytellers,
            &mut themes,
            &mut media,
            PrimaryMode::Media,
        );

        assert_eq!(stories[0].theme_ids, BTreeSet::from(["t1".to_string()]));
        assert_eq!(storytellers[0].theme_ids, BTreeSet::from(["t1".to_string()]));
        assert_eq!(storytellers[0].story_ids, vec!["s1"]);
    }

    #[test]
    fn story_themes_are_union_of_media_themes() {
        let mut stories = vec![story("s1", &[], &["m1", "m2"])];
        let mut storytellers = vec![];
        let mut themes = vec![theme("t1"), theme("t2"), theme("t3")];
        let mut media = vec![
            media_item("m1", &["t2", "t1"], &[]),
            media_item("m2", &["t1", "t3"], &[]),
        ];

        resolve(
            &mut stories,
            &mut storytellers,
            &mut themes,
            &mut media,
            PrimaryMode::Media,
        );

        let expected: BTreeSet<String> =
            ["t1", "t2", "t3"].iter().map(|s| s.to_string()).collect();
        assert_eq!(stories[0].theme_ids, expected);
    }

    #[test]
    fn unresolvable_references_are_dropped() {
        let mut stories = vec![story("s1", &["p1", "ghost"], &["m1", "gone"])];
        let mut storytellers = vec![storyteller("p1")];
        let mut themes = vec![theme("t1")];
        let mut media = vec![media_item("m1", &["t1", "missing"], &["nobody"])];

        resolve(
            &mut stories,
            &mut storytellers,
            &mut themes,
            &mut media,
            PrimaryMode::Media,
        );

        assert_eq!(stories[0].storyteller_ids, vec!["p1"]);
        assert_eq!(stories[0].media_ids, vec!["m1"]);
        assert_eq!(media[0].theme_ids, BTreeSet::from(["t1".to_string()]));
        assert!(media[0].storyteller_ids.is_empty());
    }

    #[test]
    fn storyteller_primary_mode_folds_in_storyteller_themes() {
        // p1 is linked to m2 (t2) but the story only links m1 (t1).
        let mut stories = vec![story("s1", &["p1"], &["m1"])];
        let mut storytellers = vec![storyteller("p1")];
        let mut themes = vec![theme("t1"), theme("t2")];
        let mut media = vec![
            media_item("m1", &["t1"], &[]),
            media_item("m2", &["t2"], &["p1"]),
        ];

        let mut media_mode_stories = stories.clone();
        resolve(
            &mut media_mode_stories,
            &mut storytellers.clone(),
            &mut themes.clone(),
            &mut media.clone(),
            PrimaryMode::Media,
        );
        assert_eq!(
            media_mode_stories[0].theme_ids,
            BTreeSet::from(["t1".to_string()])
        );

        resolve(
            &mut stories,
            &mut storytellers,
            &mut themes,
            &mut media,
            PrimaryMode::Storyteller,
        );
        let expected: BTreeSet<String> = ["t1", "t2"].iter().map(|s| s.to_string()).collect();
        assert_eq!(stories[0].theme_ids, expected);
    }

    #[test]
    fn self_and_missing_theme_parents_cleared() {
        let mut themes = vec![theme("t1"), theme("t2")];
        themes[0].parent_id = Some("t1".to_string());
        themes[1].parent_id = Some("missing".to_string());

        resolve(&mut [], &mut [], &mut themes, &mut [], PrimaryMode::Media);

        assert!(themes[0].parent_id.is_none());
        assert!(themes[1].parent_id.is_none());
    }

    #[test]
    fn storyteller_quotes_accumulate_from_linked_media() {
        let mut storytellers = vec![storyteller("p1")];
        let mut themes = vec![theme("t1")];
        let mut media = vec![
            media_item("m1", &["t1"], &["p1"]),
            media_item("m2", &[], &["p1"]),
        ];
        media[0].quotes = vec!["first".to_string()];
        media[1].quotes = vec!["second".to_string()];

        resolve(
            &mut [],
            &mut storytellers,
            &mut themes,
            &mut media,
            PrimaryMode::Media,
        );

        assert_eq!(storytellers[0].quotes, vec!["first", "second"]);
    }
}
