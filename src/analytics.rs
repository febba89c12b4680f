use std::collections::BTreeMap;

use serde::Serialize;

use crate::index::Indexes;
use crate::normalize::{Media, Story, Storyteller, Theme};

pub const TOP_THEMES_WIDGET: usize = 10;
pub const TOP_THEMES_DASHBOARD: usize = 20;
const TOP_PAIRS: usize = 20;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub total_stories: usize,
    pub total_storytellers: usize,
    pub total_themes: usize,
    pub total_media: usize,
    pub total_locations: usize,
    pub average_stories_per_storyteller: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeRank {
    pub id: String,
    pub name: String,
    pub category: String,
    pub story_count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationCount {
    pub location: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemePair {
    pub themes: [String; 2],
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteStats {
    pub total_quotes: usize,
    pub average_length: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthCount {
    pub month: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub overview: Overview,
    pub top_themes: Vec<ThemeRank>,
    pub locations: BTreeMap<String, usize>,
    pub locations_ranked: Vec<LocationCount>,
    pub roles: BTreeMap<String, usize>,
    pub theme_co_occurrence: Vec<ThemePair>,
    pub quotes: QuoteStats,
    pub stories_per_month: Vec<MonthCount>,
}

/// Aggregate purely over normalized entities and built indices — never the
/// raw input. Empty collections yield zeros, not NaN.
pub fn aggregate(
    stories: &[Story],
    storytellers: &[Storyteller],
    themes: &[Theme],
    media: &[Media],
    idx: &Indexes,
) -> Analytics {
    let locations = bucket_sizes(&idx.stories_by_location);
    Analytics {
        overview: overview(stories, storytellers, themes, media, &locations),
        top_themes: rank_themes(themes, stories.len(), TOP_THEMES_DASHBOARD),
        locations_ranked: rank_locations(&locations),
        locations,
        roles: bucket_sizes(&idx.storytellers_by_role),
        theme_co_occurrence: co_occurrence(stories),
        quotes: quote_stats(media),
        stories_per_month: time_series(idx),
    }
}

fn overview(
    stories: &[Story],
    storytellers: &[Storyteller],
    themes: &[Theme],
    media: &[Media],
    locations: &BTreeMap<String, usize>,
) -> Overview {
    let average = if storytellers.is_empty() {
        0.0
    } else {
        let contributed: usize = storytellers.iter().map(|s| s.story_ids.len()).sum();
        round2(contributed as f64 / storytellers.len() as f64)
    };
    Overview {
        total_stories: stories.len(),
        total_storytellers: storytellers.len(),
        total_themes: themes.len(),
        total_media: media.len(),
        total_locations: locations.len(),
        average_stories_per_storyteller: average,
    }
}

/// Rank themes by story count descending; ties keep original theme order
/// (stable sort). Percentage of total stories, one decimal place.
pub fn rank_themes(themes: &[Theme], total_stories: usize, top_n: usize) -> Vec<ThemeRank> {
    let mut ranked: Vec<&Theme> = themes.iter().collect();
    ranked.sort_by(|a, b| b.story_count.cmp(&a.story_count));
    ranked
        .into_iter()
        .take(top_n)
        .map(|t| ThemeRank {
            id: t.id.clone(),
            name: t.name.clone(),
            category: t.category.clone(),
            story_count: t.story_count,
            percentage: if total_stories == 0 {
                0.0
            } else {
                round1(t.story_count as f64 / total_stories as f64 * 100.0)
            },
        })
        .collect()
}

/// Distribution from an index: bucket key → bucket cardinality.
fn bucket_sizes(index: &BTreeMap<String, Vec<String>>) -> BTreeMap<String, usize> {
    index.iter().map(|(k, ids)| (k.clone(), ids.len())).collect()
}

fn rank_locations(counts: &BTreeMap<String, usize>) -> Vec<LocationCount> {
    let mut ranked: Vec<LocationCount> = counts
        .iter()
        .map(|(location, &count)| LocationCount {
            location: location.clone(),
            count,
        })
        .collect();
    // BTreeMap iteration gives alphabetical ties after the count sort.
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked
}

/// Pairwise theme co-occurrence over stories. Pair keys are sorted, so
/// (A,B) and (B,A) collapse; top 20 by count, ties by pair key.
pub fn co_occurrence(stories: &[Story]) -> Vec<ThemePair> {
    let mut counts: BTreeMap<(String, String), usize> = BTreeMap::new();
    for story in stories {
        // BTreeSet iteration is sorted, so a < b for every emitted pair.
        let ids: Vec<&String> = story.theme_ids.iter().collect();
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                *counts
                    .entry(((*a).clone(), (*b).clone()))
                    .or_insert(0) += 1;
            }
        }
    }
    let mut pairs: Vec<ThemePair> = counts
        .into_iter()
        .map(|((a, b), count)| ThemePair { themes: [a, b], count })
        .collect();
    pairs.sort_by(|a, b| b.count.cmp(&a.count).then(a.themes.cmp(&b.themes)));
    pairs.truncate(TOP_PAIRS);
    pairs
}

fn quote_stats(media: &[Media]) -> QuoteStats {
    let total: usize = media.iter().map(|m| m.quotes.len()).sum();
    let average = if total == 0 {
        0.0
    } else {
        let chars: usize = media
            .iter()
            .flat_map(|m| &m.quotes)
            .map(|q| q.chars().count())
            .sum();
        round2(chars as f64 / total as f64)
    };
    QuoteStats {
        total_quotes: total,
        average_length: average,
    }
}

fn time_series(idx: &Indexes) -> Vec<MonthCount> {
    idx.stories_by_date
        .iter()
        .map(|(month, ids)| MonthCount {
            month: month.clone(),
            count: ids.len(),
        })
        .collect()
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index;
    use crate::normalize::Role;
    use std::collections::BTreeSet;

    fn story(id: &str, themes: &[&str], location: &str) -> Story {
        Story {
            id: id.to_string(),
            title: id.to_string(),
            text: String::new(),
            transcript: String::new(),
            excerpt: String::new(),
            video: None,
            has_video: false,
            featured: false,
            storyteller_ids: Vec::new(),
            media_ids: Vec::new(),
            theme_ids: themes.iter().map(|s| s.to_string()).collect(),
            location: location.to_string(),
            created_at: "2024-03-01T12:00:00.000Z".to_string(),
        }
    }

    fn storyteller(id: &str, role: Role, story_ids: &[&str]) -> Storyteller {
        Storyteller {
            id: id.to_string(),
            name: id.to_string(),
            role,
            location: "Fitzroy".to_string(),
            theme_ids: BTreeSet::new(),
            quotes: Vec::new(),
            story_ids: story_ids.iter().map(|s| s.to_string()).collect(),
            profile_image: None,
        }
    }

    fn theme(id: &str, story_count: usize) -> Theme {
        Theme {
            id: id.to_string(),
            name: id.to_string(),
            category: "Other".to_string(),
            description: String::new(),
            parent_id: None,
            story_count,
            media_count: 0,
            storyteller_count: 0,
        }
    }

    #[test]
    fn empty_input_yields_zeros_not_nan() {
        let idx = Indexes::default();
        let a = aggregate(&[], &[], &[], &[], &idx);
        assert_eq!(a.overview.total_stories, 0);
        assert_eq!(a.overview.average_stories_per_storyteller, 0.0);
        assert_eq!(a.quotes.average_length, 0.0);
        assert!(a.top_themes.is_empty());
        assert!(a.theme_co_occurrence.is_empty());
    }

    #[test]
    fn average_stories_per_storyteller_rounds_to_two_places() {
        let stories = vec![story("s1", &[], "Fitzroy"), story("s2", &[], "Fitzroy")];
        let sts = vec![
            storyteller("p1", Role::Volunteer, &["s1", "s2"]),
            storyteller("p2", Role::Friend, &["s1"]),
            storyteller("p3", Role::Friend, &[]),
        ];
        let idx = index::build(&stories, &sts, &[]);
        let a = aggregate(&stories, &sts, &[], &[], &idx);
        // 3 contributions / 3 storytellers = 1.0
        assert_eq!(a.overview.average_stories_per_storyteller, 1.0);

        let sts2 = vec![
            storyteller("p1", Role::Volunteer, &["s1"]),
            storyteller("p2", Role::Friend, &[]),
            storyteller("p3", Role::Friend, &[]),
        ];
        let a2 = aggregate(&stories, &sts2, &[], &[], &idx);
        assert_eq!(a2.overview.average_stories_per_storyteller, 0.33);
    }

    #[test]
    fn theme_ranking_ties_keep_original_order() {
        let themes = vec![theme("t1", 2), theme("t2", 5), theme("t3", 2)];
        let ranked = rank_themes(&themes, 10, 20);
        let ids: Vec<&str> = ranked.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["t2", "t1", "t3"]);
        assert_eq!(ranked[0].percentage, 50.0);
        assert_eq!(ranked[1].percentage, 20.0);
    }

    #[test]
    fn theme_percentage_one_decimal_place() {
        let themes = vec![theme("t1", 1)];
        let ranked = rank_themes(&themes, 3, 10);
        // 1/3 * 100 = 33.333… → 33.3
        assert_eq!(ranked[0].percentage, 33.3);
    }

    #[test]
    fn co_occurrence_collapses_symmetric_pairs() {
        let stories = vec![
            story("s1", &["tB", "tA"], "Fitzroy"),
            story("s2", &["tA", "tB", "tC"], "Fitzroy"),
        ];
        let pairs = co_occurrence(&stories);
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[0].themes, ["tA".to_string(), "tB".to_string()]);
        assert_eq!(pairs[0].count, 2);
        // No reversed duplicate exists.
        assert!(pairs.iter().all(|p| p.themes[0] < p.themes[1]));
    }

    #[test]
    fn location_distribution_and_ranking() {
        let stories = vec![
            story("s1", &[], "Fitzroy"),
            story("s2", &[], "Collingwood"),
            story("s3", &[], "Fitzroy"),
        ];
        let idx = index::build(&stories, &[], &[]);
        let a = aggregate(&stories, &[], &[], &[], &idx);
        assert_eq!(a.locations["Fitzroy"], 2);
        assert_eq!(a.locations_ranked[0].location, "Fitzroy");
        assert_eq!(a.overview.total_locations, 2);
    }

    #[test]
    fn role_distribution_from_index() {
        let sts = vec![
            storyteller("p1", Role::Volunteer, &[]),
            storyteller("p2", Role::Friend, &[]),
            storyteller("p3", Role::Friend, &[]),
        ];
        let idx = index::build(&[], &sts, &[]);
        let a = aggregate(&[], &sts, &[], &[], &idx);
        assert_eq!(a.roles["volunteer"], 1);
        assert_eq!(a.roles["friend"], 2);
        assert!(a.roles.get("service-provider").is_none());
    }

    #[test]
    fn quote_stats_average_length() {
        let mut m = Media {
            id: "m1".to_string(),
            file_name: "m1".to_string(),
            media_type: "audio".to_string(),
            summary: String::new(),
            quotes: vec!["abcd".to_string(), "ab".to_string()],
            theme_ids: BTreeSet::new(),
            location: "Fitzroy".to_string(),
            storyteller_ids: Vec::new(),
        };
        let stats = quote_stats(std::slice::from_ref(&m));
        assert_eq!(stats.total_quotes, 2);
        assert_eq!(stats.average_length, 3.0);

        m.quotes.clear();
        let empty = quote_stats(std::slice::from_ref(&m));
        assert_eq!(empty.total_quotes, 0);
        assert_eq!(empty.average_length, 0.0);
    }

    #[test]
    fn time_series_is_month_ordered() {
        let mut s1 = story("s1", &[], "Fitzroy");
        s1.created_at = "2024-05-01T00:00:00.000Z".to_string();
        let mut s2 = story("s2", &[], "Fitzroy");
        s2.created_at = "2024-03-01T00:00:00.000Z".to_string();
        let idx = index::build(&[s1, s2], &[], &[]);
        let a = aggregate(&[], &[], &[], &[], &idx);
        let months: Vec<&str> = a.stories_per_month.iter().map(|m| m.month.as_str()).collect();
        assert_eq!(months, vec!["2024-03", "2024-05"]);
    }
}
