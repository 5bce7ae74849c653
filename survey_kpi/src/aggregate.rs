//! Grouped KPIs over cleaned records.
//!
//! All the metrics are `Option<f64>`: `None` is the blank result of a metric
//! over an empty group, or over a group where nobody answered.

use log::{debug, info};

use std::collections::BTreeMap;
use std::fmt::Display;

use crate::config::*;

/// A categorical dimension of the respondents.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum Dimension {
    Profile,
    Course,
    Institution,
    EntryYear,
    TeachingModel,
}

impl Dimension {
    pub fn name(&self) -> &'static str {
        match self {
            Dimension::Profile => "profile",
            Dimension::Course => "course",
            Dimension::Institution => "institution",
            Dimension::EntryYear => "entry_year",
            Dimension::TeachingModel => "teaching_model",
        }
    }

    pub fn parse(s: &str) -> Option<Dimension> {
        match s {
            "profile" => Some(Dimension::Profile),
            "course" => Some(Dimension::Course),
            "institution" => Some(Dimension::Institution),
            "entry_year" | "entryYear" | "year" => Some(Dimension::EntryYear),
            "teaching_model" | "teachingModel" => Some(Dimension::TeachingModel),
            _ => None,
        }
    }

    pub fn value(&self, r: &Respondent) -> DimensionValue {
        let v: Option<String> = match self {
            Dimension::Profile => r.profile.map(|p| p.as_str().to_string()),
            Dimension::Course => r.course.clone(),
            Dimension::Institution => r.institution.clone(),
            Dimension::EntryYear => r.entry_year.map(|y| y.to_string()),
            Dimension::TeachingModel => r.teaching_model.map(|t| t.as_str().to_string()),
        };
        match v {
            Some(s) => DimensionValue::Known(s),
            None => DimensionValue::Unspecified,
        }
    }
}

/// The value of a dimension. Missing values are kept in their own bucket.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd)]
pub enum DimensionValue {
    Known(String),
    Unspecified,
}

impl DimensionValue {
    pub const UNSPECIFIED_LABEL: &'static str = "(unspecified)";

    pub fn known(s: &str) -> DimensionValue {
        DimensionValue::Known(s.to_string())
    }

    pub fn as_option(&self) -> Option<&str> {
        match self {
            DimensionValue::Known(s) => Some(s.as_str()),
            DimensionValue::Unspecified => None,
        }
    }
}

impl Display for DimensionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DimensionValue::Known(s) => write!(f, "{}", s),
            DimensionValue::Unspecified => write!(f, "{}", DimensionValue::UNSPECIFIED_LABEL),
        }
    }
}

/// A filter on the respondents: all the pairs must match.
pub type Selection = Vec<(Dimension, DimensionValue)>;

pub fn matches(r: &Respondent, selection: &[(Dimension, DimensionValue)]) -> bool {
    selection.iter().all(|(d, v)| d.value(r) == *v)
}

#[derive(PartialEq, Debug, Clone)]
pub struct Metric {
    pub name: String,
    pub value: Option<f64>,
}

/// The summary of a group of respondents.
#[derive(PartialEq, Debug, Clone)]
pub struct GroupSummary {
    pub key: Selection,
    pub respondents: usize,
    pub mean_age: Option<f64>,
    pub indices: Vec<Metric>,
    pub likert: Vec<Metric>,
    /// Percentage of the respondents who answered with a checked box.
    pub flag_rates: Vec<Metric>,
}

impl GroupSummary {
    /// All the metrics, in a stable order, with a prefix on the name.
    pub fn metrics(&self) -> Vec<(String, Option<f64>)> {
        let mut res = vec![("age.mean".to_string(), self.mean_age)];
        for (prefix, l) in [
            ("index", &self.indices),
            ("likert", &self.likert),
            ("flag", &self.flag_rates),
        ] {
            for m in l.iter() {
                res.push((format!("{}.{}", prefix, m.name), m.value));
            }
        }
        res
    }
}

fn mean<I: Iterator<Item = f64>>(values: I) -> Option<f64> {
    let mut total = 0.0;
    let mut count = 0usize;
    for v in values {
        total += v;
        count += 1;
    }
    if count == 0 {
        None
    } else {
        Some(total / count as f64)
    }
}

fn summarize_group(key: Selection, members: &[&Respondent], schema: &Schema) -> GroupSummary {
    let mean_age = mean(members.iter().filter_map(|r| r.age.map(|a| a as f64)));
    let indices = schema
        .indices
        .iter()
        .map(|def| Metric {
            name: def.name.clone(),
            value: mean(
                members
                    .iter()
                    .filter_map(|r| r.indices.get(&def.name).cloned().flatten()),
            ),
        })
        .collect();
    let likert = schema
        .fields
        .likert
        .iter()
        .map(|n| Metric {
            name: n.clone(),
            value: mean(
                members
                    .iter()
                    .filter_map(|r| r.likert.get(n).cloned().flatten().map(|v| v as f64)),
            ),
        })
        .collect();
    let flag_rates = schema
        .fields
        .flags
        .iter()
        .map(|n| Metric {
            name: n.clone(),
            value: mean(members.iter().filter_map(|r| {
                r.flags
                    .get(n)
                    .cloned()
                    .flatten()
                    .map(|b| if b { 100.0 } else { 0.0 })
            })),
        })
        .collect();
    GroupSummary {
        key,
        respondents: members.len(),
        mean_age,
        indices,
        likert,
        flag_rates,
    }
}

/// Summarizes the respondents that match the selection. An empty match gives
/// a summary with no respondent and blank metrics.
pub fn summarize(respondents: &[Respondent], selection: &Selection, schema: &Schema) -> GroupSummary {
    let members: Vec<&Respondent> = respondents
        .iter()
        .filter(|r| matches(r, selection))
        .collect();
    debug!(
        "summarize: selection {:?}: {} respondents",
        selection,
        members.len()
    );
    summarize_group(selection.clone(), &members, schema)
}

/// Groups the respondents by the given dimensions. The groups are ordered by
/// key, the unspecified bucket after the known values.
pub fn group_by(respondents: &[Respondent], dimensions: &[Dimension], schema: &Schema) -> Vec<GroupSummary> {
    let mut groups: BTreeMap<Vec<DimensionValue>, Vec<&Respondent>> = BTreeMap::new();
    for r in respondents.iter() {
        let key: Vec<DimensionValue> = dimensions.iter().map(|d| d.value(r)).collect();
        groups.entry(key).or_default().push(r);
    }
    info!(
        "group_by: {} respondents in {} groups over {:?}",
        respondents.len(),
        groups.len(),
        dimensions
    );
    groups
        .into_iter()
        .map(|(values, members)| {
            let key: Selection = dimensions.iter().cloned().zip(values.into_iter()).collect();
            summarize_group(key, &members, schema)
        })
        .collect()
}

#[derive(PartialEq, Debug, Clone)]
pub struct MetricDelta {
    pub name: String,
    pub left: Option<f64>,
    pub right: Option<f64>,
    /// left - right
    pub delta: Option<f64>,
    /// (left - right) / right
    pub relative: Option<f64>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Comparison {
    pub left: GroupSummary,
    pub right: GroupSummary,
    pub respondents_delta: i64,
    pub deltas: Vec<MetricDelta>,
}

pub fn delta(left: Option<f64>, right: Option<f64>) -> (Option<f64>, Option<f64>) {
    match (left, right) {
        (Some(l), Some(r)) => {
            let d = l - r;
            let rel = if r == 0.0 { None } else { Some(d / r) };
            (Some(d), rel)
        }
        _ => (None, None),
    }
}

/// Compares two selections metric by metric.
pub fn compare(
    respondents: &[Respondent],
    left: &Selection,
    right: &Selection,
    schema: &Schema,
) -> Comparison {
    let l = summarize(respondents, left, schema);
    let r = summarize(respondents, right, schema);
    let right_metrics = r.metrics();
    let deltas = l
        .metrics()
        .into_iter()
        .zip(right_metrics.into_iter())
        .map(|((name, lv), (_, rv))| {
            let (d, rel) = delta(lv, rv);
            MetricDelta {
                name,
                left: lv,
                right: rv,
                delta: d,
                relative: rel,
            }
        })
        .collect();
    Comparison {
        respondents_delta: l.respondents as i64 - r.respondents as i64,
        left: l,
        right: r,
        deltas,
    }
}

/// Where the categories of a frequency table come from.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum CategorySource {
    Dimension(Dimension),
    MultiSelect(String),
}

#[derive(PartialEq, Debug, Clone)]
pub struct Frequency {
    pub value: String,
    pub count: usize,
    /// Percentage of the respondents who answered.
    pub share: Option<f64>,
}

/// The `n` most frequent answers, most frequent first. Ties keep the order in
/// which the answers first appear in the records.
pub fn top_n(respondents: &[Respondent], source: &CategorySource, n: usize) -> Vec<Frequency> {
    // (value, count), in order of first appearance
    let mut counts: Vec<(String, usize)> = Vec::new();
    let mut answered = 0usize;
    let bump = |value: String, counts: &mut Vec<(String, usize)>| {
        match counts.iter_mut().find(|(v, _)| *v == value) {
            Some(entry) => entry.1 += 1,
            None => counts.push((value, 1)),
        }
    };
    for r in respondents.iter() {
        match source {
            CategorySource::Dimension(d) => {
                answered += 1;
                bump(d.value(r).to_string(), &mut counts);
            }
            CategorySource::MultiSelect(field) => {
                let selected = r.selections.get(field).map(|v| v.as_slice()).unwrap_or(&[]);
                if !selected.is_empty() {
                    answered += 1;
                }
                for s in selected {
                    bump(s.clone(), &mut counts);
                }
            }
        }
    }
    // Stable sort: equal counts keep their first-appearance order.
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
        .into_iter()
        .take(n)
        .map(|(value, count)| Frequency {
            value,
            count,
            share: if answered == 0 {
                None
            } else {
                Some(count as f64 * 100.0 / answered as f64)
            },
        })
        .collect()
}

/// The headline numbers of a survey.
#[derive(PartialEq, Debug, Clone)]
pub struct Overview {
    pub total_rows: usize,
    pub unique_respondents: usize,
    pub duplicate_rows: usize,
    pub missing_id_rows: usize,
    pub mean_age: Option<f64>,
    pub min_age: Option<u32>,
    pub max_age: Option<u32>,
    /// Percentage of current students among all the respondents.
    pub student_share: Option<f64>,
    pub alumnus_share: Option<f64>,
}

pub fn overview(respondents: &[Respondent], stats: &CleaningStats) -> Overview {
    let ages: Vec<u32> = respondents.iter().filter_map(|r| r.age).collect();
    let share = |p: Profile| {
        if respondents.is_empty() {
            None
        } else {
            let c = respondents.iter().filter(|r| r.profile == Some(p)).count();
            Some(c as f64 * 100.0 / respondents.len() as f64)
        }
    };
    Overview {
        total_rows: stats.total_rows,
        unique_respondents: respondents.len(),
        duplicate_rows: stats.duplicate_rows,
        missing_id_rows: stats.missing_id_rows,
        mean_age: mean(ages.iter().map(|a| *a as f64)),
        min_age: ages.iter().min().cloned(),
        max_age: ages.iter().max().cloned(),
        student_share: share(Profile::Student),
        alumnus_share: share(Profile::Alumnus),
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum AgeBand {
    UpTo19,
    From20To25,
    From26To30,
    Over30,
    Unspecified,
}

impl AgeBand {
    pub const ALL: [AgeBand; 5] = [
        AgeBand::UpTo19,
        AgeBand::From20To25,
        AgeBand::From26To30,
        AgeBand::Over30,
        AgeBand::Unspecified,
    ];

    pub fn of(age: Option<u32>) -> AgeBand {
        match age {
            Some(0..=19) => AgeBand::UpTo19,
            Some(20..=25) => AgeBand::From20To25,
            Some(26..=30) => AgeBand::From26To30,
            Some(_) => AgeBand::Over30,
            None => AgeBand::Unspecified,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AgeBand::UpTo19 => "up to 19",
            AgeBand::From20To25 => "20-25",
            AgeBand::From26To30 => "26-30",
            AgeBand::Over30 => "over 30",
            AgeBand::Unspecified => DimensionValue::UNSPECIFIED_LABEL,
        }
    }
}

/// Number of respondents per age band, every band included.
pub fn age_bands(respondents: &[Respondent]) -> Vec<(AgeBand, usize)> {
    AgeBand::ALL
        .iter()
        .map(|b| {
            (
                *b,
                respondents.iter().filter(|r| AgeBand::of(r.age) == *b).count(),
            )
        })
        .collect()
}
