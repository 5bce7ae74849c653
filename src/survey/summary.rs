// The JSON summary of a survey.

use serde_json::json;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;

use survey_kpi::aggregate::*;

use crate::survey::*;

// The public label of a metric, looked up by the field name after the prefix.
fn metric_label(mapping: Option<&HeaderMapping>, schema: &Schema, metric: &str) -> Option<String> {
    let field = match metric.split_once('.') {
        Some(("age", _)) => schema.fields.age.clone()?,
        Some((_, f)) => f.to_string(),
        None => metric.to_string(),
    };
    mapping.and_then(|m| m.label(&field)).map(|s| s.to_string())
}

fn key_js(key: &Selection) -> JSValue {
    let mut m: JSMap<String, JSValue> = JSMap::new();
    for (d, v) in key.iter() {
        m.insert(d.name().to_string(), json!(v.as_option()));
    }
    JSValue::Object(m)
}

fn group_js(g: &GroupSummary, mapping: Option<&HeaderMapping>, schema: &Schema) -> JSValue {
    let metrics: Vec<JSValue> = g
        .metrics()
        .iter()
        .map(|(name, value)| {
            json!({
                "name": name,
                "label": metric_label(mapping, schema, name),
                "value": value,
            })
        })
        .collect();
    json!({
        "key": key_js(&g.key),
        "respondents": g.respondents,
        "metrics": metrics,
    })
}

fn comparison_js(c: &Comparison, mapping: Option<&HeaderMapping>, schema: &Schema) -> JSValue {
    let metrics: Vec<JSValue> = c
        .deltas
        .iter()
        .map(|d| {
            json!({
                "name": d.name,
                "label": metric_label(mapping, schema, &d.name),
                "left": d.left,
                "right": d.right,
                "delta": d.delta,
                "relative": d.relative,
            })
        })
        .collect();
    json!({
        "left": key_js(&c.left.key),
        "right": key_js(&c.right.key),
        "leftRespondents": c.left.respondents,
        "rightRespondents": c.right.respondents,
        "respondentsDelta": c.respondents_delta,
        "metrics": metrics,
    })
}

fn overview_js(o: &Overview, stats: &CleaningStats) -> JSValue {
    json!({
        "totalRows": o.total_rows,
        "uniqueRespondents": o.unique_respondents,
        "duplicateRows": o.duplicate_rows,
        "missingIdRows": o.missing_id_rows,
        "unrecognizedLikert": stats.unrecognized_likert,
        "unrecognizedFlags": stats.unrecognized_flags,
        "unrecognizedCategories": stats.unrecognized_categories,
        "meanAge": o.mean_age,
        "minAge": o.min_age,
        "maxAge": o.max_age,
        "studentShare": o.student_share,
        "alumnusShare": o.alumnus_share,
    })
}

fn source_name(source: &CategorySource) -> String {
    match source {
        CategorySource::Dimension(d) => d.name().to_string(),
        CategorySource::MultiSelect(f) => f.clone(),
    }
}

pub fn build_summary_js(
    config: &SurveyConfig,
    mapping: Option<&HeaderMapping>,
    schema: &Schema,
    reports: &ReportPlan,
    cleaned: &CleaningResult,
) -> JSValue {
    let records = &cleaned.respondents;

    let age_bands_js: Vec<JSValue> = age_bands(records)
        .iter()
        .map(|(band, count)| json!({"band": band.label(), "respondents": count}))
        .collect();

    let groups_js: Vec<JSValue> = reports
        .groupings
        .iter()
        .map(|dims| {
            let groups: Vec<JSValue> = group_by(records, dims, schema)
                .iter()
                .map(|g| group_js(g, mapping, schema))
                .collect();
            json!({
                "dimensions": dims.iter().map(|d| d.name()).collect::<Vec<&str>>(),
                "groups": groups,
            })
        })
        .collect();

    let comparisons_js: Vec<JSValue> = reports
        .comparisons
        .iter()
        .map(|(d, left, right)| {
            let mut js = comparison_js(&compare(records, left, right, schema), mapping, schema);
            js["dimension"] = json!(d.name());
            js
        })
        .collect();

    let top_n_js: Vec<JSValue> = reports
        .top_n
        .iter()
        .map(|(source, n)| {
            let name = source_name(source);
            let values: Vec<JSValue> = top_n(records, source, *n)
                .iter()
                .map(|f| json!({"value": f.value, "count": f.count, "share": f.share}))
                .collect();
            json!({
                "source": name,
                "label": mapping.and_then(|m| m.label(&name)),
                "n": n,
                "values": values,
            })
        })
        .collect();

    json!({
        "config": config.output_config(),
        "overview": overview_js(&overview(records, &cleaned.stats), &cleaned.stats),
        "ageBands": age_bands_js,
        "groups": groups_js,
        "comparisons": comparisons_js,
        "topN": top_n_js,
    })
}
