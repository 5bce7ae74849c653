mod config;
mod headers;

pub mod aggregate;
pub mod builder;
pub mod manual;

use log::{debug, info, warn};

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{NaiveDate, NaiveDateTime};

pub use crate::config::*;
pub use crate::headers::*;

// **** Private structures ****

// The meaning of a column for the cleaning.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
enum Role {
    Profile,
    Age,
    Course,
    Institution,
    TeachingModel,
    EntryYear,
    SubmittedAt,
    Likert,
    Flag,
    MultiSelect,
}

// Where the fields of the schema are in one table. Resolved once per table.
#[derive(Eq, PartialEq, Debug, Clone)]
struct ColumnPlan {
    id_col: usize,
    columns: Vec<(usize, Role, String)>,
}

// The outcome of reading one cell.
#[derive(PartialEq, Debug, Clone)]
enum Reading<T> {
    Blank,
    Value(T),
    Unrecognized,
}

impl<T> Reading<T> {
    fn value(self) -> Option<T> {
        match self {
            Reading::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// Cleans a set of tables into one record per respondent.
///
/// Arguments:
/// * `tables` the raw tables, in input order. Duplicates are searched across
/// all of them.
/// * `mapping` the mapping from raw headers to canonical names. If not
/// provided, it is inferred from the headers of each table.
/// * `schema` the fields to extract and the indices to compute
/// * `lookups` the tables used to interpret the answers
/// * `rules` the deduplication and missing-value policies
///
/// Nothing is produced if one of the tables lacks the identifier column.
pub fn clean_tables(
    tables: &[RawTable],
    mapping: Option<&HeaderMapping>,
    schema: &Schema,
    lookups: &Lookups,
    rules: &CleaningRules,
) -> Result<CleaningResult, CleaningErrors> {
    schema.validate()?;
    info!(
        "clean_tables: processing {} tables, rules: {:?}",
        tables.len(),
        rules
    );

    // All the plans first: a missing identifier column stops everything.
    let mut plans: Vec<ColumnPlan> = Vec::with_capacity(tables.len());
    for table in tables.iter() {
        let plan = match mapping {
            Some(m) => plan_columns(table, m, schema)?,
            None => plan_columns(table, &HeaderMapping::inferred(&table.headers), schema)?,
        };
        debug!("clean_tables: plan for {}: {:?}", table.source, plan);
        plans.push(plan);
    }

    let mut stats = CleaningStats::default();
    let mut candidates: Vec<Respondent> = Vec::new();
    for (table, plan) in tables.iter().zip(plans.iter()) {
        for row_idx in 0..table.rows.len() {
            stats.total_rows += 1;
            match read_row(table, plan, row_idx, schema, lookups, rules, &mut stats) {
                Some(r) => candidates.push(r),
                None => {
                    warn!(
                        "clean_tables: {}: row {} has no identifier, skipping",
                        table.source,
                        row_idx + 1
                    );
                    stats.missing_id_rows += 1;
                }
            }
        }
    }

    let (mut respondents, duplicates) = deduplicate(candidates, rules.duplicate_policy);
    stats.duplicate_rows = duplicates;
    stats.unique_respondents = respondents.len();

    for r in respondents.iter_mut() {
        for def in schema.indices.iter() {
            let v = compute_index(def, r, &lookups.likert, rules.missing_component_policy);
            r.indices.insert(def.name.clone(), v);
        }
    }

    info!("clean_tables: {:?}", stats);
    Ok(CleaningResult { respondents, stats })
}

/// Convenience for a single table.
pub fn clean_table(
    table: &RawTable,
    mapping: Option<&HeaderMapping>,
    schema: &Schema,
    lookups: &Lookups,
    rules: &CleaningRules,
) -> Result<CleaningResult, CleaningErrors> {
    clean_tables(&[table.clone()], mapping, schema, lookups, rules)
}

fn plan_columns(
    table: &RawTable,
    mapping: &HeaderMapping,
    schema: &Schema,
) -> Result<ColumnPlan, CleaningErrors> {
    let resolved = mapping.resolve(&table.headers);
    let find = |name: &str| -> Option<usize> {
        let mut found = resolved
            .iter()
            .enumerate()
            .filter(|(_, c)| c.as_str() == name)
            .map(|(idx, _)| idx);
        let first = found.next();
        if first.is_some() && found.next().is_some() {
            warn!(
                "plan_columns: {}: several columns resolve to {:?}, using the first one",
                table.source, name
            );
        }
        first
    };

    let id_col = match find(schema.fields.id.as_str()) {
        Some(idx) => idx,
        None => {
            return Err(CleaningErrors::MissingIdColumn {
                column: schema.fields.id.clone(),
                source: table.source.clone(),
            })
        }
    };

    let f = &schema.fields;
    let mut wanted: Vec<(Role, &String)> = Vec::new();
    let roles = [
        (Role::Profile, &f.profile),
        (Role::Age, &f.age),
        (Role::Course, &f.course),
        (Role::Institution, &f.institution),
        (Role::TeachingModel, &f.teaching_model),
        (Role::EntryYear, &f.entry_year),
        (Role::SubmittedAt, &f.submitted_at),
    ];
    for (role, name) in roles.iter() {
        if let Some(n) = name {
            wanted.push((*role, n));
        }
    }
    wanted.extend(f.likert.iter().map(|n| (Role::Likert, n)));
    wanted.extend(f.flags.iter().map(|n| (Role::Flag, n)));
    wanted.extend(f.multi_select.iter().map(|n| (Role::MultiSelect, n)));

    let mut columns: Vec<(usize, Role, String)> = Vec::new();
    for (role, name) in wanted {
        match find(name.as_str()) {
            Some(idx) => columns.push((idx, role, name.clone())),
            None => warn!(
                "plan_columns: {}: field {:?} not found, its values will be missing",
                table.source, name
            ),
        }
    }
    Ok(ColumnPlan { id_col, columns })
}

// An empty record with every field of the schema.
fn empty_respondent(id: &str, schema: &Schema) -> Respondent {
    let mut r = Respondent::new(id);
    for n in schema.fields.likert.iter() {
        r.likert.insert(n.clone(), None);
    }
    for n in schema.fields.flags.iter() {
        r.flags.insert(n.clone(), None);
    }
    for n in schema.fields.multi_select.iter() {
        r.selections.insert(n.clone(), Vec::new());
    }
    for def in schema.indices.iter() {
        r.indices.insert(def.name.clone(), None);
    }
    r
}

fn read_row(
    table: &RawTable,
    plan: &ColumnPlan,
    row_idx: usize,
    schema: &Schema,
    lookups: &Lookups,
    rules: &CleaningRules,
    stats: &mut CleaningStats,
) -> Option<Respondent> {
    let id = identifier(table.cell(row_idx, plan.id_col))?;
    let mut r = empty_respondent(&id, schema);

    for (col, role, name) in plan.columns.iter() {
        let cell = table.cell(row_idx, *col);
        match role {
            Role::Profile => {
                let reading = read_profile(cell, &lookups.profiles);
                if reading == Reading::Unrecognized {
                    stats.unrecognized_categories += 1;
                    debug!("read_row: {}: unknown profile {:?}", id, cell);
                }
                r.profile = reading.value();
            }
            Role::Age => r.age = age_value(cell),
            Role::Course => r.course = cell.as_text(),
            Role::Institution => r.institution = cell.as_text(),
            Role::TeachingModel => {
                let reading = read_teaching_model(cell, &lookups.teaching_models);
                if reading == Reading::Unrecognized {
                    stats.unrecognized_categories += 1;
                    debug!("read_row: {}: unknown teaching model {:?}", id, cell);
                }
                r.teaching_model = reading.value();
            }
            Role::EntryYear => r.entry_year = entry_year_value(cell),
            Role::SubmittedAt => r.submitted_at = date_value(cell),
            Role::Likert => {
                let reading = read_likert(cell, &lookups.likert);
                if reading == Reading::Unrecognized {
                    stats.unrecognized_likert += 1;
                    debug!("read_row: {}: {}: unknown likert answer {:?}", id, name, cell);
                }
                r.likert.insert(name.clone(), reading.value());
            }
            Role::Flag => {
                let reading = read_flag(cell, table.option(*col), &lookups.booleans);
                if reading == Reading::Unrecognized {
                    stats.unrecognized_flags += 1;
                    debug!("read_row: {}: {}: unknown flag value {:?}", id, name, cell);
                }
                r.flags.insert(name.clone(), reading.value());
            }
            Role::MultiSelect => {
                r.selections.insert(
                    name.clone(),
                    split_selections(cell, rules.multi_select_delimiter),
                );
            }
        }
    }
    debug!("read_row: {}: {:?}", table.source, r);
    Some(r)
}

/// Keeps one record per identifier. Returns the kept records, in the input
/// position of the kept row, and the number of rows dropped.
pub fn deduplicate(candidates: Vec<Respondent>, policy: DuplicatePolicy) -> (Vec<Respondent>, usize) {
    let mut chosen: HashMap<String, usize> = HashMap::new();
    for (pos, r) in candidates.iter().enumerate() {
        match policy {
            DuplicatePolicy::KeepFirst => {
                chosen.entry(r.id.clone()).or_insert(pos);
            }
            DuplicatePolicy::KeepLast => {
                chosen.insert(r.id.clone(), pos);
            }
        }
    }
    let kept: HashSet<usize> = chosen.values().cloned().collect();
    let dropped = candidates.len() - kept.len();
    if dropped > 0 {
        info!(
            "deduplicate: dropped {} rows with a repeated identifier ({:?})",
            dropped, policy
        );
    }
    let res = candidates
        .into_iter()
        .enumerate()
        .filter(|(pos, _)| kept.contains(pos))
        .map(|(_, r)| r)
        .collect();
    (res, dropped)
}

/// Computes a composite index for one respondent.
///
/// Every component is first brought to [0, 1]: likert items through the
/// scale, flags as 0 or 1, multi-select fields as 1 when the option was
/// chosen. The result is the weighted mean of the components, multiplied by
/// the scale factor of the index.
pub fn compute_index(
    def: &IndexDefinition,
    respondent: &Respondent,
    scale: &LikertScale,
    policy: MissingComponentPolicy,
) -> Option<f64> {
    let mut num = 0.0;
    let mut den = 0.0;
    for c in def.components.iter() {
        let x = match (component_value(c, respondent, scale), policy) {
            (Some(x), _) => x,
            (None, MissingComponentPolicy::Exclude) => return None,
            (None, MissingComponentPolicy::NeutralDefault) => 0.5,
        };
        let x = if c.invert { 1.0 - x } else { x };
        num += c.weight * x;
        den += c.weight;
    }
    if den <= 0.0 {
        return None;
    }
    Some(num / den * def.scale.factor())
}

fn component_value(c: &IndexComponent, r: &Respondent, scale: &LikertScale) -> Option<f64> {
    if let Some(v) = r.likert.get(&c.field) {
        return v.map(|v| scale.normalize(v));
    }
    if let Some(v) = r.flags.get(&c.field) {
        return v.map(|b| if b { 1.0 } else { 0.0 });
    }
    if let Some(selected) = r.selections.get(&c.field) {
        let hit = match &c.option {
            Some(o) => {
                let o = fold_text(o);
                selected.iter().any(|s| fold_text(s) == o)
            }
            None => !selected.is_empty(),
        };
        return Some(if hit { 1.0 } else { 0.0 });
    }
    None
}

// ******** Cell readers *********

fn identifier(cell: &RawCell) -> Option<String> {
    cell.as_text()
}

// A number written as text, with a comma or a dot as decimal separator.
fn parse_number(s: &str) -> Option<f64> {
    s.trim().replace(',', ".").parse::<f64>().ok()
}

// The integer at the start of a text such as "4 - Concordo" or "20 anos".
fn leading_integer(s: &str) -> Option<i64> {
    let s = s.trim();
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    match s[digits.len()..].chars().next() {
        None => digits.parse().ok(),
        Some(c) if c.is_whitespace() || c == '-' || c == ')' => digits.parse().ok(),
        Some(_) => None,
    }
}

fn integral(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 {
        Some(f as i64)
    } else {
        None
    }
}

fn read_likert(cell: &RawCell, scale: &LikertScale) -> Reading<u8> {
    let as_scale = |v: Option<i64>| match v {
        Some(v) if scale.contains(v) => Reading::Value(v as u8),
        _ => Reading::Unrecognized,
    };
    match cell {
        RawCell::Number(f) => as_scale(integral(*f)),
        RawCell::Text(s) if s.trim().is_empty() => Reading::Blank,
        RawCell::Text(s) => {
            let folded = fold_text(s);
            if let Some((_, v)) = scale.labels.iter().find(|(l, _)| *l == folded) {
                return Reading::Value(*v);
            }
            match parse_number(s) {
                Some(f) => as_scale(integral(f)),
                None => as_scale(leading_integer(s)),
            }
        }
        RawCell::Empty => Reading::Blank,
        RawCell::Bool(_) | RawCell::DateTime(_) => Reading::Unrecognized,
    }
}

/// The value of a cell on the Likert scale. Unknown answers are missing.
pub fn likert_value(cell: &RawCell, scale: &LikertScale) -> Option<u8> {
    read_likert(cell, scale).value()
}

fn read_flag(cell: &RawCell, option: Option<&str>, tokens: &BooleanTokens) -> Reading<bool> {
    match cell {
        // An unchecked box leaves the cell empty.
        RawCell::Empty => Reading::Value(false),
        RawCell::Text(s) if s.trim().is_empty() => Reading::Value(false),
        RawCell::Bool(b) => Reading::Value(*b),
        RawCell::Number(f) if *f == 1.0 => Reading::Value(true),
        RawCell::Number(f) if *f == 0.0 => Reading::Value(false),
        RawCell::Number(_) | RawCell::DateTime(_) => Reading::Unrecognized,
        RawCell::Text(s) => {
            let folded = fold_text(s);
            if option.map(fold_text).as_deref() == Some(folded.as_str()) {
                Reading::Value(true)
            } else if tokens.affirmative.contains(&folded) {
                Reading::Value(true)
            } else if tokens.negative.contains(&folded) {
                Reading::Value(false)
            } else {
                Reading::Unrecognized
            }
        }
    }
}

/// The value of a checkbox or yes/no cell. `option` is the answer option
/// carried by the header of the column, which also counts as checked.
pub fn flag_value(cell: &RawCell, option: Option<&str>, tokens: &BooleanTokens) -> Option<bool> {
    read_flag(cell, option, tokens).value()
}

fn read_by_tokens<T: Copy>(cell: &RawCell, table: &[(String, T)]) -> Reading<T> {
    match cell.as_text() {
        None => Reading::Blank,
        Some(s) => {
            let folded = fold_text(&s);
            match table.iter().find(|(tok, _)| folded.contains(tok.as_str())) {
                Some((_, v)) => Reading::Value(*v),
                None => Reading::Unrecognized,
            }
        }
    }
}

fn read_profile(cell: &RawCell, table: &[(String, Profile)]) -> Reading<Profile> {
    read_by_tokens(cell, table)
}

fn read_teaching_model(cell: &RawCell, table: &[(String, TeachingModel)]) -> Reading<TeachingModel> {
    read_by_tokens(cell, table)
}

pub fn profile_value(cell: &RawCell, lookups: &Lookups) -> Option<Profile> {
    read_profile(cell, &lookups.profiles).value()
}

pub fn teaching_model_value(cell: &RawCell, lookups: &Lookups) -> Option<TeachingModel> {
    read_teaching_model(cell, &lookups.teaching_models).value()
}

pub fn age_value(cell: &RawCell) -> Option<u32> {
    let v = match cell {
        RawCell::Number(f) => integral(*f),
        RawCell::Text(s) => parse_number(s)
            .and_then(integral)
            .or_else(|| leading_integer(s)),
        _ => None,
    }?;
    if (1..=120).contains(&v) {
        Some(v as u32)
    } else {
        None
    }
}

pub fn entry_year_value(cell: &RawCell) -> Option<i32> {
    let v: i64 = match cell {
        RawCell::Number(f) => integral(*f)?,
        RawCell::Text(s) => {
            let s = s.trim();
            let head: String = s.chars().take(4).collect();
            if head.len() == 4 && head.chars().all(|c| c.is_ascii_digit()) {
                head.parse().ok()?
            } else {
                return None;
            }
        }
        _ => return None,
    };
    if (1900..=2100).contains(&v) {
        Some(v as i32)
    } else {
        None
    }
}

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%d/%m/%Y"];
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%d/%m/%Y %H:%M:%S", "%d/%m/%Y %H:%M"];

pub fn date_value(cell: &RawCell) -> Option<NaiveDate> {
    match cell {
        RawCell::DateTime(dt) => Some(dt.date()),
        RawCell::Text(s) => {
            let s = s.trim();
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
                .or_else(|| {
                    DATETIME_FORMATS
                        .iter()
                        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
                        .map(|dt| dt.date())
                })
        }
        _ => None,
    }
}

/// The answers of a multi-select cell, in answer order, without repetitions.
pub fn split_selections(cell: &RawCell, delimiter: char) -> Vec<String> {
    let mut res: Vec<String> = Vec::new();
    if let Some(s) = cell.as_text() {
        for part in s.split(delimiter) {
            let part = part.trim();
            if !part.is_empty() && !res.iter().any(|p| p == part) {
                res.push(part.to_string());
            }
        }
    }
    res
}

/// Groups the records by identifier, for lookups.
pub fn by_identifier(respondents: &[Respondent]) -> BTreeMap<&str, &Respondent> {
    respondents.iter().map(|r| (r.id.as_str(), r)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TableBuilder;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn s(l: &[&str]) -> Vec<String> {
        l.iter().map(|x| x.to_string()).collect()
    }

    fn example_schema() -> Schema {
        Schema::new(
            FieldSet {
                id: "id".to_string(),
                age: Some("age".to_string()),
                likert: s(&["likert"]),
                ..FieldSet::default()
            },
            vec![],
        )
    }

    fn example_table() -> RawTable {
        let mut b = TableBuilder::new("example").headers(&s(&["id", "age", "likert"]));
        b.add_row_simple(&s(&["1", "20", "Agree"])).unwrap();
        b.add_row_simple(&s(&["1", "21", "Disagree"])).unwrap();
        b.add_row_simple(&s(&["2", "19", "5"])).unwrap();
        b.build()
    }

    fn run(table: &RawTable, schema: &Schema, rules: &CleaningRules) -> CleaningResult {
        clean_table(table, None, schema, &Lookups::standard(), rules).unwrap()
    }

    #[test]
    fn keep_first_example() {
        init();
        let res = run(&example_table(), &example_schema(), &CleaningRules::DEFAULT_RULES);
        assert_eq!(res.respondents.len(), 2);
        let r1 = &res.respondents[0];
        assert_eq!(r1.id, "1");
        assert_eq!(r1.age, Some(20));
        assert_eq!(r1.likert.get("likert"), Some(&Some(4)));
        let r2 = &res.respondents[1];
        assert_eq!(r2.id, "2");
        assert_eq!(r2.age, Some(19));
        assert_eq!(r2.likert.get("likert"), Some(&Some(5)));
        assert_eq!(res.stats.total_rows, 3);
        assert_eq!(res.stats.duplicate_rows, 1);
        assert_eq!(res.stats.unique_respondents, 2);
    }

    #[test]
    fn keep_last_retains_last_occurrence() {
        init();
        let rules = CleaningRules {
            duplicate_policy: DuplicatePolicy::KeepLast,
            ..CleaningRules::DEFAULT_RULES
        };
        let res = run(&example_table(), &example_schema(), &rules);
        assert_eq!(res.respondents.len(), 2);
        let r1 = by_identifier(&res.respondents)["1"];
        assert_eq!(r1.age, Some(21));
        assert_eq!(r1.likert.get("likert"), Some(&Some(2)));
        // Ordered by the position of the kept rows.
        assert_eq!(res.respondents[0].id, "1");
        assert_eq!(res.respondents[1].id, "2");
    }

    #[test]
    fn keep_last_orders_by_kept_position() {
        let mut b = TableBuilder::new("t").headers(&s(&["id"]));
        for id in ["a", "b", "a"] {
            b.add_row_simple(&s(&[id])).unwrap();
        }
        let rules = CleaningRules {
            duplicate_policy: DuplicatePolicy::KeepLast,
            ..CleaningRules::DEFAULT_RULES
        };
        let res = run(&b.build(), &example_schema(), &rules);
        let ids: Vec<&str> = res.respondents.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn no_duplicates_keeps_all_rows() {
        let mut b = TableBuilder::new("t").headers(&s(&["id", "age"]));
        for i in 0..25 {
            let id = format!("r{}", i);
            b.add_row_simple(&s(&[id.as_str(), "30"])).unwrap();
        }
        let table = b.build();
        let res = run(&table, &example_schema(), &CleaningRules::DEFAULT_RULES);
        assert_eq!(res.respondents.len(), table.rows.len());
        assert_eq!(res.stats.duplicate_rows, 0);
    }

    #[test]
    fn duplicates_across_tables() {
        let mut b1 = TableBuilder::new("first").headers(&s(&["id", "age"]));
        b1.add_row_simple(&s(&["7", "30"])).unwrap();
        let mut b2 = TableBuilder::new("second").headers(&s(&["age", "id"]));
        b2.add_row_simple(&s(&["31", "7"])).unwrap();
        b2.add_row_simple(&s(&["32", "8"])).unwrap();
        let res = clean_tables(
            &[b1.build(), b2.build()],
            None,
            &example_schema(),
            &Lookups::standard(),
            &CleaningRules::DEFAULT_RULES,
        )
        .unwrap();
        assert_eq!(res.respondents.len(), 2);
        assert_eq!(res.respondents[0].age, Some(30));
        assert_eq!(res.respondents[1].id, "8");
    }

    #[test]
    fn missing_id_column_is_fatal() {
        let mut b = TableBuilder::new("survey.xlsx").headers(&s(&["age", "likert"]));
        b.add_row_simple(&s(&["20", "Agree"])).unwrap();
        let err = clean_table(
            &b.build(),
            None,
            &example_schema(),
            &Lookups::standard(),
            &CleaningRules::DEFAULT_RULES,
        )
        .unwrap_err();
        assert_eq!(
            err,
            CleaningErrors::MissingIdColumn {
                column: "id".to_string(),
                source: "survey.xlsx".to_string()
            }
        );
        assert!(err.to_string().contains("'id'"));
    }

    #[test]
    fn rows_without_identifier_are_skipped() {
        let mut b = TableBuilder::new("t").headers(&s(&["id", "age"]));
        b.add_row_simple(&s(&["", "20"])).unwrap();
        b.add_row_simple(&s(&["3", "22"])).unwrap();
        let res = run(&b.build(), &example_schema(), &CleaningRules::DEFAULT_RULES);
        assert_eq!(res.respondents.len(), 1);
        assert_eq!(res.stats.missing_id_rows, 1);
    }

    #[test]
    fn numeric_identifiers_are_integral_text() {
        let mut b = TableBuilder::new("t").headers(&s(&["id"]));
        b.add_row(vec![RawCell::Number(12.0)]).unwrap();
        b.add_row(vec![RawCell::Text(" 12 ".to_string())]).unwrap();
        let res = run(&b.build(), &example_schema(), &CleaningRules::DEFAULT_RULES);
        assert_eq!(res.respondents.len(), 1);
        assert_eq!(res.respondents[0].id, "12");
    }

    #[test]
    fn likert_normalization() {
        let scale = LikertScale::agreement();
        assert_eq!(likert_value(&RawCell::Text("Concordo totalmente".into()), &scale), Some(5));
        assert_eq!(likert_value(&RawCell::Text("  NEUTRO ".into()), &scale), Some(3));
        assert_eq!(likert_value(&RawCell::Text("Nem concordo nem discordo".into()), &scale), Some(3));
        assert_eq!(likert_value(&RawCell::Text("4 - Concordo".into()), &scale), Some(4));
        assert_eq!(likert_value(&RawCell::Number(2.0), &scale), Some(2));
        assert_eq!(likert_value(&RawCell::Number(2.5), &scale), None);
        assert_eq!(likert_value(&RawCell::Number(7.0), &scale), None);
        assert_eq!(likert_value(&RawCell::Text("0".into()), &scale), None);
        assert_eq!(likert_value(&RawCell::Text("talvez".into()), &scale), None);
        assert_eq!(likert_value(&RawCell::Empty, &scale), None);
    }

    #[test]
    fn unrecognized_values_are_counted_not_rejected() {
        let schema = Schema::new(
            FieldSet {
                id: "id".to_string(),
                likert: s(&["q1"]),
                flags: s(&["founder"]),
                ..FieldSet::default()
            },
            vec![],
        );
        let mut b = TableBuilder::new("t").headers(&s(&["id", "q1", "founder"]));
        b.add_row_simple(&s(&["1", "talvez", "depende"])).unwrap();
        b.add_row_simple(&s(&["2", "", ""])).unwrap();
        let res = run(&b.build(), &schema, &CleaningRules::DEFAULT_RULES);
        assert_eq!(res.respondents.len(), 2);
        assert_eq!(res.stats.unrecognized_likert, 1);
        assert_eq!(res.stats.unrecognized_flags, 1);
        assert_eq!(res.respondents[0].likert["q1"], None);
        assert_eq!(res.respondents[0].flags["founder"], None);
        // An empty box is unchecked.
        assert_eq!(res.respondents[1].flags["founder"], Some(false));
    }

    #[test]
    fn flags_from_tokens_and_options() {
        let tokens = BooleanTokens::standard();
        assert_eq!(flag_value(&RawCell::Text("Sim".into()), None, &tokens), Some(true));
        assert_eq!(flag_value(&RawCell::Text("Não".into()), None, &tokens), Some(false));
        assert_eq!(flag_value(&RawCell::Empty, None, &tokens), Some(false));
        assert_eq!(flag_value(&RawCell::Number(1.0), None, &tokens), Some(true));
        assert_eq!(flag_value(&RawCell::Number(3.0), None, &tokens), None);
        assert_eq!(
            flag_value(&RawCell::Text("Abrir negócio".into()), Some("Abrir negócio"), &tokens),
            Some(true)
        );
        assert_eq!(flag_value(&RawCell::Text("Abrir negócio".into()), None, &tokens), None);
    }

    #[test]
    fn decomposed_answers_are_recognized() {
        let tokens = BooleanTokens::standard();
        // "Não" written with a combining tilde.
        assert_eq!(flag_value(&RawCell::Text("Na\u{303}o".into()), None, &tokens), Some(false));
        assert_eq!(
            flag_value(&RawCell::Text("Abrir nego\u{301}cio".into()), Some("Abrir negócio"), &tokens),
            Some(true)
        );
        let scale = LikertScale::new(
            &[("Péssimo".to_string(), 1), ("Ótimo".to_string(), 5)],
            1,
            5,
        );
        assert_eq!(likert_value(&RawCell::Text("Pe\u{301}ssimo".into()), &scale), Some(1));
        assert_eq!(likert_value(&RawCell::Text("O\u{301}TIMO".into()), &scale), Some(5));
        assert_eq!(
            profile_value(&RawCell::Text("Egresso(a) / formado".into()), &Lookups::standard()),
            Some(Profile::Alumnus)
        );
        assert_eq!(
            teaching_model_value(&RawCell::Text("A dista\u{302}ncia".into()), &Lookups::standard()),
            Some(TeachingModel::Remote)
        );
    }

    #[test]
    fn checkbox_columns_from_two_row_header() {
        let schema = Schema::new(
            FieldSet {
                id: "respondent_id".to_string(),
                flags: s(&["conceito_abrir"]),
                ..FieldSet::default()
            },
            vec![],
        );
        let mapping = HeaderMapping::new(vec![MappingEntry {
            original: "Conceito - Abrir negócio".to_string(),
            canonical: "conceito_abrir".to_string(),
            label: None,
            class: None,
        }]);
        let mut b = TableBuilder::new("t")
            .two_row_headers(&s(&["respondent_id", "Conceito", ""]), &s(&["", "Abrir negócio", "Impacto social"]));
        b.add_row_simple(&s(&["1", "Abrir negócio", ""])).unwrap();
        b.add_row_simple(&s(&["2", "", "Impacto social"])).unwrap();
        let res = clean_table(
            &b.build(),
            Some(&mapping),
            &schema,
            &Lookups::standard(),
            &CleaningRules::DEFAULT_RULES,
        )
        .unwrap();
        assert_eq!(res.respondents[0].flags["conceito_abrir"], Some(true));
        assert_eq!(res.respondents[1].flags["conceito_abrir"], Some(false));
    }

    #[test]
    fn categories_and_dates() {
        let lookups = Lookups::standard();
        assert_eq!(
            profile_value(&RawCell::Text("ALUNO(A) ATUAL".into()), &lookups),
            Some(Profile::Student)
        );
        assert_eq!(
            profile_value(&RawCell::Text("Ex-aluno / egresso".into()), &lookups),
            Some(Profile::Alumnus)
        );
        assert_eq!(profile_value(&RawCell::Text("Professor".into()), &lookups), None);
        assert_eq!(
            teaching_model_value(&RawCell::Text("Semipresencial".into()), &lookups),
            Some(TeachingModel::Hybrid)
        );
        assert_eq!(
            teaching_model_value(&RawCell::Text("Presencial".into()), &lookups),
            Some(TeachingModel::InPerson)
        );
        assert_eq!(
            teaching_model_value(&RawCell::Text("EaD".into()), &lookups),
            Some(TeachingModel::Remote)
        );
        assert_eq!(age_value(&RawCell::Text("20 anos".into())), Some(20));
        assert_eq!(age_value(&RawCell::Number(0.0)), None);
        assert_eq!(entry_year_value(&RawCell::Text("2019/1".into())), Some(2019));
        assert_eq!(entry_year_value(&RawCell::Number(1850.0)), None);
        assert_eq!(
            date_value(&RawCell::Text("18/10/2026 10:30".into())),
            NaiveDate::from_ymd_opt(2026, 10, 18)
        );
        assert_eq!(date_value(&RawCell::Text("yesterday".into())), None);
    }

    #[test]
    fn selections_are_split_and_deduplicated() {
        let cell = RawCell::Text("Falta de tempo, Custo,  ,Falta de tempo".into());
        assert_eq!(
            split_selections(&cell, ','),
            s(&["Falta de tempo", "Custo"])
        );
        assert!(split_selections(&RawCell::Empty, ',').is_empty());
    }

    fn index_fixture() -> (IndexDefinition, Respondent) {
        let def = IndexDefinition {
            name: "infra".to_string(),
            scale: IndexScale::Unit,
            components: vec![
                IndexComponent::new("library", 1.0),
                IndexComponent::new("labs", 3.0),
            ],
        };
        let mut r = Respondent::new("1");
        r.likert.insert("library".to_string(), Some(5));
        r.likert.insert("labs".to_string(), Some(3));
        (def, r)
    }

    #[test]
    fn index_is_weighted_mean() {
        let (def, r) = index_fixture();
        let scale = LikertScale::agreement();
        let v = compute_index(&def, &r, &scale, MissingComponentPolicy::Exclude).unwrap();
        // (1 * 1.0 + 3 * 0.5) / 4
        assert!((v - 0.625).abs() < 1e-12);
        let again = compute_index(&def, &r, &scale, MissingComponentPolicy::Exclude).unwrap();
        assert_eq!(v.to_bits(), again.to_bits());
    }

    #[test]
    fn index_missing_policies() {
        let (def, mut r) = index_fixture();
        r.likert.insert("labs".to_string(), None);
        let scale = LikertScale::agreement();
        assert_eq!(
            compute_index(&def, &r, &scale, MissingComponentPolicy::Exclude),
            None
        );
        let v = compute_index(&def, &r, &scale, MissingComponentPolicy::NeutralDefault).unwrap();
        assert!((v - (1.0 + 3.0 * 0.5) / 4.0).abs() < 1e-12);
    }

    #[test]
    fn risk_index_with_inverted_and_selection_components() {
        let def = IndexDefinition {
            name: "dropout_risk".to_string(),
            scale: IndexScale::Percent,
            components: vec![
                IndexComponent::new("evasao_motivos", 1.0),
                IndexComponent::new("apoio", 1.0).inverted(),
                IndexComponent {
                    option: Some("financeiro".to_string()),
                    ..IndexComponent::new("evasao_motivos", 2.0)
                },
            ],
        };
        let mut r = Respondent::new("1");
        r.likert.insert("apoio".to_string(), Some(1));
        r.selections.insert(
            "evasao_motivos".to_string(),
            s(&["Financeiro", "Distância"]),
        );
        let v = compute_index(&def, &r, &LikertScale::agreement(), MissingComponentPolicy::Exclude);
        assert_eq!(v, Some(100.0));
    }

    #[test]
    fn indices_are_filled_after_cleaning() {
        let schema = Schema::new(
            FieldSet {
                id: "id".to_string(),
                likert: s(&["a", "b"]),
                ..FieldSet::default()
            },
            vec![IndexDefinition {
                name: "ab".to_string(),
                scale: IndexScale::Percent,
                components: vec![IndexComponent::new("a", 1.0), IndexComponent::new("b", 1.0)],
            }],
        );
        let mut b = TableBuilder::new("t").headers(&s(&["id", "a", "b"]));
        b.add_row_simple(&s(&["1", "5", "1"])).unwrap();
        b.add_row_simple(&s(&["2", "5", ""])).unwrap();
        let res = run(&b.build(), &schema, &CleaningRules::DEFAULT_RULES);
        assert_eq!(res.respondents[0].indices["ab"], Some(50.0));
        assert_eq!(res.respondents[1].indices["ab"], None);
    }

    #[test]
    fn schema_validation() {
        let mut schema = example_schema();
        schema.indices.push(IndexDefinition {
            name: "bad".to_string(),
            scale: IndexScale::Unit,
            components: vec![IndexComponent::new("age", 1.0)],
        });
        assert!(matches!(schema.validate(), Err(CleaningErrors::InvalidSchema(_))));

        let mut schema = example_schema();
        schema.indices.push(IndexDefinition {
            name: "zero".to_string(),
            scale: IndexScale::Unit,
            components: vec![IndexComponent::new("likert", 0.0)],
        });
        assert!(schema.validate().is_err());

        let mut schema = example_schema();
        schema.fields.flags.push("likert".to_string());
        assert!(schema.validate().is_err());

        assert!(example_schema().validate().is_ok());
    }

    #[test]
    fn fields_absent_from_input_are_missing() {
        let schema = Schema::new(
            FieldSet {
                id: "id".to_string(),
                course: Some("curso".to_string()),
                likert: s(&["q1"]),
                flags: s(&["f1"]),
                multi_select: s(&["m1"]),
                ..FieldSet::default()
            },
            vec![],
        );
        let mut b = TableBuilder::new("t").headers(&s(&["id"]));
        b.add_row_simple(&s(&["1"])).unwrap();
        let res = run(&b.build(), &schema, &CleaningRules::DEFAULT_RULES);
        let r = &res.respondents[0];
        assert_eq!(r.course, None);
        assert_eq!(r.likert["q1"], None);
        assert_eq!(r.flags["f1"], None);
        assert!(r.selections["m1"].is_empty());
    }
}
