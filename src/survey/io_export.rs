// The export of the cleaned records, for BI tools.
//
// Two header rows: the column names, then the type of each column.

use chrono::NaiveDate;
use log::{debug, info, warn};

use crate::survey::*;

const SELECTION_SEPARATOR: &str = "|";
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
enum ColumnKind {
    Id,
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
    Index,
}

impl ColumnKind {
    fn type_hint(&self) -> &'static str {
        match self {
            ColumnKind::Id | ColumnKind::MultiSelect => "text",
            ColumnKind::Profile
            | ColumnKind::Course
            | ColumnKind::Institution
            | ColumnKind::TeachingModel => "categorical",
            ColumnKind::Age
            | ColumnKind::EntryYear
            | ColumnKind::Likert
            | ColumnKind::Flag
            | ColumnKind::Index => "numeric",
            ColumnKind::SubmittedAt => "date",
        }
    }
}

// The columns of the export, in order.
fn export_columns(schema: &Schema) -> Vec<(String, ColumnKind)> {
    let f = &schema.fields;
    let mut cols: Vec<(String, ColumnKind)> = vec![
        (f.id.clone(), ColumnKind::Id),
        ("profile".to_string(), ColumnKind::Profile),
        ("age".to_string(), ColumnKind::Age),
        ("course".to_string(), ColumnKind::Course),
        ("institution".to_string(), ColumnKind::Institution),
        ("teaching_model".to_string(), ColumnKind::TeachingModel),
        ("entry_year".to_string(), ColumnKind::EntryYear),
        ("submitted_at".to_string(), ColumnKind::SubmittedAt),
    ];
    cols.extend(f.likert.iter().map(|n| (n.clone(), ColumnKind::Likert)));
    cols.extend(f.flags.iter().map(|n| (n.clone(), ColumnKind::Flag)));
    cols.extend(
        f.multi_select
            .iter()
            .map(|n| (n.clone(), ColumnKind::MultiSelect)),
    );
    cols.extend(
        schema
            .indices
            .iter()
            .map(|d| (d.name.clone(), ColumnKind::Index)),
    );
    cols
}

fn opt<T: ToString>(x: &Option<T>) -> String {
    x.as_ref().map(|v| v.to_string()).unwrap_or_default()
}

fn export_value(r: &Respondent, name: &str, kind: ColumnKind) -> String {
    match kind {
        ColumnKind::Id => r.id.clone(),
        ColumnKind::Profile => r.profile.map(|p| p.as_str().to_string()).unwrap_or_default(),
        ColumnKind::Age => opt(&r.age),
        ColumnKind::Course => opt(&r.course),
        ColumnKind::Institution => opt(&r.institution),
        ColumnKind::TeachingModel => r
            .teaching_model
            .map(|t| t.as_str().to_string())
            .unwrap_or_default(),
        ColumnKind::EntryYear => opt(&r.entry_year),
        ColumnKind::SubmittedAt => r
            .submitted_at
            .map(|d| d.format(DATE_FORMAT).to_string())
            .unwrap_or_default(),
        ColumnKind::Likert => opt(&r.likert.get(name).cloned().flatten()),
        ColumnKind::Flag => match r.flags.get(name).cloned().flatten() {
            Some(true) => "1".to_string(),
            Some(false) => "0".to_string(),
            None => "".to_string(),
        },
        ColumnKind::MultiSelect => r
            .selections
            .get(name)
            .map(|l| l.join(SELECTION_SEPARATOR))
            .unwrap_or_default(),
        // The display of f64 is the shortest text that reads back to the same value.
        ColumnKind::Index => opt(&r.indices.get(name).cloned().flatten()),
    }
}

pub fn write_export(path: &str, respondents: &[Respondent], schema: &Schema) -> SurveyResult<()> {
    let columns = export_columns(schema);
    let mut wtr = csv::Writer::from_path(path).context(WritingExportSnafu { path })?;
    wtr.write_record(columns.iter().map(|(n, _)| n.as_str()))
        .context(WritingExportSnafu { path })?;
    wtr.write_record(columns.iter().map(|(_, k)| k.type_hint()))
        .context(WritingExportSnafu { path })?;
    for r in respondents.iter() {
        for (name, l) in r.selections.iter() {
            if l.iter().any(|s| s.contains(SELECTION_SEPARATOR)) {
                warn!(
                    "write_export: {}: an answer of {} contains {:?}, it will be split when read back",
                    r.id, name, SELECTION_SEPARATOR
                );
            }
        }
        let record: Vec<String> = columns
            .iter()
            .map(|(n, k)| export_value(r, n, *k))
            .collect();
        debug!("write_export: {:?}", record);
        wtr.write_record(&record).context(WritingExportSnafu { path })?;
    }
    wtr.flush().context(WritingFileSnafu { path })?;
    info!(
        "write_export: {}: {} records, {} columns",
        path,
        respondents.len(),
        columns.len()
    );
    Ok(())
}

fn parse_opt<T: std::str::FromStr>(path: &str, lineno: usize, column: &str, s: &str) -> SurveyResult<Option<T>> {
    if s.is_empty() {
        return Ok(None);
    }
    match s.parse::<T>() {
        Ok(v) => Ok(Some(v)),
        Err(_) => ReadingExportSnafu {
            path,
            message: format!("line {}: cannot read {:?} in column {}", lineno, s, column),
        }
        .fail(),
    }
}

fn parse_category<T>(
    path: &str,
    lineno: usize,
    column: &str,
    s: &str,
    parse: fn(&str) -> Option<T>,
) -> SurveyResult<Option<T>> {
    if s.is_empty() {
        return Ok(None);
    }
    match parse(s) {
        Some(v) => Ok(Some(v)),
        None => ReadingExportSnafu {
            path,
            message: format!("line {}: unknown value {:?} in column {}", lineno, s, column),
        }
        .fail(),
    }
}

/// Reads back an export written with the same schema.
pub fn read_export(path: &str, schema: &Schema) -> SurveyResult<Vec<Respondent>> {
    let columns = export_columns(schema);
    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .context(OpeningCsvSnafu { path })?;
    let mut records = rdr.into_records();

    let expected_names: Vec<&str> = columns.iter().map(|(n, _)| n.as_str()).collect();
    let expected_hints: Vec<&str> = columns.iter().map(|(_, k)| k.type_hint()).collect();
    for (lineno, expected) in [(1usize, &expected_names), (2usize, &expected_hints)] {
        let line = records
            .next()
            .context(ReadingExportSnafu {
                path,
                message: "missing header rows".to_string(),
            })?
            .context(CsvLineParseSnafu { path, lineno })?;
        let found: Vec<&str> = line.iter().collect();
        ensure!(
            found == *expected,
            ReadingExportSnafu {
                path,
                message: format!("header row {} is {:?}, expected {:?}", lineno, found, expected),
            }
        );
    }

    let mut res: Vec<Respondent> = Vec::new();
    for (idx, line_r) in records.enumerate() {
        let lineno = idx + 3;
        let line = line_r.context(CsvLineParseSnafu { path, lineno })?;
        let cell = |i: usize| line.get(i).unwrap_or("");
        let mut r = Respondent::new(cell(0));
        for (i, (name, kind)) in columns.iter().enumerate().skip(1) {
            let s = cell(i);
            match kind {
                ColumnKind::Id => {}
                ColumnKind::Profile => {
                    r.profile = parse_category(path, lineno, name, s, Profile::parse)?
                }
                ColumnKind::Age => r.age = parse_opt(path, lineno, name, s)?,
                ColumnKind::Course => r.course = Some(s.to_string()).filter(|s| !s.is_empty()),
                ColumnKind::Institution => {
                    r.institution = Some(s.to_string()).filter(|s| !s.is_empty())
                }
                ColumnKind::TeachingModel => {
                    r.teaching_model =
                        parse_category(path, lineno, name, s, TeachingModel::parse)?
                }
                ColumnKind::EntryYear => r.entry_year = parse_opt(path, lineno, name, s)?,
                ColumnKind::SubmittedAt => {
                    r.submitted_at = if s.is_empty() {
                        None
                    } else {
                        match NaiveDate::parse_from_str(s, DATE_FORMAT) {
                            Ok(d) => Some(d),
                            Err(_) => {
                                return ReadingExportSnafu {
                                    path,
                                    message: format!("line {}: bad date {:?}", lineno, s),
                                }
                                .fail()
                            }
                        }
                    }
                }
                ColumnKind::Likert => {
                    r.likert.insert(name.clone(), parse_opt(path, lineno, name, s)?);
                }
                ColumnKind::Flag => {
                    let v = parse_category(path, lineno, name, s, |x: &str| match x {
                        "1" => Some(true),
                        "0" => Some(false),
                        _ => None,
                    })?;
                    r.flags.insert(name.clone(), v);
                }
                ColumnKind::MultiSelect => {
                    let l: Vec<String> = if s.is_empty() {
                        vec![]
                    } else {
                        s.split(SELECTION_SEPARATOR).map(|x| x.to_string()).collect()
                    };
                    r.selections.insert(name.clone(), l);
                }
                ColumnKind::Index => {
                    r.indices.insert(name.clone(), parse_opt(path, lineno, name, s)?);
                }
            }
        }
        res.push(r);
    }
    debug!("read_export: {}: {} records", path, res.len());
    Ok(res)
}
