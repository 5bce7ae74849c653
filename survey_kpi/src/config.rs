// ********* Input data structures ***********

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::Display;

use chrono::{NaiveDate, NaiveDateTime};

/// The content of one cell, as read from a spreadsheet or a delimited file.
#[derive(PartialEq, Debug, Clone)]
pub enum RawCell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl RawCell {
    /// The text of the cell, trimmed. Numbers are rendered without a decimal
    /// part when they are integral.
    pub fn as_text(&self) -> Option<String> {
        match self {
            RawCell::Empty => None,
            RawCell::Text(s) if s.trim().is_empty() => None,
            RawCell::Text(s) => Some(s.trim().to_string()),
            RawCell::Number(f) if f.fract() == 0.0 && f.abs() < 1e15 => {
                Some(format!("{}", *f as i64))
            }
            RawCell::Number(f) => Some(f.to_string()),
            RawCell::Bool(b) => Some(b.to_string()),
            RawCell::DateTime(dt) => Some(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.as_text().is_none()
    }
}

/// A table of responses with its headers already consolidated to one name
/// per column.
#[derive(PartialEq, Debug, Clone)]
pub struct RawTable {
    /// Where the table comes from (file name), used in messages.
    pub source: String,
    pub headers: Vec<String>,
    /// The answer option carried by the second header row, if any.
    pub options: Vec<Option<String>>,
    pub rows: Vec<Vec<RawCell>>,
}

impl RawTable {
    pub fn cell(&self, row: usize, col: usize) -> &RawCell {
        static EMPTY: RawCell = RawCell::Empty;
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY)
    }

    pub fn option(&self, col: usize) -> Option<&str> {
        self.options.get(col).and_then(|o| o.as_deref())
    }
}

// ******** Cleaned data structures *********

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum Profile {
    Student,
    Alumnus,
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Student => "student",
            Profile::Alumnus => "alumnus",
        }
    }

    pub fn parse(s: &str) -> Option<Profile> {
        match s {
            "student" => Some(Profile::Student),
            "alumnus" => Some(Profile::Alumnus),
            _ => None,
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum TeachingModel {
    InPerson,
    Remote,
    Hybrid,
}

impl TeachingModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeachingModel::InPerson => "in_person",
            TeachingModel::Remote => "remote",
            TeachingModel::Hybrid => "hybrid",
        }
    }

    pub fn parse(s: &str) -> Option<TeachingModel> {
        match s {
            "in_person" => Some(TeachingModel::InPerson),
            "remote" => Some(TeachingModel::Remote),
            "hybrid" => Some(TeachingModel::Hybrid),
            _ => None,
        }
    }
}

/// One survey participant after cleaning.
///
/// Every field declared by the schema has an entry in the maps, even when the
/// corresponding column was not found in the input.
#[derive(PartialEq, Debug, Clone)]
pub struct Respondent {
    pub id: String,
    pub profile: Option<Profile>,
    pub age: Option<u32>,
    pub course: Option<String>,
    pub institution: Option<String>,
    pub teaching_model: Option<TeachingModel>,
    pub entry_year: Option<i32>,
    pub submitted_at: Option<NaiveDate>,
    pub likert: BTreeMap<String, Option<u8>>,
    pub flags: BTreeMap<String, Option<bool>>,
    pub selections: BTreeMap<String, Vec<String>>,
    pub indices: BTreeMap<String, Option<f64>>,
}

impl Respondent {
    pub fn new(id: &str) -> Respondent {
        Respondent {
            id: id.to_string(),
            profile: None,
            age: None,
            course: None,
            institution: None,
            teaching_model: None,
            entry_year: None,
            submitted_at: None,
            likert: BTreeMap::new(),
            flags: BTreeMap::new(),
            selections: BTreeMap::new(),
            indices: BTreeMap::new(),
        }
    }
}

/// Counters gathered while cleaning.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct CleaningStats {
    pub total_rows: usize,
    pub missing_id_rows: usize,
    pub duplicate_rows: usize,
    pub unique_respondents: usize,
    pub unrecognized_likert: usize,
    pub unrecognized_flags: usize,
    pub unrecognized_categories: usize,
}

#[derive(PartialEq, Debug, Clone)]
pub struct CleaningResult {
    pub respondents: Vec<Respondent>,
    pub stats: CleaningStats,
}

/// Errors that prevent the cleaning from producing any record.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum CleaningErrors {
    /// The identifier column could not be found in one of the tables.
    MissingIdColumn { column: String, source: String },
    /// A row does not fit in its table.
    MalformedRow {
        source: String,
        row: usize,
        reason: String,
    },
    InvalidSchema(String),
}

impl Error for CleaningErrors {}

impl Display for CleaningErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CleaningErrors::MissingIdColumn { column, source } => write!(
                f,
                "required identifier column '{}' not found in {}",
                column, source
            ),
            CleaningErrors::MalformedRow {
                source,
                row,
                reason,
            } => write!(f, "malformed row {} in {}: {}", row, source, reason),
            CleaningErrors::InvalidSchema(reason) => write!(f, "invalid schema: {}", reason),
        }
    }
}

// ********* Configuration **********

/// Which row is kept when several rows share an identifier.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum DuplicatePolicy {
    KeepFirst,
    KeepLast,
}

/// What happens to a composite index when one of its components is missing.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum MissingComponentPolicy {
    /// The index is missing for this respondent.
    Exclude,
    /// The missing component counts as the middle of its range (0.5).
    NeutralDefault,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct CleaningRules {
    pub duplicate_policy: DuplicatePolicy,
    pub missing_component_policy: MissingComponentPolicy,
    pub multi_select_delimiter: char,
}

impl CleaningRules {
    pub const DEFAULT_RULES: CleaningRules = CleaningRules {
        duplicate_policy: DuplicatePolicy::KeepFirst,
        missing_component_policy: MissingComponentPolicy::Exclude,
        multi_select_delimiter: ',',
    };
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum IndexScale {
    /// Between 0 and 1.
    Unit,
    /// Between 0 and 100.
    Percent,
}

impl IndexScale {
    pub fn factor(&self) -> f64 {
        match self {
            IndexScale::Unit => 1.0,
            IndexScale::Percent => 100.0,
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct IndexComponent {
    pub field: String,
    pub weight: f64,
    /// Uses 1 - x instead of x. A high satisfaction lowers a risk.
    pub invert: bool,
    /// Only for multi-select fields: the answer that counts as 1. Without it,
    /// any answer counts as 1.
    pub option: Option<String>,
}

impl IndexComponent {
    pub fn new(field: &str, weight: f64) -> IndexComponent {
        IndexComponent {
            field: field.to_string(),
            weight,
            invert: false,
            option: None,
        }
    }

    pub fn inverted(self) -> IndexComponent {
        IndexComponent {
            invert: true,
            ..self
        }
    }
}

/// A composite index: the weighted mean of its normalized components.
#[derive(PartialEq, Debug, Clone)]
pub struct IndexDefinition {
    pub name: String,
    pub scale: IndexScale,
    pub components: Vec<IndexComponent>,
}

/// The fields to extract. Names are canonical field names, after header
/// mapping.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct FieldSet {
    pub id: String,
    pub profile: Option<String>,
    pub age: Option<String>,
    pub course: Option<String>,
    pub institution: Option<String>,
    pub teaching_model: Option<String>,
    pub entry_year: Option<String>,
    pub submitted_at: Option<String>,
    pub likert: Vec<String>,
    pub flags: Vec<String>,
    pub multi_select: Vec<String>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Schema {
    pub fields: FieldSet,
    pub indices: Vec<IndexDefinition>,
}

impl Schema {
    pub fn new(fields: FieldSet, indices: Vec<IndexDefinition>) -> Schema {
        Schema { fields, indices }
    }

    /// The role fields, in export order, with their name when declared.
    pub(crate) fn role_fields(&self) -> Vec<(&'static str, Option<&str>)> {
        let f = &self.fields;
        vec![
            ("profile", f.profile.as_deref()),
            ("age", f.age.as_deref()),
            ("course", f.course.as_deref()),
            ("institution", f.institution.as_deref()),
            ("teaching_model", f.teaching_model.as_deref()),
            ("entry_year", f.entry_year.as_deref()),
            ("submitted_at", f.submitted_at.as_deref()),
        ]
    }

    /// Checks the consistency of the schema. It does not look at any data.
    pub fn validate(&self) -> Result<(), CleaningErrors> {
        let f = &self.fields;
        if f.id.trim().is_empty() {
            return Err(CleaningErrors::InvalidSchema(
                "the identifier field name is empty".to_string(),
            ));
        }
        let mut seen: Vec<&str> = vec![f.id.as_str()];
        let declared = self
            .role_fields()
            .into_iter()
            .filter_map(|(_, n)| n)
            .chain(f.likert.iter().map(|s| s.as_str()))
            .chain(f.flags.iter().map(|s| s.as_str()))
            .chain(f.multi_select.iter().map(|s| s.as_str()));
        for name in declared {
            if seen.contains(&name) {
                return Err(CleaningErrors::InvalidSchema(format!(
                    "field '{}' is declared more than once",
                    name
                )));
            }
            seen.push(name);
        }

        let mut index_names: Vec<&str> = vec![];
        for def in self.indices.iter() {
            if index_names.contains(&def.name.as_str()) {
                return Err(CleaningErrors::InvalidSchema(format!(
                    "index '{}' is declared more than once",
                    def.name
                )));
            }
            index_names.push(def.name.as_str());
            if def.components.is_empty() {
                return Err(CleaningErrors::InvalidSchema(format!(
                    "index '{}' has no component",
                    def.name
                )));
            }
            for c in def.components.iter() {
                if !(c.weight.is_finite() && c.weight > 0.0) {
                    return Err(CleaningErrors::InvalidSchema(format!(
                        "index '{}': weight of '{}' must be positive, got {}",
                        def.name, c.field, c.weight
                    )));
                }
                let is_multi = f.multi_select.contains(&c.field);
                let known = is_multi || f.likert.contains(&c.field) || f.flags.contains(&c.field);
                if !known {
                    return Err(CleaningErrors::InvalidSchema(format!(
                        "index '{}': component '{}' is not a likert, flag or multi-select field",
                        def.name, c.field
                    )));
                }
                if c.option.is_some() && !is_multi {
                    return Err(CleaningErrors::InvalidSchema(format!(
                        "index '{}': component '{}' has an option but is not a multi-select field",
                        def.name, c.field
                    )));
                }
            }
        }
        Ok(())
    }
}

// ********* Lookup tables **********

/// Maps the answers of an agreement scale to integers.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct LikertScale {
    /// Folded label -> value.
    pub(crate) labels: Vec<(String, u8)>,
    pub min: u8,
    pub max: u8,
}

impl LikertScale {
    pub fn new(labels: &[(String, u8)], min: u8, max: u8) -> LikertScale {
        LikertScale {
            labels: labels
                .iter()
                .map(|(l, v)| (crate::fold_text(l), *v))
                .collect(),
            min,
            max,
        }
    }

    /// Five points, from "strongly disagree" (1) to "strongly agree" (5).
    pub fn agreement() -> LikertScale {
        let labels: Vec<(String, u8)> = [
            ("Discordo totalmente", 1),
            ("Discordo plenamente", 1),
            ("Strongly disagree", 1),
            ("Discordo", 2),
            ("Discordo parcialmente", 2),
            ("Disagree", 2),
            ("Nem concordo nem discordo", 3),
            ("Neutro", 3),
            ("Indiferente", 3),
            ("Neither agree nor disagree", 3),
            ("Neutral", 3),
            ("Concordo", 4),
            ("Concordo parcialmente", 4),
            ("Agree", 4),
            ("Concordo totalmente", 5),
            ("Concordo plenamente", 5),
            ("Strongly agree", 5),
        ]
        .iter()
        .map(|(l, v)| (l.to_string(), *v))
        .collect();
        LikertScale::new(&labels, 1, 5)
    }

    pub fn contains(&self, value: i64) -> bool {
        value >= self.min as i64 && value <= self.max as i64
    }

    /// Normalizes a value of the scale to [0, 1].
    pub fn normalize(&self, value: u8) -> f64 {
        if self.max <= self.min {
            return 0.5;
        }
        (value.saturating_sub(self.min)) as f64 / (self.max - self.min) as f64
    }
}

/// The tokens understood as a checked or unchecked box.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct BooleanTokens {
    pub(crate) affirmative: Vec<String>,
    pub(crate) negative: Vec<String>,
}

impl BooleanTokens {
    pub fn new(affirmative: &[String], negative: &[String]) -> BooleanTokens {
        BooleanTokens {
            affirmative: affirmative.iter().map(|s| crate::fold_text(s)).collect(),
            negative: negative.iter().map(|s| crate::fold_text(s)).collect(),
        }
    }

    pub fn standard() -> BooleanTokens {
        let aff: Vec<String> = [
            "sim", "s", "yes", "y", "x", "true", "1", "checked", "marcado",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let neg: Vec<String> = ["nao", "n", "no", "false", "0", "unchecked"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        BooleanTokens::new(&aff, &neg)
    }
}

/// All the tables used to interpret free text. They are passed explicitly to
/// the cleaning functions.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Lookups {
    pub likert: LikertScale,
    pub booleans: BooleanTokens,
    /// Substrings of the folded text, tried in order.
    pub profiles: Vec<(String, Profile)>,
    pub teaching_models: Vec<(String, TeachingModel)>,
}

impl Lookups {
    pub fn standard() -> Lookups {
        let profiles = [
            ("egress", Profile::Alumnus),
            ("ex-aluno", Profile::Alumnus),
            ("ex aluno", Profile::Alumnus),
            ("formado", Profile::Alumnus),
            ("alumn", Profile::Alumnus),
            ("graduate", Profile::Alumnus),
            ("aluno", Profile::Student),
            ("estudante", Profile::Student),
            ("student", Profile::Student),
        ]
        .iter()
        .map(|(s, p)| (s.to_string(), *p))
        .collect();
        let teaching_models = [
            ("hibrid", TeachingModel::Hybrid),
            ("hybrid", TeachingModel::Hybrid),
            ("semipresencial", TeachingModel::Hybrid),
            ("distancia", TeachingModel::Remote),
            ("ead", TeachingModel::Remote),
            ("remot", TeachingModel::Remote),
            ("online", TeachingModel::Remote),
            ("presencial", TeachingModel::InPerson),
            ("in person", TeachingModel::InPerson),
            ("in-person", TeachingModel::InPerson),
            ("on-site", TeachingModel::InPerson),
        ]
        .iter()
        .map(|(s, t)| (s.to_string(), *t))
        .collect();
        Lookups {
            likert: LikertScale::agreement(),
            booleans: BooleanTokens::standard(),
            profiles,
            teaching_models,
        }
    }
}
