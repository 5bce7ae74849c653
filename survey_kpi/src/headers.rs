use log::{debug, warn};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Answers of the second header row that do not name an option.
const GENERIC_DETAILS: [&str; 5] = [
    "response",
    "open-ended response",
    "resposta",
    "resposta aberta",
    "resposta unica",
];

/// Longest technical name produced by `slugify`.
const MAX_SLUG_LEN: usize = 120;

/// Lower case, trimmed text without diacritics. All the lookups on free text
/// are done on this form.
///
/// Composed and decomposed spellings fold to the same text.
pub fn fold_text(s: &str) -> String {
    s.replace('\u{feff}', "")
        .trim()
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// A stable technical name for a free-text header: snake case, ASCII only.
pub fn slugify(text: &str) -> String {
    let folded = fold_text(text);
    let mut res = String::new();
    let mut pending_sep = false;
    for c in folded.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !res.is_empty() {
                res.push('_');
            }
            pending_sep = false;
            res.push(c);
        } else if c == '"' || c == '\'' || c == '“' || c == '”' || c == '‘' || c == '’' {
            // Quotes disappear without splitting words.
        } else {
            pending_sep = true;
        }
    }
    res.chars().take(MAX_SLUG_LEN).collect::<String>().trim_end_matches('_').to_string()
}

/// Builds one name per column out of the two header rows of a survey export.
///
/// The first row holds the question, which is only written on the first
/// column when the question spans several answer options. The second row
/// holds the option. Returns the names and the option of each column.
pub fn consolidate_headers(
    questions: &[String],
    details: Option<&[String]>,
) -> (Vec<String>, Vec<Option<String>>) {
    let width = questions
        .len()
        .max(details.map(|d| d.len()).unwrap_or(0));
    let mut names: Vec<String> = Vec::with_capacity(width);
    let mut options: Vec<Option<String>> = Vec::with_capacity(width);
    let mut last_question: Option<String> = None;

    for idx in 0..width {
        let q = questions
            .get(idx)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        if q.is_some() {
            last_question = q.clone();
        }
        let question = q.or_else(|| {
            // Only inherit the question on two-row headers: merged cells.
            details.and(last_question.clone())
        });
        let detail = details
            .and_then(|d| d.get(idx))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty() && !GENERIC_DETAILS.contains(&fold_text(s).as_str()));

        let (name, option) = match (question, detail) {
            (Some(q), Some(d)) => (format!("{} - {}", q, d), Some(d)),
            (Some(q), None) => (q, None),
            (None, Some(d)) => (d.clone(), Some(d)),
            (None, None) => (format!("column_{}", idx + 1), None),
        };
        names.push(name);
        options.push(option);
    }

    // Same convention as the usual dataframe readers: name, name.1, name.2
    let mut unique_names: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        let mut candidate = name.clone();
        let mut suffix = 1;
        while unique_names.contains(&candidate) {
            candidate = format!("{}.{}", name, suffix);
            suffix += 1;
        }
        if candidate != name {
            debug!("consolidate_headers: renamed duplicate header {:?} to {:?}", name, candidate);
        }
        unique_names.push(candidate);
    }
    (unique_names, options)
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct MappingEntry {
    pub original: String,
    pub canonical: String,
    /// Public label, for reports.
    pub label: Option<String>,
    pub class: Option<String>,
}

/// The explicit mapping from the raw header text to the canonical field name.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct HeaderMapping {
    entries: Vec<MappingEntry>,
}

impl HeaderMapping {
    pub fn new(entries: Vec<MappingEntry>) -> HeaderMapping {
        let mut kept: Vec<MappingEntry> = Vec::with_capacity(entries.len());
        for e in entries {
            if e.original.trim().is_empty() || e.canonical.trim().is_empty() {
                warn!("HeaderMapping: skipping incomplete entry {:?}", e);
                continue;
            }
            if kept.iter().any(|k| k.original == e.original) {
                warn!(
                    "HeaderMapping: header {:?} is mapped twice, keeping the first one",
                    e.original
                );
                continue;
            }
            kept.push(e);
        }
        HeaderMapping { entries: kept }
    }

    /// The mapping used when no mapping file is provided: every header becomes
    /// its slug, with the header as label.
    pub fn inferred(headers: &[String]) -> HeaderMapping {
        HeaderMapping::new(
            headers
                .iter()
                .map(|h| MappingEntry {
                    original: h.clone(),
                    canonical: slugify(h),
                    label: Some(h.clone()),
                    class: None,
                })
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    /// The canonical name of a raw header, if it is mapped. The comparison
    /// ignores surrounding whitespace and the Unicode composition form.
    pub fn canonical(&self, raw: &str) -> Option<&str> {
        let raw = raw.trim();
        self.entries
            .iter()
            .find(|e| e.original.trim().nfc().eq(raw.nfc()))
            .map(|e| e.canonical.as_str())
    }

    pub fn label(&self, canonical: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.canonical == canonical)
            .and_then(|e| e.label.as_deref())
            .filter(|l| !l.is_empty())
    }

    pub fn class(&self, canonical: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.canonical == canonical)
            .and_then(|e| e.class.as_deref())
            .filter(|l| !l.is_empty())
    }

    /// Resolves all the headers of a table. Unmapped headers keep their own
    /// text as canonical name.
    pub fn resolve(&self, headers: &[String]) -> Vec<String> {
        headers
            .iter()
            .map(|h| {
                self.canonical(h)
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| h.trim().to_string())
            })
            .collect()
    }
}
