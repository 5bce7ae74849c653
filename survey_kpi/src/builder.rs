pub use crate::config::*;
use crate::headers::consolidate_headers;

/// A builder for raw tables.
///
/// The readers of the command line program use it, and it is the simplest
/// way to feed responses that are already in memory.
///
/// ```
/// pub use survey_kpi::builder::TableBuilder;
/// pub use survey_kpi::*;
///
/// let mut builder = TableBuilder::new("in memory").two_row_headers(
///     &["respondent_id".to_string(), "Idade".to_string()],
///     &["".to_string(), "Response".to_string()],
/// );
/// builder.add_row_simple(&["1".to_string(), "20".to_string()])?;
/// let table = builder.build();
/// assert_eq!(table.headers, vec!["respondent_id", "Idade"]);
///
/// # Ok::<(), CleaningErrors>(())
/// ```
pub struct TableBuilder {
    pub(crate) _source: String,
    pub(crate) _headers: Vec<String>,
    pub(crate) _options: Vec<Option<String>>,
    pub(crate) _rows: Vec<Vec<RawCell>>,
}

impl TableBuilder {
    pub fn new(source: &str) -> TableBuilder {
        TableBuilder {
            _source: source.to_string(),
            _headers: Vec::new(),
            _options: Vec::new(),
            _rows: Vec::new(),
        }
    }

    /// Single header row: the names are used as they are.
    pub fn headers(self, names: &[String]) -> TableBuilder {
        let (headers, options) = consolidate_headers(names, None);
        TableBuilder {
            _headers: headers,
            _options: options,
            ..self
        }
    }

    /// Two header rows: questions, then answer options.
    pub fn two_row_headers(self, questions: &[String], details: &[String]) -> TableBuilder {
        let (headers, options) = consolidate_headers(questions, Some(details));
        TableBuilder {
            _headers: headers,
            _options: options,
            ..self
        }
    }

    pub fn width(&self) -> usize {
        self._headers.len()
    }

    /// Adds a row of text cells. Empty strings are empty cells.
    pub fn add_row_simple(&mut self, cells: &[String]) -> Result<(), CleaningErrors> {
        let row = cells
            .iter()
            .map(|s| {
                if s.is_empty() {
                    RawCell::Empty
                } else {
                    RawCell::Text(s.clone())
                }
            })
            .collect();
        self.add_row(row)
    }

    /// Adds a row. Short rows are padded with empty cells; rows longer than
    /// the header are rejected unless the extra cells are empty.
    pub fn add_row(&mut self, mut cells: Vec<RawCell>) -> Result<(), CleaningErrors> {
        let width = self.width();
        if cells.len() > width {
            if cells[width..].iter().all(|c| c.is_blank()) {
                cells.truncate(width);
            } else {
                return Err(CleaningErrors::MalformedRow {
                    source: self._source.clone(),
                    row: self._rows.len() + 1,
                    reason: format!("{} cells for {} columns", cells.len(), width),
                });
            }
        }
        cells.resize(width, RawCell::Empty);
        self._rows.push(cells);
        Ok(())
    }

    pub fn build(self) -> RawTable {
        RawTable {
            source: self._source,
            headers: self._headers,
            options: self._options,
            rows: self._rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_padded_and_checked() {
        let mut b = TableBuilder::new("t").headers(&["a".to_string(), "b".to_string()]);
        b.add_row(vec![RawCell::Text("1".to_string())]).unwrap();
        b.add_row(vec![
            RawCell::Text("2".to_string()),
            RawCell::Empty,
            RawCell::Text(" ".to_string()),
        ])
        .unwrap();
        let err = b
            .add_row(vec![RawCell::Empty, RawCell::Empty, RawCell::Number(3.0)])
            .unwrap_err();
        assert!(matches!(err, CleaningErrors::MalformedRow { row: 3, .. }));
        let t = b.build();
        assert_eq!(t.rows.len(), 2);
        assert_eq!(t.rows[0], vec![RawCell::Text("1".to_string()), RawCell::Empty]);
        assert_eq!(t.rows[1].len(), 2);
    }
}
