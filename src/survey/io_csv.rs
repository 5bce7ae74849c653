// Primitives for reading CSV files.

use log::debug;

use crate::survey::{io_common::build_table, *};

pub fn read_csv_table(path: &str, cfs: &FileSource) -> SurveyResult<RawTable> {
    let header_rows = cfs.header_row_count()?;
    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(cfs.delimiter_byte()?)
        .from_path(path)
        .context(OpeningCsvSnafu { path })?;

    let mut rows: Vec<Vec<RawCell>> = Vec::new();
    for (idx, line_r) in rdr.into_records().enumerate() {
        let lineno = idx + 1;
        let line = line_r.context(CsvLineParseSnafu { path, lineno })?;
        let row: Vec<RawCell> = line
            .iter()
            .map(|s| {
                if s.is_empty() {
                    RawCell::Empty
                } else {
                    RawCell::Text(s.to_string())
                }
            })
            .collect();
        debug!("read_csv_table: lineno: {:?} row: {:?}", lineno, &row);
        rows.push(row);
    }
    build_table(path, header_rows, rows)
}
