use calamine::DataType;
use log::debug;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::path::Path;

use survey_kpi::builder::TableBuilder;

use crate::survey::*;

pub fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| path.to_string())
}

/// Converts a serial date of a workbook (days since 1899-12-30) to a date.
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(Duration::milliseconds(millis))
}

pub fn cell_from_calamine(cell: &DataType) -> RawCell {
    match cell {
        DataType::Empty => RawCell::Empty,
        DataType::String(s) => RawCell::Text(s.clone()),
        DataType::Int(i) => RawCell::Number(*i as f64),
        DataType::Float(f) => RawCell::Number(*f),
        DataType::Bool(b) => RawCell::Bool(*b),
        DataType::DateTime(f) => match excel_serial_to_datetime(*f) {
            Some(dt) => RawCell::DateTime(dt),
            None => RawCell::Number(*f),
        },
        DataType::Error(e) => {
            debug!("cell_from_calamine: error cell {:?} read as empty", e);
            RawCell::Empty
        }
    }
}

/// Assembles a table out of the rows of a file: the header rows first, then
/// the responses. Fully empty rows are dropped.
pub fn build_table(path: &str, header_rows: usize, rows: Vec<Vec<RawCell>>) -> SurveyResult<RawTable> {
    ensure!(
        rows.len() >= header_rows,
        MissingHeaderSnafu {
            path,
            expected: header_rows,
            found: rows.len(),
        }
    );
    let header_text = |row: &[RawCell]| -> Vec<String> {
        row.iter()
            .map(|c| c.as_text().unwrap_or_default().replace('\u{feff}', ""))
            .collect()
    };
    let questions = header_text(&rows[0]);
    let builder = TableBuilder::new(&simplify_file_name(path));
    let mut builder = if header_rows == 2 {
        builder.two_row_headers(&questions, &header_text(&rows[1]))
    } else {
        builder.headers(&questions)
    };
    debug!("build_table: {}: headers: {:?}", path, builder.width());

    for (idx, row) in rows.into_iter().enumerate().skip(header_rows) {
        if row.iter().all(|c| c.is_blank()) {
            debug!("build_table: {}: row {} is empty, skipping", path, idx + 1);
            continue;
        }
        builder.add_row(row).context(CleaningSnafu {})?;
    }
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_dates() {
        let dt = excel_serial_to_datetime(45000.5).unwrap();
        assert_eq!(dt.date(), NaiveDate::from_ymd_opt(2023, 3, 15).unwrap());
        assert_eq!(dt.format("%H:%M").to_string(), "12:00");
        assert_eq!(excel_serial_to_datetime(-1.0), None);
    }

    #[test]
    fn calamine_cells() {
        assert_eq!(cell_from_calamine(&DataType::Int(3)), RawCell::Number(3.0));
        assert_eq!(
            cell_from_calamine(&DataType::String("Sim".to_string())),
            RawCell::Text("Sim".to_string())
        );
        assert!(matches!(
            cell_from_calamine(&DataType::DateTime(45000.0)),
            RawCell::DateTime(_)
        ));
        assert_eq!(cell_from_calamine(&DataType::Empty), RawCell::Empty);
    }

    #[test]
    fn tables_from_rows() {
        let t = |s: &str| RawCell::Text(s.to_string());
        let rows = vec![
            vec![t("\u{feff}respondent_id"), t("Conceito"), RawCell::Empty],
            vec![RawCell::Empty, t("Abrir negócio"), t("Impacto social")],
            vec![RawCell::Number(1.0), t("Abrir negócio"), RawCell::Empty],
            vec![RawCell::Empty, RawCell::Empty, RawCell::Empty],
        ];
        let table = build_table("dir/survey.csv", 2, rows).unwrap();
        assert_eq!(table.source, "survey.csv");
        assert_eq!(
            table.headers,
            vec![
                "respondent_id",
                "Conceito - Abrir negócio",
                "Conceito - Impacto social"
            ]
        );
        assert_eq!(table.rows.len(), 1);

        let err = build_table("a.csv", 2, vec![vec![t("id")]]).unwrap_err();
        assert!(matches!(err, SurveyError::MissingHeader { found: 1, .. }));
    }
}
