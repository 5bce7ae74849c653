// Primitives for reading Excel workbooks.

use calamine::{open_workbook, DataType, Range, Reader, Xlsx};
use log::{debug, info};

use crate::survey::{io_common::*, *};

pub fn read_excel_table(path: &str, cfs: &FileSource) -> SurveyResult<RawTable> {
    let wrange = get_range(path, cfs)?;
    let header_rows = cfs.header_row_count()?;
    let rows: Vec<Vec<RawCell>> = wrange
        .rows()
        .map(|row| row.iter().map(cell_from_calamine).collect())
        .collect();
    debug!(
        "read_excel_table: {:?}: {} rows including {} header rows",
        path,
        rows.len(),
        header_rows
    );
    build_table(path, header_rows, rows)
}

fn get_range(path: &str, cfs: &FileSource) -> SurveyResult<Range<DataType>> {
    let worksheet_name_o = cfs.excel_worksheet_name.clone();
    debug!(
        "read_excel_table: path: {:?} worksheet: {:?}",
        &path, &worksheet_name_o
    );
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu { path })?;

    // A worksheet name was provided, use it.
    if let Some(worksheet_name) = worksheet_name_o {
        let wrange = workbook
            .worksheet_range(&worksheet_name)
            .context(MissingWorksheetSnafu {
                name: worksheet_name.clone(),
                path,
            })?
            .context(OpeningExcelSnafu { path })?;
        Ok(wrange)
    } else {
        let mut all_worksheets = workbook.worksheets();
        if all_worksheets.is_empty() {
            return EmptyExcelSnafu { path }.fail();
        }
        if all_worksheets.len() > 1 {
            info!(
                "read_excel_table: {:?} has {} worksheets, reading the first one {:?}",
                path,
                all_worksheets.len(),
                all_worksheets[0].0
            );
        }
        let (worksheet_name, wrange) = all_worksheets.swap_remove(0);
        debug!(
            "read_excel_table: path: {:?} worksheet: {:?}",
            &path, &worksheet_name
        );
        Ok(wrange)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    // Two worksheets: "Respostas", an export with two header rows, then
    // "Notas" with a single header row.
    fn fixture() -> String {
        format!(
            "{}/test_data/survey_responses.xlsx",
            env!("CARGO_MANIFEST_DIR")
        )
    }

    fn source(worksheet: Option<&str>, header_rows: u64) -> FileSource {
        FileSource {
            provider: "xlsx".to_string(),
            file_path: fixture(),
            excel_worksheet_name: worksheet.map(|s| s.to_string()),
            header_rows: Some(JSValue::from(header_rows)),
            delimiter: None,
        }
    }

    fn s(l: &[&str]) -> Vec<String> {
        l.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn missing_workbook() {
        let cfs = FileSource {
            provider: "xlsx".to_string(),
            file_path: "/nonexistent/survey.xlsx".to_string(),
            excel_worksheet_name: None,
            header_rows: None,
            delimiter: None,
        };
        let err = read_excel_table(&cfs.file_path, &cfs).unwrap_err();
        assert!(matches!(err, SurveyError::OpeningExcel { .. }));
    }

    #[test]
    fn first_worksheet_with_two_header_rows() {
        let cfs = source(None, 2);
        let table = read_excel_table(&cfs.file_path, &cfs).unwrap();
        assert_eq!(table.source, "survey_responses.xlsx");
        assert_eq!(
            table.headers,
            s(&[
                "respondent_id",
                "Você é:",
                "Qual a sua idade?",
                "Conceito - Abrir negócio",
                "Conceito - Impacto social",
                "Data",
            ])
        );
        assert_eq!(table.option(3), Some("Abrir negócio"));
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.cell(0, 0), &RawCell::Number(12.0));
        assert_eq!(table.cell(0, 4), &RawCell::Empty);
        assert_eq!(
            date_value(table.cell(0, 5)),
            NaiveDate::from_ymd_opt(2026, 10, 18)
        );
    }

    #[test]
    fn workbook_rows_are_cleaned() {
        let cfs = source(Some("Respostas"), 2);
        let table = read_excel_table(&cfs.file_path, &cfs).unwrap();
        let schema = Schema::new(
            FieldSet {
                id: "respondent_id".to_string(),
                profile: Some("voce_e".to_string()),
                age: Some("qual_a_sua_idade".to_string()),
                submitted_at: Some("data".to_string()),
                flags: s(&["conceito_abrir_negocio", "conceito_impacto_social"]),
                ..FieldSet::default()
            },
            vec![],
        );
        let res = clean_table(
            &table,
            None,
            &schema,
            &Lookups::standard(),
            &CleaningRules::DEFAULT_RULES,
        )
        .unwrap();
        assert_eq!(res.stats.total_rows, 3);
        assert_eq!(res.stats.duplicate_rows, 1);
        let ids: Vec<&str> = res.respondents.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["12", "13"]);
        let first = &res.respondents[0];
        assert_eq!(first.profile, Some(Profile::Student));
        assert_eq!(first.age, Some(20));
        assert_eq!(first.submitted_at, NaiveDate::from_ymd_opt(2026, 10, 18));
        assert_eq!(first.flags["conceito_abrir_negocio"], Some(true));
        assert_eq!(first.flags["conceito_impacto_social"], Some(false));
        let second = &res.respondents[1];
        assert_eq!(second.profile, Some(Profile::Alumnus));
        assert_eq!(second.flags["conceito_impacto_social"], Some(true));
    }

    #[test]
    fn worksheet_selected_by_name() {
        let cfs = source(Some("Notas"), 1);
        let table = read_excel_table(&cfs.file_path, &cfs).unwrap();
        assert_eq!(table.headers, s(&["nota"]));
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.cell(0, 0), &RawCell::Number(7.0));

        let cfs = source(Some("Planilha1"), 2);
        let err = read_excel_table(&cfs.file_path, &cfs).unwrap_err();
        assert!(matches!(err, SurveyError::MissingWorksheet { .. }));
    }
}
