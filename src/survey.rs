use log::{debug, info, warn};

use snafu::{prelude::*, Snafu};
use survey_kpi::*;

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::Args;
use crate::survey::config_reader::*;

mod config_reader;
mod io_common;
mod io_csv;
mod io_excel;
mod io_export;
mod io_mapping;
mod summary;

#[derive(Debug, Snafu)]
pub enum SurveyError {
    #[snafu(display("Error opening file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("No worksheet found in {path}"))]
    EmptyExcel { path: String },
    #[snafu(display("Worksheet {name} not found in {path}"))]
    MissingWorksheet { name: String, path: String },
    #[snafu(display("{path}: {expected} header rows are expected, but the file has {found} rows"))]
    MissingHeader {
        path: String,
        expected: usize,
        found: usize,
    },
    #[snafu(display("Error opening file {path}"))]
    OpeningCsv { source: csv::Error, path: String },
    #[snafu(display("Error parsing line {lineno} of {path}"))]
    CsvLineParse {
        source: csv::Error,
        path: String,
        lineno: usize,
    },
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("Error parsing JSON number"))]
    ParsingJsonNumber {},
    #[snafu(display("Error reading the column mapping {path}"))]
    ReadingMapping {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Column mapping {path}: no column found for {column}"))]
    MappingMissingColumns { path: String, column: String },
    #[snafu(display("{source}"))]
    Cleaning { source: CleaningErrors },
    #[snafu(display("Error writing file {path}"))]
    WritingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error writing export {path}"))]
    WritingExport { source: csv::Error, path: String },
    #[snafu(display("Export {path}: {message}"))]
    ReadingExport { path: String, message: String },
    #[snafu(display(
        "The export {path} does not read back to the cleaned records (respondent {id:?})"
    ))]
    ExportMismatch { path: String, id: String },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type SurveyResult<T> = Result<T, SurveyError>;

fn read_tables(sources: &[FileSource]) -> SurveyResult<Vec<RawTable>> {
    let mut tables: Vec<RawTable> = Vec::new();
    for cfs in sources.iter() {
        info!(
            "Attempting to read survey file {:?} ({})",
            cfs.file_path, cfs.provider
        );
        let table = match cfs.provider.as_str() {
            "xlsx" | "excel" => io_excel::read_excel_table(&cfs.file_path, cfs)?,
            "csv" => io_csv::read_csv_table(&cfs.file_path, cfs)?,
            x => whatever!("Provider not implemented {:?}", x),
        };
        info!(
            "read_tables: {}: {} columns, {} rows",
            table.source,
            table.headers.len(),
            table.rows.len()
        );
        tables.push(table);
    }
    Ok(tables)
}

fn input_type_from_extension(path: &str) -> &'static str {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());
    match ext.as_deref() {
        Some("csv") | Some("txt") | Some("tsv") => "csv",
        _ => "xlsx",
    }
}

/// The column mapping looked up when none is configured.
const DEFAULT_MAPPING_FILE: &str = "columns_classification.csv";

// Looks for the default mapping file in the working directory, then next to
// each input file.
fn find_default_mapping(sources: &[FileSource]) -> Option<String> {
    let dirs = std::iter::once(PathBuf::from(".")).chain(
        sources
            .iter()
            .filter_map(|cfs| Path::new(&cfs.file_path).parent().map(|p| p.to_path_buf())),
    );
    for dir in dirs {
        let candidate = dir.join(DEFAULT_MAPPING_FILE);
        debug!("find_default_mapping: trying {:?}", candidate);
        if candidate.is_file() {
            info!("Using the column mapping found at {:?}", candidate);
            return Some(candidate.display().to_string());
        }
    }
    info!(
        "No column mapping and no {} found, the headers are mapped to their slugs",
        DEFAULT_MAPPING_FILE
    );
    None
}

// Loads the configuration and applies the command line overrides. All the
// paths of the returned configuration are usable as they are.
fn load_config(args: &Args) -> SurveyResult<SurveyConfig> {
    let mut config = match &args.config {
        Some(config_path) => {
            let config_str = fs::read_to_string(config_path.clone()).context(OpeningJsonSnafu {
                path: config_path.clone(),
            })?;
            let mut config: SurveyConfig =
                serde_json::from_str(&config_str).context(ParsingJsonSnafu {})?;
            let root = Path::new(config_path.as_str())
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_default();
            config.resolve_paths(&root);
            config
        }
        None => {
            info!("No configuration provided, using the default configuration");
            default_config()
        }
    };

    if let Some(input_path) = &args.input {
        let provider = args
            .input_type
            .clone()
            .unwrap_or_else(|| input_type_from_extension(input_path).to_string());
        config.input_sources = vec![FileSource {
            provider,
            file_path: input_path.clone(),
            excel_worksheet_name: args.excel_worksheet_name.clone(),
            header_rows: args.header_rows.map(|n| JSValue::from(n as u64)),
            delimiter: None,
        }];
    } else if args.input_type.is_some()
        || args.excel_worksheet_name.is_some()
        || args.header_rows.is_some()
    {
        for cfs in config.input_sources.iter_mut() {
            if let Some(t) = &args.input_type {
                cfs.provider = t.clone();
            }
            if let Some(n) = &args.excel_worksheet_name {
                cfs.excel_worksheet_name = Some(n.clone());
            }
            if let Some(n) = args.header_rows {
                cfs.header_rows = Some(JSValue::from(n as u64));
            }
        }
    }
    if let Some(m) = &args.mapping {
        config.column_mapping_path = Some(m.clone());
    }
    if config.column_mapping_path.is_none() {
        config.column_mapping_path = find_default_mapping(&config.input_sources);
    }
    if args.keep_last {
        config.rules.duplicate_policy = "keepLast".to_string();
    }
    if let Some(e) = &args.export {
        config.output_settings.export_file = Some(e.clone());
    }
    if let Some(o) = &args.out {
        config.output_settings.summary_file = Some(o.clone());
    }
    Ok(config)
}

fn read_reference(path: &str) -> SurveyResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    Ok(js)
}

/// Runs the whole pipeline: reading, cleaning, export and summary.
pub fn run_survey(args: &Args) -> SurveyResult<()> {
    let config = load_config(args)?;
    info!("config: {:?}", config);

    let rules = validate_rules(&config.rules)?;
    let schema = validate_schema(&config)?;
    let lookups = validate_lookups(&config)?;
    let reports = validate_reports(&config.reports, &schema)?;

    if config.input_sources.is_empty() {
        whatever!("No input source: use --input or provide inputSources in the configuration")
    }

    let mapping = match &config.column_mapping_path {
        Some(p) => Some(io_mapping::read_mapping(p)?),
        None => None,
    };
    debug!("mapping: {:?}", mapping);

    let tables = read_tables(&config.input_sources)?;
    let cleaned =
        clean_tables(&tables, mapping.as_ref(), &schema, &lookups, &rules).context(CleaningSnafu {})?;
    info!(
        "{} unique respondents out of {} rows",
        cleaned.stats.unique_respondents, cleaned.stats.total_rows
    );

    if let Some(export_path) = config.export_path() {
        io_export::write_export(&export_path, &cleaned.respondents, &schema)?;
        info!("Cleaned records written to {:?}", export_path);
        let exported = io_export::read_export(&export_path, &schema)?;
        if exported != cleaned.respondents {
            // The first record that differs, or the first missing one.
            let id = cleaned
                .respondents
                .iter()
                .enumerate()
                .find(|(idx, r)| exported.get(*idx) != Some(*r))
                .map(|(_, r)| r.id.clone())
                .unwrap_or_default();
            return ExportMismatchSnafu {
                path: export_path,
                id,
            }
            .fail();
        }
    }

    let summary_js = summary::build_summary_js(&config, mapping.as_ref(), &schema, &reports, &cleaned);
    let pretty_js_stats = serde_json::to_string_pretty(&summary_js).context(ParsingJsonSnafu {})?;

    match config.summary_path() {
        Some(out_path) => {
            fs::write(&out_path, &pretty_js_stats).context(WritingFileSnafu {
                path: out_path.clone(),
            })?;
            info!("Summary written to {:?}", out_path);
        }
        None => println!("{}", pretty_js_stats),
    }

    // The reference summary, if provided for comparison
    if let Some(summary_p) = &args.reference {
        let summary_ref = read_reference(summary_p)?;
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(ParsingJsonSnafu {})?;
        if pretty_js_summary_ref != pretty_js_stats {
            warn!("Found differences with the reference summary");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats.as_ref(),
                "\n",
            );
            whatever!("Difference detected between calculated summary and reference summary")
        }
    }

    Ok(())
}
