use clap::Parser;

/// This is a cleaning and tabulation program for survey spreadsheet exports.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) The JSON file describing the survey: input files, fields, indices and reports.
    /// If not provided, the built-in configuration of the higher-education entrepreneurship survey is used.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (file path or empty) The survey export to read. Setting this option overrides the input sources
    /// of the --config option.
    #[clap(short, long, value_parser)]
    pub input: Option<String>,

    /// (xlsx or csv) The type of the input. By default, it is inferred from the extension of the file.
    #[clap(long, value_parser)]
    pub input_type: Option<String>,

    /// When using an Excel file with several worksheets, indicates the name of the worksheet to use.
    #[clap(long, value_parser)]
    pub excel_worksheet_name: Option<String>,

    /// (1 or 2, default 2) The number of header rows: the question, then the answer options.
    #[clap(long, value_parser)]
    pub header_rows: Option<usize>,

    /// (file path, optional) The CSV file mapping the raw headers to technical field names.
    #[clap(short, long, value_parser)]
    pub mapping: Option<String>,

    /// (file path, optional) If specified, the cleaned records are written to this location,
    /// in a delimited format for BI tools.
    #[clap(short, long, value_parser)]
    pub export: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the summary will be written in JSON format to the given
    /// location. Setting this option overrides the path that may be specified with the --config option.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path) A reference file containing a summary in JSON format. If provided, surveytab will
    /// check that the computed summary matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// Keeps the last row of a respondent instead of the first one.
    #[clap(long, takes_value = false)]
    pub keep_last: bool,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
