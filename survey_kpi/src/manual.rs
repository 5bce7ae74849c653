/*!

This is the long-form manual for `survey_kpi` and `surveytab`.

## Input formats

The following providers are supported:
* `xlsx` Excel workbooks, as exported by the usual survey tools
* `csv` delimited text files

Both expect the export to start with two header rows:

|                | Conceito de empreendedorismo | (merged)       | Idade    |
|----------------|------------------------------|----------------|----------|
| respondent_id  | Abrir negócio                | Impacto social | Response |
| 1              | Abrir negócio                |                | 20       |

The first row holds the question. When a question spans several answer options
(checkbox questions), the survey tool only fills the first cell: the other
cells inherit it. The second row holds the answer option. Generic markers such
as `Response` or `Resposta aberta` carry no option. The example above gives the
columns:

- `respondent_id`
- `Conceito de empreendedorismo - Abrir negócio` (option `Abrir negócio`)
- `Conceito de empreendedorismo - Impacto social` (option `Impacto social`)
- `Idade`

A cell equal to the option of its column counts as a checked box.

Files with a single header row are read with `headerRows: 1`.

### `xlsx`

The worksheet named with `excelWorksheetName` or `--excel-worksheet-name` is
read. Without a name, the first worksheet of the workbook is read.

### `csv`

The delimiter is `,` by default and can be changed with `delimiter`. Rows
shorter than the header are padded with empty cells.

## Column mapping

The raw headers are long free-text questions. A mapping file gives each one a
technical name, which is the name used in the configuration, and optionally a
public label and a class. It is a CSV file (`,` or `;` delimited) such as:

```text
coluna_original;nome_tecnico;rotulo_publico;classe
Qual a sua idade?;idade;Idade;perfil
```

Several spellings of the column names are accepted (`original`,
`technical_name`, `label`, `class`...). The file may be encoded in UTF-8 or
Latin-1.

When no mapping file is given, the command line program uses
`columns_classification.csv` from the working directory or from the
directory of an input file. Without any mapping file, every header is turned
into a technical name by removing accents and punctuation: `Você é:` becomes
`voce_e`. Composed and decomposed accents give the same name.

## Cleaning rules

`duplicatePolicy`:
- `keepFirst` (default) keeps the first row of each respondent identifier
- `keepLast` keeps the last one

Rows without an identifier are dropped and counted. A table without the
identifier column is an error.

Answers that cannot be understood are treated as missing and counted in the
cleaning statistics. They never stop the processing.

## Indices

An index is a weighted mean of components, each brought to `[0, 1]` first:

- Likert items: `(value - min) / (max - min)`
- flags: `1` when checked
- multi-select questions: `1` when the `option` is among the answers, or when
  there is any answer if no option is given

`invert` uses `1 - x` instead. The `scale` is `unit` (`[0, 1]`) or `percent`
(`[0, 100]`).

`missingComponentPolicy`:
- `exclude` (default): the index is missing when one of its components is
- `neutralDefault`: a missing component counts as `0.5`

## Reports

The summary contains:
- an overview: rows read, unique respondents, duplicates, age statistics
- the number of respondents per age band
- one entry per group for each of the `groupings`. Respondents without a value
  for a dimension are kept in an `(unspecified)` group.
- the `comparisons`: the difference, then the relative difference, of every
  metric between two values of a dimension
- the `topN` tables: the most frequent values of a dimension or of a
  multi-select question

The dimensions are `profile`, `course`, `institution`, `entry_year` and
`teaching_model`.

A metric that cannot be computed (empty group, nobody answered) is `null`.
It is never zero.

## Export

The cleaned records can be written to a delimited file for a BI tool. The
first row has the column names and the second row the type of each column
(`text`, `categorical`, `numeric`, `date`). Flags are `1`/`0` and the answers
of multi-select questions are joined with `|`.

The export is read back after writing. If it does not give the same records,
for example because an answer contains `|`, the run fails.

*/
