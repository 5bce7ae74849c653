use crate::survey::*;

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;

use survey_kpi::aggregate::{CategorySource, Dimension, DimensionValue, Selection};

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(rename = "surveyName")]
    pub survey_name: String,
    #[serde(rename = "outputDirectory")]
    pub output_directory: Option<String>,
    #[serde(rename = "exportFile")]
    pub export_file: Option<String>,
    #[serde(rename = "summaryFile")]
    pub summary_file: Option<String>,
}

/// The settings of the summary that are copied into it.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub survey: String,
    pub sources: Vec<String>,
    #[serde(rename = "duplicatePolicy")]
    pub duplicate_policy: String,
    #[serde(rename = "missingComponentPolicy")]
    pub missing_component_policy: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct FileSource {
    pub provider: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "excelWorksheetName")]
    pub excel_worksheet_name: Option<String>,
    #[serde(rename = "headerRows")]
    pub header_rows: Option<JSValue>,
    pub delimiter: Option<String>,
}

impl FileSource {
    /// The number of header rows: 2 unless specified.
    pub fn header_row_count(&self) -> SurveyResult<usize> {
        match &self.header_rows {
            None => Ok(2),
            Some(_) => match read_js_int(&self.header_rows)? {
                x @ (1 | 2) => Ok(x),
                x => whatever!("headerRows must be 1 or 2, got {}", x),
            },
        }
    }

    /// The delimiter of csv files, `,` unless specified.
    pub fn delimiter_byte(&self) -> SurveyResult<u8> {
        match self.delimiter.as_deref() {
            None => Ok(b','),
            Some("\\t") | Some("tab") => Ok(b'\t'),
            Some(s) if s.len() == 1 && s.is_ascii() => Ok(s.as_bytes()[0]),
            Some(s) => whatever!("delimiter must be a single ASCII character, got {:?}", s),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct FieldsConfig {
    pub id: String,
    pub profile: Option<String>,
    pub age: Option<String>,
    pub course: Option<String>,
    pub institution: Option<String>,
    #[serde(rename = "teachingModel")]
    pub teaching_model: Option<String>,
    #[serde(rename = "entryYear")]
    pub entry_year: Option<String>,
    #[serde(rename = "submittedAt")]
    pub submitted_at: Option<String>,
    #[serde(default)]
    pub likert: Vec<String>,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(rename = "multiSelect", default)]
    pub multi_select: Vec<String>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ComponentConfig {
    pub field: String,
    pub weight: f64,
    pub invert: Option<bool>,
    pub option: Option<String>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    pub name: String,
    pub scale: String,
    pub components: Vec<ComponentConfig>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    #[serde(rename = "duplicatePolicy")]
    pub duplicate_policy: String,
    #[serde(rename = "missingComponentPolicy")]
    pub missing_component_policy: String,
    #[serde(rename = "multiSelectDelimiter")]
    pub multi_select_delimiter: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct LikertLabel {
    pub label: String,
    pub value: u8,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct LikertScaleConfig {
    pub min: u8,
    pub max: u8,
    pub labels: Vec<LikertLabel>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct BooleanTokensConfig {
    pub affirmative: Vec<String>,
    pub negative: Vec<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonConfig {
    pub dimension: String,
    pub left: String,
    pub right: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct TopNConfig {
    pub source: String,
    pub n: usize,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReportsConfig {
    #[serde(default)]
    pub groupings: Vec<Vec<String>>,
    #[serde(default)]
    pub comparisons: Vec<ComparisonConfig>,
    #[serde(rename = "topN", default)]
    pub top_n: Vec<TopNConfig>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SurveyConfig {
    #[serde(rename = "outputSettings")]
    pub output_settings: OutputSettings,
    #[serde(rename = "inputSources", default)]
    pub input_sources: Vec<FileSource>,
    #[serde(rename = "columnMappingPath")]
    pub column_mapping_path: Option<String>,
    pub fields: FieldsConfig,
    #[serde(default)]
    pub indices: Vec<IndexConfig>,
    pub rules: RulesConfig,
    #[serde(rename = "likertScale")]
    pub likert_scale: Option<LikertScaleConfig>,
    #[serde(rename = "booleanTokens")]
    pub boolean_tokens: Option<BooleanTokensConfig>,
    #[serde(default)]
    pub reports: ReportsConfig,
}

pub fn resolve_path(root: &Path, p: &str) -> String {
    let path = Path::new(p);
    if path.is_absolute() {
        p.to_string()
    } else {
        root.join(path).as_path().display().to_string()
    }
}

impl SurveyConfig {
    /// Makes the relative paths of the configuration relative to `root`. The
    /// output files are relative to the output directory, if any.
    pub fn resolve_paths(&mut self, root: &Path) {
        for cfs in self.input_sources.iter_mut() {
            cfs.file_path = resolve_path(root, &cfs.file_path);
        }
        self.column_mapping_path = self
            .column_mapping_path
            .as_ref()
            .map(|p| resolve_path(root, p));
        let out = &mut self.output_settings;
        let out_dir = match &out.output_directory {
            Some(d) => resolve_path(root, d),
            None => root.display().to_string(),
        };
        let out_root = Path::new(out_dir.as_str());
        out.export_file = out.export_file.as_ref().map(|p| resolve_path(out_root, p));
        out.summary_file = match &out.summary_file {
            Some(p) if p == "stdout" || p.is_empty() => Some(p.clone()),
            Some(p) => Some(resolve_path(out_root, p)),
            None => None,
        };
        out.output_directory = Some(out_dir);
    }

    pub fn export_path(&self) -> Option<String> {
        self.output_settings
            .export_file
            .clone()
            .filter(|p| !p.is_empty())
    }

    /// Where to write the summary. `None` is the standard output.
    pub fn summary_path(&self) -> Option<String> {
        match &self.output_settings.summary_file {
            Some(p) if p == "stdout" || p.is_empty() => None,
            x => x.clone(),
        }
    }

    pub fn output_config(&self) -> OutputConfig {
        OutputConfig {
            survey: self.output_settings.survey_name.clone(),
            sources: self
                .input_sources
                .iter()
                .map(|cfs| crate::survey::io_common::simplify_file_name(&cfs.file_path))
                .collect(),
            duplicate_policy: self.rules.duplicate_policy.clone(),
            missing_component_policy: self.rules.missing_component_policy.clone(),
        }
    }
}

pub fn validate_rules(rules: &RulesConfig) -> SurveyResult<CleaningRules> {
    let res = CleaningRules {
        duplicate_policy: match rules.duplicate_policy.as_str() {
            "keepFirst" => DuplicatePolicy::KeepFirst,
            "keepLast" => DuplicatePolicy::KeepLast,
            x => whatever!("unknown duplicate policy: {:?}", x),
        },
        missing_component_policy: match rules.missing_component_policy.as_str() {
            "exclude" => MissingComponentPolicy::Exclude,
            "neutralDefault" => MissingComponentPolicy::NeutralDefault,
            x => whatever!("unknown missing component policy: {:?}", x),
        },
        multi_select_delimiter: match rules.multi_select_delimiter.as_deref() {
            None => CleaningRules::DEFAULT_RULES.multi_select_delimiter,
            Some(s) if s.chars().count() == 1 => match s.chars().next() {
                Some(c) => c,
                None => CleaningRules::DEFAULT_RULES.multi_select_delimiter,
            },
            Some(s) => whatever!(
                "multiSelectDelimiter must be a single character, got {:?}",
                s
            ),
        },
    };
    Ok(res)
}

fn none_if_empty(s: &Option<String>) -> Option<String> {
    s.clone().filter(|x| !x.trim().is_empty())
}

pub fn validate_schema(config: &SurveyConfig) -> SurveyResult<Schema> {
    let f = &config.fields;
    let fields = FieldSet {
        id: f.id.clone(),
        profile: none_if_empty(&f.profile),
        age: none_if_empty(&f.age),
        course: none_if_empty(&f.course),
        institution: none_if_empty(&f.institution),
        teaching_model: none_if_empty(&f.teaching_model),
        entry_year: none_if_empty(&f.entry_year),
        submitted_at: none_if_empty(&f.submitted_at),
        likert: f.likert.clone(),
        flags: f.flags.clone(),
        multi_select: f.multi_select.clone(),
    };
    let mut indices: Vec<IndexDefinition> = Vec::new();
    for ic in config.indices.iter() {
        let scale = match ic.scale.as_str() {
            "unit" => IndexScale::Unit,
            "percent" => IndexScale::Percent,
            x => whatever!("index {}: unknown scale {:?}", ic.name, x),
        };
        indices.push(IndexDefinition {
            name: ic.name.clone(),
            scale,
            components: ic
                .components
                .iter()
                .map(|c| IndexComponent {
                    field: c.field.clone(),
                    weight: c.weight,
                    invert: c.invert.unwrap_or(false),
                    option: none_if_empty(&c.option),
                })
                .collect(),
        });
    }
    let schema = Schema::new(fields, indices);
    schema.validate().context(CleaningSnafu {})?;
    Ok(schema)
}

pub fn validate_lookups(config: &SurveyConfig) -> SurveyResult<Lookups> {
    let mut lookups = Lookups::standard();
    if let Some(ls) = &config.likert_scale {
        if ls.min >= ls.max {
            whatever!(
                "likertScale: min ({}) must be lower than max ({})",
                ls.min,
                ls.max
            )
        }
        if let Some(l) = ls
            .labels
            .iter()
            .find(|l| l.value < ls.min || l.value > ls.max)
        {
            whatever!(
                "likertScale: label {:?} has value {} outside of [{}, {}]",
                l.label,
                l.value,
                ls.min,
                ls.max
            )
        }
        let labels: Vec<(String, u8)> = ls
            .labels
            .iter()
            .map(|l| (l.label.clone(), l.value))
            .collect();
        lookups.likert = LikertScale::new(&labels, ls.min, ls.max);
    }
    if let Some(bt) = &config.boolean_tokens {
        lookups.booleans = BooleanTokens::new(&bt.affirmative, &bt.negative);
    }
    Ok(lookups)
}

/// The reports to compute, checked against the schema.
#[derive(PartialEq, Debug, Clone)]
pub struct ReportPlan {
    pub groupings: Vec<Vec<Dimension>>,
    pub comparisons: Vec<(Dimension, Selection, Selection)>,
    pub top_n: Vec<(CategorySource, usize)>,
}

fn parse_dimension(s: &str) -> SurveyResult<Dimension> {
    match Dimension::parse(s) {
        Some(d) => Ok(d),
        None => whatever!("unknown dimension: {:?}", s),
    }
}

fn parse_dimension_value(s: &str) -> DimensionValue {
    if s == DimensionValue::UNSPECIFIED_LABEL {
        DimensionValue::Unspecified
    } else {
        DimensionValue::known(s)
    }
}

pub fn validate_reports(reports: &ReportsConfig, schema: &Schema) -> SurveyResult<ReportPlan> {
    let mut groupings: Vec<Vec<Dimension>> = Vec::new();
    for g in reports.groupings.iter() {
        let dims: Vec<Dimension> = g
            .iter()
            .map(|s| parse_dimension(s))
            .collect::<SurveyResult<Vec<Dimension>>>()?;
        groupings.push(dims);
    }
    let mut comparisons = Vec::new();
    for c in reports.comparisons.iter() {
        let d = parse_dimension(&c.dimension)?;
        comparisons.push((
            d,
            vec![(d, parse_dimension_value(&c.left))],
            vec![(d, parse_dimension_value(&c.right))],
        ));
    }
    let mut top_n = Vec::new();
    for t in reports.top_n.iter() {
        let source = match Dimension::parse(&t.source) {
            Some(d) => CategorySource::Dimension(d),
            None if schema.fields.multi_select.contains(&t.source) => {
                CategorySource::MultiSelect(t.source.clone())
            }
            None => whatever!(
                "topN: {:?} is neither a dimension nor a multi-select field",
                t.source
            ),
        };
        top_n.push((source, t.n));
    }
    Ok(ReportPlan {
        groupings,
        comparisons,
        top_n,
    })
}

fn read_js_int(x: &Option<JSValue>) -> SurveyResult<usize> {
    match x {
        Some(JSValue::Number(n)) => n
            .as_u64()
            .map(|x| x as usize)
            .context(ParsingJsonNumberSnafu {}),
        Some(JSValue::String(s)) => s.parse::<usize>().ok().context(ParsingJsonNumberSnafu {}),
        _ => None.context(ParsingJsonNumberSnafu {}),
    }
}

fn strings(l: &[&str]) -> Vec<String> {
    l.iter().map(|s| s.to_string()).collect()
}

fn components(fields: &[&str]) -> Vec<ComponentConfig> {
    fields
        .iter()
        .map(|f| ComponentConfig {
            field: f.to_string(),
            weight: 1.0,
            invert: None,
            option: None,
        })
        .collect()
}

/// The configuration of the higher-education entrepreneurship survey. The
/// field names are the technical names of its column mapping.
pub fn default_config() -> SurveyConfig {
    let infrastructure = [
        "infraestrutura_biblioteca",
        "infraestrutura_labs_informatica",
        "infraestrutura_labs_pesquisa_exper",
        "infraestrutura_espacos_convivencia",
        "infraestrutura_restaurante",
        "internet_disponibilidade_acesso",
        "internet_velocidade_wifi",
    ];
    let accessibility = [
        "acessibilidade_calcadas_vias",
        "acessibilidade_vias_acesso_edificacoes",
        "acessibilidade_rota_interna",
        "acessibilidade_sanitarios",
        "acessibilidade_elevadores_rampas",
    ];
    let mut likert = strings(&[
        "professores_inconformismo_transformacao",
        "professores_visao_oportunidades",
        "professores_pensamento_inovador_criativo",
        "professores_coragem_riscos",
        "professores_curiosidade",
        "professores_comunicacao_sociabilidade",
        "professores_planejamento_atividades",
        "professores_experiencia_mercado",
        "professores_apoio_iniciativas",
        "professores_acessiveis_apoiar_iniciativas",
    ]);
    likert.extend(strings(&infrastructure));
    likert.extend(strings(&accessibility));

    let mut entrepreneurial = components(&[
        "socio_ou_fundador",
        "conceito_empreendedorismo_abrir_negocio",
        "conceito_empreendedorismo_impacto_social",
        "conceito_empreendedorismo_melhorar_ambiente",
        "contribuiu_crescimento_projetos",
        "professores_apoio_iniciativas",
    ]);
    entrepreneurial[0].weight = 2.0;

    let mut dropout = components(&[
        "evasao_motivos",
        "permanencia_motivos",
        "professores_acessiveis_apoiar_iniciativas",
        "infraestrutura_espacos_convivencia",
    ]);
    dropout[0].weight = 2.0;
    for c in dropout.iter_mut().skip(1) {
        c.invert = Some(true);
    }

    SurveyConfig {
        output_settings: OutputSettings {
            survey_name: "Empreendedorismo no ensino superior".to_string(),
            output_directory: None,
            export_file: None,
            summary_file: None,
        },
        input_sources: vec![],
        column_mapping_path: None,
        fields: FieldsConfig {
            id: "respondent_id".to_string(),
            profile: Some("voce_e".to_string()),
            age: Some("idade".to_string()),
            course: Some("curso_graduacao".to_string()),
            institution: Some("unidade".to_string()),
            teaching_model: Some("modalidade_ensino".to_string()),
            entry_year: Some("ano_ingresso".to_string()),
            submitted_at: None,
            likert,
            flags: strings(&[
                "socio_ou_fundador",
                "conceito_empreendedorismo_abrir_negocio",
                "conceito_empreendedorismo_impacto_social",
                "conceito_empreendedorismo_melhorar_ambiente",
                "contribuiu_crescimento_projetos",
                "cursou_disciplina_empreendedorismo",
            ]),
            multi_select: strings(&["permanencia_motivos", "evasao_motivos"]),
        },
        indices: vec![
            IndexConfig {
                name: "infrastructure".to_string(),
                scale: "unit".to_string(),
                components: components(&infrastructure),
            },
            IndexConfig {
                name: "accessibility".to_string(),
                scale: "unit".to_string(),
                components: components(&accessibility),
            },
            IndexConfig {
                name: "entrepreneurial_profile".to_string(),
                scale: "percent".to_string(),
                components: entrepreneurial,
            },
            IndexConfig {
                name: "dropout_risk".to_string(),
                scale: "percent".to_string(),
                components: dropout,
            },
        ],
        rules: RulesConfig {
            duplicate_policy: "keepFirst".to_string(),
            missing_component_policy: "exclude".to_string(),
            multi_select_delimiter: None,
        },
        likert_scale: None,
        boolean_tokens: None,
        reports: ReportsConfig {
            groupings: vec![strings(&["profile"]), strings(&["course"])],
            comparisons: vec![ComparisonConfig {
                dimension: "profile".to_string(),
                left: "student".to_string(),
                right: "alumnus".to_string(),
            }],
            top_n: vec![
                TopNConfig {
                    source: "course".to_string(),
                    n: 10,
                },
                TopNConfig {
                    source: "evasao_motivos".to_string(),
                    n: 5,
                },
                TopNConfig {
                    source: "permanencia_motivos".to_string(),
                    n: 5,
                },
            ],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = default_config();
        let schema = validate_schema(&config).unwrap();
        assert_eq!(schema.indices.len(), 4);
        let rules = validate_rules(&config.rules).unwrap();
        assert_eq!(rules, CleaningRules::DEFAULT_RULES);
        let plan = validate_reports(&config.reports, &schema).unwrap();
        assert_eq!(plan.groupings[0], vec![Dimension::Profile]);
        assert_eq!(
            plan.top_n[1].0,
            CategorySource::MultiSelect("evasao_motivos".to_string())
        );
        validate_lookups(&config).unwrap();
    }

    #[test]
    fn parse_minimal_config() {
        let js = r#"{
            "outputSettings": {"surveyName": "s"},
            "fields": {"id": "id"},
            "rules": {"duplicatePolicy": "keepLast", "missingComponentPolicy": "neutralDefault",
                      "multiSelectDelimiter": ";"},
            "likertScale": {"min": 0, "max": 10, "labels": [{"label": "muito", "value": 10}]}
        }"#;
        let config: SurveyConfig = serde_json::from_str(js).unwrap();
        assert!(config.input_sources.is_empty());
        assert!(config.reports.groupings.is_empty());
        let rules = validate_rules(&config.rules).unwrap();
        assert_eq!(rules.duplicate_policy, DuplicatePolicy::KeepLast);
        assert_eq!(
            rules.missing_component_policy,
            MissingComponentPolicy::NeutralDefault
        );
        assert_eq!(rules.multi_select_delimiter, ';');
        let lookups = validate_lookups(&config).unwrap();
        assert_eq!(lookups.likert.max, 10);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let mut config = default_config();
        config.rules.duplicate_policy = "keepMiddle".to_string();
        assert!(validate_rules(&config.rules).is_err());

        let mut config = default_config();
        config.indices[0].scale = "permille".to_string();
        assert!(validate_schema(&config).is_err());

        let mut config = default_config();
        config.indices[0].components[0].weight = 0.0;
        assert!(matches!(
            validate_schema(&config),
            Err(SurveyError::Cleaning {
                source: CleaningErrors::InvalidSchema(_)
            })
        ));

        let config = default_config();
        let schema = validate_schema(&config).unwrap();
        let reports = ReportsConfig {
            top_n: vec![TopNConfig {
                source: "idade".to_string(),
                n: 3,
            }],
            ..ReportsConfig::default()
        };
        assert!(validate_reports(&reports, &schema).is_err());
        let reports = ReportsConfig {
            groupings: vec![strings(&["color"])],
            ..ReportsConfig::default()
        };
        assert!(validate_reports(&reports, &schema).is_err());

        let mut config = default_config();
        config.likert_scale = Some(LikertScaleConfig {
            min: 1,
            max: 5,
            labels: vec![LikertLabel {
                label: "x".to_string(),
                value: 7,
            }],
        });
        assert!(validate_lookups(&config).is_err());
    }

    #[test]
    fn header_rows_and_delimiter() {
        let mut cfs = FileSource {
            provider: "csv".to_string(),
            file_path: "a.csv".to_string(),
            excel_worksheet_name: None,
            header_rows: None,
            delimiter: None,
        };
        assert_eq!(cfs.header_row_count().unwrap(), 2);
        assert_eq!(cfs.delimiter_byte().unwrap(), b',');
        cfs.header_rows = Some(JSValue::from(1u64));
        cfs.delimiter = Some(";".to_string());
        assert_eq!(cfs.header_row_count().unwrap(), 1);
        assert_eq!(cfs.delimiter_byte().unwrap(), b';');
        cfs.header_rows = Some(JSValue::from("3"));
        assert!(cfs.header_row_count().is_err());
        cfs.delimiter = Some("::".to_string());
        assert!(cfs.delimiter_byte().is_err());
    }

    #[test]
    fn paths_are_resolved_against_the_config() {
        let mut config = default_config();
        config.input_sources = vec![FileSource {
            provider: "csv".to_string(),
            file_path: "data/a.csv".to_string(),
            excel_worksheet_name: None,
            header_rows: None,
            delimiter: None,
        }];
        config.column_mapping_path = Some("/abs/mapping.csv".to_string());
        config.output_settings.output_directory = Some("out".to_string());
        config.output_settings.export_file = Some("export.csv".to_string());
        config.output_settings.summary_file = Some("stdout".to_string());
        config.resolve_paths(Path::new("/root/cfg"));
        assert_eq!(config.input_sources[0].file_path, "/root/cfg/data/a.csv");
        assert_eq!(config.column_mapping_path.as_deref(), Some("/abs/mapping.csv"));
        assert_eq!(
            config.export_path().as_deref(),
            Some("/root/cfg/out/export.csv")
        );
        assert_eq!(config.summary_path(), None);
    }
}
