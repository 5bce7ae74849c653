// Reading the column mapping: raw header -> technical name, label, class.

use log::{debug, info, warn};
use std::fs;

use crate::survey::*;

const ORIGINAL_ALIASES: [&str; 5] = [
    "coluna_original",
    "original",
    "coluna",
    "header_original",
    "original_header",
];
const CANONICAL_ALIASES: [&str; 6] = [
    "nome_tecnico",
    "tecnico",
    "nome_padrao",
    "slug",
    "technical_name",
    "canonical",
];
const LABEL_ALIASES: [&str; 4] = ["rotulo_publico", "rotulo", "label_publico", "label"];
const CLASS_ALIASES: [&str; 4] = ["classe", "categoria", "grupo", "class"];

// UTF-8 when possible, Latin-1 otherwise. Every byte is a valid Latin-1
// character.
fn decode(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            debug!("decode: not UTF-8 ({}), reading as Latin-1", e);
            e.into_bytes().iter().map(|b| *b as char).collect()
        }
    }
}

fn find_column(headers: &[String], aliases: &[&str]) -> Option<usize> {
    aliases
        .iter()
        .find_map(|a| headers.iter().position(|h| h == a))
}

// The entries of the mapping for one delimiter, if the expected columns are
// found with it.
fn parse_entries(text: &str, delimiter: u8) -> Option<Vec<MappingEntry>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());
    let mut records = rdr.records();
    let header: Vec<String> = match records.next() {
        Some(Ok(r)) => r.iter().map(|h| slugify(h)).collect(),
        _ => return None,
    };
    let original_idx = find_column(&header, &ORIGINAL_ALIASES)?;
    let canonical_idx = find_column(&header, &CANONICAL_ALIASES)?;
    let label_idx = find_column(&header, &LABEL_ALIASES);
    let class_idx = find_column(&header, &CLASS_ALIASES);
    debug!(
        "parse_entries: delimiter {:?}: columns {:?}",
        delimiter as char,
        (original_idx, canonical_idx, label_idx, class_idx)
    );

    let mut entries: Vec<MappingEntry> = Vec::new();
    for (idx, record) in records.enumerate() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                warn!("parse_entries: line {}: {}, skipping", idx + 2, e);
                continue;
            }
        };
        let get = |i: Option<usize>| -> Option<String> {
            i.and_then(|i| record.get(i))
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        entries.push(MappingEntry {
            original: get(Some(original_idx)).unwrap_or_default(),
            canonical: get(Some(canonical_idx)).unwrap_or_default(),
            label: get(label_idx),
            class: get(class_idx),
        });
    }
    Some(entries)
}

/// Reads a column mapping file. The delimiter is `,` or `;`.
pub fn read_mapping(path: &str) -> SurveyResult<HeaderMapping> {
    let bytes = fs::read(path).context(ReadingMappingSnafu { path })?;
    let text = decode(bytes);
    let text = text.trim_start_matches('\u{feff}');
    for delimiter in [b',', b';'] {
        if let Some(entries) = parse_entries(text, delimiter) {
            let mapping = HeaderMapping::new(entries);
            info!(
                "read_mapping: {}: {} columns mapped",
                path,
                mapping.entries().len()
            );
            return Ok(mapping);
        }
    }
    MappingMissingColumnsSnafu {
        path,
        column: format!("{} and {}", ORIGINAL_ALIASES[0], CANONICAL_ALIASES[0]),
    }
    .fail()
}
