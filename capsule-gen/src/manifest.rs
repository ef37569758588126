//! Capsule manifest: one spreadsheet row per capsule.

use anyhow::{bail, Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

pub const COMPETENCE_COLUMN: &str = "Compétences";
pub const THEME_COLUMN: &str = "Thématiques";
pub const SUBJECT_COLUMN: &str = "Sujets abordés";

pub const REQUIRED_COLUMNS: [&str; 3] = [COMPETENCE_COLUMN, THEME_COLUMN, SUBJECT_COLUMN];
pub const LINK_COLUMNS: [&str; 4] = ["Lien 1", "Lien 2", "Lien 3", "Lien 4"];

const UNSPECIFIED: &str = "Non spécifié";

/// One capsule to generate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapsuleRow {
    /// 1-based position among the kept rows; names the output folder
    pub index: usize,
    /// 1-based row number in the sheet, for diagnostics
    pub sheet_row: usize,
    pub competence: String,
    pub theme: String,
    pub subject: String,
    /// Non-empty link cells, in column order
    pub link_cells: Vec<String>,
}

impl CapsuleRow {
    pub fn links(&self) -> &[String] {
        &self.link_cells
    }

    /// Problems that would keep this row from producing a capsule.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        for (column, value) in [
            (COMPETENCE_COLUMN, &self.competence),
            (THEME_COLUMN, &self.theme),
            (SUBJECT_COLUMN, &self.subject),
        ] {
            if value.trim().is_empty() {
                errors.push(format!("Column '{}' missing or empty", column));
            }
        }
        if self.link_cells.is_empty() {
            errors.push("No external link found".to_string());
        }
        errors
    }
}

/// Read the first sheet of an xlsx/xls/ods workbook.
pub fn read_workbook(path: &Path) -> Result<Vec<CapsuleRow>> {
    log::info!("Reading workbook: {}", path.display());

    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open workbook: {}", path.display()))?;

    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .context("Workbook has no sheets")?;
    let range = workbook
        .worksheet_range(&sheet)
        .with_context(|| format!("Failed to read sheet '{}'", sheet))?;

    let mut rows = range
        .rows()
        .map(|row| row.iter().map(cell_text).collect::<Vec<_>>());
    let headers = rows.next().unwrap_or_default();
    log::debug!("Headers: {:?}", headers);

    rows_from_grid(&headers, rows)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        other => other.to_string().trim().to_string(),
    }
}

/// Build rows from a header line and the data lines below it.
pub fn rows_from_grid<I>(headers: &[String], lines: I) -> Result<Vec<CapsuleRow>>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let columns: HashMap<&str, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim(), i))
        .collect();

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|c| !columns.contains_key(c))
        .collect();
    if !missing.is_empty() {
        bail!("Missing columns in workbook: {}", missing.join(", "));
    }

    let value = |line: &[String], column: &str| -> String {
        columns
            .get(column)
            .and_then(|&i| line.get(i))
            .map(|v| v.trim().to_string())
            .unwrap_or_default()
    };

    let mut rows = Vec::new();
    for (offset, line) in lines.into_iter().enumerate() {
        let sheet_row = offset + 2;
        let subject = value(&line, SUBJECT_COLUMN);
        if subject.is_empty() {
            log::debug!("Row {} skipped (no subject)", sheet_row);
            continue;
        }

        rows.push(CapsuleRow {
            index: rows.len() + 1,
            sheet_row,
            competence: value(&line, COMPETENCE_COLUMN),
            theme: value(&line, THEME_COLUMN),
            subject,
            link_cells: LINK_COLUMNS
                .iter()
                .map(|c| value(&line, c))
                .filter(|v| !v.is_empty())
                .collect(),
        });
    }

    log::info!("Read {} capsule rows", rows.len());
    Ok(rows)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ManifestStats {
    pub total_rows: usize,
    pub rows_with_links: usize,
    pub total_links: usize,
    pub themes: BTreeMap<String, usize>,
    pub competences: BTreeMap<String, usize>,
}

pub fn summary_stats(rows: &[CapsuleRow]) -> ManifestStats {
    let mut stats = ManifestStats {
        total_rows: rows.len(),
        ..Default::default()
    };

    for row in rows {
        if !row.link_cells.is_empty() {
            stats.rows_with_links += 1;
            stats.total_links += row.link_cells.len();
        }
        *stats.themes.entry(or_unspecified(&row.theme)).or_default() += 1;
        *stats
            .competences
            .entry(or_unspecified(&row.competence))
            .or_default() += 1;
    }

    stats
}

pub(crate) fn or_unspecified(value: &str) -> String {
    if value.trim().is_empty() {
        UNSPECIFIED.to_string()
    } else {
        value.to_string()
    }
}
