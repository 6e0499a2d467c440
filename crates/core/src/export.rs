use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tabled::{Table, Tabled, settings::Style};
use thiserror::Error;
use tracing::{info, warn};

use crate::models::WeaponRecord;

pub const DEFAULT_BASE_NAME: &str = "weapons";
pub const DEDUP_REPORT_FILE: &str = "deduplication_report.txt";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("csv encoding failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ExportError + '_ {
    move |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Which files a run writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    All,
    Csv,
    Json,
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutputFormat::All => "all",
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
            OutputFormat::Markdown => "markdown",
        };
        f.write_str(s)
    }
}

#[derive(Tabled)]
struct MarkdownRow {
    game: String,
    category: String,
    toc_name: String,
    real_world_name: String,
    in_game_name: String,
}

impl From<&WeaponRecord> for MarkdownRow {
    fn from(r: &WeaponRecord) -> Self {
        let cell = |s: &str| s.replace('|', "\\|");
        Self {
            game: cell(&r.game),
            category: cell(&r.category),
            toc_name: cell(&r.toc_name),
            real_world_name: cell(&r.real_world_name),
            in_game_name: cell(&r.in_game_name),
        }
    }
}

/// Markdown document with a title, the total count and one table row per record.
pub fn render_markdown(records: &[WeaponRecord]) -> String {
    let mut table = Table::new(records.iter().map(MarkdownRow::from));
    table.with(Style::markdown());
    format!(
        "# IMFDB Weapons Data\n\nTotal weapons: {}\n\n{table}\n",
        records.len()
    )
}

/// Writes record lists and reports under one output directory.
#[derive(Debug, Clone)]
pub struct Exporter {
    output_dir: PathBuf,
}

impl Exporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    fn target(&self, filename: &str) -> Result<PathBuf, ExportError> {
        fs::create_dir_all(&self.output_dir).map_err(io_error(&self.output_dir))?;
        Ok(self.output_dir.join(filename))
    }

    /// Returns `None` without touching the disk when there is nothing to write.
    pub fn save_csv(
        &self,
        records: &[WeaponRecord],
        filename: &str,
    ) -> Result<Option<PathBuf>, ExportError> {
        if records.is_empty() {
            warn!("no weapons data to save");
            return Ok(None);
        }
        let path = self.target(filename)?;
        let mut writer = csv::Writer::from_path(&path)?;
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush().map_err(io_error(&path))?;
        info!(path = %path.display(), "saved CSV");
        Ok(Some(path))
    }

    pub fn save_json(
        &self,
        records: &[WeaponRecord],
        filename: &str,
    ) -> Result<Option<PathBuf>, ExportError> {
        if records.is_empty() {
            warn!("no weapons data to save");
            return Ok(None);
        }
        let path = self.target(filename)?;
        let body = serde_json::to_string_pretty(records)?;
        fs::write(&path, body).map_err(io_error(&path))?;
        info!(path = %path.display(), "saved JSON");
        Ok(Some(path))
    }

    pub fn save_markdown(
        &self,
        records: &[WeaponRecord],
        filename: &str,
    ) -> Result<Option<PathBuf>, ExportError> {
        if records.is_empty() {
            warn!("no weapons data to save");
            return Ok(None);
        }
        let path = self.target(filename)?;
        fs::write(&path, render_markdown(records)).map_err(io_error(&path))?;
        info!(path = %path.display(), "saved Markdown");
        Ok(Some(path))
    }

    /// Write `records` in `format` using `<base>.csv`, `<base>.json`, `<base>.md`.
    pub fn save(
        &self,
        records: &[WeaponRecord],
        format: OutputFormat,
        base: &str,
    ) -> Result<Vec<PathBuf>, ExportError> {
        let mut written = Vec::new();
        if matches!(format, OutputFormat::All | OutputFormat::Csv) {
            written.extend(self.save_csv(records, &format!("{base}.csv"))?);
        }
        if matches!(format, OutputFormat::All | OutputFormat::Json) {
            written.extend(self.save_json(records, &format!("{base}.json"))?);
        }
        if matches!(format, OutputFormat::All | OutputFormat::Markdown) {
            written.extend(self.save_markdown(records, &format!("{base}.md"))?);
        }
        Ok(written)
    }

    pub fn save_all(&self, records: &[WeaponRecord]) -> Result<Vec<PathBuf>, ExportError> {
        self.save(records, OutputFormat::All, DEFAULT_BASE_NAME)
    }

    /// Write a plain-text report, e.g. [`DEDUP_REPORT_FILE`].
    pub fn save_report(&self, filename: &str, contents: &str) -> Result<PathBuf, ExportError> {
        let path = self.target(filename)?;
        fs::write(&path, contents).map_err(io_error(&path))?;
        info!(path = %path.display(), "saved report");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn records() -> Vec<WeaponRecord> {
        vec![
            WeaponRecord::new("MW2", "Assault Rifles", "M4A1 (M4)", "M4A1", "M4"),
            WeaponRecord::new("MW2", "Pistols", "Glock 17", "", "Glock 17"),
        ]
    }

    #[test]
    fn csv_has_header_and_rows_in_order() {
        let dir = tempdir().unwrap();
        let exporter = Exporter::new(dir.path());
        let path = exporter.save_csv(&records(), "weapons.csv").unwrap().unwrap();
        let body = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(
            lines,
            vec![
                "game,category,toc_name,real_world_name,in_game_name",
                "MW2,Assault Rifles,M4A1 (M4),M4A1,M4",
                "MW2,Pistols,Glock 17,,Glock 17",
            ]
        );
    }

    #[test]
    fn json_keeps_empty_strings() {
        let dir = tempdir().unwrap();
        let exporter = Exporter::new(dir.path());
        let path = exporter.save_json(&records(), "weapons.json").unwrap().unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        let items = value.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1]["real_world_name"], serde_json::json!(""));
        assert_eq!(items[0]["toc_name"], serde_json::json!("M4A1 (M4)"));
        let back: Vec<WeaponRecord> = serde_json::from_value(value).unwrap();
        assert_eq!(back, records());
    }

    #[test]
    fn markdown_has_title_total_and_escaped_cells() {
        let mut input = records();
        input.push(WeaponRecord::new("MW2", "Misc", "A | B", "", "A | B"));
        let md = render_markdown(&input);
        assert!(md.starts_with("# IMFDB Weapons Data\n\nTotal weapons: 3\n\n"));
        assert!(md.contains("toc_name"));
        assert!(md.contains("A \\| B"));
        assert!(md.contains("Glock 17"));
    }

    #[test]
    fn empty_records_write_nothing() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        let exporter = Exporter::new(&out);
        let written = exporter.save_all(&[]).unwrap();
        assert!(written.is_empty());
        assert!(!out.exists());
    }

    #[test]
    fn save_respects_format() {
        let dir = tempdir().unwrap();
        let exporter = Exporter::new(dir.path());
        let written = exporter.save(&records(), OutputFormat::Json, "w").unwrap();
        assert_eq!(written, vec![dir.path().join("w.json")]);
        let written = exporter.save_all(&records()).unwrap();
        assert_eq!(written.len(), 3);
        assert!(dir.path().join("weapons.md").exists());
    }

    #[test]
    fn report_is_written_verbatim() {
        let dir = tempdir().unwrap();
        let exporter = Exporter::new(dir.path().join("nested"));
        let path = exporter.save_report(DEDUP_REPORT_FILE, "hello\n").unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "hello\n");
    }
}
