//! Spreadsheet extractor rendering each sheet as a pipe-delimited table.

use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use calamine::{open_workbook_auto_from_rs, Reader};
use tracing::warn;

use cerberus_core::defaults::SPREADSHEET_MAX_ROWS;
use cerberus_core::{Error, Extractor, Result};

const SPREADSHEET_TYPES: &[&str] = &[
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-excel",
    "application/vnd.ms-excel.sheet.macroenabled.12",
    "application/vnd.oasis.opendocument.spreadsheet",
];

/// One worksheet as rows of cell strings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<String>>,
}

/// Parses workbook bytes into sheets.
pub trait WorkbookReader: Send + Sync {
    fn read_sheets(&self, data: &[u8]) -> Result<Vec<Sheet>>;
}

/// Workbook reader for xlsx, xlsm, xls, and ods files.
pub struct CalamineReader;

impl WorkbookReader for CalamineReader {
    fn read_sheets(&self, data: &[u8]) -> Result<Vec<Sheet>> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(data.to_vec()))
            .map_err(|e| Error::InvalidInput(format!("failed to open workbook: {}", e)))?;

        let mut sheets = Vec::new();
        for name in workbook.sheet_names() {
            let rows = match workbook.worksheet_range(&name) {
                Ok(range) => range
                    .rows()
                    .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                    .collect(),
                Err(e) => {
                    warn!(sheet = %name, error = %e, "Unreadable sheet, rendering as empty");
                    Vec::new()
                }
            };
            sheets.push(Sheet { name, rows });
        }
        Ok(sheets)
    }
}

/// Renders every sheet under a `Sheet: <name>` header.
///
/// Fully blank rows are skipped. At most `max_rows` non-blank rows per
/// sheet are rendered; longer sheets get a truncation note.
pub struct SpreadsheetExtractor {
    reader: Arc<dyn WorkbookReader>,
    max_rows: usize,
}

impl SpreadsheetExtractor {
    pub fn new() -> Self {
        Self::with_reader(Arc::new(CalamineReader))
    }

    pub fn with_reader(reader: Arc<dyn WorkbookReader>) -> Self {
        Self {
            reader,
            max_rows: SPREADSHEET_MAX_ROWS,
        }
    }
}

impl Default for SpreadsheetExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn is_blank(row: &[String]) -> bool {
    row.iter().all(|cell| cell.trim().is_empty())
}

/// Render sheets; `None` when no sheet had a non-blank row.
fn render_sheets(sheets: &[Sheet], max_rows: usize) -> Option<String> {
    let mut out = String::new();
    let mut has_content = false;

    for (idx, sheet) in sheets.iter().enumerate() {
        if idx > 0 {
            out.push_str("\n\n");
        }
        out.push_str(&format!("Sheet: {}\n", sheet.name));
        out.push_str(&"-".repeat(sheet.name.chars().count() + 7));
        out.push_str("\n\n");

        let rows: Vec<&Vec<String>> = sheet.rows.iter().filter(|r| !is_blank(r)).collect();
        if rows.is_empty() {
            out.push_str("(Empty sheet)\n");
            continue;
        }

        let shown = &rows[..rows.len().min(max_rows)];
        let width = shown.iter().map(|r| r.len()).max().unwrap_or(0);

        for (i, row) in shown.iter().enumerate() {
            let cells: Vec<&str> = (0..width)
                .map(|j| row.get(j).map(String::as_str).unwrap_or(""))
                .collect();
            out.push_str("| ");
            out.push_str(&cells.join(" | "));
            out.push_str(" |\n");

            if i == 0 && shown.len() > 1 {
                out.push('|');
                out.push_str(&" --- |".repeat(width));
                out.push('\n');
            }
        }

        if rows.len() > max_rows {
            out.push_str(&format!(
                "\n(Showing first {} rows of {})\n",
                max_rows,
                rows.len()
            ));
        }
        has_content = true;
    }

    has_content.then_some(out)
}

#[async_trait]
impl Extractor for SpreadsheetExtractor {
    fn can_handle(&self, mime_type: &str) -> bool {
        SPREADSHEET_TYPES.iter().any(|t| mime_type.starts_with(t))
    }

    async fn extract(&self, data: &[u8]) -> Result<String> {
        let reader = self.reader.clone();
        let bytes = data.to_vec();
        let sheets = tokio::task::spawn_blocking(move || reader.read_sheets(&bytes))
            .await
            .map_err(|e| Error::Internal(format!("workbook parse task failed: {}", e)))??;

        if sheets.is_empty() {
            return Err(Error::EmptyContent("no sheets found in workbook".to_string()));
        }

        render_sheets(&sheets, self.max_rows).ok_or_else(|| {
            Error::EmptyContent("no content extracted from workbook".to_string())
        })
    }

    fn name(&self) -> &str {
        "spreadsheet"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedReader(Vec<Sheet>);

    impl WorkbookReader for FixedReader {
        fn read_sheets(&self, _data: &[u8]) -> Result<Vec<Sheet>> {
            Ok(self.0.clone())
        }
    }

    fn sheet(name: &str, rows: &[&[&str]]) -> Sheet {
        Sheet {
            name: name.to_string(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    fn extractor(sheets: Vec<Sheet>) -> SpreadsheetExtractor {
        SpreadsheetExtractor::with_reader(Arc::new(FixedReader(sheets)))
    }

    #[test]
    fn test_accepts_spreadsheet_types() {
        let e = SpreadsheetExtractor::new();
        assert!(e.can_handle(
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        ));
        assert!(e.can_handle("application/vnd.ms-excel"));
        assert!(e.can_handle("application/vnd.oasis.opendocument.spreadsheet"));
        assert!(!e.can_handle("text/csv"));
    }

    #[tokio::test]
    async fn test_renders_table() {
        let text = extractor(vec![sheet(
            "Budget",
            &[&["Item", "Cost"], &["", ""], &["Servers", "1200", "Q3"]],
        )])
        .extract(b"")
        .await
        .unwrap();

        let expected = "Sheet: Budget\n\
                        -------------\n\
                        \n\
                        | Item | Cost |  |\n\
                        | --- | --- | --- |\n\
                        | Servers | 1200 | Q3 |\n";
        assert_eq!(text, expected);
    }

    #[tokio::test]
    async fn test_multiple_sheets_and_empty_sheet() {
        let text = extractor(vec![sheet("A", &[&["x"]]), sheet("Notes", &[&["  "]])])
            .extract(b"")
            .await
            .unwrap();
        assert!(text.contains("Sheet: A\n--------\n\n| x |\n"));
        assert!(text.contains("\n\nSheet: Notes\n------------\n\n(Empty sheet)\n"));
    }

    #[tokio::test]
    async fn test_truncates_long_sheet() {
        let rows: Vec<Vec<String>> = (0..1005).map(|i| vec![format!("row{}", i)]).collect();
        let text = extractor(vec![Sheet {
            name: "Big".to_string(),
            rows,
        }])
        .extract(b"")
        .await
        .unwrap();

        assert!(text.contains("| row999 |"));
        assert!(!text.contains("| row1000 |"));
        assert!(text.ends_with("(Showing first 1000 rows of 1005)\n"));
    }

    #[tokio::test]
    async fn test_all_blank_is_empty_content() {
        let err = extractor(vec![sheet("S1", &[&["", " "]]), sheet("S2", &[])])
            .extract(b"")
            .await
            .unwrap_err();
        assert!(err.is_empty_content());
    }

    #[tokio::test]
    async fn test_zero_sheets_is_empty_content() {
        let err = extractor(vec![]).extract(b"").await.unwrap_err();
        assert!(err.is_empty_content());
    }

    #[tokio::test]
    async fn test_garbage_bytes_rejected_by_calamine() {
        let err = SpreadsheetExtractor::new()
            .extract(b"not a workbook")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
