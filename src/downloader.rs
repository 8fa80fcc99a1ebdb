use rust_xlsxwriter::{Format, Workbook};
use std::error::Error;

use crate::sheet::Table;

/// Export format for a worksheet download
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Xlsx,
}

impl ExportFormat {
    /// Format from a file extension or query value (`csv`, `xlsx`)
    pub fn parse(raw: &str) -> Option<Self> {
        let ext = raw.rsplit('.').next().unwrap_or(raw);
        match ext.trim().to_ascii_lowercase().as_str() {
            "csv" => Some(ExportFormat::Csv),
            "xlsx" => Some(ExportFormat::Xlsx),
            _ => None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
        }
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Convert a worksheet to CSV, header row first.
///
/// Fields holding commas, quotes or line breaks are quoted.
///
/// ```
/// use gutap::downloader::to_csv;
/// use gutap::sheet::Table;
///
/// let mut table = Table::new(&["Ticket ID", "Summary"]);
/// table.rows.push(vec!["GU0001".into(), "call, then email".into()]);
/// assert_eq!(to_csv(&table), "Ticket ID,Summary\nGU0001,\"call, then email\"\n");
/// ```
pub fn to_csv(table: &Table) -> String {
    let mut csv_content = String::new();
    for row in table.to_grid() {
        let line: Vec<String> = row.iter().map(|v| csv_field(v)).collect();
        csv_content.push_str(&line.join(","));
        csv_content.push('\n');
    }
    csv_content
}

/// Convert a worksheet to XLSX with a bold header row
pub fn to_xlsx(table: &Table, worksheet_name: &str) -> Result<Vec<u8>, Box<dyn Error>> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(worksheet_name)?;

    let bold = Format::new().set_bold();
    for (c, header) in table.headers.iter().enumerate() {
        worksheet.write_string_with_format(0, c as u16, header, &bold)?;
    }
    for (r, row) in table.rows.iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            worksheet.write_string((r + 1) as u32, c as u16, value)?;
        }
    }

    let buffer = workbook.save_to_buffer()?;
    Ok(buffer)
}

/// Export a worksheet in `format`
pub fn export(table: &Table, worksheet_name: &str, format: ExportFormat) -> Result<Vec<u8>, Box<dyn Error>> {
    match format {
        ExportFormat::Csv => Ok(to_csv(table).into_bytes()),
        ExportFormat::Xlsx => to_xlsx(table, worksheet_name),
    }
}
