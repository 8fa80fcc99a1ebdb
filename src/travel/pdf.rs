//! PDF rendering of a [`TravelReport`] on landscape letter pages.

use printpdf::{BuiltinFont, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference, Point};
use thiserror::Error;

use super::report::{ReportTable, TravelReport};

const PAGE_W: f32 = 279.4;
const PAGE_H: f32 = 215.9;
const MARGIN: f32 = 12.0;
const ROW_H: f32 = 6.5;
const LABEL_COL_W: f32 = 38.0;
const FONT_SIZE: f32 = 8.0;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("PDF error: {0}")]
    Pdf(String),
}

struct Canvas {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    /// Distance from the bottom edge of the next line to draw
    y: f32,
}

impl Canvas {
    fn new(title: &str) -> Result<Self, ReportError> {
        let (doc, page, layer) = PdfDocument::new(title, Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| ReportError::Pdf(e.to_string()))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| ReportError::Pdf(e.to_string()))?;
        let layer = doc.get_page(page).get_layer(layer);
        Ok(Canvas {
            doc,
            layer,
            regular,
            bold,
            y: PAGE_H - MARGIN,
        })
    }

    fn new_page(&mut self) {
        let (page, layer) = self.doc.add_page(Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = PAGE_H - MARGIN;
    }

    /// Start a new page unless `height` still fits above the bottom margin
    fn reserve(&mut self, height: f32) {
        if self.y - height < MARGIN {
            self.new_page();
        }
    }

    fn text(&self, text: &str, size: f32, x: f32, y: f32, bold: bool) {
        let font = if bold { &self.bold } else { &self.regular };
        self.layer.use_text(text, size, Mm(x), Mm(y), font);
    }

    fn hline(&self, x1: f32, x2: f32, y: f32) {
        self.line(x1, y, x2, y);
    }

    fn line(&self, x1: f32, y1: f32, x2: f32, y2: f32) {
        self.layer.add_line(Line {
            points: vec![
                (Point::new(Mm(x1), Mm(y1)), false),
                (Point::new(Mm(x2), Mm(y2)), false),
            ],
            is_closed: false,
        });
    }

    fn table(&mut self, table: &ReportTable) {
        let height = ROW_H * (table.rows.len() as f32 + 2.0);
        self.reserve(height);

        self.text(&table.title, 10.0, MARGIN, self.y - 4.0, true);
        self.y -= ROW_H;

        let data_cols = table.header.len().saturating_sub(1).max(1) as f32;
        let col_w = (PAGE_W - 2.0 * MARGIN - LABEL_COL_W) / data_cols;
        let x_of = |i: usize| {
            if i == 0 {
                MARGIN
            } else {
                MARGIN + LABEL_COL_W + col_w * (i as f32 - 1.0)
            }
        };
        let right = PAGE_W - MARGIN;
        let top = self.y;

        self.hline(MARGIN, right, self.y);
        for (i, cell) in table.header.iter().enumerate() {
            self.text(cell, FONT_SIZE, x_of(i) + 1.5, self.y - 4.5, true);
        }
        self.y -= ROW_H;
        self.hline(MARGIN, right, self.y);

        for row in &table.rows {
            let bold = row.first().is_some_and(|label| label == "Daily Total");
            for (i, cell) in row.iter().enumerate() {
                self.text(cell, FONT_SIZE, x_of(i) + 1.5, self.y - 4.5, bold);
            }
            self.y -= ROW_H;
            self.hline(MARGIN, right, self.y);
        }

        for i in 0..table.header.len() {
            self.line(x_of(i), top, x_of(i), self.y);
        }
        self.line(right, top, right, self.y);
        self.y -= ROW_H;
    }

    fn finish(self) -> Result<Vec<u8>, ReportError> {
        self.doc.save_to_bytes().map_err(|e| ReportError::Pdf(e.to_string()))
    }
}

/// Render the report to PDF bytes
pub fn render(report: &TravelReport) -> Result<Vec<u8>, ReportError> {
    let mut canvas = Canvas::new(&report.title)?;

    canvas.text(&report.title, 16.0, MARGIN, canvas.y - 6.0, true);
    canvas.y -= 14.0;

    for (label, value) in &report.details {
        canvas.text(&format!("{}:", label), 9.0, MARGIN, canvas.y, true);
        canvas.text(value, 9.0, MARGIN + 30.0, canvas.y, false);
        canvas.y -= 5.0;
    }
    canvas.y -= 4.0;

    for table in &report.tables {
        canvas.table(table);
    }

    canvas.reserve(ROW_H * 2.0);
    canvas.text(&format!("Estimated Total: {}", report.grand_total), 11.0, MARGIN, canvas.y, true);
    canvas.y -= ROW_H * 2.0;

    for sig in &report.signatures {
        canvas.reserve(ROW_H * 2.0);
        let y = canvas.y;
        canvas.text(&format!("{}: {}", sig.role, sig.name), 9.0, MARGIN, y, true);
        canvas.text(&sig.signature, 11.0, MARGIN + 90.0, y, false);
        canvas.hline(MARGIN + 88.0, MARGIN + 170.0, y - 1.5);
        canvas.text("Date:", 9.0, MARGIN + 180.0, y, true);
        canvas.text(&sig.date, 9.0, MARGIN + 192.0, y, false);
        canvas.hline(MARGIN + 190.0, MARGIN + 230.0, y - 1.5);
        canvas.y -= ROW_H * 2.0;
    }

    canvas.finish()
}
