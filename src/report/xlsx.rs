//! Minimal SpreadsheetML writer: inline strings, numbers and internal hyperlinks.

use std::fmt::Write as _;
use std::fs;
use std::io::{Cursor, Seek, Write};
use std::path::Path;

use tracing::info;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::{Cell, Sheet, Workbook};
use crate::AppResult;

const XML_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;
const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PKG_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

pub const CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Escapes text for element and attribute content, dropping characters XML 1.0 forbids.
fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\t' | '\n' | '\r' => out.push(ch),
            c if c < ' ' => {}
            c => out.push(c),
        }
    }
    out
}

/// 0-based column index to spreadsheet letters (`0 -> A`, `26 -> AA`).
pub fn column_name(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(char::from(b'A' + rem as u8));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

fn content_types(count: usize) -> String {
    let mut xml = format!(
        r#"{XML_HEADER}<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#
    );
    for n in 1..=count {
        let _ = write!(
            xml,
            r#"<Override PartName="/xl/worksheets/sheet{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
        );
    }
    xml.push_str("</Types>");
    xml
}

fn root_rels() -> String {
    format!(
        r#"{XML_HEADER}<Relationships xmlns="{PKG_REL_NS}"><Relationship Id="rId1" Type="{REL_NS}/officeDocument" Target="xl/workbook.xml"/></Relationships>"#
    )
}

fn workbook_xml(workbook: &Workbook) -> String {
    let mut xml = format!(r#"{XML_HEADER}<workbook xmlns="{MAIN_NS}" xmlns:r="{REL_NS}"><sheets>"#);
    for (i, sheet) in workbook.sheets.iter().enumerate() {
        let n = i + 1;
        let _ = write!(
            xml,
            r#"<sheet name="{}" sheetId="{n}" r:id="rId{n}"/>"#,
            escape(&sheet.name)
        );
    }
    xml.push_str("</sheets></workbook>");
    xml
}

fn workbook_rels(count: usize) -> String {
    let mut xml = format!(r#"{XML_HEADER}<Relationships xmlns="{PKG_REL_NS}">"#);
    for n in 1..=count {
        let _ = write!(
            xml,
            r#"<Relationship Id="rId{n}" Type="{REL_NS}/worksheet" Target="worksheets/sheet{n}.xml"/>"#
        );
    }
    xml.push_str("</Relationships>");
    xml
}

fn inline_text(reference: &str, text: &str) -> String {
    format!(
        r#"<c r="{reference}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
        escape(text)
    )
}

fn sheet_xml(sheet: &Sheet) -> String {
    let mut xml = format!(r#"{XML_HEADER}<worksheet xmlns="{MAIN_NS}"><sheetData>"#);
    let mut links = Vec::new();

    for (r, row) in sheet.rows.iter().enumerate() {
        let row_number = r + 1;
        let _ = write!(xml, r#"<row r="{row_number}">"#);
        for (c, cell) in row.iter().enumerate() {
            let reference = format!("{}{row_number}", column_name(c));
            match cell {
                Cell::Text(text) => xml.push_str(&inline_text(&reference, text)),
                Cell::Number(value) if value.is_finite() => {
                    let _ = write!(xml, r#"<c r="{reference}"><v>{value}</v></c>"#);
                }
                Cell::Number(_) => {}
                Cell::Link { label, sheet } => {
                    xml.push_str(&inline_text(&reference, label));
                    links.push((reference, label.as_str(), sheet.as_str()));
                }
            }
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData>");

    if !links.is_empty() {
        xml.push_str("<hyperlinks>");
        for (reference, label, target) in links {
            let location = format!("'{}'!A1", target.replace('\'', "''"));
            let _ = write!(
                xml,
                r#"<hyperlink ref="{reference}" location="{}" display="{}"/>"#,
                escape(&location),
                escape(label)
            );
        }
        xml.push_str("</hyperlinks>");
    }
    xml.push_str("</worksheet>");
    xml
}

/// Streams the workbook as an `.xlsx` package.
pub fn write<W: Write + Seek>(workbook: &Workbook, writer: W) -> AppResult<W> {
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(writer);
    let count = workbook.sheets.len();

    zip.start_file("[Content_Types].xml", options)?;
    zip.write_all(content_types(count).as_bytes())?;
    zip.start_file("_rels/.rels", options)?;
    zip.write_all(root_rels().as_bytes())?;
    zip.start_file("xl/workbook.xml", options)?;
    zip.write_all(workbook_xml(workbook).as_bytes())?;
    zip.start_file("xl/_rels/workbook.xml.rels", options)?;
    zip.write_all(workbook_rels(count).as_bytes())?;

    for (i, sheet) in workbook.sheets.iter().enumerate() {
        zip.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), options)?;
        zip.write_all(sheet_xml(sheet).as_bytes())?;
    }

    Ok(zip.finish()?)
}

pub fn to_bytes(workbook: &Workbook) -> AppResult<Vec<u8>> {
    Ok(write(workbook, Cursor::new(Vec::new()))?.into_inner())
}

/// Writes the workbook to `path`, replacing any existing file.
pub fn save(workbook: &Workbook, path: &Path) -> AppResult<()> {
    let bytes = to_bytes(workbook)?;
    fs::write(path, &bytes)
        .map_err(|e| crate::AppError::from(e).with_context("path", path.display().to_string()))?;
    info!(
        target: "citrus_farms",
        event = "report_written",
        path = %path.display(),
        sheets = workbook.sheets.len(),
        bytes = bytes.len()
    );
    Ok(())
}
