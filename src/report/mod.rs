//! Spreadsheet-shaped views of a farm collection.
//!
//! [`build_report`] produces a summary sheet linking to one detail sheet per farm;
//! [`build_contacts`] produces a single name/contact sheet. [`xlsx`] serializes either.

use std::collections::HashSet;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{ContractStatus, Farm, Labelled, Plot};
use crate::time::iso_date;

pub mod xlsx;

pub const SUMMARY_SHEET: &str = "Farms";
pub const CONTACTS_SHEET: &str = "Contacts";
pub const EMPTY_PLACEHOLDER: &str = "No farms";
pub const MAX_SHEET_NAME: usize = 31;
const FALLBACK_SHEET_NAME: &str = "Farm";

pub const SUMMARY_HEADERS: [&str; 9] = [
    "Name",
    "Contact",
    "Plots",
    "Total area (pyeong)",
    "Cultivars",
    "Corporate",
    "Sugar service",
    "Sensor service",
    "Detail",
];

pub const SUPPORT_PROGRAMS_TITLE: &str = "Support programs";
pub const ANNUAL_DATA_TITLE: &str = "Annual data";
pub const CONSULTATION_LOGS_TITLE: &str = "Consultation logs";

static ILLEGAL_SHEET_CHARS: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"[\[\]:*?/\\]").expect("valid sheet-name pattern")
});

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    /// Internal hyperlink to cell A1 of another sheet in the same workbook.
    Link { label: String, sheet: String },
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    pub fn flag(value: bool) -> Self {
        Cell::Text(if value { "Y" } else { "N" }.to_string())
    }

    /// Plain text rendering used by tests and the contacts view.
    pub fn display(&self) -> String {
        match self {
            Cell::Text(text) => text.clone(),
            Cell::Number(value) => value.to_string(),
            Cell::Link { label, .. } => label.clone(),
        }
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Number(value as f64)
    }
}

impl From<i32> for Cell {
    fn from(value: i32) -> Self {
        Cell::Number(f64::from(value))
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<Cell>>,
}

impl Sheet {
    fn new(name: impl Into<String>) -> Self {
        Sheet {
            name: name.into(),
            rows: Vec::new(),
        }
    }

    fn push<I, C>(&mut self, row: I)
    where
        I: IntoIterator<Item = C>,
        C: Into<Cell>,
    {
        self.rows.push(row.into_iter().map(Into::into).collect());
    }

    fn blank(&mut self) {
        if !self.rows.is_empty() {
            self.rows.push(Vec::new());
        }
    }

    fn pair(&mut self, key: &str, value: impl Into<Cell>) {
        self.rows.push(vec![Cell::text(key), value.into()]);
    }

    /// Whether any row starts with `title`.
    pub fn has_block(&self, title: &str) -> bool {
        self.rows
            .iter()
            .any(|row| matches!(row.first(), Some(Cell::Text(text)) if text.starts_with(title)))
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|sheet| sheet.name == name)
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|sheet| sheet.name.as_str()).collect()
    }
}

fn trim_sheet_edges(name: &str) -> &str {
    name.trim_matches(|c: char| c.is_whitespace() || c == '\'')
}

/// Strips characters spreadsheets refuse in sheet names and clamps the length.
/// Names may not begin or end with an apostrophe.
pub fn sanitize_sheet_name(raw: &str) -> String {
    let cleaned = ILLEGAL_SHEET_CHARS.replace_all(raw, "");
    let truncated: String = trim_sheet_edges(&cleaned).chars().take(MAX_SHEET_NAME).collect();
    let trimmed = trim_sheet_edges(&truncated);
    if trimmed.is_empty() {
        FALLBACK_SHEET_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Hands out sheet names that stay unique (case-insensitively) after truncation.
struct SheetNames {
    taken: HashSet<String>,
}

impl SheetNames {
    fn new(reserved: &[&str]) -> Self {
        SheetNames {
            taken: reserved.iter().map(|name| name.to_lowercase()).collect(),
        }
    }

    fn claim(&mut self, raw: &str) -> String {
        let base = sanitize_sheet_name(raw);
        if self.taken.insert(base.to_lowercase()) {
            return base;
        }
        let mut n = 2usize;
        loop {
            let suffix = format!(" ({n})");
            let room = MAX_SHEET_NAME.saturating_sub(suffix.chars().count());
            let stem: String = base.chars().take(room).collect();
            let candidate = format!("{}{suffix}", stem.trim_end());
            if self.taken.insert(candidate.to_lowercase()) {
                return candidate;
            }
            n += 1;
        }
    }
}

pub fn file_name(label: &str, date: NaiveDate) -> String {
    format!("{label}_{}.xlsx", iso_date(date))
}

fn cultivars(farm: &Farm) -> String {
    let mut seen = Vec::new();
    for plot in &farm.plots {
        let cultivar = plot.cultivar.trim();
        if !cultivar.is_empty() && !seen.contains(&cultivar) {
            seen.push(cultivar);
        }
    }
    seen.join(", ")
}

/// Summary sheet plus one detail sheet per farm, in input order.
pub fn build_report(farms: &[Farm]) -> Workbook {
    let mut summary = Sheet::new(SUMMARY_SHEET);
    summary.push(SUMMARY_HEADERS);

    if farms.is_empty() {
        summary.push([EMPTY_PLACEHOLDER]);
        return Workbook {
            sheets: vec![summary],
        };
    }

    let mut names = SheetNames::new(&[SUMMARY_SHEET]);
    let mut details = Vec::with_capacity(farms.len());
    for farm in farms {
        let sheet_name = names.claim(&farm.name);
        let any = |pred: fn(&Plot) -> bool| farm.plots.iter().any(pred);
        summary.rows.push(vec![
            Cell::text(&farm.name),
            Cell::text(&farm.contact),
            Cell::from(farm.plots.len() as i64),
            Cell::from(farm.total_area()),
            Cell::text(cultivars(farm)),
            Cell::flag(any(|p| p.corporate.is_corporate())),
            Cell::flag(any(|p| p.service_info.sugar_service.is_used())),
            Cell::flag(any(|p| p.service_info.sensor_service.is_used())),
            Cell::Link {
                label: "Open".to_string(),
                sheet: sheet_name.clone(),
            },
        ]);
        details.push(detail_sheet(farm, sheet_name));
    }

    let mut sheets = vec![summary];
    sheets.extend(details);
    Workbook { sheets }
}

fn detail_sheet(farm: &Farm, name: String) -> Sheet {
    let mut sheet = Sheet::new(name);
    sheet.push(["Basic info"]);
    sheet.pair("Name", farm.name.as_str());
    sheet.pair("Contact", farm.contact.as_str());
    sheet.pair("Plots", farm.plots.len() as i64);

    for (index, plot) in farm.plots.iter().enumerate() {
        let label = format!("Plot {}", index + 1);
        plot_blocks(&mut sheet, &label, plot);
    }
    sheet
}

fn plot_blocks(sheet: &mut Sheet, label: &str, plot: &Plot) {
    sheet.blank();
    sheet.push([label]);
    sheet.pair("Address", plot.address.as_str());
    sheet.pair("Area (pyeong)", plot.area_pyeong);
    sheet.pair("Cultivar", plot.cultivar.as_str());
    sheet.pair("Tree count", plot.tree_count);
    sheet.pair("Corporate", Cell::flag(plot.corporate.is_corporate()));

    if let Some(details) = plot.corporate.details() {
        sheet.blank();
        sheet.push([format!("Corporate details ({label})")]);
        sheet.pair("Year", details.year);
        sheet.pair("Consultation date", details.consultation_date.as_str());
        sheet.pair("Estimated quantity", details.estimated_quantity);
        sheet.pair("Contracted quantity", details.contracted_quantity);
        sheet.pair("Special notes", details.special_notes.as_str());
        match &details.contract {
            ContractStatus::Contracted(terms) => {
                sheet.pair("Contracted", Cell::flag(true));
                sheet.pair("Contract date", terms.contract_date.as_str());
                sheet.pair("Down payment", terms.down_payment);
                sheet.pair("Balance due date", terms.balance_due_date.as_str());
                sheet.pair("Balance payment", terms.balance_payment);
                sheet.pair("Mulching work date", terms.mulching_work_date.as_str());
            }
            ContractStatus::Uncontracted => sheet.pair("Contracted", Cell::flag(false)),
        }
    }

    let facility = &plot.facility_info;
    sheet.blank();
    sheet.push([format!("Facility ({label})")]);
    sheet.pair("Slope", facility.slope.as_str());
    sheet.pair("Planting distance", facility.planting_distance.as_str());
    sheet.pair("Covering", Cell::flag(facility.has_covering));
    sheet.pair(
        "Covering type",
        facility.covering_type.map(Labelled::label).unwrap_or(""),
    );
    sheet.pair("Power", Cell::flag(facility.has_power));
    sheet.pair("Internet", Cell::flag(facility.has_internet));
    sheet.pair("Umbrella system", Cell::flag(facility.has_umbrella_system));
    sheet.pair("Drip hose", Cell::flag(facility.has_drip_hose));
    sheet.pair("Sprinkler", Cell::flag(facility.has_sprinkler));
    sheet.pair("Windbreak", Cell::flag(facility.has_windbreak));
    sheet.pair("Opener", Cell::flag(facility.has_opener));

    let service = &plot.service_info;
    sheet.blank();
    sheet.push([format!("Services ({label})")]);
    sheet.pair("Portal ID", service.portal_id.as_str());
    sheet.pair("Sugar service", Cell::flag(service.sugar_service.is_used()));
    sheet.pair("Sugar meter", service.sugar_service.detail().unwrap_or(""));
    sheet.pair("Sensor service", Cell::flag(service.sensor_service.is_used()));
    sheet.pair("Sensor", service.sensor_service.detail().unwrap_or(""));

    if !plot.support_programs.is_empty() {
        sheet.blank();
        sheet.push([format!("{SUPPORT_PROGRAMS_TITLE} ({label})")]);
        sheet.push([
            "Year",
            "Project",
            "Description",
            "Local govt fund",
            "Self fund",
            "Selected",
        ]);
        for program in &plot.support_programs {
            sheet.rows.push(vec![
                Cell::from(program.year),
                Cell::text(&program.project_name),
                Cell::text(&program.project_description),
                Cell::from(program.local_govt_fund),
                Cell::from(program.self_fund),
                Cell::flag(program.is_selected),
            ]);
        }
    }

    if !plot.annual_data.is_empty() {
        sheet.blank();
        sheet.push([format!("{ANNUAL_DATA_TITLE} ({label})")]);
        sheet.push([
            "Year",
            "Avg brix",
            "Alternate bearing",
            "Estimated yield",
            "Price per gwan",
            "Shipping season",
            "Notes",
        ]);
        for entry in &plot.annual_data {
            sheet.rows.push(vec![
                Cell::from(entry.year),
                Cell::from(entry.avg_brix),
                Cell::flag(entry.has_alternate_bearing),
                Cell::from(entry.estimated_yield),
                Cell::from(entry.price_per_gwan),
                Cell::text(&entry.shipping_season),
                Cell::text(&entry.notes),
            ]);
        }
    }

    if !plot.consultation_logs.is_empty() {
        sheet.blank();
        sheet.push([format!("{CONSULTATION_LOGS_TITLE} ({label})")]);
        sheet.push(["Date", "Category", "Content", "Notes"]);
        for log in &plot.consultation_logs {
            sheet.rows.push(vec![
                Cell::text(&log.date),
                Cell::text(log.category.map(Labelled::label).unwrap_or("")),
                Cell::text(&log.content),
                Cell::text(&log.notes),
            ]);
        }
    }
}

/// Single `Contacts` sheet with one name/contact row per farm.
pub fn build_contacts(farms: &[Farm]) -> Workbook {
    let mut sheet = Sheet::new(CONTACTS_SHEET);
    sheet.push(["Name", "Contact"]);
    for farm in farms {
        sheet.push([farm.name.as_str(), farm.contact.as_str()]);
    }
    Workbook {
        sheets: vec![sheet],
    }
}
