//! Upgrades persisted farm records of any historical shape into the current [`Farm`] schema.
//!
//! Records are classified independently by probing for structural markers:
//!
//! * an embedded `basicInfo` object marks the flat shapes without plots (with or without
//!   the corporate block);
//! * a plot-shaped record that still carries farm-level corporate, support or service
//!   fields is a partially migrated record whose leftovers move onto its first plot;
//! * everything else is decoded as the current shape.
//!
//! Decoding never fails: wrong types and nulls fall back to empty defaults, and missing
//! identifiers are minted. Running the engine over its own output is a no-op.

use serde_json::{Map, Value};
use tracing::info;

use crate::id::new_uuid_v7;
use crate::model::{
    AnnualData, ConsultationCategory, ConsultationLog, ContractStatus, ContractTerms,
    CorporateDetails, CorporateStatus, CoveringType, FacilityInfo, Farm, Labelled, Plot,
    ServiceInfo, ServiceUsage, SupportProgram,
};

type Object = Map<String, Value>;

const BASIC_INFO: &str = "basicInfo";
const CORPORATE_DETAILS: &str = "corporateFarmDetails";
const CONSULTATION_LOGS: &str = "consultationLogs";

/// Farm-level keys that belong on a plot in the current shape.
const FARM_LEVEL_PLOT_KEYS: [&str; 4] = [
    "isCorporate",
    "supportPrograms",
    CORPORATE_DETAILS,
    "serviceInfo",
];

/// Keys carried over from the flat shapes into their single plot.
const EMBEDDED_PLOT_KEYS: [&str; 7] = [
    "isCorporate",
    "facilityInfo",
    "serviceInfo",
    "supportPrograms",
    "annualData",
    CORPORATE_DETAILS,
    CONSULTATION_LOGS,
];

const BASIC_PLOT_KEYS: [&str; 5] = ["address", "areaPyeong", "cultivar", "treeCount", "isCorporate"];

/// Schema generation detected for a raw record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    /// Embedded basic info, no plots, no corporate block.
    G1,
    /// Embedded basic info plus the corporate flag or details block.
    G2,
    /// Farm with a plot list.
    G3,
}

/// Structurally classified input record.
enum RawFarm<'a> {
    Embedded {
        generation: Generation,
        record: &'a Object,
        basic: &'a Object,
    },
    /// Plot-shaped record with farm-level fields still awaiting relocation.
    Transitional(&'a Object),
    Current(&'a Object),
    /// Not an object at all; replaced by an empty farm.
    Opaque,
}

impl<'a> RawFarm<'a> {
    fn classify(value: &'a Value) -> Self {
        let Some(record) = value.as_object() else {
            return RawFarm::Opaque;
        };
        if let Some(basic) = record.get(BASIC_INFO).and_then(Value::as_object) {
            let corporate = basic.contains_key("isCorporate")
                || record.contains_key("isCorporate")
                || record.contains_key(CORPORATE_DETAILS);
            let generation = if corporate {
                Generation::G2
            } else {
                Generation::G1
            };
            return RawFarm::Embedded {
                generation,
                record,
                basic,
            };
        }
        if FARM_LEVEL_PLOT_KEYS.iter().any(|key| record.contains_key(*key)) {
            RawFarm::Transitional(record)
        } else {
            RawFarm::Current(record)
        }
    }

    fn generation(&self) -> Generation {
        match self {
            RawFarm::Embedded { generation, .. } => *generation,
            _ => Generation::G3,
        }
    }

    fn into_farm(self) -> Farm {
        match self {
            RawFarm::Embedded { record, basic, .. } => from_embedded(record, basic),
            RawFarm::Transitional(record) => from_transitional(record),
            RawFarm::Current(record) => from_current(record),
            RawFarm::Opaque => Farm {
                id: new_uuid_v7(),
                ..Farm::default()
            },
        }
    }
}

/// Generation a raw record would be treated as.
pub fn detect_generation(value: &Value) -> Generation {
    RawFarm::classify(value).generation()
}

/// Normalization result plus whether it differs from the input.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub farms: Vec<Farm>,
    pub changed: bool,
}

pub fn normalize(raw: &[Value]) -> Vec<Farm> {
    raw.iter().map(normalize_record).collect()
}

/// Normalizes and reports whether the caller should write the result back.
pub fn normalize_with_changes(raw: &[Value]) -> Normalized {
    let mut changed = false;
    let mut upgraded = 0usize;
    let farms = raw
        .iter()
        .map(|value| {
            let farm = normalize_record(value);
            let differs = match serde_json::to_value(&farm) {
                Ok(encoded) => encoded != *value,
                Err(_) => true,
            };
            if differs {
                upgraded += 1;
            }
            changed |= differs;
            farm
        })
        .collect();

    if changed {
        info!(
            target: "citrus_farms",
            event = "normalize_changed",
            records = raw.len(),
            upgraded
        );
    }

    Normalized { farms, changed }
}

pub fn normalize_record(value: &Value) -> Farm {
    RawFarm::classify(value).into_farm()
}

fn from_embedded(record: &Object, basic: &Object) -> Farm {
    let mut plot = Object::new();
    for key in EMBEDDED_PLOT_KEYS {
        if let Some(value) = record.get(key) {
            plot.insert(key.to_string(), value.clone());
        }
    }
    for key in BASIC_PLOT_KEYS {
        if let Some(value) = basic.get(key) {
            plot.insert(key.to_string(), value.clone());
        }
    }

    let name = if basic.contains_key("name") {
        text(basic, "name")
    } else {
        text(record, "name")
    };
    let contact = if basic.contains_key("contact") {
        text(basic, "contact")
    } else {
        text(record, "contact")
    };

    Farm {
        id: identifier(record).or_else(|| identifier(basic)).unwrap_or_else(new_uuid_v7),
        name,
        contact,
        plots: vec![decode_plot(&plot)],
    }
}

fn from_transitional(record: &Object) -> Farm {
    let mut plots: Vec<Value> = list(record, "plots").to_vec();
    if plots.is_empty() {
        plots.push(Value::Object(Object::new()));
    }
    if !plots[0].is_object() {
        plots[0] = Value::Object(Object::new());
    }
    if let Some(first) = plots[0].as_object_mut() {
        for key in FARM_LEVEL_PLOT_KEYS {
            let Some(value) = record.get(key) else {
                continue;
            };
            let absent = first.get(key).map_or(true, Value::is_null);
            if absent {
                first.insert(key.to_string(), value.clone());
            }
        }
    }

    farm_with_plots(record, &plots)
}

fn from_current(record: &Object) -> Farm {
    farm_with_plots(record, list(record, "plots"))
}

fn farm_with_plots(record: &Object, plots: &[Value]) -> Farm {
    let empty = Object::new();
    Farm {
        id: identifier(record).unwrap_or_else(new_uuid_v7),
        name: text(record, "name"),
        contact: text(record, "contact"),
        plots: plots
            .iter()
            .map(|plot| decode_plot(plot.as_object().unwrap_or(&empty)))
            .collect(),
    }
}

fn decode_plot(plot: &Object) -> Plot {
    let details = object(plot, CORPORATE_DETAILS);
    let is_corporate = match plot.get("isCorporate") {
        Some(value) if !value.is_null() => truthy(value),
        _ => details.is_some(),
    };
    let corporate = if is_corporate {
        let empty = Object::new();
        CorporateStatus::Corporate(decode_corporate(details.unwrap_or(&empty)))
    } else {
        CorporateStatus::NotCorporate
    };

    let mut consultation_logs: Vec<ConsultationLog> =
        list(plot, CONSULTATION_LOGS).iter().map(decode_log).collect();
    if let Some(details) = details {
        for entry in list(details, CONSULTATION_LOGS) {
            let nested = decode_log(entry);
            let entry_id = entry.as_object().and_then(identifier);
            let duplicate = entry_id
                .as_deref()
                .is_some_and(|id| consultation_logs.iter().any(|log| log.id == id));
            if !duplicate {
                consultation_logs.push(nested);
            }
        }
    }

    Plot {
        id: identifier(plot).unwrap_or_else(new_uuid_v7),
        address: text(plot, "address"),
        area_pyeong: number(plot, "areaPyeong"),
        cultivar: text(plot, "cultivar"),
        tree_count: integer(plot, "treeCount"),
        corporate,
        facility_info: object(plot, "facilityInfo")
            .map(decode_facility)
            .unwrap_or_default(),
        service_info: object(plot, "serviceInfo")
            .map(decode_service)
            .unwrap_or_default(),
        annual_data: list(plot, "annualData").iter().map(decode_annual).collect(),
        consultation_logs,
        support_programs: list(plot, "supportPrograms")
            .iter()
            .map(decode_support)
            .collect(),
    }
}

fn decode_corporate(details: &Object) -> CorporateDetails {
    let contract = if flag(details, "isContracted") {
        ContractStatus::Contracted(ContractTerms {
            contract_date: text(details, "contractDate"),
            down_payment: integer(details, "downPayment"),
            balance_due_date: text(details, "balanceDueDate"),
            balance_payment: integer(details, "balancePayment"),
            mulching_work_date: text(details, "mulchingWorkDate"),
        })
    } else {
        ContractStatus::Uncontracted
    };
    CorporateDetails {
        year: year(details, "year"),
        consultation_date: text(details, "consultationDate"),
        estimated_quantity: integer(details, "estimatedQuantity"),
        contracted_quantity: integer(details, "contractedQuantity"),
        special_notes: text(details, "specialNotes"),
        contract,
    }
}

fn decode_facility(facility: &Object) -> FacilityInfo {
    FacilityInfo {
        slope: text(facility, "slope"),
        planting_distance: text(facility, "plantingDistance"),
        has_covering: flag(facility, "hasCovering"),
        covering_type: CoveringType::from_label(&text(facility, "coveringType")),
        has_power: flag(facility, "hasPower"),
        has_internet: flag(facility, "hasInternet"),
        has_umbrella_system: flag(facility, "hasUmbrellaSystem"),
        has_drip_hose: flag(facility, "hasDripHose"),
        has_sprinkler: flag(facility, "hasSprinkler"),
        has_windbreak: flag(facility, "hasWindbreak"),
        has_opener: flag(facility, "hasOpener"),
    }
}

fn decode_service(service: &Object) -> ServiceInfo {
    let usage = |used: &str, detail: &str| {
        if flag(service, used) {
            ServiceUsage::Used {
                detail: text(service, detail),
            }
        } else {
            ServiceUsage::Unused
        }
    };
    ServiceInfo {
        portal_id: text(service, "jacheongbiId"),
        portal_password: text(service, "jacheongbiPw"),
        sugar_service: usage("useSugarService", "sugarMeterInfo"),
        sensor_service: usage("useSensorService", "sensorInfo"),
    }
}

fn decode_support(value: &Value) -> SupportProgram {
    let empty = Object::new();
    let entry = value.as_object().unwrap_or(&empty);
    SupportProgram {
        id: identifier(entry).unwrap_or_else(new_uuid_v7),
        year: year(entry, "year"),
        project_name: text(entry, "projectName"),
        project_description: text(entry, "projectDescription"),
        local_govt_fund: integer(entry, "localGovtFund"),
        self_fund: integer(entry, "selfFund"),
        is_selected: flag(entry, "isSelected"),
    }
}

fn decode_annual(value: &Value) -> AnnualData {
    let empty = Object::new();
    let entry = value.as_object().unwrap_or(&empty);
    AnnualData {
        id: identifier(entry).unwrap_or_else(new_uuid_v7),
        year: year(entry, "year"),
        avg_brix: number(entry, "avgBrix"),
        has_alternate_bearing: flag(entry, "hasAlternateBearing"),
        estimated_yield: integer(entry, "estimatedYield"),
        price_per_gwan: integer(entry, "pricePerGwan"),
        shipping_season: text(entry, "shippingSeason"),
        notes: text(entry, "notes"),
    }
}

fn decode_log(value: &Value) -> ConsultationLog {
    let empty = Object::new();
    let entry = value.as_object().unwrap_or(&empty);
    ConsultationLog {
        id: identifier(entry).unwrap_or_else(new_uuid_v7),
        date: text(entry, "date"),
        category: ConsultationCategory::from_label(&text(entry, "category")),
        content: text(entry, "content"),
        notes: text(entry, "notes"),
    }
}

// Lenient field readers. Absent, null or mistyped values collapse to the empty default.

fn identifier(map: &Object) -> Option<String> {
    match map.get("id") {
        Some(Value::String(id)) if !id.trim().is_empty() => Some(id.clone()),
        Some(Value::Number(id)) => Some(id.to_string()),
        _ => None,
    }
}

fn text(map: &Object, key: &str) -> String {
    match map.get(key) {
        Some(Value::String(value)) => value.clone(),
        Some(Value::Number(value)) => value.to_string(),
        Some(Value::Bool(value)) => value.to_string(),
        _ => String::new(),
    }
}

fn parse_numeric(raw: &str) -> Option<f64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn number(map: &Object, key: &str) -> f64 {
    match map.get(key) {
        Some(Value::Number(value)) => value.as_f64().filter(|v| v.is_finite()).unwrap_or(0.0),
        Some(Value::String(value)) => parse_numeric(value).unwrap_or(0.0),
        _ => 0.0,
    }
}

fn integer(map: &Object, key: &str) -> i64 {
    match map.get(key) {
        Some(Value::Number(value)) => value
            .as_i64()
            .or_else(|| value.as_f64().filter(|v| v.is_finite()).map(|v| v.round() as i64))
            .unwrap_or(0),
        Some(Value::String(value)) => parse_numeric(value).map(|v| v.round() as i64).unwrap_or(0),
        _ => 0,
    }
}

fn year(map: &Object, key: &str) -> i32 {
    i32::try_from(integer(map, key)).unwrap_or(0)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(value) => *value,
        Value::Number(value) => value.as_f64().is_some_and(|v| v != 0.0),
        Value::String(value) => matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "true" | "y" | "yes" | "1"
        ),
        _ => false,
    }
}

fn flag(map: &Object, key: &str) -> bool {
    map.get(key).is_some_and(truthy)
}

fn object<'a>(map: &'a Object, key: &str) -> Option<&'a Object> {
    map.get(key).and_then(Value::as_object)
}

fn list<'a>(map: &'a Object, key: &str) -> &'a [Value] {
    map.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}
