#![allow(clippy::unwrap_used, clippy::expect_used)]

mod util;

use citrus_farms_lib::model::{
    AnnualData, ConsultationCategory, ConsultationLog, ContractStatus, ContractTerms,
    CorporateDetails, CorporateStatus, CoveringType, FacilityInfo, Farm, Labelled, Plot,
    ServiceInfo, ServiceUsage, SupportProgram,
};
use citrus_farms_lib::normalize::{detect_generation, normalize, normalize_with_changes, Generation};
use proptest::collection::vec;
use proptest::option;
use proptest::prelude::*;
use serde_json::{json, Value};

fn reencode(farms: &[Farm]) -> Vec<Value> {
    farms
        .iter()
        .map(|farm| serde_json::to_value(farm).expect("encode farm"))
        .collect()
}

fn g1_record() -> Value {
    json!({
        "id": "g1",
        "basicInfo": {
            "name": "A",
            "contact": "010-1111-2222",
            "address": "addr",
            "areaPyeong": 10,
            "cultivar": "Hallabong",
            "treeCount": 80
        },
        "facilityInfo": { "slope": "flat", "hasCovering": true, "coveringType": "TRUSS" },
        "serviceInfo": { "jacheongbiId": "kim", "useSugarService": true, "sugarMeterInfo": "M-1" },
        "supportPrograms": [
            { "id": "sp", "year": 2021, "projectName": "품종갱신", "localGovtFund": "1,000,000", "selfFund": 0 }
        ],
        "annualData": [ { "id": "ad", "year": 2022, "avgBrix": 11.5, "hasAlternateBearing": true } ]
    })
}

fn g2_record() -> Value {
    json!({
        "id": 42,
        "basicInfo": { "name": "B", "contact": "064-700-0000", "address": "Seogwipo", "isCorporate": true },
        "corporateFarmDetails": {
            "year": 2023,
            "isContracted": true,
            "contractDate": "2023-05-01",
            "downPayment": 500,
            "consultationLogs": [ { "id": "log-1", "date": "2023-04-01", "category": "상담", "content": "visit" } ]
        }
    })
}

fn g3_transitional_record() -> Value {
    json!({
        "id": "g3",
        "name": "C",
        "contact": "",
        "isCorporate": false,
        "supportPrograms": [ { "id": "sp-c", "year": 2020, "projectName": "maintenance" } ],
        "plots": [ { "id": "p-c", "address": "Jeju", "areaPyeong": 300 } ]
    })
}

#[test]
fn normalizing_twice_is_a_no_op_for_every_generation() {
    let mixed = vec![g1_record(), g2_record(), g3_transitional_record()];
    let generations: Vec<Generation> = mixed.iter().map(detect_generation).collect();
    assert_eq!(generations, vec![Generation::G1, Generation::G2, Generation::G3]);

    for fixture in [vec![g1_record()], vec![g2_record()], vec![g3_transitional_record()], mixed] {
        let once = normalize(&fixture);
        let twice = normalize(&reencode(&once));
        assert_eq!(once, twice);
        assert!(!normalize_with_changes(&reencode(&once)).changed);
    }
}

#[test]
fn oldest_generation_becomes_single_plot_farm() {
    let farms = normalize(&[g1_record()]);
    assert_eq!(farms.len(), 1);
    let farm = &farms[0];
    assert_eq!(farm.name, "A");
    assert_eq!(farm.contact, "010-1111-2222");
    assert_eq!(farm.plots.len(), 1);

    let plot = &farm.plots[0];
    assert_eq!(plot.address, "addr");
    assert_eq!(plot.area_pyeong, 10.0);
    assert!(!plot.id.is_empty());
    assert_eq!(plot.facility_info.covering_type, Some(CoveringType::Truss));
    assert_eq!(plot.service_info.sugar_service.detail(), Some("M-1"));
    assert_eq!(plot.support_programs[0].local_govt_fund, 1_000_000);
    assert!(plot.annual_data[0].has_alternate_bearing);
    assert!(!plot.corporate.is_corporate());
}

#[test]
fn corporate_generation_moves_logs_beside_details() {
    let farm = &normalize(&[g2_record()])[0];
    assert_eq!(farm.id, "42");
    let plot = &farm.plots[0];
    let details = plot.corporate.details().expect("corporate details");
    assert!(matches!(details.contract, ContractStatus::Contracted(ref terms) if terms.down_payment == 500));
    assert_eq!(plot.consultation_logs.len(), 1);
    assert_eq!(plot.consultation_logs[0].category, Some(ConsultationCategory::Consultation));
}

#[test]
fn transitional_fields_land_on_first_plot() {
    let farm = &normalize(&[g3_transitional_record()])[0];
    assert_eq!(farm.plots.len(), 1);
    assert_eq!(farm.plots[0].id, "p-c");
    assert_eq!(farm.plots[0].support_programs[0].project_name, "maintenance");
}

#[test]
fn malformed_records_still_yield_one_farm_each() {
    let raw = vec![
        Value::Null,
        json!("text"),
        json!({ "id": "x", "plots": "nope", "name": 5 }),
        json!({ "basicInfo": null, "facilityInfo": [] }),
    ];
    let farms = normalize(&raw);
    assert_eq!(farms.len(), raw.len());
    assert!(farms.iter().all(|farm| !farm.id.is_empty()));
}

#[test]
fn current_generation_survives_text_round_trip() {
    let farms = vec![util::rich_farm("f1", "Sun Farm"), util::farm("f2", "Moon Farm")];
    let text = serde_json::to_string(&farms).expect("encode");
    let raw: Vec<Value> = serde_json::from_str(&text).expect("decode");
    assert_eq!(normalize(&raw), farms);
}

fn ident() -> impl Strategy<Value = String> {
    "[a-z0-9]{1,8}"
}

fn words() -> impl Strategy<Value = String> {
    "[a-zA-Z가-힣 ,-]{0,12}"
}

fn quarters() -> impl Strategy<Value = f64> {
    (0u32..400_000).prop_map(|n| f64::from(n) / 4.0)
}

fn usage() -> impl Strategy<Value = ServiceUsage> {
    option::of(words()).prop_map(|detail| match detail {
        Some(detail) => ServiceUsage::Used { detail },
        None => ServiceUsage::Unused,
    })
}

fn category() -> impl Strategy<Value = Option<ConsultationCategory>> {
    option::of(proptest::sample::select(ConsultationCategory::ALL.to_vec()))
}

fn corporate() -> impl Strategy<Value = CorporateStatus> {
    let terms = (words(), 0i64..10_000_000, words(), 0i64..10_000_000, words()).prop_map(
        |(contract_date, down_payment, balance_due_date, balance_payment, mulching_work_date)| {
            ContractTerms {
                contract_date,
                down_payment,
                balance_due_date,
                balance_payment,
                mulching_work_date,
            }
        },
    );
    let details = (2000i32..2040, words(), 0i64..100_000, 0i64..100_000, words(), option::of(terms))
        .prop_map(
            |(year, consultation_date, estimated_quantity, contracted_quantity, special_notes, contract)| {
                CorporateDetails {
                    year,
                    consultation_date,
                    estimated_quantity,
                    contracted_quantity,
                    special_notes,
                    contract: contract.map_or(ContractStatus::Uncontracted, ContractStatus::Contracted),
                }
            },
        );
    option::of(details).prop_map(|details| {
        details.map_or(CorporateStatus::NotCorporate, CorporateStatus::Corporate)
    })
}

fn plot() -> impl Strategy<Value = Plot> {
    let facility = (
        words(),
        option::of(proptest::sample::select(CoveringType::ALL.to_vec())),
        proptest::array::uniform8(any::<bool>()),
    )
        .prop_map(|(slope, covering_type, flags)| FacilityInfo {
            slope,
            planting_distance: "4x4".to_string(),
            has_covering: flags[0],
            covering_type,
            has_power: flags[1],
            has_internet: flags[2],
            has_umbrella_system: flags[3],
            has_drip_hose: flags[4],
            has_sprinkler: flags[5],
            has_windbreak: flags[6],
            has_opener: flags[7],
        });
    let service = (words(), words(), usage(), usage()).prop_map(
        |(portal_id, portal_password, sugar_service, sensor_service)| ServiceInfo {
            portal_id,
            portal_password,
            sugar_service,
            sensor_service,
        },
    );
    let program = (ident(), 2000i32..2040, words(), 0i64..10_000_000, any::<bool>()).prop_map(
        |(id, year, project_name, local_govt_fund, is_selected)| SupportProgram {
            id,
            year,
            project_name,
            project_description: String::new(),
            local_govt_fund,
            self_fund: local_govt_fund / 3,
            is_selected,
        },
    );
    let annual = (ident(), 2000i32..2040, quarters(), any::<bool>(), 0i64..100_000).prop_map(
        |(id, year, avg_brix, has_alternate_bearing, estimated_yield)| AnnualData {
            id,
            year,
            avg_brix,
            has_alternate_bearing,
            estimated_yield,
            price_per_gwan: 20_000,
            shipping_season: String::new(),
            notes: String::new(),
        },
    );
    let log = (ident(), words(), category(), words()).prop_map(|(id, date, category, content)| {
        ConsultationLog {
            id,
            date,
            category,
            content,
            notes: String::new(),
        }
    });

    (
        (ident(), words(), quarters(), words(), 0i64..10_000),
        corporate(),
        facility,
        service,
        vec(program, 0..3),
        vec(annual, 0..3),
        vec(log, 0..3),
    )
        .prop_map(
            |((id, address, area_pyeong, cultivar, tree_count), corporate, facility_info, service_info, support_programs, annual_data, consultation_logs)| Plot {
                id,
                address,
                area_pyeong,
                cultivar,
                tree_count,
                corporate,
                facility_info,
                service_info,
                annual_data,
                consultation_logs,
                support_programs,
            },
        )
}

fn farm() -> impl Strategy<Value = Farm> {
    (ident(), words(), "[0-9-]{0,13}", vec(plot(), 0..3)).prop_map(|(id, name, contact, plots)| Farm {
        id,
        name,
        contact,
        plots,
    })
}

fn legacy_record() -> impl Strategy<Value = Value> {
    (
        option::of(ident()),
        words(),
        words(),
        quarters(),
        any::<bool>(),
        option::of(2000i32..2040),
    )
        .prop_map(|(id, name, address, area, corporate, year)| {
            let mut record = json!({
                "basicInfo": { "name": name, "address": address, "areaPyeong": area }
            });
            if let Some(id) = id {
                record["id"] = json!(id);
            }
            if corporate {
                record["basicInfo"]["isCorporate"] = json!(true);
                record["corporateFarmDetails"] = json!({ "year": 2024, "isContracted": false });
            }
            if let Some(year) = year {
                record["supportPrograms"] = json!([{ "year": year, "projectName": "기타" }]);
            }
            record
        })
}

proptest! {
    #[test]
    fn current_records_round_trip_unchanged(farms in vec(farm(), 0..4)) {
        let raw = reencode(&farms);
        prop_assert_eq!(normalize(&raw), farms);
        prop_assert!(!normalize_with_changes(&raw).changed);
    }

    #[test]
    fn legacy_records_normalize_idempotently(raw in vec(legacy_record(), 0..5)) {
        let once = normalize(&raw);
        prop_assert_eq!(once.len(), raw.len());
        prop_assert!(once.iter().all(|farm| farm.plots.len() == 1));
        let twice = normalize(&reencode(&once));
        prop_assert_eq!(once, twice);
    }
}
