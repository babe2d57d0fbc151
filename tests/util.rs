#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use citrus_farms_lib::model::{
    AnnualData, ConsultationCategory, ConsultationLog, ContractStatus, ContractTerms,
    CorporateDetails, CorporateStatus, CoveringType, FacilityInfo, Farm, Plot, ServiceInfo,
    ServiceUsage, SupportProgram,
};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

pub async fn temp_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("connect sqlite::memory:");
    sqlx::query("PRAGMA foreign_keys=ON;")
        .execute(&pool)
        .await
        .unwrap();
    pool
}

pub async fn migrated_pool() -> SqlitePool {
    let pool = temp_pool().await;
    citrus_farms_lib::migrate::apply_migrations(&pool)
        .await
        .expect("apply migrations");
    pool
}

pub fn farm(id: &str, name: &str) -> Farm {
    Farm {
        id: id.to_string(),
        name: name.to_string(),
        contact: "010-0000-0000".to_string(),
        plots: Vec::new(),
    }
}

pub fn plot(id: &str) -> Plot {
    Plot {
        id: id.to_string(),
        address: format!("{id} orchard road"),
        area_pyeong: 1200.0,
        cultivar: "Shiranui".to_string(),
        tree_count: 150,
        ..Plot::default()
    }
}

pub fn program(id: &str, year: i32, name: &str) -> SupportProgram {
    SupportProgram {
        id: id.to_string(),
        year,
        project_name: name.to_string(),
        project_description: "subsidy".to_string(),
        local_govt_fund: 700_000,
        self_fund: 300_000,
        is_selected: true,
    }
}

pub fn annual(id: &str, year: i32, alternate_bearing: bool) -> AnnualData {
    AnnualData {
        id: id.to_string(),
        year,
        avg_brix: 12.5,
        has_alternate_bearing: alternate_bearing,
        estimated_yield: 4000,
        price_per_gwan: 25_000,
        shipping_season: "January".to_string(),
        notes: String::new(),
    }
}

/// A farm exercising every optional block: corporate contract, both services,
/// covering type, and one row in every child table.
pub fn rich_farm(id: &str, name: &str) -> Farm {
    let mut first = plot(&format!("{id}-p1"));
    first.corporate = CorporateStatus::Corporate(CorporateDetails {
        year: 2024,
        consultation_date: "2024-03-02".to_string(),
        estimated_quantity: 5000,
        contracted_quantity: 4500,
        special_notes: "north slope".to_string(),
        contract: ContractStatus::Contracted(ContractTerms {
            contract_date: "2024-04-01".to_string(),
            down_payment: 1_000_000,
            balance_due_date: "2024-12-20".to_string(),
            balance_payment: 3_000_000,
            mulching_work_date: "2024-05-10".to_string(),
        }),
    });
    first.facility_info = FacilityInfo {
        slope: "gentle".to_string(),
        planting_distance: "4x4".to_string(),
        has_covering: true,
        covering_type: Some(CoveringType::Tyvek),
        has_power: true,
        has_drip_hose: true,
        ..FacilityInfo::default()
    };
    first.service_info = ServiceInfo {
        portal_id: "grower01".to_string(),
        portal_password: "hunter2".to_string(),
        sugar_service: ServiceUsage::Used {
            detail: "meter A".to_string(),
        },
        sensor_service: ServiceUsage::Unused,
    };
    first.support_programs = vec![program(&format!("{id}-sp1"), 2023, "품종갱신")];
    first.annual_data = vec![annual(&format!("{id}-ad1"), 2023, true)];
    first.consultation_logs = vec![ConsultationLog {
        id: format!("{id}-cl1"),
        date: "2024-03-02".to_string(),
        category: Some(ConsultationCategory::Pruning),
        content: "winter pruning".to_string(),
        notes: String::new(),
    }];

    let mut second = plot(&format!("{id}-p2"));
    second.area_pyeong = 800.0;
    second.cultivar = "Setoka".to_string();

    Farm {
        id: id.to_string(),
        name: name.to_string(),
        contact: "010-1234-5678".to_string(),
        plots: vec![first, second],
    }
}
