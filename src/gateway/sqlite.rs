use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::info;

use super::{total_pages, validate_farm, FarmGateway, FarmPage, PageRequest};
use crate::db::run_in_tx;
use crate::model::{
    AnnualData, ConsultationCategory, ConsultationLog, ContractStatus, ContractTerms,
    CorporateDetails, CorporateStatus, CoveringType, FacilityInfo, Farm, Labelled, Plot,
    ServiceInfo, ServiceUsage, SupportProgram,
};
use crate::time::now_ms;
use crate::{AppError, AppResult};

type PlotKey = (String, String);

/// Relational gateway. Every write runs in one transaction.
#[derive(Clone)]
pub struct SqliteGateway {
    pool: SqlitePool,
}

impl SqliteGateway {
    pub fn new(pool: SqlitePool) -> Self {
        SqliteGateway { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn bool_col(row: &SqliteRow, column: &str) -> AppResult<bool> {
    Ok(row.try_get::<i64, _>(column).map_err(AppError::from)? != 0)
}

fn plot_key(row: &SqliteRow) -> AppResult<PlotKey> {
    Ok((
        row.try_get("farm_id").map_err(AppError::from)?,
        row.try_get("plot_id").map_err(AppError::from)?,
    ))
}

impl TryFrom<&SqliteRow> for SupportProgram {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        Ok(SupportProgram {
            id: row.try_get("id").map_err(AppError::from)?,
            year: row.try_get("year").map_err(AppError::from)?,
            project_name: row.try_get("project_name").map_err(AppError::from)?,
            project_description: row.try_get("project_description").map_err(AppError::from)?,
            local_govt_fund: row.try_get("local_govt_fund").map_err(AppError::from)?,
            self_fund: row.try_get("self_fund").map_err(AppError::from)?,
            is_selected: bool_col(row, "is_selected")?,
        })
    }
}

impl TryFrom<&SqliteRow> for AnnualData {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        Ok(AnnualData {
            id: row.try_get("id").map_err(AppError::from)?,
            year: row.try_get("year").map_err(AppError::from)?,
            avg_brix: row.try_get("avg_brix").map_err(AppError::from)?,
            has_alternate_bearing: bool_col(row, "has_alternate_bearing")?,
            estimated_yield: row.try_get("estimated_yield").map_err(AppError::from)?,
            price_per_gwan: row.try_get("price_per_gwan").map_err(AppError::from)?,
            shipping_season: row.try_get("shipping_season").map_err(AppError::from)?,
            notes: row.try_get("notes").map_err(AppError::from)?,
        })
    }
}

impl TryFrom<&SqliteRow> for ConsultationLog {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        let category: Option<String> = row.try_get("category").map_err(AppError::from)?;
        Ok(ConsultationLog {
            id: row.try_get("id").map_err(AppError::from)?,
            date: row.try_get("date").map_err(AppError::from)?,
            category: category.as_deref().and_then(ConsultationCategory::from_label),
            content: row.try_get("content").map_err(AppError::from)?,
            notes: row.try_get("notes").map_err(AppError::from)?,
        })
    }
}

impl TryFrom<&SqliteRow> for CorporateDetails {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        let contract_date: Option<String> = row.try_get("contract_date").map_err(AppError::from)?;
        let contract = match contract_date {
            Some(contract_date) => ContractStatus::Contracted(ContractTerms {
                contract_date,
                down_payment: row
                    .try_get::<Option<i64>, _>("down_payment")
                    .map_err(AppError::from)?
                    .unwrap_or_default(),
                balance_due_date: row
                    .try_get::<Option<String>, _>("balance_due_date")
                    .map_err(AppError::from)?
                    .unwrap_or_default(),
                balance_payment: row
                    .try_get::<Option<i64>, _>("balance_payment")
                    .map_err(AppError::from)?
                    .unwrap_or_default(),
                mulching_work_date: row
                    .try_get::<Option<String>, _>("mulching_work_date")
                    .map_err(AppError::from)?
                    .unwrap_or_default(),
            }),
            None => ContractStatus::Uncontracted,
        };
        Ok(CorporateDetails {
            year: row.try_get("year").map_err(AppError::from)?,
            consultation_date: row.try_get("consultation_date").map_err(AppError::from)?,
            estimated_quantity: row.try_get("estimated_quantity").map_err(AppError::from)?,
            contracted_quantity: row.try_get("contracted_quantity").map_err(AppError::from)?,
            special_notes: row.try_get("special_notes").map_err(AppError::from)?,
            contract,
        })
    }
}

/// Plot columns only; corporate details and collections are attached afterwards.
impl TryFrom<&SqliteRow> for Plot {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        let covering_type: Option<String> = row.try_get("covering_type").map_err(AppError::from)?;
        let usage = |column: &str| -> AppResult<ServiceUsage> {
            let detail: Option<String> = row.try_get(column).map_err(AppError::from)?;
            Ok(match detail {
                Some(detail) => ServiceUsage::Used { detail },
                None => ServiceUsage::Unused,
            })
        };
        Ok(Plot {
            id: row.try_get("id").map_err(AppError::from)?,
            address: row.try_get("address").map_err(AppError::from)?,
            area_pyeong: row.try_get("area_pyeong").map_err(AppError::from)?,
            cultivar: row.try_get("cultivar").map_err(AppError::from)?,
            tree_count: row.try_get("tree_count").map_err(AppError::from)?,
            corporate: CorporateStatus::NotCorporate,
            facility_info: FacilityInfo {
                slope: row.try_get("slope").map_err(AppError::from)?,
                planting_distance: row.try_get("planting_distance").map_err(AppError::from)?,
                has_covering: bool_col(row, "has_covering")?,
                covering_type: covering_type.as_deref().and_then(CoveringType::from_label),
                has_power: bool_col(row, "has_power")?,
                has_internet: bool_col(row, "has_internet")?,
                has_umbrella_system: bool_col(row, "has_umbrella_system")?,
                has_drip_hose: bool_col(row, "has_drip_hose")?,
                has_sprinkler: bool_col(row, "has_sprinkler")?,
                has_windbreak: bool_col(row, "has_windbreak")?,
                has_opener: bool_col(row, "has_opener")?,
            },
            service_info: ServiceInfo {
                portal_id: row.try_get("portal_id").map_err(AppError::from)?,
                portal_password: row.try_get("portal_password").map_err(AppError::from)?,
                sugar_service: usage("sugar_meter_info")?,
                sensor_service: usage("sensor_info")?,
            },
            annual_data: Vec::new(),
            consultation_logs: Vec::new(),
            support_programs: Vec::new(),
        })
    }
}

async fn insert_farm_row(conn: &mut SqliteConnection, farm: &Farm, now: i64) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO farms (id, name, contact, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&farm.id)
    .bind(&farm.name)
    .bind(&farm.contact)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn upsert_farm_row(conn: &mut SqliteConnection, farm: &Farm, now: i64) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO farms (id, name, contact, created_at, updated_at) VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT(id) DO UPDATE SET name = excluded.name, contact = excluded.contact, \
         updated_at = excluded.updated_at",
    )
    .bind(&farm.id)
    .bind(&farm.name)
    .bind(&farm.contact)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_plots(conn: &mut SqliteConnection, farm: &Farm) -> AppResult<()> {
    for (position, plot) in farm.plots.iter().enumerate() {
        let facility = &plot.facility_info;
        let service = &plot.service_info;
        sqlx::query(
            "INSERT INTO plots (farm_id, id, position, address, area_pyeong, cultivar, tree_count, \
             slope, planting_distance, has_covering, covering_type, has_power, has_internet, \
             has_umbrella_system, has_drip_hose, has_sprinkler, has_windbreak, has_opener, \
             portal_id, portal_password, sugar_meter_info, sensor_info) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&farm.id)
        .bind(&plot.id)
        .bind(position as i64)
        .bind(&plot.address)
        .bind(plot.area_pyeong)
        .bind(&plot.cultivar)
        .bind(plot.tree_count)
        .bind(&facility.slope)
        .bind(&facility.planting_distance)
        .bind(facility.has_covering)
        .bind(facility.covering_type.map(Labelled::label))
        .bind(facility.has_power)
        .bind(facility.has_internet)
        .bind(facility.has_umbrella_system)
        .bind(facility.has_drip_hose)
        .bind(facility.has_sprinkler)
        .bind(facility.has_windbreak)
        .bind(facility.has_opener)
        .bind(&service.portal_id)
        .bind(&service.portal_password)
        .bind(service.sugar_service.detail())
        .bind(service.sensor_service.detail())
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::from(e).with_context("plot_id", plot.id.clone()))?;

        if let Some(details) = plot.corporate.details() {
            let terms = match &details.contract {
                ContractStatus::Contracted(terms) => Some(terms),
                ContractStatus::Uncontracted => None,
            };
            sqlx::query(
                "INSERT INTO corporate_details (farm_id, plot_id, year, consultation_date, \
                 estimated_quantity, contracted_quantity, special_notes, contract_date, \
                 down_payment, balance_due_date, balance_payment, mulching_work_date) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&farm.id)
            .bind(&plot.id)
            .bind(details.year)
            .bind(&details.consultation_date)
            .bind(details.estimated_quantity)
            .bind(details.contracted_quantity)
            .bind(&details.special_notes)
            .bind(terms.map(|t| t.contract_date.as_str()))
            .bind(terms.map(|t| t.down_payment))
            .bind(terms.map(|t| t.balance_due_date.as_str()))
            .bind(terms.map(|t| t.balance_payment))
            .bind(terms.map(|t| t.mulching_work_date.as_str()))
            .execute(&mut *conn)
            .await?;
        }

        for (index, program) in plot.support_programs.iter().enumerate() {
            sqlx::query(
                "INSERT INTO support_programs (farm_id, plot_id, position, id, year, project_name, \
                 project_description, local_govt_fund, self_fund, is_selected) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&farm.id)
            .bind(&plot.id)
            .bind(index as i64)
            .bind(&program.id)
            .bind(program.year)
            .bind(&program.project_name)
            .bind(&program.project_description)
            .bind(program.local_govt_fund)
            .bind(program.self_fund)
            .bind(program.is_selected)
            .execute(&mut *conn)
            .await?;
        }

        for (index, entry) in plot.annual_data.iter().enumerate() {
            sqlx::query(
                "INSERT INTO annual_data (farm_id, plot_id, position, id, year, avg_brix, \
                 has_alternate_bearing, estimated_yield, price_per_gwan, shipping_season, notes) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&farm.id)
            .bind(&plot.id)
            .bind(index as i64)
            .bind(&entry.id)
            .bind(entry.year)
            .bind(entry.avg_brix)
            .bind(entry.has_alternate_bearing)
            .bind(entry.estimated_yield)
            .bind(entry.price_per_gwan)
            .bind(&entry.shipping_season)
            .bind(&entry.notes)
            .execute(&mut *conn)
            .await?;
        }

        for (index, log) in plot.consultation_logs.iter().enumerate() {
            sqlx::query(
                "INSERT INTO consultation_logs (farm_id, plot_id, position, id, date, category, \
                 content, notes) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&farm.id)
            .bind(&plot.id)
            .bind(index as i64)
            .bind(&log.id)
            .bind(&log.date)
            .bind(log.category.map(Labelled::label))
            .bind(&log.content)
            .bind(&log.notes)
            .execute(&mut *conn)
            .await?;
        }
    }
    Ok(())
}

const PAGE_SQL: &str = "SELECT id FROM farms ORDER BY name, id LIMIT ? OFFSET ?";

fn offset(page: PageRequest) -> i64 {
    i64::try_from(page.offset()).unwrap_or(i64::MAX)
}

/// Which farms a load hydrates.
#[derive(Clone, Copy)]
enum Scope {
    All,
    Page(PageRequest),
}

/// Rows of `table` owned by the farms in `scope`.
async fn fetch_owned(
    pool: &SqlitePool,
    table: &str,
    order: &str,
    scope: Scope,
) -> AppResult<Vec<SqliteRow>> {
    let rows = match scope {
        Scope::All => {
            let sql = format!("SELECT * FROM {table} ORDER BY {order}");
            sqlx::query(&sql).fetch_all(pool).await
        }
        Scope::Page(page) => {
            let sql = format!("SELECT * FROM {table} WHERE farm_id IN ({PAGE_SQL}) ORDER BY {order}");
            sqlx::query(&sql)
                .bind(i64::from(page.limit))
                .bind(offset(page))
                .fetch_all(pool)
                .await
        }
    };
    rows.map_err(|e| AppError::from(e).with_context("table", table.to_string()))
}

async fn fetch_collection<T>(
    pool: &SqlitePool,
    table: &str,
    scope: Scope,
) -> AppResult<HashMap<PlotKey, Vec<T>>>
where
    T: for<'r> TryFrom<&'r SqliteRow, Error = AppError>,
{
    let rows = fetch_owned(pool, table, "farm_id, plot_id, position", scope).await?;
    let mut grouped: HashMap<PlotKey, Vec<T>> = HashMap::new();
    for row in &rows {
        grouped.entry(plot_key(row)?).or_default().push(T::try_from(row)?);
    }
    Ok(grouped)
}

/// Attaches plots and their owned rows to the given farm heads, preserving stored positions.
async fn hydrate(pool: &SqlitePool, mut farms: Vec<Farm>, scope: Scope) -> AppResult<Vec<Farm>> {
    if farms.is_empty() {
        return Ok(farms);
    }

    let mut corporate: HashMap<PlotKey, CorporateDetails> = HashMap::new();
    for row in &fetch_owned(pool, "corporate_details", "farm_id, plot_id", scope).await? {
        corporate.insert(plot_key(row)?, CorporateDetails::try_from(row)?);
    }
    let mut programs = fetch_collection::<SupportProgram>(pool, "support_programs", scope).await?;
    let mut annual = fetch_collection::<AnnualData>(pool, "annual_data", scope).await?;
    let mut logs = fetch_collection::<ConsultationLog>(pool, "consultation_logs", scope).await?;

    let mut plots: HashMap<String, Vec<Plot>> = HashMap::new();
    for row in &fetch_owned(pool, "plots", "farm_id, position", scope).await? {
        let farm_id: String = row.try_get("farm_id").map_err(AppError::from)?;
        let mut plot = Plot::try_from(row)?;
        let key = (farm_id.clone(), plot.id.clone());
        if let Some(details) = corporate.remove(&key) {
            plot.corporate = CorporateStatus::Corporate(details);
        }
        plot.support_programs = programs.remove(&key).unwrap_or_default();
        plot.annual_data = annual.remove(&key).unwrap_or_default();
        plot.consultation_logs = logs.remove(&key).unwrap_or_default();
        plots.entry(farm_id).or_default().push(plot);
    }

    for farm in &mut farms {
        farm.plots = plots.remove(&farm.id).unwrap_or_default();
    }
    Ok(farms)
}

fn farm_head(row: &SqliteRow) -> AppResult<Farm> {
    Ok(Farm {
        id: row.try_get("id").map_err(AppError::from)?,
        name: row.try_get("name").map_err(AppError::from)?,
        contact: row.try_get("contact").map_err(AppError::from)?,
        plots: Vec::new(),
    })
}

#[async_trait]
impl FarmGateway for SqliteGateway {
    async fn load_all(&self, page: Option<PageRequest>) -> AppResult<FarmPage> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM farms")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::from(e).with_context("operation", "load_all"))?;
        let total = u64::try_from(total).unwrap_or(0);

        let rows = match page {
            Some(page) => {
                sqlx::query(
                    "SELECT id, name, contact FROM farms ORDER BY name, id LIMIT ? OFFSET ?",
                )
                .bind(i64::from(page.limit))
                .bind(offset(page))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT id, name, contact FROM farms ORDER BY name, id")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        let heads = rows.iter().map(farm_head).collect::<AppResult<Vec<_>>>()?;

        let scope = page.map_or(Scope::All, Scope::Page);
        let farms = hydrate(&self.pool, heads, scope).await?;

        let total_pages = match page {
            Some(page) => total_pages(total, page.limit),
            None if total == 0 => 0,
            None => 1,
        };
        Ok(FarmPage { farms, total_pages })
    }

    async fn save(&self, farm: Farm) -> AppResult<Farm> {
        validate_farm(&farm)?;
        let id = farm.id.clone();
        let saved = farm.clone();
        run_in_tx(&self.pool, move |tx| {
            Box::pin(async move {
                upsert_farm_row(&mut **tx, &farm, now_ms()).await?;
                sqlx::query("DELETE FROM plots WHERE farm_id = ?")
                    .bind(&farm.id)
                    .execute(&mut **tx)
                    .await?;
                insert_plots(&mut **tx, &farm).await?;
                Ok::<_, AppError>(())
            })
        })
        .await
        .map_err(|e| e.with_context("operation", "save").with_context("id", id.clone()))?;
        info!(target: "citrus_farms", event = "farm_saved", id = %id, plots = saved.plots.len());
        Ok(saved)
    }

    async fn create(&self, farm: Farm) -> AppResult<Farm> {
        validate_farm(&farm)?;
        let id = farm.id.clone();
        let saved = farm.clone();
        run_in_tx(&self.pool, move |tx| {
            Box::pin(async move {
                let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM farms WHERE id = ?")
                    .bind(&farm.id)
                    .fetch_optional(&mut **tx)
                    .await?;
                if exists.is_some() {
                    return Err(AppError::conflict(&farm.id));
                }
                insert_farm_row(&mut **tx, &farm, now_ms()).await?;
                insert_plots(&mut **tx, &farm).await?;
                Ok::<_, AppError>(())
            })
        })
        .await
        .map_err(|e| e.with_context("operation", "create").with_context("id", id.clone()))?;
        info!(target: "citrus_farms", event = "farm_created", id = %id);
        Ok(saved)
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM farms WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::from(e)
                    .with_context("operation", "delete")
                    .with_context("id", id)
            })?;
        info!(
            target: "citrus_farms",
            event = "farm_deleted",
            id = %id,
            existed = result.rows_affected() > 0
        );
        Ok(())
    }

    async fn replace_all(&self, farms: Vec<Farm>) -> AppResult<()> {
        for farm in &farms {
            validate_farm(farm)?;
        }
        let count = farms.len();
        run_in_tx(&self.pool, move |tx| {
            Box::pin(async move {
                sqlx::query("DELETE FROM farms").execute(&mut **tx).await?;
                let now = now_ms();
                for (index, farm) in farms.iter().enumerate() {
                    let written = async {
                        insert_farm_row(&mut **tx, farm, now).await?;
                        insert_plots(&mut **tx, farm).await
                    }
                    .await;
                    written.map_err(|e| {
                        e.with_context("record", index.to_string())
                            .with_context("id", farm.id.clone())
                    })?;
                }
                Ok::<_, AppError>(())
            })
        })
        .await
        .map_err(|e| e.with_context("operation", "replace_all"))?;
        info!(target: "citrus_farms", event = "restore_applied", records = count);
        Ok(())
    }
}
