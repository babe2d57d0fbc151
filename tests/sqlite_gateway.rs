#![allow(clippy::unwrap_used, clippy::expect_used)]

mod util;

use anyhow::Result;
use citrus_farms_lib::error::{
    FARM_CONFLICT, VALIDATION_DUPLICATE_ID, VALIDATION_NEGATIVE_VALUE, VALIDATION_PAGE,
};
use citrus_farms_lib::gateway::{
    FarmGateway, MemorySnapshot, PageRequest, SnapshotGateway, SqliteGateway,
};
use citrus_farms_lib::model::{CorporateStatus, ServiceUsage};
use sqlx::SqlitePool;

async fn gateway() -> (SqliteGateway, SqlitePool) {
    let pool = util::migrated_pool().await;
    (SqliteGateway::new(pool.clone()), pool)
}

async fn child_rows(pool: &SqlitePool, farm_id: &str) -> Result<i64> {
    let mut total = 0;
    for table in [
        "plots",
        "corporate_details",
        "support_programs",
        "annual_data",
        "consultation_logs",
    ] {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table} WHERE farm_id = ?"))
            .bind(farm_id)
            .fetch_one(pool)
            .await?;
        total += count;
    }
    Ok(total)
}

#[tokio::test]
async fn saved_aggregate_loads_back_identically() -> Result<()> {
    let (gateway, _pool) = gateway().await;
    let farm = util::rich_farm("f1", "Sun Farm");
    let saved = gateway.save(farm.clone()).await?;
    assert_eq!(saved, farm);

    let page = gateway.load_all(None).await?;
    assert_eq!(page.total_pages, 1);
    assert_eq!(page.farms, vec![farm]);
    Ok(())
}

#[tokio::test]
async fn save_replaces_every_owned_child() -> Result<()> {
    let (gateway, pool) = gateway().await;
    let mut farm = util::rich_farm("f1", "Sun Farm");
    gateway.save(farm.clone()).await?;

    farm.plots.truncate(1);
    farm.plots[0].support_programs.clear();
    farm.plots[0].corporate = CorporateStatus::NotCorporate;
    farm.plots[0].service_info.sugar_service = ServiceUsage::Unused;
    farm.name = "Sun Farm (renamed)".into();
    gateway.save(farm.clone()).await?;

    let loaded = gateway.load_all(None).await?.farms;
    assert_eq!(loaded, vec![farm]);

    let programs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM support_programs")
        .fetch_one(&pool)
        .await?;
    let corporate: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM corporate_details")
        .fetch_one(&pool)
        .await?;
    assert_eq!((programs, corporate), (0, 0));
    Ok(())
}

#[tokio::test]
async fn deleting_a_farm_cascades_to_plot_children() -> Result<()> {
    let (gateway, pool) = gateway().await;
    let mut doomed = util::farm("doomed", "Doomed");
    for n in 1..=2 {
        let mut plot = util::plot(&format!("p{n}"));
        plot.support_programs.push(util::program(&format!("sp{n}"), 2022, "기타"));
        plot.annual_data.push(util::annual(&format!("ad{n}"), 2022, false));
        doomed.plots.push(plot);
    }
    gateway.save(doomed).await?;
    gateway.save(util::rich_farm("keep", "Keeper")).await?;
    assert!(child_rows(&pool, "doomed").await? > 0);

    gateway.delete("doomed").await?;

    assert_eq!(child_rows(&pool, "doomed").await?, 0);
    let remaining = gateway.load_all(None).await?.farms;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, "keep");
    assert!(child_rows(&pool, "keep").await? > 0);
    Ok(())
}

#[tokio::test]
async fn deleting_unknown_id_is_not_an_error() -> Result<()> {
    let (gateway, _pool) = gateway().await;
    gateway.delete("missing").await?;
    Ok(())
}

#[tokio::test]
async fn strict_create_rejects_existing_identifier() -> Result<()> {
    let (gateway, _pool) = gateway().await;
    gateway.create(util::farm("f1", "First")).await?;
    let err = gateway
        .create(util::farm("f1", "Second"))
        .await
        .expect_err("duplicate id");
    assert_eq!(err.code(), FARM_CONFLICT);
    assert!(err.is_conflict());

    let farms = gateway.load_all(None).await?.farms;
    assert_eq!(farms.len(), 1);
    assert_eq!(farms[0].name, "First");
    Ok(())
}

#[tokio::test]
async fn invalid_farms_never_reach_the_store() -> Result<()> {
    let (gateway, _pool) = gateway().await;
    let mut farm = util::farm("f1", "Neg");
    let mut plot = util::plot("p");
    plot.tree_count = -3;
    farm.plots.push(plot);
    let err = gateway.save(farm).await.expect_err("negative tree count");
    assert_eq!(err.code(), VALIDATION_NEGATIVE_VALUE);
    assert!(gateway.load_all(None).await?.farms.is_empty());
    Ok(())
}

#[tokio::test]
async fn pages_are_sorted_by_name() -> Result<()> {
    let (gateway, _pool) = gateway().await;
    for (id, name) in [("1", "delta"), ("2", "alpha"), ("3", "charlie"), ("4", "bravo"), ("5", "echo")] {
        gateway.save(util::farm(id, name)).await?;
    }

    let first = gateway.load_all(Some(PageRequest::new(1, 2)?)).await?;
    assert_eq!(first.total_pages, 3);
    let names: Vec<_> = first.farms.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "bravo"]);

    let last = gateway.load_all(Some(PageRequest::new(3, 2)?)).await?;
    assert_eq!(last.farms.len(), 1);
    assert_eq!(last.farms[0].name, "echo");

    let beyond = gateway.load_all(Some(PageRequest::new(9, 2)?)).await?;
    assert!(beyond.farms.is_empty());
    assert_eq!(beyond.total_pages, 3);

    assert_eq!(PageRequest::new(0, 2).expect_err("page zero").code(), VALIDATION_PAGE);
    Ok(())
}

#[tokio::test]
async fn failed_restore_leaves_previous_contents() -> Result<()> {
    let (gateway, _pool) = gateway().await;
    let before = vec![util::rich_farm("a", "Alpha"), util::farm("b", "Bravo")];
    gateway.replace_all(before.clone()).await?;

    let incoming = vec![
        util::farm("n1", "New 1"),
        util::farm("n2", "New 2"),
        util::farm("n1", "New 1 again"),
    ];

    let err = gateway.replace_all(incoming).await.expect_err("duplicate farm id");
    assert_eq!(err.context().get("record").map(String::as_str), Some("2"));
    assert_eq!(err.context().get("operation").map(String::as_str), Some("replace_all"));

    assert_eq!(gateway.load_all(None).await?.farms, before);
    Ok(())
}

#[tokio::test]
async fn restore_swaps_whole_collection() -> Result<()> {
    let (gateway, pool) = gateway().await;
    gateway.save(util::rich_farm("old", "Old")).await?;
    gateway
        .replace_all(vec![util::farm("x", "X"), util::farm("y", "Y")])
        .await?;

    let ids: Vec<String> = gateway
        .load_all(None)
        .await?
        .farms
        .into_iter()
        .map(|f| f.id)
        .collect();
    assert_eq!(ids, vec!["x", "y"]);
    assert_eq!(child_rows(&pool, "old").await?, 0);

    gateway.replace_all(Vec::new()).await?;
    let empty = gateway.load_all(None).await?;
    assert!(empty.farms.is_empty());
    assert_eq!(empty.total_pages, 0);
    Ok(())
}

#[tokio::test]
async fn duplicate_plot_ids_are_rejected_by_every_backend() -> Result<()> {
    let (sqlite, _pool) = gateway().await;
    let snapshot = SnapshotGateway::open(MemorySnapshot::new())?;
    let backends: [(&str, &dyn FarmGateway); 2] = [("sqlite", &sqlite), ("snapshot", &snapshot)];

    for (backend, gateway) in backends {
        gateway.save(util::farm("keep", "Keep")).await?;
        let mut twin = util::farm("twin", "Twin");
        twin.plots = vec![util::plot("same"), util::plot("same")];

        let err = gateway.save(twin.clone()).await.expect_err("duplicate plot id");
        assert_eq!(err.code(), VALIDATION_DUPLICATE_ID, "{backend}");
        assert_eq!(err.status().as_u16(), 400, "{backend}");
        let err = gateway.replace_all(vec![twin]).await.expect_err("duplicate plot id");
        assert_eq!(err.code(), VALIDATION_DUPLICATE_ID, "{backend}");

        let ids: Vec<String> = gateway
            .load_all(None)
            .await?
            .farms
            .into_iter()
            .map(|f| f.id)
            .collect();
        assert_eq!(ids, vec!["keep"], "{backend}");
    }
    Ok(())
}

#[tokio::test]
async fn oversized_page_hydrates_without_bind_limits() -> Result<()> {
    let (gateway, pool) = gateway().await;
    sqlx::query(
        "INSERT INTO farms (id, name, contact, created_at, updated_at) \
         WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < 33000) \
         SELECT printf('bulk-%05d', i), printf('Bulk %05d', i), '', 0, 0 FROM n",
    )
    .execute(&pool)
    .await?;
    let rich = util::rich_farm("zulu", "Zulu");
    gateway.save(rich.clone()).await?;

    let page = gateway.load_all(Some(PageRequest::new(1, 40_000)?)).await?;
    assert_eq!(page.total_pages, 1);
    assert_eq!(page.farms.len(), 33_001);
    assert_eq!(page.farms.last(), Some(&rich));

    let tail = gateway.load_all(Some(PageRequest::new(2, 33_000)?)).await?;
    assert_eq!(tail.farms, vec![rich]);
    Ok(())
}

#[tokio::test]
async fn equal_names_page_by_id_on_every_backend() -> Result<()> {
    let (sqlite, _pool) = gateway().await;
    let snapshot = SnapshotGateway::open(MemorySnapshot::new())?;
    let backends: [(&str, &dyn FarmGateway); 2] = [("sqlite", &sqlite), ("snapshot", &snapshot)];

    for (backend, gateway) in backends {
        for id in ["c", "a", "b"] {
            gateway.save(util::farm(id, "Same")).await?;
        }
        let mut ids = Vec::new();
        for page in 1..=3 {
            let farms = gateway.load_all(Some(PageRequest::new(page, 1)?)).await?.farms;
            ids.extend(farms.into_iter().map(|f| f.id));
        }
        assert_eq!(ids, vec!["a", "b", "c"], "{backend}");
    }
    Ok(())
}
