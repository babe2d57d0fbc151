use chrono::NaiveDate;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{RESTORE_NOT_ARRAY, RESTORE_UNCONFIRMED};
use crate::gateway::FarmGateway;
use crate::model::Farm;
use crate::normalize::normalize;
use crate::time::iso_date;
use crate::{AppError, AppResult};

pub const BACKUP_FILE_PREFIX: &str = "citrus-farms-backup";

/// Pretty JSON array (2-space indentation) of current-shape farms.
pub fn to_json(farms: &[Farm]) -> AppResult<String> {
    Ok(serde_json::to_string_pretty(farms)?)
}

pub fn file_name(date: NaiveDate) -> String {
    format!("{BACKUP_FILE_PREFIX}_{}.json", iso_date(date))
}

/// Parses a backup of any generation; the top-level value must be an array.
pub fn parse_restore(text: &str) -> AppResult<Vec<Farm>> {
    let value: Value = serde_json::from_str(text)?;
    restore_records(&value)
}

/// Normalizes an already-parsed restore payload.
pub fn restore_records(value: &Value) -> AppResult<Vec<Farm>> {
    match value {
        Value::Array(records) => Ok(normalize(records)),
        other => Err(AppError::new(
            RESTORE_NOT_ARRAY,
            "Backup must contain a JSON array of farms",
        )
        .with_context("found", json_kind(other))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Replaces every stored farm with the backup contents.
///
/// Nothing is parsed or written unless `confirmed` is set.
pub async fn restore(gateway: &dyn FarmGateway, text: &str, confirmed: bool) -> AppResult<usize> {
    if !confirmed {
        warn!(target: "citrus_farms", event = "restore_unconfirmed");
        return Err(AppError::new(
            RESTORE_UNCONFIRMED,
            "Restoring replaces all stored farms and needs explicit confirmation",
        ));
    }
    let farms = parse_restore(text)?;
    let count = farms.len();
    gateway.replace_all(farms).await?;
    info!(target: "citrus_farms", event = "backup_restored", records = count);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_carries_iso_date() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 9).expect("date");
        assert_eq!(file_name(date), "citrus-farms-backup_2025-01-09.json");
    }

    #[test]
    fn backup_uses_two_space_indentation() {
        let farm = Farm {
            id: "f1".into(),
            name: "Sun".into(),
            ..Farm::default()
        };
        let text = to_json(&[farm]).expect("encode");
        assert!(text.starts_with("[\n  {\n    \"id\": \"f1\""));
    }

    #[test]
    fn non_array_payload_is_rejected() {
        let err = parse_restore(r#"{"farms": []}"#).expect_err("object payload");
        assert_eq!(err.code(), RESTORE_NOT_ARRAY);
        assert_eq!(err.context().get("found").map(String::as_str), Some("object"));
        assert!(err.is_validation());
    }

    #[test]
    fn restore_accepts_legacy_records() {
        let farms = parse_restore(r#"[{"id":"a","basicInfo":{"name":"Old"}}]"#).expect("parse");
        assert_eq!(farms[0].name, "Old");
        assert_eq!(farms[0].plots.len(), 1);
    }
}
