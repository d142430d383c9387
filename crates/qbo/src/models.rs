use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

/// Token endpoint response body.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

/// The fields the engine lifts out of an otherwise opaque entity payload.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityFields {
    pub qbo_id: String,
    pub sync_token: Option<String>,
    /// `MetaData.LastUpdatedTime` verbatim; this string is the watermark.
    pub last_updated: Option<String>,
}

/// Extract the common fields from a QBO entity. Returns `None` when the
/// payload has no `Id`, in which case the record cannot be upserted.
pub fn extract_entity_fields(entity: &Value) -> Option<EntityFields> {
    let qbo_id = entity.get("Id")?.as_str()?.to_owned();
    let sync_token = entity
        .get("SyncToken")
        .and_then(Value::as_str)
        .map(str::to_owned);
    let last_updated = entity
        .get("MetaData")
        .and_then(|m| m.get("LastUpdatedTime"))
        .and_then(Value::as_str)
        .map(str::to_owned);

    Some(EntityFields {
        qbo_id,
        sync_token,
        last_updated,
    })
}

/// `CustomerRef.value` from an invoice payload.
pub fn extract_customer_ref(entity: &Value) -> Option<String> {
    entity
        .get("CustomerRef")
        .and_then(|r| r.get("value"))
        .and_then(Value::as_str)
        .map(str::to_owned)
}

/// Parse QBO's RFC3339 timestamp for the typed column. The watermark itself
/// stays a string; this is only for storage and display.
pub fn parse_last_updated(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_all_entity_fields() {
        let entity = json!({
            "Id": "42",
            "SyncToken": "3",
            "DisplayName": "Acme",
            "MetaData": { "LastUpdatedTime": "2024-05-01T12:00:00Z" }
        });

        let fields = extract_entity_fields(&entity).unwrap();
        assert_eq!(fields.qbo_id, "42");
        assert_eq!(fields.sync_token.as_deref(), Some("3"));
        assert_eq!(
            fields.last_updated.as_deref(),
            Some("2024-05-01T12:00:00Z")
        );
    }

    #[test]
    fn missing_id_yields_none() {
        let entity = json!({ "SyncToken": "0" });
        assert!(extract_entity_fields(&entity).is_none());
    }

    #[test]
    fn missing_optional_fields_are_none() {
        let entity = json!({ "Id": "7" });
        let fields = extract_entity_fields(&entity).unwrap();
        assert!(fields.sync_token.is_none());
        assert!(fields.last_updated.is_none());
    }

    #[test]
    fn extracts_customer_ref_from_invoice() {
        let invoice = json!({ "Id": "9", "CustomerRef": { "value": "42", "name": "Acme" } });
        assert_eq!(extract_customer_ref(&invoice).as_deref(), Some("42"));

        let without = json!({ "Id": "9" });
        assert!(extract_customer_ref(&without).is_none());
    }

    #[test]
    fn parses_qbo_timestamps() {
        let parsed = parse_last_updated("2024-05-01T12:00:00Z").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-05-01T12:00:00+00:00");

        // QBO sometimes reports an explicit offset
        assert!(parse_last_updated("2024-05-01T05:00:00-07:00").is_some());
        assert!(parse_last_updated("not a timestamp").is_none());
    }

    #[test]
    fn token_response_defaults_expiry() {
        let token: TokenResponse =
            serde_json::from_str(r#"{"access_token":"a","refresh_token":"r"}"#).unwrap();
        assert_eq!(token.expires_in, 3600);
    }
}
