use std::str::FromStr;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use stockledger_core::{AdjustmentId, DomainError};
use stockledger_infra::cache::CacheTag;
use stockledger_infra::services::PositionAction;
use stockledger_inventory::{OrderStatus, StockAdjustment};
use stockledger_pricing::decimal_text;

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementRequest {
    #[serde(default)]
    pub item_ids: Vec<String>,
    #[serde(deserialize_with = "decimal_text::number")]
    pub exchange_rate: f64,
}

#[derive(Debug, Deserialize)]
pub struct PositionUsageRequest {
    pub action: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CacheInvalidateRequest {
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStatusRequest {
    #[serde(default)]
    pub item_ids: Vec<String>,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateWarehouseRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatePositionRequest {
    pub name: String,
    pub capacity: u32,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockAdjustResponse {
    pub adjustment_id: AdjustmentId,
    pub new_stock: i64,
}

impl From<&StockAdjustment> for StockAdjustResponse {
    fn from(adjustment: &StockAdjustment) -> Self {
        Self {
            adjustment_id: adjustment.id,
            new_stock: adjustment.new_stock,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InvalidatedResponse {
    pub invalidated: Vec<&'static str>,
}

// -------------------------
// Parsing helpers
// -------------------------

/// Parse a path identifier, answering 400 on malformed input.
pub fn parse_id<T>(raw: &str, what: &'static str) -> Result<T, axum::response::Response>
where
    T: FromStr<Err = DomainError>,
{
    raw.parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id")))
}

pub fn parse_status(raw: &str) -> Result<OrderStatus, axum::response::Response> {
    raw.parse().map_err(|e: DomainError| {
        errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string())
    })
}

pub fn parse_position_action(raw: &str) -> Result<PositionAction, axum::response::Response> {
    match raw.trim() {
        "add" => Ok(PositionAction::Add),
        "remove" => Ok(PositionAction::Remove),
        other => Err(errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            format!("action must be one of: add, remove (got '{other}')"),
        )),
    }
}

/// Requested tags, or every tag when the caller named none.
pub fn parse_tags(raw: Option<Vec<String>>) -> Result<Vec<CacheTag>, axum::response::Response> {
    match raw {
        None => Ok(CacheTag::ALL.to_vec()),
        Some(names) if names.is_empty() => Ok(CacheTag::ALL.to_vec()),
        Some(names) => names
            .iter()
            .map(|name| {
                name.parse::<CacheTag>().map_err(|e| {
                    errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e)
                })
            })
            .collect(),
    }
}

/// Tags named by a raw invalidate body. An empty body means every tag; any
/// other body must be a well-formed [`CacheInvalidateRequest`].
pub fn parse_invalidate_body(body: &[u8]) -> Result<Vec<CacheTag>, axum::response::Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return parse_tags(None);
    }
    let request: CacheInvalidateRequest = serde_json::from_slice(body).map_err(|e| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            format!("invalid invalidate body: {e}"),
        )
    })?;
    parse_tags(request.tags)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_tags_mean_all() {
        assert_eq!(parse_tags(None).unwrap(), CacheTag::ALL.to_vec());
        assert_eq!(
            parse_tags(Some(vec!["stats".to_string()])).unwrap(),
            vec![CacheTag::Stats]
        );
        assert!(parse_tags(Some(vec!["bogus".to_string()])).is_err());
    }

    #[test]
    fn invalidate_body_must_be_well_formed_when_present() {
        assert_eq!(parse_invalidate_body(b"").unwrap(), CacheTag::ALL.to_vec());
        assert_eq!(parse_invalidate_body(b" \n").unwrap(), CacheTag::ALL.to_vec());
        assert_eq!(parse_invalidate_body(b"{}").unwrap(), CacheTag::ALL.to_vec());
        assert_eq!(
            parse_invalidate_body(br#"{"tags":["months"]}"#).unwrap(),
            vec![CacheTag::Months]
        );
        for bad in [&br#"{"tags":"stats"}"#[..], &b"{tags"[..], &b"null"[..]] {
            assert_eq!(
                parse_invalidate_body(bad).unwrap_err().status(),
                StatusCode::BAD_REQUEST
            );
        }
    }

    #[test]
    fn exchange_rate_accepts_numeric_strings() {
        let req: SettlementRequest =
            serde_json::from_str(r#"{"itemIds":["AB000001"],"exchangeRate":"0.05"}"#).unwrap();
        assert_eq!(req.exchange_rate, 0.05);
        assert!(serde_json::from_str::<SettlementRequest>(r#"{"exchangeRate":"fast"}"#).is_err());
    }

    #[test]
    fn position_actions() {
        assert_eq!(parse_position_action("add").unwrap(), PositionAction::Add);
        assert_eq!(parse_position_action("remove").unwrap(), PositionAction::Remove);
        assert_eq!(
            parse_position_action("swap").unwrap_err().status(),
            StatusCode::BAD_REQUEST
        );
    }
}
