use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Form,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

use kaogong_persist::OrderStatus;
use kaogong_types::parse_yuan;

use crate::{
    error::{ApiError, ApiResult},
    services::payment::{self, TRADE_SUCCESS},
    state::AppState,
};

/// Gateway acknowledgement. Anything but `success` makes it retry.
enum Ack {
    Success,
    Fail,
}

impl IntoResponse for Ack {
    fn into_response(self) -> Response {
        match self {
            Ack::Success => (StatusCode::OK, "success").into_response(),
            Ack::Fail => (StatusCode::BAD_REQUEST, "fail").into_response(),
        }
    }
}

/// Asynchronous payment notification (form body)
#[utoipa::path(
    post,
    path = "/payment/notify",
    responses(
        (status = 200, description = "`success`: notification accepted"),
        (status = 400, description = "`fail`: bad signature or amount")
    ),
    tag = "payment"
)]
pub async fn notify(
    State(state): State<Arc<AppState>>,
    Form(params): Form<HashMap<String, String>>,
) -> Response {
    handle_notify(&state, params).await
}

/// Same notification delivered as a GET query string
pub async fn notify_query(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    handle_notify(&state, params).await
}

async fn handle_notify(state: &AppState, params: HashMap<String, String>) -> Response {
    match process_notify(state, &params).await {
        Ok(ack) => ack.into_response(),
        Err(e) => {
            let out_trade_no = params.get("out_trade_no").map(String::as_str).unwrap_or_default();
            tracing::error!(out_trade_no = %out_trade_no, "Payment notification failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "fail").into_response()
        }
    }
}

async fn process_notify(state: &AppState, params: &HashMap<String, String>) -> ApiResult<Ack> {
    let verified = payment::verify(params, &state.config.payment_key)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    if !verified {
        tracing::warn!("Payment notification with invalid signature rejected");
        return Ok(Ack::Fail);
    }

    let field = |name: &str| params.get(name).map(String::as_str).unwrap_or_default();
    let out_trade_no = field("out_trade_no");

    if field("trade_status") != TRADE_SUCCESS {
        tracing::info!(out_trade_no = %out_trade_no, status = %field("trade_status"), "Ignoring non-success notification");
        return Ok(Ack::Success);
    }

    let Some(order) = state.persist.find_order(out_trade_no).await? else {
        tracing::warn!(out_trade_no = %out_trade_no, "Notification for unknown order");
        return Ok(Ack::Fail);
    };

    if parse_yuan(field("money")) != Some(order.amount_cents) {
        tracing::warn!(
            out_trade_no = %out_trade_no,
            money = %field("money"),
            expected_cents = order.amount_cents,
            "Notification amount does not match order"
        );
        return Ok(Ack::Fail);
    }

    let now = Utc::now();
    let paid = match state.persist.mark_order_paid(out_trade_no, field("trade_no"), now).await? {
        Some(paid) => paid,
        // Already paid: fulfilment below is idempotent, so a failed grant is retried here
        None if order.status == OrderStatus::Paid => order,
        None => match state.persist.find_order(out_trade_no).await? {
            Some(current) if current.status == OrderStatus::Paid => current,
            _ => {
                tracing::warn!(out_trade_no = %out_trade_no, "Notification for order that cannot be paid");
                return Ok(Ack::Success);
            }
        },
    };

    match state.persist.fulfil_order(&paid, now).await? {
        Some(membership) => {
            tracing::info!(
                out_trade_no = %out_trade_no,
                user_id = %paid.user_id,
                expires_at = %membership.expires_at,
                "Order paid, membership activated"
            );
        }
        None => {
            tracing::debug!(out_trade_no = %out_trade_no, "Repeated notification for fulfilled order");
        }
    }

    Ok(Ack::Success)
}
