use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use kaogong_persist::Order;
use kaogong_types::{MembershipPlan, PlanInfo};

use crate::{
    error::{ApiError, ApiResult},
    middleware::auth::AuthUser,
    services::payment,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub plan: MembershipPlan,
}

#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub out_trade_no: String,
    pub plan: MembershipPlan,
    pub amount_cents: i64,
    pub pay_url: String,
}

/// Purchasable membership plans
#[utoipa::path(
    get,
    path = "/membership/plans",
    responses((status = 200, description = "Plans with prices in fen")),
    tag = "membership"
)]
pub async fn list_plans() -> Json<Vec<PlanInfo>> {
    Json(MembershipPlan::ALL.iter().map(MembershipPlan::info).collect())
}

/// Create a pending order and the signed gateway URL to pay it
#[utoipa::path(
    post,
    path = "/membership/orders",
    responses(
        (status = 201, description = "Order created"),
        (status = 401, description = "Missing or invalid token")
    ),
    tag = "membership"
)]
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CreateOrderRequest>,
) -> ApiResult<(StatusCode, Json<CreateOrderResponse>)> {
    let out_trade_no = payment::new_out_trade_no(Utc::now());
    let order = state
        .persist
        .create_order(Order::new(&auth.user_id, req.plan, out_trade_no))
        .await?;
    let pay_url = payment::pay_url(&state.config.payment, &state.config.payment_key, &order)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    tracing::info!(
        user_id = %auth.user_id,
        out_trade_no = %order.out_trade_no,
        plan = %order.plan,
        "Membership order created"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateOrderResponse {
            out_trade_no: order.out_trade_no,
            plan: order.plan,
            amount_cents: order.amount_cents,
            pay_url,
        }),
    ))
}

/// Order status, for polling after the learner returns from the gateway
#[utoipa::path(
    get,
    path = "/membership/orders/{out_trade_no}",
    params(("out_trade_no" = String, Path, description = "Order number")),
    responses(
        (status = 200, description = "Order"),
        (status = 404, description = "No such order for this user")
    ),
    tag = "membership"
)]
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(out_trade_no): Path<String>,
) -> ApiResult<Json<Order>> {
    let order = state
        .persist
        .find_order(&out_trade_no)
        .await?
        .filter(|o| o.user_id == auth.user_id)
        .ok_or_else(|| ApiError::NotFound(format!("order {}", out_trade_no)))?;
    Ok(Json(order))
}
