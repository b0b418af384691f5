use axum::{extract::State, http::StatusCode};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::extractors::{Json, Path};
use crate::id::{EntityType, is_valid_id_of};
use crate::models::{CreateOrder, Order, OrderStatus, OrderWithItems, Ticket};
use crate::orders::{self, Transition};
use crate::payments::{PaymentMethod, PaymentRequest, create_payment_with_retry};

/// Reject malformed ids before touching the database.
fn check_order_id(id: &str) -> Result<()> {
    if is_valid_id_of(EntityType::Order, id) {
        Ok(())
    } else {
        Err(AppError::NotFound(msg::ORDER_NOT_FOUND.into()))
    }
}

pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrder>,
) -> Result<(StatusCode, Json<OrderWithItems>)> {
    let mut conn = state.db.get()?;
    let created = orders::create_order(
        &mut conn,
        &request,
        &state.settings.currency,
        state.settings.order_ttl_secs,
        Utc::now().timestamp(),
    )?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Debug, Serialize)]
pub struct OrderStatusResponse {
    #[serde(flatten)]
    pub order: OrderWithItems,
    /// Present once the order is paid
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tickets: Vec<Ticket>,
}

/// Status poll. Applies lazy expiry, so an abandoned order reads as expired
/// even if the sweep has not run yet.
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OrderStatusResponse>> {
    check_order_id(&id)?;
    let mut conn = state.db.get()?;
    let order = orders::refresh(&mut conn, &id, Utc::now().timestamp())?;

    let tickets = if order.status == OrderStatus::Paid {
        queries::list_tickets_for_order(&conn, &order.id)?
    } else {
        Vec::new()
    };

    Ok(Json(OrderStatusResponse {
        order: orders::with_items(&conn, order)?,
        tickets,
    }))
}

#[derive(Debug, Deserialize)]
pub struct PaymentBody {
    /// virtual_account | ewallet | qr
    pub method: String,
    /// Bank code or e-wallet provider
    #[serde(default)]
    pub method_detail: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub order_id: String,
    pub order_number: String,
    pub status: OrderStatus,
    pub amount: i64,
    pub currency: String,
    pub payment_id: Option<String>,
    pub method: PaymentMethod,
    /// VA number, checkout URL or QR string
    pub display: Option<String>,
    pub expires_at: i64,
}

impl PaymentResponse {
    fn from_order(order: &Order) -> Result<Self> {
        let method = order
            .payment_method
            .as_deref()
            .ok_or_else(|| AppError::Internal(format!("Order {} has no payment method", order.id)))?;
        Ok(Self {
            order_id: order.id.clone(),
            order_number: order.order_number.clone(),
            status: order.status,
            amount: order.total_amount,
            currency: order.currency.clone(),
            payment_id: order.payment_id.clone(),
            method: PaymentMethod::parse(method, order.payment_method_detail.as_deref())?,
            display: order.payment_url.clone(),
            expires_at: order.expires_at,
        })
    }
}

/// Create (or return) the payment instrument for an order.
///
/// The gateway call happens outside any database transaction. The gateway
/// idempotency key is the order id, so concurrent or retried requests get
/// the same instrument and only one of them wins the `pending ->
/// awaiting_payment` CAS.
pub async fn request_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<PaymentBody>,
) -> Result<Json<PaymentResponse>> {
    check_order_id(&id)?;
    let method = PaymentMethod::parse(&body.method, body.method_detail.as_deref())?;

    let order = {
        let mut conn = state.db.get()?;
        orders::refresh(&mut conn, &id, Utc::now().timestamp())?
    };

    match order.status {
        OrderStatus::AwaitingPayment => return Ok(Json(PaymentResponse::from_order(&order)?)),
        OrderStatus::Pending => {}
        _ => return Err(AppError::Conflict(msg::ORDER_NOT_PAYABLE.into())),
    }

    let request = PaymentRequest {
        order_id: order.id.clone(),
        reference: order.external_reference.clone(),
        amount: order.total_amount,
        currency: order.currency.clone(),
        method,
        customer_name: order.customer_name.clone(),
        customer_email: order.customer_email.clone(),
        customer_phone: order.customer_phone.clone(),
        description: format!("Order {}", order.order_number),
        expires_at: order.expires_at,
    };
    let instrument =
        create_payment_with_retry(state.gateway.as_ref(), &request, &state.settings.retry).await?;

    let conn = state.db.get()?;
    match orders::attach_payment(&conn, &order.id, &instrument, Utc::now().timestamp())? {
        Transition::Applied | Transition::AlreadyResolved(OrderStatus::AwaitingPayment) => {
            let order = queries::get_order_by_id(&conn, &order.id)?
                .ok_or_else(|| AppError::NotFound(msg::ORDER_NOT_FOUND.into()))?;
            Ok(Json(PaymentResponse::from_order(&order)?))
        }
        Transition::AlreadyResolved(status) => {
            tracing::warn!(
                order_id = %order.id,
                status = status.as_ref(),
                payment_id = %instrument.payment_id,
                "Order resolved while the instrument was being created"
            );
            Err(AppError::Conflict(msg::ORDER_NOT_PAYABLE.into()))
        }
    }
}

pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Order>> {
    check_order_id(&id)?;
    let mut conn = state.db.get()?;
    let order = orders::cancel(&mut conn, &id, Utc::now().timestamp())?;
    Ok(Json(order))
}
