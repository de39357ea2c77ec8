use reqwest::Method;
use shared::{NewOrderRequest, Order, PaymentResult};
use tracing::info;

use super::{ApiClient, ApiResult};

pub async fn create_order(api: &ApiClient, request: &NewOrderRequest) -> ApiResult<Order> {
    let order: Order = api.send_json(Method::POST, "/orders", request).await?;
    info!(
        order_id = %order.id,
        items = order.order_items.len(),
        total = order.total_price,
        "Api order created"
    );
    Ok(order)
}

pub async fn get_order_details(api: &ApiClient, id: &str) -> ApiResult<Order> {
    info!(order_id = %id, "Api get order");
    api.get(&format!("/orders/{id}")).await
}

pub async fn pay_order(api: &ApiClient, id: &str, payment: &PaymentResult) -> ApiResult<Order> {
    let order: Order = api
        .send_json(Method::PUT, &format!("/orders/{id}/pay"), payment)
        .await?;
    info!(order_id = %id, paid = order.is_paid, "Api order paid");
    Ok(order)
}

pub async fn get_my_orders(api: &ApiClient) -> ApiResult<Vec<Order>> {
    api.get("/orders/myorders").await
}
