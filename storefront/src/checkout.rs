use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use shared::{NewOrderRequest, Order, OrderItem, PaymentMethod, PaymentResult, ShippingAddress};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::api::{orders_api, ApiClient};
use crate::cart::{CartItem, CartManager};
use crate::error::{Error, Result};
use crate::notify::Notifier;
use crate::store::{keys, or_empty_if_corrupt, Storage, StorageError, StorageExt};
use crate::user_session::SessionManager;

pub const FREE_SHIPPING_THRESHOLD: f64 = 100.0;
pub const FLAT_SHIPPING_PRICE: f64 = 10.0;
pub const TAX_RATE: f64 = 0.15;

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, AsRefStr, Display)]
pub enum CheckoutStep {
    #[default]
    Shipping,
    Payment,
    Review,
}

impl CheckoutStep {
    pub fn next(self) -> Self {
        match self {
            CheckoutStep::Shipping => CheckoutStep::Payment,
            CheckoutStep::Payment | CheckoutStep::Review => CheckoutStep::Review,
        }
    }

    pub fn previous(self) -> Self {
        match self {
            CheckoutStep::Shipping | CheckoutStep::Payment => CheckoutStep::Shipping,
            CheckoutStep::Review => CheckoutStep::Payment,
        }
    }

    /// Where a new process picks the wizard up. Without an address only the
    /// first step is reachable, whatever was stored.
    fn resume(saved: Option<CheckoutStep>, has_address: bool, has_payment: bool) -> Self {
        match (saved, has_address) {
            (_, false) => CheckoutStep::Shipping,
            (Some(step), true) => step,
            (None, true) if has_payment => CheckoutStep::Review,
            (None, true) => CheckoutStep::Payment,
        }
    }
}

fn step_entry(step: CheckoutStep) -> (&'static str, String) {
    (keys::CHECKOUT_STEP, step.as_ref().to_owned())
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub items_price: f64,
    pub shipping_price: f64,
    pub tax_price: f64,
    pub total_price: f64,
}

impl OrderSummary {
    /// Shipping is free strictly above the threshold; tax applies to the
    /// items only.
    pub fn from_items(items: &[CartItem]) -> Self {
        let items_price: f64 = items.iter().map(CartItem::line_total).sum();
        let shipping_price = if items_price > FREE_SHIPPING_THRESHOLD {
            0.0
        } else {
            FLAT_SHIPPING_PRICE
        };
        let tax_price = items_price * TAX_RATE;
        Self {
            items_price: round_cents(items_price),
            shipping_price,
            tax_price: round_cents(tax_price),
            total_price: round_cents(items_price + shipping_price + tax_price),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CardDetails {
    pub number: &'static str,
    pub expiry: &'static str,
    pub cvc: &'static str,
    pub name: &'static str,
}

/// Sandbox cards for the mock card payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, EnumIter, AsRefStr, Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum TestCard {
    #[default]
    Visa,
    Mastercard,
    Amex,
    Declined,
}

impl TestCard {
    pub fn details(self) -> CardDetails {
        match self {
            TestCard::Visa => CardDetails {
                number: "4242424242424242",
                expiry: "12/34",
                cvc: "123",
                name: "Test User",
            },
            TestCard::Mastercard => CardDetails {
                number: "5555555555554444",
                expiry: "12/34",
                cvc: "123",
                name: "Test User",
            },
            TestCard::Amex => CardDetails {
                number: "378282246310005",
                expiry: "12/34",
                cvc: "1234",
                name: "Test User",
            },
            TestCard::Declined => CardDetails {
                number: "4000000000000002",
                expiry: "12/34",
                cvc: "123",
                name: "Test User",
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CheckoutState {
    pub shipping_address: Option<ShippingAddress>,
    pub payment_method: PaymentMethod,
    pub step: CheckoutStep,
}

/// Shipping address, payment method and wizard position. Cart lines are
/// never copied here, they are always read from the [`CartManager`].
pub struct CheckoutManager {
    state: Mutex<CheckoutState>,
    storage: Arc<dyn Storage>,
    notifier: Arc<dyn Notifier>,
}

impl CheckoutManager {
    pub fn load(storage: Arc<dyn Storage>, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let shipping_address = or_empty_if_corrupt(
            storage.get_json::<ShippingAddress>(keys::SHIPPING_ADDRESS),
            None,
        )?;
        let raw_payment_method = or_empty_if_corrupt(storage.get(keys::PAYMENT_METHOD), None)?;
        let has_payment = raw_payment_method.is_some();
        let payment_method = match raw_payment_method {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                warn!(payment_method = %raw, "Unknown payment method, using default");
                PaymentMethod::default()
            }),
            None => PaymentMethod::default(),
        };
        let saved_step = or_empty_if_corrupt(storage.get(keys::CHECKOUT_STEP), None)?
            .and_then(|raw| raw.parse::<CheckoutStep>().ok());
        let step = CheckoutStep::resume(saved_step, shipping_address.is_some(), has_payment);
        debug!(%step, "Checkout restored from storage");
        Ok(Self {
            state: Mutex::new(CheckoutState {
                shipping_address,
                payment_method,
                step,
            }),
            storage,
            notifier,
        })
    }

    fn lock(&self) -> MutexGuard<'_, CheckoutState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> CheckoutState {
        self.lock().clone()
    }

    pub fn step(&self) -> CheckoutStep {
        self.lock().step
    }

    pub fn back(&self) -> Result<CheckoutStep> {
        let mut state = self.lock();
        let step = state.step.previous();
        self.storage.set(keys::CHECKOUT_STEP, step.as_ref().to_owned())?;
        state.step = step;
        Ok(step)
    }

    pub fn shipping_address(&self) -> Option<ShippingAddress> {
        self.lock().shipping_address.clone()
    }

    pub fn payment_method(&self) -> PaymentMethod {
        self.lock().payment_method
    }

    pub fn save_shipping_address(&self, address: ShippingAddress) -> Result<CheckoutStep> {
        let missing = [
            ("address", &address.address),
            ("city", &address.city),
            ("postalCode", &address.postal_code),
            ("country", &address.country),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field);
        if let Some(field) = missing {
            let error = Error::InvalidShippingAddress { field };
            self.notifier.warning(&error.to_string());
            return Err(error);
        }
        let serialized = serde_json::to_string(&address).map_err(|source| StorageError::Malformed {
            key: keys::SHIPPING_ADDRESS.to_owned(),
            source,
        })?;
        let mut state = self.lock();
        let step = match state.step {
            CheckoutStep::Shipping => CheckoutStep::Payment,
            step => step,
        };
        self.storage
            .set_many(&[(keys::SHIPPING_ADDRESS, serialized), step_entry(step)])?;
        state.shipping_address = Some(address);
        state.step = step;
        debug!(%step, "Shipping address saved");
        Ok(step)
    }

    pub fn save_payment_method(&self, method: PaymentMethod) -> Result<CheckoutStep> {
        let mut state = self.lock();
        let step = match state.step {
            CheckoutStep::Shipping => CheckoutStep::Shipping,
            CheckoutStep::Payment | CheckoutStep::Review => CheckoutStep::Review,
        };
        self.storage.set_many(&[
            (keys::PAYMENT_METHOD, method.as_ref().to_owned()),
            step_entry(step),
        ])?;
        state.payment_method = method;
        state.step = step;
        debug!(%step, payment_method = %method, "Payment method saved");
        Ok(step)
    }

    pub fn summary(&self, cart: &CartManager) -> OrderSummary {
        OrderSummary::from_items(&cart.items())
    }

    /// Sends the cart as a new order, then empties the cart.
    pub async fn place_order(
        &self,
        api: &ApiClient,
        session: &SessionManager,
        cart: &CartManager,
    ) -> Result<Order> {
        let request = match self.order_request(session, cart) {
            Ok(request) => request,
            Err(error) => {
                self.notifier.warning(&error.to_string());
                return Err(error);
            }
        };
        let order = match orders_api::create_order(api, &request).await {
            Ok(order) => order,
            Err(error) => {
                self.notifier.error(&error.to_string());
                return Err(error.into());
            }
        };
        info!(order_id = %order.id, total = order.total_price, "Order placed");
        self.notifier.success("Order placed successfully!");
        // The order exists on the server from here on
        if let Err(error) = cart.clear_cart() {
            error!(?error, order_id = %order.id, "Failed to clear cart after order");
            self.notifier
                .warning("Order placed, but the cart could not be cleared");
        }
        self.reset_step();
        Ok(order)
    }

    fn reset_step(&self) {
        let mut state = self.lock();
        if let Err(error) = self
            .storage
            .set(keys::CHECKOUT_STEP, CheckoutStep::Shipping.as_ref().to_owned())
        {
            warn!(?error, "Failed to persist checkout step");
        }
        state.step = CheckoutStep::Shipping;
    }

    fn order_request(&self, session: &SessionManager, cart: &CartManager) -> Result<NewOrderRequest> {
        if !session.is_authenticated() {
            return Err(Error::Unauthenticated);
        }
        let items = cart.items();
        if items.is_empty() {
            return Err(Error::EmptyCart);
        }
        let state = self.snapshot();
        let shipping_address = state.shipping_address.ok_or(Error::MissingShippingAddress)?;
        let summary = OrderSummary::from_items(&items);
        Ok(NewOrderRequest {
            order_items: items.iter().map(OrderItem::from).collect(),
            shipping_address,
            payment_method: state.payment_method,
            items_price: summary.items_price,
            shipping_price: summary.shipping_price,
            tax_price: summary.tax_price,
            total_price: summary.total_price,
        })
    }

    /// Mock card payment: the declined card fails locally, any other card
    /// marks the order paid with a generated transaction id.
    pub async fn pay_order(
        &self,
        api: &ApiClient,
        session: &SessionManager,
        order_id: &str,
        card: TestCard,
    ) -> Result<Order> {
        if card == TestCard::Declined {
            warn!(order_id = %order_id, "Test card declined");
            self.notifier.error(&Error::PaymentDeclined.to_string());
            return Err(Error::PaymentDeclined);
        }
        let user = session.user().ok_or(Error::Unauthenticated)?;
        let payment = PaymentResult {
            id: format!("TEST-{}", Uuid::new_v4().simple()),
            status: "COMPLETED".to_owned(),
            update_time: Utc::now().to_rfc3339(),
            email_address: user.email,
        };
        match orders_api::pay_order(api, order_id, &payment).await {
            Ok(order) => {
                self.notifier.success("Payment successful!");
                Ok(order)
            }
            Err(error) => {
                self.notifier.error(&error.to_string());
                Err(error.into())
            }
        }
    }
}
