use crate::api::ApiError;
use crate::store::StorageError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("storage_error: {0}")]
    Storage(#[from] StorageError),
    #[error("Only {available} items available in stock")]
    StockExceeded { id: String, available: u32 },
    #[error("Your cart is empty")]
    EmptyCart,
    #[error("Please sign in to continue")]
    Unauthenticated,
    #[error("Shipping address is missing")]
    MissingShippingAddress,
    #[error("Shipping address field '{field}' must not be empty")]
    InvalidShippingAddress { field: &'static str },
    #[error("Your card was declined")]
    PaymentDeclined,
}

impl Error {
    /// Client-side checks that never reached the server.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::StockExceeded { .. }
                | Error::EmptyCart
                | Error::MissingShippingAddress
                | Error::InvalidShippingAddress { .. }
                | Error::PaymentDeclined
        )
    }

    pub fn is_unauthorized(&self) -> bool {
        match self {
            Error::Api(error) => error.is_unauthorized(),
            Error::Unauthenticated => true,
            _ => false,
        }
    }
}
