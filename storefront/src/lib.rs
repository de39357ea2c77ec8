use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tracing::info;
use url::Url;

use self::api::{ApiClient, AuthApi};
use self::cart::CartManager;
use self::checkout::CheckoutManager;
use self::notify::Notifier;
use self::revalidation::RevalidationTask;
use self::store::Storage;
use self::user_session::SessionManager;

pub mod api;
pub mod cart;
pub mod checkout;
pub mod error;
pub mod notify;
pub mod revalidation;
pub mod store;
pub mod user_session;

pub use self::error::{Error, Result};

#[derive(Args, Clone, Debug)]
pub struct Config {
    #[arg(long, env = "STOREFRONT_API_URL", default_value = "http://localhost:5000/api")]
    pub api_url: Url,

    #[arg(long, env = "STOREFRONT_ASSET_URL", default_value = "http://localhost:5000")]
    pub asset_url: Url,

    #[arg(
        long,
        help = "Seconds between session revalidations",
        env = "STOREFRONT_REVALIDATE_SECS",
        default_value_t = 300
    )]
    pub revalidate_interval_secs: u64,
}

impl Config {
    pub fn revalidate_interval(&self) -> Duration {
        Duration::from_secs(self.revalidate_interval_secs.max(1))
    }
}

/// Everything a front-end needs, built once from the persisted store and
/// passed around explicitly.
pub struct StorefrontContext {
    pub config: Arc<Config>,
    pub api: ApiClient,
    pub session: SessionManager,
    pub cart: CartManager,
    pub checkout: CheckoutManager,
    revalidation: Option<RevalidationTask>,
}

impl StorefrontContext {
    /// Restores state from `storage` and resolves a persisted token into a
    /// user. Revalidation is not started; see [`Self::start_revalidation`].
    pub async fn init(
        config: Config,
        storage: Arc<dyn Storage>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let api = ApiClient::new(&config.api_url, storage.clone());
        let auth: Arc<dyn AuthApi> = Arc::new(api.clone());
        Self::with_parts(config, api, auth, storage, notifier).await
    }

    pub async fn with_parts(
        config: Config,
        api: ApiClient,
        auth: Arc<dyn AuthApi>,
        storage: Arc<dyn Storage>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let session = SessionManager::load(storage.clone(), auth, notifier.clone())?;
        let cart = CartManager::load(storage.clone(), notifier.clone())?;
        let checkout = CheckoutManager::load(storage, notifier)?;
        session.load_user_profile().await;
        info!(
            api_url = %config.api_url,
            authenticated = session.is_authenticated(),
            cart_lines = cart.items().len(),
            "Storefront context ready"
        );
        Ok(Self {
            config: Arc::new(config),
            api,
            session,
            cart,
            checkout,
            revalidation: None,
        })
    }

    pub fn start_revalidation(&mut self) {
        if self.revalidation.is_some() {
            return;
        }
        let period = self.config.revalidate_interval();
        self.revalidation = Some(RevalidationTask::spawn(self.session.clone(), period));
    }

    pub fn is_revalidating(&self) -> bool {
        self.revalidation
            .as_ref()
            .is_some_and(RevalidationTask::is_running)
    }

    pub async fn shutdown(mut self) {
        if let Some(task) = self.revalidation.take() {
            task.shutdown().await;
        }
        info!("Storefront context shut down");
    }

    pub async fn place_order(&self) -> Result<shared::Order> {
        self.checkout
            .place_order(&self.api, &self.session, &self.cart)
            .await
    }
}
