use async_trait::async_trait;
use reqwest::Method;
use shared::{AuthResponse, LoginRequest, RegisterRequest, UserProfile};
use tracing::info;

use super::{ApiClient, ApiResult, Auth};

/// Authentication endpoints the session manager depends on.
///
/// Profile and logout take the token explicitly: the session decides which
/// token a call belongs to, not whatever the store holds at send time.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, request: &LoginRequest) -> ApiResult<AuthResponse>;

    async fn register(&self, request: &RegisterRequest) -> ApiResult<AuthResponse>;

    async fn profile(&self, token: &str) -> ApiResult<UserProfile>;

    async fn logout(&self, token: &str) -> ApiResult<()>;
}

pub async fn login(api: &ApiClient, request: &LoginRequest) -> ApiResult<AuthResponse> {
    info!(email = %request.email, "Api auth login");
    api.send_json(Method::POST, "/users/login", request).await
}

pub async fn register(api: &ApiClient, request: &RegisterRequest) -> ApiResult<AuthResponse> {
    info!(email = %request.email, "Api auth register");
    api.send_json(Method::POST, "/users/register", request).await
}

pub async fn get_user_profile(api: &ApiClient, token: &str) -> ApiResult<UserProfile> {
    let request = api.request(Method::GET, "/users/profile", Auth::Token(token))?;
    let profile: UserProfile = api.execute(request).await?;
    info!(user_id = %profile.id, "Api get user profile");
    Ok(profile)
}

pub async fn logout(api: &ApiClient, token: &str) -> ApiResult<()> {
    let request = api.request(Method::POST, "/users/logout", Auth::Token(token))?;
    api.execute_empty(request).await?;
    info!("Api auth logout");
    Ok(())
}

#[async_trait]
impl AuthApi for ApiClient {
    async fn login(&self, request: &LoginRequest) -> ApiResult<AuthResponse> {
        login(self, request).await
    }

    async fn register(&self, request: &RegisterRequest) -> ApiResult<AuthResponse> {
        register(self, request).await
    }

    async fn profile(&self, token: &str) -> ApiResult<UserProfile> {
        get_user_profile(self, token).await
    }

    async fn logout(&self, token: &str) -> ApiResult<()> {
        logout(self, token).await
    }
}
