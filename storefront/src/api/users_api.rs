//! Admin user management.

use reqwest::Method;
use shared::{MessageResponse, UpdateUserRequest, UserProfile};
use tracing::info;

use super::{ApiClient, ApiResult};

pub async fn get_users(api: &ApiClient) -> ApiResult<Vec<UserProfile>> {
    api.get("/users").await
}

pub async fn update_user(
    api: &ApiClient,
    id: &str,
    request: &UpdateUserRequest,
) -> ApiResult<UserProfile> {
    let user: UserProfile = api
        .send_json(Method::PUT, &format!("/users/{id}"), request)
        .await?;
    info!(user_id = %user.id, is_admin = user.is_admin, "Api user updated");
    Ok(user)
}

pub async fn delete_user(api: &ApiClient, id: &str) -> ApiResult<MessageResponse> {
    let response = api.delete(&format!("/users/{id}")).await?;
    info!(user_id = %id, "Api user deleted");
    Ok(response)
}
