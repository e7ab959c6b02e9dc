use axum::extract::Query;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;
use serde::Serialize;

use super::ApiError;
use super::ApiSuccess;
use super::UserData;
use crate::domain::user::models::PageRequest;
use crate::inbound::http::router::AppState;

/// Raw query string. Values are kept as text so that garbage such as
/// `?page=abc` falls back to the defaults instead of failing the request.
#[derive(Debug, Default, Deserialize)]
pub struct ListUsersQuery {
    page: Option<String>,
    per_page: Option<String>,
}

impl ListUsersQuery {
    fn page_request(&self) -> PageRequest {
        let parse = |v: &Option<String>| v.as_deref().and_then(|s| s.trim().parse::<i64>().ok());
        PageRequest::new(parse(&self.page), parse(&self.per_page))
    }
}

pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
) -> Result<ApiSuccess<ListUsersResponseData>, ApiError> {
    let page = query.page_request();

    let result = state
        .user_service
        .list_users(&page)
        .await
        .map_err(ApiError::from)?;

    Ok(ApiSuccess::new(
        StatusCode::OK,
        ListUsersResponseData {
            users: result.users.iter().map(UserData::from).collect(),
            pagination: PaginationData {
                current_page: page.page(),
                per_page: page.per_page(),
                total: result.total,
                total_pages: result.total_pages(page.per_page()),
            },
        },
    ))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListUsersResponseData {
    pub users: Vec<UserData>,
    pub pagination: PaginationData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaginationData {
    pub current_page: u32,
    pub per_page: u32,
    pub total: u64,
    pub total_pages: u64,
}
