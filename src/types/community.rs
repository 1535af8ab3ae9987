use serde::Deserialize;
use utoipa::ToSchema;

use crate::models::Category;

#[derive(Deserialize, ToSchema)]
pub struct CreatePostRequest {
    pub title: String,
    pub content: String,
    pub category: Category,
}

#[derive(Deserialize)]
pub struct ListPostsQuery {
    pub category: Option<Category>,
}
