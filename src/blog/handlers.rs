use axum::{
    extract::{Path, Query, State},
    http::{StatusCode, Uri},
    Json,
};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    accounts::extractors::AuthUser,
    blog::{
        dto::{
            CategoryRequest, CategoryResponse, PostPatchRequest, PostRequest, PostResponse,
            PostWrite,
        },
        pagination::{self, Page},
        repo::{Category, Post, PostFilter, PostOrdering},
    },
    error::ApiError,
    state::AppState,
};

fn default_page() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
pub struct PostListQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    pub title: Option<String>,
    pub author: Option<Uuid>,
    pub search: Option<String>,
    pub ordering: Option<String>,
}

async fn load_category(
    state: &AppState,
    category_id: Option<Uuid>,
) -> Result<Option<Category>, ApiError> {
    match category_id {
        Some(id) => Category::find(&state.db, id)
            .await
            .map_err(ApiError::Internal),
        None => Ok(None),
    }
}

async fn post_response(state: &AppState, post: Post) -> Result<PostResponse, ApiError> {
    let category = load_category(state, post.category_id).await?;
    Ok(PostResponse::from_post(post, category))
}

/// A client-supplied category id must reference an existing row; surfaced as
/// a field error rather than letting the FK constraint bubble up as a 500.
async fn check_category(state: &AppState, category_id: Option<Uuid>) -> Result<(), ApiError> {
    if let Some(id) = category_id {
        if Category::find(&state.db, id)
            .await
            .map_err(ApiError::Internal)?
            .is_none()
        {
            return Err(ApiError::field(
                "category",
                &format!("Invalid category \"{id}\" - object does not exist"),
            ));
        }
    }
    Ok(())
}

#[instrument(skip(state))]
pub async fn list_posts(
    State(state): State<AppState>,
    uri: Uri,
    Query(query): Query<PostListQuery>,
) -> Result<Json<Page<PostResponse>>, ApiError> {
    let filter = PostFilter {
        title: query.title,
        author: query.author,
        search: query.search,
    };
    let ordering = PostOrdering::parse(query.ordering.as_deref());
    let page_size = state.config.page_size;
    let offset = pagination::offset(query.page, page_size);

    let total = Post::count(&state.db, &filter)
        .await
        .map_err(ApiError::Internal)?;
    let posts = Post::list(&state.db, &filter, ordering, page_size, offset)
        .await
        .map_err(ApiError::Internal)?;

    let mut results = Vec::with_capacity(posts.len());
    for post in posts {
        results.push(post_response(&state, post).await?);
    }

    Ok(Json(pagination::paginate(
        uri.path(),
        query.page,
        page_size,
        total,
        results,
    )))
}

#[instrument(skip(state, payload))]
pub async fn create_post(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<PostRequest>,
) -> Result<(StatusCode, Json<PostResponse>), ApiError> {
    check_category(&state, payload.category).await?;

    // Author is always the caller, never taken from the body.
    let write = PostWrite::from(payload);
    let post = Post::create(&state.db, user_id, &write)
        .await
        .map_err(ApiError::Internal)?;
    info!(post_id = %post.id, author = %user_id, "post created");
    let response = post_response(&state, post).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

#[instrument(skip(state))]
pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PostResponse>, ApiError> {
    let post = Post::find(&state.db, id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(post_response(&state, post).await?))
}

async fn owned_post(state: &AppState, id: Uuid, caller: Uuid) -> Result<Post, ApiError> {
    let post = Post::find(&state.db, id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or(ApiError::NotFound)?;
    if post.author_id != caller {
        return Err(ApiError::Forbidden);
    }
    Ok(post)
}

#[instrument(skip(state, payload))]
pub async fn put_post(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<PostRequest>,
) -> Result<Json<PostResponse>, ApiError> {
    let post = owned_post(&state, id, user_id).await?;
    check_category(&state, payload.category).await?;
    let write = PostWrite::from(payload);
    let updated = Post::update(&state.db, post.id, &write)
        .await
        .map_err(ApiError::Internal)?;
    Ok(Json(post_response(&state, updated).await?))
}

#[instrument(skip(state, payload))]
pub async fn patch_post(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<PostPatchRequest>,
) -> Result<Json<PostResponse>, ApiError> {
    let post = owned_post(&state, id, user_id).await?;
    // Only a category explicitly present in the body needs checking; an
    // inherited one already passed on a previous write.
    if let Some(category) = payload.category {
        check_category(&state, category).await?;
    }
    let write = payload.merge(&post);
    let updated = Post::update(&state.db, post.id, &write)
        .await
        .map_err(ApiError::Internal)?;
    Ok(Json(post_response(&state, updated).await?))
}

#[instrument(skip(state))]
pub async fn delete_post(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let post = owned_post(&state, id, user_id).await?;
    Post::delete(&state.db, post.id)
        .await
        .map_err(ApiError::Internal)?;
    info!(post_id = %id, author = %user_id, "post deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<CategoryResponse>>, ApiError> {
    let categories = Category::list(&state.db)
        .await
        .map_err(ApiError::Internal)?;
    Ok(Json(categories.into_iter().map(Into::into).collect()))
}

#[instrument(skip(state, payload))]
pub async fn create_category(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
    Json(payload): Json<CategoryRequest>,
) -> Result<(StatusCode, Json<CategoryResponse>), ApiError> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::field("name", "This field may not be blank"));
    }
    let category = Category::create(&state.db, payload.name.trim())
        .await
        .map_err(ApiError::Internal)?;
    Ok((StatusCode::CREATED, Json(category.into())))
}

#[instrument(skip(state))]
pub async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CategoryResponse>, ApiError> {
    let category = Category::find(&state.db, id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(category.into()))
}

#[instrument(skip(state))]
pub async fn delete_category(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let deleted = Category::delete(&state.db, id)
        .await
        .map_err(ApiError::Internal)?;
    if !deleted {
        return Err(ApiError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[tokio::test]
    async fn unknown_category_surfaces_as_a_field_error_not_a_500() {
        let id = Uuid::new_v4();
        let err = ApiError::field(
            "category",
            &format!("Invalid category \"{id}\" - object does not exist"),
        );
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["category"][0]
            .as_str()
            .unwrap()
            .contains("does not exist"));
    }
}
