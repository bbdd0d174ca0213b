use axum::{routing::get, Router};

use crate::state::AppState;

mod dto;
pub mod handlers;
pub mod pagination;
pub mod repo;

use handlers::{
    create_category, create_post, delete_category, delete_post, get_category, get_post,
    list_categories, list_posts, patch_post, put_post,
};

pub fn router() -> Router<AppState> {
    // The original surface exposes the same resource twice: a plain view pair
    // under /post/ and a router-registered collection under /posts/.
    Router::new()
        .route("/post/", get(list_posts).post(create_post))
        .route(
            "/post/:id/",
            get(get_post)
                .put(put_post)
                .patch(patch_post)
                .delete(delete_post),
        )
        .route("/posts/", get(list_posts).post(create_post))
        .route(
            "/posts/:id/",
            get(get_post)
                .put(put_post)
                .patch(patch_post)
                .delete(delete_post),
        )
        .route("/category/", get(list_categories).post(create_category))
        .route("/category/:id/", get(get_category).delete(delete_category))
}
