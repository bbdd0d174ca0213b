use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo::{Category, Post};

const SNIPPET_LENGTH: usize = 100;

/// Content prefix shown in list views.
pub fn snippet(content: &str) -> String {
    if content.chars().count() <= SNIPPET_LENGTH {
        return content.to_string();
    }
    let cut: String = content.chars().take(SNIPPET_LENGTH).collect();
    format!("{cut}...")
}

#[derive(Debug, Deserialize)]
pub struct PostRequest {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub status: bool,
    pub category: Option<Uuid>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub published_date: Option<OffsetDateTime>,
}

/// Partial update. Nullable fields distinguish "absent" (keep the current
/// value) from an explicit `null` (clear it), hence the nested `Option`.
#[derive(Debug, Deserialize)]
pub struct PostPatchRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub status: Option<bool>,
    #[serde(default, deserialize_with = "present")]
    pub category: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "present_rfc3339")]
    pub published_date: Option<Option<OffsetDateTime>>,
}

fn present<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: serde::Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn present_rfc3339<'de, D>(deserializer: D) -> Result<Option<Option<OffsetDateTime>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    time::serde::rfc3339::option::deserialize(deserializer).map(Some)
}

/// Fields actually written to a post row, after merging a partial update.
#[derive(Debug)]
pub struct PostWrite {
    pub title: String,
    pub content: String,
    pub status: bool,
    pub category: Option<Uuid>,
    pub published_date: Option<OffsetDateTime>,
}

impl From<PostRequest> for PostWrite {
    fn from(r: PostRequest) -> Self {
        Self {
            title: r.title,
            content: r.content,
            status: r.status,
            category: r.category,
            published_date: r.published_date,
        }
    }
}

impl PostPatchRequest {
    pub fn merge(self, post: &Post) -> PostWrite {
        PostWrite {
            title: self.title.unwrap_or_else(|| post.title.clone()),
            content: self.content.unwrap_or_else(|| post.content.clone()),
            status: self.status.unwrap_or(post.status),
            category: self.category.unwrap_or(post.category_id),
            published_date: self.published_date.unwrap_or(post.published_date),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CategoryResponse {
    pub id: Uuid,
    pub name: String,
}

impl From<Category> for CategoryResponse {
    fn from(c: Category) -> Self {
        Self { id: c.id, name: c.name }
    }
}

#[derive(Debug, Deserialize)]
pub struct CategoryRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct PostResponse {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub snippet: String,
    pub status: bool,
    pub author: Uuid,
    pub category: Option<CategoryResponse>,
    pub created_date: OffsetDateTime,
    pub updated_date: OffsetDateTime,
    pub published_date: Option<OffsetDateTime>,
    pub relative_url: String,
}

impl PostResponse {
    pub fn from_post(post: Post, category: Option<Category>) -> Self {
        Self {
            relative_url: format!("/post/{}/", post.id),
            snippet: snippet(&post.content),
            id: post.id,
            title: post.title,
            content: post.content,
            status: post.status,
            author: post.author_id,
            category: category.map(CategoryResponse::from),
            created_date: post.created_date,
            updated_date: post.updated_date,
            published_date: post.published_date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_content_is_returned_whole() {
        assert_eq!(snippet("short post"), "short post");
    }

    #[test]
    fn long_content_is_truncated_with_ellipsis() {
        let content = "x".repeat(250);
        let s = snippet(&content);
        assert_eq!(s.chars().count(), 103);
        assert!(s.ends_with("..."));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let content = "ü".repeat(150);
        let s = snippet(&content);
        assert!(s.starts_with('ü'));
        assert!(s.ends_with("..."));
    }

    #[test]
    fn response_carries_detail_url_and_snippet() {
        let post = Post {
            id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            category_id: None,
            title: "Hello".into(),
            content: "world".into(),
            status: false,
            created_date: OffsetDateTime::UNIX_EPOCH,
            updated_date: OffsetDateTime::UNIX_EPOCH,
            published_date: None,
        };
        let id = post.id;
        let response = PostResponse::from_post(post, None);
        assert_eq!(response.relative_url, format!("/post/{id}/"));
        assert_eq!(response.snippet, "world");
        assert!(response.category.is_none());
    }

    fn sample_post(category_id: Option<Uuid>) -> Post {
        Post {
            id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            category_id,
            title: "Hello".into(),
            content: "world".into(),
            status: false,
            created_date: OffsetDateTime::UNIX_EPOCH,
            updated_date: OffsetDateTime::UNIX_EPOCH,
            published_date: None,
        }
    }

    #[test]
    fn patch_with_absent_category_keeps_the_current_one() {
        let current = Uuid::new_v4();
        let patch: PostPatchRequest =
            serde_json::from_str(r#"{"title": "Renamed"}"#).unwrap();
        let write = patch.merge(&sample_post(Some(current)));
        assert_eq!(write.title, "Renamed");
        assert_eq!(write.content, "world");
        assert_eq!(write.category, Some(current));
    }

    #[test]
    fn patch_with_explicit_null_clears_the_category() {
        let patch: PostPatchRequest =
            serde_json::from_str(r#"{"category": null}"#).unwrap();
        let write = patch.merge(&sample_post(Some(Uuid::new_v4())));
        assert_eq!(write.category, None);
    }

    #[test]
    fn patch_can_replace_the_category() {
        let replacement = Uuid::new_v4();
        let patch: PostPatchRequest =
            serde_json::from_str(&format!(r#"{{"category": "{replacement}"}}"#)).unwrap();
        let write = patch.merge(&sample_post(Some(Uuid::new_v4())));
        assert_eq!(write.category, Some(replacement));
    }

    #[test]
    fn patch_with_explicit_null_clears_published_date() {
        let mut post = sample_post(None);
        post.published_date = Some(OffsetDateTime::UNIX_EPOCH);
        let patch: PostPatchRequest =
            serde_json::from_str(r#"{"published_date": null}"#).unwrap();
        let write = patch.merge(&post);
        assert_eq!(write.published_date, None);
    }

    #[test]
    fn nested_category_is_serialized_with_id_and_name() {
        let post = Post {
            id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            category_id: Some(Uuid::new_v4()),
            title: "Hello".into(),
            content: "world".into(),
            status: true,
            created_date: OffsetDateTime::UNIX_EPOCH,
            updated_date: OffsetDateTime::UNIX_EPOCH,
            published_date: None,
        };
        let category = Category {
            id: post.category_id.unwrap(),
            name: "rust".into(),
        };
        let response = PostResponse::from_post(post, Some(category));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["category"]["name"], "rust");
    }
}
