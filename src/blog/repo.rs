use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use super::dto::PostWrite;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub category_id: Option<Uuid>,
    pub title: String,
    pub content: String,
    pub status: bool,
    pub created_date: OffsetDateTime,
    pub updated_date: OffsetDateTime,
    pub published_date: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
}

/// List filters, all optional. `title`/`author` are exact matches; `search`
/// is a substring match over title and content.
#[derive(Debug, Default, Clone)]
pub struct PostFilter {
    pub title: Option<String>,
    pub author: Option<Uuid>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PostOrdering {
    #[default]
    Newest,
    TitleAsc,
    TitleDesc,
}

impl PostOrdering {
    /// `?ordering=title` / `?ordering=-title`; anything else keeps the default.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("title") => PostOrdering::TitleAsc,
            Some("-title") => PostOrdering::TitleDesc,
            _ => PostOrdering::Newest,
        }
    }

    fn sql(self) -> &'static str {
        match self {
            PostOrdering::Newest => " ORDER BY created_date DESC",
            PostOrdering::TitleAsc => " ORDER BY title ASC",
            PostOrdering::TitleDesc => " ORDER BY title DESC",
        }
    }
}

const POST_COLUMNS: &str = "id, author_id, category_id, title, content, status, \
                            created_date, updated_date, published_date";

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &PostFilter) {
    qb.push(" WHERE TRUE");
    if let Some(title) = &filter.title {
        qb.push(" AND title = ").push_bind(title.clone());
    }
    if let Some(author) = filter.author {
        qb.push(" AND author_id = ").push_bind(author);
    }
    if let Some(search) = &filter.search {
        let pattern = format!("%{search}%");
        qb.push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR content ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

impl Post {
    pub async fn list(
        db: &PgPool,
        filter: &PostFilter,
        ordering: PostOrdering,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<Post>> {
        let mut qb = QueryBuilder::new(format!("SELECT {POST_COLUMNS} FROM posts"));
        push_filters(&mut qb, filter);
        qb.push(ordering.sql());
        qb.push(" LIMIT ").push_bind(limit);
        qb.push(" OFFSET ").push_bind(offset);
        let rows = qb.build_query_as::<Post>().fetch_all(db).await?;
        Ok(rows)
    }

    pub async fn count(db: &PgPool, filter: &PostFilter) -> anyhow::Result<i64> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM posts");
        push_filters(&mut qb, filter);
        let total = qb.build_query_scalar::<i64>().fetch_one(db).await?;
        Ok(total)
    }

    pub async fn find(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(post)
    }

    pub async fn create(db: &PgPool, author_id: Uuid, write: &PostWrite) -> anyhow::Result<Post> {
        let post = sqlx::query_as::<_, Post>(&format!(
            "INSERT INTO posts (author_id, title, content, status, category_id, published_date)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {POST_COLUMNS}"
        ))
        .bind(author_id)
        .bind(&write.title)
        .bind(&write.content)
        .bind(write.status)
        .bind(write.category)
        .bind(write.published_date)
        .fetch_one(db)
        .await?;
        Ok(post)
    }

    pub async fn update(db: &PgPool, id: Uuid, write: &PostWrite) -> anyhow::Result<Post> {
        let post = sqlx::query_as::<_, Post>(&format!(
            "UPDATE posts
             SET title = $2, content = $3, status = $4, category_id = $5,
                 published_date = $6, updated_date = now()
             WHERE id = $1
             RETURNING {POST_COLUMNS}"
        ))
        .bind(id)
        .bind(&write.title)
        .bind(&write.content)
        .bind(write.status)
        .bind(write.category)
        .bind(write.published_date)
        .fetch_one(db)
        .await?;
        Ok(post)
    }

    pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }
}

impl Category {
    pub async fn list(db: &PgPool) -> anyhow::Result<Vec<Category>> {
        let rows =
            sqlx::query_as::<_, Category>("SELECT id, name FROM categories ORDER BY name ASC")
                .fetch_all(db)
                .await?;
        Ok(rows)
    }

    pub async fn find(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Category>> {
        let row = sqlx::query_as::<_, Category>("SELECT id, name FROM categories WHERE id = $1")
            .bind(id)
            .fetch_optional(db)
            .await?;
        Ok(row)
    }

    pub async fn create(db: &PgPool, name: &str) -> anyhow::Result<Category> {
        let row = sqlx::query_as::<_, Category>(
            "INSERT INTO categories (name) VALUES ($1) RETURNING id, name",
        )
        .bind(name)
        .fetch_one(db)
        .await?;
        Ok(row)
    }

    /// Posts referencing the category keep existing with a null category,
    /// enforced by ON DELETE SET NULL on the foreign key.
    pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_parses_title_variants_and_falls_back() {
        assert_eq!(PostOrdering::parse(Some("title")), PostOrdering::TitleAsc);
        assert_eq!(PostOrdering::parse(Some("-title")), PostOrdering::TitleDesc);
        assert_eq!(PostOrdering::parse(Some("content")), PostOrdering::Newest);
        assert_eq!(PostOrdering::parse(None), PostOrdering::Newest);
    }

    #[test]
    fn filters_compose_into_bound_sql() {
        let filter = PostFilter {
            title: Some("Hello".into()),
            author: Some(Uuid::new_v4()),
            search: Some("rust".into()),
        };
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM posts");
        push_filters(&mut qb, &filter);
        let sql = qb.sql();
        assert!(sql.contains("title = "));
        assert!(sql.contains("author_id = "));
        assert!(sql.contains("ILIKE"));
        // search pattern goes through bind params, never string interpolation
        assert!(!sql.contains("rust"));
    }
}
