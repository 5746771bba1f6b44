/// Task comments and threaded replies
///
/// Comments form a tree per task through `parent_id`. Listings are rendered
/// at most four levels deep: top-level comments plus three levels of
/// replies.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE comments (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     task_id UUID NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     parent_id UUID REFERENCES comments(id) ON DELETE CASCADE,
///     content TEXT NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::integrations::storage::StorageClient;

const COMMENT_COLUMNS: &str = "id, task_id, user_id, parent_id, content, created_at, updated_at";

/// Top level plus three reply levels
pub const MAX_COMMENT_DEPTH: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentAuthor {
    pub id: Uuid,
    pub name: String,
    pub profile_picture: Option<String>,
}

/// Comment row joined with its author
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CommentWithAuthor {
    #[sqlx(flatten)]
    pub comment: Comment,
    pub author_name: String,
    pub author_picture: Option<String>,
}

impl CommentWithAuthor {
    fn author(&self) -> CommentAuthor {
        CommentAuthor {
            id: self.comment.user_id,
            name: self.author_name.clone(),
            profile_picture: self.author_picture.clone(),
        }
    }
}

/// A rendered comment with its replies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: Comment,
    pub author: CommentAuthor,
    pub replies: Vec<CommentNode>,
}

impl CommentNode {
    fn visit_authors_mut(&mut self, f: &mut impl FnMut(&mut CommentAuthor)) {
        f(&mut self.author);
        for reply in &mut self.replies {
            reply.visit_authors_mut(f);
        }
    }

    /// Number of nodes in this subtree, including itself
    pub fn len(&self) -> usize {
        1 + self.replies.iter().map(CommentNode::len).sum::<usize>()
    }

    pub fn depth(&self) -> usize {
        1 + self.replies.iter().map(CommentNode::depth).max().unwrap_or(0)
    }
}

#[derive(Debug, Error)]
pub enum CommentError {
    #[error("Comment content cannot be empty")]
    EmptyContent,

    #[error("Comment not found")]
    NotFound,

    #[error("Parent comment not found")]
    ParentNotFound,

    #[error("Parent comment belongs to a different task")]
    ParentTaskMismatch,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn require_content(content: &str) -> Result<&str, CommentError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(CommentError::EmptyContent);
    }
    Ok(trimmed)
}

impl Comment {
    pub async fn create(
        pool: &PgPool,
        task_id: Uuid,
        user_id: Uuid,
        content: &str,
    ) -> Result<Self, CommentError> {
        let content = require_content(content)?;
        let query = format!(
            "INSERT INTO comments (task_id, user_id, content) VALUES ($1, $2, $3) RETURNING {COMMENT_COLUMNS}"
        );

        Ok(sqlx::query_as::<_, Comment>(&query)
            .bind(task_id)
            .bind(user_id)
            .bind(content)
            .fetch_one(pool)
            .await?)
    }

    /// Replies to `parent_id`, which must belong to the same task
    pub async fn create_reply(
        pool: &PgPool,
        task_id: Uuid,
        user_id: Uuid,
        parent_id: Uuid,
        content: &str,
    ) -> Result<Self, CommentError> {
        let content = require_content(content)?;
        let parent = Self::find_by_id(pool, parent_id)
            .await?
            .ok_or(CommentError::ParentNotFound)?;
        if parent.task_id != task_id {
            return Err(CommentError::ParentTaskMismatch);
        }

        let query = format!(
            r#"
            INSERT INTO comments (task_id, user_id, parent_id, content)
            VALUES ($1, $2, $3, $4)
            RETURNING {COMMENT_COLUMNS}
            "#
        );

        Ok(sqlx::query_as::<_, Comment>(&query)
            .bind(task_id)
            .bind(user_id)
            .bind(parent_id)
            .bind(content)
            .fetch_one(pool)
            .await?)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1");
        sqlx::query_as::<_, Comment>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn edit(pool: &PgPool, id: Uuid, content: &str) -> Result<Self, CommentError> {
        let content = require_content(content)?;
        let query = format!(
            "UPDATE comments SET content = $2, updated_at = NOW() WHERE id = $1 RETURNING {COMMENT_COLUMNS}"
        );

        sqlx::query_as::<_, Comment>(&query)
            .bind(id)
            .bind(content)
            .fetch_optional(pool)
            .await?
            .ok_or(CommentError::NotFound)
    }

    /// Deletes a comment and every reply beneath it; returns the row count
    pub async fn delete_with_descendants(pool: &PgPool, id: Uuid) -> Result<u64, CommentError> {
        let mut tx = pool.begin().await?;

        let result = sqlx::query(
            r#"
            WITH RECURSIVE thread AS (
                SELECT id FROM comments WHERE id = $1
                UNION ALL
                SELECT c.id FROM comments c JOIN thread t ON c.parent_id = t.id
            )
            DELETE FROM comments WHERE id IN (SELECT id FROM thread)
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CommentError::NotFound);
        }

        tx.commit().await?;

        tracing::debug!(comment_id = %id, deleted = result.rows_affected(), "Comment thread deleted");
        Ok(result.rows_affected())
    }

    pub async fn list_for_task_with_authors(
        pool: &PgPool,
        task_id: Uuid,
    ) -> Result<Vec<CommentWithAuthor>, sqlx::Error> {
        sqlx::query_as::<_, CommentWithAuthor>(
            r#"
            SELECT c.id, c.task_id, c.user_id, c.parent_id, c.content,
                   c.created_at, c.updated_at,
                   u.name AS author_name, u.profile_picture AS author_picture
            FROM comments c
            JOIN users u ON u.id = c.user_id
            WHERE c.task_id = $1
            "#,
        )
        .bind(task_id)
        .fetch_all(pool)
        .await
    }
}

/// Builds the rendered tree from a flat comment list.
///
/// Top-level comments come newest first and replies oldest first. Anything
/// below [`MAX_COMMENT_DEPTH`] is dropped, as are replies whose parent is not
/// in `rows`.
pub fn build_comment_tree(rows: Vec<CommentWithAuthor>) -> Vec<CommentNode> {
    let mut children: HashMap<Option<Uuid>, Vec<CommentWithAuthor>> = HashMap::new();
    for row in rows {
        children.entry(row.comment.parent_id).or_default().push(row);
    }

    let mut roots = children.remove(&None).unwrap_or_default();
    roots.sort_by(|a, b| b.comment.created_at.cmp(&a.comment.created_at));

    roots
        .into_iter()
        .map(|row| build_node(row, 1, &mut children))
        .collect()
}

fn build_node(
    row: CommentWithAuthor,
    depth: usize,
    children: &mut HashMap<Option<Uuid>, Vec<CommentWithAuthor>>,
) -> CommentNode {
    let mut replies = if depth < MAX_COMMENT_DEPTH {
        children.remove(&Some(row.comment.id)).unwrap_or_default()
    } else {
        Vec::new()
    };
    replies.sort_by(|a, b| a.comment.created_at.cmp(&b.comment.created_at));

    let author = row.author();
    CommentNode {
        comment: row.comment,
        author,
        replies: replies
            .into_iter()
            .map(|reply| build_node(reply, depth + 1, children))
            .collect(),
    }
}

/// Replaces each author's stored picture with a signed URL.
///
/// Each distinct picture is signed once. A picture that cannot be signed is
/// cleared.
pub async fn sign_author_pictures(nodes: &mut [CommentNode], storage: &StorageClient) {
    let mut pictures: HashMap<String, Option<String>> = HashMap::new();
    for node in nodes.iter_mut() {
        node.visit_authors_mut(&mut |author| {
            if let Some(picture) = &author.profile_picture {
                pictures.entry(picture.clone()).or_insert(None);
            }
        });
    }

    for (picture, signed) in pictures.iter_mut() {
        *signed = storage.signed_url(picture, true).await;
    }

    for node in nodes.iter_mut() {
        node.visit_authors_mut(&mut |author| {
            author.profile_picture = author
                .profile_picture
                .as_ref()
                .and_then(|picture| pictures.get(picture).cloned().flatten());
        });
    }
}
