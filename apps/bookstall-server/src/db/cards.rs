//! Knowledge card tree operations
//!
//! Cards form a forest through `parent_id`. Only non-leaf cards may have
//! children. Deleting a card removes its whole subtree.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub is_leaf: bool,
    pub created_at: String,
}

/// Nested import/export representation of a card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardNode {
    pub name: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_leaf: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<CardNode>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn validate_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("name is required".to_string()));
    }
    Ok(name)
}

/// Card repository
pub struct CardRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> CardRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: &str) -> Result<Option<Card>> {
        let card = sqlx::query_as::<_, Card>(
            "SELECT id, name, parent_id, is_leaf, created_at FROM cards WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(card)
    }

    pub async fn roots(&self) -> Result<Vec<Card>> {
        let cards = sqlx::query_as::<_, Card>(
            r#"
            SELECT id, name, parent_id, is_leaf, created_at
            FROM cards
            WHERE parent_id IS NULL
            ORDER BY rowid
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        Ok(cards)
    }

    pub async fn children(&self, parent_id: &str) -> Result<Vec<Card>> {
        let cards = sqlx::query_as::<_, Card>(
            r#"
            SELECT id, name, parent_id, is_leaf, created_at
            FROM cards
            WHERE parent_id = ?
            ORDER BY rowid
            "#,
        )
        .bind(parent_id)
        .fetch_all(self.pool)
        .await?;

        Ok(cards)
    }

    /// Create a card. The parent, when given, must exist and not be a leaf.
    pub async fn create(&self, name: &str, parent_id: Option<&str>, is_leaf: bool) -> Result<Card> {
        let name = validate_name(name)?;
        if let Some(parent_id) = parent_id {
            let parent = self
                .get(parent_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Parent card not found: {}", parent_id)))?;
            if parent.is_leaf {
                return Err(AppError::BadRequest(format!(
                    "Card {} is a leaf and cannot have children",
                    parent_id
                )));
            }
        }

        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO cards (id, name, parent_id, is_leaf, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(name)
        .bind(parent_id)
        .bind(is_leaf)
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool)
        .await?;

        self.get(&id)
            .await?
            .ok_or_else(|| AppError::Internal("Failed to fetch created card".to_string()))
    }

    pub async fn rename(&self, id: &str, name: &str) -> Result<Option<Card>> {
        let name = validate_name(name)?;
        let result = sqlx::query("UPDATE cards SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get(id).await
    }

    /// Delete a card and all of its descendants, returning how many rows
    /// were removed
    pub async fn delete_tree(&self, id: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            WITH RECURSIVE subtree(id) AS (
                SELECT id FROM cards WHERE id = ?
                UNION ALL
                SELECT c.id FROM cards c JOIN subtree s ON c.parent_id = s.id
            )
            DELETE FROM cards WHERE id IN (SELECT id FROM subtree)
            "#,
        )
        .bind(id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// The whole forest as nested nodes, siblings in creation order
    pub async fn export_tree(&self) -> Result<Vec<CardNode>> {
        let cards = sqlx::query_as::<_, Card>(
            "SELECT id, name, parent_id, is_leaf, created_at FROM cards ORDER BY rowid",
        )
        .fetch_all(self.pool)
        .await?;

        let mut children: HashMap<Option<String>, Vec<&Card>> = HashMap::new();
        for card in &cards {
            children.entry(card.parent_id.clone()).or_default().push(card);
        }

        fn build(parent: Option<String>, children: &HashMap<Option<String>, Vec<&Card>>) -> Vec<CardNode> {
            children
                .get(&parent)
                .map(|cards| {
                    cards
                        .iter()
                        .map(|card| CardNode {
                            name: card.name.clone(),
                            is_leaf: card.is_leaf,
                            children: build(Some(card.id.clone()), children),
                        })
                        .collect()
                })
                .unwrap_or_default()
        }

        Ok(build(None, &children))
    }

    /// Insert a nested tree as new roots in one transaction. Returns the
    /// number of cards created.
    pub async fn import_tree(&self, tree: &[CardNode]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now().to_rfc3339();
        let mut created = 0;

        // Depth-first with an explicit stack; reversed pushes keep sibling order
        let mut stack: Vec<(&CardNode, Option<String>)> =
            tree.iter().rev().map(|node| (node, None)).collect();
        while let Some((node, parent_id)) = stack.pop() {
            let name = validate_name(&node.name)?;
            if node.is_leaf && !node.children.is_empty() {
                return Err(AppError::BadRequest(format!(
                    "Leaf card '{}' cannot have children",
                    name
                )));
            }

            let id = Uuid::new_v4().to_string();
            sqlx::query(
                "INSERT INTO cards (id, name, parent_id, is_leaf, created_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(name)
            .bind(&parent_id)
            .bind(node.is_leaf)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
            created += 1;

            for child in node.children.iter().rev() {
                stack.push((child, Some(id.clone())));
            }
        }

        tx.commit().await?;
        tracing::debug!("Imported {} cards", created);
        Ok(created)
    }
}
