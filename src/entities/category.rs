// 🏷️ Category Entity - built-in defaults merged with user-defined rows
//
// Categories have no surrogate id: (user, name, type) is the key.
// Defaults live in code, never in the table, and cannot be removed.

use crate::db;
use crate::entities::TransactionType;
use crate::error::{StoreError, StoreResult};
use chrono::Utc;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ============================================================================
// DEFAULT CATEGORIES
// ============================================================================

/// Categories every user starts with
pub const DEFAULT_CATEGORIES: &[(&str, TransactionType)] = &[
    ("Food", TransactionType::Expense),
    ("Transport", TransactionType::Expense),
    ("Housing", TransactionType::Expense),
    ("Utilities", TransactionType::Expense),
    ("Health", TransactionType::Expense),
    ("Entertainment", TransactionType::Expense),
    ("Shopping", TransactionType::Expense),
    ("Education", TransactionType::Expense),
    ("Other", TransactionType::Expense),
    ("Salary", TransactionType::Income),
    ("Freelance", TransactionType::Income),
    ("Investments", TransactionType::Income),
    ("Gifts", TransactionType::Income),
    ("Other", TransactionType::Income),
];

pub fn is_default_category(name: &str, category_type: TransactionType) -> bool {
    DEFAULT_CATEGORIES
        .iter()
        .any(|(default, t)| *t == category_type && default.eq_ignore_ascii_case(name.trim()))
}

// ============================================================================
// CATEGORY ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Owner; `None` for built-in defaults
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub category_type: TransactionType,
    #[serde(default)]
    pub is_default: bool,
}

impl Category {
    fn default_entry(name: &str, category_type: TransactionType) -> Self {
        Category {
            user_id: None,
            name: name.to_string(),
            category_type,
            is_default: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryInput {
    pub name: String,
    #[serde(rename = "type")]
    pub category_type: TransactionType,
}

/// Defaults first (in declaration order), then the user's rows by type and name
pub fn list_categories(conn: &Connection, user_id: &str) -> StoreResult<Vec<Category>> {
    let mut categories: Vec<Category> = DEFAULT_CATEGORIES
        .iter()
        .map(|(name, t)| Category::default_entry(name, *t))
        .collect();

    let mut stmt = conn.prepare(
        "SELECT name, category_type FROM categories
         WHERE user_id = ?1
         ORDER BY category_type, name COLLATE NOCASE",
    )?;

    let rows = stmt
        .query_map([user_id], |row| {
            let name: String = row.get(0)?;
            let category_type: String = row.get(1)?;
            Ok((name, category_type))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    for (name, category_type) in rows {
        let category_type: TransactionType = category_type.parse()?;
        // Rows shadowing a default (written before it became one) are shown once
        if is_default_category(&name, category_type) {
            continue;
        }
        categories.push(Category {
            user_id: Some(user_id.to_string()),
            name,
            category_type,
            is_default: false,
        });
    }

    Ok(categories)
}

pub fn create_category(
    conn: &Connection,
    user_id: &str,
    input: &CategoryInput,
) -> StoreResult<Category> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(StoreError::Validation("category name is required".to_string()));
    }

    let key = format!("{}/{}", input.category_type, name);
    if is_default_category(name, input.category_type) {
        return Err(StoreError::Duplicate {
            entity: "category",
            key,
        });
    }

    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM categories
         WHERE user_id = ?1 AND category_type = ?2 AND name = ?3 COLLATE NOCASE)",
        params![user_id, input.category_type.as_str(), name],
        |row| row.get(0),
    )?;
    if exists {
        return Err(StoreError::Duplicate {
            entity: "category",
            key,
        });
    }

    conn.execute(
        "INSERT INTO categories (user_id, name, category_type, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            user_id,
            name,
            input.category_type.as_str(),
            db::format_timestamp(Utc::now())
        ],
    )
    .map_err(|e| db::map_constraint(e, "category", &key))?;

    db::record_event(
        conn,
        "category_added",
        "category",
        &key,
        serde_json::json!({ "name": name, "type": input.category_type }),
        user_id,
    )?;

    info!(user_id, category = %key, "category created");
    Ok(Category {
        user_id: Some(user_id.to_string()),
        name: name.to_string(),
        category_type: input.category_type,
        is_default: false,
    })
}

pub fn delete_category(
    conn: &Connection,
    user_id: &str,
    name: &str,
    category_type: TransactionType,
) -> StoreResult<()> {
    if is_default_category(name, category_type) {
        warn!(user_id, name, "refusing to delete default category");
        return Err(StoreError::DefaultCategoryProtected(name.trim().to_string()));
    }

    let changed = conn.execute(
        "DELETE FROM categories
         WHERE user_id = ?1 AND category_type = ?2 AND name = ?3 COLLATE NOCASE",
        params![user_id, category_type.as_str(), name.trim()],
    )?;

    let key = format!("{}/{}", category_type, name.trim());
    if changed == 0 {
        return Err(StoreError::not_found("category", key));
    }

    db::record_event(
        conn,
        "category_deleted",
        "category",
        &key,
        serde_json::json!({}),
        user_id,
    )?;

    info!(user_id, category = %key, "category deleted");
    Ok(())
}
