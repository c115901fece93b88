// 🏪 Provider Entity - named counterparties a user pays or is paid by

use crate::db;
use crate::error::{StoreError, StoreResult};
use chrono::Utc;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    pub user_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInput {
    pub name: String,
}

fn validated_name(input: &ProviderInput) -> StoreResult<&str> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(StoreError::Validation("provider name is required".to_string()));
    }
    Ok(name)
}

pub fn create_provider(
    conn: &Connection,
    user_id: &str,
    input: &ProviderInput,
) -> StoreResult<Provider> {
    let provider = Provider {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        name: validated_name(input)?.to_string(),
    };

    conn.execute(
        "INSERT INTO providers (id, user_id, name, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            provider.id,
            provider.user_id,
            provider.name,
            db::format_timestamp(Utc::now())
        ],
    )?;

    db::record_event(
        conn,
        "provider_added",
        "provider",
        &provider.id,
        serde_json::json!({ "name": provider.name }),
        user_id,
    )?;

    info!(user_id, id = %provider.id, "provider created");
    Ok(provider)
}

pub fn rename_provider(
    conn: &Connection,
    user_id: &str,
    id: &str,
    input: &ProviderInput,
) -> StoreResult<Provider> {
    let name = validated_name(input)?;

    let changed = conn.execute(
        "UPDATE providers SET name = ?1 WHERE id = ?2 AND user_id = ?3",
        params![name, id, user_id],
    )?;
    if changed == 0 {
        return Err(StoreError::not_found("provider", id));
    }

    db::record_event(
        conn,
        "provider_renamed",
        "provider",
        id,
        serde_json::json!({ "name": name }),
        user_id,
    )?;

    Ok(Provider {
        id: id.to_string(),
        user_id: user_id.to_string(),
        name: name.to_string(),
    })
}

pub fn delete_provider(conn: &Connection, user_id: &str, id: &str) -> StoreResult<()> {
    let changed = conn.execute(
        "DELETE FROM providers WHERE id = ?1 AND user_id = ?2",
        params![id, user_id],
    )?;
    if changed == 0 {
        return Err(StoreError::not_found("provider", id));
    }

    db::record_event(conn, "provider_deleted", "provider", id, serde_json::json!({}), user_id)?;
    info!(user_id, id, "provider deleted");
    Ok(())
}

/// A user's providers sorted by name
pub fn list_providers(conn: &Connection, user_id: &str) -> StoreResult<Vec<Provider>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, name FROM providers WHERE user_id = ?1 ORDER BY name COLLATE NOCASE",
    )?;

    let providers = stmt
        .query_map([user_id], |row| {
            Ok(Provider {
                id: row.get(0)?,
                user_id: row.get(1)?,
                name: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(providers)
}
