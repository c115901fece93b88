// 💸 Transaction Entity - income and expense rows owned by one user
//
// Amounts are always stored as non-negative magnitudes; the sign lives in
// `tx_type`. Rows are replaced wholesale on edit.

use crate::db::{self, DATE_FORMAT};
use crate::error::{StoreError, StoreResult};
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

// ============================================================================
// TRANSACTION TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Income,
    Expense,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Income => "income",
            TransactionType::Expense => "expense",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "income" => Ok(TransactionType::Income),
            "expense" => Ok(TransactionType::Expense),
            other => Err(StoreError::Validation(format!(
                "unknown transaction type: {other}"
            ))),
        }
    }
}

// ============================================================================
// TRANSACTION ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub amount: f64,
    pub category: String,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

/// Fields a user supplies when creating or editing a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionInput {
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub amount: f64,
    pub category: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
}

impl TransactionInput {
    pub fn validate(&self) -> StoreResult<()> {
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(StoreError::InvalidAmount(self.amount));
        }
        if self.category.trim().is_empty() {
            return Err(StoreError::Validation("category is required".to_string()));
        }
        Ok(())
    }

    /// Hash used to skip rows already imported
    /// NOTE: only CSV imports carry a hash; manual entries may repeat freely
    pub fn idempotency_hash(&self, user_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}|{}|{}|{:.2}|{}|{}",
            user_id,
            self.date.format(DATE_FORMAT),
            self.tx_type,
            self.amount,
            self.category.trim(),
            self.description.as_deref().unwrap_or("").trim()
        ));
        format!("{:x}", hasher.finalize())
    }
}

/// Optional narrowing for `list_transactions`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionFilter {
    #[serde(default, rename = "type")]
    pub tx_type: Option<TransactionType>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
}

impl TransactionFilter {
    pub fn matches(&self, tx: &Transaction) -> bool {
        self.tx_type.map_or(true, |t| tx.tx_type == t)
            && self
                .category
                .as_deref()
                .map_or(true, |c| tx.category.eq_ignore_ascii_case(c))
            && self.from.map_or(true, |from| tx.date >= from)
            && self.to.map_or(true, |to| tx.date <= to)
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn row_to_transaction(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    let tx_type: String = row.get(2)?;
    let date: String = row.get(5)?;

    Ok(Transaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        tx_type: tx_type.parse().map_err(|e: StoreError| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.to_string().into())
        })?,
        amount: row.get(3)?,
        category: row.get(4)?,
        date: db::parse_date(5, &date)?,
        description: row.get(6)?,
        provider: row.get(7)?,
    })
}

const SELECT_COLUMNS: &str =
    "SELECT id, user_id, tx_type, amount, category, date, description, provider FROM transactions";

// ============================================================================
// CRUD
// ============================================================================

pub fn create_transaction(
    conn: &Connection,
    user_id: &str,
    input: &TransactionInput,
) -> StoreResult<Transaction> {
    insert_with_hash(conn, user_id, input, None)
}

fn insert_with_hash(
    conn: &Connection,
    user_id: &str,
    input: &TransactionInput,
    hash: Option<&str>,
) -> StoreResult<Transaction> {
    if let Err(e) = input.validate() {
        warn!(user_id, error = %e, "transaction rejected");
        return Err(e);
    }

    let tx = Transaction {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        tx_type: input.tx_type,
        amount: input.amount,
        category: input.category.trim().to_string(),
        date: input.date,
        description: non_blank(&input.description).map(String::from),
        provider: non_blank(&input.provider).map(String::from),
    };

    conn.execute(
        "INSERT INTO transactions (
            id, user_id, tx_type, amount, category, date, description, provider,
            idempotency_hash, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            tx.id,
            tx.user_id,
            tx.tx_type.as_str(),
            tx.amount,
            tx.category,
            tx.date.format(DATE_FORMAT).to_string(),
            tx.description,
            tx.provider,
            hash,
            db::format_timestamp(Utc::now()),
        ],
    )
    .map_err(|e| db::map_constraint(e, "transaction", hash.unwrap_or(&tx.id)))?;

    db::record_event(
        conn,
        "transaction_added",
        "transaction",
        &tx.id,
        serde_json::json!({
            "type": tx.tx_type,
            "amount": tx.amount,
            "category": tx.category,
        }),
        user_id,
    )?;

    info!(user_id, id = %tx.id, amount = tx.amount, "transaction created");
    Ok(tx)
}

pub fn get_transaction(conn: &Connection, user_id: &str, id: &str) -> StoreResult<Transaction> {
    conn.query_row(
        &format!("{SELECT_COLUMNS} WHERE id = ?1 AND user_id = ?2"),
        params![id, user_id],
        row_to_transaction,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("transaction", id))
}

pub fn update_transaction(
    conn: &Connection,
    user_id: &str,
    id: &str,
    input: &TransactionInput,
) -> StoreResult<Transaction> {
    input.validate()?;

    let changed = conn.execute(
        "UPDATE transactions
         SET tx_type = ?1, amount = ?2, category = ?3, date = ?4, description = ?5, provider = ?6
         WHERE id = ?7 AND user_id = ?8",
        params![
            input.tx_type.as_str(),
            input.amount,
            input.category.trim(),
            input.date.format(DATE_FORMAT).to_string(),
            non_blank(&input.description),
            non_blank(&input.provider),
            id,
            user_id,
        ],
    )?;

    if changed == 0 {
        return Err(StoreError::not_found("transaction", id));
    }

    db::record_event(
        conn,
        "transaction_updated",
        "transaction",
        id,
        serde_json::to_value(input)?,
        user_id,
    )?;

    info!(user_id, id, "transaction updated");
    get_transaction(conn, user_id, id)
}

pub fn delete_transaction(conn: &Connection, user_id: &str, id: &str) -> StoreResult<()> {
    let changed = conn.execute(
        "DELETE FROM transactions WHERE id = ?1 AND user_id = ?2",
        params![id, user_id],
    )?;

    if changed == 0 {
        return Err(StoreError::not_found("transaction", id));
    }

    db::record_event(
        conn,
        "transaction_deleted",
        "transaction",
        id,
        serde_json::json!({}),
        user_id,
    )?;

    info!(user_id, id, "transaction deleted");
    Ok(())
}

/// All of a user's transactions, newest first
pub fn list_transactions(
    conn: &Connection,
    user_id: &str,
    filter: &TransactionFilter,
) -> StoreResult<Vec<Transaction>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_COLUMNS} WHERE user_id = ?1 ORDER BY date DESC, created_at DESC"
    ))?;

    let transactions = stmt
        .query_map([user_id], row_to_transaction)?
        .filter(|row| match row {
            Ok(tx) => filter.matches(tx),
            Err(_) => true,
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(transactions)
}

// ============================================================================
// CSV IMPORT
// ============================================================================

/// One CSV line: `date,type,amount,category,description,provider`
#[derive(Debug, Deserialize)]
struct CsvRow {
    date: String,
    #[serde(rename = "type")]
    tx_type: String,
    amount: f64,
    category: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    provider: Option<String>,
}

impl CsvRow {
    fn into_input(self) -> StoreResult<TransactionInput> {
        let date = NaiveDate::parse_from_str(self.date.trim(), DATE_FORMAT)
            .map_err(|e| StoreError::Validation(format!("bad date '{}': {e}", self.date)))?;

        Ok(TransactionInput {
            tx_type: self.tx_type.parse()?,
            amount: self.amount,
            category: self.category,
            date,
            description: self.description,
            provider: self.provider,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub inserted: usize,
    pub duplicates: usize,
}

/// Import a CSV file; rows already imported (same idempotency hash) are skipped
pub fn import_csv(conn: &Connection, user_id: &str, csv_path: &Path) -> StoreResult<ImportReport> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(csv_path)?;

    let mut inputs = Vec::new();
    for result in rdr.deserialize() {
        let row: CsvRow = result?;
        inputs.push(row.into_input()?);
    }

    import_inputs(conn, user_id, &inputs)
}

/// Import already-parsed rows with duplicate detection
pub fn import_inputs(
    conn: &Connection,
    user_id: &str,
    inputs: &[TransactionInput],
) -> StoreResult<ImportReport> {
    let mut report = ImportReport::default();

    for input in inputs {
        let hash = input.idempotency_hash(user_id);

        match insert_with_hash(conn, user_id, input, Some(&hash)) {
            Ok(_) => report.inserted += 1,
            Err(StoreError::Duplicate { .. }) => report.duplicates += 1,
            Err(e) => return Err(e),
        }
    }

    info!(
        user_id,
        inserted = report.inserted,
        duplicates = report.duplicates,
        "csv import finished"
    );
    Ok(report)
}
