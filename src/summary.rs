// 📊 Expense Summaries - totals and buckets over already-fetched transactions
//
// Pure functions: callers fetch the user's rows first, then aggregate.

use crate::entities::{Transaction, TransactionType};
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Totals {
    pub income: f64,
    pub expense: f64,
    /// income - expense
    pub balance: f64,
    pub count: usize,
}

pub fn totals(transactions: &[Transaction]) -> Totals {
    let mut totals = Totals::default();

    for tx in transactions {
        match tx.tx_type {
            TransactionType::Income => totals.income += tx.amount,
            TransactionType::Expense => totals.expense += tx.amount,
        }
        totals.count += 1;
    }

    totals.balance = totals.income - totals.expense;
    totals
}

// ============================================================================
// PERIOD BUCKETS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Week,
    #[default]
    Month,
}

impl Period {
    /// Bucket key: `YYYY-Www` (ISO week) or `YYYY-MM`
    pub fn key(&self, date: chrono::NaiveDate) -> String {
        match self {
            Period::Week => {
                let week = date.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
            Period::Month => format!("{}-{:02}", date.year(), date.month()),
        }
    }
}

impl std::str::FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "week" | "weekly" => Ok(Period::Week),
            "month" | "monthly" => Ok(Period::Month),
            other => Err(format!("unknown period: {other} (expected week or month)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodBucket {
    pub key: String,
    pub income: f64,
    pub expense: f64,
}

/// Buckets in chronological order; periods without rows are omitted
pub fn group_by_period(transactions: &[Transaction], period: Period) -> Vec<PeriodBucket> {
    let mut buckets: BTreeMap<String, (f64, f64)> = BTreeMap::new();

    for tx in transactions {
        let entry = buckets.entry(period.key(tx.date)).or_insert((0.0, 0.0));
        match tx.tx_type {
            TransactionType::Income => entry.0 += tx.amount,
            TransactionType::Expense => entry.1 += tx.amount,
        }
    }

    buckets
        .into_iter()
        .map(|(key, (income, expense))| PeriodBucket {
            key,
            income,
            expense,
        })
        .collect()
}

// ============================================================================
// CATEGORY BREAKDOWN
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryBucket {
    pub category: String,
    pub total: f64,
    pub count: usize,
    /// Share of the type's total, 0-100
    pub percentage: f64,
}

/// Per-category totals for one type, largest first (ties by name)
pub fn group_by_category(
    transactions: &[Transaction],
    tx_type: TransactionType,
) -> Vec<CategoryBucket> {
    // Keyed case-insensitively, labelled with the first spelling seen
    let mut by_category: HashMap<String, (&str, f64, usize)> = HashMap::new();
    let mut grand_total = 0.0;

    for tx in transactions.iter().filter(|tx| tx.tx_type == tx_type) {
        let entry = by_category
            .entry(tx.category.to_lowercase())
            .or_insert((tx.category.as_str(), 0.0, 0));
        entry.1 += tx.amount;
        entry.2 += 1;
        grand_total += tx.amount;
    }

    let mut buckets: Vec<CategoryBucket> = by_category
        .into_values()
        .map(|(category, total, count)| CategoryBucket {
            category: category.to_string(),
            total,
            count,
            percentage: if grand_total > 0.0 {
                total / grand_total * 100.0
            } else {
                0.0
            },
        })
        .collect();

    buckets.sort_by(|a, b| {
        b.total
            .total_cmp(&a.total)
            .then_with(|| a.category.cmp(&b.category))
    });
    buckets
}

/// Everything the dashboard shows in one payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub totals: Totals,
    pub period: Period,
    pub periods: Vec<PeriodBucket>,
    pub expense_categories: Vec<CategoryBucket>,
    pub income_categories: Vec<CategoryBucket>,
}

pub fn summarize(transactions: &[Transaction], period: Period) -> Summary {
    Summary {
        totals: totals(transactions),
        period,
        periods: group_by_period(transactions, period),
        expense_categories: group_by_category(transactions, TransactionType::Expense),
        income_categories: group_by_category(transactions, TransactionType::Income),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn tx(tx_type: TransactionType, amount: f64, category: &str, date: &str) -> Transaction {
        Transaction {
            id: format!("{category}-{date}-{amount}"),
            user_id: "u1".to_string(),
            tx_type,
            amount,
            category: category.to_string(),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            description: None,
            provider: None,
        }
    }

    fn sample() -> Vec<Transaction> {
        vec![
            tx(TransactionType::Income, 1000.0, "Salary", "2024-01-05"),
            tx(TransactionType::Expense, 200.0, "Housing", "2024-01-06"),
            tx(TransactionType::Expense, 50.0, "Food", "2024-01-08"),
            tx(TransactionType::Expense, 150.0, "Food", "2024-02-01"),
        ]
    }

    #[test]
    fn test_totals() {
        let t = totals(&sample());
        assert_eq!(t.income, 1000.0);
        assert_eq!(t.expense, 400.0);
        assert_eq!(t.balance, 600.0);
        assert_eq!(t.count, 4);

        assert_eq!(totals(&[]), Totals::default());
    }

    #[test]
    fn test_group_by_month() {
        let buckets = group_by_period(&sample(), Period::Month);
        assert_eq!(
            buckets,
            vec![
                PeriodBucket {
                    key: "2024-01".to_string(),
                    income: 1000.0,
                    expense: 250.0
                },
                PeriodBucket {
                    key: "2024-02".to_string(),
                    income: 0.0,
                    expense: 150.0
                },
            ]
        );
    }

    #[test]
    fn test_group_by_iso_week() {
        // 2024-01-05 and 01-06 are in W01, 01-08 (Monday) starts W02
        let keys: Vec<String> = group_by_period(&sample(), Period::Week)
            .into_iter()
            .map(|b| b.key)
            .collect();
        assert_eq!(keys, vec!["2024-W01", "2024-W02", "2024-W05"]);

        // Dec 30 2024 belongs to ISO week 1 of 2025
        let date = NaiveDate::from_ymd_opt(2024, 12, 30).unwrap();
        assert_eq!(Period::Week.key(date), "2025-W01");
    }

    #[test]
    fn test_group_by_category() {
        let buckets = group_by_category(&sample(), TransactionType::Expense);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].category, "Food");
        assert_eq!(buckets[0].total, 200.0);
        assert_eq!(buckets[0].count, 2);
        assert_eq!(buckets[0].percentage, 50.0);
        assert_eq!(buckets[1].category, "Housing");

        assert!(group_by_category(&[], TransactionType::Income).is_empty());
    }

    #[test]
    fn test_category_case_merged() {
        let txs = vec![
            tx(TransactionType::Expense, 10.0, "Food", "2024-03-02"),
            tx(TransactionType::Expense, 5.0, "food", "2024-03-01"),
            tx(TransactionType::Expense, 5.0, "FOOD", "2024-02-28"),
        ];
        let buckets = group_by_category(&txs, TransactionType::Expense);

        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].category, "Food");
        assert_eq!(buckets[0].count, 3);
        assert_eq!(buckets[0].total, 20.0);
        assert_eq!(buckets[0].percentage, 100.0);
    }

    #[test]
    fn test_period_parsing() {
        assert_eq!("week".parse::<Period>().unwrap(), Period::Week);
        assert_eq!("Monthly".parse::<Period>().unwrap(), Period::Month);
        assert!("year".parse::<Period>().is_err());
    }
}
