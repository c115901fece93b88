// Expense tracker entities
//
// Every row is owned by exactly one user; lookups by another user behave as
// if the row did not exist.

pub mod transaction;
pub mod category;
pub mod provider;

pub use transaction::{
    Transaction, TransactionType, TransactionInput, TransactionFilter, ImportReport,
};
pub use category::{Category, CategoryInput, DEFAULT_CATEGORIES};
pub use provider::{Provider, ProviderInput};
