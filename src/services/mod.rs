pub mod discount;
pub mod expiry;
pub mod transactions;

pub use expiry::ExpiryScheduler;
pub use transactions::TransactionService;
