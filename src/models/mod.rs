pub mod attendee;
pub mod event;
pub mod reward;
pub mod ticket;
pub mod transaction;
pub mod user;
pub mod voucher;

pub use attendee::EventAttendee;
pub use event::Event;
pub use reward::RewardEntry;
pub use ticket::Ticket;
pub use transaction::{Transaction, TransactionDetail, TransactionStatus};
pub use user::User;
pub use voucher::Voucher;
