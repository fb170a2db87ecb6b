mod account;
mod balance;
mod credential;
mod feed;
mod transaction;

pub use account::{Account, Owner};
pub use balance::{Balance, Pot};
pub use credential::Credential;
pub use feed::FeedItemParams;
pub use transaction::{Merchant, Transaction};
