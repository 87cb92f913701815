// Library root: the game rules (rounds, economy, trades) and the storage and
// content seams they run on.

pub mod content;
pub mod error;
pub mod ledger;
pub mod player;
pub mod round;
pub mod store;
pub mod trade;

#[cfg(test)]
pub(crate) mod test_support;

pub use content::{ContentProvider, Difficulty, Mode};
pub use error::{ErrorKind, GameError};
pub use ledger::Ledger;
pub use player::Player;
pub use round::{RoundEngine, RoundNotice, RoundSettings};
pub use store::Database;
pub use trade::{TradeBroker, TradeType};
