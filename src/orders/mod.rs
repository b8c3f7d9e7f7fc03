pub mod ledger;
pub mod status;

pub use ledger::{Order, OrderLedger};
pub use status::{action_for, is_expected_transition, OrderStatus, StatusAction};
