use serde::Deserialize;

/// Exchange order status. Strings the exchange may add later land in
/// `Unknown` instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "String")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    PendingCancel,
    Rejected,
    Expired,
    Unknown(String),
}

impl From<String> for OrderStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "NEW" => OrderStatus::New,
            "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
            "FILLED" => OrderStatus::Filled,
            "CANCELED" => OrderStatus::Canceled,
            "PENDING_CANCEL" => OrderStatus::PendingCancel,
            "REJECTED" => OrderStatus::Rejected,
            "EXPIRED" => OrderStatus::Expired,
            _ => OrderStatus::Unknown(s),
        }
    }
}

impl From<&str> for OrderStatus {
    fn from(s: &str) -> Self {
        OrderStatus::from(s.to_string())
    }
}

impl OrderStatus {
    pub fn as_str(&self) -> &str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::PendingCancel => "PENDING_CANCEL",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Expired => "EXPIRED",
            OrderStatus::Unknown(s) => s,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }
}

/// Whether the exchange is expected to move an order from `from` to `to`.
/// Staying put is always allowed; terminal states never move.
pub fn is_expected_transition(from: &OrderStatus, to: &OrderStatus) -> bool {
    use OrderStatus::*;
    if from == to {
        return true;
    }
    match (from, to) {
        (_, Unknown(_)) | (Unknown(_), _) => false,
        (New, _) => true,
        (PartiallyFilled, Filled) | (PartiallyFilled, Canceled) => true,
        (PendingCancel, Canceled) => true,
        _ => false,
    }
}

/// What the reconciliation cycle does with an order after observing its status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAction {
    /// Leave it tracked and look again next cycle.
    Keep,
    /// Drop it from the ledger; the empty-side check refills later.
    Untrack,
    /// Drop it, record the fill, place a fresh buy+sell pair.
    UntrackAndReplace,
}

pub fn action_for(status: &OrderStatus) -> StatusAction {
    match status {
        OrderStatus::Filled => StatusAction::UntrackAndReplace,
        s if s.is_terminal() => StatusAction::Untrack,
        // Partial fills stay tracked as-is; the remaining quantity is not repriced.
        _ => StatusAction::Keep,
    }
}
