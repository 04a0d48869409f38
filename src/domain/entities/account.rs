use serde::Serialize;

/// Virtual account ledger. `balance` is the single source of truth mutated by
/// every open, partial close, full close, and fee event; equity is derived,
/// never stored.
#[derive(Debug, Clone, Serialize)]
pub struct AccountState {
    pub balance: f64,
    pub initial_balance: f64,
    pub daily_loss: f64,
    pub last_trade_timestamp_ms: i64,
}

impl AccountState {
    pub fn new(initial_balance: f64) -> Self {
        AccountState {
            balance: initial_balance,
            initial_balance,
            daily_loss: 0.0,
            last_trade_timestamp_ms: 0,
        }
    }

    /// Apply a realized result: credit (or debit) the balance and accumulate
    /// daily loss for losing closes.
    pub fn realize(&mut self, amount: f64, pnl: f64, now_ms: i64) {
        self.balance += amount;
        if pnl < 0.0 {
            self.daily_loss += -pnl;
        }
        self.last_trade_timestamp_ms = now_ms;
    }

    /// Reserve margin plus entry fee for a new position.
    pub fn reserve(&mut self, margin: f64, fee: f64, now_ms: i64) {
        self.balance -= margin + fee;
        self.last_trade_timestamp_ms = now_ms;
    }
}
