use crate::error::{ErrCode, Result};

/// Run-scoped environment: the cost meter.
///
/// Every executed instruction charges one unit; host functions charge
/// their declared cost before running. With no limit set the meter only
/// accumulates.
#[derive(Debug, Default)]
pub struct Environment {
    cost: u64,
    cost_limit: Option<u64>,
}

impl Environment {
    pub fn new() -> Self {
        Environment::default()
    }

    /// Install a cost ceiling; execution traps with `CostLimitExceeded`
    /// once it is crossed.
    pub fn set_cost_limit(&mut self, limit: Option<u64>) {
        self.cost_limit = limit;
    }

    pub fn cost(&self) -> u64 {
        self.cost
    }

    pub fn consume(&mut self, cost: u64) -> Result<()> {
        self.cost = self.cost.saturating_add(cost);
        match self.cost_limit {
            Some(limit) if self.cost > limit => Err(ErrCode::CostLimitExceeded),
            _ => Ok(()),
        }
    }

    /// Clear the accumulated cost (the limit survives).
    pub fn reset(&mut self) {
        self.cost = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meter_trips_past_limit() {
        let mut env = Environment::new();
        env.consume(u64::MAX).unwrap();
        env.reset();
        env.set_cost_limit(Some(10));
        env.consume(10).unwrap();
        assert_eq!(env.consume(1), Err(ErrCode::CostLimitExceeded));
    }
}
