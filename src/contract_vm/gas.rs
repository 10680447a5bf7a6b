use std::cell::Cell;
use std::rc::Rc;

use log::trace;

use crate::error::{HarnessError, HarnessResult};

/// Handle to a gas meter shared between the store and the VM boundary of one
/// execution context. Not `Send`: a context stays on its thread.
pub type SharedGasMeter = Rc<MockGasMeter>;

/// MockGasMeter counts gas consumed by host operations against a fixed limit.
///
/// A failed `consume` leaves the counter where it was.
#[derive(Debug)]
pub struct MockGasMeter {
    limit: u64,
    consumed: Cell<u64>,
}

impl MockGasMeter {
    pub fn new(limit: u64) -> Self {
        MockGasMeter {
            limit,
            consumed: Cell::new(0),
        }
    }

    pub fn shared(limit: u64) -> SharedGasMeter {
        Rc::new(MockGasMeter::new(limit))
    }

    /// A meter whose limit is `u64::MAX`.
    pub fn unlimited() -> Self {
        MockGasMeter::new(u64::MAX)
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn consumed(&self) -> u64 {
        self.consumed.get()
    }

    pub fn remaining(&self) -> u64 {
        self.limit - self.consumed.get()
    }

    pub fn is_unlimited(&self) -> bool {
        self.limit == u64::MAX
    }

    pub fn consume(&self, amount: u64, descriptor: &str) -> HarnessResult<()> {
        let remaining = self.remaining();
        if amount > remaining {
            trace!(
                target: "contract_vm::gas",
                "{}: out of gas, requested {} with {} remaining",
                descriptor,
                amount,
                remaining
            );
            return Err(HarnessError::out_of_gas(descriptor, amount, remaining));
        }
        self.consumed.set(self.consumed.get() + amount);
        trace!(target: "contract_vm::gas", "{}: consumed {}", descriptor, amount);
        Ok(())
    }
}

impl Default for MockGasMeter {
    fn default() -> Self {
        MockGasMeter::unlimited()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn consume_exactly_remaining() {
        let meter = MockGasMeter::new(100);
        meter.consume(40, "first").unwrap();
        meter.consume(60, "second").unwrap();
        assert_eq!(meter.remaining(), 0);
        assert_eq!(meter.consumed(), 100);
    }

    #[test]
    fn consume_one_more_than_remaining_fails() {
        let meter = MockGasMeter::new(100);
        meter.consume(30, "first").unwrap();

        let err = meter.consume(71, "second").unwrap_err();
        assert_matches!(
            err,
            HarnessError::OutOfGas { ref descriptor, requested: 71, remaining: 70 } if descriptor == "second"
        );
        // counter untouched by the failed call
        assert_eq!(meter.remaining(), 70);
        meter.consume(70, "third").unwrap();
        assert_eq!(meter.remaining(), 0);
    }

    #[test]
    fn empty_meter_accepts_zero() {
        let meter = MockGasMeter::new(0);
        meter.consume(0, "noop").unwrap();
        assert!(meter.consume(1, "one").unwrap_err().is_out_of_gas());
    }

    #[test]
    fn unlimited_meter() {
        let meter = MockGasMeter::unlimited();
        assert!(meter.is_unlimited());
        meter.consume(u64::MAX - 1, "huge").unwrap();
        meter.consume(1, "last").unwrap();
        assert_eq!(meter.remaining(), 0);
        assert!(meter.consume(1, "over").is_err());
    }
}
