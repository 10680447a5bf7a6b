use cosmwasm_std::{CanonicalAddr, HumanAddr};
use cosmwasm_vm::{Api, BackendError, BackendResult, GasInfo};

use crate::error::{HarnessError, HarnessResult};

/// Translation between the human readable and the canonical form of an
/// address. Each direction reports the gas it cost next to its result.
pub trait AddressTranslator {
    fn to_human(&self, canonical: &[u8]) -> (HarnessResult<String>, u64);
    fn to_canonical(&self, human: &str) -> (HarnessResult<Vec<u8>>, u64);
}

impl<A: Api> AddressTranslator for A {
    fn to_human(&self, canonical: &[u8]) -> (HarnessResult<String>, u64) {
        let (result, gas_info) = self.human_address(&CanonicalAddr::from(canonical));
        let result = result
            .map(|human| human.to_string())
            .map_err(|e| HarnessError::Address(e.to_string()));
        (result, total_cost(gas_info))
    }

    fn to_canonical(&self, human: &str) -> (HarnessResult<Vec<u8>>, u64) {
        let (result, gas_info) = self.canonical_address(&HumanAddr::from(human));
        let result = result
            .map(|canonical| canonical.as_slice().to_vec())
            .map_err(|e| HarnessError::Address(e.to_string()));
        (result, total_cost(gas_info))
    }
}

fn total_cost(gas_info: GasInfo) -> u64 {
    gas_info.cost.saturating_add(gas_info.externally_used)
}

/// IdentityApi treats the bytes of a human address as its canonical form.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct IdentityApi {
    cost_per_call: u64,
}

impl IdentityApi {
    pub fn new(cost_per_call: u64) -> Self {
        IdentityApi { cost_per_call }
    }
}

impl Api for IdentityApi {
    fn canonical_address(&self, human: &HumanAddr) -> BackendResult<CanonicalAddr> {
        let gas_info = GasInfo::with_cost(self.cost_per_call);
        if human.as_str().is_empty() {
            return (
                Err(BackendError::unknown("empty human address")),
                gas_info,
            );
        }
        (Ok(CanonicalAddr::from(human.as_str().as_bytes())), gas_info)
    }

    fn human_address(&self, canonical: &CanonicalAddr) -> BackendResult<HumanAddr> {
        let gas_info = GasInfo::with_cost(self.cost_per_call);
        if canonical.as_slice().is_empty() {
            return (
                Err(BackendError::unknown("empty canonical address")),
                gas_info,
            );
        }
        let result = std::str::from_utf8(canonical.as_slice())
            .map(HumanAddr::from)
            .map_err(|e| BackendError::unknown(format!("canonical address is not utf-8: {}", e)));
        (result, gas_info)
    }
}
