use std::collections::HashMap;
use std::fs;
use std::path::Path;

use cosmwasm_std::{Coin, Env, HumanAddr, MessageInfo, Uint128};
use serde::{Deserialize, Serialize};

use crate::contract_vm::engine::{mock_env, UFraction};
use crate::error::{HarnessError, HarnessResult};

const DEFAULT_CONTRACT_BALANCE: u128 = 10_000_000_000_000_000;
const DEFAULT_GAS_LIMIT: u64 = 500_000_000_000_000;
const DEFAULT_MEMORY_LIMIT_MIB: usize = 16;
const DEFAULT_PRINT_DEBUG: bool = true;
const DENOM: &str = "orai";
const CHAIN_ID: &str = "Oraichain";

/// Everything needed to build a simulation besides the contract code.
///
/// Loaded from a JSON file; missing fields take their default.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    pub chain_id: String,
    pub block_height: u64,
    /// Block time in nanoseconds since the unix epoch
    pub block_time_nanos: u64,
    pub contract_addr: String,
    pub sender_addr: String,
    /// Funds attached to every call
    pub funds: Vec<Coin>,
    pub denom: String,
    pub contract_balance: Uint128,
    pub gas_limit: u64,
    pub memory_limit_mib: usize,
    pub print_debug: bool,
    /// Gas charged per byte of contract response
    pub deserialization_cost: UFraction,
    /// Gas reported by each address translation
    pub address_cost: u64,
    /// Canned smart query responses, keyed by contract address
    pub wasm_responses: HashMap<String, serde_json::Value>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            chain_id: CHAIN_ID.to_string(),
            block_height: 12_345,
            block_time_nanos: 1_571_797_419_879_305_533,
            contract_addr: "fake_contract_addr".to_string(),
            sender_addr: "fake_sender_addr".to_string(),
            funds: vec![],
            denom: DENOM.to_string(),
            contract_balance: Uint128(DEFAULT_CONTRACT_BALANCE),
            gas_limit: DEFAULT_GAS_LIMIT,
            memory_limit_mib: DEFAULT_MEMORY_LIMIT_MIB,
            print_debug: DEFAULT_PRINT_DEBUG,
            deserialization_cost: UFraction::new(1, 1),
            address_cost: 0,
            wasm_responses: HashMap::new(),
        }
    }
}

impl SimulationConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> HarnessResult<Self> {
        let raw = fs::read_to_string(path)?;
        let config: SimulationConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> HarnessResult<()> {
        if self.deserialization_cost.denominator == 0 {
            return Err(HarnessError::Config(
                "deserialization_cost.denominator must not be zero".to_string(),
            ));
        }
        if self.contract_addr.is_empty() {
            return Err(HarnessError::Config("contract_addr is empty".to_string()));
        }
        if self.sender_addr.is_empty() {
            return Err(HarnessError::Config("sender_addr is empty".to_string()));
        }
        if self.chain_id.is_empty() {
            return Err(HarnessError::Config("chain_id is empty".to_string()));
        }
        Ok(())
    }

    pub fn env(&self) -> Env {
        mock_env(
            self.block_height,
            self.block_time_nanos,
            &self.chain_id,
            &self.contract_addr,
        )
    }

    pub fn message_info(&self) -> MessageInfo {
        MessageInfo {
            sender: HumanAddr::from(self.sender_addr.as_str()),
            sent_funds: self.funds.clone(),
        }
    }

    pub fn contract_coins(&self) -> Vec<Coin> {
        vec![Coin {
            denom: self.denom.clone(),
            amount: self.contract_balance,
        }]
    }
}
