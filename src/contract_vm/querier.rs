use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use cosmwasm_std::{
    from_slice, to_binary, AllBalanceResponse, AllDelegationsResponse, BalanceResponse,
    BankQuery, Binary, BondedDenomResponse, Coin, ContractResult, Empty, FullDelegation,
    QuerierResult, QueryRequest, StakingQuery, SystemError, SystemResult, Validator,
    ValidatorsResponse, WasmQuery,
};
use cosmwasm_vm::{BackendError, BackendResult, GasInfo, Querier};
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};

const GAS_COST_QUERY_FLAT: u64 = 100_000;
/// Gas per response byte
const GAS_COST_QUERY_RESPONSE_MULTIPLIER: u64 = 100;

/// DelegationResponse is data format returned from StakingRequest::Delegation query
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct DelegationResponse {
    pub delegation: Option<FullDelegation>,
}

/// Answers wasm queries on behalf of the contracts the harness does not run.
/// Receives the query and the gas limit of the calling query.
pub type WasmHandler = Rc<dyn Fn(&WasmQuery, u64) -> QuerierResult>;

/// A wasm handler that fails every query as unsupported.
pub fn no_wasm_handler() -> WasmHandler {
    Rc::new(|_: &WasmQuery, _: u64| {
        SystemResult::Err(SystemError::UnsupportedRequest {
            kind: "wasm".to_string(),
        })
    })
}

/// Answers smart queries to known contracts with fixed responses.
pub fn canned_wasm_handler(responses: HashMap<String, Binary>) -> WasmHandler {
    Rc::new(move |query: &WasmQuery, _: u64| match query {
        WasmQuery::Smart { contract_addr, .. } => match responses.get(contract_addr.as_str()) {
            Some(response) => SystemResult::Ok(ContractResult::Ok(response.clone())),
            None => SystemResult::Err(SystemError::NoSuchContract {
                addr: contract_addr.clone(),
            }),
        },
        _ => SystemResult::Err(SystemError::UnsupportedRequest {
            kind: "wasm".to_string(),
        }),
    })
}

/// DefaultQuerier answers bank and staking queries from fixed tables.
#[derive(Clone, Default)]
pub struct DefaultQuerier {
    bank: BankQuerier,
    staking: StakingQuerier,
}

impl DefaultQuerier {
    /// Binds the balances of the contract under test.
    pub fn new(contract_addr: &str, coins: &[Coin]) -> Self {
        DefaultQuerier {
            bank: BankQuerier::new(&[(contract_addr, coins)]),
            staking: StakingQuerier::default(),
        }
    }

    pub fn with_balances(balances: &[(&str, &[Coin])]) -> Self {
        DefaultQuerier {
            bank: BankQuerier::new(balances),
            staking: StakingQuerier::default(),
        }
    }

    // set a new balance for the given address and return the old balance
    pub fn update_balance<U: Into<String>>(
        &mut self,
        addr: U,
        balance: Vec<Coin>,
    ) -> Option<Vec<Coin>> {
        self.bank.balances.insert(addr.into(), balance)
    }

    pub fn with_staking(mut self, staking: StakingQuerier) -> Self {
        self.staking = staking;
        self
    }

    pub fn handle_query(&self, request: &QueryRequest<Empty>) -> HarnessResult<QuerierResult> {
        match request {
            QueryRequest::Bank(bank_query) => self.bank.query(bank_query),
            QueryRequest::Staking(staking_query) => self.staking.query(staking_query),
            QueryRequest::Wasm(_) => Err(HarnessError::UnsupportedQuery {
                kind: "wasm".to_string(),
            }),
            QueryRequest::Custom(_) => Err(HarnessError::UnsupportedQuery {
                kind: "custom".to_string(),
            }),
            #[allow(unreachable_patterns)]
            _ => Err(HarnessError::UnsupportedQuery {
                kind: "unknown".to_string(),
            }),
        }
    }
}

#[derive(Clone, Default)]
pub struct BankQuerier {
    balances: HashMap<String, Vec<Coin>>,
}

impl BankQuerier {
    pub fn new(balances: &[(&str, &[Coin])]) -> Self {
        let mut map = HashMap::new();
        for (addr, coins) in balances.iter() {
            map.insert(addr.to_string(), coins.to_vec());
        }
        BankQuerier { balances: map }
    }

    pub fn query(&self, request: &BankQuery) -> HarnessResult<QuerierResult> {
        let contract_result: ContractResult<Binary> = match request {
            BankQuery::Balance { address, denom } => {
                // zero of the requested denom when nothing is configured
                let amount = self
                    .balances
                    .get(address.as_str())
                    .and_then(|v| v.iter().find(|c| &c.denom == denom).map(|c| c.amount))
                    .unwrap_or_default();
                let bank_res = BalanceResponse {
                    amount: Coin {
                        amount,
                        denom: denom.to_string(),
                    },
                };
                to_binary(&bank_res).into()
            }
            BankQuery::AllBalances { address } => {
                let bank_res = AllBalanceResponse {
                    amount: self
                        .balances
                        .get(address.as_str())
                        .cloned()
                        .unwrap_or_default(),
                };
                to_binary(&bank_res).into()
            }
            #[allow(unreachable_patterns)]
            _ => {
                return Err(HarnessError::UnsupportedQuery {
                    kind: "bank".to_string(),
                })
            }
        };
        // system result is always ok in the mock implementation
        Ok(SystemResult::Ok(contract_result))
    }
}

#[derive(Clone, Default)]
pub struct StakingQuerier {
    denom: String,
    validators: Vec<Validator>,
    delegations: Vec<FullDelegation>,
}

impl StakingQuerier {
    pub fn new(denom: &str, validators: &[Validator], delegations: &[FullDelegation]) -> Self {
        StakingQuerier {
            denom: denom.to_string(),
            validators: validators.to_vec(),
            delegations: delegations.to_vec(),
        }
    }

    pub fn query(&self, request: &StakingQuery) -> HarnessResult<QuerierResult> {
        let contract_result: ContractResult<Binary> = match request {
            StakingQuery::BondedDenom {} => {
                let res = BondedDenomResponse {
                    denom: self.denom.clone(),
                };
                to_binary(&res).into()
            }
            StakingQuery::Validators {} => {
                let res = ValidatorsResponse {
                    validators: self.validators.clone(),
                };
                to_binary(&res).into()
            }
            StakingQuery::AllDelegations { delegator } => {
                let delegations: Vec<_> = self
                    .delegations
                    .iter()
                    .filter(|d| &d.delegator == delegator)
                    .cloned()
                    .map(|d| d.into())
                    .collect();
                let res = AllDelegationsResponse { delegations };
                to_binary(&res).into()
            }
            StakingQuery::Delegation {
                delegator,
                validator,
            } => {
                let delegation = self
                    .delegations
                    .iter()
                    .find(|d| &d.delegator == delegator && &d.validator == validator);
                let res = DelegationResponse {
                    delegation: delegation.cloned(),
                };
                to_binary(&res).into()
            }
            #[allow(unreachable_patterns)]
            _ => {
                return Err(HarnessError::UnsupportedQuery {
                    kind: "staking".to_string(),
                })
            }
        };
        // system result is always ok in the mock implementation
        Ok(SystemResult::Ok(contract_result))
    }
}

/// RoutingQuerier sends wasm queries to a caller supplied handler and
/// everything else to a [`DefaultQuerier`].
///
/// Both branches are charged with the same price and counted in
/// `gas_consumed`. Clones copy the default handler's tables and share the gas
/// counters.
#[derive(Clone)]
pub struct RoutingQuerier {
    default: DefaultQuerier,
    wasm_handler: WasmHandler,
    default_gas: Rc<Cell<u64>>,
    wasm_gas: Rc<Cell<u64>>,
}

impl RoutingQuerier {
    pub fn new(contract_addr: &str, coins: &[Coin], wasm_handler: WasmHandler) -> Self {
        RoutingQuerier::with_default(DefaultQuerier::new(contract_addr, coins), wasm_handler)
    }

    pub fn with_default(default: DefaultQuerier, wasm_handler: WasmHandler) -> Self {
        RoutingQuerier {
            default,
            wasm_handler,
            default_gas: Rc::new(Cell::new(0)),
            wasm_gas: Rc::new(Cell::new(0)),
        }
    }

    pub fn default_querier_mut(&mut self) -> &mut DefaultQuerier {
        &mut self.default
    }

    /// Total gas of all queries answered so far, both branches.
    pub fn gas_consumed(&self) -> u64 {
        self.default_gas.get().saturating_add(self.wasm_gas.get())
    }

    /// Gas of the queries that went to the wasm handler.
    pub fn wasm_gas_consumed(&self) -> u64 {
        self.wasm_gas.get()
    }

    pub fn query(&self, request: &QueryRequest<Empty>, gas_limit: u64) -> HarnessResult<QuerierResult> {
        let (response, counter) = match request {
            QueryRequest::Wasm(wasm_query) => {
                debug!(target: "contract_vm::querier", "wasm query routed to handler");
                ((self.wasm_handler)(wasm_query, gas_limit), &self.wasm_gas)
            }
            other => (self.default.handle_query(other)?, &self.default_gas),
        };

        let gas_used = query_cost(&response)?;
        counter.set(counter.get().saturating_add(gas_used));
        trace!(target: "contract_vm::querier", "query used {} gas of {}", gas_used, gas_limit);

        // In a production implementation, this should stop the query execution in the middle of the computation.
        // Thus no query response is returned to the caller.
        if gas_used > gas_limit {
            return Err(HarnessError::out_of_gas("query", gas_used, gas_limit));
        }
        Ok(response)
    }
}

// requests are free, only the flat fee and the response size count
fn query_cost(response: &QuerierResult) -> HarnessResult<u64> {
    let response_len = to_binary(response)?.len() as u64;
    Ok(GAS_COST_QUERY_FLAT.saturating_add(
        GAS_COST_QUERY_RESPONSE_MULTIPLIER.saturating_mul(response_len),
    ))
}

impl Querier for RoutingQuerier {
    fn query_raw(
        &self,
        bin_request: &[u8],
        gas_limit: u64,
    ) -> BackendResult<SystemResult<ContractResult<Binary>>> {
        let request: QueryRequest<Empty> = match from_slice(bin_request) {
            Ok(v) => v,
            Err(e) => {
                self.default_gas
                    .set(self.default_gas.get().saturating_add(GAS_COST_QUERY_FLAT));
                return (
                    Ok(SystemResult::Err(SystemError::InvalidRequest {
                        error: format!("Parsing query request: {}", e),
                        request: bin_request.into(),
                    })),
                    GasInfo::with_externally_used(GAS_COST_QUERY_FLAT),
                )
            }
        };

        let before = self.gas_consumed();
        let result = self.query(&request, gas_limit);
        let gas_info = GasInfo::with_externally_used(self.gas_consumed() - before);
        match result {
            Ok(response) => (Ok(response), gas_info),
            Err(HarnessError::UnsupportedQuery { kind }) => (
                Ok(SystemResult::Err(SystemError::UnsupportedRequest { kind })),
                gas_info,
            ),
            Err(err @ HarnessError::OutOfGas { .. }) => (Err(err.into()), gas_info),
            Err(err) => (Err(BackendError::unknown(err.to_string())), gas_info),
        }
    }
}
