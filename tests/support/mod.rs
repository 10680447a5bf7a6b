//! A scripted ContractVm that behaves like a small cw20 token with a
//! whitelist group. It talks to storage, the address translator and the
//! querier exactly like a compiled contract would through its host imports.

#![allow(dead_code)]

use std::cell::Cell;
use std::collections::HashSet;

use cosmwasm_std::{
    attr, to_binary, to_vec, Binary, ContractResult, Empty, Env, HandleResponse, HumanAddr,
    InitResponse, MessageInfo, QueryRequest, SystemResult, Uint128, WasmQuery,
};
use cosmwasm_vm::Api;
use serde::{Deserialize, Serialize};

use cosmwasm_harness::contract_vm::api::AddressTranslator;
use cosmwasm_harness::contract_vm::engine::{
    finish_call, CallContext, CallReport, Checksum, ContractVm, UFraction,
};
use cosmwasm_harness::{HarnessError, HarnessResult};

pub const TOKEN_CODE: &[u8] = b"\0asm\x01\0\0\0trusted-token";

const TOKEN_INFO_KEY: &[u8] = b"token_info";
const BALANCE_PREFIX: &[u8] = b"balance/";
const ALLOWANCE_PREFIX: &[u8] = b"allowance/";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Cw20Coin {
    pub address: HumanAddr,
    pub amount: Uint128,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct InitMsg {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub initial_balances: Vec<Cw20Coin>,
    pub whitelist_group: Option<HumanAddr>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum HandleMsg {
    IncreaseAllowance {
        spender: HumanAddr,
        amount: Uint128,
    },
    Transfer {
        recipient: HumanAddr,
        amount: Uint128,
    },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum QueryMsg {
    Balance { address: HumanAddr },
    Allowance { owner: HumanAddr, spender: HumanAddr },
    TokenInfo {},
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TokenInfo {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: Uint128,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MembersResponse {
    pub members: Vec<HumanAddr>,
}

#[derive(Default)]
pub struct TokenVm {
    codes: HashSet<Checksum>,
}

// contract level failures, reported through ContractResult::Err
type ContractOutcome<T> = HarnessResult<Result<T, String>>;

impl TokenVm {
    fn check_code(&self, checksum: &Checksum) -> HarnessResult<()> {
        if self.codes.contains(checksum) {
            Ok(())
        } else {
            Err(HarnessError::ChecksumNotFound(checksum.to_hex()))
        }
    }

    fn init<A: Api>(host: &Host<A>, msg: &[u8], gas_limit: u64) -> ContractOutcome<InitResponse> {
        let ctx = host.ctx;
        let msg: InitMsg = match serde_json::from_slice(msg) {
            Ok(msg) => msg,
            Err(e) => return Ok(Err(format!("Error parsing InitMsg: {}", e))),
        };

        if let Some(group) = &msg.whitelist_group {
            let request: QueryRequest<Empty> = QueryRequest::Wasm(WasmQuery::Smart {
                contract_addr: group.clone(),
                msg: to_binary(&serde_json::json!({ "list_members": {} }))?,
            });
            match ctx.querier.query(&request, gas_limit)? {
                SystemResult::Ok(ContractResult::Ok(bin)) => {
                    if serde_json::from_slice::<MembersResponse>(bin.as_slice()).is_err() {
                        return Ok(Err("Invalid whitelist group response".to_string()));
                    }
                }
                other => return Ok(Err(format!("Whitelist group query failed: {:?}", other))),
            }
        }

        let mut total_supply: u128 = 0;
        for coin in msg.initial_balances.iter() {
            let key = host.balance_key(&coin.address)?;
            ctx.storage.set(&key, &to_vec(&coin.amount)?)?;
            total_supply = match total_supply.checked_add(coin.amount.0) {
                Some(total) => total,
                None => return Ok(Err("Overflow".to_string())),
            };
        }
        let info = TokenInfo {
            name: msg.name,
            symbol: msg.symbol,
            decimals: msg.decimals,
            total_supply: Uint128(total_supply),
        };
        ctx.storage.set(TOKEN_INFO_KEY, &to_vec(&info)?)?;

        Ok(Ok(InitResponse {
            messages: vec![],
            attributes: vec![
                attr("action", "instantiate"),
                attr("total_supply", total_supply),
            ],
        }))
    }

    fn handle<A: Api>(
        host: &Host<A>,
        info: &MessageInfo,
        msg: &[u8],
    ) -> ContractOutcome<HandleResponse> {
        let ctx = host.ctx;
        let msg: HandleMsg = match serde_json::from_slice(msg) {
            Ok(msg) => msg,
            Err(e) => return Ok(Err(format!("Error parsing HandleMsg: {}", e))),
        };

        match msg {
            HandleMsg::IncreaseAllowance { spender, amount } => {
                if spender == info.sender {
                    return Ok(Err("Cannot set allowance to own account".to_string()));
                }
                let key = host.allowance_key(&info.sender, &spender)?;
                let current = host.load_amount(&key)?;
                let allowance = match current.checked_add(amount.0) {
                    Some(allowance) => allowance,
                    None => return Ok(Err("Overflow".to_string())),
                };
                ctx.storage.set(&key, &to_vec(&Uint128(allowance))?)?;

                Ok(Ok(HandleResponse {
                    messages: vec![],
                    attributes: vec![
                        attr("action", "increase_allowance"),
                        attr("owner", &info.sender),
                        attr("spender", spender),
                        attr("amount", amount),
                    ],
                    data: None,
                }))
            }
            HandleMsg::Transfer { recipient, amount } => {
                let from = host.balance_key(&info.sender)?;
                let to = host.balance_key(&recipient)?;
                let balance = host.load_amount(&from)?;
                if balance < amount.0 {
                    return Ok(Err("Insufficient funds".to_string()));
                }
                ctx.storage.set(&from, &to_vec(&Uint128(balance - amount.0))?)?;
                let received = host.load_amount(&to)?.saturating_add(amount.0);
                ctx.storage.set(&to, &to_vec(&Uint128(received))?)?;

                Ok(Ok(HandleResponse {
                    messages: vec![],
                    attributes: vec![attr("action", "transfer"), attr("amount", amount)],
                    data: None,
                }))
            }
        }
    }

    fn answer<A: Api>(host: &Host<A>, msg: &[u8]) -> ContractOutcome<Binary> {
        let ctx = host.ctx;
        let msg: QueryMsg = match serde_json::from_slice(msg) {
            Ok(msg) => msg,
            Err(e) => return Ok(Err(format!("Error parsing QueryMsg: {}", e))),
        };
        let bin = match msg {
            QueryMsg::Balance { address } => {
                let balance = host.load_amount(&host.balance_key(&address)?)?;
                to_binary(&serde_json::json!({ "balance": Uint128(balance) }))?
            }
            QueryMsg::Allowance { owner, spender } => {
                let allowance = host.load_amount(&host.allowance_key(&owner, &spender)?)?;
                to_binary(&serde_json::json!({ "allowance": Uint128(allowance) }))?
            }
            QueryMsg::TokenInfo {} => match ctx.storage.get(TOKEN_INFO_KEY)? {
                Some(raw) => Binary::from(raw),
                None => return Ok(Err("TokenInfo not found".to_string())),
            },
        };
        Ok(Ok(bin))
    }
}

/// What the scripted contract can reach during one call. Address
/// translation is billed to the call like a VM import would be, not to the
/// shared meter.
struct Host<'a, A: Api> {
    ctx: &'a CallContext<A>,
    api_gas: Cell<u64>,
}

impl<'a, A: Api> Host<'a, A> {
    fn new(ctx: &'a CallContext<A>) -> Self {
        Host {
            ctx,
            api_gas: Cell::new(0),
        }
    }

    fn canonical(&self, human: &HumanAddr) -> HarnessResult<Vec<u8>> {
        let (canonical, cost) = self.ctx.api.to_canonical(human.as_str());
        self.api_gas.set(self.api_gas.get().saturating_add(cost));
        canonical
    }

    fn balance_key(&self, owner: &HumanAddr) -> HarnessResult<Vec<u8>> {
        let mut key = BALANCE_PREFIX.to_vec();
        key.extend(self.canonical(owner)?);
        Ok(key)
    }

    fn allowance_key(&self, owner: &HumanAddr, spender: &HumanAddr) -> HarnessResult<Vec<u8>> {
        let mut key = ALLOWANCE_PREFIX.to_vec();
        key.extend(self.canonical(owner)?);
        key.push(b'/');
        key.extend(self.canonical(spender)?);
        Ok(key)
    }

    fn load_amount(&self, key: &[u8]) -> HarnessResult<u128> {
        match self.ctx.storage.get(key)? {
            Some(raw) => Ok(serde_json::from_slice::<Uint128>(&raw)?.0),
            None => Ok(0),
        }
    }

    /// Store gas taken from the meter since `before`, plus translation gas.
    fn vm_gas(&self, before: u64) -> u64 {
        (self.ctx.gas_meter.consumed() - before).saturating_add(self.api_gas.get())
    }
}

fn into_contract_result<T>(outcome: Result<T, String>) -> ContractResult<T> {
    match outcome {
        Ok(value) => ContractResult::Ok(value),
        Err(err) => ContractResult::Err(err),
    }
}

impl ContractVm for TokenVm {
    fn create(&mut self, wasm: &[u8]) -> HarnessResult<Checksum> {
        let checksum = Checksum::generate(wasm);
        self.codes.insert(checksum);
        Ok(checksum)
    }

    fn instantiate<A: Api + 'static>(
        &mut self,
        checksum: &Checksum,
        _env: &Env,
        _info: &MessageInfo,
        msg: &[u8],
        ctx: &CallContext<A>,
        gas_limit: u64,
        deserialization_cost: UFraction,
    ) -> HarnessResult<CallReport<InitResponse<Empty>>> {
        self.check_code(checksum)?;
        let host = Host::new(ctx);
        let before = ctx.gas_meter.consumed();
        let result = into_contract_result(TokenVm::init(&host, msg, gas_limit)?);
        let vm_gas = host.vm_gas(before);
        finish_call(result, vm_gas, gas_limit, deserialization_cost, &ctx.gas_meter)
    }

    fn execute<A: Api + 'static>(
        &mut self,
        checksum: &Checksum,
        _env: &Env,
        info: &MessageInfo,
        msg: &[u8],
        ctx: &CallContext<A>,
        gas_limit: u64,
        deserialization_cost: UFraction,
    ) -> HarnessResult<CallReport<HandleResponse<Empty>>> {
        self.check_code(checksum)?;
        let host = Host::new(ctx);
        let before = ctx.gas_meter.consumed();
        let result = into_contract_result(TokenVm::handle(&host, info, msg)?);
        let vm_gas = host.vm_gas(before);
        finish_call(result, vm_gas, gas_limit, deserialization_cost, &ctx.gas_meter)
    }

    fn query<A: Api + 'static>(
        &mut self,
        checksum: &Checksum,
        _env: &Env,
        msg: &[u8],
        ctx: &CallContext<A>,
        gas_limit: u64,
        deserialization_cost: UFraction,
    ) -> HarnessResult<CallReport<Binary>> {
        self.check_code(checksum)?;
        let host = Host::new(ctx);
        let before = ctx.gas_meter.consumed();
        let result = into_contract_result(TokenVm::answer(&host, msg)?);
        let vm_gas = host.vm_gas(before);
        finish_call(result, vm_gas, gas_limit, deserialization_cost, &ctx.gas_meter)
    }
}
