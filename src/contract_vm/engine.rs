use std::collections::HashMap;
use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

use colored::*;
use cosmwasm_std::{
    Attribute, Binary, BlockInfo, ContractInfo, ContractResult, Empty, Env, HandleResponse,
    HumanAddr, InitResponse, MessageInfo,
};
use cosmwasm_vm::{Api, Backend, Instance, InstanceOptions, Size};
use log::debug;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::SimulationConfig;
use crate::contract_vm::api::IdentityApi;
use crate::contract_vm::gas::{MockGasMeter, SharedGasMeter};
use crate::contract_vm::mock::MockStorage;
use crate::contract_vm::querier::{RoutingQuerier, WasmHandler};
use crate::error::{HarnessError, HarnessResult};

const WASM_MAGIC: &[u8] = b"\0asm";

/// Content hash identifying uploaded contract code.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checksum([u8; 32]);

impl Checksum {
    pub fn generate(wasm: &[u8]) -> Self {
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&Sha256::digest(wasm));
        Checksum(hash)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Checksum({})", self.to_hex())
    }
}

/// Gas charged per byte of a contract response, as a fraction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UFraction {
    pub numerator: u64,
    pub denominator: u64,
}

impl UFraction {
    pub const fn new(numerator: u64, denominator: u64) -> Self {
        UFraction {
            numerator,
            denominator,
        }
    }

    /// `floor(value * numerator / denominator)`, saturating at `u64::MAX`.
    pub fn mul_floor(&self, value: u64) -> HarnessResult<u64> {
        if self.denominator == 0 {
            return Err(HarnessError::Config(
                "fraction with zero denominator".to_string(),
            ));
        }
        let product = u128::from(value) * u128::from(self.numerator) / u128::from(self.denominator);
        Ok(u64::try_from(product).unwrap_or(u64::MAX))
    }
}

pub fn mock_env(height: u64, time_nanos: u64, chain_id: &str, contract_addr: &str) -> Env {
    Env {
        block: BlockInfo {
            height,
            time: time_nanos / 1_000_000_000,
            time_nanos: time_nanos % 1_000_000_000,
            chain_id: chain_id.to_string(),
        },
        contract: ContractInfo {
            address: HumanAddr::from(contract_addr),
        },
    }
}

/// The whole outside world of one contract call.
///
/// The gas meter counts host work: store access and response
/// deserialization. Address translation and query costs are reported to the
/// VM next to their results and billed to the call, not to the meter.
///
/// A context belongs to one execution at a time. Its handles are not `Send`,
/// so contexts stay on the thread that created them.
pub struct CallContext<A: Api = IdentityApi> {
    pub storage: MockStorage,
    pub api: A,
    pub querier: RoutingQuerier,
    pub gas_meter: SharedGasMeter,
}

impl<A: Api> CallContext<A> {
    /// Starts from an empty storage metered by `gas_meter`.
    pub fn new(gas_meter: SharedGasMeter, api: A, querier: RoutingQuerier) -> Self {
        CallContext {
            storage: MockStorage::new(gas_meter.clone()),
            api,
            querier,
            gas_meter,
        }
    }

    pub fn backend(&self) -> Backend<A, MockStorage, RoutingQuerier> {
        Backend {
            api: self.api,
            storage: self.storage.clone(),
            querier: self.querier.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CallReport<R> {
    pub response: R,
    /// VM gas plus deserialization gas
    pub gas_used: u64,
}

/// The boundary to a contract VM.
///
/// Contract errors come back as [`HarnessError::Contract`], VM failures as
/// [`HarnessError::Vm`]; neither is retried.
pub trait ContractVm {
    fn create(&mut self, wasm: &[u8]) -> HarnessResult<Checksum>;

    #[allow(clippy::too_many_arguments)]
    fn instantiate<A: Api + 'static>(
        &mut self,
        checksum: &Checksum,
        env: &Env,
        info: &MessageInfo,
        msg: &[u8],
        ctx: &CallContext<A>,
        gas_limit: u64,
        deserialization_cost: UFraction,
    ) -> HarnessResult<CallReport<InitResponse<Empty>>>;

    #[allow(clippy::too_many_arguments)]
    fn execute<A: Api + 'static>(
        &mut self,
        checksum: &Checksum,
        env: &Env,
        info: &MessageInfo,
        msg: &[u8],
        ctx: &CallContext<A>,
        gas_limit: u64,
        deserialization_cost: UFraction,
    ) -> HarnessResult<CallReport<HandleResponse<Empty>>>;

    fn query<A: Api + 'static>(
        &mut self,
        checksum: &Checksum,
        env: &Env,
        msg: &[u8],
        ctx: &CallContext<A>,
        gas_limit: u64,
        deserialization_cost: UFraction,
    ) -> HarnessResult<CallReport<Binary>>;
}

/// Charges the response deserialization and turns the contract result into a report.
///
/// Fails with out-of-gas when VM gas plus deserialization gas exceeds `gas_limit`.
pub fn finish_call<R: Serialize>(
    result: ContractResult<R>,
    vm_gas_used: u64,
    gas_limit: u64,
    deserialization_cost: UFraction,
    gas_meter: &MockGasMeter,
) -> HarnessResult<CallReport<R>> {
    let response_len = serde_json::to_vec(&result)?.len() as u64;
    let deserialization_gas = deserialization_cost.mul_floor(response_len)?;
    let gas_used = vm_gas_used.saturating_add(deserialization_gas);
    if gas_used > gas_limit {
        return Err(HarnessError::out_of_gas(
            "response deserialization",
            deserialization_gas,
            gas_limit.saturating_sub(vm_gas_used),
        ));
    }
    gas_meter.consume(deserialization_gas, "response deserialization")?;

    match result {
        ContractResult::Ok(response) => Ok(CallReport { response, gas_used }),
        ContractResult::Err(err) => Err(HarnessError::Contract(err)),
    }
}

/// ContractVm backed by `cosmwasm_vm`. Every call gets a fresh instance over
/// the call context's storage and querier.
pub struct WasmerVm {
    codes: HashMap<Checksum, Vec<u8>>,
    memory_limit: Size,
    print_debug: bool,
}

impl WasmerVm {
    pub fn new(memory_limit: Size, print_debug: bool) -> Self {
        WasmerVm {
            codes: HashMap::new(),
            memory_limit,
            print_debug,
        }
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        WasmerVm::new(Size::mebi(config.memory_limit_mib), config.print_debug)
    }

    fn instance<A: Api + 'static>(
        &self,
        checksum: &Checksum,
        ctx: &CallContext<A>,
        gas_limit: u64,
    ) -> HarnessResult<Instance<A, MockStorage, RoutingQuerier>> {
        let code = self
            .codes
            .get(checksum)
            .ok_or_else(|| HarnessError::ChecksumNotFound(checksum.to_hex()))?;
        let options = InstanceOptions {
            gas_limit,
            // Memory limit in bytes. Use a value that is divisible by the Wasm page size 65536, e.g. full MiBs.
            memory_limit: self.memory_limit,
            print_debug: self.print_debug,
        };
        Ok(Instance::from_code(code, ctx.backend(), options)?)
    }
}

impl ContractVm for WasmerVm {
    fn create(&mut self, wasm: &[u8]) -> HarnessResult<Checksum> {
        if !wasm.starts_with(WASM_MAGIC) {
            return Err(HarnessError::InvalidWasm(
                "missing wasm magic header".to_string(),
            ));
        }
        let checksum = Checksum::generate(wasm);
        self.codes.entry(checksum).or_insert_with(|| wasm.to_vec());
        debug!(target: "contract_vm::engine", "stored code {} ({} bytes)", checksum, wasm.len());
        Ok(checksum)
    }

    fn instantiate<A: Api + 'static>(
        &mut self,
        checksum: &Checksum,
        env: &Env,
        info: &MessageInfo,
        msg: &[u8],
        ctx: &CallContext<A>,
        gas_limit: u64,
        deserialization_cost: UFraction,
    ) -> HarnessResult<CallReport<InitResponse<Empty>>> {
        debug!(target: "contract_vm::engine", "instantiate {} by {}", checksum, info.sender);
        let mut instance = self.instance(checksum, ctx, gas_limit)?;
        let result = cosmwasm_vm::call_init::<_, _, _, Empty>(&mut instance, env, info, msg);
        ctx.storage.release_iterators();
        let result = result?;
        let vm_gas_used = gas_limit.saturating_sub(instance.get_gas_left());
        finish_call(result, vm_gas_used, gas_limit, deserialization_cost, &ctx.gas_meter)
    }

    fn execute<A: Api + 'static>(
        &mut self,
        checksum: &Checksum,
        env: &Env,
        info: &MessageInfo,
        msg: &[u8],
        ctx: &CallContext<A>,
        gas_limit: u64,
        deserialization_cost: UFraction,
    ) -> HarnessResult<CallReport<HandleResponse<Empty>>> {
        debug!(target: "contract_vm::engine", "execute {} by {}", checksum, info.sender);
        let mut instance = self.instance(checksum, ctx, gas_limit)?;
        let result = cosmwasm_vm::call_handle::<_, _, _, Empty>(&mut instance, env, info, msg);
        ctx.storage.release_iterators();
        let result = result?;
        let vm_gas_used = gas_limit.saturating_sub(instance.get_gas_left());
        finish_call(result, vm_gas_used, gas_limit, deserialization_cost, &ctx.gas_meter)
    }

    fn query<A: Api + 'static>(
        &mut self,
        checksum: &Checksum,
        env: &Env,
        msg: &[u8],
        ctx: &CallContext<A>,
        gas_limit: u64,
        deserialization_cost: UFraction,
    ) -> HarnessResult<CallReport<Binary>> {
        debug!(target: "contract_vm::engine", "query {}", checksum);
        let mut instance = self.instance(checksum, ctx, gas_limit)?;
        let result = cosmwasm_vm::call_query(&mut instance, env, msg);
        ctx.storage.release_iterators();
        let result = result?;
        let vm_gas_used = gas_limit.saturating_sub(instance.get_gas_left());
        finish_call(result, vm_gas_used, gas_limit, deserialization_cost, &ctx.gas_meter)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallKind {
    Init,
    Handle,
    Query,
}

impl CallKind {
    pub const NAMES: [&'static str; 3] = ["init", "handle", "query"];
}

impl FromStr for CallKind {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "init" | "instantiate" => Ok(CallKind::Init),
            "handle" | "execute" => Ok(CallKind::Handle),
            "query" => Ok(CallKind::Query),
            other => Err(HarnessError::UnknownCallKind(other.to_string())),
        }
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            CallKind::Init => "init",
            CallKind::Handle => "handle",
            CallKind::Query => "query",
        };
        f.write_str(name)
    }
}

/// What a call produced, flattened over the three entry points.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CallOutput {
    pub attributes: Vec<Attribute>,
    pub data: Option<Binary>,
    pub gas_used: u64,
}

/// One contract loaded into a VM together with the context it runs against.
pub struct Simulation<V: ContractVm = WasmerVm> {
    pub vm: V,
    pub checksum: Checksum,
    pub ctx: CallContext,
    pub env: Env,
    pub info: MessageInfo,
    pub wasm_file: String,
    gas_limit: u64,
    deserialization_cost: UFraction,
}

impl<V: ContractVm> Simulation<V> {
    pub fn new(
        mut vm: V,
        wasm: &[u8],
        wasm_file: &str,
        config: &SimulationConfig,
        wasm_handler: WasmHandler,
    ) -> HarnessResult<Self> {
        config.validate()?;
        let checksum = vm.create(wasm)?;
        let querier = RoutingQuerier::new(
            &config.contract_addr,
            &config.contract_coins(),
            wasm_handler,
        );
        let ctx = CallContext::new(
            MockGasMeter::shared(config.gas_limit),
            IdentityApi::new(config.address_cost),
            querier,
        );
        Ok(Simulation {
            vm,
            checksum,
            ctx,
            env: config.env(),
            info: config.message_info(),
            wasm_file: wasm_file.to_string(),
            gas_limit: config.gas_limit,
            deserialization_cost: config.deserialization_cost,
        })
    }

    pub fn call(&mut self, kind: CallKind, msg: &str) -> HarnessResult<CallOutput> {
        debug!(target: "contract_vm::engine", "call {} with {}", kind, msg);
        let msg = msg.as_bytes();
        let output = match kind {
            CallKind::Init => {
                let report = self.vm.instantiate(
                    &self.checksum,
                    &self.env,
                    &self.info,
                    msg,
                    &self.ctx,
                    self.gas_limit,
                    self.deserialization_cost,
                )?;
                CallOutput {
                    attributes: report.response.attributes,
                    data: None,
                    gas_used: report.gas_used,
                }
            }
            CallKind::Handle => {
                let report = self.vm.execute(
                    &self.checksum,
                    &self.env,
                    &self.info,
                    msg,
                    &self.ctx,
                    self.gas_limit,
                    self.deserialization_cost,
                )?;
                CallOutput {
                    attributes: report.response.attributes,
                    data: report.response.data,
                    gas_used: report.gas_used,
                }
            }
            CallKind::Query => {
                let report = self.vm.query(
                    &self.checksum,
                    &self.env,
                    msg,
                    &self.ctx,
                    self.gas_limit,
                    self.deserialization_cost,
                )?;
                CallOutput {
                    attributes: vec![],
                    data: Some(report.response),
                    gas_used: report.gas_used,
                }
            }
        };
        Ok(output)
    }

    pub fn show_info(&self) {
        println!("showing contract info for [{}]", self.wasm_file);
        println!("checksum : [{}]", self.checksum.to_string().yellow());
        println!("contract : [{}]", self.env.contract.address.to_string().yellow());
        println!("sender   : [{}]", self.info.sender.to_string().yellow());
        println!("chain id : [{}]", self.env.block.chain_id.yellow());
    }

    pub fn show_storage(&self) {
        let entries = self.ctx.storage.dump();
        println!("storage holds {} entries", entries.len());
        for (key, value) in entries.iter() {
            dump_result(&render(key), value);
        }
    }

    pub fn show_gas(&self) {
        let meter = &self.ctx.gas_meter;
        println!("Gas consumed : {}", meter.consumed().to_string().yellow());
        println!("Gas remaining: {}", meter.remaining().to_string().yellow());
        println!(
            "Query gas    : {}",
            self.ctx.querier.gas_consumed().to_string().yellow()
        );
    }
}

impl CallOutput {
    pub fn print(&self) {
        for attr in &self.attributes {
            dump_result(&attr.key, attr.value.as_bytes());
        }
        if let Some(data) = &self.data {
            dump_result("data", data.as_slice());
        }
        println!("Gas used   : {}", self.gas_used.to_string().yellow());
    }
}

/// Utf-8 text as is, anything else as base64.
fn render(value: &[u8]) -> String {
    match std::str::from_utf8(value) {
        Ok(text) if !text.is_empty() => text.to_string(),
        _ => base64::encode(value),
    }
}

fn dump_result(key: &str, value: &[u8]) {
    println!("{} = {}", key.blue().bold(), render(value).yellow());
}
