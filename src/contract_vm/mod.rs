use std::collections::HashMap;
use std::fs;

use cosmwasm_std::Binary;
use log::info;

use crate::config::SimulationConfig;
use crate::contract_vm::engine::{Simulation, WasmerVm};
use crate::contract_vm::querier::canned_wasm_handler;
use crate::error::HarnessResult;

pub mod api;
pub mod editor;
pub mod engine;
pub mod gas;
pub mod mock;
pub mod querier;

/// Loads `wasmfile` into a fresh VM and binds it to the context described by `config`.
///
/// Smart queries to other contracts are answered from `config.wasm_responses`.
pub fn build_simulation(wasmfile: &str, config: &SimulationConfig) -> HarnessResult<Simulation> {
    let wasm = fs::read(wasmfile)?;
    info!(target: "contract_vm", "loaded {} ({} bytes)", wasmfile, wasm.len());

    let mut responses = HashMap::new();
    for (addr, response) in config.wasm_responses.iter() {
        responses.insert(addr.clone(), Binary::from(serde_json::to_vec(response)?));
    }

    Simulation::new(
        WasmerVm::from_config(config),
        &wasm,
        wasmfile,
        config,
        canned_wasm_handler(responses),
    )
}
