extern crate clap;

use std::path::Path;

use clap::{App, Arg, ArgMatches};
use colored::*;
use itertools::Itertools;
use log::{info, LevelFilter};
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

use cosmwasm_harness::contract_vm::{self, editor::TerminalEditor, engine::CallKind};
use cosmwasm_harness::contract_vm::engine::Simulation;
use cosmwasm_harness::{HarnessError, HarnessResult, SimulationConfig};

const REPL_COMMANDS: [&str; 3] = ["storage", "gas", "exit"];

fn init_logger(verbosity: u64) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let cfg = ConfigBuilder::new()
        .add_filter_allow_str("contract_vm")
        .add_filter_allow_str("cosmwasm_harness")
        .build();
    if TermLogger::init(level, cfg, TerminalMode::Mixed, ColorChoice::Auto).is_err() {
        eprintln!("logger already initialized");
    }
}

fn load_config(matches: &ArgMatches) -> HarnessResult<SimulationConfig> {
    let mut config = match matches.value_of("config") {
        Some(path) => SimulationConfig::from_file(path)?,
        None => SimulationConfig::default(),
    };
    if let Some(sender) = matches.value_of("sender") {
        config.sender_addr = sender.to_string();
    }
    if let Some(contract) = matches.value_of("contract") {
        config.contract_addr = contract.to_string();
    }
    if let Some(limit) = matches.value_of("gas-limit") {
        config.gas_limit = limit
            .parse()
            .map_err(|e| HarnessError::Config(format!("gas-limit {}: {}", limit, e)))?;
    }
    config.validate()?;
    Ok(config)
}

fn scripted_calls<'a>(matches: &'a ArgMatches) -> Vec<(CallKind, &'a str)> {
    let mut calls = Vec::new();
    for (flag, kind) in [
        ("init", CallKind::Init),
        ("execute", CallKind::Handle),
        ("query", CallKind::Query),
    ]
    .iter()
    {
        if let Some(values) = matches.values_of(flag) {
            calls.extend(values.map(|msg| (*kind, msg)));
        }
    }
    calls
}

fn run_calls(engine: &mut Simulation, calls: &[(CallKind, &str)]) -> HarnessResult<()> {
    for (kind, msg) in calls {
        println!("***************************call started***************************");
        println!(
            "executing func [{}] , params is {}",
            kind.to_string().green().bold(),
            msg.yellow()
        );
        let output = engine.call(*kind, msg)?;
        output.print();
        println!("***************************call finished***************************");
    }
    Ok(())
}

fn simulate_by_json(engine: &mut Simulation) -> HarnessResult<()> {
    let mut editor = TerminalEditor::new();
    let choices = CallKind::NAMES
        .iter()
        .chain(REPL_COMMANDS.iter())
        .map(|name| name.green().bold().to_string())
        .join(" | ");
    loop {
        println!(
            "Start_simulate with sender address: {}",
            engine.info.sender.to_string().green().bold()
        );
        println!("Input call type ({}):", choices);
        editor.update_history_entries(CallKind::NAMES.iter().chain(REPL_COMMANDS.iter()).copied());

        let call_type = match editor.readline(false)? {
            Some(line) => line,
            None => return Ok(()),
        };
        let kind = match call_type.as_str() {
            "exit" => return Ok(()),
            "storage" => {
                engine.show_storage();
                continue;
            }
            "gas" => {
                engine.show_gas();
                continue;
            }
            other => match other.parse::<CallKind>() {
                Ok(kind) => kind,
                Err(e) => {
                    println!("{}", e);
                    continue;
                }
            },
        };

        println!("Input json string:");
        // update previous history entries
        editor.update_input_history_entry();
        let json_msg = match editor.readline(true)? {
            Some(line) => line,
            None => return Ok(()),
        };

        // contract failures end the call, not the session
        if let Err(e) = run_calls(engine, &[(kind, json_msg.as_str())]) {
            println!("{}", e.to_string().red());
        }
    }
}

fn start_simulate(matches: &ArgMatches) -> HarnessResult<()> {
    let file = matches
        .value_of("run")
        .ok_or_else(|| HarnessError::InvalidWasm("no contract file given".to_string()))?;
    if Path::new(file).extension().map_or(true, |ext| ext != "wasm") {
        return Err(HarnessError::InvalidWasm(format!(
            "only support file[*.wasm], you just input a wrong file format - {:?}",
            file
        )));
    }

    let config = load_config(matches)?;
    let mut engine = contract_vm::build_simulation(file, &config)?;
    info!(target: "cosmwasm_harness", "contract {} ready", engine.checksum);
    if config.print_debug {
        engine.show_info();
    }

    let calls = scripted_calls(matches);
    if calls.is_empty() {
        simulate_by_json(&mut engine)
    } else {
        run_calls(&mut engine, &calls)
    }
}

fn main() {
    let matches = App::new("cosmwasm-harness")
        .version(env!("CARGO_PKG_VERSION"))
        .author("github : https://github.com/oraichain/cosmwasm-simulate.git")
        .about("Runs a cosmwasm contract against mock chain services")
        .arg(
            Arg::with_name("run")
                .help("contract file (*.wasm)")
                .required(true)
                .empty_values(false),
        )
        .arg(
            Arg::with_name("config")
                .long("config")
                .short("c")
                .takes_value(true)
                .help("JSON file with the simulation settings"),
        )
        .arg(
            Arg::with_name("sender")
                .long("sender")
                .takes_value(true)
                .help("Sender Address"),
        )
        .arg(
            Arg::with_name("contract")
                .long("contract")
                .takes_value(true)
                .help("Address of the contract under test"),
        )
        .arg(
            Arg::with_name("gas-limit")
                .long("gas-limit")
                .takes_value(true)
                .help("Gas limit of every call"),
        )
        .arg(
            Arg::with_name("init")
                .long("init")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1)
                .help("Init message, runs before any execute"),
        )
        .arg(
            Arg::with_name("execute")
                .long("execute")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1)
                .help("Execute message, runs in the given order"),
        )
        .arg(
            Arg::with_name("query")
                .long("query")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1)
                .help("Query message, runs after all executes"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("Sets the log level, repeat for more"),
        )
        .get_matches();

    init_logger(matches.occurrences_of("verbose"));

    if let Err(e) = start_simulate(&matches) {
        eprintln!("error occurred during call start_simulate : {}", e.to_string().red());
        std::process::exit(1);
    }
}
