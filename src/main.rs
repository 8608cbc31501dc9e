// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Proteus - runs ESTree-shaped JSON programs on the proteus engine.
//!
//! The program is read from a JSON file holding a `Program` node. Three
//! hooks are always available to it:
//!
//! - `$print(...)` writes its arguments to stdout, separated by spaces
//! - `$assert(cond, message?)` stops the run when `cond` is falsy
//! - `$assert_eq(actual, expected)` stops the run unless both are strictly equal

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, bail};
use clap::Parser;
use owo_colors::OwoColorize;
use proteus_engine::ast::SyntaxTree;
use proteus_engine::{Engine, Error, Heap, Hooks, ObjId, Vm, VmConfig, compile};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Proteus - a reference-counted bytecode VM for JavaScript syntax trees
#[derive(Parser, Debug)]
#[command(name = "proteus")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Compile and run an ESTree JSON program", long_about = None)]
struct Cli {
    /// JSON file holding the `Program` node
    tree: PathBuf,

    /// Print the compiled bytecode instead of running it
    #[arg(long)]
    dump: bool,

    /// Log compiler and VM activity
    #[arg(short, long)]
    verbose: bool,

    /// JSON file with VM limits (stack_size, max_call_depth, max_traps, property_buckets)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the value stack size
    #[arg(long, value_name = "SLOTS")]
    stack_size: Option<usize>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins over `--verbose`.
fn init_logging(verbose: bool) {
    let default = if verbose {
        "proteus=debug,proteus_engine=debug"
    } else {
        "proteus=warn,proteus_engine=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let tree = load_tree(&cli.tree)?;

    if cli.dump {
        let code = compile(&tree).context("compilation failed")?;
        print!("{}", code);
        return Ok(());
    }

    let config = load_config(cli)?;
    debug!(?config, "starting vm");
    let mut engine = Engine::new(config)?;
    let result = engine.eval_tree(&tree, standard_hooks())?;
    info!(result = %result, "program finished");
    Ok(())
}

fn load_tree(path: &Path) -> anyhow::Result<SyntaxTree> {
    if !path.exists() {
        bail!("file not found '{}'", path.display().cyan());
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("could not read '{}'", path.display()))?;
    SyntaxTree::from_json(&text).with_context(|| format!("'{}' is not a program", path.display()))
}

fn load_config(cli: &Cli) -> anyhow::Result<VmConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("could not read '{}'", path.display()))?;
            VmConfig::from_json(&text)
                .with_context(|| format!("invalid configuration in '{}'", path.display()))?
        }
        None => VmConfig::default(),
    };
    if let Some(slots) = cli.stack_size {
        config = config.with_stack_size(slots);
    }
    Ok(config)
}

/// The hooks every program run from the command line can call.
fn standard_hooks() -> Hooks {
    Hooks::new()
        .with("$print", print_hook)
        .with("$assert", assert_hook)
        .with("$assert_eq", assert_eq_hook)
}

fn print_hook(vm: &mut Vm, args: &[ObjId]) -> proteus_engine::Result<ObjId> {
    let line = args
        .iter()
        .map(|arg| vm.render(*arg))
        .collect::<Vec<_>>()
        .join(" ");
    println!("{}", line);
    Ok(Heap::UNDEFINED)
}

fn assert_hook(vm: &mut Vm, args: &[ObjId]) -> proteus_engine::Result<ObjId> {
    let holds = args.first().is_some_and(|arg| vm.value(*arg).to_boolean());
    if holds {
        return Ok(Heap::UNDEFINED);
    }
    let message = match args.get(1) {
        Some(message) => vm.render(*message),
        None => "assertion failed".to_string(),
    };
    Err(Error::hook("assert", message))
}

fn assert_eq_hook(vm: &mut Vm, args: &[ObjId]) -> proteus_engine::Result<ObjId> {
    let operand = |index: usize| args.get(index).copied().unwrap_or(Heap::UNDEFINED);
    let (actual, expected) = (operand(0), operand(1));
    if vm.value(actual) == vm.value(expected) {
        return Ok(Heap::UNDEFINED);
    }
    Err(Error::hook(
        "assert_eq",
        format!(
            "expected {} but got {}",
            vm.render(expected),
            vm.render(actual)
        ),
    ))
}
