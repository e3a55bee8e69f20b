//! LaneScript Run - compiles or evaluates a script description
//!
//! `compile` prints the disassembly and label table of a JSON script
//! description. `eval` lowers it and runs the single-lane reference
//! evaluator, printing every variable afterwards.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use lanescript_ast::{Diagnostics, FunctionRegistry, Script};
use lanescript_compiler::{compile, lower, CompilerOptions};
use lanescript_lower::{Evaluator, Memory};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "lanescript-run")]
#[command(about = "Compile or evaluate a LaneScript script description")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile to bytecode and print the listing
    Compile {
        /// Path to a JSON script description
        script: PathBuf,

        /// JSON file with compiler options
        #[arg(long)]
        options: Option<PathBuf>,

        /// Emit statements on one thread
        #[arg(long)]
        serial: bool,

        /// Keep nops left behind by label placement
        #[arg(long)]
        keep_nops: bool,
    },

    /// Lower and run the reference evaluator
    Eval {
        /// Path to a JSON script description
        script: PathBuf,

        /// JSON file with compiler options
        #[arg(long)]
        options: Option<PathBuf>,

        /// Initial variable value, as `name=value` (repeatable)
        #[arg(long = "set", value_name = "NAME=VALUE")]
        inputs: Vec<String>,

        /// Step budget for the evaluator
        #[arg(long, default_value = "1000000")]
        max_steps: usize,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lanescript_run=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Compile {
            script,
            options,
            serial,
            keep_nops,
        } => run_compile(&script, options.as_deref(), serial, keep_nops),
        Command::Eval {
            script,
            options,
            inputs,
            max_steps,
        } => run_eval(&script, options.as_deref(), &inputs, max_steps),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn load_options(path: Option<&Path>) -> Result<CompilerOptions> {
    let Some(path) = path else {
        return Ok(CompilerOptions::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read options {}", path.display()))?;
    CompilerOptions::from_json(&text)
        .with_context(|| format!("invalid options in {}", path.display()))
}

fn load_script(path: &Path) -> Result<Script> {
    info!("Loading script from: {}", path.display());
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read script {}", path.display()))?;
    Script::from_json(&text).with_context(|| format!("invalid script {}", path.display()))
}

fn report(diagnostics: &Diagnostics) {
    for diagnostic in diagnostics.iter() {
        warn!("{}", diagnostic);
    }
}

fn run_compile(path: &Path, options: Option<&Path>, serial: bool, keep_nops: bool) -> Result<()> {
    let mut options = load_options(options)?;
    if serial {
        options.emit.parallel = false;
    }
    if keep_nops {
        options.strip_nops = false;
    }
    let script = load_script(path)?;
    let registry = FunctionRegistry::with_builtins();

    let compiled = match compile(script, &registry, &options) {
        Ok(compiled) => compiled,
        Err(failure) => {
            report(&failure.diagnostics);
            bail!("compilation failed: {}", failure.error);
        }
    };
    report(&compiled.diagnostics);

    println!("; {} byte(s), {} variable(s)", compiled.code.len(), compiled.variables().len());
    print!("{}", compiled.disassemble());

    if !compiled.labels.is_empty() {
        println!();
        println!("; labels");
        for record in &compiled.labels {
            println!("{:04}  {:<7} {}", record.index, record.kind.name(), record.id);
        }
    }

    println!();
    println!("; variables");
    for variable in compiled.variables().iter() {
        match variable.value {
            Some(value) => println!("var{:<4} {} = {}", variable.id.0, variable.name, value),
            None => println!("var{:<4} {} : {}", variable.id.0, variable.name, variable.vector_size),
        }
    }
    Ok(())
}

fn run_eval(path: &Path, options: Option<&Path>, inputs: &[String], max_steps: usize) -> Result<()> {
    let options = load_options(options)?;
    let mut script = load_script(path)?;
    let registry = FunctionRegistry::with_builtins();
    let mut diagnostics = Diagnostics::new();

    if let Err(e) = lower(&mut script, &registry, &options, &mut diagnostics) {
        report(&diagnostics);
        bail!("lowering failed: {}", e);
    }
    report(&diagnostics);

    let mut memory = Memory::new(&script.variables);
    for input in inputs {
        let (name, value) = input
            .split_once('=')
            .with_context(|| format!("expected NAME=VALUE, got `{input}`"))?;
        let value: f32 = value
            .trim()
            .parse()
            .with_context(|| format!("`{value}` is not a number"))?;
        let Some(variable) = script.variables.by_name(name.trim()) else {
            bail!("script has no variable `{}`", name.trim());
        };
        memory.set(variable.id, [value; 4]);
    }

    Evaluator::new(&script.ast, &script.variables)
        .with_max_steps(max_steps)
        .run(&mut memory)
        .context("evaluation failed")?;

    for variable in script.variables.iter().filter(|v| !v.is_constant) {
        let value = memory.get(variable.id);
        let width = usize::from(variable.vector_size.clamp(1, 4));
        let shown: Vec<String> = value[..width].iter().map(f32::to_string).collect();
        println!("{} = {}", variable.name, shown.join(", "));
    }
    Ok(())
}
