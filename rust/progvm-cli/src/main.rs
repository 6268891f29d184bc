//! progvm CLI — load, inspect, and run progs images.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::json;

use progvm_vm::Vm;

#[derive(Parser)]
#[command(name = "progvm", version, about = "Progs image VM")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load an image and dump its tables
    Dump {
        /// Path to the progs image
        file: PathBuf,

        /// Emit JSON instead of CSV sections
        #[arg(long)]
        json: bool,
    },
    /// Load an image and run one function
    Run {
        /// Path to the progs image
        file: PathBuf,

        /// Function name (default: main)
        #[arg(long, default_value = "main")]
        function: String,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Dump { file, json } => dump(&file, json),
        Commands::Run { file, function } => run(&file, &function),
    }
}

fn load(file: &Path) -> Option<Vm> {
    match Vm::from_file(file) {
        Ok(vm) => Some(vm),
        Err(err) => {
            eprintln!("could not load {}: {err}", file.display());
            None
        }
    }
}

fn dump(file: &Path, as_json: bool) -> ExitCode {
    let Some(vm) = load(file) else {
        return ExitCode::FAILURE;
    };
    if !as_json {
        let mut stdout = std::io::stdout().lock();
        if let Err(err) = vm.dump(&mut stdout) {
            eprintln!("dump failed: {err}");
            return ExitCode::FAILURE;
        }
        return ExitCode::SUCCESS;
    }

    let image = vm.image();
    let globals: Vec<_> = image
        .global_defs
        .iter()
        .map(|def| {
            json!({
                "name": image.name_lossy(def.def.name_offset),
                "type": def.def.def_type().name(),
                "offset": def.def.offset,
                "system": def.system,
                "local": def.local,
            })
        })
        .collect();
    let fields: Vec<_> = image
        .field_defs
        .iter()
        .map(|def| {
            json!({
                "name": image.name_lossy(def.name_offset),
                "type": def.def_type().name(),
                "offset": def.offset,
            })
        })
        .collect();
    let functions: Vec<_> = image
        .functions
        .iter()
        .map(|func| {
            json!({
                "name": image.name_lossy(func.name_offset),
                "file": image.name_lossy(func.file_name_offset),
                "first_statement": func.first_statement,
                "locals_offset": func.locals_offset,
                "locals_count": func.locals_count,
                "parameters": func.parameter_count,
            })
        })
        .collect();
    let statements: Vec<_> = image
        .statements
        .iter()
        .map(|st| json!([st.op.name(), st.a, st.b, st.c]))
        .collect();
    let doc = json!({
        "crc": vm.crc(),
        "entity_size": image.entity_size,
        "globals": globals,
        "fields": fields,
        "functions": functions,
        "statements": statements,
    });
    match serde_json::to_string_pretty(&doc) {
        Ok(text) => {
            println!("{text}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("dump failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(file: &Path, function: &str) -> ExitCode {
    let Some(mut vm) = load(file) else {
        return ExitCode::FAILURE;
    };
    let func = vm.function(function);
    if !func.is_valid() {
        eprintln!("no function named {function}");
        return ExitCode::FAILURE;
    }
    match vm.run(func) {
        Ok(()) => {
            let ret = vm.return_float().get(&vm);
            println!("{function} returned {ret}");
            vm.clear_temp_strings();
            ExitCode::SUCCESS
        }
        Err(kind) => {
            eprintln!("{function} failed: {kind}");
            eprint!("{}", vm.error_messages());
            ExitCode::FAILURE
        }
    }
}
