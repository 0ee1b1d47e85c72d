//! rigkit CLI - build rigs from script files and inspect the result.

use std::env;
use std::path::Path;
use std::process;

use rigkit::rig::Rig;
use rigkit::script::RigScript;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

fn main() {
    let args: Vec<String> = env::args().collect();

    // Parse global flags
    let mut level = "info";
    let mut filtered_args: Vec<&str> = Vec::new();
    for arg in &args[1..] {
        match arg.as_str() {
            "-v" | "--verbose" => level = "debug",
            "-vv" | "--trace" => level = "trace",
            "-q" | "--quiet" => level = "error",
            _ => filtered_args.push(arg),
        }
    }
    init_tracing(level);

    if filtered_args.is_empty() {
        print_help();
        return;
    }

    match filtered_args[0] {
        // Build command - build and summarize
        "build" | "b" => {
            let file = require_file(&filtered_args, "build");
            cmd_build(file);
        }

        // Tree command - build and print the node hierarchy
        "tree" | "t" => {
            let file = require_file(&filtered_args, "tree");
            cmd_tree(file);
        }

        // Check command - parse only
        "check" | "c" => {
            let file = require_file(&filtered_args, "check");
            cmd_check(file);
        }

        "help" | "h" | "-h" | "--help" => print_help(),

        other => {
            eprintln!("Error: unknown command '{}'", other);
            print_help();
            process::exit(1);
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr));
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Warning: could not install log subscriber");
    }
}

fn require_file<'a>(args: &[&'a str], cmd: &str) -> &'a str {
    match args.get(1) {
        Some(f) => f,
        None => {
            eprintln!("Error: missing script argument");
            eprintln!("Usage: rigkit {} <script.json>", cmd);
            process::exit(1);
        }
    }
}

fn load(file: &str) -> RigScript {
    match RigScript::load(Path::new(file)) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading {}: {}", file, e);
            process::exit(1);
        }
    }
}

fn build(file: &str) -> Rig {
    let script = load(file);
    match script.build_rig() {
        Ok(rig) => rig,
        Err(e) => {
            eprintln!("Error building {}: {}", file, e);
            process::exit(1);
        }
    }
}

fn cmd_build(file: &str) {
    let rig = build(file);
    println!("Rig: {}", rig);
    println!("Nodes: {}", rig.scene.len());
    println!("Limbs: {}", rig.limbs.len());
    for limb in &rig.limbs {
        println!("  {:<16} {:<14} {} ctrls", limb.to_string(), limb.kind.type_name(), limb.ctrls.len());
    }
    println!("Controls: {}", rig.ctrls().len());
}

fn cmd_tree(file: &str) {
    let rig = build(file);
    print!("{}", rig.scene.format_tree());
}

fn cmd_check(file: &str) {
    let script = load(file);
    println!("{}: {} limbs, {} wires", file, script.limbs.len(), script.wiring.len());
    for spec in &script.limbs {
        let mirror = if spec.mirror { " (mirrored)" } else { "" };
        println!("  {:<16} {}{}", spec.name, spec.kind.type_name(), mirror);
    }
}

fn print_help() {
    println!("rigkit - procedural character rigging");
    println!();
    println!("Usage: rigkit [-v|-vv|-q] <command> <script.json>");
    println!();
    println!("Commands:");
    println!("  build, b   Build the rig and print a summary");
    println!("  tree, t    Build the rig and print the node hierarchy");
    println!("  check, c   Parse the script without building");
    println!();
    println!("Flags:");
    println!("  -v         Debug logging");
    println!("  -vv        Trace logging");
    println!("  -q         Errors only");
    println!();
    println!("RUST_LOG overrides the flags when set.");
}
