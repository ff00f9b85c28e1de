use std::error::Error;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use clap_num::maybe_hex;
use itertools::Itertools;
use log::info;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use rv64emu::elf_load::load_executable;
use rv64emu::exec::{Control, ExecOptions, ExecutionError, Observer, RunOutcome};
use rv64emu::machine::Machine;
use rv64emu::registers::X_REGISTERS;
use rv64emu::signature::write_signature;

/// Emulate a 64-bit RISC-V machine (RV64GC)
#[derive(Parser, Debug)]
#[command(author, version, about, long_about, disable_version_flag = true)]
struct Args {
    /// Print version
    #[arg(
        short = 'v',
        long = "version",
        action = clap::ArgAction::Version,
        value_parser = clap::value_parser!(bool)
    )]
    version: Option<bool>,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Run a user-mode program with host system-call translation
    User {
        /// Path to input executable file
        input: PathBuf,
    },
    /// Emulate a full machine from reset
    System {
        /// Path to input executable file
        input: PathBuf,

        /// Size of the flat memory in MiB
        #[arg(short, long, default_value_t = 4096)]
        memory: u64,

        /// Number of harts
        #[arg(long, default_value_t = 1)]
        harts: usize,

        /// Drop into the interactive REPL after loading
        #[arg(short, long)]
        interactive: bool,

        /// Compliance mode: run until the program writes tohost,
        /// then dump the signature region to this file
        #[arg(long, value_name = "PATH")]
        riscof: Option<PathBuf>,

        /// Stop when the program counter reaches this address (use
        /// 0x prefix for hexadecimal)
        #[arg(short = 'b', long, value_parser = maybe_hex::<u64>)]
        break_at: Option<u64>,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match dispatch(args.mode) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("ERROR: {error}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch(mode: Mode) -> Result<(), Box<dyn Error>> {
    match mode {
        Mode::User { .. } => Err("user mode (host system-call translation) is not implemented".into()),
        Mode::System {
            input,
            memory,
            harts,
            interactive,
            riscof,
            break_at,
        } => system(&input, memory, harts, interactive, riscof, break_at),
    }
}

fn system(
    input: &Path,
    memory_mib: u64,
    harts: usize,
    interactive: bool,
    riscof: Option<PathBuf>,
    break_at: Option<u64>,
) -> Result<(), Box<dyn Error>> {
    if harts != 1 {
        return Err(format!("multi-hart execution is not implemented (requested {harts})").into());
    }
    if interactive && riscof.is_some() {
        return Err("--interactive cannot be combined with --riscof".into());
    }

    let executable = load_executable(input, riscof.is_some())?;
    let memory_bytes = memory_mib
        .checked_mul(1024 * 1024)
        .ok_or("memory size out of range")?;
    let mut machine = Machine::new(executable, memory_bytes, harts)?;

    if interactive {
        return repl(&mut machine, break_at);
    }

    let options = ExecOptions::default();
    match machine.run(0, break_at, &mut Observer::Silent, &options) {
        Ok(RunOutcome::Halted) => {
            info!("halted on tohost write after {} cycles", machine.hart(0).cycle);
            if let Some(path) = riscof {
                dump_signature(&machine, &path)?;
            }
            Ok(())
        }
        Ok(RunOutcome::Breakpoint { addr }) => {
            println!("stopped at breakpoint 0x{addr:x}");
            dump_hart(&machine);
            Ok(())
        }
        Err(ExecutionError::Breakpoint { pc }) => {
            println!("hit ebreak at 0x{pc:x}");
            dump_hart(&machine);
            Ok(())
        }
        Err(error) => Err(error.into()),
    }
}

fn dump_signature(machine: &Machine, path: &Path) -> Result<(), Box<dyn Error>> {
    let symbols = machine
        .executable()
        .symbols
        .ok_or("no compliance symbols were loaded")?;
    let mut file = File::create(path)?;
    write_signature(
        machine.memory(),
        symbols.begin_signature,
        symbols.end_signature,
        &mut file,
    )?;
    info!(
        "wrote signature [0x{:x}, 0x{:x}) to {}",
        symbols.begin_signature,
        symbols.end_signature,
        path.display()
    );
    Ok(())
}

const HELP: &str = "\
commands:
  help, h, ?        print this help (also on empty input)
  run               run silently to breakpoint or halt
  output run, orun  run with trace output
  step, n           execute one instruction silently
  output step, ostep, s
                    execute one instruction with trace output
  whatif            trace the next instruction without executing it
  break [hex-addr]  set the breakpoint; with no argument, clear it
  dump              print hart state
  reset             hard-reset the machine
  q, quit           exit";

/// The file rustyline history persists to, under the per-binary
/// cache directory
fn history_file() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".cache")))?;
    Some(base.join("riscv").join("history"))
}

fn dump_hart(machine: &Machine) {
    let hart = machine.hart(0);
    println!(
        "hart {}: pc 0x{:016x}, cycle {}, {} mode, {} translation",
        hart.hart_id(),
        hart.pc,
        hart.cycle,
        hart.privilege_level,
        hart.translation_mode.name()
    );
    for row in &X_REGISTERS.iter().chunks(4) {
        let line = row
            .map(|register| format!("{:>4} 0x{:016x}", register.name(), hart.x(*register)))
            .join("  ");
        println!("{line}");
    }
}

fn report(result: Result<Control, ExecutionError>) {
    match result {
        Ok(Control::Continue) => {}
        Ok(Control::Halt) => println!("halted on tohost write"),
        Err(ExecutionError::Breakpoint { pc }) => println!("hit ebreak at 0x{pc:x}"),
        Err(error) => println!("execution error: {error}"),
    }
}

fn repl(machine: &mut Machine, initial_break: Option<u64>) -> Result<(), Box<dyn Error>> {
    let mut editor = DefaultEditor::new()?;
    let history = history_file();
    if let Some(path) = &history {
        // A missing history file is normal on first run
        let _ = editor.load_history(path);
    }

    let mut breakpoint = initial_break;
    let silent = ExecOptions::default();
    let traced = ExecOptions {
        always_print_pc: true,
        ..Default::default()
    };

    loop {
        let line = match editor.readline("riscv> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(error) => return Err(error.into()),
        };
        if !line.trim().is_empty() {
            let _ = editor.add_history_entry(line.as_str());
        }
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            [] | ["help"] | ["h"] | ["?"] => println!("{HELP}"),
            ["run"] => run_command(machine, breakpoint, &mut Observer::Silent, &silent),
            ["output", "run"] | ["orun"] => {
                let mut stdout = io::stdout();
                run_command(machine, breakpoint, &mut Observer::Trace(&mut stdout), &traced)
            }
            ["step"] | ["n"] => {
                report(machine.step(0, &mut Observer::Silent, &silent));
            }
            ["output", "step"] | ["ostep"] | ["s"] => {
                let mut stdout = io::stdout();
                let result = machine.step(0, &mut Observer::Trace(&mut stdout), &traced);
                report(result);
            }
            ["whatif"] => {
                let mut stdout = io::stdout();
                match machine.whatif(0, &mut Observer::Trace(&mut stdout), &traced) {
                    Ok(()) => {}
                    Err(error) => println!("execution error: {error}"),
                }
            }
            ["break"] => {
                breakpoint = None;
                println!("breakpoint cleared");
            }
            ["break", addr] => {
                let digits = addr.trim_start_matches("0x");
                match u64::from_str_radix(digits, 16) {
                    Ok(addr) => {
                        breakpoint = Some(addr);
                        println!("breakpoint set at 0x{addr:x}");
                    }
                    Err(error) => println!("bad hex address: {error}"),
                }
            }
            ["dump"] => dump_hart(machine),
            ["reset"] => match machine.reset(true) {
                Ok(()) => println!("machine reset"),
                Err(error) => println!("reset failed: {error}"),
            },
            ["q"] | ["quit"] => break,
            _ => println!("unknown command, try help"),
        }
    }

    if let Some(path) = &history {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        // History is a convenience; losing it is not an error
        let _ = editor.save_history(path);
    }
    Ok(())
}

fn run_command(
    machine: &mut Machine,
    breakpoint: Option<u64>,
    observer: &mut Observer,
    options: &ExecOptions,
) {
    match machine.run(0, breakpoint, observer, options) {
        Ok(RunOutcome::Halted) => println!("halted on tohost write"),
        Ok(RunOutcome::Breakpoint { addr }) => println!("stopped at breakpoint 0x{addr:x}"),
        Err(ExecutionError::Breakpoint { pc }) => println!("hit ebreak at 0x{pc:x}"),
        Err(error) => println!("execution error: {error}"),
    }
    let _ = io::stdout().flush();
}
