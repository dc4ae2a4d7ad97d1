//! LC-3 Mini - CLI Entry Point
//!
//! Commands:
//! - `lc3-mini run <program>` - Run a machine-code or `.asm` file
//! - `lc3-mini debug <program>` - Interactive debugger
//! - `lc3-mini asm <source>` - Assemble to machine code
//! - `lc3-mini disasm <program>` - Disassemble machine code
//! - `lc3-mini dump <program>` - Print the loaded machine state
//! - `lc3-mini test` - Built-in self-test

use clap::{Parser, Subcommand};
use lc3mini::{BitVector, Computer, ConsoleSink, DumpFormat, RunConfig};
use lc3mini::dump::{render, Snapshot};

#[derive(Parser)]
#[command(name = "lc3-mini")]
#[command(author = "Yigit")]
#[command(version = "0.1.0")]
#[command(about = "A teaching simulator for a seven-instruction subset of the LC-3")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program until it halts
    Run {
        /// Path to the machine-code or ASM file to execute
        program: String,
        /// Stop after this many instructions
        #[arg(short, long)]
        max_cycles: Option<u64>,
        /// Log every executed instruction to stderr
        #[arg(short, long)]
        trace: bool,
        /// JSON run configuration
        #[arg(short, long)]
        config: Option<String>,
        /// Print machine state when the run ends
        #[arg(short, long, value_enum)]
        dump: Option<DumpFormat>,
    },
    /// Interactive debugger
    Debug {
        /// Path to the machine-code or ASM file to debug
        program: String,
    },
    /// Assemble source to machine code
    Asm {
        /// Path to the source file
        source: String,
        /// Output file (printed to stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Disassemble machine code to readable text
    Disasm {
        /// Path to the machine-code file
        program: String,
    },
    /// Load a program and print the machine state without running it
    Dump {
        /// Path to the machine-code or ASM file
        program: String,
        /// Print a JSON snapshot instead of bit strings
        #[arg(long)]
        json: bool,
    },
    /// Run the built-in self-test
    Test,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run { program, max_cycles, trace, config, dump }) => {
            run_program(&program, max_cycles, trace, config.as_deref(), dump);
        }
        Some(Commands::Debug { program }) => {
            init_logging(false);
            debug_program(&program);
        }
        Some(Commands::Asm { source, output }) => {
            init_logging(false);
            assemble_file(&source, output);
        }
        Some(Commands::Disasm { program }) => {
            init_logging(false);
            disassemble_file(&program);
        }
        Some(Commands::Dump { program, json }) => {
            init_logging(false);
            dump_program(&program, json);
        }
        Some(Commands::Test) => {
            init_logging(false);
            run_self_test();
        }
        None => {
            println!("LC-3 Mini v0.1.0");
            println!("A seven-instruction LC-3 subset simulator");
            println!();
            println!("Use --help for available commands");
        }
    }
}

/// Install the stderr log subscriber. `RUST_LOG` wins unless tracing was requested.
fn init_logging(trace: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if trace {
        EnvFilter::new("lc3mini=trace")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("❌ {}", message);
    std::process::exit(1);
}

/// Load program words from an `.asm` source or a machine-code file.
fn load_words(path: &str) -> Vec<BitVector> {
    let words = if path.ends_with(".asm") {
        let source = std::fs::read_to_string(path)
            .unwrap_or_else(|e| fail(format!("Failed to read file: {}", e)));
        lc3mini::assemble(&source)
            .unwrap_or_else(|e| fail(format!("Assembly error: {}", e)))
    } else {
        lc3mini::load_program_file(path)
            .unwrap_or_else(|e| fail(format!("Failed to load program: {}", e)))
            .words
    };

    if words.is_empty() {
        fail("No instructions to execute");
    }
    words
}

fn load_computer(path: &str) -> Computer {
    let words = load_words(path);
    let mut cpu = Computer::new();
    if let Err(e) = cpu.load_program(&words) {
        fail(format!("Failed to load program: {}", e));
    }
    cpu
}

fn print_dump(cpu: &Computer, format: DumpFormat) {
    match format {
        DumpFormat::None => {}
        DumpFormat::Text => print!("{}", render(cpu)),
        DumpFormat::Json => match Snapshot::capture(cpu).to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => fail(format!("Failed to serialize state: {}", e)),
        },
    }
}

fn run_program(path: &str, max_cycles: Option<u64>, trace: bool, config: Option<&str>, dump: Option<DumpFormat>) {
    let config = match config {
        Some(config_path) => RunConfig::load(config_path).unwrap_or_else(|e| fail(e)),
        None => RunConfig::default(),
    }
    .with_overrides(max_cycles, trace, dump);

    init_logging(config.trace);

    let mut cpu = load_computer(path);
    let mut sink = ConsoleSink::stdout();

    let result = match config.max_cycles {
        Some(limit) => cpu.run_limited(limit, &mut sink),
        None => cpu.execute(&mut sink),
    };
    println!();

    match result {
        Ok(cycles) => {
            eprintln!("{:?} after {} cycles", cpu.state(), cycles);
            if cpu.is_running() {
                eprintln!("⚠️  Reached max cycles limit. Use --max-cycles to increase.");
            }
            print_dump(&cpu, config.dump);
        }
        Err(e) => {
            print_dump(&cpu, config.dump);
            fail(format!("CPU error after {} cycles: {}", cpu.cycles(), e));
        }
    }
}

#[cfg(feature = "tui")]
fn debug_program(path: &str) {
    let words = load_words(path);

    if let Err(e) = lc3mini::run_debugger(words) {
        fail(format!("Debugger error: {}", e));
    }
}

#[cfg(not(feature = "tui"))]
fn debug_program(_path: &str) {
    fail("This build has no debugger; rebuild with the `tui` feature");
}

fn assemble_file(source_path: &str, output: Option<String>) {
    use lc3mini::asm::{format_program, save_program_file, ProgramFile};

    let source = std::fs::read_to_string(source_path)
        .unwrap_or_else(|e| fail(format!("Failed to read file: {}", e)));

    let words = lc3mini::assemble(&source)
        .unwrap_or_else(|e| fail(format!("Assembly error: {}", e)));
    let program = ProgramFile::from_words(&words);

    match output {
        Some(out_path) => {
            if let Err(e) = save_program_file(&out_path, &program) {
                fail(format!("Failed to save program: {}", e));
            }
            eprintln!("✓ Assembled {} words to {}", words.len(), out_path);
        }
        None => print!("{}", format_program(&program)),
    }
}

fn disassemble_file(path: &str) {
    let program = lc3mini::load_program_file(path)
        .unwrap_or_else(|e| fail(format!("Failed to load program: {}", e)));

    print!("{}", lc3mini::disassemble(&program.words));
}

fn dump_program(path: &str, json: bool) {
    let cpu = load_computer(path);
    print_dump(&cpu, if json { DumpFormat::Json } else { DumpFormat::Text });
}

fn run_self_test() {
    type Check = fn(&Computer, &str) -> bool;

    let cases: [(&str, &[&str], Check); 6] = [
        (
            "ADD register-register",
            &["0001000010000010", "1111000000100101"],
            |cpu, _| cpu.registers()[0].signed() == 4 && cpu.cc().to_string() == "001",
        ),
        (
            "ADD negative immediate",
            &["0001 000 010 1 11101", "1111 0000 00100101"],
            |cpu, _| cpu.registers()[0].signed() == -1 && cpu.cc().to_string() == "100",
        ),
        (
            "NOT sets CC from result",
            &["1001100101111111", "1111000000100101"],
            |cpu, _| cpu.registers()[4].signed() == -6 && cpu.cc().to_string() == "100",
        ),
        (
            "AND with immediate",
            &["0001 001 001 1 00110", "0101 001 001 1 11101", "1111 0000 00100101"],
            |cpu, _| cpu.registers()[1].signed() == 5,
        ),
        (
            "ST to memory",
            &["0001 001 001 1 00111", "0011 001 000000010", "1111 0000 00100101"],
            |cpu, _| cpu.memory()[4].signed() == 8,
        ),
        (
            "LD + TRAP OUT",
            &["0010 000 000000010", "1111 0000 00100001", "1111 0000 00100101", "0000 0000 0100 0001"],
            |cpu, out| out == "A" && cpu.is_halted() && cpu.cycles() == 3,
        ),
    ];

    println!("━━━ LC-3 Mini Self-Test ━━━");
    println!();

    let mut passed = 0;
    let mut failed = 0;

    for (name, program, check) in cases {
        print!("{}... ", name);
        let mut cpu = Computer::new();
        let mut out = String::new();
        let ok = cpu.load_machine_code(program).is_ok()
            && cpu.execute(&mut out).is_ok()
            && check(&cpu, &out);
        if ok { println!("✓"); passed += 1; }
        else { println!("✗"); failed += 1; }
    }

    print!("Illegal opcode stops execution... ");
    let mut cpu = Computer::new();
    let ok = cpu.load_machine_code(&["0100000000000000", "0001001001100001"]).is_ok()
        && cpu.execute(&mut String::new()).is_err()
        && cpu.registers()[1].signed() == 1;
    if ok { println!("✓"); passed += 1; }
    else { println!("✗"); failed += 1; }

    println!();
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Results: {} passed, {} failed", passed, failed);

    if failed == 0 {
        println!("✓ All tests passed!");
    } else {
        std::process::exit(1);
    }
}
