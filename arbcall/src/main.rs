use clap::Parser as ClapParser;
use std::{
    fs,
    io::{self, BufRead, Write},
    process,
};

use arbcall::bridge::describe;
use arbcall::{Bridge, BridgeCreateInfo};

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Script files to execute in order
    #[arg(required = false, help = "The scripts to execute")]
    files: Vec<String>,

    /// Source evaluated after the files
    #[arg(short, long, help = "Evaluate a script given on the command line")]
    eval: Option<String>,

    /// Start REPL after executing files (default if nothing else is given)
    #[arg(long, help = "Force REPL mode after file execution")]
    repl: bool,

    #[arg(long, default_value_t = 128, help = "Maximum value stack depth")]
    stack_size: usize,

    #[arg(long, default_value_t = 1024 * 1024, help = "Largest buffer in bytes")]
    max_buffer_size: usize,

    #[arg(
        long,
        default_value_t = 16 * 1024 * 1024,
        help = "Bytes all buffers may hold together"
    )]
    max_total_buffer_size: usize,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let info = BridgeCreateInfo {
        stack_size: cli.stack_size,
        max_buffer_size: cli.max_buffer_size,
        max_total_buffer_size: cli.max_total_buffer_size,
    };
    // SAFETY: the user running this binary is the one vouching for the
    // scripts, exactly like running native code directly
    let mut bridge = unsafe { Bridge::new(info, io::stdout()) };

    for filename in &cli.files {
        let source = match fs::read_to_string(filename) {
            Ok(content) => content,
            Err(err) => {
                eprintln!("Error reading file '{}': {}", filename, err);
                process::exit(1);
            }
        };
        if let Err(err) = bridge.eval(&source) {
            eprintln!("Error executing {}: {}", filename, err);
            process::exit(1);
        }
    }

    if let Some(source) = &cli.eval {
        if let Err(err) = bridge.eval(source) {
            eprintln!("Error: {}", err);
            process::exit(1);
        }
    }

    if cli.repl || (cli.files.is_empty() && cli.eval.is_none()) {
        run_repl(&mut bridge);
    }
}

fn run_repl<W: Write>(bridge: &mut Bridge<W>) {
    println!("arbcall REPL");
    println!("Type 'exit' to quit.");

    let stdin = io::stdin();
    let mut input_buffer = String::new();

    loop {
        print!("> ");
        if let Err(err) = io::stdout().flush() {
            eprintln!("Error flushing stdout: {}", err);
            break;
        }

        input_buffer.clear();
        match stdin.lock().read_line(&mut input_buffer) {
            Ok(0) => break,
            Ok(_) => {
                let input = input_buffer.trim();
                if input == "exit" {
                    break;
                }
                if input.is_empty() {
                    continue;
                }
                match bridge.eval(input) {
                    Ok(()) => print_stack(bridge),
                    Err(err) => eprintln!("Error: {}", err),
                }
            }
            Err(err) => {
                eprintln!("Error reading input: {}", err);
                break;
            }
        }
    }
}

fn print_stack<W: Write>(bridge: &Bridge<W>) {
    let items: Vec<String> = bridge
        .stack()
        .iter()
        .map(|value| describe(value, bridge.buffers()))
        .collect();
    println!("[ {} ]", items.join(" "));
}
