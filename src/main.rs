use std::io::{self, BufRead, Write};

use littledb::node::{leaf, COMMON_NODE_HEADER_SIZE};
use littledb::row::ROW_SIZE;
use littledb::statement;
use littledb::{DbError, Table};

enum MetaCmdResult {
    Exit,
    Success,
    Unrecognized,
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let Some(path) = args.get(1) else {
        eprintln!("Usage: littledb DATABASE_FILE");
        std::process::exit(1);
    };

    let mut table = match Table::open(path) {
        Ok(table) => table,
        Err(e) => {
            eprintln!("Error: unable to open database \"{path}\": {e}");
            std::process::exit(1);
        }
    };

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let is_tty = stdin_is_tty();

    loop {
        if is_tty {
            print!("db > ");
            let _ = io::stdout().flush();
        }

        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => break, // EOF behaves like .exit
            Ok(_) => {}
            Err(e) => {
                eprintln!("Error reading input: {e}");
                break;
            }
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if input.starts_with('.') {
            match do_meta_command(input, &mut table) {
                MetaCmdResult::Exit => break,
                MetaCmdResult::Success => {}
                MetaCmdResult::Unrecognized => {
                    println!("Unrecognized command '{input}'.");
                }
            }
            continue;
        }

        let statement = match statement::prepare(input) {
            Ok(statement) => statement,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };

        match statement::execute(statement, &mut table) {
            Ok(rows) => {
                for row in &rows {
                    println!("({}, {}, {})", row.id, row.username, row.email);
                }
                println!("Executed.");
            }
            Err(DbError::DuplicateKey) => println!("Error: Duplicate key."),
            Err(e) => {
                // Structural and I/O failures are fatal to the session.
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
    }
}

fn do_meta_command(input: &str, table: &mut Table) -> MetaCmdResult {
    match input {
        ".exit" => MetaCmdResult::Exit,
        ".constants" => {
            print_constants();
            MetaCmdResult::Success
        }
        ".btree" => {
            println!("Tree:");
            match table.format_tree() {
                Ok(tree) => print!("{tree}"),
                Err(e) => {
                    eprintln!("Error: {e}");
                    std::process::exit(1);
                }
            }
            MetaCmdResult::Success
        }
        _ => MetaCmdResult::Unrecognized,
    }
}

fn print_constants() {
    println!("ROW_SIZE: {ROW_SIZE}");
    println!("COMMON_NODE_HEADER_SIZE: {COMMON_NODE_HEADER_SIZE}");
    println!("LEAF_NODE_HEADER_SIZE: {}", leaf::HEADER_SIZE);
    println!("LEAF_NODE_CELL_SIZE: {}", leaf::CELL_SIZE);
    println!("LEAF_NODE_SPACE_FOR_CELLS: {}", leaf::SPACE_FOR_CELLS);
    println!("LEAF_NODE_MAX_CELLS: {}", leaf::MAX_CELLS);
}

/// Whether stdin is a terminal; piped scripts get no prompt.
fn stdin_is_tty() -> bool {
    #[cfg(unix)]
    {
        extern "C" {
            fn isatty(fd: i32) -> i32;
        }
        unsafe { isatty(0) != 0 }
    }
    #[cfg(not(unix))]
    {
        true
    }
}
