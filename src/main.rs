use std::env;
use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use anyhow::{anyhow, Result};
use recstore::{FieldValue, Store};

const HELP: &str = "\
recstore v0.1

The storage manager for a very basic DBMS.

Usage: recstore <option>

Options:
    --help, -h      Prints this message

    --format, -f    Formats the current directory to be an empty DB

    --console, -c   Starts the console, which you can use for DDL and DML operations
";

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None | Some("--help") | Some("-h") => {
            println!("{HELP}");
            ExitCode::SUCCESS
        }
        Some("--format") | Some("-f") => {
            println!("Formatting...");
            match format_store() {
                Ok(()) => {
                    println!("Formatted successfully.");
                    ExitCode::SUCCESS
                }
                Err(err) => {
                    eprintln!("Formatting failed: {err:#}");
                    ExitCode::FAILURE
                }
            }
        }
        Some("--console") | Some("-c") => match console() {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("{err:#}");
                ExitCode::FAILURE
            }
        },
        Some(other) => {
            eprintln!("Unknown option: {other}\n");
            println!("{HELP}");
            ExitCode::FAILURE
        }
    }
}

fn format_store() -> Result<()> {
    let mut store = Store::open(env::current_dir()?)?;
    store.format()?;
    store.close()
}

/// Read-eval-print loop for DDL and DML commands.
fn console() -> Result<()> {
    let mut store = Store::open(env::current_dir()?)?;

    println!("Console mode");
    println!("Type DDL or DML command and press enter.");
    println!();

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF ends the session like `exit`
        }

        match exec_command(&mut store, &line) {
            Ok(true) => {}
            Ok(false) => break,
            Err(err) => {
                println!("Command failed: {err:#}");
                if store.is_disk_full() {
                    println!("The disk is full");
                }
            }
        }
    }

    store.close()
}

/// Execute one command line. `Ok(false)` means the session should end.
fn exec_command(store: &mut Store, line: &str) -> Result<bool> {
    let mut tokens = line.split_whitespace();
    let Some(cmd) = tokens.next() else {
        return Ok(true);
    };

    match cmd {
        "exit" => return Ok(false),
        "format" => {
            store.format()?;
            println!("Formatted successfully.");
        }
        "create_type" => {
            let name = next_arg(&mut tokens, "type name")?;
            let fields: Vec<String> = tokens.map(str::to_string).collect();
            store.create_type(name, &fields)?;
            println!("{} is created!", render(name, &fields));
        }
        "delete_type" => {
            let name = next_arg(&mut tokens, "type name")?;
            store.delete_type(name)?;
            println!("{name} is deleted!");
        }
        "list_types" => {
            for ty in store.list_types()? {
                println!("{}", render(&ty.name, &ty.field_names));
            }
        }
        "create_record" => {
            let name = next_arg(&mut tokens, "type name")?;
            let values = parse_values(tokens)?;
            let pos = store.create_record(name, &values)?;
            println!(
                "{} is created in page #{}:{}",
                render_record(name, &values),
                pos.global,
                pos.local
            );
        }
        "search_record" => {
            let name = next_arg(&mut tokens, "type name")?;
            let key = parse_key(next_arg(&mut tokens, "key")?)?;
            let (record, pos) = store.search_record(name, key)?;
            match record {
                Some(values) => {
                    println!("The record is found in page #{}:{}", pos.global, pos.local);
                    println!("{}", render_record(name, &values));
                }
                None => println!("No such record found"),
            }
        }
        "delete_record" => {
            let name = next_arg(&mut tokens, "type name")?;
            let key = parse_key(next_arg(&mut tokens, "key")?)?;
            let (found, pos) = store.delete_record(name, key)?;
            if found {
                println!(
                    "The record is deleted from page #{}:{}",
                    pos.global, pos.local
                );
            } else {
                println!("No such record found");
            }
        }
        "list_records" => {
            let name = next_arg(&mut tokens, "type name")?;
            for values in store.list_records(name)? {
                println!("{}", render_record(name, &values));
            }
        }
        other => println!("Unknown command: {other}"),
    }

    Ok(true)
}

fn next_arg<'a>(tokens: &mut impl Iterator<Item = &'a str>, what: &str) -> Result<&'a str> {
    tokens.next().ok_or_else(|| anyhow!("missing {what}"))
}

fn parse_key(token: &str) -> Result<FieldValue> {
    token
        .parse()
        .map_err(|_| anyhow!("`{token}` is not an integer key"))
}

fn parse_values<'a>(tokens: impl Iterator<Item = &'a str>) -> Result<Vec<FieldValue>> {
    tokens
        .map(|t| {
            t.parse()
                .map_err(|_| anyhow!("`{t}` is not an integer value"))
        })
        .collect()
}

/// `Name(a, b, c)` rendering shared by types and records.
fn render(name: &str, parts: &[String]) -> String {
    format!("{name}({})", parts.join(", "))
}

fn render_record(name: &str, values: &[FieldValue]) -> String {
    let parts: Vec<String> = values.iter().map(FieldValue::to_string).collect();
    render(name, &parts)
}
