use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::env;
use std::fs;
use std::process;
use std::thread;
use sublisp::builtinops::{ArithOp, Builtin};
use sublisp::{Session, SessionConfig, clean_source, render};

/// Stack for the interpreter thread. Sized for `CLI_EVAL_DEPTH`.
const CLI_STACK_SIZE: usize = 256 * 1024 * 1024;

/// Evaluation depth allowed at the prompt and in scripts
const CLI_EVAL_DEPTH: usize = 16_384;

fn main() {
    env_logger::init();

    let script = env::args().nth(1);
    let handle = match thread::Builder::new()
        .name("interpreter".into())
        .stack_size(CLI_STACK_SIZE)
        .spawn(move || run(script))
    {
        Ok(handle) => handle,
        Err(err) => {
            eprintln!("Error: could not start interpreter thread: {err}");
            process::exit(1);
        }
    };

    match handle.join() {
        Ok(0) => {}
        Ok(code) => process::exit(code),
        Err(_) => process::exit(101),
    }
}

/// Session lifetime: optional script, then the prompt. Returns the exit code.
fn run(script: Option<String>) -> i32 {
    let mut session = Session::with_config(SessionConfig {
        max_eval_depth: CLI_EVAL_DEPTH,
    });

    if let Some(path) = script {
        load_script(&mut session, &path);
    }

    match run_repl(&mut session) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("Error: {err}");
            1
        }
    }
}

/// Run a script file in the session and print its result
fn load_script(session: &mut Session, path: &str) {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            log::debug!("reading {path} failed: {err}");
            println!("Could not read file: {path}");
            return;
        }
    };

    match session.load_program(&source) {
        Ok(result) => println!("{}", render(&result)),
        Err(err) => println!("Error: {err}"),
    }
}

fn run_repl(session: &mut Session) -> Result<(), ReadlineError> {
    println!("Sublisp S-expression interpreter");
    println!("Type :help for commands, or exit to quit.");
    println!();

    let mut rl = DefaultEditor::new()?;

    loop {
        match rl.readline(">>> ") {
            Ok(line) => {
                let line = clean_source(&line);
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                match line {
                    "exit" => break,
                    ":help" => {
                        print_help();
                        continue;
                    }
                    ":env" => {
                        print_functions(session);
                        continue;
                    }
                    _ => {}
                }

                match session.eval_str(line) {
                    Ok(result) => println!("{}", render(&result)),
                    Err(err) => println!("Error: {err}"),
                }
            }
            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => break,
            Err(err) => return Err(err),
        }
    }

    Ok(())
}

fn print_help() {
    println!("Commands:");
    println!("  :help  - Show this help message");
    println!("  :env   - List user-defined functions");
    println!("  exit   - Leave the interpreter (also Ctrl+D / Ctrl+C)");
    println!();
    println!("Everything is an atom or a list. Lists whose head names a");
    println!("function are calls; any other list is data.");
    println!();

    let builtins: Vec<&str> = Builtin::ALL.iter().map(|b| b.name()).collect();
    let operators: Vec<&str> = ArithOp::ALL.iter().map(|op| op.symbol()).collect();
    println!("Builtins:  {}", builtins.join(" "));
    println!("Operators: {}", operators.join(" "));
    println!();
    println!("Examples:");
    println!("  (+ 1 2 3)");
    println!("  (cons (quote a) (quote (b c)))");
    println!("  (defun double (x) (+ x x))");
    println!("  ((lambda (x) (* x x)) 7)");
}

fn print_functions(session: &Session) {
    let names = session.user_functions();
    if names.is_empty() {
        println!("No user-defined functions.");
        return;
    }

    println!("User-defined functions ({}):", names.len());
    for name in names {
        println!("  {name}");
    }
}
