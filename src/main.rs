use std::cell::RefCell;
use std::io::BufReader;
use std::process::ExitCode;
use std::rc::Rc;

use clap::Parser;

use rill::app::App;
use rill::error::Error;
use rill::stdlib;

#[derive(Debug, Parser)]
#[command(name = "rill", about = "An exact-rational scripting language")]
struct Cli {
    /// Source file to run; reads stdin interactively when omitted
    file: Option<String>,
}

fn main() -> ExitCode {
    let args = Cli::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        // Script-level failures are reported, not escalated: the program
        // itself misbehaved, not the interpreter.
        Err(err) if err.is_handled() => {
            eprintln!("{}", err);
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Cli) -> Result<(), Error> {
    let app = App::new();
    stdlib::register(&app);
    app.run_in_default_scope("import \"std\"")?;

    match &args.file {
        Some(file) => {
            app.load_file(file)?;
        }
        None => {
            let stderr = Rc::new(RefCell::new(std::io::stderr()));
            app.load_interactive(BufReader::new(std::io::stdin()), stderr)?;
        }
    }
    Ok(())
}
