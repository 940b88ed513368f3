//! pdlc binary crate.

use std::io::{self, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use fs_err as fs;

use pdlc::options::{CliOptions, CompileOptions, TraceLevel};
use pdlc::output::write_task;

fn main() {
    if let Err(error) = pdlc_main() {
        // discard result as we cannot further propagate a write error
        let _ = writeln!(io::stderr(), "Error: {}", error);
        std::process::exit(1);
    }
}

/// Initialize the logging framework with the given trace level.
fn initialize_logging(level: TraceLevel) -> io::Result<()> {
    env_logger::builder()
        .filter(None, level.into())
        .format_timestamp_millis()
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::AlreadyExists, e))
}

/// Parses the options, reads the input files, runs the compilation and
/// writes the result to `<target_dir>/<instance name>`.
fn pdlc_main() -> Result<(), Box<dyn std::error::Error>> {
    let options = CliOptions::parse();
    initialize_logging(options.trace_level)?;

    let domain = fs::read_to_string(&options.domain_file)?;
    let instance = fs::read_to_string(&options.problem_file)?;

    let mut compile_options = CompileOptions::from(&options);
    compile_options.seed = options.seed.unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0)
    });

    let task = pdlc::compile_with(&domain, &instance, &compile_options)?;

    let target = Path::new(&options.target_dir).join(&task.instance_name);
    let mut file = fs::File::create(target)?;
    write_task(&task, &mut file)?;
    Ok(())
}
