//! The `rube` command.
//!
//! Every task flag and positional template is queued in the order it appeared
//! on the command line, so `rube -e a x.j2 -e b` evaluates `a`, renders `x.j2`
//! and then evaluates `b`.

use std::ffi::OsString;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::error::ErrorKind;
use clap::{Arg, ArgAction, ArgMatches, Command, CommandFactory, FromArgMatches, Parser};

use crate::error::Error;
use crate::generator::Generator;
use crate::output::Output;
use crate::report::{ExitStatus, report};
use crate::task::{Task, TaskKind};

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "RUBE_LOG";

#[derive(Parser, Debug, Clone)]
#[command(
    name = "rube",
    version,
    disable_version_flag = true,
    about = "Evaluate code and render templates in one shared scope",
    after_help = "With no template arguments the template is read from stdin, unless --explicit is given."
)]
struct Cli {
    /// Render a template read from stdin at this point
    #[arg(
        short = 'i',
        long = "stdin",
        action = ArgAction::Append,
        num_args = 0,
        default_missing_value = "true"
    )]
    stdin: Vec<bool>,

    /// Load a library into the scope
    #[arg(short, long, value_name = "PATH")]
    require: Vec<String>,

    /// Evaluate inline source and print its output
    #[arg(short, long, value_name = "SRC", allow_hyphen_values = true)]
    eval: Vec<String>,

    /// Don't read a template from stdin when no template is given
    #[arg(short = 'E', long, overrides_with = "no_explicit")]
    explicit: bool,

    #[arg(long, overrides_with = "explicit", hide = true)]
    no_explicit: bool,

    /// Limit how much work a template may do (0..4)
    #[arg(short = 'S', long = "safe", value_name = "LEVEL")]
    safe: Option<u8>,

    /// Trim mode for templates: 0, 1, 2 or -
    #[arg(short = 'T', long, value_name = "LEVEL", allow_hyphen_values = true)]
    trim: Option<String>,

    /// Don't treat lines starting with % as code
    #[arg(short = 'P', long, overrides_with = "no_disable_percent")]
    disable_percent: bool,

    #[arg(long, overrides_with = "disable_percent", hide = true)]
    no_disable_percent: bool,

    /// Add a directory to the library search path
    #[arg(short = 'I', long, value_name = "DIR")]
    include: Vec<Utf8PathBuf>,

    /// Write output to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<Utf8PathBuf>,

    /// Log what every task does
    #[arg(short, long)]
    debug: bool,

    /// Templates to render
    #[arg(value_name = "TEMPLATE")]
    templates: Vec<String>,
}

/// A parsed command line: the options plus the tasks in command-line order.
#[derive(Debug, Clone)]
pub struct Invocation {
    cli: Cli,
    tasks: Vec<Task>,
}

impl Invocation {
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn debug(&self) -> bool {
        self.cli.debug
    }

    /// Builds a generator configured from the command line. Option values
    /// clap cannot check (trim and safety levels) are validated here.
    pub fn generator(&self) -> Result<Generator, Error> {
        let mut generator = Generator::new();
        generator
            .set_tasks(self.tasks.clone())
            .set_disable_percent(self.cli.disable_percent)
            .set_safety(self.cli.safe)?;

        if let Some(level) = &self.cli.trim {
            generator.set_trim_level(level)?;
        }

        for dir in &self.cli.include {
            generator.add_library_path(dir.clone());
        }

        if let Some(path) = &self.cli.output {
            generator.set_output(Output::File(path.clone()));
        }

        Ok(generator)
    }
}

/// The clap command, with `-v` in place of clap's `-V` for the version.
fn command() -> Command {
    Cli::command().arg(
        Arg::new("version")
            .short('v')
            .long("version")
            .help("Print version")
            .action(ArgAction::Version),
    )
}

/// Parses `argv` (including the program name) without printing or exiting.
pub fn parse<I, T>(argv: I) -> Result<Invocation, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = command().try_get_matches_from(argv)?;
    let cli = Cli::from_arg_matches(&matches)?;
    let tasks = ordered_tasks(&cli, &matches);

    Ok(Invocation { cli, tasks })
}

fn ordered_tasks(cli: &Cli, matches: &ArgMatches) -> Vec<Task> {
    let mut indexed: Vec<(usize, Task)> = Vec::new();

    let mut queue = |id: &str, kind: TaskKind, values: &[String]| {
        let indices = matches.indices_of(id).into_iter().flatten();
        for (index, value) in indices.zip(values) {
            indexed.push((index, Task::new(kind, value.as_str())));
        }
    };

    queue("require", TaskKind::Require, &cli.require);
    queue("eval", TaskKind::Eval, &cli.eval);
    queue("templates", TaskKind::Template, &cli.templates);

    // Each `-i` carries one value, so each occurrence keeps its own index.
    let stdin = matches.indices_of("stdin").into_iter().flatten();
    for (index, _) in stdin.zip(&cli.stdin) {
        indexed.push((index, Task::stdin()));
    }

    indexed.sort_by_key(|(index, _)| *index);
    let mut tasks: Vec<Task> = indexed.into_iter().map(|(_, task)| task).collect();

    let has_template = tasks.iter().any(|task| task.kind() == TaskKind::Template);
    if !has_template && !cli.explicit {
        tasks.push(Task::stdin());
    }

    tasks
}

#[cfg(feature = "logging")]
fn init_logging(debug: bool) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Runs the command with the process arguments.
pub fn main() -> ExitCode {
    let invocation = match parse(std::env::args_os()) {
        Ok(invocation) => invocation,
        Err(err) => return usage_error(err).into(),
    };

    #[cfg(feature = "logging")]
    init_logging(invocation.debug());

    let mut generator = match invocation.generator() {
        Ok(generator) => generator,
        Err(err) => {
            let status = report(&err);
            eprintln!("\n{}", command().render_help());
            return status.into();
        }
    };

    generator.set_from_command_line(true);
    tracing::debug!(tasks = generator.tasks().len(), "starting");

    match generator.generate() {
        Ok(_) => ExitStatus::Success.into(),
        Err(err) => report(&err).into(),
    }
}

fn usage_status(err: &clap::Error) -> ExitStatus {
    match err.kind() {
        ErrorKind::DisplayHelp => ExitStatus::HelpRequested,
        ErrorKind::DisplayVersion => ExitStatus::Success,
        _ => ExitStatus::BadArgument,
    }
}

fn usage_error(err: clap::Error) -> ExitStatus {
    let status = usage_status(&err);

    // Help and version go to stdout, everything else to stderr.
    let _ = err.print();

    if status == ExitStatus::BadArgument {
        eprintln!("\n{}", command().render_help());
    }

    status
}
