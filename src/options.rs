//! Options for the compilation pipeline.

use std::fmt;

use clap::{ArgEnum, Args, Parser};

/// Implement [`Display`](std::fmt::Display) with the information in
/// [`clap::ArgEnum`], so default values render consistently in the help
/// text.
macro_rules! arg_enum_display {
    ($t:ty) => {
        impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let value = self
                    .to_possible_value()
                    .expect("no skipped variants")
                    .get_name()
                    .to_string();
                write!(f, "{}", value)
            }
        }
    };
}

/// The discipline used to enumerate legal joint actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ArgEnum)]
pub enum ActionEnumeration {
    /// All assignments within the concurrency bound that pass every
    /// state-independent precondition.
    #[clap(name = "default")]
    Default,
    /// The IPC 2018 rules: grow actions from noop one active fluent at a
    /// time, raising the observed concurrency per round.
    #[clap(name = "ipc2018")]
    Ipc2018,
}
impl Default for ActionEnumeration {
    fn default() -> Self {
        Self::Default
    }
}
arg_enum_display!(ActionEnumeration);

/// The trace level / verbosity for the logging framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ArgEnum)]
pub enum TraceLevel {
    #[clap(name = "off")]
    Off,
    #[clap(name = "error")]
    Error,
    #[clap(name = "warn")]
    Warn,
    #[clap(name = "info")]
    Info,
    #[clap(name = "debug")]
    Debug,
    #[clap(name = "trace")]
    Trace,
}
impl Default for TraceLevel {
    fn default() -> Self {
        Self::Warn
    }
}
arg_enum_display!(TraceLevel);

impl From<TraceLevel> for log::LevelFilter {
    fn from(level: TraceLevel) -> Self {
        match level {
            TraceLevel::Off => Self::Off,
            TraceLevel::Error => Self::Error,
            TraceLevel::Warn => Self::Warn,
            TraceLevel::Info => Self::Info,
            TraceLevel::Debug => Self::Debug,
            TraceLevel::Trace => Self::Trace,
        }
    }
}

/// Command-line interface of the compiler binary. For library use, fill a
/// [`CompileOptions`] directly instead.
#[derive(Debug, Clone, Parser)]
#[clap(version, about)]
pub struct CliOptions {
    /// The domain file.
    pub domain_file: String,
    /// The problem instance file.
    pub problem_file: String,
    /// The directory the compiled task is written to, under the instance
    /// name.
    pub target_dir: String,

    /// Random seed for the task analysis (default: current time).
    #[clap(short = 's', long = "seed")]
    pub seed: Option<u64>,

    /// The trace level to use for the logging framework.
    #[clap(arg_enum, short = 't', long = "trace", default_value_t)]
    pub trace_level: TraceLevel,

    #[clap(flatten)]
    pub compile_options: CompileOptions,
}

/// Options that control the pipeline.
#[derive(Debug, Clone, Args)]
pub struct CompileOptions {
    /// Combine mutex action variables into finite-domain variables.
    #[clap(long = "fdr", parse(try_from_str), default_value = "true")]
    pub fdr_synthesis: bool,

    /// The action enumeration discipline.
    #[clap(arg_enum, long = "actions", default_value_t)]
    pub action_enumeration: ActionEnumeration,

    /// Number of states emitted for the downstream runtime's warm-up.
    #[clap(long = "training-set-size", default_value = "200")]
    pub training_set_size: usize,

    /// Wall-clock budget in seconds for the analysis random walks.
    #[clap(long = "analysis-budget", default_value = "2.0")]
    pub analysis_budget: f64,

    /// Wall-clock budget in seconds for the pairwise mutex queries.
    #[clap(long = "mutex-budget", default_value = "5.0")]
    pub mutex_budget: f64,

    /// Timeout in milliseconds for a single solver query.
    #[clap(long = "solver-timeout", default_value = "1000")]
    pub solver_timeout_ms: u32,

    /// Random seed used by the task analysis; set from `-s` or the clock.
    #[clap(skip)]
    pub seed: u64,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            fdr_synthesis: true,
            action_enumeration: ActionEnumeration::default(),
            training_set_size: 200,
            analysis_budget: 2.0,
            mutex_budget: 5.0,
            solver_timeout_ms: 1000,
            seed: 0,
        }
    }
}

impl CompileOptions {
    pub fn ipc2018_enumeration(&self) -> bool {
        self.action_enumeration == ActionEnumeration::Ipc2018
    }
}

impl From<&CliOptions> for CompileOptions {
    fn from(options: &CliOptions) -> Self {
        options.compile_options.clone()
    }
}
