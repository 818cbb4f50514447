#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process;

use plsko::data::{
    describe_selection, load_matrix, load_response, write_aggregated, write_matrix,
    write_selection,
};
use plsko::{
    AggregatedResult, Execution, NcompPolicy, NeighborhoodSpec, Offset, RunConfig,
    ScorerRegistry, SelectionResult, TrialProgressObserver, TrialStage, ako_with_w, ko_filter,
    ko_with_w, pls_ako, plsko, plsko_filter,
};

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Knockoff generation options shared by every subcommand that draws knockoffs.
#[derive(Args, Clone)]
struct KnockoffArgs {
    /// TOML run configuration; flags given on the command line override it
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Absolute correlation cutoff for neighborhoods (0 connects every pair)
    #[arg(long, value_name = "R")]
    threshold_abs: Option<f64>,

    /// Number of PLS components: an integer, "auto" or "auto-per-variable"
    #[arg(long, value_name = "K")]
    ncomp: Option<String>,

    /// Fraction of PLS weights shrunk to zero per component, in [0, 1)
    #[arg(long)]
    sparsity: Option<f64>,

    /// Base random seed
    #[arg(long)]
    seed: Option<u64>,
}

/// Knockoff filter options.
#[derive(Args, Clone)]
struct FilterArgs {
    /// Target FDR level
    #[arg(long)]
    q: Option<f64>,

    /// 1 for knockoff+ (finite-sample control), 0 for knockoff
    #[arg(long)]
    offset: Option<String>,

    /// Importance statistic: lasso, lasso.lambdasmax or marginal
    #[arg(long)]
    method: Option<String>,
}

/// Response file options.
#[derive(Args, Clone)]
struct ResponseArgs {
    /// TSV file holding the response
    #[arg(long, value_name = "PATH")]
    response: PathBuf,

    /// Column of the response file to use (defaults to the first column)
    #[arg(long, value_name = "NAME")]
    response_column: Option<String>,
}

#[derive(Parser)]
#[command(
    name = "plsko",
    about = "FDR-controlled variable selection with PLS knockoffs",
    long_about = "Generates neighborhood PLS knockoffs for a design matrix, scores them against \
                  a response and selects variables with the knockoff filter, optionally \
                  aggregating many independent knockoff draws."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate one knockoff matrix
    #[command(about = "Generate a knockoff matrix (outputs: knockoffs.tsv)")]
    Generate {
        /// Design matrix TSV: header of variable names, one row per sample
        #[arg(value_name = "X_PATH")]
        x: PathBuf,

        #[command(flatten)]
        knockoff: KnockoffArgs,

        #[arg(long, default_value = "knockoffs.tsv")]
        out: PathBuf,
    },

    /// Run the knockoff filter once
    #[command(about = "Run the knockoff filter once (outputs: selected.tsv)")]
    Filter {
        #[arg(value_name = "X_PATH")]
        x: PathBuf,

        #[command(flatten)]
        response: ResponseArgs,

        /// Use these knockoffs instead of generating them
        #[arg(long, value_name = "PATH")]
        knockoffs: Option<PathBuf>,

        #[command(flatten)]
        knockoff: KnockoffArgs,

        #[command(flatten)]
        filter: FilterArgs,

        #[arg(long, default_value = "selected.tsv")]
        out: PathBuf,
    },

    /// Aggregate several knockoff draws
    #[command(about = "Aggregate several knockoff draws (outputs: selected.tsv)")]
    Ako {
        #[arg(value_name = "X_PATH")]
        x: PathBuf,

        #[command(flatten)]
        response: ResponseArgs,

        /// Number of knockoff draws
        #[arg(long, value_name = "N")]
        n_ko: Option<usize>,

        /// Run the draws one after another instead of in parallel
        #[arg(long)]
        sequential: bool,

        /// Worker threads for parallel draws
        #[arg(long, value_name = "N")]
        threads: Option<usize>,

        #[command(flatten)]
        knockoff: KnockoffArgs,

        #[command(flatten)]
        filter: FilterArgs,

        #[arg(long, default_value = "selected.tsv")]
        out: PathBuf,
    },

    /// Threshold precomputed statistics
    #[command(about = "Threshold precomputed statistics; several rows are aggregated (outputs: selected.tsv)")]
    Select {
        /// Statistic TSV: header of variable names, one row per trial
        #[arg(value_name = "W_PATH")]
        w: PathBuf,

        #[arg(long)]
        q: Option<f64>,

        #[arg(long)]
        offset: Option<String>,

        #[arg(long, default_value = "selected.tsv")]
        out: PathBuf,
    },

    /// Display version information
    Version,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Generate { x, knockoff, out }) => run_generate(&x, &knockoff, &out),
        Some(Commands::Filter {
            x,
            response,
            knockoffs,
            knockoff,
            filter,
            out,
        }) => run_filter(&x, &response, knockoffs.as_deref(), &knockoff, &filter, &out),
        Some(Commands::Ako {
            x,
            response,
            n_ko,
            sequential,
            threads,
            knockoff,
            filter,
            out,
        }) => {
            let trials = TrialArgs {
                n_ko,
                sequential,
                threads,
            };
            run_ako(&x, &response, &trials, &knockoff, &filter, &out)
        }
        Some(Commands::Select { w, q, offset, out }) => run_select(&w, q, offset.as_deref(), &out),
        Some(Commands::Version) => {
            println!("plsko {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        None => Cli::command().print_help().map_err(Into::into),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

struct TrialArgs {
    n_ko: Option<usize>,
    sequential: bool,
    threads: Option<usize>,
}

fn build_config(knockoff: &KnockoffArgs, filter: Option<&FilterArgs>) -> Result<RunConfig, Box<dyn std::error::Error>> {
    let mut config = match &knockoff.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    if let Some(threshold_abs) = knockoff.threshold_abs {
        config.knockoff.neighborhood = NeighborhoodSpec::CorrelationThreshold {
            threshold_abs: Some(threshold_abs),
        };
    }
    if let Some(ncomp) = &knockoff.ncomp {
        config.knockoff.ncomp = ncomp.parse::<NcompPolicy>()?;
    }
    if let Some(sparsity) = knockoff.sparsity {
        config.knockoff.sparsity = sparsity;
    }
    if let Some(seed) = knockoff.seed {
        config.knockoff.seed = seed;
    }
    if let Some(filter) = filter {
        if let Some(q) = filter.q {
            config.filter.q = q;
        }
        if let Some(offset) = &filter.offset {
            config.filter.offset = offset.parse::<Offset>()?;
        }
        if let Some(method) = &filter.method {
            config.filter.method = method.clone();
        }
    }
    config.validate()?;
    Ok(config)
}

fn run_generate(x_path: &Path, knockoff: &KnockoffArgs, out: &Path) -> CliResult {
    let config = build_config(knockoff, None)?;
    let x = load_matrix(x_path)?;
    let knockoffs = plsko(x.values.view(), &config.knockoff)?;
    let names: Vec<String> = x.names.iter().map(|n| format!("{n}_knockoff")).collect();
    write_matrix(out, &names, knockoffs.view())?;

    println!(
        "Wrote a {}x{} knockoff matrix to {} (seed {}).",
        x.values.nrows(),
        x.values.ncols(),
        out.display(),
        knockoffs.seed()
    );
    for degeneracy in knockoffs.degeneracies() {
        println!(
            "  {}: noise fallback ({})",
            x.names[degeneracy.column], degeneracy.reason
        );
    }
    Ok(())
}

fn run_filter(
    x_path: &Path,
    response: &ResponseArgs,
    knockoffs_path: Option<&Path>,
    knockoff: &KnockoffArgs,
    filter: &FilterArgs,
    out: &Path,
) -> CliResult {
    let config = build_config(knockoff, Some(filter))?;
    let x = load_matrix(x_path)?;
    let y = load_response(&response.response, response.response_column.as_deref())?;
    let registry = ScorerRegistry::default();

    let result = match knockoffs_path {
        Some(path) => {
            let knockoffs = load_matrix(path)?;
            ko_filter(
                x.values.view(),
                knockoffs.values.view(),
                y.view(),
                &config.filter,
                &registry,
            )?
        }
        None => plsko_filter(x.values.view(), y.view(), &config, &registry)?,
    };
    write_selection(out, &x.names, &result)?;
    print_single_summary(&x.names, &result, &config, out);
    Ok(())
}

fn run_ako(
    x_path: &Path,
    response: &ResponseArgs,
    trials: &TrialArgs,
    knockoff: &KnockoffArgs,
    filter: &FilterArgs,
    out: &Path,
) -> CliResult {
    let mut config = build_config(knockoff, Some(filter))?;
    if let Some(n_ko) = trials.n_ko {
        config.ako.n_ko = n_ko;
    }
    if trials.sequential {
        config.ako.execution = Execution::Sequential;
    }
    if trials.threads.is_some() {
        config.ako.threads = trials.threads;
    }
    config.validate()?;

    let x = load_matrix(x_path)?;
    let y = load_response(&response.response, response.response_column.as_deref())?;
    let registry = ScorerRegistry::default();
    let progress = BarProgress::new();
    let result = pls_ako(x.values.view(), y.view(), &config, &registry, &progress)?;
    write_aggregated(out, &x.names, &result)?;
    print_aggregated_summary(&x.names, &result, config.filter.q, out);
    Ok(())
}

fn run_select(w_path: &Path, q: Option<f64>, offset: Option<&str>, out: &Path) -> CliResult {
    let q = q.unwrap_or(plsko::filter::threshold::DEFAULT_FDR_LEVEL);
    let offset = match offset {
        Some(value) => value.parse::<Offset>()?,
        None => Offset::default(),
    };
    let table = load_matrix(w_path)?;
    if table.values.nrows() == 1 {
        let result = ko_with_w(table.values.row(0), q, offset)?;
        write_selection(out, &table.names, &result)?;
        println!(
            "Threshold {} at q = {q}: {} selected ({}). Written to {}.",
            result.threshold(),
            result.selected().len(),
            describe_selection(&table.names, result.selected()),
            out.display()
        );
    } else {
        let rows: Vec<_> = table.values.rows().into_iter().collect();
        let result = ako_with_w(&rows, q, offset)?;
        write_aggregated(out, &table.names, &result)?;
        print_aggregated_summary(&table.names, &result, q, out);
    }
    Ok(())
}

fn print_single_summary(names: &[String], result: &SelectionResult, config: &RunConfig, out: &Path) {
    println!(
        "Knockoff filter (method {}, q = {}, offset {}): threshold {}, {} of {} variables selected.",
        config.filter.method,
        config.filter.q,
        config.filter.offset,
        result.threshold(),
        result.selected().len(),
        names.len()
    );
    println!("Selected: {}", describe_selection(names, result.selected()));
    println!("Written to {}.", out.display());
}

fn print_aggregated_summary(names: &[String], result: &AggregatedResult, q: f64, out: &Path) {
    println!(
        "Aggregated {} trials at q = {q}: {} of {} variables selected.",
        result.n_trials(),
        result.ako_selected().len(),
        names.len()
    );
    println!("Selected: {}", describe_selection(names, result.ako_selected()));
    println!("Written to {}.", out.display());
}

/// Terminal progress bar for aggregated runs; hidden when stderr is not a terminal.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new() -> Self {
        let draw_target = if std::io::stderr().is_terminal() {
            ProgressDrawTarget::stderr_with_hz(20)
        } else {
            ProgressDrawTarget::hidden()
        };
        let bar = ProgressBar::with_draw_target(Some(0), draw_target);
        if let Ok(style) = ProgressStyle::with_template(
            "\n> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        ) {
            bar.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
        }
        Self { bar }
    }
}

impl TrialProgressObserver for BarProgress {
    fn on_start(&self, stage: TrialStage, total_trials: usize) {
        self.bar.set_length(total_trials as u64);
        self.bar.set_message(stage.describe());
    }

    fn on_trial_finish(&self, _trial: usize, _n_selected: usize) {
        self.bar.inc(1);
    }

    fn on_finish(&self, _stage: TrialStage) {
        self.bar.finish_and_clear();
    }
}
