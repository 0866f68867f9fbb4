#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use verdict_ladder::config::LadderConfig;
use verdict_ladder::convergence::{convergence_report, ConvergenceReport};
use verdict_ladder::digest::{records_digest, tallies_digest};
use verdict_ladder::error::LoadError;
use verdict_ladder::judge_quality::{
    agreement_records, estimate_consensus, estimate_proxy, get_judge_weight, judge_reports,
    pruned_judges, JudgeBias, JudgeQualityData, JudgeReport,
};
use verdict_ladder::ledger::{
    extract_pairwise_records, extract_weighted_tallies, tallies_from_records, Verdict,
};
use verdict_ladder::pools::{Pool, SampleIndex};
use verdict_ladder::rating_engine::{self, Rating};
use verdict_ladder::simulation::{simulate, SimulationCase};

#[derive(Parser)]
#[command(name = "ladder", version, about = "Pairwise verdict ratings and judge reliability")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rate one pool from a JSONL verdict log
    Rate {
        #[arg(long)]
        verdicts: PathBuf,
        /// JSON object mapping sample id to its owner
        #[arg(long)]
        samples: PathBuf,
        /// writers, feedback, judges, or category:<name>. The judges pool is
        /// rated from agreement with consensus and ignores --weighted.
        #[arg(long, default_value = "writers")]
        pool: String,
        #[arg(long)]
        config: Option<PathBuf>,
        /// Weight each verdict by its judge's consensus reliability
        #[arg(long)]
        weighted: bool,
    },
    /// Estimate judge reliability weights
    Judges {
        #[arg(long)]
        verdicts: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        /// Ratings (JSON array) to use as a reliability proxy instead of consensus
        #[arg(long)]
        proxy_ratings: Option<PathBuf>,
        /// Per-judge bias annotations (JSON object) to attach to the report
        #[arg(long)]
        biases: Option<PathBuf>,
    },
    /// Run the full pipeline on synthetic verdicts
    Simulate {
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long, default_value_t = 5)]
        writers: usize,
        #[arg(long, default_value_t = 3)]
        judges: usize,
        #[arg(long, default_value_t = 6)]
        prompts: usize,
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct RateOutput {
    pool: String,
    digest: String,
    iterations: usize,
    converged: bool,
    ratings: Vec<Rating>,
    convergence: ConvergenceReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    judges: Option<JudgeQualityData>,
}

#[derive(Serialize)]
struct JudgesOutput {
    quality: JudgeQualityData,
    pruned: Vec<String>,
    reports: Vec<JudgeReport>,
}

#[derive(Serialize)]
struct SimulateOutput {
    case: SimulationCase,
    verdict_count: usize,
    true_order: Vec<String>,
    fitted_order: Vec<String>,
    ratings: Vec<Rating>,
    weighted_ratings: Vec<Rating>,
    judges: JudgeQualityData,
    convergence: ConvergenceReport,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Rate {
            verdicts,
            samples,
            pool,
            config,
            weighted,
        } => {
            let cfg = load_config(config.as_deref())?;
            let pool: Pool = pool.parse()?;
            let verdicts = read_verdicts(&verdicts)?;
            let index: SampleIndex = read_json(&samples)?;

            let (roster, tallies, digest, judges) = if pool == Pool::Judges {
                // Judges are rated from agreement with consensus, not from samples.
                let records = agreement_records(&verdicts);
                let digest = records_digest(&records, &cfg.solver);
                (judge_labels(&verdicts), tallies_from_records(&records), digest, None)
            } else if weighted {
                let quality = estimate_consensus(&verdicts, &[] as &[String], &cfg.judges, &cfg.solver);
                let tallies = extract_weighted_tallies(&verdicts, index.resolver(&pool), |j| {
                    get_judge_weight(&quality, j)
                });
                let digest = tallies_digest(&tallies, &cfg.solver);
                (index.roster(&pool), tallies, digest, Some(quality))
            } else {
                let records = extract_pairwise_records(&verdicts, index.resolver(&pool));
                let digest = records_digest(&records, &cfg.solver);
                (index.roster(&pool), tallies_from_records(&records), digest, None)
            };

            let summary = rating_engine::solve(&tallies, &roster, &cfg.solver);
            let convergence = convergence_report(&summary.ratings, &cfg.convergence);
            write_stdout(&RateOutput {
                pool: pool.to_string(),
                digest,
                iterations: summary.iterations,
                converged: summary.converged,
                ratings: summary.ratings,
                convergence,
                judges,
            })?;
        }
        Commands::Judges {
            verdicts,
            config,
            proxy_ratings,
            biases,
        } => {
            let cfg = load_config(config.as_deref())?;
            let verdicts = read_verdicts(&verdicts)?;
            let judges = judge_labels(&verdicts);

            let quality = match proxy_ratings {
                Some(path) => {
                    let ratings: Vec<Rating> = read_json(&path)?;
                    estimate_proxy(&ratings, &judges, &cfg.judges)
                }
                None => estimate_consensus(&verdicts, &judges, &cfg.judges, &cfg.solver),
            };
            let biases: BTreeMap<String, JudgeBias> = match biases {
                Some(path) => read_json(&path)?,
                None => BTreeMap::new(),
            };
            write_stdout(&JudgesOutput {
                pruned: pruned_judges(&quality, cfg.judges.prune_threshold),
                reports: judge_reports(&quality, &biases, cfg.judges.prune_threshold),
                quality,
            })?;
        }
        Commands::Simulate {
            seed,
            writers,
            judges,
            prompts,
            config,
        } => {
            let cfg = load_config(config.as_deref())?;
            let case = SimulationCase::standard(writers, judges, prompts, seed);
            let out = simulate(&case);
            let pool = Pool::Writers;
            let roster = out.index.roster(&pool);

            let records = extract_pairwise_records(&out.verdicts, out.index.resolver(&pool));
            let ratings = rating_engine::solve_records(&records, &roster, &cfg.solver);
            let quality = estimate_consensus(&out.verdicts, &[] as &[String], &cfg.judges, &cfg.solver);
            let weighted = extract_weighted_tallies(&out.verdicts, out.index.resolver(&pool), |j| {
                get_judge_weight(&quality, j)
            });
            let weighted_ratings = rating_engine::solve_tallies(&weighted, &roster, &cfg.solver);
            let convergence = convergence_report(&weighted_ratings, &cfg.convergence);

            write_stdout(&SimulateOutput {
                verdict_count: out.verdicts.len(),
                true_order: out.true_order,
                fitted_order: ratings.iter().map(|r| r.entity.clone()).collect(),
                ratings,
                weighted_ratings,
                judges: quality,
                convergence,
                case,
            })?;
        }
    }

    Ok(())
}

/// Distinct judge labels in the log, sorted.
fn judge_labels(verdicts: &[Verdict]) -> Vec<String> {
    let mut judges: Vec<String> = verdicts.iter().map(|v| v.judge.clone()).collect();
    judges.sort();
    judges.dedup();
    judges
}

fn load_config(path: Option<&Path>) -> Result<LadderConfig, LoadError> {
    match path {
        Some(p) => LadderConfig::from_path(p),
        None => Ok(LadderConfig::default()),
    }
}

/// One verdict per non-empty line.
fn read_verdicts(path: &Path) -> Result<Vec<Verdict>, LoadError> {
    let raw = std::fs::read_to_string(path)?;
    let mut verdicts = Vec::new();
    for (idx, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let verdict: Verdict =
            serde_json::from_str(line).map_err(|e| LoadError::parse(idx + 1, e.to_string()))?;
        verdicts.push(verdict);
    }
    tracing::debug!(count = verdicts.len(), path = %path.display(), "loaded verdicts");
    Ok(verdicts)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn write_stdout<T: Serialize>(value: &T) -> Result<(), io::Error> {
    let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    let mut out = io::stdout().lock();
    writeln!(out, "{json}")
}
