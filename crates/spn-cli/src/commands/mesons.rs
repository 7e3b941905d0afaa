use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::path::PathBuf;

use clap::Args;
use log::info;
use spn_boot::RawCorrelatorSet;
use spn_core::provenance::Verbosity;
use spn_mesons::{
    analyse_channels, output_filename, write_results, AnalysisConfig, JsonFileSink, MesonOutcome,
};

#[derive(Args, Debug)]
pub struct MesonsArgs {
    /// YAML analysis configuration.
    #[arg(long)]
    pub config: PathBuf,
    /// JSON object mapping correlator names to per-configuration rows.
    #[arg(long)]
    pub input: PathBuf,
    /// Directory receiving plot payloads, result records and reports.
    #[arg(long)]
    pub out: PathBuf,
    /// Report per-stage diagnostics.
    #[arg(long, conflicts_with = "silent")]
    pub verbose: bool,
    /// Suppress progress output and the result summary.
    #[arg(long)]
    pub silent: bool,
}

pub fn run(args: &MesonsArgs) -> Result<(), Box<dyn Error>> {
    let mut config = AnalysisConfig::load(&args.config)?;
    if args.verbose {
        config.verbosity = Verbosity::Debug;
    } else if args.silent {
        config.verbosity = Verbosity::Quiet;
    }

    let rows: BTreeMap<String, Vec<Vec<f64>>> =
        serde_json::from_str(&fs::read_to_string(&args.input)?)?;
    let correlators = rows
        .into_iter()
        .map(|(name, configurations)| RawCorrelatorSet::new(name, configurations))
        .collect::<Result<Vec<_>, _>>()?;
    if config.verbosity.progress() {
        info!(
            "loaded {} correlator(s) from {}",
            correlators.len(),
            args.input.display()
        );
    }

    fs::create_dir_all(&args.out)?;
    let mut sink = JsonFileSink::new(&args.out);
    let runs = analyse_channels(&config, &correlators, &mut sink);

    let mut failures = 0;
    for run in &runs {
        match &run.outcome {
            Ok(MesonOutcome::Complete(report)) => {
                let record = args.out.join(output_filename(
                    &config.output_prefix,
                    "mass",
                    Some(&run.channel),
                    None,
                    None,
                    "dat",
                ));
                write_results(
                    &record,
                    &report.channel,
                    &report.headers,
                    &report.record_values(),
                )?;
                let summary = args.out.join(output_filename(
                    &config.output_prefix,
                    "report",
                    Some(&run.channel),
                    None,
                    None,
                    "json",
                ));
                fs::write(summary, serde_json::to_string_pretty(report)?)?;
                if !args.silent {
                    let mass = report.mass();
                    println!(
                        "{}: mass = {} +/- {}",
                        run.channel,
                        mass.value,
                        mass.error.unwrap_or(f64::NAN)
                    );
                }
            }
            Ok(MesonOutcome::NeedsPlateau { .. }) => {
                if !args.silent {
                    println!("{}: ANALYSIS NOT YET COMPLETE", run.channel);
                }
            }
            Err(_) => failures += 1,
        }
    }

    if failures > 0 {
        return Err(format!("{failures} channel(s) failed").into());
    }
    Ok(())
}
