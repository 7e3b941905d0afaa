use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::path::PathBuf;

use clap::Args;
use serde::Deserialize;
use spn_boot::{
    bootstrap_flow_scales, ConfigurationSelection, FlowHistory, FlowReferences, RawCorrelatorSet,
};
use spn_mesons::write_results;

#[derive(Args, Debug)]
pub struct FlowArgs {
    /// JSON object with `times` and per-observable `energies` rows.
    #[arg(long)]
    pub input: PathBuf,
    /// Optional tab-separated record of every scale and its error.
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// Reference value of t^2 E(t) defining t0.
    #[arg(long, default_value_t = spn_boot::flow::DEFAULT_FLOW_REFERENCE)]
    pub e0: f64,
    /// Reference value of t d/dt (t^2 E(t)) defining w0.
    #[arg(long, default_value_t = spn_boot::flow::DEFAULT_FLOW_REFERENCE)]
    pub w0: f64,
    /// Number of bootstrap draws.
    #[arg(long, default_value_t = 1000)]
    pub samples: usize,
    /// Master seed of the resampling.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
    /// Leading configurations discarded as thermalisation.
    #[arg(long, default_value_t = 0)]
    pub initial_configuration: usize,
    /// Stride between kept configurations.
    #[arg(long, default_value_t = 1)]
    pub configuration_separation: usize,
    /// Residue class kept out of each stride.
    #[arg(long, default_value_t = 0)]
    pub ensemble_selection: usize,
}

#[derive(Deserialize)]
struct FlowInput {
    times: Vec<f64>,
    energies: BTreeMap<String, Vec<Vec<f64>>>,
}

pub fn run(args: &FlowArgs) -> Result<(), Box<dyn Error>> {
    let input: FlowInput = serde_json::from_str(&fs::read_to_string(&args.input)?)?;
    let energies = input
        .energies
        .into_iter()
        .map(|(name, rows)| RawCorrelatorSet::new(name, rows))
        .collect::<Result<Vec<_>, _>>()?;
    let selection = ConfigurationSelection {
        initial_configuration: args.initial_configuration,
        configuration_separation: args.configuration_separation,
        ensemble_selection: args.ensemble_selection,
    };
    let history = FlowHistory::new(input.times, energies)?.thinned(&selection)?;
    let references = FlowReferences {
        e0: args.e0,
        w0: args.w0,
    };
    let estimates = bootstrap_flow_scales(&history, references, args.samples, args.seed)?;

    let mut headers = Vec::with_capacity(2 * estimates.len());
    let mut values = Vec::with_capacity(estimates.len());
    for estimate in &estimates {
        let label = format!("{}_{}", estimate.observable, estimate.scale.label());
        println!("{label} = {} +/- {}", estimate.value, estimate.error);
        headers.push(label.clone());
        headers.push(format!("{label}_error"));
        values.push((estimate.value, estimate.error));
    }
    if let Some(path) = &args.out {
        write_results(path, "flow", &headers, &values)?;
    }
    Ok(())
}
