use std::error::Error;

use clap::Args;
use spn_mesons::channel::PRESET_NAMES;
use spn_mesons::ChannelSpec;

#[derive(Args, Debug)]
pub struct ChannelsArgs {
    /// Print the full descriptors as JSON instead of a summary.
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &ChannelsArgs) -> Result<(), Box<dyn Error>> {
    for name in PRESET_NAMES {
        let spec = ChannelSpec::preset(name)?;
        if args.json {
            println!("{}", serde_json::to_string(&spec)?);
            continue;
        }
        let correlators: Vec<&str> = spec
            .correlators()
            .iter()
            .map(|correlator| correlator.name.as_str())
            .collect();
        let parameters: Vec<&str> = spec
            .fit()
            .parameters()
            .iter()
            .map(|parameter| parameter.name.as_str())
            .collect();
        println!(
            "{name}\tcorrelators: {}\tparameters: {}",
            correlators.join(","),
            parameters.join(",")
        );
    }
    Ok(())
}
