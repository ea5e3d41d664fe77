//! Tubefit - vacuum tube model fitting and output stage design
//!
//! # Usage
//!
//! ```bash
//! tubefit fit el84.json --model derk-e --output el84-device.json
//! tubefit eval el84-device.json --va 250 --vg1 -7.3 --vg2 250
//! tubefit design el84-device.json single-ended --vb 250 --ia 48 --ra 5200
//! ```
//!
//! Set `RUST_LOG=tubefit_core=debug` for fit and solver diagnostics.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tubefit_core::circuit::{
    GainMode, PushPullOutput, PushPullUltralinear, SingleEndedOutput, SingleEndedUltralinear,
    TriodeCathodeFollower,
};
use tubefit_core::{
    data, report, Circuit, Device, DeviceType, EstimateConfig, Estimator, ModelKind, Result,
};

/// Vacuum tube model fitting and output stage design
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Estimate and fit a model to a measurement file
    Fit {
        /// Measurement JSON
        #[arg(value_name = "MEASUREMENT_FILE")]
        measurement: PathBuf,

        /// Model family (simple, koren, cohen-helie, gardiner, derk, derk-e,
        /// gardiner-pentode, extract)
        #[arg(short, long)]
        model: ModelKind,

        /// Device file whose fitted triode model seeds a pentode fit
        #[arg(long, value_name = "DEVICE_FILE")]
        triode: Option<PathBuf>,

        /// Enable secondary emission (extract model only)
        #[arg(long)]
        secondary_emission: bool,

        /// Refine the Kvb/Kvb1 seeds by quadratic regression
        #[arg(long)]
        estimate_kvb: bool,

        /// Write the fitted device JSON here
        #[arg(short, long, value_name = "DEVICE_FILE")]
        output: Option<PathBuf>,
    },

    /// Evaluate a fitted device at one operating point
    Eval {
        #[arg(value_name = "DEVICE_FILE")]
        device: PathBuf,

        #[arg(long, allow_hyphen_values = true)]
        va: f64,

        #[arg(long, allow_hyphen_values = true)]
        vg1: f64,

        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        vg2: f64,
    },

    /// Design an output stage around a fitted device
    Design {
        #[arg(value_name = "DEVICE_FILE")]
        device: PathBuf,

        #[arg(value_enum)]
        topology: Topology,

        #[command(flatten)]
        stage: StageArgs,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Topology {
    SingleEnded,
    PushPull,
    SingleEndedUltralinear,
    PushPullUltralinear,
    CathodeFollower,
}

#[derive(clap::Args, Debug)]
struct StageArgs {
    /// Supply voltage (V)
    #[arg(long, default_value_t = 300.0)]
    vb: f64,

    /// Screen voltage (V)
    #[arg(long, default_value_t = 250.0)]
    vs: f64,

    /// Anode bias current per valve (mA)
    #[arg(long, default_value_t = 30.0)]
    ia: f64,

    /// Anode load, anode-to-anode for push-pull (ohms)
    #[arg(long, default_value_t = 8000.0)]
    ra: f64,

    /// Ultralinear screen tap (defaults to 0.5 single-ended, 0.3 push-pull)
    #[arg(long)]
    tap: Option<f64>,

    /// Peak anode swing (V), 0 for automatic
    #[arg(long, default_value_t = 0.0)]
    headroom: f64,

    /// Leave the cathode resistor unbypassed
    #[arg(long)]
    unbypassed: bool,

    /// Size automatic headroom from the symmetric swing (push-pull)
    #[arg(long)]
    symmetric: bool,

    /// Print a headroom scan of the harmonic levels
    #[arg(long)]
    scan: bool,

    /// Cathode follower grid bias resistor (ohms)
    #[arg(long, default_value_t = 620.0)]
    rb: f64,

    /// Cathode follower cathode resistor (ohms)
    #[arg(long, default_value_t = 47000.0)]
    rk: f64,

    /// Cathode follower external load (ohms)
    #[arg(long, default_value_t = 100000.0)]
    rl: f64,
}

impl StageArgs {
    fn gain_mode(&self) -> GainMode {
        if self.unbypassed {
            GainMode::Unbypassed
        } else {
            GainMode::Bypassed
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Command::Fit {
            measurement,
            model,
            triode,
            secondary_emission,
            estimate_kvb,
            output,
        } => fit(
            &measurement,
            model,
            triode.as_deref(),
            EstimateConfig::new()
                .with_secondary_emission(secondary_emission)
                .with_estimate_kvb(estimate_kvb),
            output.as_deref(),
        ),
        Command::Eval { device, va, vg1, vg2 } => {
            let device = Device::from_file(&device)?;
            print!("{}", report::currents(&device, va, vg1, vg2));
            Ok(())
        }
        Command::Design {
            device,
            topology,
            stage,
        } => {
            let device = Device::from_file(&device)?;
            design(&device, topology, &stage);
            Ok(())
        }
    }
}

fn fit(
    path: &Path,
    kind: ModelKind,
    triode: Option<&Path>,
    config: EstimateConfig,
    output: Option<&Path>,
) -> Result<()> {
    let measurement = data::parse_file(path)?;
    let triode = triode.map(Device::from_file).transpose()?;
    let mut estimator = Estimator::new(config);

    let mut model = match (&triode, kind.device_type()) {
        (Some(t), DeviceType::Pentode) => {
            estimator.estimate_with_triode(&measurement, kind, t.model())?
        }
        _ => estimator.estimate(&measurement, kind)?,
    };
    let added = measurement.add_to_model(&mut model);
    info!(samples = added, model = %kind, "fitting");
    let fit_report = model.solve_with_retry();

    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| kind.to_string());
    let mut device = Device::from_measurement(name, model, measurement);
    if let Some(t) = triode {
        device.set_triode_model(Some(t.model().clone()));
    }

    print!("{}", report::fit_summary(&device, &fit_report));
    if let Some(output) = output {
        device.write_file(output)?;
        info!(path = %output.display(), "wrote device");
    }
    Ok(())
}

fn design(device: &Device, topology: Topology, args: &StageArgs) {
    match topology {
        Topology::SingleEnded => {
            let mut c = SingleEndedOutput::new();
            c.vb = args.vb;
            c.vs = args.vs;
            c.ia = args.ia;
            c.ra = args.ra;
            c.headroom = args.headroom;
            c.gain_mode = args.gain_mode();
            c.update(Some(device));
            print!("{}", report::stage(c.name(), c.result()));
            if args.scan {
                print!("{}", report::headroom_table(&c.headroom_scan(Some(device))));
            }
        }
        Topology::PushPull => {
            let mut c = PushPullOutput::new();
            c.vb = args.vb;
            c.vs = args.vs;
            c.ia = args.ia;
            c.raa = args.ra;
            c.headroom = args.headroom;
            c.symmetric_swing = args.symmetric;
            c.gain_mode = args.gain_mode();
            c.update(Some(device));
            print!("{}", report::stage(c.name(), c.result()));
            if args.scan {
                print!("{}", report::headroom_table(&c.headroom_scan(Some(device))));
            }
        }
        Topology::SingleEndedUltralinear => {
            let mut c = SingleEndedUltralinear::new();
            c.vb = args.vb;
            c.tap = args.tap.unwrap_or(c.tap);
            c.ia = args.ia;
            c.ra = args.ra;
            c.headroom = args.headroom;
            c.gain_mode = args.gain_mode();
            c.update(Some(device));
            print!("{}", report::stage(c.name(), c.result()));
            if args.scan {
                print!("{}", report::headroom_table(&c.headroom_scan(Some(device))));
            }
        }
        Topology::PushPullUltralinear => {
            let mut c = PushPullUltralinear::new();
            c.vb = args.vb;
            c.tap = args.tap.unwrap_or(c.tap);
            c.ia = args.ia;
            c.raa = args.ra;
            c.headroom = args.headroom;
            c.symmetric_swing = args.symmetric;
            c.gain_mode = args.gain_mode();
            c.update(Some(device));
            print!("{}", report::stage(c.name(), c.result()));
            if args.scan {
                print!("{}", report::headroom_table(&c.headroom_scan(Some(device))));
            }
        }
        Topology::CathodeFollower => {
            let mut c = TriodeCathodeFollower::new();
            c.vb = args.vb;
            c.rb = args.rb;
            c.rk = args.rk;
            c.rl = args.rl;
            c.update(Some(device));
            print!("{}", report::cathode_follower(c.name(), c.result()));
        }
    }
}
