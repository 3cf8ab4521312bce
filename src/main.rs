//! Nodal - operating point demo
//!
//! Builds a diode/resistor ladder in memory, finds its DC operating point
//! and prints every node voltage along with solver statistics.
//!
//! # Usage
//!
//! ```bash
//! NODAL_LOG=debug nodal --stages 20 --supply 12 --parallel
//! ```

use std::io;

use clap::Parser;
use nodal_core::{
    components::{CurrentSource, Diode, DiodeParams, Resistor, VoltageSource},
    error::Result,
    parallel::{ParallelGroup, SerialDistributor, WorkDistributor},
    simulation::{Behavior, BiasingConfig, BiasingSimulation},
};
use tracing_subscriber::EnvFilter;

/// Sparse operating point solver demo
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of resistor/diode stages
    #[arg(short, long, default_value_t = 10)]
    stages: usize,

    /// Supply voltage in volts
    #[arg(long, default_value_t = 5.0)]
    supply: f64,

    /// Resistance of every stage in ohms
    #[arg(short, long, default_value_t = 1e3)]
    resistance: f64,

    /// Current drawn from the last node in amperes
    #[arg(long, default_value_t = 0.0)]
    load: f64,

    /// Use germanium diodes
    #[arg(long)]
    germanium: bool,

    /// Load the ladder through a parallel group
    #[arg(short, long)]
    parallel: bool,

    /// Worker threads for the parallel group (0 = one per CPU)
    #[arg(short, long, default_value_t = 0)]
    threads: usize,

    /// Maximum Newton-Raphson iterations per attempt
    #[arg(long, default_value_t = nodal_core::simulation::DEFAULT_MAX_ITERATIONS)]
    max_iterations: usize,
}

fn ladder(args: &Args) -> Vec<Box<dyn Behavior>> {
    let params = if args.germanium {
        DiodeParams::germanium()
    } else {
        DiodeParams::default()
    };
    let mut behaviors: Vec<Box<dyn Behavior>> = Vec::new();
    behaviors.push(Box::new(VoltageSource::new("Vsupply", "n0", "0", args.supply)));
    for i in 0..args.stages {
        let from = format!("n{}", i);
        let to = format!("n{}", i + 1);
        behaviors.push(Box::new(Resistor::new(format!("R{}", i + 1), &from, &to, args.resistance)));
        behaviors.push(Box::new(Diode::new(format!("D{}", i + 1), &to, "0", params.clone())));
    }
    if args.load != 0.0 {
        let last = format!("n{}", args.stages);
        behaviors.push(Box::new(CurrentSource::new("Iload", &last, "0", args.load)));
    }
    behaviors
}

fn thread_pool(threads: usize) -> Result<Box<dyn WorkDistributor>> {
    #[cfg(feature = "parallel")]
    {
        Ok(Box::new(nodal_core::parallel::RayonDistributor::with_threads(threads)?))
    }
    #[cfg(not(feature = "parallel"))]
    {
        tracing::warn!(threads, "built without the parallel feature, loading serially");
        Ok(Box::new(SerialDistributor))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("NODAL_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = BiasingConfig::default().with_max_iterations(args.max_iterations);
    let mut simulation = BiasingSimulation::new(config);

    if args.parallel {
        let distributor: Box<dyn WorkDistributor> = if args.threads == 1 {
            Box::new(SerialDistributor)
        } else {
            thread_pool(args.threads)?
        };
        let mut group = ParallelGroup::with_distributor("ladder", distributor);
        for behavior in ladder(&args) {
            group.add_boxed(behavior);
        }
        simulation.add_behavior(group);
    } else {
        for behavior in ladder(&args) {
            simulation.add_boxed(behavior);
        }
    }

    simulation.run()?;

    for variable in simulation.variables().iter() {
        println!("{:>16} = {:.6}", variable.to_string(), simulation.solution()[variable.index]);
    }
    println!();
    println!("{}", simulation.statistics());
    println!("fill-ins:        {}", simulation.solver().fillins());

    Ok(())
}
