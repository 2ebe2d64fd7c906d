//! `senseless` – runs the rendezvous localization loop against a simulated
//! drive base and a simulated sensing partner.
//!
//! 1. Loads `~/.senseless/config.toml` (or `--config <path>`), falling back to
//!    defaults, then applies `SENSELESS_*` environment overrides and the
//!    command-line flags below.
//! 2. Builds the simulation and runs `--cycles N` rendezvous cycles, or runs
//!    until **Ctrl-C** when no count is given.
//! 3. Prints the final estimate next to the simulated ground truth.
//!
//! A fatal error (bad configuration, hardware fault, closed channel) exits
//! with a non-zero status.

mod config;
mod sim;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use colored::Colorize;
use senseless_middleware::ObservationMode;
use senseless_perception::ExpectedObservation;
use senseless_runtime::RunSummary;
use senseless_types::{LocError, Pose};
use tracing::warn;

use crate::config::Config;
use crate::sim::Simulation;

#[derive(Parser, Debug)]
#[command(name = "senseless")]
#[command(version, about = "Rendezvous-based localization for a robot without sensors", long_about = None)]
struct Cli {
    /// Configuration file (default: ~/.senseless/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the default configuration to the config path and exit
    #[arg(long)]
    write_default_config: bool,

    /// Number of rendezvous cycles to run (default: until Ctrl-C)
    #[arg(long)]
    cycles: Option<u64>,

    /// Seed for the simulated base and partner
    #[arg(long)]
    seed: Option<u64>,

    /// Probability that a motion command stalls without moving the base
    #[arg(long)]
    stall_probability: Option<f64>,

    /// Probability that the partner ignores a rendezvous request
    #[arg(long)]
    drop_probability: Option<f64>,

    /// Observation produced by the partner
    #[arg(long, value_enum)]
    partner_mode: Option<PartnerMode>,

    /// True start pose of the robot as `x,y,heading`
    #[arg(long, value_parser = parse_pose, allow_hyphen_values = true)]
    true_start: Option<Pose>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PartnerMode {
    Absolute,
    RangeBearing,
}

fn parse_pose(s: &str) -> Result<Pose, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [x, y, heading] = parts[..] else {
        return Err(format!("expected x,y,heading, got `{s}`"));
    };
    let num = |v: &str| v.parse::<f64>().map_err(|e| format!("`{v}`: {e}"));
    let pose = Pose::new(num(x)?, num(y)?, num(heading)?);
    if !pose.is_finite() {
        return Err(format!("pose must be finite, got `{s}`"));
    }
    Ok(pose)
}

impl Cli {
    fn apply(&self, cfg: &mut Config) {
        if let Some(seed) = self.seed {
            cfg.seed = seed;
        }
        if let Some(p) = self.stall_probability {
            cfg.sim.stall_probability = p;
        }
        if let Some(p) = self.drop_probability {
            cfg.partner.drop_probability = p;
        }
        if let Some(mode) = self.partner_mode {
            let (observation, expected) = match mode {
                PartnerMode::Absolute => (ObservationMode::Absolute, ExpectedObservation::Absolute),
                PartnerMode::RangeBearing => (ObservationMode::RangeBearing, ExpectedObservation::RangeBearing),
            };
            cfg.partner.mode = observation;
            cfg.controller.planner.expected_observation = expected;
        }
        if let Some(pose) = self.true_start {
            cfg.true_start = pose;
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let tracing_guard = senseless_runtime::init_tracing("senseless");

    print_banner();

    let path = cli.config.clone().unwrap_or_else(config::config_path);

    if cli.write_default_config {
        return match config::save_to(&Config::default(), &path) {
            Ok(()) => {
                println!("  {} Default config written to {}", "✓".green().bold(), path.display().to_string().bold());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}: {e}", "Error saving config".red());
                ExitCode::FAILURE
            }
        };
    }

    let mut cfg = match config::load_or_default(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}: {e}", "Config error".red());
            return ExitCode::from(2);
        }
    };
    cli.apply(&mut cfg);
    println!("  Config: {}", path.display().to_string().dimmed());
    println!(
        "  Robot {} · partner {} ({:?}) · seed {}",
        cfg.controller.robot_id.bold(),
        cfg.partner.partner_id.bold(),
        cfg.partner.mode,
        cfg.seed
    );
    if tracing_guard.is_exporting() {
        println!("  Traces: {}", "exporting over OTLP".dimmed());
    }
    println!();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {e}", "Failed to start Tokio runtime".red());
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cfg, cli.cycles)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e}", "✗ Fatal:".red().bold());
            ExitCode::FAILURE
        }
    }
}

async fn run(cfg: Config, cycles: Option<u64>) -> Result<(), LocError> {
    let mut sim = Simulation::build(&cfg)?;

    let cancel = sim.controller.cancel_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping after the current state …".yellow().bold());
        cancel.cancel();
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; only --cycles will stop the run");
    }

    let summary = match cycles {
        Some(n) => sim.controller.run_cycles(n).await?,
        None => sim.controller.run().await?,
    };
    print_summary(&summary, sim.controller.projected_mean(), sim.truth.pose());
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", "  ┌─┐┌─┐┌┐┌┌─┐┌─┐┬  ┌─┐┌─┐┌─┐".bold().cyan());
    println!("{}", "  └─┐├┤ │││└─┐├┤ │  ├┤ └─┐└─┐".bold().cyan());
    println!("{}", "  └─┘└─┘┘└┘└─┘└─┘┴─┘└─┘└─┘└─┘".bold().cyan());
    println!();
    println!("  {} {}", "senseless".bold(), format!("v{}", env!("CARGO_PKG_VERSION")).dimmed());
    println!("  Rendezvous localization without onboard sensing");
    println!();
}

fn print_summary(summary: &RunSummary, estimate: Pose, truth: Pose) {
    let error = estimate.distance_to(&truth);
    println!();
    println!("{}", "  Run summary".bold());
    println!("    cycles          {}", summary.cycles);
    println!("    updated         {}", summary.updated.to_string().green());
    println!("    missed          {}", summary.missed.to_string().yellow());
    println!("    rejected        {}", summary.rejected.to_string().yellow());
    println!("    motion failed   {}", summary.motion_failed.to_string().yellow());
    println!("    update skipped  {}", summary.update_skipped);
    println!();
    println!("    estimate        {}", estimate.to_string().bold());
    println!("    truth           {truth}");
    println!("    det(Σ)          {:.3e}", summary.final_uncertainty);
    println!("    position error  {error:.3} m");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pose_flag_parses_three_numbers() {
        assert_eq!(parse_pose("1.5, -2, 0.25").unwrap(), Pose::new(1.5, -2.0, 0.25));
        assert!(parse_pose("1,2").is_err());
        assert!(parse_pose("1,2,x").is_err());
        assert!(parse_pose("1,2,inf").is_err());
    }

    #[test]
    fn partner_mode_flag_sets_both_sides() {
        let cli = Cli::parse_from(["senseless", "--partner-mode", "range-bearing", "--seed", "5"]);
        let mut cfg = Config::default();
        cli.apply(&mut cfg);
        assert_eq!(cfg.partner.mode, ObservationMode::RangeBearing);
        assert_eq!(cfg.controller.planner.expected_observation, ExpectedObservation::RangeBearing);
        assert_eq!(cfg.seed, 5);
    }

    #[test]
    fn negative_true_start_is_accepted() {
        let cli = Cli::parse_from(["senseless", "--true-start", "-1,-2,-0.5"]);
        assert_eq!(cli.true_start, Some(Pose::new(-1.0, -2.0, -0.5)));
    }

    #[test]
    fn stall_flag_help_describes_motion_commands() {
        use clap::CommandFactory;
        let cmd = Cli::command();
        let arg = cmd
            .get_arguments()
            .find(|a| a.get_id() == "stall_probability")
            .unwrap();
        assert!(arg.get_help().unwrap().to_string().contains("motion command"));
    }

    #[test]
    fn flags_left_out_keep_file_values() {
        let cli = Cli::parse_from(["senseless"]);
        let mut cfg = Config::default();
        cfg.sim.stall_probability = 0.3;
        cli.apply(&mut cfg);
        assert_eq!(cfg, {
            let mut expected = Config::default();
            expected.sim.stall_probability = 0.3;
            expected
        });
    }
}
