use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{value_parser, ArgAction, Parser, Subcommand};
use serde::Serialize;

use fangrid::config::Timing;
use fangrid::grid::Grid;
use fangrid::layout::NUM_CELLS;
use fangrid::life;
use fangrid::patterns;
use fangrid::sim::{Installation, InstallationReport, SimParams};

const MAX_GENERATIONS: i64 = 100_000;
const MAX_CYCLES: i64 = 100_000;

/// Fan grid simulator: run Game of Life on a simulated 16x16 fan installation
#[derive(Parser)]
#[command(name = "fangrid-sim", version)]
struct Cli {
    /// More log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the built-in starting patterns
    Patterns,
    /// Step the Life engine alone, without any hardware
    Evolve {
        /// Pattern name (built-in) or path to a text file of '#'/'.' rows
        #[arg(long, default_value = "oscillators")]
        pattern: String,
        /// Number of generations to compute
        #[arg(
            short,
            long,
            default_value = "4",
            value_parser = value_parser!(u32).range(..=MAX_GENERATIONS)
        )]
        generations: u32,
        /// Print JSON instead of text grids
        #[arg(long)]
        json: bool,
        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },
    /// Run a whole installation: one master and eight cells on a simulated bus
    Simulate {
        /// Pattern name (built-in) or path to a text file of '#'/'.' rows
        #[arg(long, default_value = "oscillators")]
        pattern: String,
        /// Number of installation cycles to run
        #[arg(
            short,
            long,
            default_value = "20",
            value_parser = value_parser!(u32).range(..=MAX_CYCLES)
        )]
        cycles: u32,
        /// Flick a fan by hand before a cycle, as ROW,COL@CYCLE (repeatable)
        #[arg(long, value_parser = parse_touch)]
        touch: Vec<Touch>,
        /// Hold a fan still before a cycle, as ROW,COL@CYCLE (repeatable)
        #[arg(long, value_parser = parse_touch)]
        hold: Vec<Touch>,
        /// Disconnect a cell from the bus for the whole run (repeatable)
        #[arg(long)]
        offline: Vec<usize>,
        /// Timing overrides as a TOML file
        #[arg(long)]
        config: Option<PathBuf>,
        /// How long an unpowered fan keeps spinning, in ms
        #[arg(long, default_value = "4000")]
        spin_down_ms: u32,
        /// Print JSON instead of a cycle log
        #[arg(long)]
        json: bool,
        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },
}

/// A hand on a fan at a given cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Touch {
    row: usize,
    col: usize,
    cycle: usize,
}

fn parse_touch(s: &str) -> Result<Touch, String> {
    const FORMAT: &str = "expected ROW,COL@CYCLE";
    let (pos, cycle) = s.split_once('@').ok_or(FORMAT)?;
    let (row, col) = pos.split_once(',').ok_or(FORMAT)?;
    let row: usize = row.trim().parse().map_err(|e| format!("bad row: {e}"))?;
    let col: usize = col.trim().parse().map_err(|e| format!("bad column: {e}"))?;
    let cycle: usize = cycle.trim().parse().map_err(|e| format!("bad cycle: {e}"))?;
    if row >= Grid::ROWS || col >= Grid::COLS {
        return Err(format!("({row}, {col}) is outside the 16x16 grid"));
    }
    Ok(Touch { row, col, cycle })
}

#[derive(Serialize)]
struct EvolveOutput {
    pattern: String,
    generations: Vec<GenerationOutput>,
}

#[derive(Serialize)]
struct GenerationOutput {
    generation: usize,
    population: usize,
    rows: Vec<String>,
}

#[derive(Serialize)]
struct SimulateOutput {
    pattern: String,
    timing: Timing,
    cycles: Vec<CycleOutput>,
    generation: u64,
    rows: Vec<String>,
}

#[derive(Serialize)]
struct CycleOutput {
    cycle: usize,
    time_ms: u32,
    generation: u64,
    population: usize,
    changed: usize,
    quiet_reset: bool,
    evolved: bool,
    responsive: usize,
    /// Cells that saw a fan moved by hand this cycle.
    human_input: Vec<usize>,
}

impl CycleOutput {
    fn new(cycle: usize, report: &InstallationReport, generation: u64, population: usize) -> Self {
        Self {
            cycle,
            time_ms: report.time_ms,
            generation,
            population,
            changed: report.master.changed,
            quiet_reset: report.master.quiet_reset,
            evolved: report.master.evolved,
            responsive: report.master.responsive_count(),
            human_input: report
                .cells
                .iter()
                .enumerate()
                .filter(|(_, c)| c.human_input)
                .map(|(i, _)| i)
                .collect(),
        }
    }
}

fn load_pattern(name: &str) -> Result<Grid> {
    if let Some(grid) = patterns::builtin_pattern(name) {
        return Ok(grid);
    }
    let text = fs::read_to_string(name)
        .with_context(|| format!("unknown pattern and not a readable file: {name}"))?;
    let rows: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    Grid::from_rows(&rows).with_context(|| format!("failed to parse pattern file: {name}"))
}

fn load_timing(path: Option<&PathBuf>) -> Result<Timing> {
    let Some(path) = path else {
        return Ok(Timing::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    Timing::from_toml_str(&text).with_context(|| format!("invalid config: {}", path.display()))
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{json}");
    Ok(())
}

fn cmd_patterns() {
    for name in patterns::builtin_names() {
        if let Some(grid) = patterns::builtin_pattern(name) {
            println!("{name:<12} population {}", grid.population());
        }
    }
}

fn cmd_evolve(pattern: &str, generations: u32, json: bool, pretty: bool) -> Result<()> {
    let mut grid = load_pattern(pattern)?;
    let mut output = EvolveOutput {
        pattern: pattern.to_string(),
        generations: Vec::new(),
    };
    for generation in 0..=generations as usize {
        if !json {
            println!("generation {generation} (population {})", grid.population());
            println!("{grid}");
        }
        output.generations.push(GenerationOutput {
            generation,
            population: grid.population(),
            rows: grid.to_rows(),
        });
        grid = life::step(&grid);
    }
    if json {
        print_json(&output, pretty)?;
    }
    Ok(())
}

struct SimulateArgs {
    pattern: String,
    cycles: u32,
    touch: Vec<Touch>,
    hold: Vec<Touch>,
    offline: Vec<usize>,
    config: Option<PathBuf>,
    spin_down_ms: u32,
    json: bool,
    pretty: bool,
}

fn cmd_simulate(args: SimulateArgs) -> Result<()> {
    let timing = load_timing(args.config.as_ref())?;
    let seed = load_pattern(&args.pattern)?;
    if let Some(&cell) = args.offline.iter().find(|&&c| c >= NUM_CELLS) {
        bail!("cell {cell} does not exist (cells are 0..{NUM_CELLS})");
    }

    let mut inst = Installation::new(SimParams {
        timing,
        spin_down_ms: args.spin_down_ms,
        ..SimParams::default()
    });
    inst.begin();
    inst.seed(&seed);
    for &cell in &args.offline {
        inst.set_offline(cell, true);
    }

    let mut cycles = Vec::new();
    for cycle in 0..args.cycles as usize {
        for t in args.touch.iter().filter(|t| t.cycle == cycle) {
            inst.touch(t.row, t.col);
        }
        for h in args.hold.iter().filter(|h| h.cycle == cycle) {
            inst.hold(h.row, h.col);
        }

        let report = inst.cycle();
        let master = inst.master();
        let out = CycleOutput::new(
            cycle,
            &report,
            master.generation(),
            master.current().population(),
        );
        if !args.json {
            println!(
                "cycle {:>3}  t={:>7}ms  gen {:>3}  pop {:>3}  changed {:>2}  cells {}/{NUM_CELLS}{}{}",
                out.cycle,
                out.time_ms,
                out.generation,
                out.population,
                out.changed,
                out.responsive,
                if out.quiet_reset { "  touched" } else { "" },
                if out.evolved { "  evolved" } else { "" },
            );
        }
        cycles.push(out);
    }

    let master = inst.master();
    if args.json {
        print_json(
            &SimulateOutput {
                pattern: args.pattern,
                timing,
                cycles,
                generation: master.generation(),
                rows: master.current().to_rows(),
            },
            args.pretty,
        )?;
    } else {
        println!();
        println!("{}", master.current());
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match cli.command {
        Command::Patterns => cmd_patterns(),
        Command::Evolve {
            pattern,
            generations,
            json,
            pretty,
        } => cmd_evolve(&pattern, generations, json, pretty)?,
        Command::Simulate {
            pattern,
            cycles,
            touch,
            hold,
            offline,
            config,
            spin_down_ms,
            json,
            pretty,
        } => cmd_simulate(SimulateArgs {
            pattern,
            cycles,
            touch,
            hold,
            offline,
            config,
            spin_down_ms,
            json,
            pretty,
        })?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_parses_position_and_cycle() {
        assert_eq!(
            parse_touch("3,12@5"),
            Ok(Touch {
                row: 3,
                col: 12,
                cycle: 5
            })
        );
        assert_eq!(parse_touch(" 0, 0 @0").map(|t| t.col), Ok(0));
    }

    #[test]
    fn touch_rejects_bad_input() {
        assert!(parse_touch("3,12").is_err());
        assert!(parse_touch("3@1").is_err());
        assert!(parse_touch("16,0@1").is_err());
        assert!(parse_touch("a,1@1").is_err());
    }

    #[test]
    fn builtin_pattern_loads_by_name() {
        assert_eq!(load_pattern("pulsar").unwrap().population(), 48);
        assert!(load_pattern("no-such-pattern-or-file").is_err());
    }

    #[test]
    fn cli_parses_repeated_touches() {
        let cli = Cli::try_parse_from([
            "fangrid-sim",
            "-vv",
            "simulate",
            "--touch",
            "1,1@2",
            "--touch",
            "1,2@2",
            "--cycles",
            "5",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Simulate { touch, cycles, .. } => {
                assert_eq!(touch.len(), 2);
                assert_eq!(cycles, 5);
            }
            _ => panic!("expected simulate"),
        }
    }

    #[test]
    fn run_lengths_are_bounded() {
        for args in [
            ["fangrid-sim", "evolve", "--generations", "18446744073709551615"],
            ["fangrid-sim", "simulate", "--cycles", "100001"],
        ] {
            assert!(Cli::try_parse_from(args).is_err());
        }
        assert!(Cli::try_parse_from(["fangrid-sim", "simulate", "--cycles", "100000"]).is_ok());
    }
}
