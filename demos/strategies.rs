//! Replays classic allocation scenarios and prints the free list after each.
//!
//! ```bash
//! # every scenario with its usual strategy
//! cargo run --example strategies
//!
//! # one scenario, forced onto another strategy, with allocator logs
//! cargo run --example strategies -- --scenario fragmentation --strategy worst-fit -v
//! ```

use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use fitalloc::{AllocResult, Allocator, Strategy};
use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Placement strategy playground
#[derive(Parser, Debug)]
#[command(name = "strategies", version, about)]
struct Args {
  /// Scenario to run
  #[arg(short, long, value_enum, default_value_t = Scenario::All)]
  scenario: Scenario,

  /// Force a placement strategy instead of each scenario's own
  #[arg(short = 'S', long, env = "FITALLOC_STRATEGY")]
  strategy: Option<Strategy>,

  /// Requested region size in bytes (rounded up to whole pages)
  #[arg(long, default_value_t = 4096, env = "FITALLOC_REGION_SIZE")]
  size: usize,

  /// Seed for the random scenarios
  #[arg(long, default_value_t = 1)]
  seed: u64,

  /// Log every allocator decision
  #[arg(short, long)]
  verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
  All,
  Basic,
  Sequence,
  Fragmentation,
  Reuse,
  OptimalFit,
  EdgeFit,
  MixedSizes,
  LargeBlocks,
  ExtremeSizes,
  SequentialFragments,
  Cyclic,
  SequentialFit,
  Random,
  Churn,
}

type Run = fn(&mut Allocator, &mut StdRng) -> AllocResult<()>;

impl Scenario {
  /// Every runnable scenario with the strategy it was written for.
  const CATALOG: [(Scenario, Strategy, Run); 14] = [
    (Scenario::Basic, Strategy::FirstFit, basic),
    (Scenario::Sequence, Strategy::FirstFit, sequence),
    (Scenario::Fragmentation, Strategy::FirstFit, fragmentation),
    (Scenario::Reuse, Strategy::FirstFit, reuse),
    (Scenario::OptimalFit, Strategy::BestFit, optimal_fit),
    (Scenario::EdgeFit, Strategy::BestFit, edge_fit),
    (Scenario::MixedSizes, Strategy::BestFit, mixed_sizes),
    (Scenario::LargeBlocks, Strategy::WorstFit, large_blocks),
    (Scenario::ExtremeSizes, Strategy::WorstFit, extreme_sizes),
    (Scenario::SequentialFragments, Strategy::WorstFit, sequential_fragments),
    (Scenario::Cyclic, Strategy::NextFit, cyclic),
    (Scenario::SequentialFit, Strategy::NextFit, sequential_fit),
    (Scenario::Random, Strategy::BestFit, random),
    (Scenario::Churn, Strategy::FirstFit, churn),
  ];

  fn name(self) -> String {
    self
      .to_possible_value()
      .map(|value| value.get_name().to_string())
      .unwrap_or_default()
  }
}

/// Allocates `sizes` in order and prints where each one landed.
fn allocate_all(
  allocator: &mut Allocator,
  sizes: &[usize],
) -> AllocResult<Vec<*mut u8>> {
  sizes
    .iter()
    .map(|&size| {
      let ptr = allocator.try_allocate(size)?.as_ptr();
      println!("  allocated {size:>5} bytes at {ptr:?}");
      Ok(ptr)
    })
    .collect()
}

fn free(
  allocator: &mut Allocator,
  ptr: *mut u8,
) -> AllocResult<()> {
  allocator.release(ptr)?;
  println!("  freed block at {ptr:?}");
  Ok(())
}

fn basic(
  allocator: &mut Allocator,
  _: &mut StdRng,
) -> AllocResult<()> {
  for ptr in allocate_all(allocator, &[100])? {
    free(allocator, ptr)?;
  }
  Ok(())
}

fn sequence(
  allocator: &mut Allocator,
  rng: &mut StdRng,
) -> AllocResult<()> {
  basic(allocator, rng)?;
  basic(allocator, rng)
}

/// Allocates `first`, frees the blocks at `holes`, allocates `refill` into the
/// gap and finally frees everything.
fn hole_then_refill(
  allocator: &mut Allocator,
  first: &[usize],
  holes: &[usize],
  refill: usize,
) -> AllocResult<()> {
  let mut live = allocate_all(allocator, first)?;

  for &index in holes.iter().rev() {
    let ptr = live.remove(index);
    free(allocator, ptr)?;
  }
  live.extend(allocate_all(allocator, &[refill])?);

  for ptr in live {
    free(allocator, ptr)?;
  }
  Ok(())
}

fn fragmentation(
  allocator: &mut Allocator,
  _: &mut StdRng,
) -> AllocResult<()> {
  hole_then_refill(allocator, &[200, 300, 400], &[1], 250)
}

fn reuse(
  allocator: &mut Allocator,
  _: &mut StdRng,
) -> AllocResult<()> {
  hole_then_refill(allocator, &[300], &[0], 150)
}

fn optimal_fit(
  allocator: &mut Allocator,
  _: &mut StdRng,
) -> AllocResult<()> {
  hole_then_refill(allocator, &[500], &[0], 300)
}

fn edge_fit(
  allocator: &mut Allocator,
  _: &mut StdRng,
) -> AllocResult<()> {
  hole_then_refill(allocator, &[400, 200], &[0], 350)
}

fn mixed_sizes(
  allocator: &mut Allocator,
  _: &mut StdRng,
) -> AllocResult<()> {
  hole_then_refill(allocator, &[150, 250, 100], &[1], 200)
}

fn large_blocks(
  allocator: &mut Allocator,
  _: &mut StdRng,
) -> AllocResult<()> {
  hole_then_refill(allocator, &[1000, 1000], &[0], 500)
}

fn extreme_sizes(
  allocator: &mut Allocator,
  _: &mut StdRng,
) -> AllocResult<()> {
  hole_then_refill(allocator, &[2000, 50], &[0], 1500)
}

fn sequential_fragments(
  allocator: &mut Allocator,
  _: &mut StdRng,
) -> AllocResult<()> {
  hole_then_refill(allocator, &[800, 800], &[0], 600)
}

fn cyclic(
  allocator: &mut Allocator,
  _: &mut StdRng,
) -> AllocResult<()> {
  hole_then_refill(allocator, &[100, 200], &[0], 150)?;
  hole_then_refill(allocator, &[123, 234, 345], &[1], 222)
}

/// Frees the first of two blocks and allocates the same size again, which
/// next-fit places after the second.
fn sequential_fit(
  allocator: &mut Allocator,
  _: &mut StdRng,
) -> AllocResult<()> {
  hole_then_refill(allocator, &[100, 200], &[0], 100)
}

/// Random sizes, freeing a random live block roughly every fourth step.
fn random(
  allocator: &mut Allocator,
  rng: &mut StdRng,
) -> AllocResult<()> {
  let mut live = Vec::new();

  for _ in 0..100 {
    let size = rng.gen_range(1..=100);
    match allocator.allocate(size) {
      Some(ptr) => {
        println!("  allocated {size:>5} bytes at {ptr:?}");
        live.push(ptr.as_ptr());
      }
      None => println!("  allocation of {size} bytes failed"),
    }

    if !live.is_empty() && rng.gen_ratio(1, 4) {
      let ptr = live.swap_remove(rng.gen_range(0..live.len()));
      free(allocator, ptr)?;
    }
  }

  for ptr in live {
    free(allocator, ptr)?;
  }
  Ok(())
}

/// Random sizes, each freed right after it was allocated.
fn churn(
  allocator: &mut Allocator,
  rng: &mut StdRng,
) -> AllocResult<()> {
  for _ in 0..10 {
    let size = rng.gen_range(1..=100);
    match allocator.allocate(size) {
      Some(ptr) => {
        println!("  allocated {size:>5} bytes at {ptr:?}");
        free(allocator, ptr.as_ptr())?;
      }
      None => println!("  allocation of {size} bytes failed"),
    }
  }
  Ok(())
}

fn print_dump(allocator: &Allocator) {
  println!("  -------------------------------------------------");
  println!("  | Block Number | Block Size | Block Address     |");
  println!("  -------------------------------------------------");
  for block in allocator.dump() {
    println!("  | {:<13}| {:<11}| {:<#18x}|", block.ordinal, block.size, block.address);
  }
  println!("  -------------------------------------------------");
  println!("  {}", allocator.stats());
}

fn init_logging(verbose: bool) {
  let filter = if verbose {
    EnvFilter::new("fitalloc=debug,strategies=debug")
  } else {
    EnvFilter::try_from_default_env()
      .unwrap_or_else(|_| EnvFilter::new("fitalloc=info,strategies=info"))
  };

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(false)
    .without_time()
    .init();
}

fn main() -> ExitCode {
  let args = Args::parse();
  init_logging(args.verbose);

  let mut rng = StdRng::seed_from_u64(args.seed);
  let mut failed = 0;

  for (scenario, default_strategy, run) in Scenario::CATALOG {
    if args.scenario != Scenario::All && args.scenario != scenario {
      continue;
    }

    let strategy = args.strategy.unwrap_or(default_strategy);
    println!("\n== {} ({strategy}) ==", scenario.name());

    // Each scenario gets a fresh heap of its own.
    let outcome = Allocator::with_strategy(args.size, strategy).and_then(|mut allocator| {
      run(&mut allocator, &mut rng)?;
      print_dump(&allocator);
      allocator.verify()
    });

    match outcome {
      Ok(()) => info!(scenario = %scenario.name(), %strategy, "scenario passed"),
      Err(err) => {
        error!(scenario = %scenario.name(), %strategy, %err, "scenario failed");
        failed += 1;
      }
    }
  }

  if failed == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}
