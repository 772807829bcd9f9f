//! Allocator configuration.

use std::fmt;
use std::str::FromStr;

/// Default region size requested when none is given (one page on most systems).
pub const DEFAULT_REGION_SIZE: usize = 4096;

/// Placement strategy used to pick the free block serving a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Strategy {
  /// First block in address order that is large enough.
  #[default]
  FirstFit,
  /// Block leaving the smallest remainder.
  BestFit,
  /// Block leaving the largest remainder.
  WorstFit,
  /// First-fit resumed from where the previous allocation stopped.
  NextFit,
}

impl Strategy {
  /// Every strategy, in declaration order.
  pub const ALL: [Strategy; 4] = [
    Strategy::FirstFit,
    Strategy::BestFit,
    Strategy::WorstFit,
    Strategy::NextFit,
  ];

  /// Kebab-case name, as accepted by [`FromStr`].
  pub fn name(self) -> &'static str {
    match self {
      Strategy::FirstFit => "first-fit",
      Strategy::BestFit => "best-fit",
      Strategy::WorstFit => "worst-fit",
      Strategy::NextFit => "next-fit",
    }
  }
}

impl fmt::Display for Strategy {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// Error returned when parsing an unknown strategy name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown placement strategy `{0}` (expected first-fit, best-fit, worst-fit or next-fit)")]
pub struct ParseStrategyError(String);

impl FromStr for Strategy {
  type Err = ParseStrategyError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
      "first-fit" | "first" | "firstfit" => Ok(Strategy::FirstFit),
      "best-fit" | "best" | "bestfit" => Ok(Strategy::BestFit),
      "worst-fit" | "worst" | "worstfit" => Ok(Strategy::WorstFit),
      "next-fit" | "next" | "nextfit" => Ok(Strategy::NextFit),
      _ => Err(ParseStrategyError(s.to_string())),
    }
  }
}

/// Configuration for an [`Allocator`](crate::Allocator).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorConfig {
  /// Requested region size in bytes, rounded up to a page multiple.
  pub region_size: usize,
  /// Placement strategy.
  pub strategy: Strategy,
}

impl AllocatorConfig {
  /// Creates a first-fit configuration for a region of `region_size` bytes.
  pub fn new(region_size: usize) -> Self {
    Self {
      region_size,
      strategy: Strategy::default(),
    }
  }

  /// Sets the placement strategy.
  pub fn with_strategy(
    mut self,
    strategy: Strategy,
  ) -> Self {
    self.strategy = strategy;
    self
  }
}

impl Default for AllocatorConfig {
  fn default() -> Self {
    Self::new(DEFAULT_REGION_SIZE)
  }
}
