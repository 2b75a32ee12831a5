//! Frame clock and cache staleness bookkeeping.

use serde::Deserialize;

/// Simulation time and tick count of the frame being processed.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameClock {
	/// Simulation time in seconds, as passed to `pre_update`.
	pub sim_time: f64,
	/// Number of `pre_update` calls so far.
	pub tick: u64,
}

impl FrameClock {
	/// Returns the clock of the next frame at `sim_time`.
	pub fn advance(self, sim_time: f64) -> Self {
		Self {
			sim_time,
			tick: self.tick + 1,
		}
	}
}

/// How the time and tick budgets of a cached value combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StalenessPolicy {
	/// Expired once every non-zero budget is exhausted.
	#[default]
	AllExpired,
	/// Expired once any non-zero budget is exhausted.
	AnyExpired,
}

/// Staleness thresholds plus the stamp of the last successful fetch.
///
/// A zero threshold constrains nothing, so the default `0/0` expires every
/// frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Freshness {
	/// Maximum age in simulation seconds.
	pub max_age_time: f64,
	/// Maximum age in ticks.
	pub max_age_ticks: u64,
	last_fetch: Option<FrameClock>,
}

impl Freshness {
	/// Creates thresholds with no fetch recorded yet.
	pub fn new(max_age_time: f64, max_age_ticks: u64) -> Self {
		Self {
			max_age_time,
			max_age_ticks,
			last_fetch: None,
		}
	}

	/// Clock of the last successful fetch.
	pub fn last_fetch(&self) -> Option<FrameClock> {
		self.last_fetch
	}

	/// Records a successful fetch at `now`.
	pub fn stamp(&mut self, now: FrameClock) {
		self.last_fetch = Some(now);
	}

	/// Tightens the thresholds to the stricter of both, as a second consumer
	/// of the same value demands.
	///
	/// Under `AllExpired` a zero budget is always exhausted, so it is the
	/// strictest value. Under `AnyExpired` it never fires and only yields to
	/// a non-zero budget.
	pub fn tighten(&mut self, max_age_time: f64, max_age_ticks: u64, policy: StalenessPolicy) {
		match policy {
			StalenessPolicy::AllExpired => {
				self.max_age_time = self.max_age_time.min(max_age_time);
				self.max_age_ticks = self.max_age_ticks.min(max_age_ticks);
			}
			StalenessPolicy::AnyExpired => {
				self.max_age_time = match (self.max_age_time > 0.0, max_age_time > 0.0) {
					(true, true) => self.max_age_time.min(max_age_time),
					(false, _) => max_age_time,
					(true, false) => self.max_age_time,
				};
				self.max_age_ticks = match (self.max_age_ticks, max_age_ticks) {
					(0, requested) => requested,
					(current, 0) => current,
					(current, requested) => current.min(requested),
				};
			}
		}
	}

	/// Returns true if the cache must be refetched at `now`.
	pub fn is_expired(&self, now: FrameClock, policy: StalenessPolicy) -> bool {
		let Some(last) = self.last_fetch else {
			return true;
		};

		let time = (self.max_age_time > 0.0).then(|| now.sim_time - last.sim_time >= self.max_age_time);
		let ticks = (self.max_age_ticks > 0).then(|| now.tick.saturating_sub(last.tick) >= self.max_age_ticks);

		match policy {
			StalenessPolicy::AllExpired => time.unwrap_or(true) && ticks.unwrap_or(true),
			StalenessPolicy::AnyExpired => match (time, ticks) {
				(None, None) => true,
				(time, ticks) => time.unwrap_or(false) || ticks.unwrap_or(false),
			},
		}
	}
}
