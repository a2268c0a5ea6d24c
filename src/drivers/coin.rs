//! Coin acceptor pulse detection.
//!
//! The acceptor pulls its signal line low for a short, noisy pulse per coin.
//! Three detection paths run side by side and share one cooldown gate:
//!
//! ```text
//!   INT + line active ───────────────┐
//!   inactive → active (falling edge) ├──▶ cooldown elapsed? ──▶ coin
//!   ≥ min_edges within edge window ──┘
//! ```
//!
//! Nothing is accepted during the startup settle period, while the
//! acceptor's own power-on pulses die down.

use log::debug;

use crate::clock::{Tick, elapsed_since};
use crate::config::MachineSettings;

/// Which path accepted a coin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoinTrigger {
    Interrupt,
    FallingEdge,
    EdgePattern,
}

#[derive(Debug, Clone)]
pub struct CoinDetector {
    cooldown_ms: u32,
    edge_window_ms: u32,
    min_edges: u8,
    window_reset_ms: u32,
    settle_ms: u32,

    boot: Tick,
    settled: bool,
    was_active: bool,
    last_accepted: Option<Tick>,
    edge_count: u8,
    window_start: Tick,
    last_edge: Tick,
}

impl CoinDetector {
    pub fn new(settings: &MachineSettings, boot: Tick) -> Self {
        Self {
            cooldown_ms: settings.coin_cooldown_ms,
            edge_window_ms: settings.coin_edge_window_ms,
            min_edges: settings.coin_min_edges,
            window_reset_ms: settings.coin_window_reset_ms,
            settle_ms: settings.startup_settle_ms,
            boot,
            settled: false,
            was_active: false,
            last_accepted: None,
            edge_count: 0,
            window_start: boot,
            last_edge: boot,
        }
    }

    /// Feed one sample of the coin line.
    ///
    /// * `active`: the line is at its active (low) level.
    /// * `interrupt`: the expander's INT reported a change since the last sample.
    pub fn sample(&mut self, active: bool, interrupt: bool, now: Tick) -> Option<CoinTrigger> {
        if !self.settled {
            if elapsed_since(now, self.boot) < self.settle_ms {
                self.was_active = active;
                return None;
            }
            self.settled = true;
        }

        let cooldown_ok = self
            .last_accepted
            .is_none_or(|t| elapsed_since(now, t) > self.cooldown_ms);

        let edge = active != self.was_active;
        self.was_active = active;

        if interrupt && active && cooldown_ok {
            return Some(self.accept(CoinTrigger::Interrupt, now));
        }

        if edge {
            if self.edge_count == 0 || elapsed_since(now, self.window_start) > self.edge_window_ms {
                self.window_start = now;
                self.edge_count = 0;
            }
            self.edge_count = self.edge_count.saturating_add(1);
            self.last_edge = now;
        } else if self.edge_count > 0 && elapsed_since(now, self.last_edge) > self.window_reset_ms {
            self.edge_count = 0;
        }

        if !cooldown_ok {
            return None;
        }
        if edge && active {
            return Some(self.accept(CoinTrigger::FallingEdge, now));
        }
        if self.edge_count >= self.min_edges
            && elapsed_since(now, self.window_start) <= self.edge_window_ms
        {
            return Some(self.accept(CoinTrigger::EdgePattern, now));
        }
        None
    }

    fn accept(&mut self, trigger: CoinTrigger, now: Tick) -> CoinTrigger {
        debug!("coin: accepted via {:?} (edges={})", trigger, self.edge_count);
        self.last_accepted = Some(now);
        self.edge_count = 0;
        trigger
    }
}
