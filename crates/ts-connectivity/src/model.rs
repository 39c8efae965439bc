//! Connectivity models.
//!
//! A model fills a [`ConnectivityMatrix`] at start-up and, for trace-driven
//! models, keeps it current as simulated time advances.  Static models
//! never change the matrix after `init`.

use ts_core::{MoteId, Settings, SimRng};

use crate::{ConnectivityError, ConnectivityMatrix, ConnectivityResult, Link, pister};

/// RSSI assigned to the perfect links of the static models.
const PERFECT_LINK: Link = Link { pdr: 1.0, rssi: -10.0 };

pub trait ConnectivityModel: Send {
    fn name(&self) -> &'static str;

    /// Populate the matrix for time zero.
    fn init(&mut self, matrix: &mut ConnectivityMatrix, rng: &mut SimRng) -> ConnectivityResult<()>;

    /// Apply every change due at or before `now_s` seconds and return the
    /// time of the next pending change.
    fn advance(&mut self, _matrix: &mut ConnectivityMatrix, _now_s: f64) -> Option<f64> {
        None
    }

    fn next_update_s(&self) -> Option<f64> {
        None
    }
}

// ── FullyMeshed ───────────────────────────────────────────────────────────────

/// Every mote hears every other mote perfectly on every channel.
pub struct FullyMeshed;

impl ConnectivityModel for FullyMeshed {
    fn name(&self) -> &'static str {
        "FullyMeshed"
    }

    fn init(&mut self, matrix: &mut ConnectivityMatrix, _rng: &mut SimRng) -> ConnectivityResult<()> {
        let n = matrix.num_motes() as u32;
        for src in 0..n {
            for dst in 0..n {
                matrix.set_link_all_channels(MoteId(src), MoteId(dst), PERFECT_LINK);
            }
        }
        Ok(())
    }
}

// ── Linear ────────────────────────────────────────────────────────────────────

/// A chain: mote `i` hears only `i - 1` and `i + 1`.
pub struct Linear;

impl ConnectivityModel for Linear {
    fn name(&self) -> &'static str {
        "Linear"
    }

    fn init(&mut self, matrix: &mut ConnectivityMatrix, _rng: &mut SimRng) -> ConnectivityResult<()> {
        let n = matrix.num_motes() as u32;
        for i in 1..n {
            matrix.set_link_all_channels(MoteId(i - 1), MoteId(i), PERFECT_LINK);
            matrix.set_link_all_channels(MoteId(i), MoteId(i - 1), PERFECT_LINK);
        }
        Ok(())
    }
}

// ── RandomTopology ────────────────────────────────────────────────────────────

/// Give up placing a mote after this many candidate positions.
const MAX_PLACEMENT_ATTEMPTS: u32 = 100_000;

/// Motes dropped at random in a square, links from the Pister-hack model.
///
/// The root sits at the centre.  Every further mote is re-drawn until it
/// has at least `min_neighbors` already-placed neighbours (or all of them,
/// when fewer are placed) with a link PDR of at least `min_pdr`.  Link
/// quality is symmetric and identical on every channel.
pub struct RandomTopology {
    pub square_side_m: f64,
    pub min_pdr:       f64,
    pub min_neighbors: u32,
    /// `(x, y)` in metres, filled by `init`.
    pub positions:     Vec<(f64, f64)>,
}

impl RandomTopology {
    pub fn from_settings(settings: &Settings) -> Self {
        RandomTopology {
            square_side_m: settings.conn_random_square_side * 1000.0,
            min_pdr:       settings.conn_random_init_min_pdr,
            min_neighbors: settings.conn_random_init_min_neighbors,
            positions:     Vec::new(),
        }
    }

    fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
        ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
    }
}

impl ConnectivityModel for RandomTopology {
    fn name(&self) -> &'static str {
        "Random"
    }

    fn init(&mut self, matrix: &mut ConnectivityMatrix, rng: &mut SimRng) -> ConnectivityResult<()> {
        let n = matrix.num_motes();
        self.positions.clear();
        // Placement uses its own stream so the run's main stream is only
        // advanced by a single draw.
        let mut place_rng = rng.child(0x7a11);

        for id in 0..n {
            let me = MoteId(id as u32);
            if id == 0 {
                let c = self.square_side_m / 2.0;
                self.positions.push((c, c));
                continue;
            }
            let required = (self.min_neighbors as usize).min(id);
            let mut placed = false;
            for _ in 0..MAX_PLACEMENT_ATTEMPTS {
                let pos = (
                    place_rng.unit() * self.square_side_m,
                    place_rng.unit() * self.square_side_m,
                );
                let links: Vec<(MoteId, Link)> = self
                    .positions
                    .iter()
                    .enumerate()
                    .map(|(j, &other)| {
                        let rssi = pister::pister_hack_rssi(Self::distance(pos, other), &mut place_rng);
                        (MoteId(j as u32), Link { pdr: pister::rssi_to_pdr(rssi), rssi })
                    })
                    .collect();
                let good = links.iter().filter(|(_, l)| l.pdr >= self.min_pdr).count();
                if good >= required {
                    for (other, link) in links {
                        matrix.set_link_all_channels(me, other, link);
                        matrix.set_link_all_channels(other, me, link);
                    }
                    self.positions.push(pos);
                    placed = true;
                    break;
                }
            }
            if !placed {
                return Err(ConnectivityError::Config(format!(
                    "could not place {me} with {required} neighbours of PDR >= {} in a {} m square",
                    self.min_pdr, self.square_side_m
                )));
            }
        }
        Ok(())
    }
}
