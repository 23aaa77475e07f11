//! Floating emoji bursts.
//!
//! Particle parameters are drawn once when a burst starts and never change
//! afterwards; the random source is injected so bursts are reproducible.

use crate::story::NormalizedPosition;
use rand::Rng;

/// Particles added per outstanding reaction in an accumulated burst.
const PARTICLES_PER_REACTION: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BurstKind {
    /// A viewer's own tap.
    Live,
    /// The author's summary of reactions received since last acknowledged.
    Accumulated { reactions: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    /// Horizontal start, normalized to the display width.
    pub x: f32,
    pub delay_ms: u32,
    pub duration_ms: u32,
    /// Sideways drift over the particle's lifetime.
    pub drift_px: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Burst {
    pub item_id: String,
    pub symbol: String,
    pub kind: BurstKind,
    pub particles: Vec<Particle>,
}

impl Burst {
    /// Fixed-size burst rising from `origin`.
    pub fn live<R: Rng + ?Sized>(
        item_id: &str,
        symbol: &str,
        origin: NormalizedPosition,
        count: usize,
        rng: &mut R,
    ) -> Self {
        let particles = (0..count)
            .map(|_| Particle {
                x: (origin.x + rng.gen_range(-0.08..0.08)).clamp(0.0, 1.0),
                delay_ms: rng.gen_range(0..300),
                duration_ms: rng.gen_range(1_200..1_800),
                drift_px: rng.gen_range(-30.0..30.0),
            })
            .collect();
        Self {
            item_id: item_id.to_string(),
            symbol: symbol.to_string(),
            kind: BurstKind::Live,
            particles,
        }
    }

    /// Burst spread across the width, sized by `reactions` up to `max_particles`.
    pub fn accumulated<R: Rng + ?Sized>(
        item_id: &str,
        symbol: &str,
        reactions: u32,
        max_particles: usize,
        rng: &mut R,
    ) -> Self {
        let count = (reactions as usize)
            .saturating_mul(PARTICLES_PER_REACTION)
            .clamp(1, max_particles.max(1));
        let particles = (0..count)
            .map(|_| Particle {
                x: rng.gen_range(0.1..0.9),
                delay_ms: rng.gen_range(0..800),
                duration_ms: rng.gen_range(1_500..2_500),
                drift_px: rng.gen_range(-50.0..50.0),
            })
            .collect();
        Self {
            item_id: item_id.to_string(),
            symbol: symbol.to_string(),
            kind: BurstKind::Accumulated { reactions },
            particles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn live_burst_has_fixed_count_in_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let burst = Burst::live("s1", "🔥", NormalizedPosition { x: 0.98, y: 0.5 }, 10, &mut rng);
        assert_eq!(burst.particles.len(), 10);
        assert!(burst.particles.iter().all(|p| (0.0..=1.0).contains(&p.x)));
        assert!(burst.particles.iter().all(|p| p.delay_ms < 300));
    }

    #[test]
    fn same_seed_same_burst() {
        let a = Burst::live("s1", "❤", NormalizedPosition::default(), 10, &mut StdRng::seed_from_u64(3));
        let b = Burst::live("s1", "❤", NormalizedPosition::default(), 10, &mut StdRng::seed_from_u64(3));
        assert_eq!(a, b);
    }

    #[test]
    fn accumulated_burst_scales_and_caps() {
        let mut rng = StdRng::seed_from_u64(1);
        let seven = Burst::accumulated("s1", "🔥", 7, 30, &mut rng);
        assert_eq!(seven.particles.len(), 14);
        assert_eq!(seven.kind, BurstKind::Accumulated { reactions: 7 });

        let many = Burst::accumulated("s1", "🔥", 500, 30, &mut rng);
        assert_eq!(many.particles.len(), 30);
    }
}
