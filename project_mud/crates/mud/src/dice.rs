use std::collections::VecDeque;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Source of randomness for combat and creature behavior.
pub trait Dice: Send + Sync {
    /// Roll one die: a value in `1..=sides`.
    fn roll(&self, sides: u32) -> u32;

    /// Pick an index in `0..n`. `n` must be non-zero.
    fn pick(&self, n: usize) -> usize;

    fn d20(&self) -> i32 {
        self.roll(20) as i32
    }
}

/// `StdRng`-backed dice shared by every task.
pub struct RandomDice {
    rng: Mutex<StdRng>,
}

impl RandomDice {
    pub fn from_os_rng() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Dice for RandomDice {
    fn roll(&self, sides: u32) -> u32 {
        self.rng.lock().random_range(1..=sides.max(1))
    }

    fn pick(&self, n: usize) -> usize {
        self.rng.lock().random_range(0..n.max(1))
    }
}

/// Dice that replay a fixed script, then fall back to a constant.
/// `pick` consumes from the same script (value taken modulo `n`).
pub struct ScriptedDice {
    script: Mutex<VecDeque<u32>>,
    fallback: u32,
}

impl ScriptedDice {
    pub fn new(script: impl IntoIterator<Item = u32>, fallback: u32) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback,
        }
    }

    /// Every roll returns `value`.
    pub fn constant(value: u32) -> Self {
        Self::new([], value)
    }

    pub fn push(&self, value: u32) {
        self.script.lock().push_back(value);
    }

    fn next(&self) -> u32 {
        self.script.lock().pop_front().unwrap_or(self.fallback)
    }
}

impl Dice for ScriptedDice {
    fn roll(&self, sides: u32) -> u32 {
        self.next().clamp(1, sides.max(1))
    }

    fn pick(&self, n: usize) -> usize {
        self.next() as usize % n.max(1)
    }
}

/// `count`d`sides` + `bonus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceSpec {
    pub count: u32,
    pub sides: u32,
    pub bonus: i32,
}

impl DiceSpec {
    pub const fn new(count: u32, sides: u32, bonus: i32) -> Self {
        Self { count, sides, bonus }
    }

    pub fn roll(&self, dice: &dyn Dice) -> i32 {
        let total: i32 = (0..self.count).map(|_| dice.roll(self.sides) as i32).sum();
        total + self.bonus
    }
}

impl std::fmt::Display for DiceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.bonus {
            0 => write!(f, "{}d{}", self.count, self.sides),
            b if b > 0 => write!(f, "{}d{}+{}", self.count, self.sides, b),
            b => write!(f, "{}d{}{}", self.count, self.sides, b),
        }
    }
}

/// Ability score modifier: `(score - 10) / 2`, rounded down.
pub fn modifier(score: i32) -> i32 {
    (score - 10).div_euclid(2)
}
