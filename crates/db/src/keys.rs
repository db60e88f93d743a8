use std::fmt;

use clap::ValueEnum;
use hash_index::SearchKey;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const DEFAULT_SEED: u64 = 0x1d8e_2003;

const EMAIL_MIDDLES: [&str; 4] = ["kid", "grrl", "pie", "izzle"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KeyKind {
    Integer,
    Float,
    String,
}

impl KeyKind {
    pub const ALL: [KeyKind; 3] = [KeyKind::Integer, KeyKind::Float, KeyKind::String];
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyKind::Integer => "integer",
            KeyKind::Float => "float",
            KeyKind::String => "string",
        };
        f.write_str(name)
    }
}

/// Deterministic key stream. Rebuilding a generator from the same seed
/// replays the same keys, which is how later phases find what the build
/// phase inserted.
pub struct KeyGenerator {
    rng: StdRng,
}

impl KeyGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn next_key(&mut self, kind: KeyKind) -> SearchKey {
        match kind {
            KeyKind::Integer => SearchKey::Integer(self.rng.gen_range(i32::MIN..=i32::MAX)),
            KeyKind::Float => SearchKey::Float(self.rng.gen_range(0.0f32..1.0)),
            KeyKind::String => SearchKey::String(self.email()),
        }
    }

    /// Letters, a silly middle, some digits, then a made-up `.edu` domain.
    pub fn email(&mut self) -> String {
        let mut email = self.letters(4..=8);
        email.push_str(EMAIL_MIDDLES[self.rng.gen_range(0..EMAIL_MIDDLES.len())]);
        for _ in 0..self.rng.gen_range(2..=5) {
            email.push(char::from(b'0' + self.rng.gen_range(0..10u8)));
        }
        email.push('@');
        email.push_str(&self.letters(4..=19));
        email.push_str(".edu");
        email
    }

    fn letters(&mut self, len: std::ops::RangeInclusive<usize>) -> String {
        let len = self.rng.gen_range(len);
        (0..len)
            .map(|_| char::from(b'a' + self.rng.gen_range(0..26u8)))
            .collect()
    }
}
