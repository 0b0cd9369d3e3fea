// Consensus rules: the proof-of-work puzzle

mod pow;

pub use pow::{ProofOfWork, DIFFICULTY};
