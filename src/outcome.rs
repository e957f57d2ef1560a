//! Outcome resolution for one round

/// Result of a round, relative to argument order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Draw,
    FirstWins,
    SecondWins,
}

/// Directional "beats" relation: rock > scissors > paper > rock
const BEATS: [(&str, &str); 3] = [("rock", "scissors"), ("scissors", "paper"), ("paper", "rock")];

/// Resolve two move tokens
///
/// Equal tokens draw. Otherwise the first token wins only if it beats the
/// second; in every other case the second wins, including when either token
/// is not a known move.
pub fn resolve(first: &str, second: &str) -> Outcome {
    if first == second {
        Outcome::Draw
    } else if BEATS.iter().any(|&(a, b)| a == first && b == second) {
        Outcome::FirstWins
    } else {
        Outcome::SecondWins
    }
}
