/// One member of a sorted set with its current score
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMember {
    pub member: String,
    pub score: f64,
}

/// How an increment treats a member that is not yet in the set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrMode {
    /// Create the member at `delta` when absent (ZINCRBY)
    Upsert,
    /// Leave the set untouched when absent (ZADD XX INCR)
    ExistingOnly,
}

/// Result of a single atomic increment
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IncrOutcome {
    /// Member was inserted with score = delta
    Created { score: f64 },
    /// Member existed; this is its score after the increment
    Updated { score: f64 },
    /// Member was absent and the mode was `ExistingOnly`
    Missing,
}
