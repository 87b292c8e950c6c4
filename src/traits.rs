/// Progress indicator
pub trait Progress {
    /// Advance by `i` steps
    fn inc(&self, i: u64);

    /// Mark as done
    fn finish(&self);
}

/// Per-event weight as a function of a discriminant score
pub trait ScoreWeight {
    /// Weight for an event with the given score
    fn weight(&self, score: f64) -> f64;
}

impl<T: ScoreWeight + ?Sized> ScoreWeight for &T {
    fn weight(&self, score: f64) -> f64 {
        (**self).weight(score)
    }
}
