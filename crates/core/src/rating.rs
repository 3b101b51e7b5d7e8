//! Incremental rating-aggregate arithmetic.
//!
//! Every title carries `(average_rating, rating_count)`, kept equal to the
//! mean and count of the reviews currently attached to it. The aggregate is
//! adjusted by the delta of each write instead of being recomputed from the
//! review rows.

/// Inclusive rating bounds. Zero means "unrated" and is never stored.
pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 10;

/// Returns true when `rating` may be attached to a review.
pub fn is_valid_rating(rating: i32) -> bool {
    (MIN_RATING..=MAX_RATING).contains(&rating)
}

/// The `(average, count)` pair maintained per title.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RatingAggregate {
    pub average: f64,
    pub count: i64,
}

impl RatingAggregate {
    pub fn new(average: f64, count: i64) -> Self {
        Self { average, count }
    }

    /// A newly created review joins the aggregate: count rises by one and
    /// the average absorbs the new rating.
    pub fn apply_create(self, rating: i32) -> Self {
        let count = self.count + 1;
        Self {
            average: (self.average * self.count as f64 + rating as f64) / count as f64,
            count,
        }
    }

    /// An edited rating shifts the average by the difference only. The
    /// count must not move. A zero count cannot happen for a real update
    /// (the review being edited exists) but is pinned to 0.0 anyway.
    pub fn apply_update(self, old_rating: i32, new_rating: i32) -> Self {
        if self.count == 0 {
            return Self::default();
        }
        Self {
            average: (self.average * self.count as f64 + (new_rating - old_rating) as f64)
                / self.count as f64,
            count: self.count,
        }
    }

    /// A deleted review leaves the aggregate: count drops by one, and
    /// removing the last review resets the average to zero.
    pub fn apply_delete(self, rating: i32) -> Self {
        let count = self.count - 1;
        if count <= 0 {
            return Self::default();
        }
        Self {
            average: (self.average * self.count as f64 - rating as f64) / count as f64,
            count,
        }
    }
}
