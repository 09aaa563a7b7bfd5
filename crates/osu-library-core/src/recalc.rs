//! Boundary to the external star-rating/loudness recalculation services.
//!
//! The engine only collects hashes whose cached values are missing and
//! hands them over once loading finishes; the computation itself runs in
//! workers this crate neither owns nor schedules, beyond being able to
//! signal an abort on reload/shutdown. Results come back through
//! [`crate::Database::apply_star_rating`] and
//! [`crate::Database::apply_loudness`].

use crate::hash::Md5Hash;

/// Receiver for recalculation batches.
pub trait RecalcNotifier: Send + Sync {
    /// Difficulties whose star rating has not been computed yet.
    fn stars_needed(&self, hashes: Vec<Md5Hash>);

    /// Difficulties whose loudness has not been computed yet.
    fn loudness_needed(&self, hashes: Vec<Md5Hash>);

    /// Stop any in-flight recalculation; called before a reload and on
    /// shutdown.
    fn abort(&self);
}

/// No-op notifier for tests and headless tools.
pub struct NullRecalcNotifier;

impl RecalcNotifier for NullRecalcNotifier {
    fn stars_needed(&self, _hashes: Vec<Md5Hash>) {}
    fn loudness_needed(&self, _hashes: Vec<Md5Hash>) {}
    fn abort(&self) {}
}
