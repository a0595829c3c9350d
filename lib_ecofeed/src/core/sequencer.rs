//! Per-epoch sequence tracking.
//!
//! Sequence ids are only comparable inside one epoch. A new epoch forgets the
//! previous high-water mark, so the producer is free to restart its counter.

/// Verdict for one inbound sequence id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Deliver it. `starts_epoch` is true for the first event of the epoch.
    Accepted {
        /// First accepted id of the epoch.
        starts_epoch: bool,
    },
    /// Same id as the last delivered event.
    Duplicate,
    /// Lower than the last delivered id.
    OutOfOrder,
}

/// Tracks the current epoch and its last delivered sequence id.
#[derive(Debug, Default)]
pub struct Sequencer {
    epoch: u64,
    last_delivered: Option<u64>,
}

impl Sequencer {
    /// Creates a sequencer positioned before the first epoch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new epoch and returns its number (1-based).
    pub fn begin_epoch(&mut self) -> u64 {
        self.epoch += 1;
        self.last_delivered = None;
        self.epoch
    }

    /// Current epoch number. Zero before the first `begin_epoch`.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Decides whether `sequence_id` can be delivered and records it if so.
    pub fn admit(&mut self, sequence_id: u64) -> Admission {
        match self.last_delivered {
            None => {
                self.last_delivered = Some(sequence_id);
                Admission::Accepted { starts_epoch: true }
            }
            Some(last) if sequence_id > last => {
                self.last_delivered = Some(sequence_id);
                Admission::Accepted { starts_epoch: false }
            }
            Some(last) if sequence_id == last => Admission::Duplicate,
            Some(_) => Admission::OutOfOrder,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enforces_increasing_ids_within_epoch() {
        let mut seq = Sequencer::new();
        assert_eq!(seq.begin_epoch(), 1);
        assert_eq!(seq.admit(5), Admission::Accepted { starts_epoch: true });
        assert_eq!(seq.admit(6), Admission::Accepted { starts_epoch: false });
        assert_eq!(seq.admit(6), Admission::Duplicate);
        assert_eq!(seq.admit(2), Admission::OutOfOrder);
        assert_eq!(seq.admit(9), Admission::Accepted { starts_epoch: false });
    }

    #[test]
    fn new_epoch_allows_counter_reset() {
        let mut seq = Sequencer::new();
        seq.begin_epoch();
        seq.admit(40);
        assert_eq!(seq.begin_epoch(), 2);
        assert_eq!(seq.admit(1), Admission::Accepted { starts_epoch: true });
        assert_eq!(seq.epoch(), 2);
    }
}
