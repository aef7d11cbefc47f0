use thiserror::Error;

use crate::utils::alloc::{checked_calloc, AllocError};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatherError {
    #[error("Allocation failed: {0}")]
    Alloc(#[from] AllocError),
    #[error("Gather buffer received incorrect rank number {0} of {1}")]
    RankOverflow(usize, usize),
    #[error("Gather buffer received duplicate check-in from rank {0}")]
    DuplicatedCheckIn(usize),
    #[error("Gather buffer is missing the contribution of rank {0}")]
    MissingCheckIn(usize),
}

/// Shared buffer of an all-gather round, one slot per rank.
///
/// Ranks contribute through a [`GatherSlot`], which only reaches the
/// caller's own slot. Once every rank has contributed the buffer is
/// turned into the gathered vector with [`AllGatherBuffer::complete`].
pub struct AllGatherBuffer<T> {
    slots: Vec<Option<T>>,
}

impl<T> AllGatherBuffer<T> {
    pub fn new(num_ranks: usize) -> Result<Self, GatherError> {
        let slots = checked_calloc(num_ranks)?;
        Ok(AllGatherBuffer { slots })
    }

    #[inline]
    pub fn num_ranks(&self) -> usize {
        self.slots.len()
    }

    pub fn has_contributed(&self, rank: usize) -> bool {
        self.slots.get(rank).map_or(false, Option::is_some)
    }

    pub fn slot(&mut self, rank: usize) -> Result<GatherSlot<'_, T>, GatherError> {
        let num_ranks = self.slots.len();
        let slot = self
            .slots
            .get_mut(rank)
            .ok_or(GatherError::RankOverflow(rank, num_ranks))?;
        Ok(GatherSlot { rank, slot })
    }

    pub fn complete(self) -> Result<Vec<T>, GatherError> {
        self.slots
            .into_iter()
            .enumerate()
            .map(|(rank, slot)| slot.ok_or(GatherError::MissingCheckIn(rank)))
            .collect()
    }
}

pub struct GatherSlot<'a, T> {
    rank: usize,
    slot: &'a mut Option<T>,
}

impl<'a, T> GatherSlot<'a, T> {
    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn publish(self, value: T) -> Result<(), GatherError> {
        if self.slot.is_some() {
            return Err(GatherError::DuplicatedCheckIn(self.rank));
        }
        *self.slot = Some(value);
        log::trace!("Gather buffer received check-in from rank {}", self.rank);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gathers_in_any_order() {
        let mut buf = AllGatherBuffer::new(3).unwrap();
        for rank in [2, 0, 1] {
            buf.slot(rank).unwrap().publish(rank * 10).unwrap();
        }
        assert!(buf.has_contributed(1));
        assert_eq!(buf.complete().unwrap(), vec![0, 10, 20]);
    }

    #[test]
    fn rejects_duplicates_and_overflow() {
        let mut buf = AllGatherBuffer::new(2).unwrap();
        buf.slot(0).unwrap().publish("a").unwrap();
        assert_eq!(
            buf.slot(0).unwrap().publish("b"),
            Err(GatherError::DuplicatedCheckIn(0))
        );
        assert!(matches!(buf.slot(2), Err(GatherError::RankOverflow(2, 2))));
        assert!(!buf.has_contributed(5));
    }

    #[test]
    fn incomplete_buffer_reports_missing_rank() {
        let mut buf = AllGatherBuffer::new(3).unwrap();
        buf.slot(0).unwrap().publish(()).unwrap();
        buf.slot(2).unwrap().publish(()).unwrap();
        assert_eq!(buf.complete(), Err(GatherError::MissingCheckIn(1)));
    }
}
