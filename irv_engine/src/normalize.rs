//! Canonical form of a ballot sequence.
//!
//! Ballots with identical choices are merged by summing their weights, and the merged
//! ballots are written in increasing lexicographic order of their choices. Two ballot
//! sequences describing the same votes normalize to the same output.

use log::{debug, info};
use snafu::OptionExt;

use std::collections::BTreeMap;

use crate::config::{Ballot, CandidateId, Contest};
use crate::stream::{ListResource, StreamResource, StreamResult, WeightOverflowSnafu};

/// What a normalization pass did.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub struct NormalizeStats {
    pub ballots_read: usize,
    pub ballots_written: usize,
    pub total_weight: u64,
}

/// Reads `source` once and replaces the contents of `target` with its canonical form.
pub fn normalize<S, D>(source: &S, target: &mut D) -> StreamResult<NormalizeStats>
where
    S: StreamResource<Ballot> + ?Sized,
    D: StreamResource<Ballot> + ?Sized,
{
    let mut merged: BTreeMap<Vec<CandidateId>, u64> = BTreeMap::new();
    let mut stats = NormalizeStats::default();
    for ballot in source.read()? {
        let ballot = ballot?;
        stats.ballots_read += 1;
        stats.total_weight = stats
            .total_weight
            .checked_add(ballot.weight)
            .context(WeightOverflowSnafu {
                index: stats.ballots_read,
            })?;
        *merged.entry(ballot.choices).or_insert(0) += ballot.weight;
    }
    debug!(
        "normalize: {} ballots merged into {} distinct rankings",
        stats.ballots_read,
        merged.len()
    );

    let mut sink = target.write()?;
    for (choices, weight) in merged {
        sink.send(Ballot { weight, choices })?;
        stats.ballots_written += 1;
    }
    sink.finish()?;
    Ok(stats)
}

impl Contest {
    /// Normalizes the ballots of this contest into memory.
    pub fn normalize_ballots(&mut self) -> StreamResult<NormalizeStats> {
        self.normalize_ballots_via(Box::new(ListResource::new()))
    }

    /// Normalizes the ballots of this contest through `temp`, which then becomes the
    /// contest's ballots resource.
    ///
    /// The swap happens only after `temp` is fully written: on error the contest keeps its
    /// current ballots.
    pub fn normalize_ballots_via(
        &mut self,
        mut temp: Box<dyn StreamResource<Ballot>>,
    ) -> StreamResult<NormalizeStats> {
        let stats = normalize(self.ballots(), temp.as_mut())?;
        self.replace_ballots(temp);
        info!(
            "Normalized the ballots of {:?}: {} ballots -> {} ballots, total weight {}",
            self.name, stats.ballots_read, stats.ballots_written, stats.total_weight
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{ballot_buffer, ballot_file};
    use crate::stream::{read_all, StreamError, TextEncoding};
    use proptest::prelude::*;

    fn b(weight: u64, choices: &[CandidateId]) -> Ballot {
        Ballot::new(weight, choices.to_vec())
    }

    #[test]
    fn merges_and_sorts() {
        let source = ListResource::from_items(vec![
            b(1, &[2, 1]),
            b(2, &[1]),
            b(3, &[2, 1]),
            b(1, &[]),
            b(4, &[1, 3]),
        ]);
        let mut target = ListResource::from_items(vec![b(99, &[9])]);
        let stats = normalize(&source, &mut target).unwrap();
        assert_eq!(
            target.items(),
            &[b(1, &[]), b(2, &[1]), b(4, &[1, 3]), b(4, &[2, 1])]
        );
        assert_eq!(
            stats,
            NormalizeStats {
                ballots_read: 5,
                ballots_written: 4,
                total_weight: 11
            }
        );
    }

    #[test]
    fn in_place_swaps_the_resource() {
        let mut contest = Contest::new("c", vec!["A".into(), "B".into()], 1)
            .with_ballots(Box::new(ballot_buffer("1 2\n1 1\n1 2\n")));
        contest.normalize_ballots().unwrap();
        assert_eq!(
            read_all(contest.ballots()).unwrap(),
            vec![b(1, &[1]), b(2, &[2])]
        );
    }

    #[test]
    fn failed_normalization_leaves_the_contest_untouched() {
        let mut contest = Contest::new("c", vec!["A".into(), "B".into()], 1)
            .with_ballots(Box::new(ballot_buffer("1 2\nnot a ballot\n")));
        assert!(contest.normalize_ballots().is_err());

        let mut it = contest.ballots().read().unwrap();
        assert_eq!(it.next().unwrap().unwrap(), b(1, &[2]));
        assert!(it.next().unwrap().is_err());
    }

    #[test]
    fn overflowing_weights_are_rejected() {
        let source = ballot_buffer("18446744073709551615 1\n1 1\n");
        let mut target = ListResource::from_items(vec![b(7, &[2])]);
        let err = normalize(&source, &mut target).unwrap_err();
        assert!(matches!(err, StreamError::WeightOverflow { index: 2 }));
        // The target is only opened once every ballot has been read.
        assert_eq!(target.items(), &[b(7, &[2])]);
    }

    #[test]
    fn file_backed_swap() {
        let dir = tempfile::tempdir().unwrap();

        let mut contest = Contest::new("c", vec!["A".into(), "B".into()], 1)
            .with_ballots(Box::new(ballot_buffer("1 2\n1 1\n1 2\n")));
        let temp = ballot_file(dir.path().join("normalized.ballots"), TextEncoding::Utf8);
        let stats = contest.normalize_ballots_via(Box::new(temp)).unwrap();
        assert_eq!(stats.ballots_written, 2);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("normalized.ballots")).unwrap(),
            "1 1\n2 2\n"
        );
        // The contest now reads the file.
        std::fs::write(dir.path().join("normalized.ballots"), "5 1\n").unwrap();
        assert_eq!(read_all(contest.ballots()).unwrap(), vec![b(5, &[1])]);

        let mut contest = Contest::new("c", vec!["A".into(), "B".into()], 1)
            .with_ballots(Box::new(ballot_buffer("1 2\nnot a ballot\n")));
        let temp = ballot_file(dir.path().join("failed.ballots"), TextEncoding::Utf8);
        let err = contest.normalize_ballots_via(Box::new(temp)).unwrap_err();
        assert_eq!(err.item_index(), Some(2));
        assert!(!dir.path().join("failed.ballots").exists());
        // Still the original buffer, with its broken second line.
        let mut it = contest.ballots().read().unwrap();
        assert_eq!(it.next().unwrap().unwrap(), b(1, &[2]));
        assert!(matches!(
            it.next().unwrap().unwrap_err().root_cause(),
            StreamError::Decode { .. }
        ));
    }

    fn ballots_strategy() -> impl Strategy<Value = Vec<Ballot>> {
        prop::collection::vec(
            (1u64..20, prop::collection::vec(1u32..6, 0..5)).prop_map(|(w, c)| Ballot::new(w, c)),
            0..40,
        )
    }

    proptest! {
        #[test]
        fn preserves_weight_and_orders_strictly(ballots in ballots_strategy()) {
            let input_weight: u64 = ballots.iter().map(|b| b.weight).sum();
            let source = ListResource::from_items(ballots);
            let mut target = ListResource::new();
            normalize(&source, &mut target).unwrap();

            let out = target.items();
            let output_weight: u64 = out.iter().map(|b| b.weight).sum();
            prop_assert_eq!(input_weight, output_weight);
            for pair in out.windows(2) {
                prop_assert!(pair[0].choices < pair[1].choices);
            }
        }

        #[test]
        fn normalizing_twice_changes_nothing(ballots in ballots_strategy()) {
            let source = ListResource::from_items(ballots);
            let mut once = ListResource::new();
            normalize(&source, &mut once).unwrap();
            let mut twice = ListResource::new();
            normalize(&once, &mut twice).unwrap();
            prop_assert_eq!(once, twice);
        }
    }
}
