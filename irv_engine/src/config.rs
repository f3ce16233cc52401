// ********* Input data structures ***********

use snafu::Snafu;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::stream::{NullResource, StreamError, StreamResource};

/// Candidates are referenced by their 1-based position in the contest's candidate list.
pub type CandidateId = u32;

/// One weighted ballot: a weight and the candidates in order of preference.
///
/// `choices` may be empty (an undervote). A candidate may appear more than once; only the
/// first occurrence matters.
#[derive(Eq, PartialEq, Debug, Clone, Hash, PartialOrd, Ord)]
pub struct Ballot {
    pub weight: u64,
    pub choices: Vec<CandidateId>,
}

impl Ballot {
    pub fn new(weight: u64, choices: Vec<CandidateId>) -> Ballot {
        Ballot { weight, choices }
    }

    /// The highest ranked choice that is still active, if any.
    pub fn first_active(&self, active: &BTreeSet<CandidateId>) -> Option<CandidateId> {
        self.choices.iter().find(|cid| active.contains(cid)).copied()
    }
}

/// A contest and the ballots cast in it.
///
/// The contest owns its ballots resource. The resource can be replaced as a whole (for
/// example by a normalized copy) but is never shared with another contest.
pub struct Contest {
    pub name: String,
    pub candidates: Vec<String>,
    pub seats: u32,
    /// Candidates that do not take part in the count.
    pub withdrawn: BTreeSet<CandidateId>,
    pub notes: Vec<String>,
    ballots: Box<dyn StreamResource<Ballot>>,
}

impl Contest {
    /// A contest without ballots. Its ballots resource is the read-only null resource.
    pub fn new(name: &str, candidates: Vec<String>, seats: u32) -> Contest {
        Contest {
            name: name.to_string(),
            candidates,
            seats,
            withdrawn: BTreeSet::new(),
            notes: Vec::new(),
            ballots: Box::new(NullResource),
        }
    }

    pub fn with_ballots(mut self, ballots: Box<dyn StreamResource<Ballot>>) -> Contest {
        self.ballots = ballots;
        self
    }

    pub fn with_withdrawn(mut self, withdrawn: BTreeSet<CandidateId>) -> Contest {
        self.withdrawn = withdrawn;
        self
    }

    pub fn ballots(&self) -> &dyn StreamResource<Ballot> {
        self.ballots.as_ref()
    }

    /// Swaps in a new ballots resource and hands back the previous one.
    pub fn replace_ballots(
        &mut self,
        ballots: Box<dyn StreamResource<Ballot>>,
    ) -> Box<dyn StreamResource<Ballot>> {
        std::mem::replace(&mut self.ballots, ballots)
    }

    pub fn candidate_ids(&self) -> BTreeSet<CandidateId> {
        (1..=self.candidates.len() as CandidateId).collect()
    }

    /// All the candidates that have not withdrawn.
    pub fn active_candidates(&self) -> BTreeSet<CandidateId> {
        self.candidate_ids()
            .into_iter()
            .filter(|cid| !self.withdrawn.contains(cid))
            .collect()
    }

    pub fn candidate_name(&self, cid: CandidateId) -> Option<&str> {
        let idx = (cid as usize).checked_sub(1)?;
        self.candidates.get(idx).map(|s| s.as_str())
    }
}

impl fmt::Debug for Contest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Contest")
            .field("name", &self.name)
            .field("candidates", &self.candidates)
            .field("seats", &self.seats)
            .field("withdrawn", &self.withdrawn)
            .field("notes", &self.notes)
            .finish()
    }
}

// ******** Output data structures *********

/// The totals of one round. Only the candidates active in that round appear.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct RoundResult {
    pub totals: BTreeMap<CandidateId, u64>,
}

impl RoundResult {
    /// The weight counted for some candidate in this round. Exhausted ballots are not part of it.
    pub fn total(&self) -> u64 {
        self.totals.values().sum()
    }

    pub fn majority(&self) -> u64 {
        crate::get_majority(self.total())
    }

    /// The candidates sharing the smallest total.
    pub fn lowest(&self) -> BTreeSet<CandidateId> {
        match self.totals.values().min() {
            Some(min_count) => self
                .totals
                .iter()
                .filter(|(_, count)| *count == min_count)
                .map(|(cid, _)| *cid)
                .collect(),
            None => BTreeSet::new(),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum Outcome {
    Winner(CandidateId),
    /// Several candidates share the last place and nobody has a majority.
    /// The contest is left unresolved.
    TiedLastPlace(BTreeSet<CandidateId>),
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ContestResult {
    pub rounds: Vec<RoundResult>,
    pub outcome: Outcome,
    /// The number of rounds that were counted.
    pub last_round: u32,
    /// The eliminated candidates, in order of elimination.
    pub eliminated: Vec<CandidateId>,
}

/// Errors that prevent the count from completing.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum VotingErrors {
    #[snafu(display("the contest has no active candidates"))]
    EmptyElection {},
    #[snafu(display("failed to read the ballots: {source}"))]
    Stream { source: StreamError },
    #[snafu(display("unknown candidate '{name}'"))]
    UnknownCandidate { name: String },
    #[snafu(display("candidate '{name}' is declared twice"))]
    DuplicateCandidate { name: String },
    #[snafu(display("a ballot weight must be at least 1"))]
    InvalidWeight {},
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::ListResource;

    #[test]
    fn first_active_skips_eliminated() {
        let b = Ballot::new(2, vec![3, 1, 2]);
        let active: BTreeSet<CandidateId> = [1, 2].into_iter().collect();
        assert_eq!(b.first_active(&active), Some(1));
        assert_eq!(Ballot::new(1, vec![]).first_active(&active), None);
    }

    #[test]
    fn lowest_with_ties() {
        let r = RoundResult {
            totals: [(1, 4), (2, 1), (3, 1)].into_iter().collect(),
        };
        assert_eq!(r.total(), 6);
        assert_eq!(r.majority(), 4);
        assert_eq!(r.lowest(), [2, 3].into_iter().collect());
        assert!(RoundResult::default().lowest().is_empty());
    }

    #[test]
    fn contest_candidates() {
        let contest = Contest::new("c", vec!["A".into(), "B".into(), "C".into()], 1)
            .with_withdrawn([2].into_iter().collect());
        assert_eq!(contest.active_candidates(), [1, 3].into_iter().collect());
        assert_eq!(contest.candidate_name(3), Some("C"));
        assert_eq!(contest.candidate_name(0), None);
        assert_eq!(contest.candidate_name(4), None);
    }

    #[test]
    fn replace_ballots_returns_previous() {
        let mut contest = Contest::new("c", vec!["A".into()], 1)
            .with_ballots(Box::new(ListResource::from_items(vec![Ballot::new(1, vec![1])])));
        let old = contest.replace_ballots(Box::new(ListResource::new()));
        assert_eq!(crate::stream::read_all(old.as_ref()).unwrap().len(), 1);
        assert!(crate::stream::read_all(contest.ballots()).unwrap().is_empty());
    }
}
