use log::debug;

use std::collections::BTreeSet;

pub use crate::config::*;
use crate::stream::ListResource;

/// A builder for a contest held in memory, with candidates and ballots given by name.
///
/// ```
/// pub use irv_engine::builder::Builder;
/// # use irv_engine::{run_election, Outcome, VotingErrors};
///
/// let mut builder = Builder::new("Mayor")
///     .candidates(&["Anna".to_string(), "Bob".to_string(), "Clara".to_string()])?;
///
/// builder.add_vote(&["Anna".to_string(), "Bob".to_string()], 3)?;
/// builder.add_vote(&["Bob".to_string()], 4)?;
/// builder.add_vote_simple(&["Clara".to_string(), "".to_string(), "Anna".to_string()])?;
/// builder.add_vote_simple(&["Clara".to_string(), "Anna".to_string()])?;
///
/// let contest = builder.build();
/// let result = run_election(&contest)?;
/// assert_eq!(result.outcome, Outcome::Winner(1));
///
/// # Ok::<(), VotingErrors>(())
/// ```
pub struct Builder {
    pub(crate) _name: String,
    pub(crate) _candidates: Vec<String>,
    pub(crate) _seats: u32,
    pub(crate) _withdrawn: BTreeSet<CandidateId>,
    pub(crate) _ballots: Vec<Ballot>,
}

impl Builder {
    pub fn new(name: &str) -> Builder {
        Builder {
            _name: name.to_string(),
            _candidates: Vec::new(),
            _seats: 1,
            _withdrawn: BTreeSet::new(),
            _ballots: Vec::new(),
        }
    }

    /// Declares the candidates. Their ids follow the order of `cands`, starting at 1.
    pub fn candidates(self, cands: &[String]) -> Result<Builder, VotingErrors> {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for name in cands {
            if !seen.insert(name.as_str()) {
                return DuplicateCandidateSnafu { name }.fail();
            }
        }
        Ok(Builder {
            _candidates: cands.to_vec(),
            _withdrawn: BTreeSet::new(),
            _ballots: Vec::new(),
            ..self
        })
    }

    pub fn seats(self, seats: u32) -> Builder {
        Builder {
            _seats: seats,
            ..self
        }
    }

    /// Marks a declared candidate as withdrawn.
    pub fn withdraw(&mut self, name: &str) -> Result<(), VotingErrors> {
        let cid = self.lookup(name)?;
        self._withdrawn.insert(cid);
        Ok(())
    }

    /// Adds a ballot with a weight of 1.
    pub fn add_vote_simple(&mut self, candidates: &[String]) -> Result<(), VotingErrors> {
        self.add_vote(candidates, 1)
    }

    /// Adds a ballot, with a weight attached to it.
    ///
    /// candidates: the names chosen by the voter, in order. Empty names are blank choices and
    /// are skipped. Names may repeat.
    pub fn add_vote(&mut self, candidates: &[String], count: u64) -> Result<(), VotingErrors> {
        if count == 0 {
            return InvalidWeightSnafu {}.fail();
        }
        let mut choices: Vec<CandidateId> = Vec::new();
        for name in candidates.iter().filter(|s| !s.is_empty()) {
            choices.push(self.lookup(name)?);
        }
        self._ballots.push(Ballot {
            weight: count,
            choices,
        });
        Ok(())
    }

    /// The contest, with its ballots in a [ListResource].
    pub fn build(self) -> Contest {
        debug!(
            "build: {}: {} candidates, {} ballots",
            self._name,
            self._candidates.len(),
            self._ballots.len()
        );
        Contest::new(&self._name, self._candidates, self._seats)
            .with_withdrawn(self._withdrawn)
            .with_ballots(Box::new(ListResource::from_items(self._ballots)))
    }

    fn lookup(&self, name: &str) -> Result<CandidateId, VotingErrors> {
        match self._candidates.iter().position(|c| c == name) {
            Some(idx) => Ok(idx as CandidateId + 1),
            None => UnknownCandidateSnafu { name }.fail(),
        }
    }
}
