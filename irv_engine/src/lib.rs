/*!
Instant-runoff tabulation over streamed, weighted ballots.

Ballots live in a [stream::StreamResource]: a reopenable sequence backed by memory, a file or
a text buffer. The count reads the ballots once per round, credits each ballot to its highest
ranked active candidate, and stops as soon as a candidate holds a majority of the counted
weight. Otherwise the candidate with the lowest total is eliminated. When several candidates
share the lowest total, the contest is reported as a tie: no tie-break is applied.

```
use irv_engine::{run_election, Ballot, Contest, Outcome};
use irv_engine::stream::ListResource;

let ballots = ListResource::from_items(vec![
    Ballot::new(3, vec![1, 2]),
    Ballot::new(4, vec![2]),
    Ballot::new(2, vec![3, 1]),
]);
let contest = Contest::new("Mayor", vec!["Anna".into(), "Bob".into(), "Clara".into()], 1)
    .with_ballots(Box::new(ballots));

let result = run_election(&contest)?;
assert_eq!(result.outcome, Outcome::Winner(1));
assert_eq!(result.last_round, 2);
# Ok::<(), irv_engine::VotingErrors>(())
```
*/

mod config;

pub mod blt;
pub mod builder;
pub mod codec;
pub mod manual;
pub mod normalize;
pub mod stream;

use log::{debug, info, warn};
use snafu::{OptionExt, ResultExt};

use std::collections::{BTreeMap, BTreeSet};

pub use crate::config::*;
use crate::stream::{StreamResource, StreamResult, WeightOverflowSnafu};

/// The smallest total that is a strict majority of `total`.
pub fn get_majority(total: u64) -> u64 {
    total / 2 + 1
}

/// Counts one round.
///
/// Every ballot goes, with its full weight, to its highest ranked candidate in `active`.
/// Ballots without any active candidate are exhausted and not counted.
pub fn tabulate_round<S>(active: &BTreeSet<CandidateId>, ballots: &S) -> StreamResult<RoundResult>
where
    S: StreamResource<Ballot> + ?Sized,
{
    let mut totals: BTreeMap<CandidateId, u64> = active.iter().map(|cid| (*cid, 0)).collect();
    // Every single total is bounded by `counted`, so checking it is enough.
    let mut counted: u64 = 0;
    let mut exhausted: u64 = 0;
    for (idx, ballot) in ballots.read()?.enumerate() {
        let ballot = ballot?;
        match ballot.first_active(active).and_then(|cid| totals.get_mut(&cid)) {
            Some(count) => {
                counted = counted
                    .checked_add(ballot.weight)
                    .context(WeightOverflowSnafu { index: idx + 1 })?;
                *count += ballot.weight;
            }
            None => exhausted = exhausted.saturating_add(ballot.weight),
        }
    }
    debug!(
        "tabulate_round: totals: {:?} exhausted: {}",
        totals, exhausted
    );
    Ok(RoundResult { totals })
}

/// The state of a count between two rounds.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum CountState {
    /// The count goes on with these candidates.
    Counting(BTreeSet<CandidateId>),
    Winner(CandidateId),
    /// Unresolved: these candidates share the last place.
    Tie(BTreeSet<CandidateId>),
}

impl CountState {
    /// The state after a round counted over `active`.
    ///
    /// A candidate reaching the majority threshold wins. If several did, the lowest id is
    /// taken, although two totals above half of their sum cannot coexist. A lone active
    /// candidate wins even below the threshold. Otherwise a single last-placed candidate is
    /// eliminated, and several last-placed candidates end the count as a tie.
    pub fn after_round(active: &BTreeSet<CandidateId>, round: &RoundResult) -> CountState {
        let majority = round.majority();
        if let Some((cid, _)) = round.totals.iter().find(|(_, count)| **count >= majority) {
            return CountState::Winner(*cid);
        }
        if active.len() == 1 {
            if let Some(cid) = active.iter().next() {
                return CountState::Winner(*cid);
            }
        }
        let lowest = round.lowest();
        if lowest.len() == 1 {
            let remaining: BTreeSet<CandidateId> = active.difference(&lowest).cloned().collect();
            CountState::Counting(remaining)
        } else {
            CountState::Tie(lowest)
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, CountState::Counting(_))
    }
}

/// Runs the instant-runoff count of a contest.
///
/// Each round reads the contest's ballots again. Any error while reading them aborts the
/// count.
pub fn run_election(contest: &Contest) -> Result<ContestResult, VotingErrors> {
    let active = contest.active_candidates();
    info!(
        "Processing contest {:?}: {} candidates, {} withdrawn",
        contest.name,
        contest.candidates.len(),
        contest.withdrawn.len()
    );
    if active.is_empty() {
        return EmptyElectionSnafu {}.fail();
    }
    if contest.seats != 1 {
        warn!(
            "Contest {:?} declares {} seats: counting a single winner",
            contest.name, contest.seats
        );
    }
    for cid in active.iter() {
        info!("Candidate: {}: {}", cid, contest.candidate_name(*cid).unwrap_or("?"));
    }

    let mut rounds: Vec<RoundResult> = Vec::new();
    let mut eliminated: Vec<CandidateId> = Vec::new();
    let mut state = CountState::Counting(active);

    while let CountState::Counting(active) = &state {
        let round_id = rounds.len() + 1;
        let round = tabulate_round(active, contest.ballots()).context(StreamSnafu {})?;
        info!(
            "Round {} (winning threshold: {}, counted: {})",
            round_id,
            round.majority(),
            round.total()
        );
        for (cid, count) in round.totals.iter() {
            info!("    {} {}", count, contest.candidate_name(*cid).unwrap_or("?"));
        }

        let next = CountState::after_round(active, &round);
        if let CountState::Counting(remaining) = &next {
            assert!(
                remaining.len() < active.len(),
                "The number of candidates did not decrease: {:?} -> {:?}",
                active,
                remaining
            );
            eliminated.extend(active.difference(remaining).cloned());
        }
        debug!("run_election: round {}: {:?} -> {:?}", round_id, state, next);
        rounds.push(round);
        state = next;
    }

    let outcome = match state {
        CountState::Winner(cid) => {
            info!("Elected: {}", contest.candidate_name(cid).unwrap_or("?"));
            Outcome::Winner(cid)
        }
        CountState::Tie(tied) => {
            info!("Unresolved tie for the last place between {:?}", tied);
            Outcome::TiedLastPlace(tied)
        }
        CountState::Counting(_) => unreachable!("the count loop only exits on a terminal state"),
    };

    Ok(ContestResult {
        last_round: rounds.len() as u32,
        rounds,
        outcome,
        eliminated,
    })
}
