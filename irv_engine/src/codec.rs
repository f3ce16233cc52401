//! The canonical ballot line format: `WEIGHT CHOICE1 CHOICE2 ...`, one ballot per line.

use std::fmt;
use std::path::PathBuf;

use crate::config::{Ballot, CandidateId};
use crate::stream::{
    BufferResource, ConvertingResource, FileResource, StreamError, StreamResult, TextEncoding,
};

/// Ballots stored as canonical lines in a text file.
pub type BallotFile = ConvertingResource<FileResource, String, Ballot>;

/// Ballots stored as canonical lines in a string.
pub type BallotBuffer = ConvertingResource<BufferResource, String, Ballot>;

impl fmt::Display for Ballot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.weight)?;
        for cid in self.choices.iter() {
            write!(f, " {}", cid)?;
        }
        Ok(())
    }
}

fn decode_error(line: &str, reason: String) -> StreamError {
    StreamError::Decode {
        line: line.to_string(),
        reason,
    }
}

/// Parses one canonical ballot line. Surrounding whitespace is ignored.
pub fn decode_ballot(line: &str) -> StreamResult<Ballot> {
    let mut tokens = line.split_whitespace();
    let weight_tok = tokens
        .next()
        .ok_or_else(|| decode_error(line, "empty line".to_string()))?;
    let weight: u64 = weight_tok.parse().map_err(|_| {
        decode_error(
            line,
            format!("weight '{}' is not a non-negative integer", weight_tok),
        )
    })?;
    if weight == 0 {
        return Err(decode_error(line, "weight must be at least 1".to_string()));
    }

    let mut choices: Vec<CandidateId> = Vec::new();
    for tok in tokens {
        let cid: CandidateId = tok.parse().map_err(|_| {
            decode_error(line, format!("choice '{}' is not a candidate id", tok))
        })?;
        if cid == 0 {
            return Err(decode_error(line, "candidate ids start at 1".to_string()));
        }
        choices.push(cid);
    }
    Ok(Ballot { weight, choices })
}

pub fn encode_ballot(ballot: &Ballot) -> String {
    ballot.to_string()
}

fn decode_owned(line: String) -> StreamResult<Ballot> {
    decode_ballot(&line)
}

/// Ballots read from and written to a text file in the canonical line format.
pub fn ballot_file(path: impl Into<PathBuf>, encoding: TextEncoding) -> BallotFile {
    ConvertingResource::new(FileResource::new(path, encoding), decode_owned, encode_ballot)
}

/// Ballots held in memory in the canonical line format.
pub fn ballot_buffer(text: &str) -> BallotBuffer {
    ConvertingResource::new(BufferResource::from_text(text), decode_owned, encode_ballot)
}
