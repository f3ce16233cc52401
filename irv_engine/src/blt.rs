//! Reading and writing contests in the BLT format.
//!
//! ```text
//! 3 1          <- number of candidates, number of seats
//! -2           <- optional: withdrawn candidates, as negative ids
//! 3 1 2 0      <- weight, choices, terminating 0
//! 4 2 0
//! 2 3 1 0
//! 0            <- end of the ballots
//! "Anna"       <- one quoted name per candidate
//! "Bob"
//! "Clara"
//! "Mayor"      <- the quoted contest name
//! ```

use log::debug;
use snafu::{prelude::*, Snafu};

use std::collections::BTreeSet;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use crate::config::{Ballot, CandidateId, Contest};
use crate::stream::{FileResource, StreamError, StreamResource, TextEncoding};

#[derive(Debug, Snafu)]
pub enum BltError {
    #[snafu(display("I/O error on BLT data: {source}"))]
    Io { source: std::io::Error },
    #[snafu(display("line {lineno}: cannot decode '{line}': {reason}"))]
    Decode {
        lineno: usize,
        line: String,
        reason: String,
    },
    #[snafu(display("line {lineno}: malformed input '{line}': {reason}"))]
    MalformedInput {
        lineno: usize,
        line: String,
        reason: String,
    },
    #[snafu(display("failed to transfer the ballots: {source}"))]
    Stream { source: StreamError },
}

pub type BltResult<T> = Result<T, BltError>;

fn malformed<T>(lineno: usize, line: &str, reason: impl Into<String>) -> BltResult<T> {
    MalformedInputSnafu {
        lineno,
        line,
        reason: reason.into(),
    }
    .fail()
}

// Non-blank lines of the input, with their 1-based line numbers.
struct BltLines<I> {
    lines: I,
    lineno: usize,
}

impl<I: Iterator<Item = BltResult<String>>> BltLines<I> {
    fn next_content(&mut self) -> BltResult<Option<(usize, String)>> {
        loop {
            match self.lines.next() {
                None => return Ok(None),
                Some(line) => {
                    self.lineno += 1;
                    let line = line?;
                    if !line.trim().is_empty() {
                        return Ok(Some((self.lineno, line)));
                    }
                }
            }
        }
    }

    fn expect_content(&mut self, what: &str) -> BltResult<(usize, String)> {
        match self.next_content()? {
            Some(p) => Ok(p),
            None => malformed(
                self.lineno,
                "",
                format!("unexpected end of input, expected {}", what),
            ),
        }
    }
}

fn parse_ints(lineno: usize, line: &str) -> BltResult<Vec<i64>> {
    line.split_whitespace()
        .map(|tok| {
            tok.parse::<i64>().map_err(|_| BltError::Decode {
                lineno,
                line: line.to_string(),
                reason: format!("'{}' is not an integer", tok),
            })
        })
        .collect()
}

fn parse_quoted(lineno: usize, line: &str) -> BltResult<String> {
    let trimmed = line.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        Ok(trimmed[1..trimmed.len() - 1].to_string())
    } else {
        malformed(lineno, line, "expected a double-quoted string")
    }
}

fn candidate_id(lineno: usize, line: &str, value: i64, num_candidates: usize) -> BltResult<CandidateId> {
    if value >= 1 && value as usize <= num_candidates {
        Ok(value as CandidateId)
    } else {
        malformed(
            lineno,
            line,
            format!("{} is not a candidate (1..={})", value, num_candidates),
        )
    }
}

/// Reads a BLT contest from `input`.
///
/// The ballot rows are written to `ballots` as they are read, and `ballots` becomes the
/// contest's ballots resource. Errors are not recovered: the first one stops the reading.
pub fn read_blt<R: BufRead>(
    input: R,
    ballots: Box<dyn StreamResource<Ballot>>,
) -> BltResult<Contest> {
    read_blt_lines(input.lines().map(|l| l.context(IoSnafu {})), ballots)
}

/// Reads a BLT contest from the lines of a text resource. See [read_blt].
pub fn read_blt_resource<S>(
    source: &S,
    ballots: Box<dyn StreamResource<Ballot>>,
) -> BltResult<Contest>
where
    S: StreamResource<String> + ?Sized,
{
    let lines = source.read().context(StreamSnafu {})?;
    read_blt_lines(lines.map(|l| l.context(StreamSnafu {})), ballots)
}

/// Reads a BLT file in the given text encoding. See [read_blt].
pub fn read_blt_file(
    path: impl Into<PathBuf>,
    encoding: TextEncoding,
    ballots: Box<dyn StreamResource<Ballot>>,
) -> BltResult<Contest> {
    let source = FileResource::new(path, encoding);
    debug!("read_blt_file: {:?}", source);
    read_blt_resource(&source, ballots)
}

fn read_blt_lines<I>(lines: I, mut ballots: Box<dyn StreamResource<Ballot>>) -> BltResult<Contest>
where
    I: Iterator<Item = BltResult<String>>,
{
    let mut lines = BltLines { lines, lineno: 0 };

    let (lineno, header) = lines.expect_content("the candidate and seat counts")?;
    let (num_candidates, seats) = match parse_ints(lineno, &header)?.as_slice() {
        [c, s] => match (CandidateId::try_from(*c), u32::try_from(*s)) {
            (Ok(c), Ok(s)) => (c as usize, s),
            _ => {
                return malformed(
                    lineno,
                    &header,
                    format!("{} candidates and {} seats are out of range", c, s),
                )
            }
        },
        _ => {
            return malformed(
                lineno,
                &header,
                "expected the number of candidates and the number of seats",
            )
        }
    };
    debug!(
        "read_blt: {} candidates, {} seats",
        num_candidates, seats
    );

    let mut withdrawn: BTreeSet<CandidateId> = BTreeSet::new();
    let mut num_ballots: usize = 0;
    {
        let mut sink = ballots.write().context(StreamSnafu {})?;
        let mut first_row = true;
        loop {
            let (lineno, line) = lines.expect_content("a ballot or the terminating 0")?;
            let values = parse_ints(lineno, &line)?;
            if first_row && values.first().map_or(false, |v| *v < 0) {
                first_row = false;
                for v in values {
                    if v >= 0 {
                        return malformed(lineno, &line, "withdrawn candidates must all be negative");
                    }
                    withdrawn.insert(candidate_id(lineno, &line, -v, num_candidates)?);
                }
                continue;
            }
            first_row = false;
            match values.as_slice() {
                [0] => break,
                [weight, choices @ .., 0] if *weight > 0 => {
                    let mut cids: Vec<CandidateId> = Vec::with_capacity(choices.len());
                    for c in choices {
                        cids.push(candidate_id(lineno, &line, *c, num_candidates)?);
                    }
                    sink.send(Ballot {
                        weight: *weight as u64,
                        choices: cids,
                    })
                    .context(StreamSnafu {})?;
                    num_ballots += 1;
                }
                [weight, ..] if *weight <= 0 => {
                    return malformed(lineno, &line, "a ballot weight must be positive")
                }
                _ => return malformed(lineno, &line, "a ballot must end with 0"),
            }
        }
        sink.finish().context(StreamSnafu {})?;
    }
    debug!(
        "read_blt: {} ballots, withdrawn: {:?}",
        num_ballots, withdrawn
    );

    let mut candidates: Vec<String> = Vec::new();
    for _ in 0..num_candidates {
        let (lineno, line) = lines.expect_content("a quoted candidate name")?;
        candidates.push(parse_quoted(lineno, &line)?);
    }
    let (lineno, line) = lines.expect_content("the quoted contest name")?;
    let name = parse_quoted(lineno, &line)?;

    if let Some((lineno, line)) = lines.next_content()? {
        return malformed(lineno, &line, "unexpected content after the contest name");
    }

    Ok(Contest::new(&name, candidates, seats)
        .with_withdrawn(withdrawn)
        .with_ballots(ballots))
}

/// Writes a contest in the BLT format.
pub fn write_blt<W: Write>(contest: &Contest, mut out: W) -> BltResult<()> {
    writeln!(out, "{} {}", contest.candidates.len(), contest.seats).context(IoSnafu {})?;
    if !contest.withdrawn.is_empty() {
        let markers: Vec<String> = contest
            .withdrawn
            .iter()
            .map(|cid| format!("-{}", cid))
            .collect();
        writeln!(out, "{}", markers.join(" ")).context(IoSnafu {})?;
    }
    for ballot in contest.ballots().read().context(StreamSnafu {})? {
        let ballot = ballot.context(StreamSnafu {})?;
        writeln!(out, "{} 0", ballot).context(IoSnafu {})?;
    }
    writeln!(out, "0").context(IoSnafu {})?;
    for name in contest.candidates.iter() {
        writeln!(out, "\"{}\"", name).context(IoSnafu {})?;
    }
    writeln!(out, "\"{}\"", contest.name).context(IoSnafu {})?;
    out.flush().context(IoSnafu {})
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{read_all, ListResource};

    const SAMPLE: &str = "3 1
3 1 2 0
4 2 0

2 3 1 0
0
\"Anna\"
\"Bob\"
\"Clara Z\"
\"Mayor\"
";

    fn read(text: &str) -> BltResult<Contest> {
        read_blt(text.as_bytes(), Box::new(ListResource::new()))
    }

    #[test]
    fn read_sample() {
        let contest = read(SAMPLE).unwrap();
        assert_eq!(contest.name, "Mayor");
        assert_eq!(contest.candidates, vec!["Anna", "Bob", "Clara Z"]);
        assert_eq!(contest.seats, 1);
        assert!(contest.withdrawn.is_empty());
        assert_eq!(
            read_all(contest.ballots()).unwrap(),
            vec![
                Ballot::new(3, vec![1, 2]),
                Ballot::new(4, vec![2]),
                Ballot::new(2, vec![3, 1]),
            ]
        );
    }

    #[test]
    fn withdrawn_and_undervotes() {
        let contest = read("2 1\n-2\n5 0\n1 1 2 0\n0\n\"A\"\n\"B\"\n\"T\"\n\n").unwrap();
        assert_eq!(contest.withdrawn, [2].into_iter().collect());
        assert_eq!(
            read_all(contest.ballots()).unwrap(),
            vec![Ballot::new(5, vec![]), Ballot::new(1, vec![1, 2])]
        );
    }

    #[test]
    fn write_then_read() {
        let contest = read("2 1\n-1\n5 2 1 0\n0\n\"A\"\n\"B\"\n\"T\"\n").unwrap();
        let mut out: Vec<u8> = Vec::new();
        write_blt(&contest, &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "2 1\n-1\n5 2 1 0\n0\n\"A\"\n\"B\"\n\"T\"\n"
        );
    }

    #[test]
    fn trailing_content_is_rejected() {
        match read(&format!("{}extra\n", SAMPLE)) {
            Err(BltError::MalformedInput { lineno, line, .. }) => {
                assert_eq!(lineno, 11);
                assert_eq!(line, "extra");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unknown_withdrawn_candidate() {
        assert!(matches!(
            read("2 1\n-3\n0\n\"A\"\n\"B\"\n\"T\"\n"),
            Err(BltError::MalformedInput { lineno: 2, .. })
        ));
    }

    #[test]
    fn bad_tokens_are_decode_errors() {
        match read("2 1\n1 1 x 0\n0\n\"A\"\n\"B\"\n\"T\"\n") {
            Err(BltError::Decode { lineno, line, .. }) => {
                assert_eq!(lineno, 2);
                assert_eq!(line, "1 1 x 0");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn structural_errors() {
        for text in [
            "",
            "2\n",
            "2 1\n1 1\n0\n\"A\"\n\"B\"\n\"T\"\n",
            "2 1\n1 3 0\n0\n\"A\"\n\"B\"\n\"T\"\n",
            "2 1\n0 1 0\n0\n\"A\"\n\"B\"\n\"T\"\n",
            "2 1\n1 1 0\n0\n\"A\"\n",
            "2 1\n1 1 0\n0\nA\n\"B\"\n\"T\"\n",
            "2 1\n1 1 0\n",
        ] {
            assert!(
                matches!(read(text), Err(BltError::MalformedInput { .. })),
                "accepted {:?}",
                text
            );
        }
    }

    #[test]
    fn out_of_range_header() {
        for header in ["4000000000000000000 1", "2 4294967296", "-1 1", "2 -1"] {
            let text = format!("{}\n0\n\"A\"\n\"T\"\n", header);
            match read(&text) {
                Err(BltError::MalformedInput { lineno, line, .. }) => {
                    assert_eq!(lineno, 1);
                    assert_eq!(line, header);
                }
                other => panic!("unexpected {:?} for {:?}", other, header),
            }
        }
        // A huge count only fails once the names run out.
        assert!(matches!(
            read("4000000 1\n0\n\"A\"\n\"T\"\n"),
            Err(BltError::MalformedInput { lineno: 4, .. })
        ));
    }

    #[test]
    fn latin1_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contest.blt");
        std::fs::write(&path, b"2 1\r\n1 2 0\r\n0\r\n\"Jos\xe9\"\r\n\"B\"\r\n\"T\"\r\n").unwrap();
        let contest =
            read_blt_file(&path, TextEncoding::Latin1, Box::new(ListResource::new())).unwrap();
        assert_eq!(contest.candidates, vec!["Jos\u{e9}", "B"]);
        assert_eq!(
            read_all(contest.ballots()).unwrap(),
            vec![Ballot::new(1, vec![2])]
        );

        assert!(matches!(
            read_blt_file(&path, TextEncoding::Utf8, Box::new(ListResource::new())),
            Err(BltError::Stream { .. })
        ));
        assert!(matches!(
            read_blt_file(dir.path().join("missing.blt"), TextEncoding::Utf8, Box::new(ListResource::new())),
            Err(BltError::Stream { .. })
        ));
    }

    #[test]
    fn read_only_ballots_resource() {
        let res = read_blt(SAMPLE.as_bytes(), Box::new(crate::stream::NullResource));
        assert!(matches!(
            res,
            Err(BltError::Stream {
                source: StreamError::WriteNotSupported {}
            })
        ));
    }
}
