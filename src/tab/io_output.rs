use crate::tab::*;

use irv_engine::blt::write_blt;
use irv_engine::stream::copy_items;
use std::fs::{self, File};
use std::io::BufWriter;

/// Writes the summary to a file, or to the standard output for `stdout`.
pub fn write_summary(pretty_js: &str, out: &str) -> TabResult<()> {
    if out == "stdout" {
        println!("{}", pretty_js);
        return Ok(());
    }
    info!("Writing summary to {:?}", out);
    fs::write(out, pretty_js).context(WritingOutputSnafu { path: out })
}

/// Writes the ballots of the contest, one per line. Returns the number of ballots written.
pub fn write_ballots(contest: &Contest, path: &str, encoding: TextEncoding) -> TabResult<usize> {
    let mut target = ballot_file(path, encoding);
    let count = copy_items(contest.ballots(), &mut target).context(BallotsSnafu { path })?;
    info!("Wrote {} ballots to {:?}", count, path);
    Ok(count)
}

pub fn write_blt_output(contest: &Contest, path: &str) -> TabResult<()> {
    let file = File::create(path).context(WritingOutputSnafu { path })?;
    write_blt(contest, BufWriter::new(file)).context(WritingBltSnafu { path })?;
    info!("Wrote contest {:?} to {:?}", contest.name, path);
    Ok(())
}
