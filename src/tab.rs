use log::{debug, info, warn};

use irv_engine::blt::{read_blt_file, BltError};
use irv_engine::codec::ballot_file;
use irv_engine::stream::{ListResource, StreamError, StreamResource, TextEncoding};
use irv_engine::*;
use snafu::{prelude::*, Snafu};

use serde_json::json;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use text_diff::print_diff;

use crate::args::Args;
use crate::tab::config_reader::*;
use crate::tab::io_output::*;

pub mod config_reader;
pub mod io_output;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TabError {
    #[snafu(display("Error opening file {path}: {source}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON: {source}"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("The configuration file has no parent directory"))]
    MissingParentDir {},
    #[snafu(display("No ballots to count: pass --input or --config"))]
    MissingInput {},
    #[snafu(display("Unknown input type {input_type:?}: expected 'blt' or 'ballots'"))]
    UnknownInputType { input_type: String },
    #[snafu(display("{source}"))]
    InvalidEncoding { source: StreamError },
    #[snafu(display("Error loading the contest from {path}: {source}"))]
    LoadingBlt { source: BltError, path: String },
    #[snafu(display("Error transferring the ballots of {path}: {source}"))]
    Ballots { source: StreamError, path: String },
    #[snafu(display("Error writing {path}: {source}"))]
    WritingOutput {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error writing the contest to {path}: {source}"))]
    WritingBlt { source: BltError, path: String },
    #[snafu(display("Voting error: {source}"))]
    Voting { source: VotingErrors },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type TabResult<T> = Result<T, TabError>;

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum InputType {
    Blt,
    /// One ballot per line: `WEIGHT CHOICE1 CHOICE2 ...`
    Ballots,
}

impl InputType {
    fn parse(s: &str) -> TabResult<InputType> {
        match s {
            "blt" => Ok(InputType::Blt),
            "ballots" => Ok(InputType::Ballots),
            x => UnknownInputTypeSnafu { input_type: x }.fail(),
        }
    }
}

/// Where the ballots are and how to read them, once the command line and the configuration
/// are merged.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct InputSettings {
    pub path: PathBuf,
    pub input_type: InputType,
    pub encoding: TextEncoding,
    pub normalize: bool,
}

/// The command line wins over the configuration. Relative paths in the configuration are
/// relative to its directory.
pub fn resolve_input(
    args: &Args,
    config: Option<&ContestConfig>,
    config_dir: Option<&Path>,
) -> TabResult<InputSettings> {
    let path: PathBuf = match (&args.input, config) {
        (Some(p), _) => PathBuf::from(p),
        (None, Some(c)) => {
            let p = Path::new(&c.ballots_file);
            match config_dir {
                Some(dir) if p.is_relative() => dir.join(p),
                _ => p.to_path_buf(),
            }
        }
        (None, None) => return MissingInputSnafu {}.fail(),
    };
    let input_type = match args
        .input_type
        .as_deref()
        .or_else(|| config.and_then(|c| c.ballots_format.as_deref()))
    {
        Some(s) => InputType::parse(s)?,
        None => InputType::Blt,
    };
    let encoding = match args
        .encoding
        .as_deref()
        .or_else(|| config.and_then(|c| c.encoding.as_deref()))
    {
        Some(s) => s.parse::<TextEncoding>().context(InvalidEncodingSnafu {})?,
        None => TextEncoding::default(),
    };
    let normalize = args.normalize || config.and_then(|c| c.normalize).unwrap_or(false);
    Ok(InputSettings {
        path,
        input_type,
        encoding,
        normalize,
    })
}

// Names the candidates after the largest id found in the ballots.
fn infer_candidates<S>(ballots: &S, path: &str) -> TabResult<Vec<String>>
where
    S: StreamResource<Ballot> + ?Sized,
{
    let mut max_id: CandidateId = 0;
    for ballot in ballots.read().context(BallotsSnafu { path })? {
        let ballot = ballot.context(BallotsSnafu { path })?;
        if let Some(cid) = ballot.choices.iter().max() {
            max_id = max_id.max(*cid);
        }
    }
    info!(
        "No candidates declared: {} candidates inferred from the ballots",
        max_id
    );
    Ok((1..=max_id).map(|cid| format!("Candidate {}", cid)).collect())
}

/// Loads the contest and, if requested, normalizes its ballots.
pub fn load_contest(settings: &InputSettings, config: Option<&ContestConfig>) -> TabResult<Contest> {
    let path = settings.path.display().to_string();
    info!(
        "Attempting to read {:?} file {:?} ({})",
        settings.input_type, path, settings.encoding
    );
    let mut contest = match settings.input_type {
        InputType::Blt => {
            if config.map_or(false, |c| !c.candidates.is_empty()) {
                warn!("The candidates of a BLT contest come from the BLT file: ignoring the candidates of the configuration");
            }
            read_blt_file(
                &settings.path,
                settings.encoding,
                Box::new(ListResource::new()),
            )
            .context(LoadingBltSnafu { path: path.clone() })?
        }
        InputType::Ballots => {
            let ballots = ballot_file(&settings.path, settings.encoding);
            let (candidates, withdrawn): (Vec<String>, BTreeSet<CandidateId>) = match config {
                Some(c) if !c.candidates.is_empty() => (c.candidate_names(), c.withdrawn_ids()),
                _ => (infer_candidates(&ballots, &path)?, BTreeSet::new()),
            };
            let name = settings
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let seats = config.and_then(|c| c.seats).unwrap_or(1);
            Contest::new(&name, candidates, seats)
                .with_withdrawn(withdrawn)
                .with_ballots(Box::new(ballots))
        }
    };
    if let Some(c) = config {
        if let Some(name) = &c.contest_name {
            contest.name = name.clone();
        }
        contest.notes.extend(c.notes.iter().cloned());
    }
    if settings.normalize {
        contest
            .normalize_ballots()
            .context(BallotsSnafu { path })?;
    }
    Ok(contest)
}

// Compares the files behind two paths. A path that cannot be resolved (a file that does not
// exist yet) is compared as written.
fn same_file(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn candidate_label(contest: &Contest, cid: CandidateId) -> String {
    match contest.candidate_name(cid) {
        Some(name) => name.to_string(),
        None => format!("Candidate {}", cid),
    }
}

fn result_stats_to_json(contest: &Contest, result: &ContestResult) -> Vec<JSValue> {
    let mut l: Vec<JSValue> = Vec::new();
    let num_rounds = result.rounds.len();
    for (idx, round) in result.rounds.iter().enumerate() {
        let mut tally: JSMap<String, JSValue> = JSMap::new();
        for (cid, count) in round.totals.iter() {
            tally.insert(candidate_label(contest, *cid), json!(count.to_string()));
        }

        let mut tally_results: Vec<JSValue> = Vec::new();
        if idx + 1 < num_rounds {
            // Every round but the last one eliminates exactly one candidate.
            if let Some(cid) = result.eliminated.get(idx) {
                tally_results.push(json!({ "eliminated": candidate_label(contest, *cid) }));
            }
        } else {
            match &result.outcome {
                Outcome::Winner(cid) => {
                    tally_results.push(json!({ "elected": candidate_label(contest, *cid) }))
                }
                Outcome::TiedLastPlace(tied) => {
                    for cid in tied.iter() {
                        tally_results.push(json!({ "tied": candidate_label(contest, *cid) }));
                    }
                }
            }
        }

        let js = json!({"round": idx + 1, "tally": tally, "tallyResults": tally_results});
        l.push(js);
    }
    l
}

pub fn build_summary_js(contest: &Contest, result: &ContestResult) -> JSValue {
    let threshold = result
        .rounds
        .last()
        .map(|r| r.majority())
        .unwrap_or_else(|| get_majority(0));
    let c = OutputConfig {
        contest: contest.name.clone(),
        seats: contest.seats,
        threshold: threshold.to_string(),
        notes: contest.notes.clone(),
    };
    let outcome = match &result.outcome {
        Outcome::Winner(cid) => json!({ "winner": candidate_label(contest, *cid) }),
        Outcome::TiedLastPlace(tied) => {
            let names: Vec<String> = tied.iter().map(|cid| candidate_label(contest, *cid)).collect();
            json!({ "tied": names })
        }
    };
    json!({
        "config": c,
        "outcome": outcome,
        "results": result_stats_to_json(contest, result) })
}

fn check_reference(pretty_js_stats: &str, summary_p: &str) -> TabResult<()> {
    let summary_ref = read_summary(summary_p)?;
    info!("summary: {:?}", summary_ref);
    let pretty_js_summary_ref =
        serde_json::to_string_pretty(&summary_ref).context(ParsingJsonSnafu {})?;
    if pretty_js_summary_ref != pretty_js_stats {
        warn!("Found differences with the reference string");
        print_diff(pretty_js_summary_ref.as_str(), pretty_js_stats, "\n");
        whatever!("Difference detected between calculated summary and reference summary")
    }
    Ok(())
}

/// Runs the whole program: load, count, report.
pub fn run_election_cli(args: &Args) -> TabResult<()> {
    let config: Option<ContestConfig> = match &args.config {
        Some(p) => Some(read_config(p)?),
        None => None,
    };
    let config_dir: Option<&Path> = match &args.config {
        Some(p) => Some(Path::new(p).parent().context(MissingParentDirSnafu {})?),
        None => None,
    };
    let settings = resolve_input(args, config.as_ref(), config_dir)?;
    debug!("input settings: {:?}", settings);

    let contest = load_contest(&settings, config.as_ref())?;
    info!("contest: {:?}", contest);

    if let Some(p) = &args.ballots_out {
        if settings.input_type == InputType::Ballots
            && !settings.normalize
            && same_file(Path::new(p), &settings.path)
        {
            whatever!(
                "Cannot write the ballots to {:?}: they are read from this file",
                p
            )
        }
        write_ballots(&contest, p, settings.encoding)?;
    }
    if let Some(p) = &args.blt_out {
        write_blt_output(&contest, p)?;
    }

    let result = run_election(&contest).context(VotingSnafu {})?;
    debug!("result: {:?}", result);

    // Assemble the final json
    let result_js = build_summary_js(&contest, &result);
    let pretty_js_stats = serde_json::to_string_pretty(&result_js).context(ParsingJsonSnafu {})?;
    write_summary(&pretty_js_stats, args.out.as_deref().unwrap_or("stdout"))?;

    // The reference summary, if provided for comparison
    if let Some(summary_p) = &args.reference {
        check_reference(&pretty_js_stats, summary_p)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn run_election_test(test_name: &str, config_lpath: &str, summary_lpath: &str) -> TabResult<()> {
        let test_dir = option_env!("IRVTAB_TEST_DIR")
            .unwrap_or(concat!(env!("CARGO_MANIFEST_DIR"), "/testdata"));
        info!("Running test {}", test_name);
        let args = Args {
            config: Some(format!("{}/{}/{}", test_dir, test_name, config_lpath)),
            reference: Some(format!("{}/{}/{}", test_dir, test_name, summary_lpath)),
            ..Args::default()
        };
        run_election_cli(&args)
    }

    fn test_wrapper(test_name: &str) {
        init();
        let res = run_election_test(
            test_name,
            format!("{}_config.json", test_name).as_str(),
            format!("{}_expected_summary.json", test_name).as_str(),
        );
        if let Err(e) = res {
            panic!("test {} failed: {}", test_name, e);
        }
    }

    #[test]
    fn three_way() {
        test_wrapper("three_way");
    }

    #[test]
    fn blt_tie() {
        test_wrapper("blt_tie");
    }

    #[test]
    fn undervote() {
        test_wrapper("undervote");
    }

    #[test]
    fn normalize_withdrawn() {
        test_wrapper("normalize_withdrawn");
    }

    fn ballots_args(dir: &Path, contents: &str) -> Args {
        let input = dir.join("c.ballots");
        fs::write(&input, contents).unwrap();
        Args {
            input: Some(input.display().to_string()),
            input_type: Some("ballots".to_string()),
            out: Some(dir.join("summary.json").display().to_string()),
            ..Args::default()
        }
    }

    #[test]
    fn candidates_are_inferred_without_config() {
        init();
        let dir = tempfile::tempdir().unwrap();
        let args = ballots_args(dir.path(), "3 1 2\n4 2\n2 3 1\n");
        let settings = resolve_input(&args, None, None).unwrap();
        let contest = load_contest(&settings, None).unwrap();
        assert_eq!(
            contest.candidates,
            vec!["Candidate 1", "Candidate 2", "Candidate 3"]
        );
        assert_eq!(contest.name, "c");

        run_election_cli(&args).unwrap();
        let summary: JSValue =
            serde_json::from_str(&fs::read_to_string(dir.path().join("summary.json")).unwrap())
                .unwrap();
        assert_eq!(summary["outcome"], json!({"winner": "Candidate 1"}));
        assert_eq!(summary["config"]["threshold"], json!("5"));
    }

    #[test]
    fn config_paths_are_relative_to_the_config() {
        let config: ContestConfig = serde_json::from_str(
            r#"{"ballotsFile": "data/c.ballots", "ballotsFormat": "ballots", "normalize": true}"#,
        )
        .unwrap();
        let settings =
            resolve_input(&Args::default(), Some(&config), Some(Path::new("/elections"))).unwrap();
        assert_eq!(
            settings,
            InputSettings {
                path: PathBuf::from("/elections/data/c.ballots"),
                input_type: InputType::Ballots,
                encoding: TextEncoding::Utf8,
                normalize: true,
            }
        );

        let args = Args {
            input: Some("other.blt".to_string()),
            input_type: Some("blt".to_string()),
            encoding: Some("latin-1".to_string()),
            ..Args::default()
        };
        let settings = resolve_input(&args, Some(&config), Some(Path::new("/elections"))).unwrap();
        assert_eq!(settings.path, PathBuf::from("other.blt"));
        assert_eq!(settings.input_type, InputType::Blt);
        assert_eq!(settings.encoding, TextEncoding::Latin1);
    }

    #[test]
    fn bad_settings() {
        assert!(matches!(
            resolve_input(&Args::default(), None, None),
            Err(TabError::MissingInput {})
        ));
        let args = Args {
            input: Some("x".to_string()),
            input_type: Some("csv".to_string()),
            ..Args::default()
        };
        assert!(matches!(
            resolve_input(&args, None, None),
            Err(TabError::UnknownInputType { .. })
        ));
        let args = Args {
            input: Some("x".to_string()),
            encoding: Some("ebcdic".to_string()),
            ..Args::default()
        };
        assert!(matches!(
            resolve_input(&args, None, None),
            Err(TabError::InvalidEncoding { .. })
        ));
    }

    #[test]
    fn broken_ballot_file_is_reported() {
        init();
        let dir = tempfile::tempdir().unwrap();
        let args = ballots_args(dir.path(), "1 1\n1 x\n");
        match run_election_cli(&args) {
            Err(TabError::Ballots { source, .. }) => {
                assert_eq!(source.item_index(), Some(2));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn normalized_ballots_out() {
        init();
        let dir = tempfile::tempdir().unwrap();
        let mut args = ballots_args(dir.path(), "1 2\n1 1\n1 2\n");
        args.normalize = true;
        let out = dir.path().join("normalized.ballots");
        args.ballots_out = Some(out.display().to_string());
        run_election_cli(&args).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "1 1\n2 2\n");
    }

    #[test]
    fn ballots_out_cannot_overwrite_the_input() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = ballots_args(dir.path(), "1 1\n");
        args.ballots_out = args.input.clone();
        assert!(matches!(
            run_election_cli(&args),
            Err(TabError::Whatever { .. })
        ));
        assert_eq!(
            fs::read_to_string(dir.path().join("c.ballots")).unwrap(),
            "1 1\n"
        );
    }

    #[test]
    fn ballots_out_alias_of_the_input_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let mut args = ballots_args(dir.path(), "3 1\n1 2\n");
        let alias = dir.path().join("sub").join("..").join("c.ballots");
        args.ballots_out = Some(alias.display().to_string());
        assert!(matches!(
            run_election_cli(&args),
            Err(TabError::Whatever { .. })
        ));
        assert_eq!(
            fs::read_to_string(dir.path().join("c.ballots")).unwrap(),
            "3 1\n1 2\n"
        );
    }

    #[test]
    fn reference_mismatch_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = ballots_args(dir.path(), "1 1\n");
        let reference = dir.path().join("reference.json");
        fs::write(&reference, r#"{"outcome": {"winner": "Someone else"}}"#).unwrap();
        args.reference = Some(reference.display().to_string());
        assert!(matches!(
            run_election_cli(&args),
            Err(TabError::Whatever { .. })
        ));
    }

    #[test]
    fn summary_of_a_tie() {
        let contest = Contest::new("t", vec!["A".into(), "B".into(), "C".into()], 1).with_ballots(
            Box::new(ListResource::from_items(vec![
                Ballot::new(2, vec![1]),
                Ballot::new(2, vec![2]),
                Ballot::new(1, vec![3]),
            ])),
        );
        let result = run_election(&contest).unwrap();
        let js = build_summary_js(&contest, &result);
        assert_eq!(
            js,
            json!({
                "config": {"contest": "t", "seats": 1, "threshold": "3"},
                "outcome": {"tied": ["A", "B"]},
                "results": [
                    {"round": 1, "tally": {"A": "2", "B": "2", "C": "1"},
                     "tallyResults": [{"eliminated": "C"}]},
                    {"round": 2, "tally": {"A": "2", "B": "2"},
                     "tallyResults": [{"tied": "A"}, {"tied": "B"}]}
                ]
            })
        );
    }
}
