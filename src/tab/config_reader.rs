use crate::tab::*;

use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;
use std::fs;

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ConfigCandidate {
    pub name: String,
    pub withdrawn: Option<bool>,
}

/// The JSON description of a contest.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ContestConfig {
    #[serde(rename = "contestName")]
    pub contest_name: Option<String>,
    #[serde(default)]
    pub candidates: Vec<ConfigCandidate>,
    pub seats: Option<u32>,
    #[serde(rename = "ballotsFile")]
    pub ballots_file: String,
    #[serde(rename = "ballotsFormat")]
    pub ballots_format: Option<String>,
    pub encoding: Option<String>,
    pub normalize: Option<bool>,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl ContestConfig {
    pub fn candidate_names(&self) -> Vec<String> {
        self.candidates.iter().map(|c| c.name.clone()).collect()
    }

    pub fn withdrawn_ids(&self) -> BTreeSet<CandidateId> {
        self.candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| c.withdrawn.unwrap_or(false))
            .map(|(idx, _)| idx as CandidateId + 1)
            .collect()
    }
}

/// The `config` section of a summary.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub contest: String,
    pub seats: u32,
    pub threshold: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

pub fn read_config(path: &str) -> TabResult<ContestConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let config: ContestConfig =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    info!("config: {:?}", config);
    Ok(config)
}

pub fn read_summary(path: &str) -> TabResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    debug!("read content: {:?}", contents);
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    Ok(js)
}
