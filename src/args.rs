use clap::Parser;

/// This is an instant-runoff tabulation program.
#[derive(Parser, Debug, Clone, Default)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) The JSON file describing the contest and locating its ballots.
    /// See the manual of irv_engine for the format.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,
    /// (file path) A reference file containing the outcome of a contest in JSON format. If provided, irvtab will
    /// check that the tabulated output matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the summary of the contest will be written in JSON format to the given
    /// location.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path or empty) The file containing the ballots. Setting this option overrides the ballots file
    /// that may be specified with the --config option.
    #[clap(short, long, value_parser)]
    pub input: Option<String>,

    /// (default blt) The type of the input: 'blt' or 'ballots' (one weighted ballot per line).
    #[clap(long, value_parser)]
    pub input_type: Option<String>,

    /// (default utf-8) The text encoding of the input: 'utf-8' or 'latin-1'.
    #[clap(long, value_parser)]
    pub encoding: Option<String>,

    /// If passed as an argument, the ballots are merged and sorted before the count.
    #[clap(long, takes_value = false)]
    pub normalize: bool,

    /// (file path or empty) If specified, the ballots of the contest will be written to the given location,
    /// one ballot per line.
    #[clap(long, value_parser)]
    pub ballots_out: Option<String>,

    /// (file path or empty) If specified, the contest will be written in the BLT format to the given location.
    #[clap(long, value_parser)]
    pub blt_out: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
