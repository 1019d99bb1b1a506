use clap::Parser;

/// This is a pairwise media bias survey, played in the terminal.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) The JSON file describing the survey: catalog source, sections, form
    /// endpoint and session store. For more information about the file format, read the documentation
    /// of the pairwise_survey::manual module.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (file path) The catalog of outlets. Setting this option overrides the catalog source that may be
    /// specified with the --config option.
    #[clap(long, value_parser)]
    pub catalog: Option<String>,

    /// (default csv) The type of the catalog: csv or xlsx.
    #[clap(long, value_parser)]
    pub catalog_type: Option<String>,

    /// (file path) Where the session is saved between runs. Setting this option overrides the path that
    /// may be specified with the --config option. Without any path, the session is only kept in memory.
    #[clap(short, long, value_parser)]
    pub store: Option<String>,

    /// (integer) Seed for the random generator, to get a reproducible sequence of comparisons.
    #[clap(long, value_parser)]
    pub seed: Option<u64>,

    /// If passed as an argument, prints the generated comparisons in JSON format instead of running the survey.
    #[clap(long, takes_value = false)]
    pub plan: bool,

    /// (file path) A reference file containing the expected comparisons in JSON format. If provided with
    /// --plan, mbisurvey will check that the generated comparisons match the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// If passed as an argument, the answers are not sent to the remote form, only logged.
    #[clap(long, takes_value = false)]
    pub offline: bool,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
