use log::{debug, info, warn};

use pairwise_survey::*;
use snafu::{prelude::*, Snafu};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::args::Args;

pub mod config_reader;
pub mod io_common;
pub mod io_csv;
pub mod io_excel;
pub mod io_forms;
pub mod io_store;
pub mod plan;

use crate::session::config_reader::*;
use crate::session::io_common::read_catalog;
use crate::session::io_forms::{Dispatcher, FormSink, OfflineSink, SubmissionSink};
use crate::session::io_store::{
    clear, load_completion, load_progress, save_completion, save_progress, FileStore,
    MemoryStore, ResumableStore,
};

#[derive(Debug, Snafu)]
pub enum SessionError {
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON file {path}: {source}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error writing JSON: {source}"))]
    WritingJson { source: serde_json::Error },
    #[snafu(display("Error opening catalog {path}: {source}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error reading line {lineno} of the catalog: {source}"))]
    CsvLineParse { source: csv::Error, lineno: usize },
    #[snafu(display("Column {column} is missing in the catalog {path}"))]
    MissingColumn { column: String, path: String },
    #[snafu(display("Error opening file {path}: {source}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("No worksheet found in {path}"))]
    EmptyExcel { path: String },
    #[snafu(display("Only text cells are supported, found {content} at line {lineno}"))]
    ExcelWrongCellType { lineno: usize, content: String },
    #[snafu(display("Unknown catalog provider {provider}"))]
    UnknownProvider { provider: String },
    #[snafu(display("Cannot load the catalog: {source}"))]
    Catalog { source: SurveyError },
    #[snafu(display("{source}"))]
    Survey { source: SurveyError },
    #[snafu(display("Error writing the session store {path}: {source}"))]
    StoreIo {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Terminal error: {source}"))]
    Terminal { source: std::io::Error },
    #[snafu(display("Error sending to {url}: {source}"))]
    Submit { source: reqwest::Error, url: String },
    #[snafu(display("Error setting up the form client: {source}"))]
    HttpClient { source: reqwest::Error },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error + Send + Sync>, Some)))]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

pub type SessionResult<T> = Result<T, SessionError>;

/// How a run of the survey ended.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum SessionOutcome {
    /// No consent: nothing was saved.
    Declined,
    /// The respondent left before the end. The progress is saved.
    Suspended,
    Finished { contact_shared: bool },
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct SessionSettings {
    pub survey: SurveyConfig,
    pub require_answer_to_advance: bool,
}

// The commands typed during the comparisons.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
enum Command {
    Left,
    Right,
    DontKnow,
    Next,
    Previous,
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    match line.trim().to_lowercase().as_str() {
        "1" => Some(Command::Left),
        "2" => Some(Command::Right),
        "d" | "dk" => Some(Command::DontKnow),
        "n" | "next" | "" => Some(Command::Next),
        "p" | "prev" | "previous" => Some(Command::Previous),
        "q" | "quit" => Some(Command::Quit),
        _ => None,
    }
}

/// Line-based interaction with the respondent.
pub struct Terminal<R, W> {
    input: R,
    output: W,
}

impl<R: AsyncBufRead + Unpin, W: Write> Terminal<R, W> {
    pub fn new(input: R, output: W) -> Terminal<R, W> {
        Terminal { input, output }
    }

    pub fn say(&mut self, text: &str) -> SessionResult<()> {
        writeln!(self.output, "{}", text).context(TerminalSnafu {})?;
        self.output.flush().context(TerminalSnafu {})
    }

    /// The next line typed, trimmed. None when the input is closed.
    pub async fn ask(&mut self, prompt: &str) -> SessionResult<Option<String>> {
        write!(self.output, "{}", prompt).context(TerminalSnafu {})?;
        self.output.flush().context(TerminalSnafu {})?;
        let mut line = String::new();
        let n = self
            .input
            .read_line(&mut line)
            .await
            .context(TerminalSnafu {})?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    pub fn output(&self) -> &W {
        &self.output
    }
}

async fn ask_consent<R: AsyncBufRead + Unpin, W: Write>(
    term: &mut Terminal<R, W>,
) -> SessionResult<bool> {
    term.say("Media Bias Index")?;
    term.say("You will be shown pairs of media outlets. For each pair, pick the one you perceive as less biased, or answer that you don't know.")?;
    term.say("Your answers are anonymous and only used for research purposes.")?;
    loop {
        match term.ask("Do you agree to take part? [y/n] ").await? {
            None => return Ok(false),
            Some(answer) => match answer.to_lowercase().as_str() {
                "y" | "yes" | "s" | "si" | "sì" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => term.say("Please answer y or n.")?,
            },
        }
    }
}

// The names of the sections that have comparisons, in order.
fn section_names(state: &SurveyState) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::new();
    let mut last_id: Option<u32> = None;
    for p in state.pairs() {
        if last_id != Some(p.section_id) {
            names.push(p.section_name.as_str());
            last_id = Some(p.section_id);
        }
    }
    names
}

fn render<R: AsyncBufRead + Unpin, W: Write>(
    term: &mut Terminal<R, W>,
    state: &SurveyState,
) -> SessionResult<()> {
    let pair = match state.current_pair() {
        Some(p) => p,
        None => whatever!("No comparison at position {:?}", state.position()),
    };
    let pos = state.position();
    let statuses: Vec<String> = section_names(state)
        .iter()
        .zip(state.section_statuses())
        .map(|(name, status)| match status {
            SectionStatus::Completed => format!("[x] {}", name),
            SectionStatus::Active => format!("[>] {}", name),
            SectionStatus::Pending => format!("[ ] {}", name),
        })
        .collect();
    let chosen = state.current_response().map(|r| r.chosen.clone());
    let mark = |c: Choice| if chosen.as_ref() == Some(&c) { " *" } else { "" };

    term.say("")?;
    term.say(&statuses.join("  "))?;
    term.say(&format!(
        "{} - comparison {} of {} ({:.0}% done)",
        pair.section_name,
        pos.current_comparison + 1,
        state.comparisons_in_current_section(),
        state.progress_percent()
    ))?;
    term.say("Which one is less biased?")?;
    term.say(&format!(
        "  1) {}{}",
        pair.left.name,
        mark(Choice::Outlet(pair.left.codename.clone()))
    ))?;
    term.say(&format!(
        "  2) {}{}",
        pair.right.name,
        mark(Choice::Outlet(pair.right.codename.clone()))
    ))?;
    term.say(&format!("  d) Don't know{}", mark(Choice::DontKnow)))?;
    let next_label = if state.is_last_comparison() {
        "finish"
    } else {
        "next"
    };
    term.say(&format!("[n] {}  [p] previous  [q] quit", next_label))
}

// The choice matching a selection command, for the current comparison.
fn choice_for(state: &SurveyState, command: Command) -> Option<Choice> {
    let pair = state.current_pair()?;
    match command {
        Command::Left => Some(Choice::Outlet(pair.left.codename.clone())),
        Command::Right => Some(Choice::Outlet(pair.right.codename.clone())),
        Command::DontKnow => Some(Choice::DontKnow),
        _ => None,
    }
}

/// Asks for a contact and sends every response again with it.
///
/// Returns None if the respondent left without answering: the completion record is kept
/// so that the question is asked again next time.
async fn follow_up<R: AsyncBufRead + Unpin, W: Write, S: ResumableStore>(
    term: &mut Terminal<R, W>,
    store: &mut S,
    dispatcher: &mut Dispatcher,
    completed: &CompletedSurvey,
) -> SessionResult<Option<bool>> {
    term.say("")?;
    term.say("Thank you for completing the survey!")?;
    term.say("If you want to be contacted about the results, leave your email address (leave blank to skip).")?;
    loop {
        let contact = match term.ask("email> ").await? {
            Some(c) => c,
            None => return Ok(None),
        };
        if contact.is_empty() {
            info!("follow_up: no contact for {}", completed.interview_id());
            clear(store)?;
            return Ok(Some(false));
        }
        match completed.resubmissions(&contact) {
            Ok(submissions) => {
                dispatcher.resubmit_all(submissions).await;
                clear(store)?;
                term.say("Thank you, your email address has been recorded.")?;
                return Ok(Some(true));
            }
            Err(e) => {
                debug!("follow_up: {}", e);
                term.say("Please enter a valid email address.")?;
            }
        }
    }
}

/// Runs the survey for one respondent, from wherever the store says they are.
///
/// Every change is saved in the store before the next command is read. The answers are handed
/// to the dispatcher as soon as they are given.
pub async fn run_session<R, W, S, G>(
    term: &mut Terminal<R, W>,
    store: &mut S,
    dispatcher: &mut Dispatcher,
    catalog: &OutletCatalog,
    settings: &SessionSettings,
    rng: &mut G,
) -> SessionResult<SessionOutcome>
where
    R: AsyncBufRead + Unpin,
    W: Write,
    S: ResumableStore,
    G: Rng,
{
    if let Some(completed) = load_completion(store) {
        info!(
            "run_session: interview {} is completed, asking for a contact",
            completed.interview_id()
        );
        return Ok(match follow_up(term, store, dispatcher, &completed).await? {
            Some(contact_shared) => SessionOutcome::Finished { contact_shared },
            None => SessionOutcome::Suspended,
        });
    }

    let mut survey = match load_progress(store) {
        Some(survey) => {
            term.say("Welcome back, the survey resumes where you left it.")?;
            survey
        }
        None => {
            if !ask_consent(term).await? {
                info!("run_session: consent not given");
                return Ok(SessionOutcome::Declined);
            }
            let mut survey = Survey::new();
            survey
                .start(true, catalog, &settings.survey, rng)
                .context(SurveySnafu {})?;
            survey
        }
    };

    while let Some(state) = survey.state() {
        save_progress(store, state)?;
        render(term, state)?;
        let line = match term.ask("> ").await? {
            Some(l) => l,
            None => return Ok(SessionOutcome::Suspended),
        };
        let command = match parse_command(&line) {
            Some(c) => c,
            None => {
                term.say(&format!("Unknown command {:?}", line))?;
                continue;
            }
        };
        debug!("run_session: command {:?}", command);
        match command {
            Command::Left | Command::Right | Command::DontKnow => {
                let chosen = match choice_for(state, command) {
                    Some(c) => c,
                    None => whatever!("No comparison for {:?}", command),
                };
                let submission = survey.select_current(chosen).context(SurveySnafu {})?;
                dispatcher.dispatch(submission);
            }
            Command::Next => {
                if settings.require_answer_to_advance && state.current_response().is_none() {
                    term.say("Pick an answer before moving on.")?;
                    continue;
                }
                if let Step::Completed = survey.advance().context(SurveySnafu {})? {
                    if let Some(completed) = survey.completed() {
                        save_completion(store, completed)?;
                    }
                }
            }
            Command::Previous => {
                survey.retreat().context(SurveySnafu {})?;
            }
            Command::Quit => {
                term.say("Your progress is saved, see you soon.")?;
                return Ok(SessionOutcome::Suspended);
            }
        }
    }

    let completed = match survey.completed() {
        Some(c) => c.clone(),
        None => whatever!("The survey ended without being completed"),
    };
    Ok(
        match follow_up(term, store, dispatcher, &completed).await? {
            Some(contact_shared) => SessionOutcome::Finished { contact_shared },
            None => SessionOutcome::Suspended,
        },
    )
}

/// The catalog path and source, with the command line taking precedence over the configuration.
fn catalog_source(args: &Args, config: &SessionConfig) -> (PathBuf, CatalogSource) {
    let mut source = config.catalog_source.clone();
    if let Some(provider) = &args.catalog_type {
        source.provider = provider.clone();
    }
    match &args.catalog {
        Some(p) => {
            source.file_path = p.clone();
            (PathBuf::from(p), source)
        }
        None => (
            resolve_path(args.config.as_deref(), &source.file_path),
            source,
        ),
    }
}

fn store_path(args: &Args, config: &SessionConfig) -> Option<PathBuf> {
    match (&args.store, &config.store_path) {
        (Some(p), _) => Some(PathBuf::from(p)),
        (None, Some(p)) => Some(resolve_path(args.config.as_deref(), p)),
        (None, None) => None,
    }
}

pub async fn run(args: &Args) -> SessionResult<()> {
    let config = match args.config.as_deref() {
        Some(p) => read_config(p)?,
        None => SessionConfig::default(),
    };
    let survey_config = config.survey.survey_config()?;
    let (catalog_path, source) = catalog_source(args, &config);
    let catalog = read_catalog(&catalog_path, &source, &survey_config)?;

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    if args.plan {
        return plan::run_plan(
            &catalog,
            &survey_config,
            &mut rng,
            args.reference.as_deref(),
        );
    }

    let sink: Arc<dyn SubmissionSink> = if args.offline {
        Arc::new(OfflineSink)
    } else {
        Arc::new(FormSink::new(config.form.clone())?)
    };
    let mut dispatcher = Dispatcher::new(sink);
    let settings = SessionSettings {
        survey: survey_config,
        require_answer_to_advance: config.survey.require_answer_to_advance(),
    };
    let mut term = Terminal::new(BufReader::new(tokio::io::stdin()), std::io::stdout());

    let outcome = match store_path(args, &config) {
        Some(p) => {
            info!("run: session store {}", p.display());
            let mut store = FileStore::open(&p);
            run_session(
                &mut term,
                &mut store,
                &mut dispatcher,
                &catalog,
                &settings,
                &mut rng,
            )
            .await
        }
        None => {
            warn!("run: no session store, the progress will not survive this run");
            let mut store = MemoryStore::new();
            run_session(
                &mut term,
                &mut store,
                &mut dispatcher,
                &catalog,
                &settings,
                &mut rng,
            )
            .await
        }
    };
    // Lets the last answers reach the form before leaving.
    dispatcher.settle().await;
    let outcome = outcome?;
    info!("run: {:?}", outcome);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::io_forms::tests::RecordingSink;
    use crate::session::io_store::{COMPLETED_KEY, STATE_KEY};

    fn settings(require_answer_to_advance: bool) -> SessionSettings {
        SessionSettings {
            survey: SurveyConfig {
                sections: vec![
                    Section {
                        id: 1,
                        kind: MediaType::Tg,
                        name: "Telegiornali".to_string(),
                    },
                    Section {
                        id: 4,
                        kind: MediaType::Radio,
                        name: "Programmi radiofonici".to_string(),
                    },
                ],
                comparisons_per_section: 2,
                mainstream_outlets: vec!["tg1".to_string()],
            },
            require_answer_to_advance,
        }
    }

    fn catalog(config: &SurveyConfig) -> OutletCatalog {
        let mut b = CatalogBuilder::new(config);
        b.add_outlet_simple("tg1", "TG1", MediaType::Tg);
        b.add_outlet_simple("tg2", "TG2", MediaType::Tg);
        b.add_outlet_simple("tg3", "TG3", MediaType::Tg);
        b.add_outlet_simple("radio1", "Radio 1", MediaType::Radio);
        b.add_outlet_simple("radio2", "Radio 2", MediaType::Radio);
        b.build().unwrap()
    }

    struct Harness {
        store: MemoryStore,
        sink: Arc<RecordingSink>,
        dispatcher: Dispatcher,
        settings: SessionSettings,
        catalog: OutletCatalog,
    }

    impl Harness {
        fn new(require_answer_to_advance: bool) -> Harness {
            let sink = Arc::new(RecordingSink::default());
            let settings = settings(require_answer_to_advance);
            Harness {
                store: MemoryStore::new(),
                dispatcher: Dispatcher::new(sink.clone()),
                sink,
                catalog: catalog(&settings.survey),
                settings,
            }
        }

        async fn run(&mut self, input: &str) -> (SessionOutcome, String) {
            let mut term = Terminal::new(input.as_bytes(), Vec::new());
            let outcome = run_session(
                &mut term,
                &mut self.store,
                &mut self.dispatcher,
                &self.catalog,
                &self.settings,
                &mut StdRng::seed_from_u64(11),
            )
            .await
            .unwrap();
            self.dispatcher.settle().await;
            (outcome, String::from_utf8(term.output().clone()).unwrap())
        }

        fn saved(&self) -> Option<SurveyState> {
            load_progress(&self.store).and_then(|s| s.state().cloned())
        }
    }

    #[test]
    fn commands() {
        assert_eq!(parse_command(" 1 "), Some(Command::Left));
        assert_eq!(parse_command("D"), Some(Command::DontKnow));
        assert_eq!(parse_command(""), Some(Command::Next));
        assert_eq!(parse_command("p"), Some(Command::Previous));
        assert_eq!(parse_command("3"), None);
    }

    #[tokio::test]
    async fn declining_saves_nothing() {
        let mut h = Harness::new(true);
        let (outcome, _) = h.run("maybe\nn\n").await;
        assert_eq!(outcome, SessionOutcome::Declined);
        assert_eq!(h.store.get(STATE_KEY), None);
        assert!(h.sink.comparison_ids().is_empty());
    }

    #[tokio::test]
    async fn full_run_with_contact() {
        let mut h = Harness::new(true);
        let (outcome, out) = h.run("y\n1\nn\n2\nn\nd\nn\n1\nn\nme@example.org\n").await;
        assert_eq!(
            outcome,
            SessionOutcome::Finished {
                contact_shared: true
            }
        );
        assert!(out.contains("[n] finish"));
        assert!(out.contains("Thank you, your email address has been recorded."));

        let received = h.sink.received.lock().unwrap().clone();
        assert_eq!(received.len(), 8);
        let resent: Vec<&str> = received[4..]
            .iter()
            .map(|s| s.response.comparison_id.as_str())
            .collect();
        assert_eq!(resent, vec!["1-1", "1-2", "4-1", "4-2"]);
        assert!(received[..4].iter().all(|s| s.contact.is_none()));
        assert!(received[4..]
            .iter()
            .all(|s| s.contact.as_deref() == Some("me@example.org")));
        assert_eq!(received[6].response.chosen, Choice::DontKnow);

        // Nothing is left once the follow-up is over.
        assert_eq!(h.store.get(STATE_KEY), None);
        assert_eq!(h.store.get(COMPLETED_KEY), None);
    }

    #[tokio::test]
    async fn next_waits_for_an_answer() {
        let mut h = Harness::new(true);
        let (outcome, out) = h.run("y\nn\nq\n").await;
        assert_eq!(outcome, SessionOutcome::Suspended);
        assert!(out.contains("Pick an answer before moving on."));
        assert_eq!(h.saved().unwrap().position(), SurveyPosition::ORIGIN);
    }

    #[tokio::test]
    async fn next_without_answer_when_allowed() {
        let mut h = Harness::new(false);
        h.run("y\nn\nq\n").await;
        let state = h.saved().unwrap();
        assert_eq!(state.position().current_comparison, 1);
        assert!(state.responses().is_empty());
    }

    #[tokio::test]
    async fn suspend_and_resume_keeps_the_pairs() {
        let mut h = Harness::new(true);
        let (outcome, _) = h.run("y\n1\nn\nq\n").await;
        assert_eq!(outcome, SessionOutcome::Suspended);
        let before = h.saved().unwrap();
        assert_eq!(before.position().current_comparison, 1);
        assert_eq!(before.responses().len(), 1);

        // No consent question the second time.
        let (outcome, out) = h.run("2\np\np\n").await;
        assert_eq!(outcome, SessionOutcome::Suspended);
        assert!(out.contains("Welcome back"));
        assert!(!out.contains("Do you agree"));
        let after = h.saved().unwrap();
        assert_eq!(after.pairs(), before.pairs());
        assert_eq!(after.respondent_id(), before.respondent_id());
        assert_eq!(after.responses().len(), 2);
        assert_eq!(after.position(), SurveyPosition::ORIGIN);
    }

    #[tokio::test]
    async fn corrupt_progress_asks_for_consent_again() {
        let mut h = Harness::new(true);
        h.store
            .set(STATE_KEY, "{\"respondentId\": 3}".to_string())
            .unwrap();
        let (outcome, out) = h.run("n\n").await;
        assert_eq!(outcome, SessionOutcome::Declined);
        assert!(out.contains("Do you agree"));
    }

    #[tokio::test]
    async fn invalid_contact_is_asked_again_then_skipped() {
        let mut h = Harness::new(false);
        let (outcome, out) = h.run("y\n1\nn\nn\nn\nn\nnot-an-email\n\n").await;
        assert_eq!(
            outcome,
            SessionOutcome::Finished {
                contact_shared: false
            }
        );
        assert!(out.contains("Please enter a valid email address."));
        assert_eq!(h.sink.comparison_ids(), vec!["1-1"]);
        assert_eq!(h.store.get(COMPLETED_KEY), None);
    }

    #[tokio::test]
    async fn pending_completion_goes_straight_to_the_contact() {
        let mut h = Harness::new(false);
        let (outcome, _) = h.run("y\nd\nn\nn\nn\nn\n").await;
        // The input ends on the contact question.
        assert_eq!(outcome, SessionOutcome::Suspended);
        assert_eq!(h.store.get(COMPLETED_KEY).as_deref(), Some("true"));

        let (outcome, out) = h.run("me@example.org\n").await;
        assert_eq!(
            outcome,
            SessionOutcome::Finished {
                contact_shared: true
            }
        );
        assert!(!out.contains("Do you agree"));
        assert_eq!(h.sink.comparison_ids(), vec!["1-1", "1-1"]);
    }

    #[tokio::test]
    async fn retreat_at_the_start_stays_put() {
        let mut h = Harness::new(true);
        let (_, out) = h.run("y\np\nfoo\nq\n").await;
        assert!(out.contains("Unknown command \"foo\""));
        assert_eq!(h.saved().unwrap().position(), SurveyPosition::ORIGIN);
    }

    #[tokio::test]
    async fn catalog_without_comparisons() {
        let mut h = Harness::new(true);
        let mut b = CatalogBuilder::new(&h.settings.survey);
        b.add_outlet_simple("tg1", "TG1", MediaType::Tg);
        h.catalog = b.build().unwrap();
        let mut term = Terminal::new("y\n".as_bytes(), Vec::new());
        let res = run_session(
            &mut term,
            &mut h.store,
            &mut h.dispatcher,
            &h.catalog,
            &h.settings,
            &mut StdRng::seed_from_u64(0),
        )
        .await;
        assert!(matches!(
            res,
            Err(SessionError::Survey {
                source: SurveyError::NoComparisons
            })
        ));
    }
}
