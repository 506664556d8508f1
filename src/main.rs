//! Command-line front end to the corpus ngram engine
//!
//! Every command opens the database, does its thing, and prints its result to
//! stdout as JSON. Diagnostics go to syslog.

use anyhow::Context;
use clap::{Parser, Subcommand};
use corpus_ngrams::{
    config::{Config, DEFAULT_BUSY_TIMEOUT_MS},
    generation::Generation,
    lifecycle,
    process::{self, DatabaseJobRunner},
    query, sequence, CorpusDraft, CorpusId, MatchCount, ProcessId, SequenceMember, SequenceRange,
    SequenceType, Slot, Store, StoreConfig,
};
use dialoguer::FuzzySelect;
use log::LevelFilter;
use serde::Serialize;
use std::{
    collections::BTreeSet,
    fs::File,
    io::{BufRead, BufReader, Write},
    num::NonZeroUsize,
    path::PathBuf,
    sync::Arc,
};

/// Ngram frequency time series over text corpora
///
/// Corpora are bucketed along a sequence axis (dates by year, month or day,
/// or plain numbers). Ngram counts are produced by generation runs, of which
/// at most one may be active at any given time.
#[derive(Parser, Debug)]
#[command(version, author)]
struct Args {
    /// Location of the SQLite database
    ///
    /// It will be created if it does not exist yet.
    #[arg(short, long, default_value = "ngram.sqlite3")]
    database: PathBuf,

    /// How long to wait for another process to release the database, in
    /// milliseconds
    #[arg(long, default_value_t = DEFAULT_BUSY_TIMEOUT_MS)]
    busy_timeout: u64,

    /// Max number of buckets in a gap-filled sequence axis
    ///
    /// Gap filling produces one bucket per member of the sequence between the
    /// extremes of the data. With day-level bucketing, a careless range can
    /// make that very large, so we refuse to go beyond this many buckets.
    #[arg(long, default_value = "100000")]
    max_fill: NonZeroUsize,

    /// What should be done
    #[command(subcommand)]
    command: Command,
}
//
impl Args {
    /// Split into the engine configuration and the requested command
    fn into_config(self) -> (Arc<Config>, Command) {
        let Self {
            database,
            busy_timeout,
            max_fill,
            command,
        } = self;
        let store = StoreConfig {
            path: Some(database),
            busy_timeout_ms: busy_timeout,
        };
        (Config::new(store, max_fill), command)
    }
}

/// Top-level command
#[derive(Subcommand, Debug)]
enum Command {
    /// Create, inspect and remove corpora
    #[command(subcommand)]
    Corpus(CorpusCommand),

    /// Relative frequency of an ngram in each sequence bucket
    Query {
        #[command(flatten)]
        target: NgramArgs,

        /// Emit a point for every bucket of the sequence axis, with a zero
        /// frequency where the ngram was not observed
        #[arg(long)]
        dense: bool,
    },

    /// Number of matches of an ngram
    Count {
        #[command(flatten)]
        target: NgramArgs,
    },

    /// Number of ngrams of some length observed within a corpus
    Total {
        /// Corpus identifier
        corpus: CorpusId,

        /// Ngram length
        #[arg(short, long, default_value = "1")]
        n: u32,

        #[command(flatten)]
        bounds: BoundArgs,
    },

    /// List the supported sequence types, with their graph configuration
    SequenceTypes,

    /// Fill the gaps in a set of sequence members
    Fill {
        /// Sequence type key
        sequence_type: String,

        /// Observed sequence members
        #[arg(allow_negative_numbers = true)]
        members: Vec<SequenceMember>,

        /// Range that the filled sequence should span, as START-END
        #[arg(short, long, default_value = "", allow_hyphen_values = true)]
        range: String,
    },

    /// Check a sequence range against a sequence type
    Validate {
        /// Sequence type key
        sequence_type: String,

        /// Sequence range, as START-END with optional sides
        #[arg(allow_hyphen_values = true)]
        range: String,
    },

    /// Inspect and control ngram generation runs
    #[command(subcommand)]
    Generation(GenerationCommand),
}

/// Corpus management commands
#[derive(Subcommand, Debug)]
enum CorpusCommand {
    /// Create a new corpus
    Create {
        /// Human-readable name
        name: String,

        #[command(flatten)]
        fields: CorpusFields,
    },

    /// Edit an existing corpus
    ///
    /// Only the fields that are specified are changed. The bucketing of a
    /// corpus cannot change while it has an active generation run.
    Edit {
        /// Corpus identifier
        id: CorpusId,

        /// New name
        #[arg(long)]
        name: Option<String>,

        #[command(flatten)]
        fields: CorpusFields,
    },

    /// List every corpus
    List,

    /// Show a single corpus
    Show {
        /// Corpus identifier
        id: CorpusId,
    },

    /// Delete a corpus along with its ngram data
    Delete {
        /// Corpus identifier
        id: CorpusId,
    },

    /// Delete a corpus' ngram data, but keep the corpus
    Clear {
        /// Corpus identifier
        id: CorpusId,
    },
}

/// Corpus settings that can be specified on the command line
#[derive(clap::Args, Debug)]
struct CorpusFields {
    /// Record element from which ngrams are extracted
    #[arg(short, long)]
    text_element: Option<i64>,

    /// Record element that decides the sequence bucket of each record
    #[arg(short = 'e', long)]
    sequence_element: Option<i64>,

    /// Sequence type key
    ///
    /// Will interactively prompt for a sequence type if not specified when
    /// creating a corpus.
    #[arg(short, long)]
    sequence_type: Option<String>,

    /// Sequence range, as START-END with optional sides
    #[arg(short, long, allow_hyphen_values = true)]
    range: Option<String>,
}

/// Generation management commands
#[derive(Subcommand, Debug)]
enum GenerationCommand {
    /// Tell whether a generation run may start, and show every process slot
    Status,

    /// Free the slots of errored and hung generation runs
    Reset,

    /// Run a generation phase from a tab-separated file
    ///
    /// Each line has the form NGRAM<TAB>MEMBER<TAB>COUNT. Lines whose ngram is
    /// empty record the total number of ngrams in a bucket instead.
    Load {
        /// Corpus identifier
        corpus: CorpusId,

        /// Generation phase (1 for unigrams, 2 for bigrams)
        #[arg(short, long)]
        phase: u32,

        /// Input file
        input: PathBuf,
    },
}

/// Ngram query target
#[derive(clap::Args, Debug)]
struct NgramArgs {
    /// Corpus identifier
    corpus: CorpusId,

    /// Ngram of interest
    ngram: String,

    #[command(flatten)]
    bounds: BoundArgs,
}

/// Optional query bounds
///
/// Bounds that are not numbers are ignored.
#[derive(clap::Args, Debug)]
struct BoundArgs {
    /// First sequence bucket of interest
    #[arg(long, allow_negative_numbers = true)]
    start: Option<String>,

    /// Last sequence bucket of interest
    #[arg(long, allow_negative_numbers = true)]
    end: Option<String>,
}
//
impl BoundArgs {
    /// Turn into a query range
    fn range(&self) -> SequenceRange {
        SequenceRange::lenient(self.start.as_deref(), self.end.as_deref())
    }
}

fn main() -> Result<()> {
    // Set up logging
    setup_logging().map_err(|e| anyhow::format_err!("{e}"))?;

    // Decode CLI arguments
    let (config, command) = Args::parse().into_config();
    log::debug!("Using configuration {config:?}");

    // Execute the command, only opening the database if it's needed
    let open_store = || {
        Store::open(&config.store)
            .with_context(|| format!("opening ngram database {:?}", config.store.path))
    };
    match command {
        Command::Corpus(command) => run_corpus_command(&mut open_store()?, command),
        Command::Query { target, dense } => {
            let store = open_store()?;
            let bounds = target.bounds.range();
            let points = if dense {
                let corpus = store.corpus(target.corpus)?;
                query::filled_frequencies(&store, &corpus, &target.ngram, &bounds, config.max_fill.get())?
            } else {
                query::frequencies(&store, target.corpus, &target.ngram, &bounds)?
            };
            print_json(&points)
        }
        Command::Count { target } => print_json(&query::ngram_count(
            &open_store()?,
            target.corpus,
            &target.ngram,
            &target.bounds.range(),
        )?),
        Command::Total { corpus, n, bounds } => print_json(&query::total_ngram_count(
            &open_store()?,
            corpus,
            n,
            &bounds.range(),
        )?),
        Command::SequenceTypes => print_json(&sequence_types()),
        Command::Fill {
            sequence_type,
            members,
            range,
        } => print_json(&fill(&config, &sequence_type, members, &range)?),
        Command::Validate {
            sequence_type,
            range,
        } => print_json(&validate(&sequence_type, &range)?),
        Command::Generation(command) => {
            run_generation_command(&config, &mut open_store()?, command)
        }
    }
}

/// Use anyhow for Result type erasure
pub use anyhow::Result;

/// Sequence type, as listed by the `sequence-types` command
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SequenceTypeInfo {
    key: &'static str,
    label: &'static str,
    graph_config: sequence::GraphConfig,
}

/// List the supported sequence types
fn sequence_types() -> Vec<SequenceTypeInfo> {
    SequenceType::ALL
        .iter()
        .map(|ty| SequenceTypeInfo {
            key: ty.key(),
            label: ty.label(),
            graph_config: ty.graph_config(),
        })
        .collect()
}

/// Fill the gaps in a user-specified sequence
fn fill(
    config: &Config,
    sequence_type: &str,
    members: Vec<SequenceMember>,
    range: &str,
) -> Result<Vec<SequenceMember>> {
    let sequence_type = sequence_type.parse::<SequenceType>()?;
    let range = sequence_type
        .validator()
        .validate(range)
        .with_context(|| format!("checking {sequence_type} range {range:?}"))?;
    let members = members.into_iter().collect::<BTreeSet<_>>();
    Ok(sequence_type
        .filler()
        .fill(&members, &range, config.max_fill.get())?)
}

/// Outcome of the `validate` command
#[derive(Serialize)]
struct Validation {
    valid: bool,
    normalized: Option<String>,
    error: Option<String>,
}

/// Check a user-specified sequence range
fn validate(sequence_type: &str, range: &str) -> Result<Validation> {
    let sequence_type = sequence_type.parse::<SequenceType>()?;
    Ok(match sequence_type.validator().validate(range) {
        Ok(range) => Validation {
            valid: true,
            normalized: Some(sequence_type.format_range(&range)),
            error: None,
        },
        Err(e) => Validation {
            valid: false,
            normalized: None,
            error: Some(e.to_string()),
        },
    })
}

/// Execute a corpus management command
fn run_corpus_command(store: &mut Store, command: CorpusCommand) -> Result<()> {
    match command {
        CorpusCommand::Create { name, fields } => {
            let sequence_type = match fields.sequence_type {
                Some(sequence_type) => sequence_type,
                None => prompt_sequence_type()?,
            };
            let draft = CorpusDraft {
                name,
                text_element_id: fields
                    .text_element
                    .context("a text element is needed to create a corpus")?,
                sequence_element_id: fields
                    .sequence_element
                    .context("a sequence element is needed to create a corpus")?,
                sequence_type,
                sequence_range: fields.range.unwrap_or_default(),
            };
            let id = store.create_corpus(&draft)?;
            print_json(&store.corpus(id)?)
        }
        CorpusCommand::Edit { id, name, fields } => {
            let current = store.corpus(id)?;
            let draft = CorpusDraft {
                name: name.unwrap_or_else(|| current.name.to_string()),
                text_element_id: fields.text_element.unwrap_or(current.text_element_id),
                sequence_element_id: fields
                    .sequence_element
                    .unwrap_or(current.sequence_element_id),
                sequence_type: fields
                    .sequence_type
                    .unwrap_or_else(|| current.sequence_type.key().to_owned()),
                sequence_range: fields
                    .range
                    .unwrap_or_else(|| current.sequence_type.format_range(&current.sequence_range)),
            };
            store.update_corpus(id, &draft)?;
            print_json(&store.corpus(id)?)
        }
        CorpusCommand::List => print_json(&store.corpora()?),
        CorpusCommand::Show { id } => print_json(&store.corpus(id)?),
        CorpusCommand::Delete { id } => {
            store.delete_corpus(id)?;
            print_json(&id)
        }
        CorpusCommand::Clear { id } => {
            store.corpus(id)?;
            lifecycle::delete_ngram_facts(store, id)?;
            lifecycle::delete_total_counts(store, id)?;
            print_json(&id)
        }
    }
}

/// Ask the user to select a sequence type
fn prompt_sequence_type() -> Result<String> {
    let choices = sequence::for_select();
    let labels = choices.iter().map(|(_key, label)| *label).collect::<Vec<_>>();
    let choice = FuzzySelect::new()
        .with_prompt("How should this corpus be sequenced?")
        .items(&labels)
        .default(0)
        .interact()
        .context("prompting for a sequence type")?;
    let (key, _label) = choices[choice];
    anyhow::ensure!(!key.is_empty(), "no sequence type was selected");
    Ok(key.to_owned())
}

/// Process slot, as reported by `generation status`
#[derive(Serialize)]
struct SlotStatus {
    corpus: CorpusId,
    slot: Slot,
    process: ProcessId,
    status: Option<process::ProcessStatus>,
}

/// Outcome of the `generation status` command
#[derive(Serialize)]
struct GenerationStatus {
    available: bool,
    slots: Vec<SlotStatus>,
}

/// Execute a generation management command
fn run_generation_command(
    config: &Config,
    store: &mut Store,
    command: GenerationCommand,
) -> Result<()> {
    match command {
        GenerationCommand::Status => {
            let mut slots = Vec::new();
            for corpus in store.corpora()? {
                for (slot, process) in corpus.slots.occupied() {
                    slots.push(SlotStatus {
                        corpus: corpus.id,
                        slot,
                        process,
                        status: store.process_status(process)?,
                    });
                }
            }
            print_json(&GenerationStatus {
                available: process::is_generation_available(store)?,
                slots,
            })
        }
        GenerationCommand::Reset => {
            let runner = DatabaseJobRunner::new(
                Store::open(&config.store).context("opening the job runner's connection")?,
            );
            print_json(&process::reset_stuck_processes(store, &runner)?)
        }
        GenerationCommand::Load {
            corpus,
            phase,
            input,
        } => {
            let slot = match phase {
                1 => Slot::N1,
                2 => Slot::N2,
                other => anyhow::bail!("there is no generation phase {other}"),
            };
            let file = File::open(&input)
                .with_context(|| format!("opening generation input {}", input.display()))?;
            let mut generation = Generation::begin(store, corpus, slot)?;
            match load_generation_input(&mut generation, BufReader::new(file)) {
                Ok(()) => {
                    let process = generation.process();
                    generation.commit()?;
                    print_json(&process)
                }
                Err(e) => {
                    generation.abort();
                    Err(e.context(format!("loading generation input {}", input.display())))
                }
            }
        }
    }
}

/// Feed a tab-separated generation input to a generation run
fn load_generation_input(generation: &mut Generation<'_>, input: impl BufRead) -> Result<()> {
    for (idx, line) in input.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut fields = line.split('\t');
        let (Some(ngram), Some(member), Some(count), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            anyhow::bail!("line {} does not have three tab-separated fields", idx + 1);
        };
        let member = member
            .trim()
            .parse::<SequenceMember>()
            .with_context(|| format!("parsing sequence member on line {}", idx + 1))?;
        let count = count
            .trim()
            .parse::<MatchCount>()
            .with_context(|| format!("parsing count on line {}", idx + 1))?;
        if ngram.trim().is_empty() {
            generation.record_total(member, count)?;
        } else {
            generation.record_ngram(ngram, member, count)?;
        }
    }
    Ok(())
}

/// Print a command's result to stdout
fn print_json(value: &impl Serialize) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value).context("serializing command output")?;
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}

/// Set up logging
fn setup_logging() -> syslog::Result<()> {
    syslog::init(
        syslog::Facility::LOG_USER,
        if cfg!(feature = "log-trace") {
            LevelFilter::Trace
        } else if cfg!(debug_assertions) {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        },
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Command {
        Args::try_parse_from(["corpus-ngrams"].iter().chain(args))
            .unwrap()
            .command
    }

    #[test]
    fn negative_query_bounds() {
        let Command::Query { target, .. } = parse(&["query", "1", "the", "--start", "-5", "--end", "-1"]) else {
            panic!("expected a query command");
        };
        assert_eq!(target.bounds.range(), SequenceRange::new(Some(-5), Some(-1)));

        let Command::Total { bounds, .. } = parse(&["total", "1", "--end=-3"]) else {
            panic!("expected a total command");
        };
        assert_eq!(bounds.range(), SequenceRange::new(None, Some(-3)));
    }

    #[test]
    fn ranges_may_start_with_a_separator() {
        let Command::Validate { range, .. } = parse(&["validate", "numeric", "-10--5"]) else {
            panic!("expected a validate command");
        };
        assert_eq!(range, "-10--5");

        let Command::Fill { members, range, .. } = parse(&["fill", "numeric", "-3", "2", "--range", "-5-"]) else {
            panic!("expected a fill command");
        };
        assert_eq!(members, [-3, 2]);
        assert_eq!(range, "-5-");
    }
}
