use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use ferrous_lastz::defaults;
use ferrous_lastz::lastz::opt::{
    AlignmentFilter, LastzOpt, OptionSet, OutputFormat, RefSource, Seed,
};
use ferrous_lastz::lastz::run::{AlignJob, main_align};
use ferrous_lastz::lastz::version::{UNKNOWN_VERSION, detect_version};
use ferrous_lastz::pipeline::{MergeOrder, PipelineConfig};

#[derive(Parser)]
#[command(name = "ferrous-lastz")]
#[command(about = "FerrousLastz - parallel LASTZ dispatcher with a merged output stream", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split the reference into per-sequence LASTZ jobs and merge their output
    Align {
        /// Reference (target) sequences: FASTA, or 2bit with --ref-source cached
        #[arg(long, value_name = "REF")]
        input1: PathBuf,

        /// Query sequences
        #[arg(long, value_name = "READS")]
        input2: PathBuf,

        /// Merged output file
        #[arg(short = 'o', long, value_name = "FILE")]
        output: PathBuf,

        /// Where the reference comes from: history, self or cached
        #[arg(long, value_name = "SOURCE", default_value = "history")]
        ref_source: RefSource,

        /// Number of sequences the FASTA reference is known to contain
        #[arg(long, value_name = "INT", allow_negative_numbers = true)]
        ref_sequences: Option<i64>,

        // ===== Processing Options =====
        /// Number of concurrent LASTZ processes (default: all available cores)
        #[arg(short = 't', long, value_name = "INT")]
        threads: Option<usize>,

        /// LASTZ executable
        #[arg(long, value_name = "PATH", default_value = defaults::LASTZ_BINARY)]
        lastz: String,

        /// Directory for per-job temporary files
        #[arg(long, value_name = "DIR")]
        tmp_dir: Option<PathBuf>,

        /// Pause after each job, in milliseconds
        #[arg(long, value_name = "MS", default_value_t = defaults::JOB_THROTTLE_MS)]
        throttle_ms: u64,

        /// Order of partial outputs in the merged file: completion or submission
        #[arg(long, value_name = "ORDER", default_value = "completion")]
        merge_order: MergeOrder,

        /// Leave temporary files of unmerged jobs behind when a run fails
        #[arg(long)]
        keep_orphans: bool,

        /// Verbose level: 1=error, 2=warning, 3=message, 4+=debugging
        #[arg(short = 'v', long, value_name = "INT", default_value_t = defaults::VERBOSITY)]
        verbosity: i32,

        #[command(flatten)]
        lastz_opts: LastzArgs,
    },

    /// Print the LASTZ version banner
    Version {
        /// LASTZ executable
        #[arg(long, value_name = "PATH", default_value = defaults::LASTZ_BINARY)]
        lastz: String,
    },
}

/// Options passed through to every LASTZ job
#[derive(Args)]
struct LastzArgs {
    /// Option set: preset (strand/ambiguity/shortcut only) or full
    #[arg(long, value_name = "SET", default_value = "full")]
    option_set: OptionSet,

    /// Rename target sequences in the output
    #[arg(long, value_name = "NAME")]
    ref_name: Option<String>,

    /// Skip the mirror-image alignments of a self comparison
    #[arg(long)]
    nomirror: bool,

    /// Don't report the trivial self-alignment block
    #[arg(long)]
    notrivial: bool,

    // ===== Scoring Options =====
    /// Match reward
    #[arg(long, value_name = "INT")]
    match_reward: Option<u32>,

    /// Mismatch penalty (default: same as the reward)
    #[arg(long, value_name = "INT")]
    match_penalty: Option<u32>,

    // ===== Extension Options =====
    /// Skip gapped extension
    #[arg(long)]
    nogapped: bool,

    /// Gap open penalty
    #[arg(long, value_name = "INT")]
    gap_open: Option<u32>,

    /// Gap extension penalty
    #[arg(long, value_name = "INT")]
    gap_extend: Option<u32>,

    /// Gapped extension drop-off
    #[arg(long, value_name = "INT")]
    ydrop: Option<u32>,

    /// Don't trim gapped extensions that hit the drop-off
    #[arg(long)]
    noytrim: bool,

    /// Score threshold for gapped alignments
    #[arg(long, value_name = "INT")]
    gappedthresh: Option<u32>,

    /// Score threshold for interpolated alignments between HSPs
    #[arg(long, value_name = "INT")]
    inner: Option<u32>,

    /// Ungapped extension drop-off
    #[arg(long, value_name = "INT")]
    xdrop: Option<u32>,

    /// Score threshold for ungapped HSPs
    #[arg(long, value_name = "INT")]
    hspthresh: Option<u32>,

    /// Don't adjust HSP scores for entropy
    #[arg(long)]
    noentropy: bool,

    /// Chain HSPs before gapped extension
    #[arg(long)]
    chain: bool,

    // ===== Seeding Options =====
    /// Offset between target seed positions
    #[arg(long, value_name = "INT")]
    step: Option<u32>,

    /// Dynamic masking threshold
    #[arg(long, value_name = "INT")]
    masking: Option<u32>,

    /// Seed: match<LEN> or a spaced-seed pattern
    #[arg(long, value_name = "SEED")]
    seed: Option<Seed>,

    /// Transitions allowed in a seed hit (0 disables)
    #[arg(long, value_name = "INT", default_value = "1")]
    transition: u8,

    /// Alignment filter: identity:MIN[..MAX], coverage:MIN[..MAX], nmatch:N or nmismatch:N
    #[arg(long, value_name = "KIND:VALUE")]
    filter: Option<AlignmentFilter>,

    // ===== Always-passed Options =====
    /// Query strand(s) to search: both, plus or minus
    #[arg(long, value_name = "STRAND", default_value = defaults::STRAND, value_parser = LastzOpt::parse_strand)]
    strand: String,

    /// Ambiguous nucleotide handling (e.g. n, iupac)
    #[arg(long, value_name = "MODE")]
    ambiguous: Option<String>,

    /// Yasra shortcut, e.g. yasra95short
    #[arg(long, value_name = "NAME")]
    yasra: Option<String>,

    /// Output format: sam, diffs, tabular or any LASTZ format name
    #[arg(long, value_name = "FORMAT", default_value = defaults::OUTPUT_FORMAT)]
    format: OutputFormat,
}

impl LastzArgs {
    fn into_opt(self, ref_source: RefSource) -> LastzOpt {
        LastzOpt {
            option_set: self.option_set,
            ref_source,
            ref_name: self.ref_name,
            no_mirror: self.nomirror,
            no_trivial: self.notrivial,
            match_reward: self.match_reward,
            match_penalty: self.match_penalty,
            gapped: !self.nogapped,
            gap_open: self.gap_open,
            gap_extend: self.gap_extend,
            ydrop: self.ydrop,
            ytrim: !self.noytrim,
            gapped_thresh: self.gappedthresh,
            inner: self.inner,
            step: self.step,
            masking: self.masking,
            seed: self.seed,
            transition: self.transition,
            xdrop: self.xdrop,
            hsp_thresh: self.hspthresh,
            entropy: !self.noentropy,
            chain: self.chain,
            filter: self.filter,
            strand: self.strand,
            ambiguous: self.ambiguous,
            yasra_shortcut: self.yasra,
            format: self.format,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Version { lastz } => {
            match detect_version(&lastz) {
                Some(line) => println!("{}", line),
                None => println!("{}", UNKNOWN_VERSION),
            }
        }

        Commands::Align {
            input1,
            input2,
            output,
            ref_source,
            ref_sequences,
            threads,
            lastz,
            tmp_dir,
            throttle_ms,
            merge_order,
            keep_orphans,
            verbosity,
            lastz_opts,
        } => {
            // Map verbosity (1=error, 2=warning, 3=message, 4=debug, 5+=trace)
            // to Rust log levels
            let log_level = match verbosity {
                v if v <= 1 => log::LevelFilter::Error,
                2 => log::LevelFilter::Warn,
                3 => log::LevelFilter::Info,
                4 => log::LevelFilter::Debug,
                _ => log::LevelFilter::Trace,
            };

            env_logger::Builder::from_default_env()
                .filter_level(log_level)
                .format_timestamp(None) // Don't show timestamps
                .format_target(false) // Don't show module names
                .init();

            // Default to number of CPU cores if not specified
            let mut num_threads = threads.unwrap_or_else(num_cpus::get);

            if num_threads < 1 {
                log::warn!("Invalid thread count {}, using 1 thread", num_threads);
                num_threads = 1;
            }

            // Each job is a whole LASTZ process; more than this only thrashes
            let max_threads = num_cpus::get() * 2;
            if num_threads > max_threads {
                log::warn!(
                    "Thread count {} exceeds recommended maximum {}, capping at {}",
                    num_threads,
                    max_threads,
                    max_threads
                );
                num_threads = max_threads;
            }

            let mut pipeline = PipelineConfig::with_threads(num_threads)
                .with_throttle(Duration::from_millis(throttle_ms));
            pipeline.merge_order = merge_order;
            pipeline.sweep_on_abort = !keep_orphans;

            let job = AlignJob {
                reference: input1,
                query: input2,
                output,
                lastz,
                tmp_dir: tmp_dir.unwrap_or_else(std::env::temp_dir),
                ref_sequences,
                opt: lastz_opts.into_opt(ref_source),
                pipeline,
            };

            if let Err(e) = main_align(&job) {
                log::error!("{:#}", e);
                std::process::exit(1);
            }
        }
    }
}
