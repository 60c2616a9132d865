// src/lastz/opt.rs
//
// LASTZ options and their translation into command-line arguments.

use std::fmt;
use std::str::FromStr;

use crate::defaults;

#[cfg(test)]
#[path = "opt_test.rs"]
mod opt_test;

/// Where the target (reference) sequences come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefSource {
    /// FASTA dataset supplied by the user.
    #[default]
    History,
    /// The query file aligned against itself; also a FASTA dataset.
    SelfRef,
    /// Locally cached 2bit archive.
    Cached,
}

impl RefSource {
    /// FASTA sources are split per record, 2bit archives per chromosome.
    pub fn is_fasta(self) -> bool {
        !matches!(self, RefSource::Cached)
    }
}

impl FromStr for RefSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "history" => Ok(RefSource::History),
            "self" => Ok(RefSource::SelfRef),
            "cached" => Ok(RefSource::Cached),
            _ => Err(format!(
                "Invalid reference source '{}': expected history, self or cached",
                s
            )),
        }
    }
}

/// Preset mode passes only the strand/ambiguity/shortcut options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptionSet {
    PreSet,
    #[default]
    Full,
}

impl FromStr for OptionSet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pre_set" | "preset" => Ok(OptionSet::PreSet),
            "full" => Ok(OptionSet::Full),
            _ => Err(format!("Invalid option set '{}': expected preset or full", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seed {
    /// `--seed=match<N>`: exact-match words of length N.
    Match(u32),
    /// Any other seed pattern, passed through (e.g. `12of19`, `half`).
    Pattern(String),
}

impl FromStr for Seed {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err("Seed pattern must not be empty".to_string());
        }
        match s.strip_prefix("match") {
            Some(len) => len
                .parse::<u32>()
                .map(Seed::Match)
                .map_err(|_| format!("Invalid match seed length: {}", s)),
            None => Ok(Seed::Pattern(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlignmentFilter {
    Identity { min: f64, max: Option<f64> },
    Coverage { min: f64, max: Option<f64> },
    NMatch(u32),
    NMismatch(u32),
}

/// Parse "MIN" or "MIN..MAX"
fn parse_range(kind: &str, s: &str) -> Result<(f64, Option<f64>), String> {
    let (min, max) = match s.split_once("..") {
        Some((min, max)) => (min, Some(max)),
        None => (s, None),
    };
    let min = min
        .parse::<f64>()
        .map_err(|_| format!("Invalid {} minimum: {}", kind, min))?;
    let max = match max {
        Some(m) => Some(
            m.parse::<f64>()
                .map_err(|_| format!("Invalid {} maximum: {}", kind, m))?,
        ),
        None => None,
    };
    Ok((min, max))
}

impl FromStr for AlignmentFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, value) = s
            .split_once(':')
            .ok_or_else(|| format!("Filter must be KIND:VALUE: {}", s))?;
        match kind {
            "identity" => {
                let (min, max) = parse_range(kind, value)?;
                Ok(AlignmentFilter::Identity { min, max })
            }
            "coverage" => {
                let (min, max) = parse_range(kind, value)?;
                Ok(AlignmentFilter::Coverage { min, max })
            }
            "nmatch" => value
                .parse::<u32>()
                .map(AlignmentFilter::NMatch)
                .map_err(|_| format!("Invalid nmatch minimum: {}", value)),
            "nmismatch" => value
                .parse::<u32>()
                .map(AlignmentFilter::NMismatch)
                .map_err(|_| format!("Invalid nmismatch maximum: {}", value)),
            _ => Err(format!(
                "Unknown filter '{}': expected identity, coverage, nmatch or nmismatch",
                kind
            )),
        }
    }
}

/// An unset or non-increasing upper bound means "up to 100%".
fn percent_max(min: f64, max: Option<f64>) -> f64 {
    match max {
        Some(m) if m > 0.0 && m > min => m,
        _ => 100.0,
    }
}

impl fmt::Display for AlignmentFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlignmentFilter::Identity { min, max } => {
                write!(f, "identity:{}..{}", min, percent_max(*min, *max))
            }
            AlignmentFilter::Coverage { min, max } => {
                write!(f, "coverage:{}..{}", min, percent_max(*min, *max))
            }
            AlignmentFilter::NMatch(n) => write!(f, "nmatch:{}", n),
            AlignmentFilter::NMismatch(n) => write!(f, "nmismatch:0..{}", n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Sam,
    /// Adds the `[fullnames]` modifier to the query.
    Diffs,
    /// LASTZ `general-` output with a fixed column list.
    Tabular,
    Other(String),
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Err("Output format must not be empty".to_string()),
            "sam" => Ok(OutputFormat::Sam),
            "diffs" => Ok(OutputFormat::Diffs),
            "tabular" => Ok(OutputFormat::Tabular),
            other => Ok(OutputFormat::Other(other.to_string())),
        }
    }
}

impl OutputFormat {
    pub fn format_arg(&self) -> String {
        match self {
            OutputFormat::Sam => "--format=sam".to_string(),
            OutputFormat::Diffs => "--format=diffs".to_string(),
            OutputFormat::Tabular => format!("--format=general-{}", defaults::TABULAR_FIELDS),
            OutputFormat::Other(name) => format!("--format={}", name),
        }
    }
}

/// LASTZ invocation options.
///
/// `None` means "leave LASTZ's own default in place"; the translation in
/// [`LastzOpt::arguments`] emits nothing for it.
#[derive(Debug, Clone, PartialEq)]
pub struct LastzOpt {
    pub option_set: OptionSet,
    pub ref_source: RefSource,
    /// Rename every target match to this name (`[nickname=...]`).
    pub ref_name: Option<String>,

    // Self-alignment / trivial block handling
    pub no_mirror: bool,
    pub no_trivial: bool,

    // Scoring
    pub match_reward: Option<u32>,
    pub match_penalty: Option<u32>,

    // Gapped extension
    pub gapped: bool,
    pub gap_open: Option<u32>,
    pub gap_extend: Option<u32>,
    pub ydrop: Option<u32>,
    pub ytrim: bool,
    pub gapped_thresh: Option<u32>,
    pub inner: Option<u32>,

    // Seeding
    pub step: Option<u32>,
    pub masking: Option<u32>,
    pub seed: Option<Seed>,
    pub transition: u8,

    // Ungapped extension
    pub xdrop: Option<u32>,
    pub hsp_thresh: Option<u32>,
    pub entropy: bool,
    pub chain: bool,

    pub filter: Option<AlignmentFilter>,

    // Always emitted
    pub strand: String,
    pub ambiguous: Option<String>,
    pub yasra_shortcut: Option<String>,
    pub format: OutputFormat,
}

impl Default for LastzOpt {
    fn default() -> Self {
        Self {
            option_set: OptionSet::default(),
            ref_source: RefSource::default(),
            ref_name: None,
            no_mirror: false,
            no_trivial: false,
            match_reward: None,
            match_penalty: None,
            gapped: true,
            gap_open: None,
            gap_extend: None,
            ydrop: None,
            ytrim: true,
            gapped_thresh: None,
            inner: None,
            step: None,
            masking: None,
            seed: None,
            transition: 1,
            xdrop: None,
            hsp_thresh: None,
            entropy: true,
            chain: false,
            filter: None,
            strand: defaults::STRAND.to_string(),
            ambiguous: None,
            yasra_shortcut: None,
            format: OutputFormat::default(),
        }
    }
}

/// Zero means "unset" for numeric options.
fn nonzero(v: Option<u32>) -> Option<u32> {
    v.filter(|&x| x != 0)
}

impl LastzOpt {
    /// Parse a strand name
    pub fn parse_strand(s: &str) -> Result<String, String> {
        match s {
            "both" | "plus" | "minus" => Ok(s.to_string()),
            _ => Err(format!(
                "Invalid strand '{}': expected both, plus or minus",
                s
            )),
        }
    }

    /// Modifier appended to every target specifier.
    pub fn target_modifier(&self) -> String {
        match &self.ref_name {
            Some(name) if !name.is_empty() => format!("[nickname={}]", name),
            _ => String::new(),
        }
    }

    /// Query specifier, with `[fullnames]` for diffs output.
    pub fn query_spec(&self, query: &str) -> String {
        match self.format {
            OutputFormat::Diffs => format!("{}[fullnames]", query),
            _ => query.to_string(),
        }
    }

    /// Translate the options into LASTZ arguments, `--format` last.
    pub fn arguments(&self) -> Vec<String> {
        let mut args = Vec::new();
        let self_ref = self.ref_source == RefSource::SelfRef;

        // --mirror only exists for --self references
        if self_ref && self.no_mirror {
            args.push("--nomirror".to_string());
        }

        if self.option_set == OptionSet::Full {
            if !self_ref && self.no_trivial {
                args.push("--notrivial".to_string());
            }
            self.push_scoring(&mut args);
            self.push_extension(&mut args);
            self.push_seeding(&mut args);
            if let Some(filter) = &self.filter {
                args.push(format!("--filter={}", filter));
            }
        }

        args.push(format!("--strand={}", self.strand));
        if let Some(ambiguous) = &self.ambiguous {
            args.push(format!("--ambiguous={}", ambiguous));
        }
        if let Some(shortcut) = &self.yasra_shortcut {
            args.push(format!("--{}", shortcut));
        }
        args.push(self.format.format_arg());
        args
    }

    fn push_scoring(&self, args: &mut Vec<String>) {
        if let Some(reward) = nonzero(self.match_reward) {
            let penalty = nonzero(self.match_penalty).unwrap_or(reward);
            args.push(format!("--match={},{}", reward, penalty));
        }
    }

    fn push_extension(&self, args: &mut Vec<String>) {
        if self.gapped {
            args.push("--gapped".to_string());
            match (self.gap_open, self.gap_extend) {
                (Some(open), Some(extend)) => args.push(format!("--gap={},{}", open, extend)),
                (Some(open), None) => args.push(format!("--gap={}", open)),
                _ => {}
            }
            if let Some(ydrop) = nonzero(self.ydrop) {
                args.push(format!("--ydrop={}", ydrop));
            }
            if !self.ytrim {
                args.push("--noytrim".to_string());
            }
            if let Some(thresh) = nonzero(self.gapped_thresh) {
                args.push(format!("--gappedthresh={}", thresh));
            }
            if let Some(inner) = self.inner {
                args.push(format!("--inner={}", inner));
            }
        } else {
            args.push("--nogapped".to_string());
        }

        if let Some(xdrop) = nonzero(self.xdrop) {
            args.push(format!("--xdrop={}", xdrop));
        }
        if let Some(thresh) = nonzero(self.hsp_thresh) {
            args.push(format!("--hspthresh={}", thresh));
        }
        args.push(if self.entropy { "--entropy" } else { "--noentropy" }.to_string());
        args.push(if self.chain { "--chain" } else { "--nochain" }.to_string());
    }

    fn push_seeding(&self, args: &mut Vec<String>) {
        if let Some(step) = nonzero(self.step) {
            args.push(format!("--step={}", step));
        }
        if let Some(masking) = nonzero(self.masking) {
            args.push(format!("--masking={}", masking));
        }
        match &self.seed {
            Some(Seed::Match(len)) => args.push(format!("--seed=match{}", len)),
            Some(Seed::Pattern(pattern)) => args.push(format!("--seed={}", pattern)),
            None => {}
        }
        if self.transition == 0 {
            args.push("--notransition".to_string());
        } else {
            args.push(format!("--transition={}", self.transition));
        }
    }
}
