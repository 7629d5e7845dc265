//! # Tweak records
//!
//! A [`Tweak`] is the typed per-step (or per-copy) configuration override. The
//! partitioning core only ever touches the typed fields; the literal key/value
//! strings understood by the external PSet tweak tool are produced and parsed
//! here, at the serialization boundary.
//!
//! Serialized form (key order is part of the contract):
//!
//! ```json
//! {
//!   "process.source.firstLuminosityBlock": "customTypeCms.untracked.uint32(2)",
//!   "process.maxEvents": "customTypeCms.untracked.PSet(input=cms.untracked.int32(-1))",
//!   "process.source.firstEvent": "customTypeCms.untracked.uint32(40)",
//!   "process.source.firstRun": "customTypeCms.untracked.uint32(1)",
//!   "process.source.fileNames": "customTypeCms.untracked.vstring(['file:../step1/RAWSIMoutput.root'])",
//!   "process.PREMIXRAWoutput.fileName": "customTypeCms.untracked.string('file:PREMIXRAWoutput.root')"
//! }
//! ```

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use crate::constants::{files, pset};
use crate::error::{SplitterError, SplitterResult};

/// Closed set of semantic fields a tweak may override.
///
/// Variant order is the serialization order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TweakKey {
    FirstLuminosityBlock,
    MaxEvents,
    FirstEvent,
    FirstRun,
    FileNames,
    OutputFileName(String),
}

impl TweakKey {
    pub fn literal(&self) -> String {
        match self {
            TweakKey::FirstLuminosityBlock => pset::FIRST_LUMI_KEY.to_string(),
            TweakKey::MaxEvents => pset::MAX_EVENTS_KEY.to_string(),
            TweakKey::FirstEvent => pset::FIRST_EVENT_KEY.to_string(),
            TweakKey::FirstRun => pset::FIRST_RUN_KEY.to_string(),
            TweakKey::FileNames => pset::FILE_NAMES_KEY.to_string(),
            TweakKey::OutputFileName(module) => {
                format!("{}{module}{}", pset::OUTPUT_KEY_PREFIX, pset::OUTPUT_KEY_SUFFIX)
            }
        }
    }

    pub fn parse(literal: &str) -> Option<Self> {
        match literal {
            pset::FIRST_LUMI_KEY => Some(TweakKey::FirstLuminosityBlock),
            pset::MAX_EVENTS_KEY => Some(TweakKey::MaxEvents),
            pset::FIRST_EVENT_KEY => Some(TweakKey::FirstEvent),
            pset::FIRST_RUN_KEY => Some(TweakKey::FirstRun),
            pset::FILE_NAMES_KEY => Some(TweakKey::FileNames),
            other => other
                .strip_prefix(pset::OUTPUT_KEY_PREFIX)
                .and_then(|rest| rest.strip_suffix(pset::OUTPUT_KEY_SUFFIX))
                .filter(|module| !module.is_empty() && !module.contains('.'))
                .map(|module| TweakKey::OutputFileName(module.to_string())),
        }
    }
}

/// Typed value paired with a [`TweakKey`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TweakValue {
    UInt32(u64),
    MaxEvents(i64),
    VString(Vec<String>),
    String(String),
}

impl TweakValue {
    pub fn literal(&self) -> String {
        match self {
            TweakValue::UInt32(n) => format!("{}{n}{}", pset::UINT32_OPEN, pset::CLOSE),
            TweakValue::MaxEvents(n) => {
                format!("{}{n}{}", pset::MAX_EVENTS_OPEN, pset::MAX_EVENTS_CLOSE)
            }
            TweakValue::VString(items) => {
                format!("{}{}{}", pset::VSTRING_OPEN, py_list_repr(items), pset::CLOSE)
            }
            TweakValue::String(s) => format!("{}{}{}", pset::STRING_OPEN, py_repr(s), pset::CLOSE),
        }
    }
}

/// An output module and the file name it should write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputFile {
    pub module: String,
    pub file_name: String,
}

impl OutputFile {
    /// Conventional local output name: `file:<module>.root`.
    pub fn for_module(module: impl Into<String>) -> Self {
        let module = module.into();
        let file_name = format!("{}{module}{}", files::LOCAL_FILE_SCHEME, files::ROOT_EXTENSION);
        Self { module, file_name }
    }
}

/// Per-step or per-copy configuration override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tweak {
    pub first_lumi: u64,
    pub max_events: i64,
    pub first_event: u64,
    pub first_run: u64,
    /// Empty for step 1
    pub input_files: Vec<String>,
    pub outputs: Vec<OutputFile>,
}

impl Tweak {
    /// Typed entries in serialization order.
    pub fn entries(&self) -> Vec<(TweakKey, TweakValue)> {
        let mut entries = vec![
            (TweakKey::FirstLuminosityBlock, TweakValue::UInt32(self.first_lumi)),
            (TweakKey::MaxEvents, TweakValue::MaxEvents(self.max_events)),
            (TweakKey::FirstEvent, TweakValue::UInt32(self.first_event)),
            (TweakKey::FirstRun, TweakValue::UInt32(self.first_run)),
        ];
        if !self.input_files.is_empty() {
            entries.push((TweakKey::FileNames, TweakValue::VString(self.input_files.clone())));
        }
        for output in &self.outputs {
            entries.push((
                TweakKey::OutputFileName(output.module.clone()),
                TweakValue::String(output.file_name.clone()),
            ));
        }
        entries
    }

    /// Literal key/value pairs in serialization order.
    pub fn to_pset_entries(&self) -> Vec<(String, String)> {
        self.entries()
            .into_iter()
            .map(|(key, value)| (key.literal(), value.literal()))
            .collect()
    }

    /// Rebuild a typed tweak from literal key/value pairs.
    ///
    /// `firstRun` defaults to 1 and `maxEvents` to -1 when absent; a missing
    /// `firstEvent` or `firstLuminosityBlock` is an error.
    pub fn from_pset_entries<I, K, V>(entries: I) -> SplitterResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut first_lumi = None;
        let mut max_events = None;
        let mut first_event = None;
        let mut first_run = None;
        let mut input_files = Vec::new();
        let mut outputs = Vec::new();

        for (key, value) in entries {
            let (key, value) = (key.as_ref(), value.as_ref());
            let parsed = TweakKey::parse(key).ok_or_else(|| {
                SplitterError::serialization("tweak", format!("unknown tweak key '{key}'"))
            })?;
            match parsed {
                TweakKey::FirstLuminosityBlock => first_lumi = Some(parse_uint32(key, value)?),
                TweakKey::MaxEvents => max_events = Some(parse_max_events(key, value)?),
                TweakKey::FirstEvent => first_event = Some(parse_uint32(key, value)?),
                TweakKey::FirstRun => first_run = Some(parse_uint32(key, value)?),
                TweakKey::FileNames => input_files = parse_vstring(key, value)?,
                TweakKey::OutputFileName(module) => outputs.push(OutputFile {
                    module,
                    file_name: parse_string(key, value)?,
                }),
            }
        }

        Ok(Tweak {
            first_lumi: first_lumi.ok_or_else(|| missing_key(pset::FIRST_LUMI_KEY))?,
            max_events: max_events.unwrap_or(pset::ALL_EVENTS),
            first_event: first_event.ok_or_else(|| missing_key(pset::FIRST_EVENT_KEY))?,
            first_run: first_run.unwrap_or(crate::constants::defaults::RUN_NUMBER),
            input_files,
            outputs,
        })
    }

    /// Literal map keyed by PSet parameter; ordering is lost.
    pub fn to_pset_map(&self) -> BTreeMap<String, String> {
        self.to_pset_entries().into_iter().collect()
    }
}

impl Serialize for Tweak {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let entries = self.to_pset_entries();
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (key, value) in &entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Tweak {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TweakVisitor;

        impl<'de> Visitor<'de> for TweakVisitor {
            type Value = Tweak;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of PSet tweak literals")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Tweak, A::Error> {
                // Document order is kept so multi-output tweaks re-serialize identically.
                let mut entries: Vec<(String, String)> = Vec::new();
                while let Some((key, value)) = access.next_entry::<String, String>()? {
                    entries.push((key, value));
                }
                Tweak::from_pset_entries(entries).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_map(TweakVisitor)
    }
}

/// One copy of a fanned-out step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyTweak {
    /// 0-based
    pub copy_index: u32,
    /// Working directory of this copy, relative to the job directory
    pub scope: String,
    pub tweak: Tweak,
}

/// Tweak(s) for one step of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepTweaks {
    Single(Tweak),
    Copies(Vec<CopyTweak>),
}

impl StepTweaks {
    pub fn is_fanned_out(&self) -> bool {
        matches!(self, StepTweaks::Copies(_))
    }
}

/// Everything shipped to the worker for one job: the contents of `job<N>.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTweaks {
    pub job_index: u64,
    /// Keyed by 1-based step number
    pub tweaks: BTreeMap<u32, StepTweaks>,
}

impl JobTweaks {
    pub fn step(&self, step: u32) -> SplitterResult<&StepTweaks> {
        self.tweaks
            .get(&step)
            .ok_or_else(|| SplitterError::MissingPrecomputedTweak {
                job_index: self.job_index,
                step,
            })
    }
}

fn missing_key(key: &str) -> SplitterError {
    SplitterError::serialization("tweak", format!("missing required key '{key}'"))
}

fn malformed(key: &str, value: &str) -> SplitterError {
    SplitterError::serialization("tweak", format!("malformed value for '{key}': {value}"))
}

fn unwrap_literal<'a>(key: &str, value: &'a str, open: &str, close: &str) -> SplitterResult<&'a str> {
    value
        .strip_prefix(open)
        .and_then(|rest| rest.strip_suffix(close))
        .ok_or_else(|| malformed(key, value))
}

fn parse_uint32(key: &str, value: &str) -> SplitterResult<u64> {
    unwrap_literal(key, value, pset::UINT32_OPEN, pset::CLOSE)?
        .parse()
        .map_err(|_| malformed(key, value))
}

fn parse_max_events(key: &str, value: &str) -> SplitterResult<i64> {
    unwrap_literal(key, value, pset::MAX_EVENTS_OPEN, pset::MAX_EVENTS_CLOSE)?
        .parse()
        .map_err(|_| malformed(key, value))
}

fn parse_string(key: &str, value: &str) -> SplitterResult<String> {
    let inner = unwrap_literal(key, value, pset::STRING_OPEN, pset::CLOSE)?;
    match parse_py_str(inner) {
        Some((s, "")) => Ok(s),
        _ => Err(malformed(key, value)),
    }
}

fn parse_vstring(key: &str, value: &str) -> SplitterResult<Vec<String>> {
    let inner = unwrap_literal(key, value, pset::VSTRING_OPEN, pset::CLOSE)?;
    parse_py_list(inner).ok_or_else(|| malformed(key, value))
}

/// Python `repr()` of a `str`.
pub fn py_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Python `repr()` of a `list[str]`.
pub fn py_list_repr(items: &[String]) -> String {
    let body = items.iter().map(|s| py_repr(s)).collect::<Vec<_>>().join(", ");
    format!("[{body}]")
}

/// Parse one quoted Python string literal, returning it and the remaining input.
fn parse_py_str(input: &str) -> Option<(String, &str)> {
    let mut chars = input.char_indices();
    let (_, quote) = chars.next()?;
    if quote != '\'' && quote != '"' {
        return None;
    }

    let mut out = String::new();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                let (_, escaped) = chars.next()?;
                match escaped {
                    'n' => out.push('\n'),
                    'r' => out.push('\r'),
                    't' => out.push('\t'),
                    'x' => {
                        let (_, hi) = chars.next()?;
                        let (_, lo) = chars.next()?;
                        let code = u32::from_str_radix(&format!("{hi}{lo}"), 16).ok()?;
                        out.push(char::from_u32(code)?);
                    }
                    other => out.push(other),
                }
            }
            c if c == quote => return Some((out, &input[i + c.len_utf8()..])),
            c => out.push(c),
        }
    }
    None
}

fn parse_py_list(input: &str) -> Option<Vec<String>> {
    let mut rest = input.strip_prefix('[')?.trim_start();
    let mut items = Vec::new();
    if let Some(tail) = rest.strip_prefix(']') {
        return tail.is_empty().then_some(items);
    }
    loop {
        let (item, tail) = parse_py_str(rest)?;
        items.push(item);
        let tail = tail.trim_start();
        if let Some(tail) = tail.strip_prefix(',') {
            rest = tail.trim_start();
        } else {
            return (tail == "]").then_some(items);
        }
    }
}
