//! Hand-written call graph edits: edges objdump cannot see (function
//! pointers, indirect calls) and paths that never run.
//!
//! ```json
//! {
//!     "add":    { "hook_task": ["touchpad_calc[a.c]", "hook_task"] },
//!     "remove": ["panic_assert_fail"]
//! }
//! ```

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt, fs,
    path::Path,
    sync::LazyLock,
};

use log::{debug, info};
use regex::Regex;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::graph::CallGraph;
use crate::symbol::SymbolTable;
use crate::tools::LineCache;


#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct Annotation
{
    /// caller signature -> callee signatures
    #[serde(default)]
    pub add:    BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub remove: Vec<String>,
}

impl Annotation
{
    pub fn from_json(text: &str) -> Result<Annotation>
    {
        let value: serde_json::Value = serde_json::from_str(text).map_err(Error::AnnotationParse)?;
        Annotation::deserialize(value).map_err(Error::AnnotationInvalid)
    }

    pub fn load(path: &Path) -> Result<Annotation>
    {
        let text = fs::read_to_string(path).map_err(Error::AnnotationOpen)?;
        Annotation::from_json(&text)
    }

    /// Every signature the document mentions, once.
    pub fn signatures(&self) -> BTreeSet<&str>
    {
        self.add
            .iter()
            .flat_map(|(src, dsts)| std::iter::once(src).chain(dsts))
            .chain(&self.remove)
            .map(String::as_str)
            .collect()
    }
}



/// Why a signature did not resolve. Reported, never fatal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SignatureError
{
    Invalid,
    NotFound,
    Ambiguous,
}

impl fmt::Display for SignatureError
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        match *self
        {
            SignatureError::Invalid   => f.write_str("signature is invalid"),
            SignatureError::NotFound  => f.write_str("function is not found"),
            SignatureError::Ambiguous => f.write_str("signature is ambiguous"),
        }
    }
}


/// `NAME` or `NAME[FILE]`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signature<'a>
{
    pub name: &'a str,
    pub file: Option<&'a str>,
}

static SIGNATURE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9_.]+)(?:\[([^\]]+)\])?$").expect("UNREACHABLE")
});

// `touchpad_calc.constprop.42` is a GCC clone of `touchpad_calc`
static CLONE_BASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9_]+)(?:\.|$)").expect("UNREACHABLE")
});

pub fn parse_signature(sig: &str) -> Option<Signature<'_>>
{
    let caps = SIGNATURE_RE.captures(sig)?;
    Some(Signature
    {
        name: caps.get(1)?.as_str(),
        file: caps.get(2).map(|m| m.as_str()),
    })
}

fn base_name(path: &str) -> &str
{
    Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(path)
}



/// What an annotation document amounts to on a particular call graph.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Resolution
{
    pub add_set:     BTreeSet<(u64, u64)>,
    pub remove_set:  BTreeSet<u64>,
    pub failed_sigs: BTreeMap<String, SignatureError>,
}


/// Outcome of looking one signature up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolved
{
    Funcs(BTreeSet<u64>),
    Failed(SignatureError),
}


///
/// Looks signatures up among the call graph's functions.
///
/// Functions are found through their symbols, so every alias of a
/// function, and the base name of a compiler clone, reaches it.
///
pub struct Resolver<'c>
{
    by_name: HashMap<String, BTreeSet<u64>>,
    lines:   &'c mut LineCache,
}

impl<'c> Resolver<'c>
{
    pub fn new(graph: &CallGraph, symbols: &SymbolTable, lines: &'c mut LineCache) -> Self
    {
        let mut by_name: HashMap<String, BTreeSet<u64>> = HashMap::new();

        for sym in symbols.symbols().iter().filter(|s| s.is_function())
        {
            if graph.get(sym.address).is_none()
            {
                continue;
            }
            by_name.entry(sym.name.clone()).or_default().insert(sym.address);

            if let Some(caps) = CLONE_BASE_RE.captures(&sym.name)
            {
                let base = &caps[1];
                if base != sym.name
                {
                    by_name.entry(base.to_string()).or_default().insert(sym.address);
                }
            }
        }

        Resolver { by_name, lines }
    }

    /// Functions `sig` denotes. `Err(_)` is a failing line lookup only.
    pub fn resolve(&mut self, sig: &str) -> Result<Resolved>
    {
        let Some(Signature { name, file }) = parse_signature(sig) else
        {
            return Ok(Resolved::Failed(SignatureError::Invalid));
        };

        let candidates = match self.by_name.get(name)
        {
            Some(found) if !found.is_empty() => found.clone(),
            _                                => return Ok(Resolved::Failed(SignatureError::NotFound)),
        };

        match file
        {
            None =>
            {
                let mut paths = BTreeSet::new();
                for &addr in &candidates
                {
                    paths.insert(self.lines.path(addr)?.to_string());
                }

                if paths.len() > 1
                {
                    debug!("`{}` is defined in {:?}", sig, paths);
                    Ok(Resolved::Failed(SignatureError::Ambiguous))
                }
                else
                {
                    Ok(Resolved::Funcs(candidates))
                }
            },
            Some(file) =>
            {
                let mut matched = BTreeSet::new();
                for &addr in &candidates
                {
                    if base_name(self.lines.path(addr)?) == file
                    {
                        matched.insert(addr);
                    }
                }

                if matched.is_empty()
                {
                    Ok(Resolved::Failed(SignatureError::NotFound))
                }
                else
                {
                    Ok(Resolved::Funcs(matched))
                }
            },
        }
    }

    /// Resolve each signature once.
    pub fn map_signatures<'s>(&mut self, sigs: impl IntoIterator<Item = &'s str>)
        -> Result<(BTreeMap<String, BTreeSet<u64>>, BTreeMap<String, SignatureError>)>
    {
        let mut resolved = BTreeMap::new();
        let mut failed   = BTreeMap::new();

        for sig in sigs
        {
            if resolved.contains_key(sig) || failed.contains_key(sig)
            {
                continue;
            }
            match self.resolve(sig)?
            {
                Resolved::Funcs(funcs) => { resolved.insert(sig.to_string(), funcs); },
                Resolved::Failed(why)  => { failed.insert(sig.to_string(), why); },
            }
        }

        Ok((resolved, failed))
    }
}


///
/// Turn an annotation document into edge additions and node removals.
///
/// An `add` rule contributes the cross product of its resolved source and
/// destination functions; a side that failed to resolve contributes
/// nothing. Failures are collected, never raised.
///
pub fn resolve_annotation(
    annotation: &Annotation,
    graph:      &CallGraph,
    symbols:    &SymbolTable,
    lines:      &mut LineCache,
) -> Result<Resolution>
{
    let mut resolver = Resolver::new(graph, symbols, lines);
    let (resolved, failed_sigs) = resolver.map_signatures(annotation.signatures())?;

    let mut add_set = BTreeSet::new();
    for (src_sig, dst_sigs) in &annotation.add
    {
        let Some(srcs) = resolved.get(src_sig) else { continue };

        for dst_sig in dst_sigs
        {
            let Some(dsts) = resolved.get(dst_sig) else { continue };

            for &src in srcs
            {
                add_set.extend(dsts.iter().map(|&dst| (src, dst)));
            }
        }
    }

    let remove_set: BTreeSet<u64> = annotation.remove
        .iter()
        .filter_map(|sig| resolved.get(sig))
        .flatten()
        .copied()
        .collect();

    info!(
        "annotation: {} edges added, {} functions removed, {} signatures failed",
        add_set.len(), remove_set.len(), failed_sigs.len()
    );

    Ok(Resolution { add_set, remove_set, failed_sigs })
}
