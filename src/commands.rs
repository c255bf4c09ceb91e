//! CLI commands for tokenlink: scan, fix, libraries, serve.

use std::collections::HashMap;
use std::io::BufReader;
use std::path::Path;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;

use crate::config::Config;
use crate::document::Document;
use crate::error;
use crate::library::{self, TokenDirectory};
use crate::scanner::Scope;
use crate::session::{self, ScanReport, Session};
use crate::types::{ApplyReport, DetachedStyle, Fix, MatchResult, VariableMatch};

/// What `fix` will do with each detached style of a scan.
#[derive(Default)]
struct FixPlan<'a> {
    /// More than one candidate, or a cross-library conflict.
    ambiguous: Vec<(&'a DetachedStyle, &'a MatchResult)>,
    /// Exactly one non-conflicting candidate.
    chosen: Vec<(&'a DetachedStyle, &'a VariableMatch)>,
    /// No candidate at all.
    unmatched: Vec<&'a DetachedStyle>,
}

impl<'a> FixPlan<'a> {
    /// Sort each match result by how many candidates it has.
    fn from_scan(report: &'a ScanReport) -> Self {
        let by_id: HashMap<&str, &DetachedStyle> =
            report.detached_styles.iter().map(|s| return (s.id.as_str(), s)).collect();
        let mut plan = Self::default();
        for result in &report.match_results {
            let Some(style) = by_id.get(result.detached_style_id.as_str()).copied() else {
                continue;
            };
            match result.matches.as_slice() {
                [] => plan.unmatched.push(style),
                [only] if !result.has_conflict => plan.chosen.push((style, only)),
                _ => plan.ambiguous.push((style, result)),
            }
        }
        return plan;
    }

    /// One fix per chosen candidate.
    fn fixes(&self) -> Vec<Fix> {
        return self.chosen.iter().map(|(style, candidate)| return candidate.to_fix(&style.id)).collect();
    }
}

/// One-line description of where a detached style sits.
fn describe(style: &DetachedStyle) -> String {
    return format!("`{}` ({}) {} = {}", style.node_name, style.node_id, style.property_name, style.value);
}

/// Scan, then apply every match with exactly one candidate and no conflict.
/// Prints a markdown report of what was fixed, what needs a human decision,
/// and what has no token. The document is written unless `dry_run`.
///
/// # Errors
///
/// Returns errors from config or document loading, the scan, or saving.
pub fn fix(root: &Path, selection: bool, dry_run: bool) -> Result<(), error::Error> {
    let config = Config::load(root)?;
    let mut session = open_session(root, &config)?;
    let report = session.scan(scope(selection), &AtomicBool::new(false))?;

    if report.detached_styles.is_empty() {
        eprintln!("No detached styles, nothing to fix.");
        return Ok(());
    }

    let plan = FixPlan::from_scan(&report);
    let fixes = plan.fixes();
    let applied = if dry_run || fixes.is_empty() { None } else { Some(session.apply(&fixes)?) };

    print_fix_report(&plan, applied.as_ref(), dry_run);

    if session.document().is_modified() {
        session.document().save()?;
    }
    return Ok(());
}

/// List libraries with their token counts and cross-library conflicts.
///
/// # Errors
///
/// Returns `Error::NoLibraries` when no library yields a token.
pub fn libraries(root: &Path, json: bool) -> Result<(), error::Error> {
    let config = Config::load(root)?;
    let set = library::get_libraries(&TokenDirectory::new(&config.libraries_path(root)));
    if let Some(reason) = set.error_message {
        return Err(error::Error::NoLibraries { reason });
    }
    let conflicts = library::check_for_conflicts(&set.libraries);

    if json {
        let out = serde_json::json!({ "conflicts": conflicts, "libraries": set.libraries });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    for lib in &set.libraries {
        println!("{}  ({})  {} variables, {} styles", lib.name, lib.id, lib.variables.len(), lib.styles.len());
    }
    if !conflicts.is_empty() {
        println!("\n## Conflicts\n");
        for (value, owners) in &conflicts {
            let names: Vec<&str> = owners
                .iter()
                .map(|id| {
                    return set.libraries.iter().find(|l| return l.id == *id).map_or(id.as_str(), |l| return l.name.as_str());
                })
                .collect();
            println!("- `{value}` in {}", names.join(", "));
        }
    }
    return Ok(());
}

/// Load the document and token directory named by `config`.
///
/// # Errors
///
/// Returns `Error::DocumentNotFound` or `Error::DocumentCorrupt`.
fn open_session(root: &Path, config: &Config) -> Result<Session<Document, TokenDirectory>, error::Error> {
    let document = Document::load(&config.document_path(root))?;
    let store = TokenDirectory::new(&config.libraries_path(root));
    return Ok(Session::new(document, store, config.scan));
}

/// Print a markdown summary of a fix run.
fn print_fix_report(plan: &FixPlan<'_>, applied: Option<&ApplyReport>, dry_run: bool) {
    let failed: HashMap<&str, String> = applied.map_or_else(HashMap::new, |r| {
        return r
            .failures
            .iter()
            .map(|f| return (f.detached_style_id.as_str(), f.reason.to_string()))
            .collect();
    });

    if !plan.chosen.is_empty() {
        eprintln!("{}\n", if dry_run { "## Would fix" } else { "## Fixed" });
        for (style, candidate) in &plan.chosen {
            match failed.get(style.id.as_str()) {
                None => eprintln!("- {} -> `{}` ({})", describe(style), candidate.name, candidate.library_name),
                Some(reason) => eprintln!("- {} -> `{}` FAILED: {reason}", describe(style), candidate.name),
            }
        }
        eprintln!();
    }

    if !plan.ambiguous.is_empty() {
        eprintln!("## Ambiguous\n");
        for (style, result) in &plan.ambiguous {
            let names: Vec<String> =
                result.matches.iter().map(|m| return format!("`{}` ({})", m.name, m.library_name)).collect();
            let conflict = if result.has_conflict { " [conflict]" } else { "" };
            eprintln!("- {}{conflict}: {}", describe(style), names.join(", "));
        }
        eprintln!();
    }

    if !plan.unmatched.is_empty() {
        eprintln!("## Unmatched\n");
        for style in &plan.unmatched {
            eprintln!("- {}", describe(style));
        }
        eprintln!();
    }

    if let Some(report) = applied {
        eprintln!("{}", report.message);
    }
    return;
}

/// Scan and match, then print each detached style with its candidates.
/// Exit code 0 means nothing is detached; 1 means detached styles exist.
///
/// # Errors
///
/// Returns errors from config or document loading and the scan itself.
pub fn scan(root: &Path, selection: bool, node_limit: Option<usize>, json: bool) -> Result<ExitCode, error::Error> {
    let mut config = Config::load(root)?;
    if let Some(limit) = node_limit {
        config.scan.node_limit = limit;
    }
    let mut session = open_session(root, &config)?;
    let report = session.scan(scope(selection), &AtomicBool::new(false))?;

    if json {
        let out = serde_json::json!({
            "detachedStyles": &report.detached_styles,
            "matchResults": &report.match_results,
            "nodeCount": report.node_count,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        let results: HashMap<&str, &MatchResult> =
            report.match_results.iter().map(|r| return (r.detached_style_id.as_str(), r)).collect();
        for style in &report.detached_styles {
            let (count, conflict) = results
                .get(style.id.as_str())
                .map_or((0, false), |r| return (r.matches.len(), r.has_conflict));
            let flag = if conflict { "  [conflict]" } else { "" };
            println!("DETACHED  {}  {} {}  {count} match(es){flag}", describe(style), style.category, style.property_name);
        }
        println!();
        println!("{} detached styles in {} nodes", report.detached_styles.len(), report.node_count);
    }

    if report.detached_styles.is_empty() {
        return Ok(ExitCode::SUCCESS);
    }
    return Ok(ExitCode::from(1));
}

/// Scan scope for the `--selection` flag.
const fn scope(selection: bool) -> Scope {
    if selection {
        return Scope::Selection;
    }
    return Scope::Page;
}

/// Run the message protocol on stdin/stdout. A document that received
/// fixes is written back when the session ends.
///
/// # Errors
///
/// Returns errors from loading, writing responses, or saving the document.
pub fn serve(root: &Path) -> Result<(), error::Error> {
    let config = Config::load(root)?;
    let mut session = open_session(root, &config)?;
    let stdout = std::io::stdout();
    session::serve(&mut session, BufReader::new(std::io::stdin()), &mut stdout.lock())?;

    let document = session.into_document();
    if document.is_modified() {
        document.save()?;
    }
    return Ok(());
}
