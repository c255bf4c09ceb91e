//! Engine state across phases and the line-oriented message protocol.
//!
//! A session holds at most one detached-style set. Every scan replaces it;
//! fixes are only ever resolved against it. Cancellation is cooperative and
//! is observed between the scan, library and match phases.

use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};

use crate::document::DocumentWrite;
use crate::error::Error;
use crate::library::{self, TokenStore};
use crate::matcher;
use crate::resolver;
use crate::scanner::{self, ScanOptions, Scope};
use crate::types::{ApplyReport, DetachedStyle, Fix, MatchResult};

/// Message types the protocol understands.
const KNOWN_REQUESTS: [&str; 3] = ["apply-fixes", "cancel", "scan"];

/// A message from the presentation side.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Request {
    /// Apply user-picked fixes against the current scan.
    ApplyFixes {
        /// Fixes, in the order they should run.
        fixes: Vec<Fix>,
    },
    /// Stop the session.
    Cancel,
    /// Scan the page or the selection.
    Scan {
        /// Restrict the scan to the selected nodes.
        #[serde(default, rename = "useSelection")]
        use_selection: bool,
    },
}

/// A message to the presentation side.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Response {
    /// Outcome of an `apply-fixes` request.
    ApplyComplete {
        /// Fixes applied.
        applied_count: usize,
        /// Fixes that failed.
        error_count: usize,
        /// Set when the batch was empty or any fix failed.
        #[serde(skip_serializing_if = "Option::is_none")]
        error_message: Option<String>,
    },
    /// Outcome of a `scan` request.
    ScanComplete {
        /// Detached styles, flattened in category order.
        detached_styles: Vec<DetachedStyle>,
        /// Set when the scan was cut short.
        #[serde(skip_serializing_if = "Option::is_none")]
        error_message: Option<String>,
        /// One result per detached style.
        match_results: Vec<MatchResult>,
    },
}

/// What one completed scan produced.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Detached styles, flattened in category order.
    pub detached_styles: Vec<DetachedStyle>,
    /// One result per detached style, same order.
    pub match_results: Vec<MatchResult>,
    /// Nodes counted in scope.
    pub node_count: usize,
}

/// The document, the token store, and the detached styles of the last scan.
pub struct Session<D, S> {
    /// Detached styles of the current scan, by id.
    detached: HashMap<String, DetachedStyle>,
    /// Document being scanned and fixed.
    document: D,
    /// Options applied to every scan.
    options: ScanOptions,
    /// Where library tokens come from.
    store: S,
}

impl<D: DocumentWrite, S: TokenStore> Session<D, S> {
    /// Apply `fixes` against the current scan.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoFixes` for an empty batch.
    pub fn apply(&mut self, fixes: &[Fix]) -> Result<ApplyReport, Error> {
        return resolver::apply_fixes(fixes, &self.detached, &mut self.document);
    }

    /// The document, with any applied fixes.
    pub const fn document(&self) -> &D {
        return &self.document;
    }

    /// Answer one request. `Cancel` and a cancelled scan produce no response.
    pub fn handle(&mut self, request: Request, cancel: &AtomicBool) -> Option<Response> {
        match request {
            Request::ApplyFixes { fixes } => {
                let response = match self.apply(&fixes) {
                    Err(e) => Response::ApplyComplete {
                        applied_count: 0,
                        error_count: 0,
                        error_message: Some(e.to_string()),
                    },
                    Ok(report) => Response::ApplyComplete {
                        applied_count: report.applied_count,
                        error_count: report.error_count,
                        error_message: (!report.success).then_some(report.message),
                    },
                };
                return Some(response);
            },
            Request::Cancel => return None,
            Request::Scan { use_selection } => {
                let scope = if use_selection { Scope::Selection } else { Scope::Page };
                let response = match self.scan(scope, cancel) {
                    Err(Error::Cancelled) => return None,
                    Err(e) => Response::ScanComplete {
                        detached_styles: Vec::new(),
                        error_message: Some(e.to_string()),
                        match_results: Vec::new(),
                    },
                    Ok(report) => Response::ScanComplete {
                        detached_styles: report.detached_styles,
                        error_message: None,
                        match_results: report.match_results,
                    },
                };
                return Some(response);
            },
        }
    }

    /// Take the document back.
    pub fn into_document(self) -> D {
        return self.document;
    }

    /// A session with no scan yet.
    pub fn new(document: D, store: S, options: ScanOptions) -> Self {
        return Self { detached: HashMap::new(), document, options, store };
    }

    /// Scan `scope`, read libraries, and match. Replaces the current
    /// detached-style set, which stays empty if any phase fails.
    ///
    /// # Errors
    ///
    /// Returns `Error::EmptySelection`, `Error::NodeLimitExceeded`,
    /// `Error::NoLibraries`, or `Error::Cancelled` when a cancel was seen
    /// between phases.
    pub fn scan(&mut self, scope: Scope, cancel: &AtomicBool) -> Result<ScanReport, Error> {
        self.detached.clear();

        let roots = scope.roots(&self.document);
        if scope == Scope::Selection && roots.is_empty() {
            return Err(Error::EmptySelection);
        }
        let result = scanner::scan(&roots, &self.options);
        if result.has_exceeded_limit {
            return Err(Error::NodeLimitExceeded { count: result.node_count, limit: self.options.node_limit });
        }
        tracing::debug!(nodes = result.node_count, detached = result.detached_styles.len(), "scan phase done");
        if result.detached_styles.is_empty() {
            return Ok(ScanReport { node_count: result.node_count, ..ScanReport::default() });
        }
        let detached = result.detached_styles.into_flat();
        check_cancelled(cancel)?;

        let libraries = library::get_libraries(&self.store);
        if let Some(reason) = libraries.error_message {
            return Err(Error::NoLibraries { reason });
        }
        check_cancelled(cancel)?;

        let match_results = matcher::find_matches(&detached, &libraries.libraries);
        tracing::debug!(matched = match_results.iter().filter(|r| return !r.matches.is_empty()).count(), "match phase done");
        self.detached = detached.iter().map(|s| return (s.id.clone(), s.clone())).collect();
        return Ok(ScanReport { detached_styles: detached, match_results, node_count: result.node_count });
    }
}

/// Fail with `Error::Cancelled` once a cancel has been requested.
fn check_cancelled(cancel: &AtomicBool) -> Result<(), Error> {
    if cancel.load(Ordering::SeqCst) {
        tracing::debug!("scan cancelled between phases");
        return Err(Error::Cancelled);
    }
    return Ok(());
}

/// Parse one protocol line. Malformed lines and unknown types are logged
/// and dropped.
pub fn parse_request(line: &str) -> Option<Request> {
    let value: serde_json::Value = match serde_json::from_str(line) {
        Err(e) => {
            tracing::warn!("ignoring malformed message: {e}");
            return None;
        },
        Ok(v) => v,
    };
    let kind = value.get("type").and_then(serde_json::Value::as_str).unwrap_or_default().to_owned();
    if !KNOWN_REQUESTS.contains(&kind.as_str()) {
        tracing::warn!(kind = %kind, "ignoring message of unknown type");
        return None;
    }
    return match serde_json::from_value(value) {
        Err(e) => {
            tracing::warn!(kind = %kind, "ignoring invalid message: {e}");
            None
        },
        Ok(request) => Some(request),
    };
}

/// Forward parsed requests until input ends or a cancel is read. A cancel
/// raises `cancel` before it is queued so a running scan sees it.
fn read_requests<R: BufRead>(input: R, requests: &Sender<Request>, cancel: &AtomicBool) {
    for line in input.lines() {
        let line = match line {
            Err(e) => {
                tracing::warn!("stopped reading requests: {e}");
                return;
            },
            Ok(l) => l,
        };
        if line.trim().is_empty() {
            continue;
        }
        let Some(request) = parse_request(&line) else {
            continue;
        };
        let is_cancel = request == Request::Cancel;
        if is_cancel {
            cancel.store(true, Ordering::SeqCst);
        }
        if requests.send(request).is_err() || is_cancel {
            return;
        }
    }
}

/// Run `session` over a request stream, writing one JSON response per line.
/// Returns when input ends or after a cancel.
///
/// # Errors
///
/// Returns `Error::Io` or `Error::Json` if a response cannot be written.
pub fn serve<D, S, R, W>(session: &mut Session<D, S>, input: R, output: &mut W) -> Result<(), Error>
where
    D: DocumentWrite,
    S: TokenStore,
    R: BufRead + Send + 'static,
    W: Write,
{
    let cancel = Arc::new(AtomicBool::new(false));
    let (tx, rx) = crossbeam_channel::unbounded();
    let reader_cancel = Arc::clone(&cancel);
    let reader = std::thread::spawn(move || read_requests(input, &tx, &reader_cancel));

    for request in &rx {
        if cancel.load(Ordering::SeqCst) {
            break;
        }
        if let Some(response) = session.handle(request, &cancel) {
            serde_json::to_writer(&mut *output, &response)?;
            writeln!(output)?;
            output.flush()?;
        }
    }

    if reader.join().is_err() {
        tracing::warn!("request reader panicked");
    }
    tracing::debug!("session ended");
    return Ok(());
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "test code")]
mod tests {
    use std::io::Cursor;

    use serde_json::json;

    use super::*;
    use crate::document::{Document, Page};
    use crate::library::tests::{MemoryStore, color_var, library_json};

    fn document() -> Document {
        let page: Page = serde_json::from_value(json!({
            "name": "Page 1",
            "selection": [],
            "children": [{
                "id": "card", "name": "Card", "type": "RECTANGLE",
                "fills": [{"type": "SOLID", "color": {"r": 0.2, "g": 0.4, "b": 0.6}}]
            }]
        }))
        .unwrap();
        return Document::from_page(page);
    }

    fn store() -> MemoryStore {
        return MemoryStore(vec![(
            "brand".to_string(),
            Ok(library_json("brand", json!([color_var("v-blue", "color/blue", (0.2, 0.4, 0.6))]))),
        )]);
    }

    fn session() -> Session<Document, MemoryStore> {
        return Session::new(document(), store(), ScanOptions::default());
    }

    #[test]
    fn scan_then_apply_binds_the_match() {
        let mut session = session();
        let report = session.scan(Scope::Page, &AtomicBool::new(false)).unwrap();
        let result = report.match_results.first().unwrap();
        let fix = result.matches.first().unwrap().to_fix(&result.detached_style_id);

        let applied = session.apply(&[fix]).unwrap();
        assert!(applied.success);
        assert!(session.document().is_modified());
    }

    #[test]
    fn a_new_scan_discards_old_ids() {
        let mut session = session();
        let cancel = AtomicBool::new(false);
        let first = session.scan(Scope::Page, &cancel).unwrap();
        let old_id = first.detached_styles.first().unwrap().id.clone();
        session.scan(Scope::Page, &cancel).unwrap();

        let fix = Fix { detached_style_id: old_id, is_style: None, style_id: None, variable_id: Some("v-blue".to_string()) };
        let report = session.apply(&[fix]).unwrap();
        assert_eq!((report.applied_count, report.error_count), (0, 1));
    }

    #[test]
    fn selection_scan_without_selection_fails() {
        let err = session().scan(Scope::Selection, &AtomicBool::new(false)).unwrap_err();
        assert!(matches!(err, Error::EmptySelection));
    }

    #[test]
    fn node_budget_is_reported_with_counts() {
        let options = ScanOptions { node_limit: 0, ..ScanOptions::default() };
        let mut session = Session::new(document(), store(), options);
        let response = session.handle(Request::Scan { use_selection: false }, &AtomicBool::new(false));
        let Some(Response::ScanComplete { error_message: Some(message), .. }) = response else {
            panic!("expected an error response, got {response:?}");
        };
        assert_eq!(message, "too many nodes (1 found, limit 0)");
    }

    #[test]
    fn missing_libraries_are_reported_as_a_message() {
        let mut session = Session::new(document(), MemoryStore(Vec::new()), ScanOptions::default());
        let err = session.scan(Scope::Page, &AtomicBool::new(false)).unwrap_err();
        assert!(err.to_string().starts_with("No connected libraries found"));
    }

    #[test]
    fn cancel_is_observed_between_phases() {
        let mut session = session();
        let err = session.scan(Scope::Page, &AtomicBool::new(true)).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(session.handle(Request::Scan { use_selection: false }, &AtomicBool::new(true)).is_none());
    }

    #[test]
    fn empty_apply_is_a_message_not_a_failure() {
        let response = session().handle(Request::ApplyFixes { fixes: Vec::new() }, &AtomicBool::new(false));
        assert_eq!(
            response,
            Some(Response::ApplyComplete { applied_count: 0, error_count: 0, error_message: Some("no fixes to apply".to_string()) })
        );
    }

    #[test]
    fn unknown_and_malformed_messages_are_dropped() {
        assert_eq!(parse_request("{not json"), None);
        assert_eq!(parse_request(r#"{"type":"resize","width":300}"#), None);
        assert_eq!(parse_request(r#"{"type":"apply-fixes"}"#), None);
        assert_eq!(parse_request(r#"{"type":"cancel"}"#), Some(Request::Cancel));
        assert_eq!(
            parse_request(r#"{"type":"scan","useSelection":true}"#),
            Some(Request::Scan { use_selection: true })
        );
    }

    #[test]
    fn serve_skips_noise_and_answers_each_scan_once() {
        let input = [r#"{"type":"scan","useSelection":false}"#, "garbage", r#"{"type":"notify","message":"hi"}"#].join("\n");
        let mut output = Vec::new();
        let mut session = session();
        serve(&mut session, Cursor::new(input.into_bytes()), &mut output).unwrap();

        let text = String::from_utf8(output).unwrap();
        let responses: Vec<serde_json::Value> = text.lines().map(|l| return serde_json::from_str(l).unwrap()).collect();
        assert_eq!(responses.len(), 1, "output: {text}");
        assert_eq!(responses[0]["type"], "scan-complete");
        assert_eq!(responses[0]["matchResults"][0]["matches"][0]["id"], "v-blue");
    }

    #[test]
    fn reading_stops_at_cancel_and_raises_the_flag() {
        let input = [r#"{"type":"scan"}"#, "garbage", r#"{"type":"cancel"}"#, r#"{"type":"scan"}"#].join("\n");
        let (tx, rx) = crossbeam_channel::unbounded();
        let cancel = AtomicBool::new(false);
        read_requests(Cursor::new(input.into_bytes()), &tx, &cancel);
        drop(tx);

        let forwarded: Vec<Request> = rx.iter().collect();
        assert_eq!(forwarded, vec![Request::Scan { use_selection: false }, Request::Cancel]);
        assert!(cancel.load(Ordering::SeqCst));
    }

    #[test]
    fn nothing_is_answered_after_cancel() {
        let input = [r#"{"type":"cancel"}"#, r#"{"type":"scan"}"#].join("\n");
        let mut output = Vec::new();
        let mut session = session();
        serve(&mut session, Cursor::new(input.into_bytes()), &mut output).unwrap();
        assert!(output.is_empty(), "output: {}", String::from_utf8_lossy(&output));
    }

    #[test]
    fn serve_runs_a_scan_and_an_apply() {
        let mut session = session();
        let mut output = Vec::new();
        let scan = r#"{"type":"scan"}"#.to_string() + "\n";
        serve(&mut session, Cursor::new(scan.into_bytes()), &mut output).unwrap();
        let text = String::from_utf8(output).unwrap();
        let response: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        let detached_id = response["detachedStyles"][0]["id"].as_str().unwrap().to_string();
        assert!(response.get("errorMessage").is_none());

        let apply = json!({"type": "apply-fixes", "fixes": [{"detachedStyleId": detached_id, "variableId": "v-blue"}]});
        let mut output = Vec::new();
        serve(&mut session, Cursor::new(format!("{apply}\n").into_bytes()), &mut output).unwrap();
        let text = String::from_utf8(output).unwrap();
        let response: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(response, json!({"type": "apply-complete", "appliedCount": 1, "errorCount": 0}));
    }
}
