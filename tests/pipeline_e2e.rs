//! End-to-end pipeline tests.
//!
//! These run the real orchestrator — real workspace on disk, real PDFs
//! generated with lopdf, real chunk materialization — against a scripted
//! extraction backend, so every stage except the network is exercised
//! exactly as in production.

use async_trait::async_trait;
use deckforge::{
    run, DocumentStage, ExtractError, ExtractedCard, ExtractionBackend, RunConfig, Workspace,
};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Write a minimal valid PDF with `pages` blank pages.
fn write_pdf(path: &Path, pages: usize) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages);
    for i in 0..pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(format!("page {}", i + 1))]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode page content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => pages as i64,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).expect("save test pdf");
}

/// A workspace with a prompt and the given documents already in slides/.
fn workspace_with_slides(tmp: &tempfile::TempDir, docs: &[(&str, usize)]) -> Workspace {
    let ws = Workspace::new(tmp.path());
    ws.ensure().unwrap();
    std::fs::write(ws.prompts().join("qa_cloze.txt"), "Extract cards.").unwrap();
    for (name, pages) in docs {
        write_pdf(&ws.slides().join(format!("{name}.pdf")), *pages);
    }
    ws
}

/// Scripted backend: two cards per chunk, keyed to the chunk file name;
/// documents whose name contains "bad" fail transiently on every call.
struct ScriptedBackend {
    calls: AtomicUsize,
    chunk_names: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            chunk_names: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ExtractionBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn extract(
        &self,
        chunk: &Path,
        _prompt: &str,
    ) -> Result<Vec<ExtractedCard>, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let stem = chunk
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        if stem.contains("bad") {
            return Err(ExtractError::Transient {
                detail: "HTTP 503 from upstream".into(),
                raw_response: Some("{\"error\":\"unavailable\"}".into()),
            });
        }

        self.chunk_names.lock().unwrap().push(stem.clone());
        Ok(vec![
            ExtractedCard {
                content: format!("{stem} question one"),
                context: "slide 1".into(),
                importance: "high".into(),
            },
            ExtractedCard {
                content: format!("{stem} question two"),
                context: String::new(),
                importance: "low".into(),
            },
        ])
    }
}

fn base_config(ws: &Workspace, backend: Arc<ScriptedBackend>) -> deckforge::RunConfigBuilder {
    RunConfig::builder(ws.root())
        .skip_sanitize(true)
        .max_retries(2)
        .retry_delay(Duration::from_millis(5))
        .backend_override(backend)
}

fn deck_rows(content: &str) -> Vec<&str> {
    content.lines().skip(1).collect()
}

// ── Full-pipeline tests ──────────────────────────────────────────────────────

#[tokio::test]
async fn merge_run_builds_master_and_archives_everything() {
    let tmp = tempfile::tempdir().unwrap();
    let ws = workspace_with_slides(&tmp, &[("alpha", 3), ("beta", 2), ("gamma", 4)]);
    let backend = ScriptedBackend::new();

    let config = base_config(&ws, Arc::clone(&backend))
        .merge(Some("master".into()))
        .build()
        .unwrap();
    let summary = run(&config).await.unwrap();

    assert_eq!(summary.processed(), 3);
    assert_eq!(summary.errored(), 0);
    assert!(!summary.is_failure());
    assert_eq!(summary.total_cards(), 6);

    // Master deck: single header, 6 rows, in document-submission order.
    let master = summary.master_deck.as_ref().expect("master deck path");
    assert_eq!(master, &ws.decks_done().join("master.csv"));
    let content = std::fs::read_to_string(master).unwrap();
    let rows = deck_rows(&content);
    assert_eq!(rows.len(), 6);
    assert!(rows[0].starts_with("alpha question one|"));
    assert!(rows[1].starts_with("alpha question two|"));
    assert!(rows[2].starts_with("beta question one|"));
    assert!(rows[4].starts_with("gamma question one|"));

    // Inputs archived, intermediates deleted, per-document decks deleted.
    for doc in ["alpha", "beta", "gamma"] {
        assert!(ws.slides_done().join(format!("{doc}.pdf")).exists());
        assert!(!ws.slides().join(format!("{doc}.pdf")).exists());
        assert!(!ws.card_json(doc).exists());
        assert!(!ws.deck(doc).exists());
        assert!(!ws.decks_done().join(format!("{doc}.csv")).exists());
    }
}

#[tokio::test]
async fn tags_carry_prefix_importance_and_document_stem() {
    let tmp = tempfile::tempdir().unwrap();
    let ws = workspace_with_slides(&tmp, &[("lecture_01", 2)]);
    let backend = ScriptedBackend::new();

    let config = base_config(&ws, backend)
        .tag_prefix("Bio_")
        .build()
        .unwrap();
    let summary = run(&config).await.unwrap();
    assert_eq!(summary.processed(), 1);

    let deck = std::fs::read_to_string(ws.decks_done().join("lecture_01.csv")).unwrap();
    let rows = deck_rows(&deck);
    assert_eq!(rows.len(), 2);
    assert!(rows[0].ends_with("|high Bio_lecture_01"), "got: {}", rows[0]);
    assert!(rows[1].ends_with("|low Bio_lecture_01"), "got: {}", rows[1]);
}

#[tokio::test]
async fn partial_failure_never_aborts_sibling_documents() {
    let tmp = tempfile::tempdir().unwrap();
    let ws = workspace_with_slides(&tmp, &[("apple", 2), ("bad_deck", 2), ("zebra", 2)]);
    let backend = ScriptedBackend::new();

    let config = base_config(&ws, Arc::clone(&backend)).build().unwrap();
    let summary = run(&config).await.unwrap();

    assert_eq!(summary.processed(), 2);
    assert_eq!(summary.errored(), 1);
    assert!(summary.is_failure());

    let bad = summary
        .outcomes
        .iter()
        .find(|o| o.document == "bad_deck")
        .unwrap();
    assert_eq!(bad.stage, DocumentStage::Errored);
    assert!(bad.error.as_ref().unwrap().contains("3 attempt(s)"));

    // Survivors fully archived; the failed document stays for a rerun.
    assert!(ws.slides_done().join("apple.pdf").exists());
    assert!(ws.slides_done().join("zebra.pdf").exists());
    assert!(ws.slides().join("bad_deck.pdf").exists());
    assert!(!ws.slides_done().join("bad_deck.pdf").exists());

    // Every failed attempt plus the document verdict landed in the sink.
    let log = std::fs::read_to_string(ws.errors().join("errors.log")).unwrap();
    let records: Vec<serde_json::Value> = log
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let attempt_records = records
        .iter()
        .filter(|r| r["source"] == "scripted" && r["document"] == "bad_deck")
        .count();
    assert_eq!(attempt_records, 3, "initial attempt + 2 retries");
    assert!(records
        .iter()
        .any(|r| r["source"] == "orchestrator" && r["document"] == "bad_deck"));
}

#[tokio::test]
async fn compare_mode_is_a_no_op_across_repeated_runs() {
    let tmp = tempfile::tempdir().unwrap();
    let ws = workspace_with_slides(&tmp, &[("stable", 2)]);
    let backend = ScriptedBackend::new();

    let config = base_config(&ws, Arc::clone(&backend))
        .compare_mode(true)
        .merge(Some("trial".into()))
        .build()
        .unwrap();

    for _ in 0..2 {
        let summary = run(&config).await.unwrap();
        assert_eq!(summary.processed(), 1);
        assert!(!summary.is_failure());

        // Nothing moved: input, intermediate, and deck all in place.
        assert!(ws.slides().join("stable.pdf").exists());
        assert!(ws.card_json("stable").exists());
        assert!(ws.deck("stable").exists());
        assert!(!ws.slides_done().join("stable.pdf").exists());
    }

    // Each run wrote its own master without touching the previous one.
    assert!(ws.decks().join("trial.csv").exists());
    assert!(ws.decks().join("trial_2.csv").exists());
}

#[tokio::test]
async fn no_cleanup_preserves_intermediates_in_archive() {
    let tmp = tempfile::tempdir().unwrap();
    let ws = workspace_with_slides(&tmp, &[("keepme", 2)]);
    let backend = ScriptedBackend::new();

    let config = base_config(&ws, backend).no_cleanup(true).build().unwrap();
    let summary = run(&config).await.unwrap();
    assert!(!summary.is_failure());

    assert!(ws.cards_done().join("keepme.json").exists());
    assert!(ws.decks_done().join("keepme.csv").exists());
    assert!(ws.slides_done().join("keepme.pdf").exists());
}

#[tokio::test]
async fn large_document_is_chunked_and_reassembled_in_order() {
    let tmp = tempfile::tempdir().unwrap();
    let ws = workspace_with_slides(&tmp, &[("big", 62)]);
    let backend = ScriptedBackend::new();

    let config = base_config(&ws, Arc::clone(&backend)).build().unwrap();
    let summary = run(&config).await.unwrap();

    assert_eq!(summary.processed(), 1);
    // 62 pages with bounds [25, 40] split into two chunks of 31.
    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    let names = backend.chunk_names.lock().unwrap().clone();
    assert_eq!(names.len(), 2);
    assert!(names.iter().any(|n| n.contains("chunk_00")));
    assert!(names.iter().any(|n| n.contains("chunk_01")));

    // Four cards, chunk 0's rows strictly before chunk 1's.
    let deck = std::fs::read_to_string(ws.decks_done().join("big.csv")).unwrap();
    let rows = deck_rows(&deck);
    assert_eq!(rows.len(), 4);
    assert!(rows[0].contains("chunk_00"));
    assert!(rows[1].contains("chunk_00"));
    assert!(rows[2].contains("chunk_01"));
    assert!(rows[3].contains("chunk_01"));

    assert_eq!(summary.total_cards(), 4);
}

#[tokio::test]
async fn sanitizer_renames_raw_documents_before_processing() {
    let tmp = tempfile::tempdir().unwrap();
    let ws = Workspace::new(tmp.path());
    ws.ensure().unwrap();
    std::fs::write(ws.prompts().join("qa_cloze.txt"), "Extract cards.").unwrap();
    write_pdf(&ws.raw().join("Überblick Woche 1.pdf"), 2);

    let backend = ScriptedBackend::new();
    let config = RunConfig::builder(ws.root())
        .max_retries(0)
        .retry_delay(Duration::from_millis(1))
        .backend_override(backend)
        .build()
        .unwrap();
    let summary = run(&config).await.unwrap();

    assert_eq!(summary.processed(), 1);
    assert_eq!(summary.outcomes[0].document, "Uberblick_Woche_1");
    assert!(ws.slides_done().join("Uberblick_Woche_1.pdf").exists());
    assert!(ws.list_pdfs(&ws.raw()).unwrap().is_empty());
}

#[tokio::test]
async fn merge_with_no_rows_is_a_run_error_and_decks_survive() {
    struct EmptyBackend;

    #[async_trait]
    impl ExtractionBackend for EmptyBackend {
        fn name(&self) -> &str {
            "empty"
        }
        async fn extract(
            &self,
            _chunk: &Path,
            _prompt: &str,
        ) -> Result<Vec<ExtractedCard>, ExtractError> {
            Ok(vec![])
        }
    }

    let tmp = tempfile::tempdir().unwrap();
    let ws = workspace_with_slides(&tmp, &[("hollow", 2)]);

    let config = RunConfig::builder(ws.root())
        .skip_sanitize(true)
        .backend_override(Arc::new(EmptyBackend))
        .merge(Some("master".into()))
        .build()
        .unwrap();
    let summary = run(&config).await.unwrap();

    // The document itself processed fine; the merge had nothing to do.
    assert_eq!(summary.processed(), 1);
    assert!(summary.master_deck.is_none());
    assert!(summary.is_failure());
    assert!(summary.run_errors[0].contains("No deck rows"));

    // With the merge failed, the (empty) per-document deck is archived
    // rather than deleted.
    assert!(ws.decks_done().join("hollow.csv").exists());
}

#[tokio::test]
async fn missing_prompt_fails_before_touching_documents() {
    let tmp = tempfile::tempdir().unwrap();
    let ws = Workspace::new(tmp.path());
    ws.ensure().unwrap();
    write_pdf(&ws.slides().join("doc.pdf"), 2);

    let backend = ScriptedBackend::new();
    let config = base_config(&ws, Arc::clone(&backend)).build().unwrap();
    let err = run(&config).await.unwrap_err();

    assert!(err.to_string().contains("Prompt file not found"));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    assert!(ws.slides().join("doc.pdf").exists());
}

#[tokio::test]
async fn corrupt_pdf_errors_only_its_own_document() {
    let tmp = tempfile::tempdir().unwrap();
    let ws = workspace_with_slides(&tmp, &[("fine", 2)]);
    std::fs::write(ws.slides().join("broken.pdf"), b"not a pdf at all").unwrap();

    let backend = ScriptedBackend::new();
    let config = base_config(&ws, backend).build().unwrap();
    let summary = run(&config).await.unwrap();

    assert_eq!(summary.processed(), 1);
    assert_eq!(summary.errored(), 1);
    let broken = summary
        .outcomes
        .iter()
        .find(|o| o.document == "broken")
        .unwrap();
    assert!(broken.error.as_ref().unwrap().contains("Cannot read PDF"));
    assert!(ws.slides_done().join("fine.pdf").exists());
}
