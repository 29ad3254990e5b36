//! Integration tests for the extraction entry points.
//!
//! PDFs are served by an in-memory backend and OCR by a canned provider, so
//! these run without pdfium or network access. Archives and DOCX files are
//! built on the fly with `zip::ZipWriter`.

use async_trait::async_trait;
use bidtext::pipeline::layout::{PageFragments, TextFragment};
use bidtext::pipeline::render::RenderSpec;
use bidtext::{
    CascadeConfig, CascadeEngine, Credential, DocumentFormat, ErrorKind, ExtractError,
    ExtractionConfig, ExtractionProgressCallback, ExtractionSource, Extractor, FailureBudget,
    ModelSpec, OcrRequest, PageError, PageSelection, PdfBackend, PdfText, ProviderEndpoint,
    ProviderError, ProviderKind, ProviderTier, VisionProvider,
};
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

// ── Fakes ────────────────────────────────────────────────────────────────────

/// Serves the same pages for any buffer that starts with `%PDF`.
struct FakePdf {
    pages: Vec<Vec<TextFragment>>,
    opened: AtomicUsize,
}

impl FakePdf {
    fn new(pages: Vec<Vec<TextFragment>>) -> Arc<Self> {
        Arc::new(Self {
            pages,
            opened: AtomicUsize::new(0),
        })
    }
}

impl PdfBackend for FakePdf {
    fn extract_text(
        &self,
        bytes: &[u8],
        _password: Option<&str>,
        select: &dyn Fn(usize) -> Vec<usize>,
    ) -> Result<PdfText, ExtractError> {
        if !bytes.starts_with(b"%PDF") {
            return Err(ExtractError::ContainerCorrupt {
                format: DocumentFormat::Pdf,
                detail: "no header".into(),
            });
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        let pages = select(self.pages.len())
            .into_iter()
            .map(|index| PageFragments {
                index,
                fragments: self.pages[index].clone(),
            })
            .collect();
        Ok(PdfText {
            page_count: self.pages.len(),
            pages,
        })
    }

    fn render_png(
        &self,
        _bytes: &[u8],
        _password: Option<&str>,
        _index: usize,
        _spec: RenderSpec,
    ) -> Result<Vec<u8>, String> {
        Ok(b"\x89PNG\r\n\x1a\n fake".to_vec())
    }
}

/// Answers every call with the same reply.
struct CannedProvider {
    reply: Result<String, ErrorKind>,
    calls: AtomicUsize,
}

#[async_trait]
impl VisionProvider for CannedProvider {
    fn id(&self) -> &str {
        "canned"
    }

    async fn recognize(
        &self,
        model: &str,
        _credential: &Credential,
        request: &OcrRequest,
    ) -> Result<String, ProviderError> {
        assert!(request.image.data_url().starts_with("data:image/png;base64,"));
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply
            .clone()
            .map_err(|k| ProviderError::new(k, "canned", model, "scripted failure"))
    }
}

fn cascade(reply: Result<&str, ErrorKind>) -> (CascadeEngine, Arc<CannedProvider>) {
    let provider = Arc::new(CannedProvider {
        reply: reply.map(str::to_string),
        calls: AtomicUsize::new(0),
    });
    let config = CascadeConfig {
        tiers: vec![ProviderTier {
            provider: ProviderEndpoint::new("canned", ProviderKind::OpenAiCompatible),
            models: vec![ModelSpec::new("vision-small"), ModelSpec::new("vision-large")],
            credentials: vec![Credential::new("team", "sk-test")],
        }],
        budget: FailureBudget {
            retry_backoff_ms: 0,
            ..FailureBudget::default()
        },
    };
    let mut providers: HashMap<String, Arc<dyn VisionProvider>> = HashMap::new();
    providers.insert("canned".into(), provider.clone());
    (CascadeEngine::with_providers(config, providers), provider)
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

fn line(text: &str) -> Vec<TextFragment> {
    vec![TextFragment::new(text, 72.0, 100.0, 200.0)]
}

fn zip_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut w = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in entries {
        if name.ends_with('/') {
            w.add_directory(*name, SimpleFileOptions::default()).unwrap();
        } else {
            w.start_file(*name, SimpleFileOptions::default()).unwrap();
            w.write_all(body).unwrap();
        }
    }
    w.finish().unwrap().into_inner()
}

fn docx(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{p}</w:t></w:r></w:p>"))
        .collect();
    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
    );
    zip_with(&[
        ("[Content_Types].xml", b"<Types/>"),
        ("word/document.xml", xml.as_bytes()),
    ])
}

const PDF: &[u8] = b"%PDF-1.7\n% fake body";

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn bundle_yields_one_section_per_document_in_archive_order() {
    let pdf = FakePdf::new(vec![line("第一章 招标公告")]);
    let form = docx(&["投标函", "法定代表人授权书"]);
    let bundle = zip_with(&[
        ("招标文件/", b""),
        ("招标文件/01-notice.pdf", PDF),
        ("__MACOSX/招标文件/._01-notice.pdf", b"\0\x05\x16\x07"),
        ("招标文件/02-form.docx", form.as_slice()),
        ("招标文件/.DS_Store", b"\0\0\0\x01Bud1"),
        ("招标文件/03-readme.txt", "请按时递交投标文件".as_bytes()),
        ("Thumbs.db", b"\xd0\xcf\x11\xe0"),
    ]);

    let extractor = Extractor::with_parts(ExtractionConfig::default(), pdf, None);
    let out = extractor.extract(&bundle, Some("bundle.zip")).await.unwrap();

    assert_eq!(out.format, DocumentFormat::Zip);
    assert_eq!(out.text.matches("===== BEGIN FILE:").count(), 3);
    let expected = "===== BEGIN FILE: 招标文件/01-notice.pdf =====\n第一章 招标公告\n\
===== END FILE: 招标文件/01-notice.pdf =====\n\n\
===== BEGIN FILE: 招标文件/02-form.docx =====\n投标函\n法定代表人授权书\n\
===== END FILE: 招标文件/02-form.docx =====\n\n\
===== BEGIN FILE: 招标文件/03-readme.txt =====\n请按时递交投标文件\n\
===== END FILE: 招标文件/03-readme.txt =====";
    assert_eq!(out.text, expected);

    let formats: Vec<_> = out.files.iter().map(|f| f.format).collect();
    assert_eq!(
        formats,
        [
            Some(DocumentFormat::Pdf),
            Some(DocumentFormat::Docx),
            Some(DocumentFormat::PlainText)
        ]
    );
    assert!(out.files.iter().all(|f| f.error.is_none()));
    assert_eq!(out.stats.total_pages, 1);
    assert_eq!(out.pages.len(), 1);
}

#[tokio::test]
async fn extraction_is_idempotent() {
    let pdf = FakePdf::new(vec![line("Bid bond"), vec![], line("Schedule")]);
    let (engine, _) = cascade(Ok("Scanned annex"));
    let extractor = Extractor::with_parts(ExtractionConfig::default(), pdf, Some(engine));

    let first = extractor.extract(PDF, None).await.unwrap();
    let second = extractor.extract(PDF, None).await.unwrap();
    assert_eq!(first.text, second.text);
    assert_eq!(first.text, "Bid bond\n\nScanned annex\n\nSchedule");
}

#[tokio::test]
async fn unrecoverable_page_keeps_its_place() {
    let pdf = FakePdf::new(vec![line("Page one"), vec![], line("Page three")]);
    let (engine, provider) = cascade(Err(ErrorKind::Transient));
    let extractor = Extractor::with_parts(ExtractionConfig::default(), pdf, Some(engine));

    let out = extractor.extract(PDF, Some("tender.pdf")).await.unwrap();
    assert_eq!(
        out.text,
        "Page one\n\n[[unrecoverable page 2]]\n\nPage three"
    );
    assert_eq!(out.stats.failed_pages, 1);
    assert_eq!(out.stats.structural_pages, 2);
    // One retry of the first model, then the second model.
    assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    assert_eq!(out.stats.ocr_attempts, 3);

    let page2 = &out.pages[1];
    assert_eq!(page2.result.source, ExtractionSource::Failed);
    assert!(page2
        .warnings
        .contains(&PageError::CascadeExhausted { page: 2, attempts: 3 }));
}

#[tokio::test]
async fn placeholders_can_be_stripped() {
    let pdf = FakePdf::new(vec![line("Page one"), vec![], line("Page three")]);
    let config = ExtractionConfig::builder()
        .keep_placeholders(false)
        .build()
        .unwrap();
    let extractor = Extractor::with_parts(config, pdf, None);

    let out = extractor.extract(PDF, None).await.unwrap();
    assert_eq!(out.text, "Page one\n\nPage three");
}

#[tokio::test]
async fn ocr_text_is_cleaned_before_use() {
    let pdf = FakePdf::new(vec![vec![]]);
    let (engine, _) = cascade(Ok("```\nHere is the text:\n| 项目 | 金额 |\n|---|---|\n| 水泥 | 1,200 |\n```"));
    let extractor = Extractor::with_parts(ExtractionConfig::default(), pdf, Some(engine));

    let out = extractor.extract(PDF, None).await.unwrap();
    assert_eq!(out.text, "项目\t金额\n水泥\t1,200");
    assert_eq!(out.pages[0].result.source, ExtractionSource::Ocr);
}

#[tokio::test]
async fn document_with_no_recoverable_page_fails() {
    let pdf = FakePdf::new(vec![vec![], vec![]]);
    let extractor = Extractor::with_parts(ExtractionConfig::default(), pdf, None);

    let err = extractor.extract(PDF, None).await.unwrap_err();
    assert!(matches!(
        err,
        ExtractError::DocumentExtractionFailed {
            format: DocumentFormat::Pdf,
            ..
        }
    ));
}

/// Accepts only the credential whose secret is `good`.
struct KeyChecker {
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl VisionProvider for KeyChecker {
    fn id(&self) -> &str {
        "router"
    }

    async fn recognize(
        &self,
        model: &str,
        credential: &Credential,
        _request: &OcrRequest,
    ) -> Result<String, ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{model}:{}", credential.secret()));
        if credential.secret() == "good" {
            Ok("Annex text".into())
        } else {
            Err(ProviderError::new(ErrorKind::AuthInvalid, "router", model, "401 invalid key"))
        }
    }
}

#[tokio::test]
async fn rejected_key_falls_through_to_next_unlabeled_key() {
    let tiers = CascadeConfig::from_json_str(
        r#"{ "tiers": [{
            "provider": { "id": "router", "kind": "open_ai_compatible" },
            "models": [ { "id": "m1" }, { "id": "m2" } ],
            "credentials": [ { "key": "bad" }, { "key": "good" } ]
        }] }"#,
    )
    .unwrap();
    let checker = Arc::new(KeyChecker {
        calls: Mutex::new(Vec::new()),
    });
    let mut providers: HashMap<String, Arc<dyn VisionProvider>> = HashMap::new();
    providers.insert("router".into(), checker.clone());
    let engine = CascadeEngine::with_providers(tiers, providers);

    let pdf = FakePdf::new(vec![vec![]]);
    let extractor = Extractor::with_parts(ExtractionConfig::default(), pdf, Some(engine));
    let out = extractor.extract(PDF, None).await.unwrap();

    assert_eq!(out.text, "Annex text");
    assert_eq!(*checker.calls.lock().unwrap(), ["m1:bad", "m1:good"]);
    assert_eq!(out.pages[0].ocr_attempts, 2);
    assert_eq!(out.pages[0].result.source, ExtractionSource::Ocr);
}

#[tokio::test]
async fn disabled_ocr_never_calls_providers() {
    let pdf = FakePdf::new(vec![line("Page one"), vec![]]);
    let (engine, provider) = cascade(Ok("should not appear"));
    let config = ExtractionConfig::builder().ocr_enabled(false).build().unwrap();
    let extractor = Extractor::with_parts(config, pdf, Some(engine));

    let out = extractor.extract(PDF, None).await.unwrap();
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    assert!(!out.text.contains("should not appear"));
}

#[tokio::test]
async fn page_selection_applies_to_top_level_pdf() {
    let pdf = FakePdf::new(vec![line("one"), line("two"), line("three")]);
    let config = ExtractionConfig::builder()
        .pages(PageSelection::Range(2, 3))
        .build()
        .unwrap();
    let extractor = Extractor::with_parts(config, pdf.clone(), None);

    let out = extractor.extract(PDF, None).await.unwrap();
    assert_eq!(out.text, "two\n\nthree");
    let nums: Vec<_> = out.pages.iter().map(|p| p.page_num).collect();
    assert_eq!(nums, [2, 3]);

    // Inside an archive every page is taken.
    let bundle = zip_with(&[("a.pdf", PDF)]);
    let out = extractor.extract(&bundle, None).await.unwrap();
    assert_eq!(out.pages.len(), 3);
}

#[tokio::test]
async fn corrupt_member_becomes_placeholder_section() {
    let pdf = FakePdf::new(vec![line("ok")]);
    let bundle = zip_with(&[
        ("scan.png", b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR"),
        ("notes.txt", b"Site visit at 09:30"),
    ]);
    let extractor = Extractor::with_parts(ExtractionConfig::default(), pdf, None);

    let out = extractor.extract(&bundle, None).await.unwrap();
    assert!(out
        .text
        .starts_with("===== BEGIN FILE: scan.png =====\n[[unrecoverable file: Could not detect"));
    assert!(out.text.ends_with("Site visit at 09:30\n===== END FILE: notes.txt ====="));
    assert!(out.files[0].error.is_some());
    assert_eq!(out.files[1].length, 19);
}

#[tokio::test]
async fn empty_archive_fails() {
    let bundle = zip_with(&[("__MACOSX/", b""), (".DS_Store", b"x")]);
    let extractor = Extractor::with_parts(ExtractionConfig::default(), FakePdf::new(vec![]), None);
    let err = extractor.extract(&bundle, None).await.unwrap_err();
    assert!(matches!(
        err,
        ExtractError::DocumentExtractionFailed {
            format: DocumentFormat::Zip,
            ..
        }
    ));
}

#[tokio::test]
async fn gbk_text_member_is_decoded() {
    let text = "投标保证金：人民币贰万元整。投标人应于投标截止时间前将保证金汇入招标人指定账户，\
逾期到账的投标保证金视为无效。";
    let (gbk, _, _) = encoding_rs::GBK.encode(text);
    let bundle = zip_with(&[("说明.txt", gbk.as_ref())]);
    let extractor = Extractor::with_parts(ExtractionConfig::default(), FakePdf::new(vec![]), None);

    let out = extractor.extract(&bundle, None).await.unwrap();
    assert!(out.text.contains(text), "got: {}", out.text);
}

#[derive(Default)]
struct Events(Mutex<Vec<String>>);

impl ExtractionProgressCallback for Events {
    fn on_document_start(&self, total: usize) {
        self.0.lock().unwrap().push(format!("start {total}"));
    }
    fn on_page_ocr(&self, page: usize, _total: usize) {
        self.0.lock().unwrap().push(format!("ocr {page}"));
    }
    fn on_page_complete(&self, page: usize, _t: usize, source: ExtractionSource, _l: usize) {
        self.0.lock().unwrap().push(format!("done {page} {source:?}"));
    }
    fn on_page_error(&self, page: usize, _t: usize, _e: String) {
        self.0.lock().unwrap().push(format!("error {page}"));
    }
    fn on_document_complete(&self, total: usize, recovered: usize) {
        self.0.lock().unwrap().push(format!("end {recovered}/{total}"));
    }
}

#[tokio::test]
async fn progress_events_follow_page_order() {
    let events = Arc::new(Events::default());
    let pdf = FakePdf::new(vec![line("one"), vec![], vec![]]);
    let (engine, _) = cascade(Ok("recovered"));
    let config = ExtractionConfig::builder()
        .progress_callback(events.clone())
        .pages(PageSelection::Set(vec![1, 2]))
        .build()
        .unwrap();
    let extractor = Extractor::with_parts(config, pdf, Some(engine));

    extractor.extract(PDF, None).await.unwrap();
    let got = events.0.lock().unwrap().clone();
    assert_eq!(
        got,
        [
            "start 2",
            "done 1 Structural",
            "ocr 2",
            "done 2 Ocr",
            "end 2/2"
        ]
    );
}

#[tokio::test]
async fn one_extractor_serves_concurrent_documents() {
    let pdf = FakePdf::new(vec![line("shared")]);
    let extractor = Arc::new(Extractor::with_parts(
        ExtractionConfig::default(),
        pdf.clone(),
        None,
    ));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let ex = extractor.clone();
            tokio::spawn(async move { ex.extract(PDF, None).await })
        })
        .collect();
    for h in handles {
        assert_eq!(h.await.unwrap().unwrap().text, "shared");
    }
    assert_eq!(pdf.opened.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn missing_file_is_reported() {
    let extractor = Extractor::with_parts(ExtractionConfig::default(), FakePdf::new(vec![]), None);
    let err = extractor
        .extract_input("/no/such/dir/tender.pdf")
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::FileNotFound { .. }));
}

#[tokio::test]
async fn local_docx_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("form.docx");
    std::fs::write(&path, docx(&["Bidder: ACME", "Price: 1,000"])).unwrap();

    let extractor = Extractor::with_parts(ExtractionConfig::default(), FakePdf::new(vec![]), None);
    let out = extractor.extract_input(path.to_str().unwrap()).await.unwrap();
    assert_eq!(out.format, DocumentFormat::Docx);
    assert_eq!(out.text, "Bidder: ACME\nPrice: 1,000");
}
