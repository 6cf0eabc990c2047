//! Pipeline integration tests with a fake PDF reader and a canned model.

mod common;

use common::{fake_pdf, pdf_document, FakeModel, Harness, JANE_DOE};
use edgequake_pdf2xlsx::{
    convert_to_file, ConversionConfig, ConversionProgressCallback, Document, ErrorKind,
    ExtractionRecord, Pdf2XlsxError, Stage,
};
use parking_lot::Mutex;
use std::sync::Arc;

#[tokio::test]
async fn jane_doe_round_trip() {
    let h = Harness::new(FakeModel::replying(JANE_DOE));

    let conversion = h
        .pipeline
        .run(pdf_document(&["Name: Jane Doe"]))
        .await
        .unwrap();

    assert_eq!(
        conversion.result.records(),
        &[ExtractionRecord::new("Name", "Jane Doe", "found in header")]
    );
    assert_eq!(conversion.stats.pages, 1);
    assert_eq!(conversion.stats.records, 1);
    assert_eq!(conversion.stats.input_tokens, 120);

    let bytes = conversion.artifact.read().await.unwrap();
    assert!(bytes.starts_with(b"PK\x03\x04"));

    // The staged PDF is gone before the request finishes.
    let staged = h.reader.seen.lock()[0].clone();
    assert!(!staged.exists());
    assert_eq!(h.scratch_files(), 1);

    let dbg = format!("{conversion:?}");
    assert!(dbg.contains(&conversion.request_id.to_string()), "got: {dbg}");

    let out_path = conversion.artifact.path().to_path_buf();
    assert!(out_path.ends_with(format!("{}.xlsx", conversion.request_id)));
    drop(conversion);
    assert!(!out_path.exists());
    assert_eq!(h.scratch_files(), 0);
    assert_eq!(h.store.live_count(), 0);
}

#[tokio::test]
async fn prompt_carries_document_text() {
    let h = Harness::new(FakeModel::replying(JANE_DOE));
    h.pipeline
        .run(pdf_document(&["Invoice No: 42", "Total: 99.00"]))
        .await
        .unwrap();

    let prompt = h.model.last_prompt.lock().clone().unwrap();
    assert!(prompt.contains("Invoice No: 42\nTotal: 99.00"), "got: {prompt}");
    assert!(prompt.contains("Do NOT summarize"));
}

#[tokio::test]
async fn empty_upload_never_reaches_the_model() {
    let h = Harness::new(FakeModel::replying(JANE_DOE));
    let doc = Document::new(Vec::new(), Some("application/pdf".into()), None);

    let err = h.pipeline.run(doc).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(h.model.calls(), 0);
    assert!(h.reader.seen.lock().is_empty());
    assert_eq!(h.scratch_files(), 0);
}

#[tokio::test]
async fn non_pdf_content_type_is_rejected() {
    let h = Harness::new(FakeModel::replying(JANE_DOE));
    let doc = Document::new(fake_pdf(&["x"]), Some("text/plain".into()), None);

    let err = h.pipeline.run(doc).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(err.kind().is_client_error());
    assert_eq!(h.model.calls(), 0);
}

#[tokio::test]
async fn textless_document_fails_and_cleans_up() {
    let h = Harness::new(FakeModel::replying(JANE_DOE));

    let err = h
        .pipeline
        .run(pdf_document(&["   ", "\n"]))
        .await
        .unwrap_err();
    assert!(matches!(err, Pdf2XlsxError::NoExtractableText { pages: 2 }));
    assert_eq!(h.model.calls(), 0);

    let staged = h.reader.seen.lock()[0].clone();
    assert!(!staged.exists());
    assert_eq!(h.scratch_files(), 0);
}

#[tokio::test]
async fn malformed_reply_fails_and_cleans_up() {
    let h = Harness::new(FakeModel::replying("Sorry, I cannot help with that."));

    let err = h.pipeline.run(pdf_document(&["a: 1"])).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedResponse);
    assert_eq!(err.stage(), Some(Stage::Parse));
    assert_eq!(h.scratch_files(), 0);
    assert_eq!(h.store.live_count(), 0);
}

#[tokio::test]
async fn empty_array_reply_is_empty_result() {
    let h = Harness::new(FakeModel::replying("[]"));
    let err = h.pipeline.run(pdf_document(&["a: 1"])).await.unwrap_err();
    assert!(matches!(err, Pdf2XlsxError::EmptyResult { dropped: 0 }));
    assert_eq!(h.scratch_files(), 0);
}

#[tokio::test]
async fn model_failure_fails_and_cleans_up() {
    let h = Harness::new(FakeModel::failing("503 Service Unavailable"));
    let err = h.pipeline.run(pdf_document(&["a: 1"])).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ModelInvocation);
    assert!(err.to_string().contains("503"), "got: {err}");
    assert_eq!(h.scratch_files(), 0);
}

#[tokio::test]
async fn partially_invalid_reply_keeps_valid_records() {
    let reply = r#"```json
[{"key":"A","value":"1"},{"value":"no key"},{"key":"B","comments":"footer"}]
```"#;
    let h = Harness::new(FakeModel::replying(reply));
    let conversion = h.pipeline.run(pdf_document(&["A: 1, B"])).await.unwrap();

    assert_eq!(conversion.result.len(), 2);
    assert_eq!(conversion.stats.dropped_records, 1);
    assert_eq!(conversion.result.records()[1], ExtractionRecord::new("B", "", "footer"));
}

#[tokio::test]
async fn concurrent_requests_use_distinct_paths() {
    let h = Harness::new(FakeModel::replying(JANE_DOE));

    let (a, b) = tokio::join!(
        h.pipeline.run(pdf_document(&["first"])),
        h.pipeline.run(pdf_document(&["second"])),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_ne!(a.request_id, b.request_id);
    assert_ne!(a.artifact.path(), b.artifact.path());
    let seen = h.reader.seen.lock().clone();
    assert_eq!(seen.len(), 2);
    assert_ne!(seen[0], seen[1]);

    // Releasing one request leaves the other's workbook untouched.
    let b_path = b.artifact.path().to_path_buf();
    drop(a);
    assert!(b_path.exists());
    assert_eq!(h.scratch_files(), 1);
    drop(b);
    assert_eq!(h.scratch_files(), 0);
}

#[tokio::test]
async fn many_concurrent_requests_leave_nothing_behind() {
    let h = Harness::new(FakeModel::replying(JANE_DOE));

    let runs = (0..8).map(|i| {
        let pipeline = Arc::clone(&h.pipeline);
        let text = format!("Item: {i}");
        async move { pipeline.run(pdf_document(&[text.as_str()])).await }
    });
    let conversions: Vec<_> = futures::future::join_all(runs)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    let mut paths: Vec<_> = conversions.iter().map(|c| c.artifact.path().to_path_buf()).collect();
    paths.sort();
    paths.dedup();
    assert_eq!(paths.len(), 8);
    assert_eq!(h.store.live_count(), 8);

    drop(conversions);
    assert_eq!(h.scratch_files(), 0);
    assert_eq!(h.model.calls(), 8);
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl ConversionProgressCallback for Recorder {
    fn on_stage_start(&self, stage: Stage) {
        self.events.lock().push(format!("start:{stage}"));
    }

    fn on_stage_complete(&self, stage: Stage, _detail: &str) {
        self.events.lock().push(format!("done:{stage}"));
    }

    fn on_stage_error(&self, stage: Stage, _error: &str) {
        self.events.lock().push(format!("error:{stage}"));
    }
}

#[tokio::test]
async fn progress_reports_every_stage_in_order() {
    let recorder = Arc::new(Recorder::default());
    let config = ConversionConfig::builder()
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    let h = Harness::with_config(FakeModel::replying(JANE_DOE), config);

    h.pipeline.run(pdf_document(&["Name: Jane"])).await.unwrap();

    assert_eq!(
        *recorder.events.lock(),
        [
            "start:extract",
            "done:extract",
            "start:prompt",
            "done:prompt",
            "start:model",
            "done:model",
            "start:parse",
            "done:parse",
            "start:tabulate",
            "done:tabulate",
        ]
    );
}

#[tokio::test]
async fn progress_stops_at_the_failing_stage() {
    let recorder = Arc::new(Recorder::default());
    let config = ConversionConfig::builder()
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    let h = Harness::with_config(FakeModel::failing("boom"), config);

    h.pipeline.run(pdf_document(&["x: 1"])).await.unwrap_err();

    let events = recorder.events.lock().clone();
    assert_eq!(events.last().map(String::as_str), Some("error:model"));
    assert!(!events.iter().any(|e| e.ends_with(":parse")));
}

#[tokio::test]
async fn convert_to_file_persists_the_workbook() {
    let h = Harness::new(FakeModel::replying(JANE_DOE));
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.pdf");
    let output = dir.path().join("out").join("in.xlsx");
    std::fs::write(&input, fake_pdf(&["Name: Jane Doe"])).unwrap();

    let (result, stats) = convert_to_file(&h.pipeline, &input, &output).await.unwrap();

    assert_eq!(result.len(), 1);
    assert_eq!(stats.records, 1);
    assert!(std::fs::read(&output).unwrap().starts_with(b"PK"));
    assert_eq!(h.scratch_files(), 0);
}
