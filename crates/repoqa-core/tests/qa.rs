use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use repoqa_core::QaError;
use repoqa_core::citation::REFUSAL;
use repoqa_core::qa::QaPipeline;
use repoqa_core::synthesizer::{Synthesizer, SynthesizerConfig, Verification};
use repoqa_index::indexer::{CodeIndexer, IndexerConfig};
use repoqa_index::intent::{Intent, IntentClassifier, RetrievalProfiles};
use repoqa_index::retriever::{CodeRetriever, RetrievalConfig};
use repoqa_llm::RetryPolicy;
use repoqa_llm::mock::MockProvider;
use repoqa_store::{InMemoryRecordStore, InMemoryVectorStore, RecordStore, VectorStore};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const COLLECTION: &str = "qa_code";
const SPLIT_CITATION: &str = "[backend/code_ingest_utils.py:11-20]";

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 1,
        base_backoff: Duration::from_millis(1),
        timeout: Duration::from_secs(30),
    }
}

fn python_function(name: &str, total_lines: usize) -> String {
    let mut s = format!("def {name}():\n");
    for i in 1..total_lines {
        s.push_str(&format!("    {name}_{i} = {i}\n"));
    }
    s
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

struct Repo {
    _dir: TempDir,
    vectors: Arc<dyn VectorStore>,
}

/// Three function chunks: `load_files` (1-10) and `split_into_chunks`
/// (11-20) in the ingest utils, `serve` (1-5) in the app.
async fn ingested_repo() -> Repo {
    let dir = TempDir::new().unwrap();
    let mut utils = python_function("load_files", 10);
    utils.push_str(&python_function("split_into_chunks", 10));
    write(dir.path(), "backend/code_ingest_utils.py", &utils);
    write(dir.path(), "backend/app.py", &python_function("serve", 5));

    let vectors: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
    let records: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
    let indexer = CodeIndexer::new(
        Arc::clone(&vectors),
        records,
        Arc::new(MockProvider::default()),
        IndexerConfig {
            collection: COLLECTION.into(),
            retry: fast_retry(),
            ..IndexerConfig::default()
        },
    );
    let report = indexer
        .index(dir.path(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.chunks_created, 3);

    Repo { _dir: dir, vectors }
}

fn pipeline(vectors: &Arc<dyn VectorStore>, provider: MockProvider) -> QaPipeline<MockProvider> {
    let provider = Arc::new(provider);
    let retriever = CodeRetriever::new(
        Arc::clone(vectors),
        Arc::clone(&provider),
        RetrievalConfig {
            collection: COLLECTION.into(),
            retry: fast_retry(),
            ..RetrievalConfig::default()
        },
    );
    let synthesizer = Synthesizer::new(
        provider,
        SynthesizerConfig {
            regeneration_attempts: 1,
            retry: fast_retry(),
        },
    );
    QaPipeline::new(
        IntentClassifier::default(),
        RetrievalProfiles::default(),
        retriever,
        synthesizer,
    )
}

fn scripted(responses: &[&str]) -> MockProvider {
    MockProvider::with_responses(responses.iter().map(|&s| s.to_owned()).collect())
}

#[tokio::test]
async fn file_location_question_gets_verified_answer() {
    let repo = ingested_repo().await;
    let provider = scripted(&[format!("Chunking lives in split_into_chunks {SPLIT_CITATION}.").as_str()]);
    let qa = pipeline(&repo.vectors, provider.clone());

    let question = "Where is split_into_chunks implemented?";
    assert_eq!(qa.classify(question), Intent::FileLocation);

    let answer = qa.ask(question, &CancellationToken::new()).await.unwrap();
    assert_eq!(answer.intent, Intent::FileLocation);
    assert!(answer.is_verified());
    assert_eq!(answer.citations.len(), 1);
    assert_eq!(answer.citations[0].to_string(), SPLIT_CITATION);
    assert!(answer.sources.len() <= 3);
    for citation in &answer.citations {
        assert!(answer.sources.iter().any(|s| s.citation() == *citation));
    }

    let calls = provider.chat_calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0][1].content.contains("### [backend/code_ingest_utils.py:11-20] (python, function)"));
}

#[tokio::test]
async fn regenerated_answer_is_verified() {
    let repo = ingested_repo().await;
    let provider = scripted(&[
        "It is in [backend/chunker.py:1-40].",
        format!("It is in {SPLIT_CITATION}.").as_str(),
    ]);
    let qa = pipeline(&repo.vectors, provider.clone());

    let answer = qa
        .ask("Where is split_into_chunks implemented?", &CancellationToken::new())
        .await
        .unwrap();
    assert!(answer.is_verified());
    assert_eq!(provider.chat_calls().len(), 2);
}

#[tokio::test]
async fn fabricated_citation_is_flagged_not_trusted() {
    let repo = ingested_repo().await;
    let bad = "Chunks are embedded in [backend/embedder.py:3-9].";
    let qa = pipeline(&repo.vectors, scripted(&[bad, bad]));

    let answer = qa
        .ask("How are chunks embedded?", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(answer.intent, Intent::How);
    assert!(!answer.text.contains("embedder.py"));
    assert!(answer.citations.is_empty());
    assert_eq!(
        answer.verification,
        Verification::Unverified {
            rejected: vec!["[backend/embedder.py:3-9]".to_owned()],
            missing_citations: true,
        }
    );
}

#[tokio::test]
async fn require_verified_turns_flag_into_error() {
    let repo = ingested_repo().await;
    let bad = "Chunks are embedded in [backend/embedder.py:3-9].";
    let qa = pipeline(&repo.vectors, scripted(&[bad, bad])).with_require_verified(true);

    let err = qa
        .ask("How are chunks embedded?", &CancellationToken::new())
        .await
        .unwrap_err();
    match err {
        QaError::Unverified(answer) => assert!(!answer.is_verified()),
        other => panic!("expected Unverified, got {other:?}"),
    }
}

#[tokio::test]
async fn refusal_passes_through() {
    let repo = ingested_repo().await;
    let qa = pipeline(&repo.vectors, scripted(&[REFUSAL]));
    let answer = qa
        .ask("Why was Rust chosen?", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(answer.intent, Intent::Why);
    assert!(answer.is_verified());
    assert_eq!(answer.text, REFUSAL);
}

#[tokio::test]
async fn empty_index_reports_no_relevant_content() {
    let vectors: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
    vectors.ensure_collection(COLLECTION, 64).await.unwrap();
    let provider = MockProvider::default();
    let qa = pipeline(&vectors, provider.clone());

    let err = qa.ask("What does this do?", &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, QaError::NoRelevantContent));
    assert!(provider.chat_calls().is_empty());
}

#[tokio::test]
async fn store_failure_is_a_retrieval_error() {
    let vectors: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
    let qa = pipeline(&vectors, MockProvider::default());
    let err = qa.ask("What does this do?", &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, QaError::Retrieval(_)));
}

#[tokio::test]
async fn model_failure_is_a_synthesis_error() {
    let repo = ingested_repo().await;
    let qa = pipeline(&repo.vectors, MockProvider::failing());
    let err = qa
        .ask("Explain split_into_chunks", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, QaError::Synthesis(_)));
}

#[tokio::test]
async fn cancelled_before_start() {
    let repo = ingested_repo().await;
    let provider = MockProvider::default();
    let qa = pipeline(&repo.vectors, provider.clone());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = qa.ask("How does serve work?", &cancel).await.unwrap_err();
    assert!(matches!(err, QaError::Cancelled));
    assert!(provider.chat_calls().is_empty());
}

#[tokio::test]
async fn cancellation_stops_waiting_on_slow_provider() {
    let repo = ingested_repo().await;
    let qa = pipeline(&repo.vectors, MockProvider::default().with_delay(20_000));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = qa.ask("How does serve work?", &cancel).await.unwrap_err();
    assert!(matches!(err, QaError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(5));

    let points = repo.vectors.count(COLLECTION).await.unwrap();
    assert_eq!(points, 3);
}
