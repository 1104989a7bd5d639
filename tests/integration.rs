use std::fs;
use std::path::Path;
use std::sync::Arc;

use repoqa_core::config::Config;
use repoqa_core::qa::QaPipeline;
use repoqa_core::synthesizer::Synthesizer;
use repoqa_core::verify::verify_schema;
use repoqa_index::indexer::CodeIndexer;
use repoqa_index::intent::Intent;
use repoqa_index::retriever::CodeRetriever;
use repoqa_llm::mock::MockProvider;
use repoqa_store::{InMemoryVectorStore, RecordStore, SqliteRecordStore, VectorStore};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

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

struct App {
    repo: TempDir,
    _data: TempDir,
    config: Config,
    vectors: Arc<dyn VectorStore>,
    records: Arc<dyn RecordStore>,
}

impl App {
    async fn new() -> Self {
        let repo = TempDir::new().unwrap();
        let mut utils = python_function("load_files", 10);
        utils.push_str(&python_function("split_into_chunks", 10));
        write(repo.path(), "backend/code_ingest_utils.py", &utils);
        write(
            repo.path(),
            "web/src/api.ts",
            "export function fetchAnswer(q: string) {\n  return post('/ask', q);\n}\n",
        );

        let data = TempDir::new().unwrap();
        let mut config = Config::default();
        config.store.sqlite_path = data.path().join("repoqa.db").to_string_lossy().into_owned();
        config.timeouts.base_backoff_ms = 1;
        config.validate().unwrap();

        let records: Arc<dyn RecordStore> = Arc::new(
            SqliteRecordStore::new(&config.store.sqlite_path)
                .await
                .unwrap(),
        );
        Self {
            repo,
            _data: data,
            config,
            vectors: Arc::new(InMemoryVectorStore::new()),
            records,
        }
    }

    fn indexer(&self) -> CodeIndexer<MockProvider> {
        CodeIndexer::new(
            Arc::clone(&self.vectors),
            Arc::clone(&self.records),
            Arc::new(MockProvider::default()),
            self.config.indexer_config(false),
        )
    }

    fn pipeline(&self, provider: MockProvider) -> QaPipeline<MockProvider> {
        let provider = Arc::new(provider);
        QaPipeline::new(
            self.config.intent_classifier().unwrap(),
            self.config.retrieval.profiles.clone(),
            CodeRetriever::new(
                Arc::clone(&self.vectors),
                Arc::clone(&provider),
                self.config.retrieval_config(),
            ),
            Synthesizer::new(provider, self.config.synthesizer_config()),
        )
    }
}

fn scripted(responses: &[&str]) -> MockProvider {
    MockProvider::with_responses(responses.iter().map(|&s| s.to_owned()).collect())
}

#[tokio::test]
async fn ingest_ask_verify() {
    let app = App::new().await;
    let report = app
        .indexer()
        .index(app.repo.path(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.files_indexed, 2);
    assert_eq!(report.chunks_created, 3);
    assert!(!report.has_failures());

    let qa = app.pipeline(scripted(&[
        "split_into_chunks slices the text [backend/code_ingest_utils.py:11-20].",
    ]));
    let answer = qa
        .ask("How does split_into_chunks work?", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(answer.intent, Intent::How);
    assert!(answer.is_verified());
    assert_eq!(
        answer.citations[0].to_string(),
        "[backend/code_ingest_utils.py:11-20]"
    );

    let schema = verify_schema(
        app.vectors.as_ref(),
        Some(app.records.as_ref()),
        &app.config.store.collection,
        10,
    )
    .await
    .unwrap();
    assert_eq!(schema.sampled, 3);
    assert!(schema.is_complete());
    assert!(schema.untracked.is_empty());
}

#[tokio::test]
async fn citation_of_stale_span_is_rejected_after_reindex() {
    let app = App::new().await;
    let cancel = CancellationToken::new();
    app.indexer().index(app.repo.path(), &cancel).await.unwrap();

    // Grow load_files by five lines so split_into_chunks moves to 16-25.
    let mut utils = python_function("load_files", 15);
    utils.push_str(&python_function("split_into_chunks", 10));
    write(app.repo.path(), "backend/code_ingest_utils.py", &utils);
    let report = app.indexer().index(app.repo.path(), &cancel).await.unwrap();
    assert_eq!(report.chunks_updated, 2);
    assert_eq!(report.chunks_deleted, 2);
    assert_eq!(report.chunks_unchanged, 1);

    let stale = "See [backend/code_ingest_utils.py:11-20].";
    let qa = app.pipeline(scripted(&[stale, stale]));
    let answer = qa
        .ask("How does split_into_chunks work?", &cancel)
        .await
        .unwrap();
    assert!(!answer.is_verified());
    assert!(answer.citations.is_empty());
    assert!(
        answer
            .sources
            .iter()
            .any(|s| s.path == "backend/code_ingest_utils.py" && s.line_start == 16)
    );
}

#[tokio::test]
async fn queries_run_while_ingesting() {
    let app = App::new().await;
    let cancel = CancellationToken::new();
    app.indexer().index(app.repo.path(), &cancel).await.unwrap();

    write(app.repo.path(), "backend/extra.py", &python_function("extra", 30));
    let indexer = app.indexer();
    let qa = app.pipeline(scripted(&[
        "It posts to /ask [web/src/api.ts:1-3].",
    ]));

    let (report, answer) = tokio::join!(
        indexer.index(app.repo.path(), &cancel),
        qa.ask("Where is fetchAnswer defined?", &cancel),
    );
    assert_eq!(report.unwrap().files_indexed, 1);
    let answer = answer.unwrap();
    assert_eq!(answer.intent, Intent::FileLocation);
    assert!(answer.is_verified());
}
