use std::sync::{Arc, Mutex};

use ai_llm_service::{ChatDelta, ChatOptions};
use async_trait::async_trait;
use contextor::{
    ChatCompletion, CompletionDriver, ContextorError, DeltaStream, DriverOptions, PromptAssembler,
    QueryOrchestrator, TokenCounter,
};
use filings::Document;
use rag_store::{
    DistanceKind, EmbedFuture, EmbeddingBatch, EmbeddingRecord, EmbeddingsProvider, IndexLoader,
    LoaderConfig, MemoryStore, RagConfig, RagError, RagStore,
};
use tokio_util::sync::CancellationToken;

struct WordCounter;

impl TokenCounter for WordCounter {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

/// Questions mentioning "food" land near the food bank.
struct KeywordEmbedder;

impl EmbeddingsProvider for KeywordEmbedder {
    fn embed<'a>(&'a self, text: &'a str) -> EmbedFuture<'a, Vec<f32>> {
        Box::pin(async move {
            if text.contains("food") {
                Ok(vec![1.0, 0.1])
            } else {
                Ok(vec![0.1, 1.0])
            }
        })
    }

    fn embed_batch<'a>(&'a self, texts: &'a [String]) -> EmbedFuture<'a, EmbeddingBatch> {
        Box::pin(async move {
            let mut vectors = Vec::with_capacity(texts.len());
            for t in texts {
                vectors.push(self.embed(t).await?);
            }
            Ok(EmbeddingBatch {
                vectors,
                total_tokens: 0,
            })
        })
    }
}

struct FailingEmbedder;

impl EmbeddingsProvider for FailingEmbedder {
    fn embed<'a>(&'a self, _text: &'a str) -> EmbedFuture<'a, Vec<f32>> {
        Box::pin(async { Err(RagError::Provider("embedding service down".into())) })
    }

    fn embed_batch<'a>(&'a self, _texts: &'a [String]) -> EmbedFuture<'a, EmbeddingBatch> {
        Box::pin(async { Err(RagError::Provider("embedding service down".into())) })
    }
}

/// Answers with the first line of the context that names an organization.
#[derive(Default)]
struct EchoChat {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl ChatCompletion for EchoChat {
    async fn stream(&self, prompt: &str, _params: &ChatOptions) -> Result<DeltaStream, ContextorError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let name = prompt
            .lines()
            .find(|l| l.starts_with("Name: "))
            .unwrap_or("Name: nobody")
            .trim_start_matches("Name: ")
            .to_string();
        let items: Vec<Result<ChatDelta, ContextorError>> = vec![
            Ok(ChatDelta {
                content: Some(format!("{name} ")),
                finish_reason: None,
            }),
            Ok(ChatDelta {
                content: Some("does.".into()),
                finish_reason: Some("stop".into()),
            }),
        ];
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

fn doc(name: &str) -> Document {
    Document {
        name: Some(name.into()),
        purpose: Some(format!("{name} purpose")),
        ..Default::default()
    }
}

async fn loaded_store() -> RagStore {
    let store = Arc::new(MemoryStore::new());
    let loader_cfg = LoaderConfig::default();
    IndexLoader::new(store.as_ref(), &loader_cfg, 2, DistanceKind::Cosine)
        .load_all(
            "irs990",
            vec![
                Ok(EmbeddingRecord::new(doc("Riverside Food Bank"), vec![1.0, 0.0])),
                Ok(EmbeddingRecord::new(doc("Hilltop Arts Council"), vec![0.0, 1.0])),
            ],
        )
        .await
        .unwrap();

    let mut cfg = RagConfig::new_default("http://localhost:6334", "irs990");
    cfg.embedding_dim = 2;
    RagStore::with_store(cfg, store)
}

fn driver(chat: Arc<EchoChat>) -> CompletionDriver {
    CompletionDriver::new(
        chat,
        PromptAssembler::new(Arc::new(WordCounter), 14_900),
        ChatOptions::default(),
        DriverOptions::default(),
    )
}

#[tokio::test]
async fn answers_from_the_most_relevant_filing() {
    let chat = Arc::new(EchoChat::default());
    let orchestrator = QueryOrchestrator::new(loaded_store().await, Arc::new(KeywordEmbedder), driver(chat.clone()));

    let mut streamed = String::new();
    let out = orchestrator
        .answer("who distributes food?", |f| streamed.push_str(f), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(out.answer.as_deref(), Some("Riverside Food Bank does."));
    assert_eq!(out.context_count, 2);
    assert_eq!(streamed, "Riverside Food Bank does.");

    let prompt = chat.prompts.lock().unwrap()[0].clone();
    let food = prompt.find("Riverside Food Bank").unwrap();
    let arts = prompt.find("Hilltop Arts Council").unwrap();
    assert!(food < arts);
    assert!(prompt.ends_with("Question: who distributes food?\nAnswer: "));
}

#[tokio::test]
async fn ask_returns_just_the_answer() {
    let chat = Arc::new(EchoChat::default());
    let orchestrator = QueryOrchestrator::new(loaded_store().await, Arc::new(KeywordEmbedder), driver(chat));

    let answer = orchestrator.ask("who supports the arts?").await.unwrap();
    assert_eq!(answer.as_deref(), Some("Hilltop Arts Council does."));
}

#[tokio::test]
async fn embedding_failures_propagate_without_calling_the_model() {
    let chat = Arc::new(EchoChat::default());
    let orchestrator = QueryOrchestrator::new(loaded_store().await, Arc::new(FailingEmbedder), driver(chat.clone()));

    let err = orchestrator.ask("anything").await.unwrap_err();
    assert!(matches!(err, ContextorError::Rag(RagError::Provider(_))));
    assert!(chat.prompts.lock().unwrap().is_empty());
}
