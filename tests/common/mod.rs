use aeon::config::Config;
use aeon::rag::{
    Embeddings, HashEmbeddings, LanguageModel, RagBinding, RagFactory, SearchHit, SearchProvider,
};
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Language model that records prompts and answers with a fixed text
#[allow(dead_code)]
#[derive(Default)]
pub struct MockLlm {
    pub answer: String,
    pub prompts: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl MockLlm {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for MockLlm {
    async fn generate(&self, prompt: &str) -> aeon::Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.answer.clone())
    }
}

/// Search provider returning canned hits
#[allow(dead_code)]
#[derive(Default, Clone)]
pub struct MockSearch {
    pub hits: Vec<SearchHit>,
}

#[async_trait]
impl SearchProvider for MockSearch {
    async fn search(&self, _query: &str, max_results: usize) -> aeon::Result<Vec<SearchHit>> {
        Ok(self.hits.iter().take(max_results).cloned().collect())
    }
}

/// Factory binding hash embeddings, a shared [`MockLlm`] and [`MockSearch`]
#[allow(dead_code)]
pub struct TestFactory {
    pub llm: Arc<MockLlm>,
    pub search: MockSearch,
}

#[allow(dead_code)]
impl TestFactory {
    pub fn new(answer: &str) -> Self {
        Self {
            llm: Arc::new(MockLlm::answering(answer)),
            search: MockSearch::default(),
        }
    }

    pub fn with_hits(answer: &str, bodies: &[&str]) -> Self {
        let hits = bodies
            .iter()
            .enumerate()
            .map(|(i, body)| SearchHit {
                title: format!("Result {}", i + 1),
                url: format!("https://example.org/{}", i + 1),
                body: body.to_string(),
            })
            .collect();
        Self {
            llm: Arc::new(MockLlm::answering(answer)),
            search: MockSearch { hits },
        }
    }
}

#[async_trait]
impl RagFactory for TestFactory {
    async fn bind(&self, config: &Config, db_dir: &Path) -> aeon::Result<RagBinding> {
        let embeddings: Arc<dyn Embeddings> = Arc::new(HashEmbeddings::new(64));
        RagBinding::assemble(
            config,
            db_dir,
            embeddings,
            self.llm.clone(),
            Arc::new(self.search.clone()),
        )
        .await
    }
}

/// [`TestFactory`] whose binds hang while `stalled` is set
#[allow(dead_code)]
pub struct StallingFactory {
    pub inner: TestFactory,
    pub stalled: Arc<AtomicBool>,
}

#[allow(dead_code)]
impl StallingFactory {
    pub fn new(answer: &str, stalled: Arc<AtomicBool>) -> Self {
        Self {
            inner: TestFactory::new(answer),
            stalled,
        }
    }
}

#[async_trait]
impl RagFactory for StallingFactory {
    async fn bind(&self, config: &Config, db_dir: &Path) -> aeon::Result<RagBinding> {
        if self.stalled.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        self.inner.bind(config, db_dir).await
    }
}

/// Configuration whose paths all live inside `dir`
#[allow(dead_code)]
pub fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.paths.memory_dir = dir.path().join("chats");
    config.paths.input_dir = dir.path().join("input");
    config.paths.output_dir = dir.path().join("output");
    config.paths.plugins_dir = dir.path().join("plugins");
    config.embeddings.provider = "hash".to_string();
    config.embeddings.dimensions = 64;
    config
}

/// Write a plugin directory with `yaml` as its manifest
#[allow(dead_code)]
pub fn write_plugin(plugins_dir: &Path, name: &str, yaml: &str) -> PathBuf {
    let dir = plugins_dir.join(name);
    fs::create_dir_all(&dir).expect("failed to create plugin dir");
    fs::write(dir.join("config.yml"), yaml).expect("failed to write manifest");
    dir
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}
