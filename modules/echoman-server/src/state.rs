//! Process-wide application state, built once in `main` and shared behind
//! an `Arc` across every handler and cron job — the teacher's own pattern
//! of a stateless, `Clone`-able client/config bundle (`spec.md` §9, §5).

use std::collections::HashMap;
use std::sync::Arc;

use echoman_ai::{
    HeuristicTokenCounter, OpenAiAdjudicator, OpenAiEmbeddingProvider, OpenAiRagAnswerer,
    ProviderClient,
};
use echoman_common::Config;
use echoman_pipeline::{KeywordTopicClassifier, StageOneMerger, StageTwoMerger};
use echoman_rag::{RagReader, Retriever};
use echoman_store::{JudgementRepo, RunRepo, SourceItemRepo, TopicRepo};
use echoman_vector::{PgVectorIndex, VectorIndex};
use sqlx::PgPool;

pub struct AppState {
    pub config: Config,
    pub items: SourceItemRepo,
    pub topics: TopicRepo,
    pub runs: RunRepo,
    pub judgements: JudgementRepo,
    pub stage_one: StageOneMerger,
    pub stage_two: StageTwoMerger,
    pub rag_reader: Arc<RagReader>,
}

impl AppState {
    pub fn build(pool: PgPool, config: Config) -> Arc<Self> {
        let items = SourceItemRepo::new(pool.clone());
        let topics = TopicRepo::new(pool.clone());
        let runs = RunRepo::new(pool.clone());
        let judgements = JudgementRepo::new(pool.clone());

        let llm_client = ProviderClient::new(config.llm_api_key.clone(), config.llm_base_url.clone());
        let embedding_client =
            ProviderClient::new(config.embedding_api_key.clone(), config.llm_base_url.clone());

        let vector_index: Arc<dyn VectorIndex> = Arc::new(PgVectorIndex::new(pool.clone()));
        let embedder: Arc<_> =
            Arc::new(OpenAiEmbeddingProvider::new(embedding_client, config.embedding_model.clone()));
        let adjudicator = Arc::new(OpenAiAdjudicator::new(
            llm_client.clone(),
            config.llm_model.clone(),
            config.global_merge_confidence_threshold,
        ));
        let classifier = Arc::new(KeywordTopicClassifier::default());

        let mut platform_weights = HashMap::new();
        for platform in echoman_common::Platform::ALL {
            platform_weights.insert(platform, config.platform_weight(platform));
        }

        let stage_one = StageOneMerger::new(
            items.clone(),
            runs.clone(),
            judgements.clone(),
            vector_index.clone(),
            embedder.clone(),
            adjudicator.clone(),
            platform_weights,
            &config,
        );

        let stage_two = StageTwoMerger::new(
            items.clone(),
            topics.clone(),
            runs.clone(),
            judgements.clone(),
            vector_index.clone(),
            embedder.clone(),
            adjudicator.clone(),
            classifier,
            adjudicator.clone(),
            &config,
        )
        .with_concurrency(config.global_merge_concurrent);

        let answerer = Arc::new(OpenAiRagAnswerer::new(
            llm_client,
            config.llm_model.clone(),
            echoman_ai::budgets::RAG_COMPLETION_TOKENS,
        ));
        let retriever = Retriever::new(topics.clone(), items.clone(), vector_index.clone(), embedder);
        let rag_reader = Arc::new(RagReader::new(
            retriever,
            answerer,
            judgements.clone(),
            Arc::new(HeuristicTokenCounter),
            "openai",
            config.llm_model.clone(),
        ));

        Arc::new(Self { config, items, topics, runs, judgements, stage_one, stage_two, rag_reader })
    }
}
