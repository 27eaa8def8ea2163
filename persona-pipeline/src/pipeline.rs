use crate::profile_url::parse_profile_input;
use chrono::Utc;
use llm_interface::{GeminiProvider, PersonaRequester, PromptBuilder};
use persona_analysis::{ActivityStats, CitationMapper};
use persona_core::{AppConfig, CoreError, FetchLimits, PersonaResult, RetryPolicy, Settings};
use reddit_client::{ActivitySource, RedditFetcher};
use report_writer::{Report, ReportWriter};
use std::path::PathBuf;
use tracing::{info, warn};

/// The production pipeline: Reddit in, Gemini in the middle.
pub type PersonaPipeline = Pipeline<RedditFetcher, GeminiProvider>;

/// Runs every stage for one user, in order. The report is written only
/// once every earlier stage has succeeded.
#[derive(Debug)]
pub struct Pipeline<S, R> {
    source: S,
    requester: R,
    limits: FetchLimits,
    prompt_builder: PromptBuilder,
    mapper: CitationMapper,
    writer: ReportWriter,
}

impl<S: ActivitySource, R: PersonaRequester> Pipeline<S, R> {
    pub fn new(source: S, requester: R, settings: &Settings) -> Self {
        Self {
            source,
            requester,
            limits: settings.limits(),
            prompt_builder: PromptBuilder::new(settings.prompt_budget_chars),
            mapper: CitationMapper::default(),
            writer: ReportWriter::new(settings.output_dir.clone()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn requester(&self) -> &R {
        &self.requester
    }

    /// Generates a persona report for `input` (a profile URL or username)
    /// and returns the path it was written to.
    pub async fn run(&self, input: &str) -> Result<PathBuf, CoreError> {
        let username = parse_profile_input(input)?;
        info!("Processing user: {}", username);

        let activity = self.source.fetch_activity(&username, self.limits).await?;
        info!(
            "Fetched {} posts and {} comments for {}",
            activity.batch.post_count(),
            activity.batch.comment_count(),
            username
        );

        let stats = ActivityStats::from_batch(&activity.batch);
        let prompt = self
            .prompt_builder
            .build(&activity.profile, &activity.batch, &stats);
        if prompt.dropped > 0 {
            warn!(
                "{} of {} items left out of the prompt to fit {} characters",
                prompt.dropped,
                activity.batch.len(),
                self.prompt_builder.budget_chars()
            );
        }

        let raw = self.requester.request_persona(&prompt).await?;
        let persona = PersonaResult::parse(raw);
        info!("Persona generated with {} sections", persona.sections.len());

        let citations = self.mapper.map(&persona, &activity.batch);
        let report = Report {
            profile: activity.profile,
            persona,
            citations,
            stats,
            generated_at: Utc::now(),
        };
        self.writer.write(&report)
    }
}

impl Pipeline<RedditFetcher, GeminiProvider> {
    /// Builds the clients for a real run. No network I/O happens here.
    pub fn from_config(config: &AppConfig) -> Result<Self, CoreError> {
        let fetcher = RedditFetcher::new(&config.reddit, &config.settings, RetryPolicy::reddit())?;
        let provider = GeminiProvider::new(&config.gemini_api_key, &config.settings)?;
        Ok(Self::new(fetcher, provider, &config.settings))
    }
}
