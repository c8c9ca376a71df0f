/// The essay generation pipeline: request → sampled competencies → essays.
///
/// Wires together the sampler, descriptor catalog, prompt assembly and the
/// text-generation collaborator, one unit at a time.
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use crate::core::completion::{CompletionError, CompletionRequest, TextCompletion};
use crate::core::config::EssayConfig;
use crate::core::descriptors::{DescriptorCatalog, DescriptorError};
use crate::core::prompt::{build_competency, build_persona, compose_task};
use crate::core::sampler::{CompetencySampler, SamplerError, SamplerParams};
use crate::core::sink::{RecordSink, SinkError};
use crate::schema::essay::{EssayRecord, EssayRequest, EssayStatus};
use crate::store::current_ts;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("sampler error: {0}")]
    Sampler(#[from] SamplerError),
    #[error("descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),
    #[error("completion error: {0}")]
    Completion(#[from] CompletionError),
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),
}

/// Outcome of one batch. Every requested unit has a record, failed or not.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub records: Vec<EssayRecord>,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchReport {
    /// True when units were requested and none produced text.
    pub fn all_failed(&self) -> bool {
        !self.records.is_empty() && self.succeeded == 0
    }
}

/// Generates batches of essays for simulated students. Built via
/// `EssayGenerator::builder(client)`.
pub struct EssayGenerator<C> {
    client: C,
    sampler: CompetencySampler,
    catalog: DescriptorCatalog,
    model: String,
    temperature: f32,
    persona_note: Option<String>,
    rng: StdRng,
}

/// Builder for constructing an `EssayGenerator`.
pub struct EssayGeneratorBuilder<C> {
    client: C,
    model: String,
    temperature: f32,
    seed: Option<u64>,
    sampler_params: SamplerParams,
    persona_note: Option<String>,
    descriptors_path: Option<PathBuf>,
    /// Directly provided catalog (for testing without files).
    catalog: Option<DescriptorCatalog>,
}

impl<C: TextCompletion> EssayGenerator<C> {
    pub fn builder(client: C) -> EssayGeneratorBuilder<C> {
        let defaults = EssayConfig::default();
        EssayGeneratorBuilder {
            client,
            model: defaults.model,
            temperature: defaults.temperature,
            seed: None,
            sampler_params: SamplerParams::default(),
            persona_note: None,
            descriptors_path: None,
            catalog: None,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Generate `n` essays for `request`, strictly in order.
    ///
    /// A failed generation call yields a record with empty text and a
    /// `Failed` status; the remaining units still run.
    pub fn generate(&mut self, request: &EssayRequest, n: usize) -> BatchReport {
        let persona = build_persona(request, self.persona_note.as_deref());
        let mut report = BatchReport {
            records: Vec::with_capacity(n),
            ..BatchReport::default()
        };

        for unit in 1..=n {
            let levels = self.sampler.sample_one(&mut self.rng);
            let competency = self.catalog.resolve(levels);
            let task = compose_task(
                &build_competency(&competency),
                &request.prompt_template,
                &request.sections,
            );

            tracing::info!(
                unit,
                of = n,
                knowledge = levels.knowledge.get(),
                grammar = levels.grammar.get(),
                flow = levels.flow.get(),
                "generating essay"
            );

            let outcome = self.client.complete(&CompletionRequest {
                system: &persona,
                task: &task,
                model: &self.model,
                temperature: self.temperature,
            });

            let (essay_text, status) = match outcome {
                Ok(completion) => {
                    report.succeeded += 1;
                    if completion.text.is_empty() {
                        tracing::warn!(unit, "generation returned empty text");
                    }
                    (completion.text, EssayStatus::Generated)
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(unit, error = %e, "essay generation failed");
                    (String::new(), EssayStatus::Failed { reason: e.to_string() })
                }
            };

            report.records.push(EssayRecord {
                id: Uuid::new_v4(),
                topic: request.topic.clone(),
                subject: request.subject.clone(),
                grade: request.grade_level.clone(),
                assignment_type: request.assignment_type.clone(),
                prompt: request.prompt_template.clone(),
                competency,
                essay_text,
                status,
                model: self.model.clone(),
                created_ts: current_ts(),
            });
        }

        tracing::info!(
            succeeded = report.succeeded,
            failed = report.failed,
            topic = %request.topic,
            "batch complete"
        );
        report
    }

    /// Generate a batch, then hand it to `sink` in one call.
    pub fn generate_into(
        &mut self,
        request: &EssayRequest,
        n: usize,
        sink: &mut dyn RecordSink,
    ) -> Result<BatchReport, GenerationError> {
        let report = self.generate(request, n);
        sink.write_batch(&request.topic, &report.records)?;
        Ok(report)
    }
}

impl<C: TextCompletion> EssayGeneratorBuilder<C> {
    /// Apply every generation setting from a loaded config.
    pub fn config(mut self, config: &EssayConfig) -> Self {
        self.model = config.model.clone();
        self.temperature = config.temperature;
        self.seed = config.seed;
        self.sampler_params = config.sampler_params();
        self.persona_note = config.persona_note.clone();
        self.descriptors_path = config.descriptors.clone();
        self
    }

    pub fn model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn sampler(mut self, params: SamplerParams) -> Self {
        self.sampler_params = params;
        self
    }

    pub fn persona_note(mut self, note: &str) -> Self {
        self.persona_note = Some(note.to_string());
        self
    }

    pub fn descriptors(mut self, path: &str) -> Self {
        self.descriptors_path = Some(PathBuf::from(path));
        self
    }

    /// Provide a catalog directly (for testing without files).
    pub fn with_catalog(mut self, catalog: DescriptorCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn build(self) -> Result<EssayGenerator<C>, GenerationError> {
        let sampler = CompetencySampler::new(self.sampler_params)?;

        let catalog = match (self.catalog, self.descriptors_path) {
            (Some(catalog), _) => catalog,
            (None, Some(path)) => DescriptorCatalog::load_from_ron(&path)?,
            (None, None) => DescriptorCatalog::standard(),
        };

        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(EssayGenerator {
            client: self.client,
            sampler,
            catalog,
            model: self.model,
            temperature: self.temperature,
            persona_note: self.persona_note,
            rng,
        })
    }
}
