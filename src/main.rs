use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use scribe::{
    GatewayConfig, MeetingMetadata, ModelId, OpenRouterClient, PackageId, Pipeline,
    PipelineRequest, PipelineResult, PipelineStageConfig, StreamEvent, available_models,
    calculate_pipeline_cost, format_run_report, format_sse_event, get_custom_config_risk_level,
    get_package, is_validation_mandatory, parse_dictionary_file, parse_participants,
    parse_request_file, read_transcript_file, resolve_stage_config, write_json, write_summary,
};

#[derive(Parser)]
#[command(name = "scribe")]
#[command(author, version, about = "Meeting transcript summarization pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Per-stage model overrides; all three together make a custom package
#[derive(clap::Args, Debug, Clone)]
struct ModelArgs {
    /// Extraction model id (e.g. google/gemini-2.5-flash)
    #[arg(long)]
    extraction_model: Option<ModelId>,

    /// Synthesis (writer) model id
    #[arg(long)]
    synthesis_model: Option<ModelId>,

    /// Validation model id
    #[arg(long)]
    validation_model: Option<ModelId>,
}

impl ModelArgs {
    fn custom_config(&self) -> Result<Option<PipelineStageConfig>> {
        match (self.extraction_model, self.synthesis_model, self.validation_model) {
            (None, None, None) => Ok(None),
            (Some(extraction), Some(synthesis), Some(validation)) => Ok(Some(PipelineStageConfig {
                extraction,
                synthesis,
                validation,
            })),
            _ => bail!(
                "--extraction-model, --synthesis-model and --validation-model must be given together"
            ),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize a meeting transcript
    Generate {
        /// Plain-text transcript file
        #[arg(short, long, required_unless_present = "request")]
        input: Option<PathBuf>,

        /// Full request as JSON (transcript, packageId, metadata, ...)
        #[arg(long, conflicts_with = "input")]
        request: Option<PathBuf>,

        /// Package preset (TRUST_MAX, BALANCED_PRO, FAST_ELEGANT, CUSTOM)
        #[arg(short, long)]
        package: Option<PackageId>,

        #[command(flatten)]
        models: ModelArgs,

        /// Template / style instructions for the writer
        #[arg(long, conflicts_with = "template_file")]
        template: Option<String>,

        /// Read template instructions from a file
        #[arg(long)]
        template_file: Option<PathBuf>,

        #[arg(long)]
        client_name: Option<String>,

        #[arg(long)]
        meeting_name: Option<String>,

        #[arg(long)]
        date: Option<String>,

        /// Expected participants, comma separated
        #[arg(long)]
        participants: Option<String>,

        /// Transcription corrections (JSON list or map)
        #[arg(long)]
        dictionary: Option<PathBuf>,

        /// Skip validation when the writer allows it
        #[arg(long)]
        skip_validation: bool,

        /// Write the result JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write the Markdown summary here
        #[arg(long)]
        summary: Option<PathBuf>,

        /// Emit `data: {event}` lines on stdout as stages progress
        #[arg(long)]
        stream: bool,

        #[arg(short, long)]
        verbose: bool,
    },

    /// List package presets
    Packages {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the model catalog
    Models,

    /// Estimate cost and risk for a package or custom configuration
    Cost {
        #[arg(short, long)]
        package: Option<PackageId>,

        #[command(flatten)]
        models: ModelArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            input,
            request,
            package,
            models,
            template,
            template_file,
            client_name,
            meeting_name,
            date,
            participants,
            dictionary,
            skip_validation,
            output,
            summary,
            stream,
            verbose,
        } => {
            setup_logging(verbose);

            let mut req = match (&request, &input) {
                (Some(path), _) => parse_request_file(path)?,
                (None, Some(path)) => PipelineRequest {
                    transcript: read_transcript_file(path)?,
                    ..Default::default()
                },
                (None, None) => bail!("Either --input or --request is required"),
            };

            if let Some(custom) = models.custom_config()? {
                req.package_id = PackageId::Custom;
                req.custom_config = Some(custom);
            }
            if let Some(package) = package {
                req.package_id = package;
            }
            if let Some(template) = template {
                req.template_prompt = template;
            }
            if let Some(path) = template_file {
                req.template_prompt = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read template: {:?}", path))?;
            }
            if skip_validation {
                req.options.skip_validation = true;
            }

            let mut metadata = req.metadata.take().unwrap_or_default();
            apply_metadata_flags(
                &mut metadata,
                client_name,
                meeting_name,
                date,
                participants,
            );
            if let Some(path) = dictionary {
                metadata.dictionary = parse_dictionary_file(&path)?;
            }
            if metadata.has_context() || !metadata.dictionary.is_empty() {
                req.metadata = Some(metadata);
            }

            let config = GatewayConfig::from_env();
            if !config.is_configured() {
                bail!("OpenRouter API key is not configured. Set OPENROUTER_API_KEY.");
            }
            let pipeline = Pipeline::new(Arc::new(OpenRouterClient::new(config)));

            let result = if stream {
                run_streaming(&pipeline, req).await?
            } else {
                pipeline.run(req).await
            };

            finish_generate(&result, output, summary, stream)
        }
        Commands::Packages { json } => list_packages(json),
        Commands::Models => {
            for model in available_models() {
                println!(
                    "{:<28} {:<18} ${:.2}/${:.2} per 1M  {}k ctx  {}",
                    model.id.as_str(),
                    model.name,
                    model.input_cost_per_1m,
                    model.output_cost_per_1m,
                    model.context_tokens / 1000,
                    model.description
                );
            }
            Ok(())
        }
        Commands::Cost { package, models } => {
            let custom = models.custom_config()?;
            let package = match (package, &custom) {
                (Some(p), _) => p,
                (None, Some(_)) => PackageId::Custom,
                (None, None) => PackageId::default(),
            };
            let stages = resolve_stage_config(package, custom.as_ref())?;
            print_cost(package, &stages);
            Ok(())
        }
    }
}

fn setup_logging(verbose: bool) {
    let default = if verbose { "scribe=debug" } else { "scribe=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn apply_metadata_flags(
    metadata: &mut MeetingMetadata,
    client_name: Option<String>,
    meeting_name: Option<String>,
    date: Option<String>,
    participants: Option<String>,
) {
    if client_name.is_some() {
        metadata.client_name = client_name;
    }
    if meeting_name.is_some() {
        metadata.meeting_name = meeting_name;
    }
    if date.is_some() {
        metadata.date = date;
    }
    if let Some(list) = participants {
        metadata.participants = parse_participants(&list);
    }
}

/// Print every event as it arrives; return the final result if one came
async fn run_streaming(pipeline: &Pipeline, request: PipelineRequest) -> Result<PipelineResult> {
    let mut events = pipeline.stream(request);
    let mut last_error = None;

    while let Some(event) = events.recv().await {
        print!("{}", format_sse_event(&event)?);
        match event {
            StreamEvent::Complete { result } => return Ok(*result),
            StreamEvent::Error { error } => last_error = Some(error),
            StreamEvent::Progress { .. } => {}
        }
    }

    Ok(PipelineResult::failed(
        last_error.unwrap_or_else(|| "Stream ended without a result".to_string()),
        0,
    ))
}

fn finish_generate(
    result: &PipelineResult,
    output: Option<PathBuf>,
    summary: Option<PathBuf>,
    streamed: bool,
) -> Result<()> {
    match output {
        Some(path) => {
            write_json(result, &path)?;
            info!("Wrote result to {:?}", path);
        }
        None if !streamed => {
            println!(
                "{}",
                serde_json::to_string_pretty(result).context("Failed to serialize result")?
            );
        }
        None => {}
    }

    if let (Some(path), Some(text)) = (summary, result.summary.as_deref()) {
        write_summary(text, &path)?;
        info!("Wrote summary to {:?}", path);
    }

    eprint!("{}", format_run_report(result));

    if result.success {
        Ok(())
    } else {
        Err(anyhow!(
            result
                .error
                .clone()
                .unwrap_or_else(|| "Pipeline failed".to_string())
        ))
    }
}

fn list_packages(json: bool) -> Result<()> {
    let presets: Vec<_> = PackageId::ALL.into_iter().filter_map(get_package).collect();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&presets).context("Failed to serialize packages")?
        );
        return Ok(());
    }

    for package in presets {
        let cost = calculate_pipeline_cost(&package.stages);
        println!("{} ({})", package.name, package.id);
        println!("  {}", package.description);
        println!(
            "  extraction: {}  synthesis: {}  validation: {}",
            package.stages.extraction, package.stages.synthesis, package.stages.validation
        );
        println!(
            "  risk: {}  est. cost: ${:.4}  validation mandatory: {}",
            package.risk_level,
            cost.total,
            is_validation_mandatory(&package.stages)
        );
        println!("  use for: {}\n", package.use_cases.join(", "));
    }
    Ok(())
}

fn print_cost(package: PackageId, stages: &PipelineStageConfig) {
    let cost = calculate_pipeline_cost(stages);
    let risk = get_package(package)
        .map(|p| p.risk_level)
        .unwrap_or_else(|| get_custom_config_risk_level(stages));

    println!("Package: {}", package);
    println!("  extraction  {:<28} ${:.4}", stages.extraction, cost.extraction);
    println!("  synthesis   {:<28} ${:.4}", stages.synthesis, cost.synthesis);
    println!("  validation  {:<28} ${:.4}", stages.validation, cost.validation);
    println!("  total ${:.4}", cost.total);
    println!("  risk: {}", risk);
    println!("  validation mandatory: {}", is_validation_mandatory(stages));
}
