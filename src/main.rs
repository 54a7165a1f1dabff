use anyhow::Context;
use candle_core::{Device, Tensor};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

use nano_eagle::{
    AcceptConfig, AcceptanceStats, DraftTree, PathTable, Precision, SampleAndAccept, StepInputs,
    Top1Sampler, Workspace,
};

#[derive(Parser, Debug)]
#[command(name = "nano-eagle")]
#[command(about = "Run greedy EAGLE sample-and-accept on synthetic draft trees")]
struct Args {
    /// JSON config file (overrides --precision)
    #[arg(short, long)]
    config: Option<String>,

    /// Logits precision: f32 or f16
    #[arg(long, default_value = "f32")]
    precision: Precision,

    /// Request probabilistic acceptance (always rejected)
    #[arg(long)]
    non_greedy: bool,

    /// Draft tree choices as JSON, e.g. "[[0],[1],[0,0]]"
    #[arg(long, default_value = "[[0],[1],[2],[0,0],[0,1],[1,0],[0,0,0],[0,0,1],[0,0,0,0]]")]
    choices: String,

    /// Number of sequences per step
    #[arg(short, long, default_value = "4")]
    batch_size: usize,

    /// Vocabulary size
    #[arg(long, default_value = "1024")]
    vocab_size: usize,

    /// Probability that a draft token agrees with the base model
    #[arg(long, default_value = "0.7")]
    match_prob: f64,

    /// Number of steps to run
    #[arg(long, default_value = "1")]
    steps: usize,

    /// Random seed
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Print the serialized config as hex and exit
    #[arg(long)]
    dump_config: bool,
}

struct SyntheticStep {
    logits: Tensor,
    draft_token_ids: Vec<i32>,
    draft_lens: Vec<i32>,
}

/// Random logits and draft tokens that agree with the base model with
/// probability `match_prob` per node.
fn synthesize(
    rng: &mut StdRng,
    tree: &DraftTree,
    args: &Args,
    precision: Precision,
    max_decoding_tokens: usize,
) -> anyhow::Result<SyntheticStep> {
    let draft_lens: Vec<i32> = (0..args.batch_size)
        .map(|_| rng.gen_range(0..=tree.num_draft_nodes()) as i32)
        .collect();
    let rows: usize = draft_lens.iter().map(|&n| n as usize + 1).sum();

    let values: Vec<f32> = (0..rows * args.vocab_size)
        .map(|_| rng.gen_range(-4.0f32..4.0))
        .collect();
    let logits = Tensor::from_vec(values, (rows, args.vocab_size), &Device::Cpu)?
        .to_dtype(precision.dtype())?;

    let targets = Top1Sampler::new().sample(&logits)?;

    let mut draft_token_ids = vec![nano_eagle::INVALID_TOKEN_ID; args.batch_size * max_decoding_tokens];
    let mut row = 0usize;
    for (b, &len) in draft_lens.iter().enumerate() {
        let count = len as usize + 1;
        for node in 1..count {
            let parent = tree.parent(node).unwrap_or(0);
            draft_token_ids[b * max_decoding_tokens + node] = if rng.gen_bool(args.match_prob) {
                targets[row + parent] as i32
            } else {
                rng.gen_range(0..args.vocab_size) as i32
            };
        }
        row += count;
    }

    Ok(SyntheticStep {
        logits,
        draft_token_ids,
        draft_lens,
    })
}

/// Config from `--config` or `--precision`. `--non-greedy` only ever turns
/// greedy acceptance off; a file's own flag is kept otherwise.
fn resolve_config(args: &Args) -> anyhow::Result<AcceptConfig> {
    let mut config = match &args.config {
        Some(path) => AcceptConfig::from_json_file(path)
            .with_context(|| format!("failed to load config from {path}"))?,
        None => AcceptConfig::new(args.precision),
    };
    if args.non_greedy {
        config = config.greedy(false);
    }
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config = resolve_config(&args)?;

    if args.dump_config {
        let hex: String = config.to_bytes().iter().map(|b| format!("{b:02x}")).collect();
        println!("{hex}");
        return Ok(());
    }

    let step = SampleAndAccept::new(config)?;

    let choices: Vec<Vec<usize>> =
        serde_json::from_str(&args.choices).context("failed to parse --choices")?;
    let tree = DraftTree::from_choices(&choices)?;
    let max_decoding_tokens = tree.num_nodes();
    let max_path_len = tree.max_path_len();
    let paths: Vec<i32> = (0..args.batch_size)
        .map(|_| tree.to_paths(max_decoding_tokens, max_path_len))
        .collect::<nano_eagle::Result<Vec<_>>>()?
        .concat();

    println!("nano-eagle v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "Precision: {}, tree: {} nodes, {} leaves, depth {}",
        step.precision(),
        tree.num_nodes(),
        tree.leaves().len(),
        max_path_len
    );

    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut workspace = Workspace::default();
    let mut stats = AcceptanceStats::new();
    let temperature = vec![1.0f32; args.batch_size];
    let rand_validation = vec![0.0f32; args.batch_size];

    for iteration in 0..args.steps {
        let synthetic = synthesize(&mut rng, &tree, &args, step.precision(), max_decoding_tokens)?;
        let inputs = StepInputs {
            logits: &synthetic.logits,
            draft_token_ids: &synthetic.draft_token_ids,
            draft_lens: &synthetic.draft_lens,
            paths: PathTable::new(&paths, args.batch_size, max_decoding_tokens, max_path_len)?,
            temperature: &temperature,
            rand_validation: &rand_validation,
        };

        workspace.reserve(step.workspace_size(&inputs.shape()?));
        let outputs = step.step(&inputs, &mut workspace)?;
        stats.record(&outputs, &synthetic.draft_lens);

        println!("\nStep {iteration}");
        for b in 0..outputs.batch_size() {
            println!(
                "  seq {b}: draft_len={} path={} accepted={:?} last={} cumsum={}",
                synthetic.draft_lens[b],
                outputs.accepted_path_ids[b],
                outputs.accepted(b),
                outputs.last_accepted_token_ids[b],
                outputs.exclusive_sum_accepted_indices[b],
            );
        }
    }

    println!(
        "\nAcceptance rate: {:.3}, tokens per sequence-step: {:.3}",
        stats.acceptance_rate(),
        stats.tokens_per_sequence_step()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nano_eagle::Error;

    fn write_config(name: &str, json: &str) -> String {
        let path = std::env::temp_dir()
            .join(format!("nano-eagle-{name}-{}.json", std::process::id()));
        std::fs::write(&path, json).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_non_greedy_config_file_rejected() {
        let path = write_config("non-greedy", r#"{"precision":"f32","greedy_sampling":false}"#);
        let args = Args::try_parse_from(["nano-eagle", "--config", &path]).unwrap();

        let config = resolve_config(&args).unwrap();
        std::fs::remove_file(&path).ok();

        assert!(!config.greedy_sampling);
        assert!(matches!(
            SampleAndAccept::new(config),
            Err(Error::NonGreedyUnsupported)
        ));
    }

    #[test]
    fn test_greedy_config_file_kept() {
        let path = write_config("greedy", r#"{"precision":"f16","greedy_sampling":true}"#);
        let args = Args::try_parse_from(["nano-eagle", "--config", &path]).unwrap();

        let config = resolve_config(&args).unwrap();
        std::fs::remove_file(&path).ok();

        assert!(config.greedy_sampling);
        assert_eq!(config.precision, Precision::F16);
    }

    #[test]
    fn test_non_greedy_flag() {
        let args = Args::try_parse_from(["nano-eagle", "--non-greedy"]).unwrap();
        let config = resolve_config(&args).unwrap();
        assert!(!config.greedy_sampling);

        let args = Args::try_parse_from(["nano-eagle", "--precision", "f16"]).unwrap();
        let config = resolve_config(&args).unwrap();
        assert!(config.greedy_sampling);
        assert_eq!(config.precision, Precision::F16);
    }
}
