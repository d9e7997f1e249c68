use anyhow::Context;
use ggml_parser::ErrorKind;

use crate::cli::InfoArgs;
use crate::config::AppConfig;

pub async fn execute(args: InfoArgs) -> anyhow::Result<()> {
    let hint = match args.hint {
        Some(hint) => hint,
        None => AppConfig::load_or_default()?.default_hint,
    };

    let descriptor = match ggml_parser::decode_file(&args.path, &hint) {
        Ok(d) => d,
        Err(e) if e.kind() == ErrorKind::Dispatch => {
            let known: Vec<_> = ggml_parser::registered_model_types().collect();
            anyhow::bail!("{e} (known model types: {})", known.join(", "));
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", args.path.display()));
        }
    };

    println!("{}", serde_json::to_string_pretty(&descriptor)?);
    Ok(())
}
