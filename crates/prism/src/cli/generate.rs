//! The `prism generate` command: request variants of a source image.

use clap::Args;
use prism_core::{build_action, Config, Engine, Prism, VariantOptions};

/// Arguments for the `generate` command.
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Source image path/key within the default storage backend
    pub source: String,

    /// Bound within WxH (e.g. 400x300), preserving aspect ratio
    #[arg(long, value_parser = parse_size)]
    pub fit: Option<(u32, u32)>,

    /// Fill WxH exactly, cropping the overflow
    #[arg(long, value_parser = parse_size)]
    pub crop: Option<(u32, u32)>,

    /// Crop focal point as X%xY% (default 50x50)
    #[arg(long, value_parser = parse_size)]
    pub focus: Option<(u32, u32)>,

    /// Mirror horizontally
    #[arg(long)]
    pub flip: bool,

    /// Lossy encode quality override (1-100)
    #[arg(long)]
    pub quality: Option<u8>,

    /// High-resolution multiplier (e.g. 2 for @2x output)
    #[arg(long)]
    pub highres: Option<u32>,

    /// Friendly name used instead of the hash in the output filename
    #[arg(long)]
    pub alias: Option<String>,

    /// Storage backend for the generated output
    #[arg(long)]
    pub storage: Option<String>,

    /// Regenerate even if the variant already exists
    #[arg(long)]
    pub force: bool,

    /// Enqueue for a worker instead of generating inline
    #[arg(long)]
    pub queue: bool,
}

/// Execute the generate command.
pub async fn execute(args: GenerateArgs, config: Config) -> anyhow::Result<()> {
    let prism = Prism::new(config)?;
    let opts = build_opts(&args)?;
    let ledger = prism.ledger();
    let action = build_action(&args.source, &[opts.clone()], ledger.as_ref(), args.force);

    if args.queue {
        prism.queue().push(&action)?;
        println!("Queued {} ({} pending)", args.source, prism.queue().len()?);
        return Ok(());
    }

    match prism.executor().add(&action)? {
        Some(records) => {
            let record = &records[0];
            let meta = prism.executor().build_meta(record);
            let name = record.image.as_deref().unwrap_or_default();
            let url = prism.executor().generated_storage(&opts)?.url(name);
            println!(
                "{url} ({}x{})",
                meta.width.unwrap_or_default(),
                meta.height.unwrap_or_default()
            );
        }
        None => {
            println!(
                "{} is already being generated; retry later or use --force",
                args.source
            );
        }
    }
    Ok(())
}

fn build_opts(args: &GenerateArgs) -> anyhow::Result<VariantOptions> {
    if args.fit.is_some() && args.crop.is_some() {
        anyhow::bail!("--fit and --crop are mutually exclusive");
    }
    let mut opts = VariantOptions::new();
    if let Some(size) = args.fit {
        opts = opts.with("fit", size);
    }
    if let Some(size) = args.crop {
        opts = opts.with("crop", size);
    }
    if let Some(focus) = args.focus {
        opts = opts.with("focus", focus);
    }
    if args.flip {
        opts = opts.with("flip", true);
    }
    if let Some(quality) = args.quality {
        opts = opts.with("quality", u32::from(quality));
    }
    if let Some(factor) = args.highres {
        opts = opts.with(prism_core::options::HIGHRES, factor);
    }
    if let Some(alias) = &args.alias {
        opts = opts.with(prism_core::options::ALIAS, alias.as_str());
    }
    if let Some(storage) = &args.storage {
        opts = opts.with(prism_core::options::STORAGE, storage.as_str());
    }
    Ok(opts)
}

/// Parse a `WxH` pair such as `400x300`.
fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH, got {s:?}"))?;
    let w = w.trim().parse().map_err(|_| format!("bad width in {s:?}"))?;
    let h = h.trim().parse().map_err(|_| format!("bad height in {s:?}"))?;
    Ok((w, h))
}
