use clap::{Parser, Subcommand};
use imagerez::config::{self, CONFIG_FILENAME, ResizerConfig};
use imagerez::imaging::RustBackend;
use imagerez::output;
use imagerez::picture::{self, ImgAttrs, LowRes, PictureAttrs, PictureOptions};
use imagerez::pipeline::Resizer;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "imagerez")]
#[command(about = "On-demand image resizer with a disk cache")]
#[command(long_about = "\
On-demand image resizer with a disk cache

Requests name a source image, a width and up to two extensions:

  imagerez/img/kitten-300.jpg        300px JPEG from public/img/kitten.jpg
  imagerez/img/kitten-300.jpg.webp   same size, encoded as WebP

Variants are cached under the cache root and reused until the source
changes or they go unread for longer than the TTL.

Run 'imagerez gen-config' to generate a documented imagerez.toml.")]
#[command(version)]
struct Cli {
    /// Config file (missing file = stock defaults)
    #[arg(long, default_value = CONFIG_FILENAME, global = true)]
    config: PathBuf,

    /// Source image directory (overrides config)
    #[arg(long, env = "IMAGEREZ_SOURCE_ROOT", global = true)]
    source_root: Option<PathBuf>,

    /// Cache directory (overrides config)
    #[arg(long, env = "IMAGEREZ_CACHE_ROOT", global = true)]
    cache_root: Option<PathBuf>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve one request and report its response headers
    Read {
        /// Request path, e.g. imagerez/kitten-300.jpg.webp
        path: String,
        /// Device pixel ratio multiplier
        #[arg(long)]
        dpr: Option<f64>,
        /// Write the image bytes to this file
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Delete cached variants unused for longer than the TTL
    Sweep {
        /// Delete every cached variant regardless of age
        #[arg(long)]
        force: bool,
        /// Print deleted paths as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete cached variants whose name contains a pattern
    Clear {
        /// Case-insensitive substring, e.g. "kitten"
        pattern: String,
        /// Print deleted paths as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print <picture> markup for an image
    Picture(PictureArgs),
    /// Print a stock imagerez.toml with all options documented
    GenConfig,
}

/// Overrides for the `[picture]` config section.
#[derive(clap::Args)]
struct PictureArgs {
    /// Base name of the image, e.g. img/kitten
    image: String,
    /// Breakpoint widths, comma separated
    #[arg(long, value_delimiter = ',')]
    breakpoints: Option<Vec<u32>>,
    /// Device pixel ratios, comma separated
    #[arg(long, value_delimiter = ',')]
    dprs: Option<Vec<f64>>,
    #[arg(long)]
    source_ext: Option<String>,
    #[arg(long)]
    dest_ext: Option<String>,
    /// Emit data-srcset for a client-side lazy loader
    #[arg(long)]
    lazy: bool,
    /// Add data-sizes="auto" in lazy mode
    #[arg(long)]
    auto_sizes: bool,
    /// pixel64 | first | last | a URL | a suffix token
    #[arg(long)]
    lowres: Option<String>,
    /// alt text for the <img>
    #[arg(long, default_value = "")]
    alt: String,
    /// class for the <picture>
    #[arg(long)]
    class: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let Cli {
        config: config_path,
        source_root,
        cache_root,
        verbose,
        command,
    } = Cli::parse();
    init_logging(verbose);

    let load = || load_config(&config_path, source_root.clone(), cache_root.clone());

    match command {
        Command::Read { path, dpr, output: out_file } => {
            let resizer = Resizer::new(load()?, RustBackend::new());
            let result = resizer.read_path(&path, dpr)?;
            if let Some(dest) = out_file {
                std::fs::write(&dest, result.read_bytes()?)?;
            }
            output::print_read_output(&path, &result);
        }
        Command::Sweep { force, json } => {
            let resizer = Resizer::new(load()?, RustBackend::new());
            let deleted = resizer.sweep(force);
            output::print_deleted(&deleted, resizer.store().root(), json)?;
        }
        Command::Clear { pattern, json } => {
            eprintln!("{}", output::format_clear_warning(&pattern));
            let resizer = Resizer::new(load()?, RustBackend::new());
            let deleted = resizer.clear_for_image(&pattern);
            output::print_deleted(&deleted, resizer.store().root(), json)?;
        }
        Command::Picture(args) => {
            let config = load()?;
            let image = args.image.clone();
            let options = picture_options(&config, args);
            println!("{}", picture::render_picture(&image, &options));
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Stock defaults, then the config file, then CLI/env root overrides.
fn load_config(
    path: &Path,
    source_root: Option<PathBuf>,
    cache_root: Option<PathBuf>,
) -> Result<ResizerConfig, config::ConfigError> {
    let mut config = config::load_config(path)?;
    if let Some(root) = source_root {
        config.source_root = root;
    }
    if let Some(root) = cache_root {
        config.cache_root = root;
    }
    Ok(config)
}

fn picture_options(config: &ResizerConfig, args: PictureArgs) -> PictureOptions {
    let mut options = PictureOptions::from_config(config);
    if let Some(bps) = args.breakpoints {
        options.breakpoints = bps;
    }
    if let Some(dprs) = args.dprs {
        options.dprs = dprs;
    }
    if let Some(ext) = args.source_ext {
        options.source_ext = ext;
    }
    if let Some(ext) = args.dest_ext {
        options.dest_ext = ext;
    }
    options.lazy |= args.lazy;
    options.auto_sizes |= args.auto_sizes;
    if let Some(lowres) = args.lowres {
        options.lowres = LowRes::from(lowres);
    }
    options.img_attrs = ImgAttrs {
        alt: args.alt,
        ..ImgAttrs::default()
    };
    options.picture_attrs = PictureAttrs {
        class: args.class,
        ..PictureAttrs::default()
    };
    options
}

/// Logs go to stderr so `read` output on stdout stays clean.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "imagerez=debug"
    } else {
        "imagerez=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
