use clap::{Parser, Subcommand};
use sitegraph::cache::DigestManifest;
use sitegraph::pipeline::{self, BuildOutput};
use sitegraph::types::RouteManifest;
use sitegraph::{analytics, config, output, robots};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Shared flags for commands that compare against the previous build.
#[derive(clap::Args, Clone)]
struct CacheArgs {
    /// Ignore the digest manifest of the previous build; report every node as new
    #[arg(long)]
    no_cache: bool,
}

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup, called exactly once
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "sitegraph")]
#[command(about = "Content graph, page routes and deploy policies for a static website")]
#[command(long_about = "\
Content graph, page routes and deploy policies for a static website

Content files become typed nodes; plugins enrich them; the enriched graph
decides which pages exist.

Content structure:

  content/
  ├── config.toml                  # Site config (optional)
  ├── pages/
  │   ├── about.json               # PagesJson record; `link` makes it a static page
  │   └── contact.json             # md_* keys are rendered as markdown
  ├── team.json                    # Array file: one TeamJson node per element
  ├── icons/
  │   └── logo.svg                 # Optimized into an InlineSvg node
  └── media/
      ├── blog/
      │   └── hello.md             # frontmatter: category, date, external_link
      └── news/
          └── launch.md

Routes (written to <output>/routes.json):
  static-page     every PagesJson record with a link
  media-listing   /media/<category>, /media/<category>/2, ...
  media-item      /media/<category>/<slug> unless external_link is set
  news-listing    /media/news, /media/news/2, ...

Run 'sitegraph gen-config' to generate a documented config.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Content directory
    #[arg(long, default_value = "content", global = true)]
    source: PathBuf,

    /// Output directory (routes.json, robots.txt, rendered pages)
    #[arg(long, default_value = "public", global = true)]
    output: PathBuf,

    /// Directory for the digest manifest of the previous build
    #[arg(long, default_value = ".sitegraph-cache", global = true)]
    cache_dir: PathBuf,

    /// Deployment context (production, deploy-preview, branch-deploy, ...)
    #[arg(long, env = "CONTEXT", default_value = "production", global = true)]
    context: String,

    /// Debug logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full build: scan → enrich → routes, then write routes.json and robots.txt
    Build(CacheArgs),
    /// List the routes the content would produce
    Routes,
    /// Validate the content directory without writing anything
    Check,
    /// Print every node type with its fields
    Schema,
    /// Print robots.txt for the deployment context
    Robots,
    /// Inject the analytics snippet into rendered HTML in the output directory
    Inject,
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Build(cache_args) => {
            let site_config = config::load_config(&cli.source)?;
            init_thread_pool(&site_config.processing);

            println!("==> Building {}", cli.source.display());
            let build = pipeline::build_site(&cli.source, &site_config)?;
            output::print_build_output(&build);

            let previous = if cache_args.no_cache {
                DigestManifest::empty()
            } else {
                DigestManifest::load(&cli.cache_dir)
            };
            println!("Content: {}", previous.compare(&build.graph));
            DigestManifest::from_graph(&build.graph).save(&cli.cache_dir)?;

            let routes_path = write_routes(&cli.output, build)?;
            println!("Routes → {}", routes_path.display());

            let robots_path = robots::write_robots(&cli.output, &site_config.robots, &cli.context)?;
            println!("robots.txt ({}) → {}", cli.context, robots_path.display());

            println!("==> Build complete: {}", cli.output.display());
        }
        Command::Routes => {
            let build = build_quietly(&cli.source)?;
            output::print_routes(&build.routes);
        }
        Command::Check => {
            println!("==> Checking {}", cli.source.display());
            let build = build_quietly(&cli.source)?;
            output::print_build_output(&build);
            println!("==> Content is valid");
        }
        Command::Schema => {
            let build = build_quietly(&cli.source)?;
            output::print_schema(&build.schema, &build.graph);
        }
        Command::Robots => {
            let site_config = config::load_config(&cli.source)?;
            print!("{}", robots::render_robots(&site_config.robots, &cli.context));
        }
        Command::Inject => {
            let site_config = config::load_config(&cli.source)?;
            match analytics::inject_dir(&cli.output, &site_config.analytics, &cli.context)? {
                Some(stats) => println!("Analytics: {}", stats),
                None => println!("Analytics: disabled for context '{}'", cli.context),
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Logs go to stderr so stdout stays clean for listings.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("sitegraph=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores: user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

/// Load config and build without touching the output or cache directories.
fn build_quietly(source: &Path) -> Result<BuildOutput, Box<dyn std::error::Error>> {
    let site_config = config::load_config(source)?;
    init_thread_pool(&site_config.processing);
    Ok(pipeline::build_site(source, &site_config)?)
}

fn write_routes(output_dir: &Path, build: BuildOutput) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(output_dir)?;
    let manifest = RouteManifest {
        generator: format!("sitegraph {}", version_string()),
        routes: build.routes,
    };
    let path = output_dir.join("routes.json");
    std::fs::write(&path, serde_json::to_string_pretty(&manifest)?)?;
    Ok(path)
}
