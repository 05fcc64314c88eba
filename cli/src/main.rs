use std::path::PathBuf;
use std::process::ExitCode;

use sitebuilder::error::{ErrorClass, Result};
use sitebuilder::{BuildReport, Config, SiteBuilder};
use tracing_subscriber::EnvFilter;

pub const SOURCE_DIR: &str = "source";
pub const BUILD_DIR: &str = "build";
pub const TEMPLATE_DIR: &str = "templates";

mod flags {
    use std::path::PathBuf;

    xflags::xflags! {
        /// Build a static site from a content tree and a set of templates.
        cmd sitebuild {
            /// Content root. Defaults to `source/`.
            optional -s, --source source: PathBuf
            /// Output root. Defaults to `build/`.
            optional -b, --build build: PathBuf
            /// Templates root. Defaults to `templates/`.
            optional -t, --templates templates: PathBuf
            /// TOML settings file; flags override its values.
            optional -c, --config config: PathBuf
            /// Template for items whose front matter names none.
            optional -d, --default-template default_template: String
            /// Number of worker threads.
            optional -j, --jobs jobs: usize
            /// Convert markdown bodies to HTML.
            optional --markdown
            /// Rebuild every item, ignoring the previous build's manifest.
            optional --full
            /// Log more; repeat for even more.
            repeated -v, --verbose
            /// Only log errors.
            optional -q, --quiet
        }
    }
}

fn init_logging(flags: &flags::Sitebuild) {
    let filter = match (flags.quiet, flags.verbose) {
        (true, _) => EnvFilter::new("error"),
        (false, 0) => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        (false, 1) => EnvFilter::new("debug"),
        (false, _) => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn config(flags: &flags::Sitebuild) -> Result<Config> {
    let mut config = match &flags.config {
        Some(path) => Config::from_file(path)?,
        None => Config::new(SOURCE_DIR, BUILD_DIR).with_templates(TEMPLATE_DIR),
    };

    if let Some(source) = &flags.source {
        config.source_root = source.clone();
    }

    if let Some(build) = &flags.build {
        config.build_root = build.clone();
    }

    if let Some(templates) = &flags.templates {
        config.templates_root = Some(templates.clone());
    }

    if let Some(name) = &flags.default_template {
        config.default_template = Some(name.clone());
    }

    if let Some(jobs) = flags.jobs {
        config.jobs = Some(jobs);
    }

    config.markdown |= flags.markdown;
    config.incremental &= !flags.full;
    Ok(config)
}

fn build(flags: &flags::Sitebuild) -> Result<BuildReport> {
    let config = config(flags)?;
    tracing::debug!(?config, "resolved configuration");
    let templates: Option<PathBuf> = config.templates_root.clone();
    let mut builder = SiteBuilder::new(config);
    if let Some(root) = templates {
        builder.add_templates(root)?;
    }

    builder.build()
}

fn main() -> ExitCode {
    let flags = flags::Sitebuild::from_env_or_exit();
    init_logging(&flags);

    let start = std::time::Instant::now();
    match build(&flags) {
        Ok(report) => {
            for error in &report.errors {
                let class = match error.kind.class() {
                    ErrorClass::Content => "content",
                    ErrorClass::Io => "io",
                };

                eprintln!("{class} error: {error}");
            }

            println!("{report} in {}ms", start.elapsed().as_millis());
            match report.is_success() {
                true => ExitCode::SUCCESS,
                false => ExitCode::from(1),
            }
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(2)
        }
    }
}
