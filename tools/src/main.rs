use crate::args::*;
use crate::report::{Format, ReportWriter};
use clap::Parser;
use env_logger::Env;
use pmexplain_common::cache::CacheManager;
use pmexplain_common::classify::{self, Candidate, Classifier, Services, Settings};
use pmexplain_common::config::{self, ConfigFile};
use pmexplain_common::errors::*;
use pmexplain_common::excuses::ExcuseStore;
use pmexplain_common::hints::Checkout;
use pmexplain_common::query::HintsRepository;
use pmexplain_common::{debci, http, launchpad};
use std::io::{self, Write};

pub mod args;
pub mod decompress;
pub mod pager;
pub mod report;
pub mod select;

const EXCUSES_FILE: &str = "update_excuses.yaml.xz";

fn print_json(candidates: &[Candidate]) -> Result<()> {
    let mut stdout = io::stdout();
    serde_json::to_writer_pretty(&mut stdout, candidates)?;
    stdout.write_all(b"\n")?;
    Ok(())
}

fn load_excuses(config: &ConfigFile, refresh: bool) -> Result<ExcuseStore> {
    let http = http::client()?;
    let cache = CacheManager::new(
        config.excuses.cache_dir()?.join(EXCUSES_FILE),
        config.excuses.url(),
        config.excuses.max_age_secs(),
    );
    let bytes = cache.load(&http, refresh)?;
    let text = decompress::decompress(&bytes)
        .with_context(|| anyhow!("Failed to decompress {:?}", cache.path()))?;
    let store = ExcuseStore::load(&text).context("Failed to parse excuses")?;

    match store.generated_date() {
        Some(date) => info!("Loaded {} excuses generated at {}", store.len(), date),
        None => info!("Loaded {} excuses", store.len()),
    }
    Ok(store)
}

fn list_candidates(store: &ExcuseStore, args: &Candidates) -> Result<()> {
    let mut candidates = classify::candidates(store);
    if let Some(limit) = args.limit {
        candidates.truncate(limit);
    }

    if args.json {
        print_json(&candidates)
    } else {
        pager::write(select::listing(&candidates)?.as_bytes())
    }
}

fn explain(args: &Args, config: &ConfigFile, store: &ExcuseStore) -> Result<()> {
    let name = match &args.package {
        Some(name) => name.clone(),
        None => match select::prompt(&classify::candidates(store))? {
            Some(name) => name,
            None => return Ok(()),
        },
    };

    let series = args.series.clone().or_else(|| config.ubuntu.series.clone());
    let lp = launchpad::Client::new(config.launchpad.endpoint(), series)?;
    let series = lp
        .series()
        .context("Failed to determine ubuntu series, use --series")?;
    let debci = debci::Client::new(config.debci.endpoint())?;

    let checkout = if args.no_hints {
        debug!("Hints are disabled");
        None
    } else {
        let path = match &config.hints.path {
            Some(path) => path.clone(),
            None => config.excuses.cache_dir()?.join("hints"),
        };
        Some(Checkout::new(config.hints.vcs(), config.hints.branch(), path))
    };

    let classifier = Classifier::new(
        Services {
            distro: &lp,
            bugs: &lp,
            builds: &lp,
            ci: &debci,
            hints: checkout.as_ref().map(|c| c as &dyn HintsRepository),
        },
        Settings {
            series,
            debian_series: config.ubuntu.debian_series().to_string(),
            output_url: config.excuses.output_url().to_string(),
        },
    );

    let format = if args.json { Format::Json } else { Format::Text };
    let mut writer = ReportWriter::stdout(format);
    classifier.explain(store, &name, &mut writer)?;
    debug!("Reported {} problems for {:?}", writer.fails(), name);

    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let logging = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    env_logger::init_from_env(Env::default().default_filter_or(logging));

    if args.color {
        debug!("Bypass tty detection and always use colors");
        colored::control::set_override(true);
    }

    let config = config::load(args.config.as_ref()).context("Failed to load config file")?;

    match &args.subcommand {
        Some(SubCommand::Candidates(candidates)) => {
            let store = load_excuses(&config, args.refresh)?;
            list_candidates(&store, candidates)?;
        }
        Some(SubCommand::Completions(completions)) => args::gen_completions(completions)?,
        None => {
            let store = load_excuses(&config, args.refresh)?;
            explain(&args, &config, &store)?;
        }
    }

    Ok(())
}
