use chrono::{Local, NaiveDate};
use clap::Parser;
use log::*;
use std::collections::HashSet;
use std::path::PathBuf;
use std::process::exit;

mod config;
mod courses;
mod error;
mod portal;
mod projection;
mod report;
mod scrape;
mod timetable;

use config::*;
use courses::*;
use error::*;
use portal::*;
use projection::*;
use report::*;
use scrape::*;
use timetable::*;

/// Logs into the student portal and works out how many classes of each
/// subject can still be skipped this semester.
#[derive(Parser)]
#[command(name = "skipcount", version)]
struct Cli {
    /// Settings file (RON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Timetable JSON, overrides the settings file
    #[arg(long)]
    timetable: Option<PathBuf>,

    /// Project from this date instead of today (YYYY-MM-DD)
    #[arg(long)]
    today: Option<NaiveDate>,

    /// Enrollment number; prompted for when missing
    #[arg(long)]
    user_id: Option<String>,

    /// Only report these subjects (code or course name), repeatable
    #[arg(long = "subject")]
    subjects: Vec<String>,

    /// Also write the projection to a CSV file
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Where to save the captcha image
    #[arg(long, default_value = "captcha.jpg")]
    captcha: PathBuf,
}

/// Turns the --subject filters into subject codes before anything touches
/// the network, so a typo fails fast.
fn resolve_filters(names: &CourseNames, filters: &[String]) -> Result<HashSet<String>> {
    filters
        .iter()
        .map(|query| {
            names
                .resolve(query)
                .map(|code| code.to_string())
                .ok_or_else(|| SkipError::from(LookupError::UnknownSubject(query.clone())))
        })
        .collect()
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let names = CourseNames::new(&config.course_names)?;
    debug!("{} course name(s) loaded", names.len());
    let filters = resolve_filters(&names, &cli.subjects)?;

    let timetable_path = cli.timetable.unwrap_or_else(|| config.timetable_path.clone());
    let timetable = load_timetable(&timetable_path)?;
    debug!("Known batches: {:?}", timetable.batches().collect::<Vec<_>>());

    let client = PortalClient::new(&config.base_url, &config.debug_dir)?
        .with_request_jitter(config.request_jitter_ms);

    client.fetch_captcha(&cli.captcha).await?;
    println!(
        "Captcha saved as {}. Open it and enter the text.",
        cli.captcha.display()
    );

    let credentials = read_credentials(cli.user_id)?;
    let dashboard = client.login(&credentials).await?;

    let batch = extract_batch_number(&dashboard)?;
    info!("Detected Batch: {}", batch);

    let portal_percentages = parse_dashboard_attendance(&dashboard);
    debug!("Dashboard lists {} course(s)", portal_percentages.len());

    let today = cli.today.unwrap_or_else(|| Local::now().date_naive());

    info!("Calculating skippable classes...");
    let mut records = calculate_skippable(
        &batch,
        today,
        config.sem_end_date,
        &timetable,
        &config.holidays,
        &client,
        &names,
        &config.policy(),
    )
    .await?;

    if !filters.is_empty() {
        records.retain(|r| filters.contains(&r.code));
    }

    println!();
    println!("{}", render_table(&batch, &records, &portal_percentages));

    if let Some(path) = cli.csv {
        write_csv(&path, &records)?;
        info!("Wrote {} row(s) to {}", records.len(), path.display());
    }

    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = ctrlc::set_handler(move || {
        info!("Exiting...");
        exit(130);
    }) {
        warn!("Couldn't set Ctrl-C handler: {}", e);
    }

    let cli = Cli::parse();

    // Everything runs one request at a time, a single thread is enough
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .thread_name("main-tokio")
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Couldn't start runtime: {}", e);
            exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(cli)) {
        error!("{}", e);
        exit(1);
    }
}
